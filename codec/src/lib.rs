use anyhow::Result;
use serde::de::DeserializeOwned;
use serde::Serialize;

pub trait Encoder: Sized + Serialize {
    fn encode(&self) -> Result<Vec<u8>> {
        bincode::serialize(self).map_err(|e| e.into())
    }
}

pub trait Decoder: Sized + DeserializeOwned {
    fn decode(buf: &[u8]) -> Result<Self> {
        bincode::deserialize(buf).map_err(|e| e.into())
    }
}

pub trait Codec: Encoder + Decoder {}

impl<T> Codec for T where T: Encoder + Decoder {}

#[macro_export]
macro_rules! impl_codec {
    ($type:ty) => {
        impl $crate::Encoder for $type {}
        impl $crate::Decoder for $type {}
    };
}

impl Encoder for String {}
impl Decoder for String {}

// Height keys are stored big endian so the height column iterates in order.
impl Encoder for u64 {
    fn encode(&self) -> Result<Vec<u8>> {
        Ok(self.to_be_bytes().to_vec())
    }
}

impl Decoder for u64 {
    fn decode(buf: &[u8]) -> Result<Self> {
        let bytes: [u8; 8] = buf
            .try_into()
            .map_err(|_| anyhow::anyhow!("u64 key must be 8 bytes, got {}", buf.len()))?;
        Ok(u64::from_be_bytes(bytes))
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn u64_round_trip() {
        let value = 48_321u64;
        let encoded = value.encode().unwrap();
        assert_eq!(encoded.len(), 8);
        assert_eq!(u64::decode(&encoded).unwrap(), value);
    }

    #[test]
    fn u64_keys_sort_by_height() {
        let a = 255u64.encode().unwrap();
        let b = 256u64.encode().unwrap();
        assert!(a < b);
    }
}
