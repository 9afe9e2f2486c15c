use anyhow::{bail, Result};
use serde::{Deserialize, Serialize};

use codec::impl_codec;

use crate::hash::{sha256, Hash};
use crate::tx::Transaction;

/// Length of the deterministic header encoding:
/// version(4) || height(8) || timestamp(8) || prev_hash(32) ||
/// merkle_root(32) || difficulty(8) || nonce(8).
pub const HEADER_ENCODED_LEN: usize = 100;

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub struct BlockHeader {
    pub version: u32,
    pub height: u64,
    /// Unix seconds.
    pub timestamp: u64,
    pub prev_hash: Hash,
    pub merkle_root: Hash,
    /// Required number of leading zero bits in the PoW hash.
    pub difficulty: u64,
    pub nonce: u64,
}

impl_codec!(BlockHeader);

impl BlockHeader {
    /// Deterministic 100-byte big-endian encoding. This is the only input
    /// to both the identity hash and the PoW hash.
    pub fn encode_bytes(&self) -> [u8; HEADER_ENCODED_LEN] {
        let mut buf = [0u8; HEADER_ENCODED_LEN];
        buf[0..4].copy_from_slice(&self.version.to_be_bytes());
        buf[4..12].copy_from_slice(&self.height.to_be_bytes());
        buf[12..20].copy_from_slice(&self.timestamp.to_be_bytes());
        buf[20..52].copy_from_slice(self.prev_hash.as_bytes());
        buf[52..84].copy_from_slice(self.merkle_root.as_bytes());
        buf[84..92].copy_from_slice(&self.difficulty.to_be_bytes());
        buf[92..100].copy_from_slice(&self.nonce.to_be_bytes());
        buf
    }

    pub fn decode_bytes(buf: &[u8]) -> Result<Self> {
        if buf.len() != HEADER_ENCODED_LEN {
            bail!(
                "header encoding must be {HEADER_ENCODED_LEN} bytes, got {}",
                buf.len()
            );
        }
        Ok(BlockHeader {
            version: u32::from_be_bytes(buf[0..4].try_into()?),
            height: u64::from_be_bytes(buf[4..12].try_into()?),
            timestamp: u64::from_be_bytes(buf[12..20].try_into()?),
            prev_hash: Hash::from_bytes(&buf[20..52])?,
            merkle_root: Hash::from_bytes(&buf[52..84])?,
            difficulty: u64::from_be_bytes(buf[84..92].try_into()?),
            nonce: u64::from_be_bytes(buf[92..100].try_into()?),
        })
    }

    /// Block identity: SHA-256 of the encoded header.
    pub fn hash(&self) -> Hash {
        sha256(&self.encode_bytes())
    }
}

/// A complete block: header plus ordered transactions, with both hashes
/// carried alongside. Once hashed a block never mutates.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct Block {
    pub header: BlockHeader,
    pub transactions: Vec<Transaction>,
    /// SHA-256 of the encoded header (block identity).
    pub hash: Hash,
    /// The PoW hasher's output on the encoded header (proves work).
    pub pow_hash: Hash,
}

impl_codec!(Block);

impl Block {
    pub fn compute_hash(&self) -> Hash {
        self.header.hash()
    }

    pub fn height(&self) -> u64 {
        self.header.height
    }

    pub fn prev_hash(&self) -> &Hash {
        &self.header.prev_hash
    }
}
