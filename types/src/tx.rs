use anyhow::{bail, Result};
use serde::{Deserialize, Serialize};

use codec::impl_codec;

use crate::amount::{Amount, BLOCK_REWARD};
use crate::hash::{sha256, Hash};
use crate::Address;

/// Length of the canonical pre-id encoding:
/// kind(1) || timestamp(8) || from(32) || to(32) || amount(8) || fee(8) || nonce(8).
pub const TX_ENCODED_LEN: usize = 97;

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub enum TxKind {
    Coinbase,
    Transfer,
}

impl TxKind {
    fn as_byte(self) -> u8 {
        match self {
            TxKind::Coinbase => 0,
            TxKind::Transfer => 1,
        }
    }

    fn from_byte(b: u8) -> Result<Self> {
        match b {
            0 => Ok(TxKind::Coinbase),
            1 => Ok(TxKind::Transfer),
            other => bail!("unknown transaction kind byte {other:#04x}"),
        }
    }
}

/// A single value transfer. The id is the SHA-256 of the canonical
/// encoding, and the Ed25519 signature covers those same bytes.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct Transaction {
    pub id: Hash,
    pub kind: TxKind,
    /// Unix seconds.
    pub timestamp: u64,
    /// Zero for coinbase, the sender's public key otherwise.
    pub from: Address,
    pub to: Address,
    pub amount: Amount,
    pub fee: Amount,
    /// Sender's sequential nonce; the block height for coinbase.
    pub nonce: u64,
    /// Ed25519 signature over the canonical bytes, empty for coinbase.
    #[serde(with = "crate::hex_codec")]
    pub signature: Vec<u8>,
}

impl_codec!(Transaction);

impl Transaction {
    /// Deterministic big-endian encoding of everything except id and
    /// signature. This is the id preimage and the signed message.
    pub fn canonical_bytes(&self) -> [u8; TX_ENCODED_LEN] {
        let mut buf = [0u8; TX_ENCODED_LEN];
        buf[0] = self.kind.as_byte();
        buf[1..9].copy_from_slice(&self.timestamp.to_be_bytes());
        buf[9..41].copy_from_slice(self.from.as_bytes());
        buf[41..73].copy_from_slice(self.to.as_bytes());
        buf[73..81].copy_from_slice(&self.amount.to_be_bytes());
        buf[81..89].copy_from_slice(&self.fee.to_be_bytes());
        buf[89..97].copy_from_slice(&self.nonce.to_be_bytes());
        buf
    }

    /// Rebuilds a transaction from its canonical bytes. The id is
    /// recomputed and the signature starts out empty.
    pub fn from_canonical_bytes(buf: &[u8]) -> Result<Self> {
        if buf.len() != TX_ENCODED_LEN {
            bail!(
                "transaction encoding must be {TX_ENCODED_LEN} bytes, got {}",
                buf.len()
            );
        }
        let mut tx = Transaction {
            id: Hash::ZERO,
            kind: TxKind::from_byte(buf[0])?,
            timestamp: u64::from_be_bytes(buf[1..9].try_into()?),
            from: Hash::from_bytes(&buf[9..41])?,
            to: Hash::from_bytes(&buf[41..73])?,
            amount: u64::from_be_bytes(buf[73..81].try_into()?),
            fee: u64::from_be_bytes(buf[81..89].try_into()?),
            nonce: u64::from_be_bytes(buf[89..97].try_into()?),
            signature: Vec::new(),
        };
        tx.id = tx.compute_id();
        Ok(tx)
    }

    pub fn compute_id(&self) -> Hash {
        sha256(&self.canonical_bytes())
    }

    pub fn is_coinbase(&self) -> bool {
        self.kind == TxKind::Coinbase
    }

    /// Builds the coinbase paying the block reward to the miner. The nonce
    /// carries the block height so coinbases at different heights get
    /// distinct ids.
    pub fn coinbase(miner: Address, height: u64, timestamp: u64) -> Self {
        let mut tx = Transaction {
            id: Hash::ZERO,
            kind: TxKind::Coinbase,
            timestamp,
            from: Hash::ZERO,
            to: miner,
            amount: BLOCK_REWARD,
            fee: 0,
            nonce: height,
            signature: Vec::new(),
        };
        tx.id = tx.compute_id();
        tx
    }
}
