use std::sync::Arc;

use anyhow::{bail, Result};
use serde::{Deserialize, Serialize};

use codec::{Decoder, Encoder};
use storage::{KVStore, Schema};
use types::block::Block;
use types::Hash;

// Keyspaces:
//   block_hash   : block hash -> serialized block
//   block_height : height -> hash (canonical index only)
//   chain_state  : "head" -> hash
//   block_cdf    : block hash -> cumulative difficulty

pub struct BlocksColumn;

impl Schema for BlocksColumn {
    type Key = Hash;
    type Value = Block;

    fn column() -> &'static str {
        "block_hash"
    }
}

pub struct HeightColumn;

impl Schema for HeightColumn {
    type Key = u64;
    type Value = Hash;

    fn column() -> &'static str {
        "block_height"
    }
}

pub struct HeadColumn;

impl Schema for HeadColumn {
    type Key = String;
    type Value = Hash;

    fn column() -> &'static str {
        "chain_state"
    }
}

const HEAD_KEY: &str = "head";

pub struct CdfColumn;

impl Schema for CdfColumn {
    type Key = Hash;
    type Value = CumulativeDifficulty;

    fn column() -> &'static str {
        "block_cdf"
    }
}

/// Sum of header difficulties from genesis to a block, stored as 8 bytes
/// little endian.
#[derive(Debug, Clone, Copy, Serialize, Deserialize)]
pub struct CumulativeDifficulty(pub u64);

impl Encoder for CumulativeDifficulty {
    fn encode(&self) -> Result<Vec<u8>> {
        Ok(self.0.to_le_bytes().to_vec())
    }
}

impl Decoder for CumulativeDifficulty {
    fn decode(buf: &[u8]) -> Result<Self> {
        let bytes: [u8; 8] = buf
            .try_into()
            .map_err(|_| anyhow::anyhow!("cdf value must be 8 bytes, got {}", buf.len()))?;
        Ok(CumulativeDifficulty(u64::from_le_bytes(bytes)))
    }
}

/// Typed facade over the four chain keyspaces. A block is always persisted
/// under its hash before any canonical height or head pointer references
/// it; the chain engine upholds that ordering.
pub struct BlockStore {
    blocks: Arc<dyn KVStore<BlocksColumn>>,
    heights: Arc<dyn KVStore<HeightColumn>>,
    head: Arc<dyn KVStore<HeadColumn>>,
    cdf: Arc<dyn KVStore<CdfColumn>>,
}

impl BlockStore {
    pub fn new<DB>(db: Arc<DB>) -> Self
    where
        DB: KVStore<BlocksColumn>
            + KVStore<HeightColumn>
            + KVStore<HeadColumn>
            + KVStore<CdfColumn>
            + 'static,
    {
        BlockStore {
            blocks: db.clone(),
            heights: db.clone(),
            head: db.clone(),
            cdf: db,
        }
    }

    /// Writes the by-hash record only; the canonical index is updated
    /// separately via [`set_canonical`](Self::set_canonical).
    pub fn put_block(&self, block: &Block) -> Result<()> {
        self.blocks.put(block.hash, block.clone())
    }

    pub fn get_block_by_hash(&self, hash: &Hash) -> Result<Option<Block>> {
        self.blocks.get(hash)
    }

    pub fn set_canonical(&self, height: u64, hash: Hash) -> Result<()> {
        self.heights.put(height, hash)
    }

    /// Canonical lookup: height to hash to block. A height entry pointing
    /// at a missing block is corruption, not absence.
    pub fn get_block_by_height(&self, height: u64) -> Result<Option<Block>> {
        let hash = match self.heights.get(&height)? {
            Some(hash) => hash,
            None => return Ok(None),
        };
        match self.blocks.get(&hash)? {
            Some(block) => Ok(Some(block)),
            None => bail!("canonical index at height {height} references missing block {hash}"),
        }
    }

    pub fn put_head(&self, hash: Hash) -> Result<()> {
        self.head.put(HEAD_KEY.to_string(), hash)
    }

    pub fn get_head(&self) -> Result<Option<Hash>> {
        self.head.get(&HEAD_KEY.to_string())
    }

    pub fn put_cdf(&self, hash: Hash, value: u64) -> Result<()> {
        self.cdf.put(hash, CumulativeDifficulty(value))
    }

    pub fn get_cdf(&self, hash: &Hash) -> Result<Option<u64>> {
        Ok(self.cdf.get(hash)?.map(|cdf| cdf.0))
    }
}
