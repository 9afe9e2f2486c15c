use anyhow::Result;
use chrono::Utc;

use consensus::constants::MAX_FUTURE_BLOCK_TIME;
use consensus::{meets_difficulty, Hasher};
use types::block::Block;
use types::Hash;

use crate::emission::block_reward;
use crate::errors::BlockChainError;

/// Full validation of a block against its parent: contextual rules first,
/// then the internal checks shared with genesis.
pub fn validate_block(block: &Block, parent: &Block, hasher: &dyn Hasher) -> Result<()> {
    if block.height() != parent.height() + 1 {
        return Err(BlockChainError::InvalidHeight {
            expected: parent.height() + 1,
            got: block.height(),
        }
        .into());
    }

    if block.header.prev_hash != parent.hash {
        return Err(BlockChainError::InvalidPrevHash.into());
    }

    if block.header.timestamp <= parent.header.timestamp {
        return Err(BlockChainError::TimestampTooOld.into());
    }

    let now = Utc::now().timestamp() as u64;
    if block.header.timestamp > now + MAX_FUTURE_BLOCK_TIME {
        return Err(BlockChainError::TimestampTooFar.into());
    }

    validate_block_internal(block, hasher)
}

/// Checks that a genesis block is well-formed: height zero, zero parent,
/// and the internal rules.
pub fn validate_genesis(genesis: &Block, hasher: &dyn Hasher) -> Result<()> {
    if genesis.height() != 0 {
        return Err(BlockChainError::InvalidHeight {
            expected: 0,
            got: genesis.height(),
        }
        .into());
    }
    if genesis.header.prev_hash != Hash::ZERO {
        return Err(BlockChainError::InvalidPrevHash.into());
    }
    validate_block_internal(genesis, hasher)
}

/// Context-free rules, in order: merkle root, block hash, PoW hash
/// re-execution, difficulty target, coinbase placement, coinbase amount.
///
/// Transfer signatures and balances are deliberately not checked here;
/// the mempool and the peer layer enforce them before blocks are built.
fn validate_block_internal(block: &Block, hasher: &dyn Hasher) -> Result<()> {
    if block.header.merkle_root != merkle::merkle_root(&block.transactions) {
        return Err(BlockChainError::InvalidMerkleRoot.into());
    }

    if block.hash != block.compute_hash() {
        return Err(BlockChainError::InvalidBlockHash.into());
    }

    let pow = hasher.hash(&block.header.encode_bytes())?;
    if block.pow_hash != pow {
        return Err(BlockChainError::PowHashMismatch.into());
    }

    if !meets_difficulty(&pow, block.header.difficulty) {
        return Err(BlockChainError::InvalidPoW.into());
    }

    let coinbase_count = block.transactions.iter().filter(|tx| tx.is_coinbase()).count();
    match coinbase_count {
        0 => return Err(BlockChainError::NoCoinbase.into()),
        1 => {}
        _ => return Err(BlockChainError::MultipleCoinbase.into()),
    }
    if !block.transactions[0].is_coinbase() {
        return Err(BlockChainError::CoinbaseNotFirst.into());
    }

    if block.transactions[0].amount != block_reward(block.height()) {
        return Err(BlockChainError::InvalidCoinbaseAmount.into());
    }

    Ok(())
}
