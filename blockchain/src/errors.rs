use thiserror::Error;

#[derive(Error, Debug, PartialEq, Eq)]
pub enum BlockChainError {
    // Validation
    #[error("block height {got} is not parent height + 1 ({expected})")]
    InvalidHeight { expected: u64, got: u64 },
    #[error("block previous hash does not match parent")]
    InvalidPrevHash,
    #[error("block timestamp is not after parent timestamp")]
    TimestampTooOld,
    #[error("block timestamp is too far in the future")]
    TimestampTooFar,
    #[error("merkle root does not match transactions")]
    InvalidMerkleRoot,
    #[error("block hash does not match header")]
    InvalidBlockHash,
    #[error("block PoW hash does not meet difficulty target")]
    InvalidPoW,
    #[error("block PoW hash does not match re-execution")]
    PowHashMismatch,
    #[error("block has no coinbase transaction")]
    NoCoinbase,
    #[error("block has more than one coinbase transaction")]
    MultipleCoinbase,
    #[error("coinbase transaction must be first in block")]
    CoinbaseNotFirst,
    #[error("coinbase amount does not match block reward")]
    InvalidCoinbaseAmount,
    #[error("block difficulty {got} does not match required {required}")]
    InvalidDifficulty { required: u64, got: u64 },

    // Chain
    #[error("chain is already initialized with genesis")]
    AlreadyInitialized,
    #[error("chain not initialized: no genesis block")]
    NotInitialized,
    #[error("parent block not found")]
    ParentNotFound,
    #[error("block not found")]
    BlockNotFound,

    // State replay
    #[error("balance underflow while replaying chain state")]
    BalanceUnderflow,
}
