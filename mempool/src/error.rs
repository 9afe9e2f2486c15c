use thiserror::Error;

#[derive(Error, Debug, PartialEq, Eq)]
pub enum MempoolError {
    #[error("transaction already in mempool")]
    AlreadyPresent,
    #[error("invalid transaction signature")]
    InvalidSignature,
    #[error("invalid nonce: expected {expected}, got {got}")]
    InvalidNonce { expected: u64, got: u64 },
    #[error("insufficient funds")]
    InsufficientFunds,
}
