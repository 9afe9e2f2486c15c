use crate::block::Block;
use crate::tx::Transaction;

/// Events the node loop fans out to the network layer.
#[derive(Debug, Clone)]
pub enum LocalEvent {
    /// A block this node mined and accepted locally.
    MinedBlock(Block),
    /// A transaction admitted through the local submit surface.
    SubmittedTransaction(Transaction),
}
