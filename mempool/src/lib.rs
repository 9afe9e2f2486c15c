pub mod error;

#[cfg(test)]
mod tests;

use std::collections::HashMap;
use std::sync::{Arc, RwLock};

use anyhow::Result;
use ed25519_dalek::{Signature, Verifier, VerifyingKey};
use tracing::debug;

use blockchain::{Chain, TxPool};
use types::tx::Transaction;
use types::{Amount, Hash};

pub use error::MempoolError;

/// Admission-controlled pool of unconfirmed transactions.
///
/// Admission verifies the Ed25519 signature against the sender's address
/// (which is their public key), then checks nonce and balance against the
/// chain state plus everything already pending from the same sender.
pub struct Mempool {
    txs: RwLock<HashMap<Hash, Transaction>>,
    chain: Arc<Chain>,
}

impl Mempool {
    pub fn new(chain: Arc<Chain>) -> Self {
        Mempool {
            txs: RwLock::new(HashMap::new()),
            chain,
        }
    }

    pub fn size(&self) -> usize {
        self.txs.read().expect("mempool lock poisoned").len()
    }

    /// Validates and stores a transaction. Every failure is a rejection,
    /// surfaced as a [`MempoolError`] or a chain lookup error.
    pub fn add_transaction(&self, tx: &Transaction) -> Result<()> {
        let mut txs = self.txs.write().expect("mempool lock poisoned");

        if txs.contains_key(&tx.id) {
            return Err(MempoolError::AlreadyPresent.into());
        }

        let pubkey = VerifyingKey::from_bytes(tx.from.as_bytes())
            .map_err(|_| MempoolError::InvalidSignature)?;
        let signature =
            Signature::from_slice(&tx.signature).map_err(|_| MempoolError::InvalidSignature)?;
        pubkey
            .verify(&tx.canonical_bytes(), &signature)
            .map_err(|_| MempoolError::InvalidSignature)?;

        let (balance, confirmed_nonce) = self.chain.get_account_state(&tx.from)?;

        // Fold everything already pending from this sender into the view:
        // the next usable nonce and the funds already spoken for.
        let mut pending_nonce = confirmed_nonce;
        let mut pending_debit: Amount = 0;
        for pending in txs.values().filter(|pending| pending.from == tx.from) {
            if pending.nonce >= pending_nonce {
                pending_nonce = pending.nonce + 1;
            }
            pending_debit += pending.amount + pending.fee;
        }

        if tx.nonce != pending_nonce {
            return Err(MempoolError::InvalidNonce {
                expected: pending_nonce,
                got: tx.nonce,
            }
            .into());
        }

        if balance < pending_debit + tx.amount + tx.fee {
            return Err(MempoolError::InsufficientFunds.into());
        }

        txs.insert(tx.id, tx.clone());
        Ok(())
    }

    /// Up to `max` pending transactions, ordered by ascending timestamp
    /// with the id as tie-breaker so the listing is deterministic.
    pub fn pending(&self, max: usize) -> Vec<Transaction> {
        let txs = self.txs.read().expect("mempool lock poisoned");
        let mut all: Vec<Transaction> = txs.values().cloned().collect();
        all.sort_by(|a, b| (a.timestamp, a.id).cmp(&(b.timestamp, b.id)));
        all.truncate(max);
        all
    }

    /// Drops confirmed transactions by id, silently ignoring ones the pool
    /// no longer holds.
    pub fn remove_transactions(&self, confirmed: &[Transaction]) {
        let mut txs = self.txs.write().expect("mempool lock poisoned");
        for tx in confirmed {
            txs.remove(&tx.id);
        }
    }
}

impl TxPool for Mempool {
    fn add_transaction(&self, tx: &Transaction) -> Result<()> {
        Mempool::add_transaction(self, tx).map_err(|err| {
            debug!(id = %tx.id, %err, "transaction not re-admitted");
            err
        })
    }

    fn remove_transactions(&self, txs: &[Transaction]) {
        Mempool::remove_transactions(self, txs)
    }
}
