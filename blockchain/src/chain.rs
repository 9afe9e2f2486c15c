use std::collections::HashSet;
use std::sync::{Arc, Mutex, RwLock};

use anyhow::{anyhow, Result};
use tokio::sync::watch;
use tracing::{debug, info};

use consensus::{next_required_difficulty, Hasher};
use types::block::{Block, BlockHeader};
use types::tx::Transaction;
use types::{Address, Amount, Hash};

use crate::block_storage::BlockStore;
use crate::confirmation::is_mature;
use crate::emission::total_supply_at_height;
use crate::errors::BlockChainError;
use crate::validation::{validate_block, validate_genesis};

/// The mempool as seen from the chain engine during reorganizations.
pub trait TxPool: Send + Sync {
    fn add_transaction(&self, tx: &Transaction) -> Result<()>;
    fn remove_transactions(&self, txs: &[Transaction]);
}

/// Outcome of submitting a block. Duplicates are a no-op success so peers
/// can suppress re-gossip without treating them as failures.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ImportResult {
    Imported,
    AlreadyKnown,
}

/// The consensus engine: owns the canonical chain, validates and ingests
/// blocks, picks between forks by cumulative difficulty, and announces tip
/// changes.
///
/// `mu` serializes every mutating operation from ingestion through
/// reorganization. The tip snapshot lives in its own `RwLock` so that
/// state queries issued from inside a reorganization (mempool
/// re-admission) never re-enter the write path.
pub struct Chain {
    store: Arc<BlockStore>,
    hasher: Arc<dyn Hasher>,
    mu: Mutex<()>,
    tip: RwLock<Option<Block>>,
    pool: RwLock<Option<Arc<dyn TxPool>>>,
    tip_tx: watch::Sender<Option<Block>>,
}

impl Chain {
    /// Opens the chain over an existing store, restoring the tip from the
    /// persisted head pointer when one exists.
    pub fn new(store: Arc<BlockStore>, hasher: Arc<dyn Hasher>) -> Result<Self> {
        let tip = match store.get_head()? {
            Some(head_hash) => {
                let tip = store
                    .get_block_by_hash(&head_hash)?
                    .ok_or_else(|| anyhow!("head pointer references missing block {head_hash}"))?;
                info!(height = tip.height(), hash = %tip.hash, "restored chain tip");
                Some(tip)
            }
            None => None,
        };

        let (tip_tx, _) = watch::channel(tip.clone());

        Ok(Chain {
            store,
            hasher,
            mu: Mutex::new(()),
            tip: RwLock::new(tip),
            pool: RwLock::new(None),
            tip_tx,
        })
    }

    /// Attaches the mempool used for re-injection and eviction during
    /// reorganizations.
    pub fn set_mempool(&self, pool: Arc<dyn TxPool>) {
        *self.pool.write().expect("pool lock poisoned") = Some(pool);
    }

    /// Single-slot coalescing tip subscription: a slow consumer misses
    /// intermediate tips but always observes a later one.
    pub fn subscribe_tip(&self) -> watch::Receiver<Option<Block>> {
        self.tip_tx.subscribe()
    }

    /// Creates, validates, and persists the genesis block.
    pub fn init_genesis(
        &self,
        miner_address: Address,
        difficulty: u64,
        timestamp: u64,
    ) -> Result<Block> {
        let _guard = self.mu.lock().expect("chain lock poisoned");

        if self.tip.read().expect("tip lock poisoned").is_some() {
            return Err(BlockChainError::AlreadyInitialized.into());
        }

        let coinbase = Transaction::coinbase(miner_address, 0, timestamp);
        let transactions = vec![coinbase];

        let header = BlockHeader {
            version: 1,
            height: 0,
            timestamp,
            prev_hash: Hash::ZERO,
            merkle_root: merkle::merkle_root(&transactions),
            difficulty,
            nonce: 0,
        };

        let hash = header.hash();
        let pow_hash = self.hasher.hash(&header.encode_bytes())?;
        let block = Block {
            header,
            transactions,
            hash,
            pow_hash,
        };

        validate_genesis(&block, self.hasher.as_ref())?;

        self.store.put_block(&block)?;
        self.store.set_canonical(0, block.hash)?;
        self.store.put_cdf(block.hash, difficulty)?;
        self.store.put_head(block.hash)?;

        *self.tip.write().expect("tip lock poisoned") = Some(block.clone());
        self.tip_tx.send_replace(Some(block.clone()));

        info!(hash = %block.hash, "genesis block created");
        Ok(block)
    }

    /// Validates and ingests a block, handling forks and reorganization.
    pub fn add_block(&self, block: Block) -> Result<ImportResult> {
        let _guard = self.mu.lock().expect("chain lock poisoned");

        let tip = self.tip_snapshot().ok_or(BlockChainError::NotInitialized)?;

        // Re-submitting a known block is a no-op.
        if self.store.get_block_by_hash(&block.hash)?.is_some() {
            return Ok(ImportResult::AlreadyKnown);
        }

        let parent = self
            .store
            .get_block_by_hash(&block.header.prev_hash)?
            .ok_or(BlockChainError::ParentNotFound)?;

        if block.height() != parent.height() + 1 {
            return Err(BlockChainError::InvalidHeight {
                expected: parent.height() + 1,
                got: block.height(),
            }
            .into());
        }

        // Required difficulty is derived from the parent's own ancestry so
        // the retarget is correct even when the parent sits on a side chain.
        let required = next_required_difficulty(Some(&parent), |height| {
            self.ancestor_at_height(&parent, height)
        })?;
        if block.header.difficulty != required {
            return Err(BlockChainError::InvalidDifficulty {
                required,
                got: block.header.difficulty,
            }
            .into());
        }

        validate_block(&block, &parent, self.hasher.as_ref())?;

        let parent_cdf = self
            .store
            .get_cdf(&parent.hash)?
            .ok_or_else(|| anyhow!("missing cumulative difficulty for parent {}", parent.hash))?;
        let new_cdf = parent_cdf.saturating_add(block.header.difficulty);

        self.store.put_block(&block)?;
        self.store.put_cdf(block.hash, new_cdf)?;

        let tip_cdf = self
            .store
            .get_cdf(&tip.hash)?
            .ok_or_else(|| anyhow!("missing cumulative difficulty for tip {}", tip.hash))?;

        // Heaviest chain wins; an equal-weight block only takes over when
        // it directly extends the tip, which stops equal-weight forks from
        // ping-ponging the head.
        let extends_tip = block.header.prev_hash == tip.hash;
        if new_cdf > tip_cdf || (new_cdf == tip_cdf && extends_tip) {
            info!(
                height = block.height(),
                hash = %block.hash,
                old_height = tip.height(),
                old_hash = %tip.hash,
                "adopting new tip"
            );
            self.reorganize(&tip, block)?;
        } else {
            debug!(
                height = block.height(),
                hash = %block.hash,
                cdf = new_cdf,
                tip_cdf,
                "stored side-chain block"
            );
        }

        Ok(ImportResult::Imported)
    }

    /// Switches the canonical chain to `new_tip`. Assumes `mu` is held.
    fn reorganize(&self, old_tip: &Block, new_tip: Block) -> Result<()> {
        let (new_chain, old_chain) = self.find_fork_paths(old_tip, &new_tip)?;

        for block in &new_chain {
            self.store.set_canonical(block.height(), block.hash)?;
        }
        self.store.put_head(new_tip.hash)?;

        *self.tip.write().expect("tip lock poisoned") = Some(new_tip.clone());

        let pool = self.pool.read().expect("pool lock poisoned").clone();
        if let Some(pool) = pool {
            let new_ids: HashSet<Hash> = new_chain
                .iter()
                .flat_map(|b| b.transactions.iter())
                .filter(|tx| !tx.is_coinbase())
                .map(|tx| tx.id)
                .collect();

            // Transactions knocked out of the canonical chain go back to
            // the pool; ones that no longer pass admission are dropped.
            for block in &old_chain {
                for tx in block.transactions.iter().filter(|tx| !tx.is_coinbase()) {
                    if !new_ids.contains(&tx.id) {
                        if let Err(err) = pool.add_transaction(tx) {
                            debug!(id = %tx.id, %err, "dropped transaction during reorg");
                        }
                    }
                }
            }

            let confirmed: Vec<Transaction> = new_chain
                .iter()
                .flat_map(|b| b.transactions.iter())
                .filter(|tx| !tx.is_coinbase())
                .cloned()
                .collect();
            pool.remove_transactions(&confirmed);
        }

        self.tip_tx.send_replace(Some(new_tip));
        Ok(())
    }

    /// Finds the fork point between two tips and returns both branches in
    /// ascending order, fork point excluded.
    fn find_fork_paths(&self, old_tip: &Block, new_tip: &Block) -> Result<(Vec<Block>, Vec<Block>)> {
        let mut new_chain = Vec::new();
        let mut old_chain = Vec::new();

        let mut curr_new = new_tip.clone();
        let mut curr_old = old_tip.clone();

        while curr_new.height() > curr_old.height() {
            let prev = self.parent_of(&curr_new)?;
            new_chain.push(std::mem::replace(&mut curr_new, prev));
        }
        while curr_old.height() > curr_new.height() {
            let prev = self.parent_of(&curr_old)?;
            old_chain.push(std::mem::replace(&mut curr_old, prev));
        }

        while curr_new.hash != curr_old.hash {
            let prev_new = self.parent_of(&curr_new)?;
            let prev_old = self.parent_of(&curr_old)?;
            new_chain.push(std::mem::replace(&mut curr_new, prev_new));
            old_chain.push(std::mem::replace(&mut curr_old, prev_old));
        }

        new_chain.reverse();
        old_chain.reverse();
        Ok((new_chain, old_chain))
    }

    fn parent_of(&self, block: &Block) -> Result<Block> {
        self.store
            .get_block_by_hash(&block.header.prev_hash)?
            .ok_or_else(|| BlockChainError::ParentNotFound.into())
    }

    /// Ancestor of `start` at `height`, found by walking `prev_hash` links.
    pub fn ancestor_at_height(&self, start: &Block, height: u64) -> Result<Block> {
        if height > start.height() {
            return Err(anyhow!(
                "target height {height} is above start block height {}",
                start.height()
            ));
        }
        let mut curr = start.clone();
        while curr.height() > height {
            curr = self.parent_of(&curr)?;
        }
        Ok(curr)
    }

    /// Block on the canonical chain at the given height.
    pub fn get_block_by_height(&self, height: u64) -> Result<Block> {
        let tip = self.tip_snapshot().ok_or(BlockChainError::BlockNotFound)?;
        if height > tip.height() {
            return Err(BlockChainError::BlockNotFound.into());
        }
        if height == tip.height() {
            return Ok(tip);
        }
        self.store
            .get_block_by_height(height)?
            .ok_or_else(|| BlockChainError::BlockNotFound.into())
    }

    pub fn get_block_by_hash(&self, hash: &Hash) -> Result<Block> {
        self.store
            .get_block_by_hash(hash)?
            .ok_or_else(|| BlockChainError::BlockNotFound.into())
    }

    pub fn tip(&self) -> Option<Block> {
        self.tip.read().expect("tip lock poisoned").clone()
    }

    /// Height of the current tip; zero for an uninitialized chain.
    pub fn height(&self) -> u64 {
        self.tip().map(|tip| tip.height()).unwrap_or(0)
    }

    /// Total AUR emitted up to the current tip.
    pub fn total_supply(&self) -> Amount {
        self.tip()
            .map(|tip| total_supply_at_height(tip.height()))
            .unwrap_or(0)
    }

    /// Balance and confirmed nonce of an address, derived by replaying the
    /// canonical chain. Coinbase outputs count only once mature. Reads the
    /// store directly so callers holding no chain locks (including
    /// re-admission during a reorganization) can query safely.
    pub fn get_account_state(&self, addr: &Address) -> Result<(Amount, u64)> {
        let tip = self.tip.read().expect("tip lock poisoned");
        let current_height = match tip.as_ref() {
            Some(tip) => tip.height(),
            None => return Ok((0, 0)),
        };

        let mut balance: Amount = 0;
        let mut nonce: u64 = 0;

        for height in 0..=current_height {
            let block = match self.store.get_block_by_height(height)? {
                Some(block) => block,
                None => break,
            };

            for tx in &block.transactions {
                if tx.to == *addr {
                    if tx.is_coinbase() {
                        if is_mature(block.height(), current_height) {
                            balance += tx.amount;
                        }
                    } else {
                        balance += tx.amount;
                    }
                }

                if tx.from == *addr && !tx.is_coinbase() {
                    let debit = tx.amount + tx.fee;
                    // A valid chain can never overdraw; going negative here
                    // means the store is corrupt.
                    balance = balance
                        .checked_sub(debit)
                        .ok_or(BlockChainError::BalanceUnderflow)?;
                    nonce += 1;
                }
            }
        }

        Ok((balance, nonce))
    }

    fn tip_snapshot(&self) -> Option<Block> {
        self.tip.read().expect("tip lock poisoned").clone()
    }
}
