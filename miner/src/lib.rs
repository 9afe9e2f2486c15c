pub mod worker;

use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::{Arc, Mutex};
use std::thread::JoinHandle;
use std::time::Duration;

use tokio::sync::mpsc::UnboundedSender;
use tracing::{info, warn};

use blockchain::Chain;
use consensus::{next_required_difficulty, Hasher};
use mempool::Mempool;
use types::events::LocalEvent;
use types::Address;

use crate::worker::{build_template, search, SearchOutcome};

/// Drives the mining loop: build a template on the current tip, search the
/// nonce space across all cores, submit the solution, repeat. A tip change
/// aborts the in-flight search so work always extends the newest head.
pub struct Miner {
    chain: Arc<Chain>,
    hasher: Arc<dyn Hasher>,
    mempool: Arc<Mempool>,
    reward_address: Address,
    events: UnboundedSender<LocalEvent>,
    shutdown: Arc<AtomicBool>,
    handle: Mutex<Option<JoinHandle<()>>>,
}

impl Miner {
    pub fn new(
        chain: Arc<Chain>,
        hasher: Arc<dyn Hasher>,
        mempool: Arc<Mempool>,
        reward_address: Address,
        events: UnboundedSender<LocalEvent>,
    ) -> Self {
        Miner {
            chain,
            hasher,
            mempool,
            reward_address,
            events,
            shutdown: Arc::new(AtomicBool::new(false)),
            handle: Mutex::new(None),
        }
    }

    pub fn start(&self) {
        let chain = self.chain.clone();
        let hasher = self.hasher.clone();
        let mempool = self.mempool.clone();
        let reward_address = self.reward_address;
        let events = self.events.clone();
        let shutdown = self.shutdown.clone();

        info!(threads = num_cpus::get(), miner = %reward_address, "miner started");
        let handle = std::thread::spawn(move || {
            mining_loop(chain, hasher, mempool, reward_address, events, shutdown);
        });
        *self.handle.lock().expect("miner handle lock poisoned") = Some(handle);
    }

    pub fn stop(&self) {
        self.shutdown.store(true, Ordering::Release);
        if let Some(handle) = self.handle.lock().expect("miner handle lock poisoned").take() {
            let _ = handle.join();
        }
        info!("miner stopped");
    }
}

fn mining_loop(
    chain: Arc<Chain>,
    hasher: Arc<dyn Hasher>,
    mempool: Arc<Mempool>,
    reward_address: Address,
    events: UnboundedSender<LocalEvent>,
    shutdown: Arc<AtomicBool>,
) {
    let mut tip_rx = chain.subscribe_tip();

    while !shutdown.load(Ordering::Acquire) {
        let parent = match chain.tip() {
            Some(parent) => parent,
            None => {
                std::thread::sleep(Duration::from_millis(200));
                continue;
            }
        };

        let difficulty = match next_required_difficulty(Some(&parent), |height| {
            chain.get_block_by_height(height)
        }) {
            Ok(difficulty) => difficulty,
            Err(err) => {
                warn!(%err, "failed to compute required difficulty");
                std::thread::sleep(Duration::from_secs(1));
                continue;
            }
        };

        let (header, txs) = build_template(&parent, difficulty, &mempool, reward_address);

        // Anything announced before this point belongs to the template we
        // are about to mine on; clear the flag so only later tips abort.
        tip_rx.borrow_and_update();

        match search(hasher.clone(), header, &shutdown, &mut tip_rx) {
            SearchOutcome::Solved { header, pow_hash } => {
                let block = types::block::Block {
                    hash: header.hash(),
                    pow_hash,
                    header,
                    transactions: txs,
                };

                info!(
                    height = block.height(),
                    hash = %block.hash,
                    txs = block.transactions.len(),
                    "mined new block"
                );

                if let Err(err) = chain.add_block(block.clone()) {
                    warn!(%err, "failed to add mined block");
                    continue;
                }

                let _ = events.send(LocalEvent::MinedBlock(block.clone()));
                mempool.remove_transactions(&block.transactions[1..]);
            }
            SearchOutcome::TipChanged => continue,
            SearchOutcome::Shutdown => return,
        }
    }
}
