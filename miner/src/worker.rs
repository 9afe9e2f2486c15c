use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::mpsc;
use std::sync::Arc;
use std::time::Duration;

use chrono::Utc;
use tokio::sync::watch;
use tracing::{debug, warn};

use consensus::{meets_difficulty, Hasher};
use mempool::Mempool;
use types::block::{Block, BlockHeader};
use types::tx::Transaction;
use types::{Address, Hash};

/// Upper bound on mempool transactions packed into one template.
const MAX_TEMPLATE_TXS: usize = 1000;

/// How often the coordinator checks for cancellation while workers grind.
const POLL_INTERVAL: Duration = Duration::from_millis(50);

pub enum SearchOutcome {
    Solved { header: BlockHeader, pow_hash: Hash },
    TipChanged,
    Shutdown,
}

/// Builds the header and body for the next block on `parent`: coinbase
/// first, then up to [`MAX_TEMPLATE_TXS`] pool transactions, with a random
/// starting nonce so independent miners cover different nonce ranges.
pub fn build_template(
    parent: &Block,
    difficulty: u64,
    mempool: &Mempool,
    reward_address: Address,
) -> (BlockHeader, Vec<Transaction>) {
    let height = parent.height() + 1;
    let now = Utc::now().timestamp() as u64;
    let timestamp = now.max(parent.header.timestamp + 1);

    let mut txs = vec![Transaction::coinbase(reward_address, height, timestamp)];
    txs.extend(mempool.pending(MAX_TEMPLATE_TXS));

    let header = BlockHeader {
        version: 1,
        height,
        timestamp,
        prev_hash: parent.hash,
        merkle_root: merkle::merkle_root(&txs),
        difficulty,
        nonce: rand::random::<u64>(),
    };

    (header, txs)
}

/// Searches the nonce space with one worker per core. Worker `i` starts at
/// `base + i` and strides by the worker count; the first solution wins and
/// every other worker stops. Cancellation (tip change or shutdown) is
/// honored at least once per hash attempt.
pub fn search(
    hasher: Arc<dyn Hasher>,
    header: BlockHeader,
    shutdown: &AtomicBool,
    tip_rx: &mut watch::Receiver<Option<Block>>,
) -> SearchOutcome {
    let workers = num_cpus::get().max(1);
    let cancel = Arc::new(AtomicBool::new(false));
    let (solved_tx, solved_rx) = mpsc::sync_channel::<(u64, Hash)>(1);

    let base_nonce = header.nonce;
    let handles: Vec<_> = (0..workers)
        .map(|i| {
            let hasher = hasher.clone();
            let cancel = cancel.clone();
            let solved_tx = solved_tx.clone();
            let mut header = header;
            header.nonce = base_nonce.wrapping_add(i as u64);

            std::thread::spawn(move || loop {
                if cancel.load(Ordering::Acquire) {
                    return;
                }

                let pow = match hasher.hash(&header.encode_bytes()) {
                    Ok(pow) => pow,
                    Err(err) => {
                        warn!(%err, "hasher failed during search");
                        return;
                    }
                };

                if meets_difficulty(&pow, header.difficulty) {
                    // Single-winner handoff: the channel holds one slot and
                    // later solutions are simply dropped.
                    let _ = solved_tx.try_send((header.nonce, pow));
                    cancel.store(true, Ordering::Release);
                    return;
                }

                header.nonce = header.nonce.wrapping_add(workers as u64);
            })
        })
        .collect();
    drop(solved_tx);

    let outcome = loop {
        match solved_rx.recv_timeout(POLL_INTERVAL) {
            Ok((nonce, pow_hash)) => {
                let mut solved = header;
                solved.nonce = nonce;
                break SearchOutcome::Solved {
                    header: solved,
                    pow_hash,
                };
            }
            Err(mpsc::RecvTimeoutError::Timeout) => {
                if shutdown.load(Ordering::Acquire) {
                    break SearchOutcome::Shutdown;
                }
                if tip_rx.has_changed().unwrap_or(false) {
                    debug!("tip changed, restarting search");
                    break SearchOutcome::TipChanged;
                }
            }
            Err(mpsc::RecvTimeoutError::Disconnected) => {
                // All workers bailed out without a solution.
                break SearchOutcome::Shutdown;
            }
        }
    };

    cancel.store(true, Ordering::Release);
    for handle in handles {
        let _ = handle.join();
    }

    outcome
}
