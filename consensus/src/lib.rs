pub mod constants;
pub mod crucible;
pub mod difficulty;
pub mod pow;
pub mod sha256d;

use std::sync::Arc;

use anyhow::Result;

use types::Hash;

pub use crucible::CrucibleHasher;
pub use difficulty::next_required_difficulty;
pub use pow::meets_difficulty;
pub use sha256d::Sha256dHasher;

/// Proof-of-work hash over the 100-byte header encoding.
///
/// Implementations must be deterministic for a given seed. `close` releases
/// any heavyweight state (the crucible dataset); it is a no-op for cheap
/// variants.
pub trait Hasher: Send + Sync {
    fn hash(&self, header_bytes: &[u8]) -> Result<Hash>;

    fn close(&self) {}
}

/// Builds the production hasher. `full_dataset` trades memory for miner
/// throughput and should be set only when the node mines.
pub fn new_hasher(seed: &[u8], full_dataset: bool) -> Arc<dyn Hasher> {
    Arc::new(CrucibleHasher::new(seed, full_dataset))
}
