use anyhow::Result;
use sha2::{Digest, Sha256};

use types::Hash;

use crate::Hasher;

/// Double-SHA-256 hasher. Cheap and stateless, used by tests and
/// low-difficulty networks where the memory-hard variant is overkill.
#[derive(Debug, Default, Clone)]
pub struct Sha256dHasher;

impl Sha256dHasher {
    pub fn new() -> Self {
        Sha256dHasher
    }
}

impl Hasher for Sha256dHasher {
    fn hash(&self, header_bytes: &[u8]) -> Result<Hash> {
        let first = Sha256::digest(header_bytes);
        let second: [u8; 32] = Sha256::digest(first).into();
        Ok(Hash::from(second))
    }
}
