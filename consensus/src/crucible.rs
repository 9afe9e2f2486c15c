//! The crucible hasher: a seed-keyed, memory-hard proof-of-work hash.
//!
//! A light cache is expanded from the seed by chained SHA-512. Each hash
//! walks a much larger virtual dataset whose items derive from the cache;
//! full-dataset mode materializes that dataset once so miners pay a single
//! up-front cost instead of recomputing items in the hot loop. Validators
//! keep only the cache.

use std::sync::{Arc, RwLock};

use anyhow::Result;
use sha2::{Digest, Sha256, Sha512};

use types::Hash;

use crate::Hasher;

const ITEM_LEN: usize = 64;

/// Cache entries: 32768 * 64 B = 2 MiB.
const CACHE_ITEMS: usize = 1 << 15;

/// Virtual dataset entries: 1Mi * 64 B = 64 MiB when materialized.
const DATASET_ITEMS: u64 = 1 << 20;

/// Dataset reads mixed into every hash.
const MIX_ROUNDS: usize = 8;

type Item = [u8; ITEM_LEN];

pub struct CrucibleHasher {
    cache: Vec<Item>,
    dataset: RwLock<Option<Arc<Vec<Item>>>>,
}

impl CrucibleHasher {
    /// Builds the hasher for the given seed. With `full_dataset` the whole
    /// dataset is precomputed for miner-grade throughput; without it items
    /// are derived from the cache on demand.
    pub fn new(seed: &[u8], full_dataset: bool) -> Self {
        let cache = build_cache(seed);
        let dataset = if full_dataset {
            let items = (0..DATASET_ITEMS).map(|i| dataset_item(&cache, i)).collect();
            Some(Arc::new(items))
        } else {
            None
        };
        CrucibleHasher {
            cache,
            dataset: RwLock::new(dataset),
        }
    }

    fn item(&self, index: u64, dataset: Option<&Arc<Vec<Item>>>) -> Item {
        match dataset {
            Some(items) => items[index as usize],
            None => dataset_item(&self.cache, index),
        }
    }
}

impl Hasher for CrucibleHasher {
    fn hash(&self, header_bytes: &[u8]) -> Result<Hash> {
        let dataset = self
            .dataset
            .read()
            .map_err(|_| anyhow::anyhow!("crucible dataset lock poisoned"))?
            .clone();

        let mut state: Item = Sha512::digest(header_bytes).into();
        for _ in 0..MIX_ROUNDS {
            let index = u64::from_be_bytes(state[..8].try_into()?) % DATASET_ITEMS;
            let item = self.item(index, dataset.as_ref());
            for (s, i) in state.iter_mut().zip(item.iter()) {
                *s ^= i;
            }
            state = Sha512::digest(state).into();
        }

        let out: [u8; 32] = Sha256::digest(state).into();
        Ok(Hash::from(out))
    }

    /// Drops the materialized dataset. The hasher stays usable in
    /// cache-only mode afterwards.
    fn close(&self) {
        if let Ok(mut dataset) = self.dataset.write() {
            *dataset = None;
        }
    }
}

fn build_cache(seed: &[u8]) -> Vec<Item> {
    let mut cache = Vec::with_capacity(CACHE_ITEMS);
    let mut item: Item = Sha512::digest(seed).into();
    for _ in 0..CACHE_ITEMS {
        cache.push(item);
        item = Sha512::digest(item).into();
    }
    cache
}

fn dataset_item(cache: &[Item], index: u64) -> Item {
    let base = cache[(index as usize) % cache.len()];
    let mut hasher = Sha512::new();
    hasher.update(base);
    hasher.update(index.to_be_bytes());
    hasher.finalize().into()
}
