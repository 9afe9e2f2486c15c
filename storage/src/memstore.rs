use std::collections::{BTreeMap, HashMap};
use std::sync::RwLock;

use anyhow::Result;

use codec::{Decoder, Encoder};

use crate::error::StorageError;
use crate::{KVStore, Schema};

/// In-memory store with the same column layout as the sled backend.
/// Used by tests and throwaway nodes.
#[derive(Debug, Default)]
pub struct MemStore {
    inner: RwLock<HashMap<&'static str, BTreeMap<Vec<u8>, Vec<u8>>>>,
}

impl MemStore {
    pub fn new() -> Self {
        Self::default()
    }
}

impl<S: Schema> KVStore<S> for MemStore {
    fn get(&self, key: &S::Key) -> Result<Option<S::Value>> {
        let store = self.inner.read().map_err(|_| StorageError::RWPoison)?;
        let key = key.encode()?;
        match store.get(S::column()).and_then(|column| column.get(&key)) {
            Some(value) => Ok(Some(S::Value::decode(value)?)),
            None => Ok(None),
        }
    }

    fn put(&self, key: S::Key, value: S::Value) -> Result<()> {
        let mut store = self.inner.write().map_err(|_| StorageError::RWPoison)?;
        let key = key.encode()?;
        let value = value.encode()?;
        store.entry(S::column()).or_default().insert(key, value);
        Ok(())
    }

    fn delete(&self, key: &S::Key) -> Result<()> {
        let mut store = self.inner.write().map_err(|_| StorageError::RWPoison)?;
        let key = key.encode()?;
        if let Some(column) = store.get_mut(S::column()) {
            column.remove(&key);
        }
        Ok(())
    }

    fn contains(&self, key: &S::Key) -> Result<bool> {
        let store = self.inner.read().map_err(|_| StorageError::RWPoison)?;
        let key = key.encode()?;
        Ok(store
            .get(S::column())
            .map(|column| column.contains_key(&key))
            .unwrap_or(false))
    }
}
