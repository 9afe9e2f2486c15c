use std::path::Path;

use anyhow::Result;
use sled::Tree;

use codec::{Decoder, Encoder};

use crate::{KVStore, Schema};

/// Durable store backed by sled, one tree per schema column. Every write
/// is flushed before returning so a head pointer never outruns the block
/// it references.
pub struct SledDB {
    inner: sled::Db,
}

impl SledDB {
    pub fn new<P: AsRef<Path>>(path: P) -> Result<Self> {
        let db = sled::open(path)?;
        Ok(Self { inner: db })
    }

    fn column(&self, name: &'static str) -> Result<Tree> {
        self.inner.open_tree(name).map_err(|e| e.into())
    }
}

impl<S: Schema> KVStore<S> for SledDB {
    fn get(&self, key: &S::Key) -> Result<Option<S::Value>> {
        let key = key.encode()?;
        match self.column(S::column())?.get(key)? {
            None => Ok(None),
            Some(raw) => Ok(Some(S::Value::decode(raw.as_ref())?)),
        }
    }

    fn put(&self, key: S::Key, value: S::Value) -> Result<()> {
        let key = key.encode()?;
        let value = value.encode()?;
        let tree = self.column(S::column())?;
        tree.insert(key, value)?;
        tree.flush()?;
        Ok(())
    }

    fn delete(&self, key: &S::Key) -> Result<()> {
        let key = key.encode()?;
        let tree = self.column(S::column())?;
        tree.remove(key)?;
        tree.flush()?;
        Ok(())
    }

    fn contains(&self, key: &S::Key) -> Result<bool> {
        let key = key.encode()?;
        self.column(S::column())?
            .contains_key(key)
            .map_err(|e| e.into())
    }
}
