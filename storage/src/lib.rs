pub mod error;
pub mod memstore;
pub mod sleddb;

use anyhow::Result;

use codec::Codec;

pub use memstore::MemStore;
pub use sleddb::SledDB;

/// A typed keyspace: key and value codecs plus the column the entries
/// live in.
pub trait Schema {
    type Key: Codec + Clone;
    type Value: Codec;

    fn column() -> &'static str;
}

/// Thread-safe key/value access for one schema. Writes are durable before
/// the call returns.
pub trait KVStore<S: Schema>: Send + Sync {
    fn get(&self, key: &S::Key) -> Result<Option<S::Value>>;
    fn put(&self, key: S::Key, value: S::Value) -> Result<()>;
    fn delete(&self, key: &S::Key) -> Result<()>;
    fn contains(&self, key: &S::Key) -> Result<bool>;
}
