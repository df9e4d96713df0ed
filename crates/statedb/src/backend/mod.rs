//! Ordered key/value store abstraction.
//!
//! Two drivers implement [`Backend`]: an in-memory sorted map and an
//! LSM-backed persistent store. Both deliver keys in strict lexicographic
//! order. Instead of stateful bidirectional iterators, the trait exposes
//! key-domain cursor queries (`lower_bound`, `next_above`, `prev_below`);
//! callers hold a position key and re-seek, which stays valid across
//! non-mutating operations by construction.

mod in_memory;
#[cfg(feature = "rocksdb")]
mod rocks;

pub use in_memory::MemoryBackend;
#[cfg(feature = "rocksdb")]
pub use rocks::RocksDbBackend;

use thiserror::Error;

#[derive(Debug, Error)]
pub enum BackendError {
    #[error("database error: {0}")]
    Database(String),
    #[error("corrupt entry: {0}")]
    Corrupt(String),
}

pub type KeyValue = (Vec<u8>, Vec<u8>);

pub trait Backend: Send + Sync {
    fn get(&self, key: &[u8]) -> Result<Option<Vec<u8>>, BackendError>;

    /// Insert or replace.
    fn put(&mut self, key: &[u8], value: &[u8]) -> Result<(), BackendError>;

    /// Delete; no-op when absent.
    fn delete(&mut self, key: &[u8]) -> Result<(), BackendError>;

    /// Number of entries.
    fn len(&self) -> Result<u64, BackendError>;

    fn is_empty(&self) -> Result<bool, BackendError> {
        Ok(self.len()? == 0)
    }

    fn first(&self) -> Result<Option<KeyValue>, BackendError>;

    fn last(&self) -> Result<Option<KeyValue>, BackendError>;

    /// First entry with key ≥ `key`.
    fn lower_bound(&self, key: &[u8]) -> Result<Option<KeyValue>, BackendError>;

    /// First entry with key > `key`.
    fn next_above(&self, key: &[u8]) -> Result<Option<KeyValue>, BackendError>;

    /// Last entry with key < `key`.
    fn prev_below(&self, key: &[u8]) -> Result<Option<KeyValue>, BackendError>;

    /// Remove every entry.
    fn clear(&mut self) -> Result<(), BackendError>;
}
