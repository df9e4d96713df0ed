use std::path::Path;

use rocksdb::{ColumnFamilyDescriptor, DBRawIterator, Options, DB};

use super::{Backend, BackendError, KeyValue};

const STATE_CF: &str = "state";
const META_CF: &str = "meta";
const ENTRY_COUNT_KEY: &[u8] = b"entry_count";

/// LSM-backed persistent driver.
///
/// Entries live in the `state` column family; bookkeeping (the entry count)
/// in `meta`. All cursor queries run on fresh raw iterators, so a position
/// key re-seeks against the current view of the store.
pub struct RocksDbBackend {
    db: DB,
    entry_count: u64,
}

impl From<rocksdb::Error> for BackendError {
    fn from(e: rocksdb::Error) -> Self {
        BackendError::Database(e.to_string())
    }
}

impl RocksDbBackend {
    pub fn open(path: impl AsRef<Path>) -> Result<Self, BackendError> {
        let mut opts = Options::default();
        opts.create_if_missing(true);
        opts.create_missing_column_families(true);
        opts.increase_parallelism(4);

        let cfs = vec![
            ColumnFamilyDescriptor::new(STATE_CF, Options::default()),
            ColumnFamilyDescriptor::new(META_CF, Options::default()),
        ];
        let db = DB::open_cf_descriptors(&opts, path, cfs)?;

        let entry_count = {
            let meta = db
                .cf_handle(META_CF)
                .ok_or_else(|| BackendError::Database("missing meta column family".into()))?;
            match db.get_cf(&meta, ENTRY_COUNT_KEY)? {
                Some(raw) => u64::from_be_bytes(
                    raw.as_slice()
                        .try_into()
                        .map_err(|_| BackendError::Corrupt("entry count must be 8 bytes".into()))?,
                ),
                None => 0,
            }
        };

        Ok(Self { db, entry_count })
    }

    fn state_cf(&self) -> &rocksdb::ColumnFamily {
        // The column family is created in open(); the handle cannot go away.
        self.db.cf_handle(STATE_CF).expect("state column family")
    }

    fn set_entry_count(&mut self, count: u64) -> Result<(), BackendError> {
        let meta = self.db.cf_handle(META_CF).expect("meta column family");
        self.db.put_cf(&meta, ENTRY_COUNT_KEY, count.to_be_bytes())?;
        self.entry_count = count;
        Ok(())
    }

    fn entry(iter: &DBRawIterator<'_>) -> Option<KeyValue> {
        match (iter.key(), iter.value()) {
            (Some(k), Some(v)) => Some((k.to_vec(), v.to_vec())),
            _ => None,
        }
    }
}

impl Backend for RocksDbBackend {
    fn get(&self, key: &[u8]) -> Result<Option<Vec<u8>>, BackendError> {
        Ok(self.db.get_cf(self.state_cf(), key)?)
    }

    fn put(&mut self, key: &[u8], value: &[u8]) -> Result<(), BackendError> {
        let fresh = self.db.get_cf(self.state_cf(), key)?.is_none();
        self.db.put_cf(self.state_cf(), key, value)?;
        if fresh {
            self.set_entry_count(self.entry_count + 1)?;
        }
        Ok(())
    }

    fn delete(&mut self, key: &[u8]) -> Result<(), BackendError> {
        if self.db.get_cf(self.state_cf(), key)?.is_none() {
            return Ok(());
        }
        self.db.delete_cf(self.state_cf(), key)?;
        self.set_entry_count(self.entry_count - 1)?;
        Ok(())
    }

    fn len(&self) -> Result<u64, BackendError> {
        Ok(self.entry_count)
    }

    fn first(&self) -> Result<Option<KeyValue>, BackendError> {
        let mut iter = self.db.raw_iterator_cf(self.state_cf());
        iter.seek_to_first();
        Ok(Self::entry(&iter))
    }

    fn last(&self) -> Result<Option<KeyValue>, BackendError> {
        let mut iter = self.db.raw_iterator_cf(self.state_cf());
        iter.seek_to_last();
        Ok(Self::entry(&iter))
    }

    fn lower_bound(&self, key: &[u8]) -> Result<Option<KeyValue>, BackendError> {
        let mut iter = self.db.raw_iterator_cf(self.state_cf());
        iter.seek(key);
        Ok(Self::entry(&iter))
    }

    fn next_above(&self, key: &[u8]) -> Result<Option<KeyValue>, BackendError> {
        let mut iter = self.db.raw_iterator_cf(self.state_cf());
        iter.seek(key);
        if iter.valid() && iter.key() == Some(key) {
            iter.next();
        }
        Ok(Self::entry(&iter))
    }

    fn prev_below(&self, key: &[u8]) -> Result<Option<KeyValue>, BackendError> {
        let mut iter = self.db.raw_iterator_cf(self.state_cf());
        iter.seek_for_prev(key);
        if iter.valid() && iter.key() == Some(key) {
            iter.prev();
        }
        Ok(Self::entry(&iter))
    }

    fn clear(&mut self) -> Result<(), BackendError> {
        let keys: Vec<Vec<u8>> = {
            let mut iter = self.db.raw_iterator_cf(self.state_cf());
            iter.seek_to_first();
            let mut keys = Vec::new();
            while iter.valid() {
                if let Some(k) = iter.key() {
                    keys.push(k.to_vec());
                }
                iter.next();
            }
            keys
        };
        let mut batch = rocksdb::WriteBatch::default();
        for key in keys {
            batch.delete_cf(self.state_cf(), key);
        }
        self.db.write(batch)?;
        self.set_entry_count(0)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::backend::contract_tests;

    #[test]
    fn rocksdb_backend_contract() {
        let dir = tempfile::tempdir().unwrap();
        let mut backend = RocksDbBackend::open(dir.path()).unwrap();
        contract_tests::ordered_traversal(&mut backend);
    }

    #[test]
    fn entry_count_survives_reopen() {
        let dir = tempfile::tempdir().unwrap();
        {
            let mut backend = RocksDbBackend::open(dir.path()).unwrap();
            backend.put(b"a", b"1").unwrap();
            backend.put(b"b", b"2").unwrap();
        }
        let backend = RocksDbBackend::open(dir.path()).unwrap();
        assert_eq!(backend.len().unwrap(), 2);
        assert_eq!(backend.get(b"a").unwrap().unwrap(), b"1");
    }
}
