use std::collections::BTreeMap;
use std::ops::Bound;

use super::{Backend, BackendError, KeyValue};

/// Sorted-map driver. Used for every non-root delta and for in-memory
/// databases in tests and tooling.
#[derive(Debug, Default)]
pub struct MemoryBackend {
    map: BTreeMap<Vec<u8>, Vec<u8>>,
}

impl MemoryBackend {
    pub fn new() -> Self {
        Self::default()
    }
}

fn cloned(entry: Option<(&Vec<u8>, &Vec<u8>)>) -> Option<KeyValue> {
    entry.map(|(k, v)| (k.clone(), v.clone()))
}

impl Backend for MemoryBackend {
    fn get(&self, key: &[u8]) -> Result<Option<Vec<u8>>, BackendError> {
        Ok(self.map.get(key).cloned())
    }

    fn put(&mut self, key: &[u8], value: &[u8]) -> Result<(), BackendError> {
        self.map.insert(key.to_vec(), value.to_vec());
        Ok(())
    }

    fn delete(&mut self, key: &[u8]) -> Result<(), BackendError> {
        self.map.remove(key);
        Ok(())
    }

    fn len(&self) -> Result<u64, BackendError> {
        Ok(self.map.len() as u64)
    }

    fn first(&self) -> Result<Option<KeyValue>, BackendError> {
        Ok(cloned(self.map.iter().next()))
    }

    fn last(&self) -> Result<Option<KeyValue>, BackendError> {
        Ok(cloned(self.map.iter().next_back()))
    }

    fn lower_bound(&self, key: &[u8]) -> Result<Option<KeyValue>, BackendError> {
        Ok(cloned(
            self.map
                .range::<[u8], _>((Bound::Included(key), Bound::Unbounded))
                .next(),
        ))
    }

    fn next_above(&self, key: &[u8]) -> Result<Option<KeyValue>, BackendError> {
        Ok(cloned(
            self.map
                .range::<[u8], _>((Bound::Excluded(key), Bound::Unbounded))
                .next(),
        ))
    }

    fn prev_below(&self, key: &[u8]) -> Result<Option<KeyValue>, BackendError> {
        Ok(cloned(
            self.map
                .range::<[u8], _>((Bound::Unbounded, Bound::Excluded(key)))
                .next_back(),
        ))
    }

    fn clear(&mut self) -> Result<(), BackendError> {
        self.map.clear();
        Ok(())
    }
}
