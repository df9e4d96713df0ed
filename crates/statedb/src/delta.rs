//! One mutation layer of the state tree.
//!
//! A delta holds the writes and tombstones a single candidate block (or an
//! anonymous speculative node) applies on top of its parent. The root delta
//! has no parent and is backed by the database's persistent store; every
//! other delta keeps its writes in its own in-memory backend.

use std::collections::BTreeSet;
use std::ops::Bound;
use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::{Arc, RwLock};

use arbor_common::Multihash;

use crate::backend::{Backend, KeyValue, MemoryBackend};
use crate::error::StateDbError;

/// Outcome of a local (single-layer) lookup.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum DeltaEntry {
    Present(Vec<u8>),
    Deleted,
    NotHere,
}

struct DeltaInner {
    backend: Box<dyn Backend>,
    tombstones: BTreeSet<Vec<u8>>,
}

pub struct StateDelta {
    id: Multihash,
    revision: u64,
    finalized: AtomicBool,
    parent: RwLock<Option<Arc<StateDelta>>>,
    inner: RwLock<DeltaInner>,
}

impl StateDelta {
    /// The root delta, backed by the persistent store. Roots are born
    /// finalized; writes only reach them through commit squashing.
    pub fn root(id: Multihash, revision: u64, backend: Box<dyn Backend>) -> Arc<Self> {
        Arc::new(Self {
            id,
            revision,
            finalized: AtomicBool::new(true),
            parent: RwLock::new(None),
            inner: RwLock::new(DeltaInner {
                backend,
                tombstones: BTreeSet::new(),
            }),
        })
    }

    /// A writable child layer carrying `id` at `parent.revision + 1`.
    pub fn child(self: &Arc<Self>, id: Multihash) -> Arc<Self> {
        Arc::new(Self {
            id,
            revision: self.revision + 1,
            finalized: AtomicBool::new(false),
            parent: RwLock::new(Some(Arc::clone(self))),
            inner: RwLock::new(DeltaInner {
                backend: Box::new(MemoryBackend::new()),
                tombstones: BTreeSet::new(),
            }),
        })
    }

    /// An anonymous child: same id and revision as its parent, used for
    /// speculative work that may be replayed into the parent.
    pub fn anonymous_child(self: &Arc<Self>) -> Arc<Self> {
        Arc::new(Self {
            id: self.id.clone(),
            revision: self.revision,
            finalized: AtomicBool::new(false),
            parent: RwLock::new(Some(Arc::clone(self))),
            inner: RwLock::new(DeltaInner {
                backend: Box::new(MemoryBackend::new()),
                tombstones: BTreeSet::new(),
            }),
        })
    }

    pub fn id(&self) -> &Multihash {
        &self.id
    }

    pub fn revision(&self) -> u64 {
        self.revision
    }

    pub fn parent(&self) -> Option<Arc<StateDelta>> {
        self.parent.read().expect("delta parent lock").clone()
    }

    pub fn is_root(&self) -> bool {
        self.parent.read().expect("delta parent lock").is_none()
    }

    pub fn is_finalized(&self) -> bool {
        self.finalized.load(Ordering::Acquire)
    }

    /// Idempotent.
    pub fn finalize(&self) {
        self.finalized.store(true, Ordering::Release);
    }

    pub fn put(&self, key: &[u8], value: &[u8]) -> Result<(), StateDbError> {
        if self.is_finalized() {
            return Err(StateDbError::NodeFinalized);
        }
        let mut inner = self.inner.write().expect("delta lock");
        inner.tombstones.remove(key);
        inner.backend.put(key, value)?;
        Ok(())
    }

    pub fn erase(&self, key: &[u8]) -> Result<(), StateDbError> {
        if self.is_finalized() {
            return Err(StateDbError::NodeFinalized);
        }
        let is_root = self.is_root();
        let mut inner = self.inner.write().expect("delta lock");
        inner.backend.delete(key)?;
        if !is_root {
            inner.tombstones.insert(key.to_vec());
        }
        Ok(())
    }

    /// Look the key up in this layer only.
    pub fn entry(&self, key: &[u8]) -> Result<DeltaEntry, StateDbError> {
        let inner = self.inner.read().expect("delta lock");
        if inner.tombstones.contains(key) {
            return Ok(DeltaEntry::Deleted);
        }
        match inner.backend.get(key)? {
            Some(value) => Ok(DeltaEntry::Present(value)),
            None => Ok(DeltaEntry::NotHere),
        }
    }

    /// Smallest key this layer mentions (write or tombstone) strictly above
    /// `after`, or the smallest mention at all when `after` is `None`.
    pub fn next_mention(&self, after: Option<&[u8]>) -> Result<Option<Vec<u8>>, StateDbError> {
        let inner = self.inner.read().expect("delta lock");
        let from_backend = match after {
            Some(key) => inner.backend.next_above(key)?,
            None => inner.backend.first()?,
        }
        .map(|(k, _)| k);
        let from_tombstones = match after {
            Some(key) => inner
                .tombstones
                .range::<[u8], _>((Bound::Excluded(key), Bound::Unbounded))
                .next()
                .cloned(),
            None => inner.tombstones.iter().next().cloned(),
        };
        Ok(match (from_backend, from_tombstones) {
            (Some(a), Some(b)) => Some(a.min(b)),
            (a, b) => a.or(b),
        })
    }

    /// Mirror of [`next_mention`] toward smaller keys.
    pub fn prev_mention(&self, before: Option<&[u8]>) -> Result<Option<Vec<u8>>, StateDbError> {
        let inner = self.inner.read().expect("delta lock");
        let from_backend = match before {
            Some(key) => inner.backend.prev_below(key)?,
            None => inner.backend.last()?,
        }
        .map(|(k, _)| k);
        let from_tombstones = match before {
            Some(key) => inner
                .tombstones
                .range::<[u8], _>((Bound::Unbounded, Bound::Excluded(key)))
                .next_back()
                .cloned(),
            None => inner.tombstones.iter().next_back().cloned(),
        };
        Ok(match (from_backend, from_tombstones) {
            (Some(a), Some(b)) => Some(a.max(b)),
            (a, b) => a.or(b),
        })
    }

    /// Every local write, in key order.
    pub fn local_writes(&self) -> Result<Vec<KeyValue>, StateDbError> {
        let inner = self.inner.read().expect("delta lock");
        let mut out = Vec::new();
        let mut cursor = inner.backend.first()?;
        while let Some((key, value)) = cursor {
            cursor = inner.backend.next_above(&key)?;
            out.push((key, value));
        }
        Ok(out)
    }

    /// Every local tombstone, in key order.
    pub fn local_tombstones(&self) -> Vec<Vec<u8>> {
        let inner = self.inner.read().expect("delta lock");
        inner.tombstones.iter().cloned().collect()
    }

    /// Apply this layer's tombstones and writes to `target`.
    pub fn squash_into(&self, target: &mut dyn Backend) -> Result<(), StateDbError> {
        for key in self.local_tombstones() {
            target.delete(&key)?;
        }
        for (key, value) in self.local_writes()? {
            target.put(&key, &value)?;
        }
        Ok(())
    }

    /// Detach the persistent backend, leaving an empty in-memory one behind.
    pub(crate) fn take_backend(&self) -> Box<dyn Backend> {
        let mut inner = self.inner.write().expect("delta lock");
        std::mem::replace(&mut inner.backend, Box::new(MemoryBackend::new()))
    }

    /// Turn this delta into the new root over `backend`: the squashed chain
    /// is already inside it, so local bookkeeping is dropped.
    pub(crate) fn rebase_as_root(&self, backend: Box<dyn Backend>) {
        let mut inner = self.inner.write().expect("delta lock");
        inner.backend = backend;
        inner.tombstones.clear();
        *self.parent.write().expect("delta parent lock") = None;
        self.finalized.store(true, Ordering::Release);
    }

    /// Direct read access to the backing store of a root delta.
    pub(crate) fn backend_get(&self, key: &[u8]) -> Result<Option<Vec<u8>>, StateDbError> {
        let inner = self.inner.read().expect("delta lock");
        Ok(inner.backend.get(key)?)
    }

    /// Direct write access to the backing store, bypassing the finalized
    /// check. Reserved for database bookkeeping on the root.
    pub(crate) fn backend_put(&self, key: &[u8], value: &[u8]) -> Result<(), StateDbError> {
        let mut inner = self.inner.write().expect("delta lock");
        inner.backend.put(key, value)?;
        Ok(())
    }

    pub(crate) fn backend_clear(&self) -> Result<(), StateDbError> {
        let mut inner = self.inner.write().expect("delta lock");
        inner.backend.clear()?;
        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use arbor_common::multihash::SHA2_256;

    fn root() -> Arc<StateDelta> {
        StateDelta::root(
            Multihash::zero(SHA2_256),
            0,
            Box::new(MemoryBackend::new()),
        )
    }

    #[test]
    fn finalized_delta_rejects_mutation() {
        let child = root().child(Multihash::sha2_256(b"1"));
        child.put(b"k", b"v").unwrap();
        child.finalize();
        assert!(matches!(
            child.put(b"k", b"w"),
            Err(StateDbError::NodeFinalized)
        ));
        assert!(matches!(
            child.erase(b"k"),
            Err(StateDbError::NodeFinalized)
        ));
        // Finalize is idempotent.
        child.finalize();
        assert!(child.is_finalized());
    }

    #[test]
    fn put_then_erase_leaves_tombstone() {
        let child = root().child(Multihash::sha2_256(b"1"));
        child.put(b"k", b"v").unwrap();
        child.erase(b"k").unwrap();
        assert_eq!(child.entry(b"k").unwrap(), DeltaEntry::Deleted);
        // A new write clears the tombstone.
        child.put(b"k", b"w").unwrap();
        assert_eq!(
            child.entry(b"k").unwrap(),
            DeltaEntry::Present(b"w".to_vec())
        );
    }

    #[test]
    fn mentions_cover_writes_and_tombstones() {
        let child = root().child(Multihash::sha2_256(b"1"));
        child.put(b"b", b"1").unwrap();
        child.erase(b"d").unwrap();
        assert_eq!(child.next_mention(None).unwrap().unwrap(), b"b");
        assert_eq!(child.next_mention(Some(b"b")).unwrap().unwrap(), b"d");
        assert_eq!(child.next_mention(Some(b"d")).unwrap(), None);
        assert_eq!(child.prev_mention(None).unwrap().unwrap(), b"d");
        assert_eq!(child.prev_mention(Some(b"d")).unwrap().unwrap(), b"b");
    }

    #[test]
    fn squash_applies_tombstones_then_writes() {
        let mut target = MemoryBackend::new();
        target.put(b"a", b"old").unwrap();
        target.put(b"b", b"old").unwrap();

        let child = root().child(Multihash::sha2_256(b"1"));
        child.erase(b"a").unwrap();
        child.put(b"b", b"new").unwrap();
        child.squash_into(&mut target).unwrap();

        assert_eq!(target.get(b"a").unwrap(), None);
        assert_eq!(target.get(b"b").unwrap().unwrap(), b"new");
    }

    #[test]
    fn anonymous_child_shares_identity() {
        let child = root().child(Multihash::sha2_256(b"1"));
        let anon = child.anonymous_child();
        assert_eq!(anon.id(), child.id());
        assert_eq!(anon.revision(), child.revision());
    }
}
