//! The fork database: a tree of state nodes rooted at the committed state.

use std::collections::{BTreeSet, HashMap};
use std::sync::{Arc, Mutex};

use arbor_common::multihash::SHA2_256;
use arbor_common::Multihash;
use borsh::{BorshDeserialize, BorshSerialize};
use tracing::{debug, info};

use crate::backend::{Backend, MemoryBackend};
use crate::delta::StateDelta;
use crate::error::StateDbError;
use crate::keys::{self, ObjectSpace};
use crate::node::StateNode;

/// Persistent record of the committed root, stored in the metadata space.
#[derive(BorshSerialize, BorshDeserialize)]
struct RootDescriptor {
    id: Multihash,
    revision: u64,
}

fn root_descriptor_key() -> Vec<u8> {
    keys::state_key(&ObjectSpace::metadata(), keys::ROOT_DESCRIPTOR)
}

struct Inner {
    root: Arc<StateDelta>,
    index: HashMap<Multihash, Arc<StateDelta>>,
    children: HashMap<Multihash, BTreeSet<Multihash>>,
    /// Finalized fork heads ranked by `(revision, id)`; the greatest element
    /// is the preferred head.
    heads: BTreeSet<(u64, Multihash)>,
    head: Multihash,
}

/// Tree of candidate states.
///
/// All tree mutations are serialized under one mutex. Handles returned to
/// callers are reference-counted; a node removed from the index stays
/// readable through handles already held, but `get_node` no longer returns
/// it.
pub struct StateDb {
    inner: Mutex<Inner>,
}

impl StateDb {
    /// Open over an in-memory backend. State does not survive the process.
    pub fn in_memory() -> Result<Self, StateDbError> {
        Self::with_backend(Box::new(MemoryBackend::new()))
    }

    /// Open the persistent database at `path`, verifying the recorded root.
    #[cfg(feature = "rocksdb")]
    pub fn open(path: impl AsRef<std::path::Path>) -> Result<Self, StateDbError> {
        Self::with_backend(Box::new(crate::backend::RocksDbBackend::open(path)?))
    }

    /// Build the tree containing only the root recorded in `backend`.
    pub fn with_backend(mut backend: Box<dyn Backend>) -> Result<Self, StateDbError> {
        let key = root_descriptor_key();
        let descriptor = match backend.get(&key)? {
            Some(raw) => RootDescriptor::try_from_slice(&raw)
                .map_err(|e| StateDbError::CorruptRoot(e.to_string()))?,
            None => {
                let descriptor = RootDescriptor {
                    id: Multihash::zero(SHA2_256),
                    revision: 0,
                };
                backend.put(&key, &borsh::to_vec(&descriptor).unwrap_or_default())?;
                descriptor
            }
        };
        info!(root = %descriptor.id, revision = descriptor.revision, "opening state database");

        let root = StateDelta::root(descriptor.id.clone(), descriptor.revision, backend);
        let mut index = HashMap::new();
        index.insert(descriptor.id.clone(), Arc::clone(&root));
        let mut heads = BTreeSet::new();
        heads.insert((descriptor.revision, descriptor.id.clone()));

        Ok(Self {
            inner: Mutex::new(Inner {
                root,
                index,
                children: HashMap::new(),
                heads,
                head: descriptor.id,
            }),
        })
    }

    fn lock(&self) -> std::sync::MutexGuard<'_, Inner> {
        self.inner.lock().expect("state database lock")
    }

    /// Create an unfinalized child of `parent_id` carrying `new_id`.
    ///
    /// Returns `None` when the parent is unknown, the id already exists, or
    /// the parent is not finalized.
    pub fn create_writable_node(
        &self,
        parent_id: &Multihash,
        new_id: &Multihash,
    ) -> Option<StateNode> {
        let mut inner = self.lock();
        if inner.index.contains_key(new_id) {
            return None;
        }
        let parent = inner.index.get(parent_id)?.clone();
        if !parent.is_finalized() {
            return None;
        }
        let child = parent.child(new_id.clone());
        inner.index.insert(new_id.clone(), Arc::clone(&child));
        inner
            .children
            .entry(parent_id.clone())
            .or_default()
            .insert(new_id.clone());
        debug!(parent = %parent_id, id = %new_id, revision = child.revision(), "created writable node");
        Some(StateNode::new(child))
    }

    /// Finalize a node and re-evaluate head and fork heads.
    pub fn finalize_node(&self, id: &Multihash) -> Result<(), StateDbError> {
        let mut inner = self.lock();
        let delta = inner
            .index
            .get(id)
            .cloned()
            .ok_or_else(|| StateDbError::UnknownNode(id.clone()))?;
        delta.finalize();
        inner.heads.insert((delta.revision(), id.clone()));
        if let Some(parent) = delta.parent() {
            inner
                .heads
                .remove(&(parent.revision(), parent.id().clone()));
        }
        Self::refresh_head(&mut inner);
        Ok(())
    }

    pub fn get_node(&self, id: &Multihash) -> Option<StateNode> {
        let inner = self.lock();
        inner.index.get(id).map(|delta| StateNode::new(Arc::clone(delta)))
    }

    /// The unique ancestor of the head with the given revision.
    pub fn get_node_at_revision(&self, revision: u64) -> Option<StateNode> {
        let inner = self.lock();
        let mut delta = Arc::clone(inner.index.get(&inner.head)?);
        loop {
            if delta.revision() == revision {
                return Some(StateNode::new(delta));
            }
            if delta.revision() < revision {
                return None;
            }
            delta = delta.parent()?;
        }
    }

    pub fn get_head(&self) -> StateNode {
        let inner = self.lock();
        let delta = inner.index.get(&inner.head).expect("head is indexed");
        StateNode::new(Arc::clone(delta))
    }

    pub fn get_root(&self) -> StateNode {
        let inner = self.lock();
        StateNode::new(Arc::clone(&inner.root))
    }

    /// The finalized nodes with no finalized children, ranked worst to best.
    pub fn get_fork_heads(&self) -> Vec<StateNode> {
        let inner = self.lock();
        inner
            .heads
            .iter()
            .filter_map(|(_, id)| inner.index.get(id))
            .map(|delta| StateNode::new(Arc::clone(delta)))
            .collect()
    }

    /// Collapse `root..=id` into the backing store and install `id` as the
    /// new root. Branches not descending from the new root are pruned.
    pub fn commit_node(&self, id: &Multihash) -> Result<(), StateDbError> {
        let mut inner = self.lock();
        let target = inner
            .index
            .get(id)
            .cloned()
            .ok_or_else(|| StateDbError::UnknownNode(id.clone()))?;
        if inner.root.id() == id {
            return Ok(());
        }
        if !target.is_finalized() {
            return Err(StateDbError::NotFinalized);
        }

        // Chain from the delta below the root down to the target, oldest
        // first, so newer layers overwrite older ones in the squash.
        let mut chain = Vec::new();
        let mut current = Arc::clone(&target);
        while !current.is_root() {
            let parent = current.parent().expect("non-root delta has a parent");
            chain.push(current);
            current = parent;
        }
        chain.reverse();

        let mut backend = inner.root.take_backend();
        for delta in &chain {
            delta.squash_into(backend.as_mut())?;
        }
        target.rebase_as_root(backend);

        // Prune everything that does not descend from the new root.
        let keep = Self::subtree_of(&inner.children, id);
        inner.index.retain(|node_id, _| keep.contains(node_id));
        inner.children.retain(|node_id, _| keep.contains(node_id));
        inner.heads.retain(|(_, node_id)| keep.contains(node_id));
        inner.root = Arc::clone(&target);
        if !keep.contains(&inner.head) {
            Self::refresh_head(&mut inner);
        }

        let descriptor = RootDescriptor {
            id: id.clone(),
            revision: target.revision(),
        };
        target.backend_put(
            &root_descriptor_key(),
            &borsh::to_vec(&descriptor).unwrap_or_default(),
        )?;
        info!(root = %id, revision = target.revision(), "committed node");
        Ok(())
    }

    /// Remove a node and its entire subtree from the index.
    ///
    /// The current head (or an ancestor of it) and the root cannot be
    /// discarded.
    pub fn discard_node(&self, id: &Multihash) -> Result<(), StateDbError> {
        let mut inner = self.lock();
        let delta = inner
            .index
            .get(id)
            .cloned()
            .ok_or_else(|| StateDbError::UnknownNode(id.clone()))?;
        if inner.root.id() == id {
            return Err(StateDbError::CannotDiscard(id.clone()));
        }
        let subtree = Self::subtree_of(&inner.children, id);
        if subtree.contains(&inner.head) {
            return Err(StateDbError::CannotDiscard(id.clone()));
        }

        for node_id in &subtree {
            if let Some(node) = inner.index.remove(node_id) {
                inner.heads.remove(&(node.revision(), node_id.clone()));
            }
            inner.children.remove(node_id);
        }
        if let Some(parent) = delta.parent() {
            let parent_id = parent.id().clone();
            if let Some(siblings) = inner.children.get_mut(&parent_id) {
                siblings.remove(id);
            }
            // A parent with no finalized children left becomes a fork head.
            let has_finalized_child = inner
                .children
                .get(&parent_id)
                .map(|children| {
                    children.iter().any(|child| {
                        inner
                            .index
                            .get(child)
                            .map(|delta| delta.is_finalized())
                            .unwrap_or(false)
                    })
                })
                .unwrap_or(false);
            if parent.is_finalized() && !has_finalized_child {
                inner.heads.insert((parent.revision(), parent_id));
            }
        }
        Self::refresh_head(&mut inner);
        debug!(id = %id, pruned = subtree.len(), "discarded node");
        Ok(())
    }

    /// Drop all state and reinitialize with a single root at revision 0 and
    /// the zero multihash id.
    pub fn reset(&self) -> Result<(), StateDbError> {
        let mut inner = self.lock();
        let mut backend = inner.root.take_backend();
        backend.clear()?;

        let id = Multihash::zero(SHA2_256);
        let descriptor = RootDescriptor {
            id: id.clone(),
            revision: 0,
        };
        backend.put(
            &root_descriptor_key(),
            &borsh::to_vec(&descriptor).unwrap_or_default(),
        )?;

        let root = StateDelta::root(id.clone(), 0, backend);
        inner.index.clear();
        inner.index.insert(id.clone(), Arc::clone(&root));
        inner.children.clear();
        inner.heads.clear();
        inner.heads.insert((0, id.clone()));
        inner.root = root;
        inner.head = id;
        info!("state database reset");
        Ok(())
    }

    /// Seed an object directly into the committed root's backing store.
    ///
    /// This bypasses the finalized check and is only meaningful for genesis
    /// data written before any blocks exist.
    pub fn put_root_object(
        &self,
        space: &ObjectSpace,
        key: &[u8],
        value: &[u8],
    ) -> Result<(), StateDbError> {
        let inner = self.lock();
        inner.root.backend_put(&keys::state_key(space, key), value)
    }

    fn refresh_head(inner: &mut Inner) {
        if let Some((_, id)) = inner.heads.iter().next_back() {
            inner.head = id.clone();
        }
    }

    /// Ids reachable from `id` through the children map, `id` included.
    fn subtree_of(
        children: &HashMap<Multihash, BTreeSet<Multihash>>,
        id: &Multihash,
    ) -> BTreeSet<Multihash> {
        let mut seen = BTreeSet::new();
        let mut queue = vec![id.clone()];
        while let Some(current) = queue.pop() {
            if !seen.insert(current.clone()) {
                continue;
            }
            if let Some(kids) = children.get(&current) {
                queue.extend(kids.iter().cloned());
            }
        }
        seen
    }
}
