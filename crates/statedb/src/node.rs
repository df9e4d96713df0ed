//! Public handle over a state delta.

use std::sync::Arc;

use arbor_common::Multihash;

use crate::delta::StateDelta;
use crate::error::StateDbError;
use crate::keys::{self, ObjectSpace};
use crate::merge::MergeState;

/// A node in the state tree.
///
/// Reads see the merged view of the delta chain from the root to this node.
/// Writes go to this node's delta and fail once it is finalized. Anonymous
/// nodes are speculative children that never enter the fork index; their
/// writes become visible to the parent only through [`StateNode::commit`].
#[derive(Clone)]
pub struct StateNode {
    delta: Arc<StateDelta>,
    anonymous: bool,
}

impl StateNode {
    pub(crate) fn new(delta: Arc<StateDelta>) -> Self {
        Self {
            delta,
            anonymous: false,
        }
    }

    pub fn id(&self) -> Multihash {
        self.delta.id().clone()
    }

    /// Id of the logical parent. Anonymous nodes report their named
    /// ancestor's parent, since they share that ancestor's identity.
    pub fn parent_id(&self) -> Option<Multihash> {
        let mut parent = self.delta.parent();
        while let Some(delta) = parent {
            if delta.id() != self.delta.id() {
                return Some(delta.id().clone());
            }
            parent = delta.parent();
        }
        None
    }

    pub fn revision(&self) -> u64 {
        self.delta.revision()
    }

    /// Handle on the parent node, when one exists.
    pub fn parent(&self) -> Option<StateNode> {
        self.delta.parent().map(StateNode::new)
    }

    pub fn is_finalized(&self) -> bool {
        self.delta.is_finalized()
    }

    pub fn is_anonymous(&self) -> bool {
        self.anonymous
    }

    /// Read one object at this node's view.
    pub fn get_object(
        &self,
        space: &ObjectSpace,
        key: &[u8],
    ) -> Result<Option<Vec<u8>>, StateDbError> {
        MergeState::of(&self.delta).get(&keys::state_key(space, key))
    }

    /// Write an object (`Some`) or tombstone it (`None`).
    ///
    /// Returns the size delta: new size minus old size, negative on erase,
    /// zero on a same-size overwrite.
    pub fn put_object(
        &self,
        space: &ObjectSpace,
        key: &[u8],
        value: Option<&[u8]>,
    ) -> Result<i64, StateDbError> {
        let state_key = keys::state_key(space, key);
        let old_len = MergeState::of(&self.delta)
            .get(&state_key)?
            .map(|v| v.len() as i64)
            .unwrap_or(0);
        match value {
            Some(value) => {
                self.delta.put(&state_key, value)?;
                Ok(value.len() as i64 - old_len)
            }
            None => {
                self.delta.erase(&state_key)?;
                Ok(-old_len)
            }
        }
    }

    /// Next object after `key` within `space`, at this node's view.
    pub fn get_next_object(
        &self,
        space: &ObjectSpace,
        key: &[u8],
    ) -> Result<Option<(Vec<u8>, Vec<u8>)>, StateDbError> {
        let state_key = keys::state_key(space, key);
        match MergeState::of(&self.delta).next_above(Some(&state_key))? {
            Some((found, value)) => Ok(keys::object_key(space, &found)
                .map(|object_key| (object_key.to_vec(), value))),
            None => Ok(None),
        }
    }

    /// Previous object before `key` within `space`, at this node's view.
    pub fn get_prev_object(
        &self,
        space: &ObjectSpace,
        key: &[u8],
    ) -> Result<Option<(Vec<u8>, Vec<u8>)>, StateDbError> {
        let state_key = keys::state_key(space, key);
        match MergeState::of(&self.delta).prev_below(Some(&state_key))? {
            Some((found, value)) => Ok(keys::object_key(space, &found)
                .map(|object_key| (object_key.to_vec(), value))),
            None => Ok(None),
        }
    }

    /// Spawn a speculative child sharing this node's identity. Its writes
    /// are invisible here until [`StateNode::commit`].
    pub fn create_anonymous_node(&self) -> StateNode {
        StateNode {
            delta: self.delta.anonymous_child(),
            anonymous: true,
        }
    }

    /// Replay an anonymous node's writes and tombstones into its parent.
    pub fn commit(&self) -> Result<(), StateDbError> {
        if !self.anonymous {
            return Err(StateDbError::NotAnonymous);
        }
        // Anonymous deltas always have a parent.
        let parent = self.delta.parent().ok_or(StateDbError::NotAnonymous)?;
        if parent.is_finalized() {
            return Err(StateDbError::NodeFinalized);
        }
        for key in self.delta.local_tombstones() {
            parent.erase(&key)?;
        }
        for (key, value) in self.delta.local_writes()? {
            parent.put(&key, &value)?;
        }
        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::backend::MemoryBackend;
    use arbor_common::multihash::SHA2_256;

    fn writable_node() -> StateNode {
        let root = StateDelta::root(
            Multihash::zero(SHA2_256),
            0,
            Box::new(MemoryBackend::new()),
        );
        StateNode::new(root.child(Multihash::sha2_256(b"1")))
    }

    #[test]
    fn put_object_reports_size_delta() {
        let node = writable_node();
        let space = ObjectSpace::contract(b"c");

        assert_eq!(node.put_object(&space, b"k", Some(b"hello")).unwrap(), 5);
        assert_eq!(node.put_object(&space, b"k", Some(b"world")).unwrap(), 0);
        assert_eq!(node.put_object(&space, b"k", Some(b"hi")).unwrap(), -3);
        assert_eq!(node.put_object(&space, b"k", None).unwrap(), -2);
        assert_eq!(node.get_object(&space, b"k").unwrap(), None);
        // Erasing an absent object is a zero-size no-op.
        assert_eq!(node.put_object(&space, b"k", None).unwrap(), 0);
    }

    #[test]
    fn traversal_stays_inside_the_space() {
        let node = writable_node();
        let a = ObjectSpace::new(b"a".to_vec());
        let b = ObjectSpace::new(b"b".to_vec());
        node.put_object(&a, b"x", Some(b"1")).unwrap();
        node.put_object(&b, b"y", Some(b"2")).unwrap();

        let (key, value) = node.get_next_object(&a, b"").unwrap().unwrap();
        assert_eq!((key.as_slice(), value.as_slice()), (&b"x"[..], &b"1"[..]));
        // No next object within space a; space b is not leaked.
        assert_eq!(node.get_next_object(&a, b"x").unwrap(), None);
        assert_eq!(node.get_prev_object(&b, b"y").unwrap(), None);
    }

    #[test]
    fn anonymous_commit_replays_into_parent() {
        let node = writable_node();
        let space = ObjectSpace::contract(b"c");
        node.put_object(&space, b"keep", Some(b"1")).unwrap();
        node.put_object(&space, b"drop", Some(b"2")).unwrap();

        let anon = node.create_anonymous_node();
        anon.put_object(&space, b"keep", Some(b"10")).unwrap();
        anon.put_object(&space, b"drop", None).unwrap();

        // Invisible to the parent until committed.
        assert_eq!(node.get_object(&space, b"keep").unwrap().unwrap(), b"1");
        anon.commit().unwrap();
        assert_eq!(node.get_object(&space, b"keep").unwrap().unwrap(), b"10");
        assert_eq!(node.get_object(&space, b"drop").unwrap(), None);
    }

    #[test]
    fn commit_is_anonymous_only() {
        let node = writable_node();
        assert!(matches!(node.commit(), Err(StateDbError::NotAnonymous)));
    }
}
