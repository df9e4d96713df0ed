//! Merged view over a chain of deltas.
//!
//! [`MergeState`] presents the chain `[root … tip]` as one ordered map equal
//! to the left-fold of the layers. Resolution is newest-layer-wins: a write
//! in a newer layer shadows older values, and a tombstone in the newest
//! mentioning layer hides the key entirely.
//!
//! [`MergeIter`] is the bidirectional cursor over that view. Its position is
//! a key (or a per-direction sentinel); a step costs one cursor query per
//! layer, so the overhead stays linear in the chain depth.

use std::sync::Arc;

use crate::backend::KeyValue;
use crate::delta::{DeltaEntry, StateDelta};
use crate::error::StateDbError;

pub struct MergeState {
    /// Oldest first; the last element is the tip.
    deltas: Vec<Arc<StateDelta>>,
}

impl MergeState {
    /// Build the chain view for `tip` by walking its parents to the root.
    pub fn of(tip: &Arc<StateDelta>) -> Self {
        let mut deltas = Vec::new();
        let mut current = Some(Arc::clone(tip));
        while let Some(delta) = current {
            current = delta.parent();
            deltas.push(delta);
        }
        deltas.reverse();
        Self { deltas }
    }

    /// Resolve one key against the whole chain.
    pub fn get(&self, key: &[u8]) -> Result<Option<Vec<u8>>, StateDbError> {
        for delta in self.deltas.iter().rev() {
            match delta.entry(key)? {
                DeltaEntry::Present(value) => return Ok(Some(value)),
                DeltaEntry::Deleted => return Ok(None),
                DeltaEntry::NotHere => continue,
            }
        }
        Ok(None)
    }

    /// Smallest live key strictly above `after` (or the smallest at all when
    /// `after` is `None`). Keys whose newest mention is a tombstone are
    /// skipped, not surfaced.
    pub fn next_above(&self, after: Option<&[u8]>) -> Result<Option<KeyValue>, StateDbError> {
        let mut cursor: Option<Vec<u8>> = after.map(|k| k.to_vec());
        loop {
            let mut candidate: Option<Vec<u8>> = None;
            for delta in &self.deltas {
                if let Some(key) = delta.next_mention(cursor.as_deref())? {
                    candidate = Some(match candidate {
                        Some(current) => current.min(key),
                        None => key,
                    });
                }
            }
            let Some(key) = candidate else {
                return Ok(None);
            };
            match self.get(&key)? {
                Some(value) => return Ok(Some((key, value))),
                None => cursor = Some(key),
            }
        }
    }

    /// Mirror of [`next_above`] toward smaller keys.
    pub fn prev_below(&self, before: Option<&[u8]>) -> Result<Option<KeyValue>, StateDbError> {
        let mut cursor: Option<Vec<u8>> = before.map(|k| k.to_vec());
        loop {
            let mut candidate: Option<Vec<u8>> = None;
            for delta in &self.deltas {
                if let Some(key) = delta.prev_mention(cursor.as_deref())? {
                    candidate = Some(match candidate {
                        Some(current) => current.max(key),
                        None => key,
                    });
                }
            }
            let Some(key) = candidate else {
                return Ok(None);
            };
            match self.get(&key)? {
                Some(value) => return Ok(Some((key, value))),
                None => cursor = Some(key),
            }
        }
    }

    pub fn first(&self) -> Result<Option<KeyValue>, StateDbError> {
        self.next_above(None)
    }

    pub fn last(&self) -> Result<Option<KeyValue>, StateDbError> {
        self.prev_below(None)
    }

    /// Exact lookup: a hit only when the newest mentioning layer holds a
    /// live value for precisely this key.
    pub fn find(&self, key: &[u8]) -> Result<Option<KeyValue>, StateDbError> {
        Ok(self.get(key)?.map(|value| (key.to_vec(), value)))
    }

    /// First live entry with key ≥ `key`.
    pub fn lower_bound(&self, key: &[u8]) -> Result<Option<KeyValue>, StateDbError> {
        if let Some(value) = self.get(key)? {
            return Ok(Some((key.to_vec(), value)));
        }
        self.next_above(Some(key))
    }

    pub fn iter(&self) -> MergeIter<'_> {
        MergeIter {
            state: self,
            pos: Position::Begin,
        }
    }
}

/// Cursor position: a key, or a sentinel on either side of the range.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum Position {
    Begin,
    At(Vec<u8>),
    End,
}

pub struct MergeIter<'a> {
    state: &'a MergeState,
    pos: Position,
}

impl<'a> MergeIter<'a> {
    pub fn position(&self) -> &Position {
        &self.pos
    }

    /// The entry under the cursor, when it sits on a key.
    pub fn current(&self) -> Result<Option<KeyValue>, StateDbError> {
        match &self.pos {
            Position::At(key) => self.state.find(key),
            _ => Ok(None),
        }
    }

    /// Step forward; incrementing past the end parks the cursor on the end
    /// sentinel, where further steps stay put.
    pub fn next(&mut self) -> Result<Option<KeyValue>, StateDbError> {
        let entry = match &self.pos {
            Position::Begin => self.state.first()?,
            Position::At(key) => self.state.next_above(Some(key))?,
            Position::End => None,
        };
        match entry {
            Some((key, value)) => {
                self.pos = Position::At(key.clone());
                Ok(Some((key, value)))
            }
            None => {
                self.pos = Position::End;
                Ok(None)
            }
        }
    }

    /// Step backward; decrementing from the end sentinel lands on the last
    /// element.
    pub fn prev(&mut self) -> Result<Option<KeyValue>, StateDbError> {
        let entry = match &self.pos {
            Position::End => self.state.last()?,
            Position::At(key) => self.state.prev_below(Some(key))?,
            Position::Begin => None,
        };
        match entry {
            Some((key, value)) => {
                self.pos = Position::At(key.clone());
                Ok(Some((key, value)))
            }
            None => {
                self.pos = Position::Begin;
                Ok(None)
            }
        }
    }

    /// Position on the first live entry with key ≥ `key`.
    pub fn seek(&mut self, key: &[u8]) -> Result<Option<KeyValue>, StateDbError> {
        match self.state.lower_bound(key)? {
            Some((key, value)) => {
                self.pos = Position::At(key.clone());
                Ok(Some((key, value)))
            }
            None => {
                self.pos = Position::End;
                Ok(None)
            }
        }
    }

    /// Position on `key` exactly, or on the end sentinel when it is absent
    /// or shadowed by a tombstone.
    pub fn find(&mut self, key: &[u8]) -> Result<Option<KeyValue>, StateDbError> {
        match self.state.find(key)? {
            Some((key, value)) => {
                self.pos = Position::At(key.clone());
                Ok(Some((key, value)))
            }
            None => {
                self.pos = Position::End;
                Ok(None)
            }
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::backend::MemoryBackend;
    use arbor_common::multihash::SHA2_256;
    use arbor_common::Multihash;

    fn chain() -> Vec<Arc<StateDelta>> {
        // Layer 0 (root-backed): a=1, b=2, c=3
        // Layer 1: b=20
        // Layer 2: erase a, d=4
        let root = StateDelta::root(
            Multihash::zero(SHA2_256),
            0,
            Box::new(MemoryBackend::new()),
        );
        let d1 = root.child(Multihash::sha2_256(b"1"));
        d1.put(b"a", b"1").unwrap();
        d1.put(b"b", b"2").unwrap();
        d1.put(b"c", b"3").unwrap();
        d1.finalize();
        let d2 = d1.child(Multihash::sha2_256(b"2"));
        d2.put(b"b", b"20").unwrap();
        d2.finalize();
        let d3 = d2.child(Multihash::sha2_256(b"3"));
        d3.erase(b"a").unwrap();
        d3.put(b"d", b"4").unwrap();
        vec![root, d1, d2, d3]
    }

    #[test]
    fn newest_layer_wins() {
        let deltas = chain();
        let merged = MergeState::of(&deltas[3]);
        assert_eq!(merged.get(b"b").unwrap().unwrap(), b"20");
        assert_eq!(merged.get(b"c").unwrap().unwrap(), b"3");
    }

    #[test]
    fn tombstones_shadow_and_are_skipped() {
        let deltas = chain();
        let merged = MergeState::of(&deltas[3]);
        assert_eq!(merged.get(b"a").unwrap(), None);
        assert_eq!(merged.find(b"a").unwrap(), None);
        // First live key is b, not the tombstoned a.
        assert_eq!(merged.first().unwrap().unwrap().0, b"b");
    }

    #[test]
    fn forward_and_backward_traversal() {
        let deltas = chain();
        let merged = MergeState::of(&deltas[3]);
        let mut iter = merged.iter();

        assert_eq!(iter.next().unwrap().unwrap().0, b"b");
        assert_eq!(iter.next().unwrap().unwrap().0, b"c");
        assert_eq!(iter.next().unwrap().unwrap().0, b"d");
        assert_eq!(iter.next().unwrap(), None);
        assert_eq!(*iter.position(), Position::End);

        // Decrement from the end sentinel returns to the last element.
        assert_eq!(iter.prev().unwrap().unwrap().0, b"d");
        assert_eq!(iter.prev().unwrap().unwrap().0, b"c");
        assert_eq!(iter.prev().unwrap().unwrap().0, b"b");
        assert_eq!(iter.prev().unwrap(), None);
        assert_eq!(*iter.position(), Position::Begin);
    }

    #[test]
    fn double_inverse_stability() {
        let deltas = chain();
        let merged = MergeState::of(&deltas[3]);
        let mut iter = merged.iter();
        iter.seek(b"c").unwrap();

        let pos = iter.position().clone();
        iter.next().unwrap();
        iter.prev().unwrap();
        assert_eq!(*iter.position(), pos);

        iter.prev().unwrap();
        iter.next().unwrap();
        assert_eq!(*iter.position(), pos);
    }

    #[test]
    fn find_and_seek_semantics() {
        let deltas = chain();
        let merged = MergeState::of(&deltas[3]);
        let mut iter = merged.iter();

        assert_eq!(iter.find(b"b").unwrap().unwrap().1, b"20");
        assert_eq!(iter.find(b"zzz").unwrap(), None);
        assert_eq!(*iter.position(), Position::End);

        // lower_bound semantics: absent key lands on the next live one.
        assert_eq!(iter.seek(b"ba").unwrap().unwrap().0, b"c");
    }

    #[test]
    fn view_at_intermediate_layer_ignores_newer_writes() {
        let deltas = chain();
        let merged = MergeState::of(&deltas[1]);
        assert_eq!(merged.get(b"a").unwrap().unwrap(), b"1");
        assert_eq!(merged.get(b"b").unwrap().unwrap(), b"2");
        assert_eq!(merged.get(b"d").unwrap(), None);
    }
}
