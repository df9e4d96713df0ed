//! Key materialization.
//!
//! Object spaces partition one backend keyspace. A state key is the space
//! tag, length-prefixed so spaces of different lengths cannot alias, followed
//! by the raw object key. Within a space, state keys sort exactly like the
//! object keys they wrap.

/// Reserved space holding chain metadata (compute bandwidth registry, the
/// persistent root descriptor).
pub const METADATA: &[u8] = b"metadata";

/// Reserved space holding system-call overrides, keyed by the 32-bit
/// big-endian system-call id.
pub const SYSTEM_CALL_DISPATCH: &[u8] = b"system_call_dispatch";

/// Key of the compute bandwidth registry inside the metadata space.
pub const COMPUTE_BANDWIDTH_REGISTRY: &[u8] = b"compute_bandwidth_registry";

/// Key of the persistent root descriptor inside the metadata space.
pub const ROOT_DESCRIPTOR: &[u8] = b"root_descriptor";

/// An opaque byte tag partitioning the object keyspace.
#[derive(Clone, Debug, PartialEq, Eq, PartialOrd, Ord, Hash)]
pub struct ObjectSpace(Vec<u8>);

impl ObjectSpace {
    pub fn new(tag: impl Into<Vec<u8>>) -> Self {
        Self(tag.into())
    }

    pub fn metadata() -> Self {
        Self(METADATA.to_vec())
    }

    pub fn system_call_dispatch() -> Self {
        Self(SYSTEM_CALL_DISPATCH.to_vec())
    }

    /// The private storage space of a contract.
    pub fn contract(contract_id: &[u8]) -> Self {
        let mut tag = Vec::with_capacity(9 + contract_id.len());
        tag.extend_from_slice(b"contract:");
        tag.extend_from_slice(contract_id);
        Self(tag)
    }

    pub fn as_bytes(&self) -> &[u8] {
        &self.0
    }

    /// The backend key prefix shared by every object in this space.
    pub fn prefix(&self) -> Vec<u8> {
        let mut out = Vec::with_capacity(4 + self.0.len());
        out.extend_from_slice(&(self.0.len() as u32).to_be_bytes());
        out.extend_from_slice(&self.0);
        out
    }
}

/// Materialize `(space, key)` into a single backend key.
pub fn state_key(space: &ObjectSpace, key: &[u8]) -> Vec<u8> {
    let mut out = space.prefix();
    out.extend_from_slice(key);
    out
}

/// Split a backend key back into its object key, if it belongs to `space`.
pub fn object_key<'a>(space: &ObjectSpace, state_key: &'a [u8]) -> Option<&'a [u8]> {
    let prefix = space.prefix();
    state_key.strip_prefix(prefix.as_slice())
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn spaces_of_different_lengths_do_not_alias() {
        let a = ObjectSpace::new(b"ab".to_vec());
        let b = ObjectSpace::new(b"a".to_vec());
        // Same concatenated bytes, different spaces.
        assert_ne!(state_key(&a, b"c"), state_key(&b, b"bc"));
    }

    #[test]
    fn keys_sort_lexicographically_within_a_space() {
        let space = ObjectSpace::metadata();
        let keys = [b"a".to_vec(), b"ab".to_vec(), b"b".to_vec()];
        let mut materialized: Vec<_> = keys.iter().map(|k| state_key(&space, k)).collect();
        let sorted = materialized.clone();
        materialized.sort();
        assert_eq!(materialized, sorted);
    }

    #[test]
    fn object_key_round_trips() {
        let space = ObjectSpace::contract(b"abc");
        let sk = state_key(&space, b"balance");
        assert_eq!(object_key(&space, &sk), Some(b"balance".as_slice()));
        assert_eq!(object_key(&ObjectSpace::metadata(), &sk), None);
    }
}
