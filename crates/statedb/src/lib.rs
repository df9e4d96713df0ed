//! Fork-aware, versioned state database.
//!
//! State is a tree of [`delta::StateDelta`] layers rooted at the last
//! irreversibly-committed state. Each candidate block gets its own delta;
//! reads against any node in the tree see the union of the delta chain from
//! the root to that node, computed by the merge cursor in [`merge`].
//!
//! [`StateDb`] owns the tree: it tracks the preferred head, the set of fork
//! heads, and the commit/discard lifecycle. Mutations are serialized under a
//! single mutex; reads against finalized nodes only take it to resolve the
//! node handle.

pub mod backend;
pub mod database;
pub mod delta;
pub mod error;
pub mod keys;
pub mod merge;
pub mod node;

pub use backend::{Backend, BackendError, MemoryBackend};
#[cfg(feature = "rocksdb")]
pub use backend::RocksDbBackend;
pub use database::StateDb;
pub use error::StateDbError;
pub use keys::ObjectSpace;
pub use merge::{MergeIter, MergeState, Position};
pub use node::StateNode;
