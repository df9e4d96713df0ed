use arbor_common::Multihash;
use thiserror::Error;

use crate::backend::BackendError;

#[derive(Debug, Error)]
pub enum StateDbError {
    /// Mutation attempted on a finalized node.
    #[error("node is finalized")]
    NodeFinalized,

    /// Commit requires the target node to be finalized.
    #[error("node is not finalized")]
    NotFinalized,

    /// Attempted to discard the current head or the root.
    #[error("cannot discard node {0}")]
    CannotDiscard(Multihash),

    /// The id is not present in the fork index.
    #[error("unknown node {0}")]
    UnknownNode(Multihash),

    /// Node-level commit is only defined for anonymous nodes.
    #[error("commit is only valid on an anonymous node")]
    NotAnonymous,

    /// The persistent root descriptor is missing or corrupt.
    #[error("corrupt root descriptor: {0}")]
    CorruptRoot(String),

    #[error(transparent)]
    Backend(#[from] BackendError),
}
