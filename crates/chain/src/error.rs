use arbor_common::{CodecError, Multihash};
use arbor_statedb::StateDbError;
use thiserror::Error;

/// Chain-level error taxonomy.
///
/// Transaction-scoped errors revert the transaction's anonymous node and let
/// the block continue; block-scoped errors revert the block-level node.
/// [`ChainError::is_transaction_scoped`] encodes the split.
#[derive(Debug, Error)]
pub enum ChainError {
    #[error(transparent)]
    StateDb(#[from] StateDbError),

    #[error(transparent)]
    Decode(#[from] CodecError),

    /// Push beyond the call-stack limit.
    #[error("call stack overflow")]
    StackOverflow,

    /// Caller/return/frame access on an empty stack. Internal invariant
    /// violation, fatal to the block.
    #[error("stack is empty")]
    StackException,

    /// Kernel-only entry point invoked from user mode.
    #[error("insufficient privileges")]
    InsufficientPrivileges,

    /// A thunk or override produced more bytes than the caller's buffer.
    #[error("insufficient return buffer: needed {needed}, have {have}")]
    InsufficientReturnBuffer { needed: usize, have: usize },

    #[error("did not find system call or thunk with id {0}")]
    ThunkNotFound(u32),

    /// Resource meter underflow; aborts the transaction, not the block.
    #[error("out of resources")]
    OutOfResources,

    /// A registry object the chain depends on is missing or corrupt.
    #[error("unexpected state: {0}")]
    UnexpectedState(String),

    /// Mutating syscall in a read-only context.
    #[error("context is read only")]
    ReadOnlyContext,

    #[error("contract {0} does not exist")]
    ContractNotFound(String),

    /// A contract terminated with an explicit exit code; zero is success.
    #[error("contract exited with code {0}")]
    ContractExit(u32),

    #[error("vm error: {0}")]
    Vm(String),

    #[error("unknown previous block {0}")]
    UnknownPreviousBlock(Multihash),

    #[error("block height must increase by one: expected {expected}, got {actual}")]
    BlockHeightMismatch { expected: u64, actual: u64 },

    #[error("first block must have height 1")]
    RootHeightMismatch,

    #[error("previous block id does not match")]
    PreviousIdMismatch,

    #[error("block {0} was already applied")]
    DuplicateBlock(Multihash),

    #[error("submission deadline expired")]
    TimedOut,

    #[error("controller is shutting down")]
    Shutdown,
}

impl ChainError {
    /// True when the error aborts only the current transaction; false for
    /// errors that take the whole block down.
    pub fn is_transaction_scoped(&self) -> bool {
        !matches!(
            self,
            ChainError::StackException | ChainError::StateDb(StateDbError::Backend(_))
        )
    }
}
