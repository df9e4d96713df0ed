//! Deterministic contract execution on top of the fork state database.
//!
//! The execution context dispatches system calls either to registered
//! native thunks or to user-installed contract overrides, tracks a resource
//! meter, and maintains a bounded call stack. The controller feeds it from
//! a bounded submission pipeline.

pub mod chronicler;
pub mod context;
pub mod controller;
pub mod error;
pub mod frame;
pub mod genesis;
pub mod host;
pub mod meter;
pub mod privilege;
pub mod receipt;
pub mod spaces;
pub mod thunk;
pub mod vm;

pub use chronicler::{Chronicler, Event};
pub use context::ExecutionContext;
pub use controller::{
    BlockSubmission, Controller, QueryResult, QuerySubmission, Submission, SubmissionOutcome,
    TransactionSubmission, MAX_QUEUE_SIZE,
};
pub use error::ChainError;
pub use frame::{StackFrame, STACK_LIMIT};
pub use genesis::{seed_genesis, GenesisConfig};
pub use host::HostApi;
pub use meter::{ResourceMeter, Session};
pub use privilege::{Intent, Privilege};
pub use receipt::Receipt;
pub use thunk::{ids, ThunkDispatcher};
pub use vm::{NullVm, VmBackend};
