//! Shared value objects for the arbor node.
//!
//! Everything that crosses a crate boundary as bytes lives here: multihashes,
//! block and transaction structures, system-call targets, and the canonical
//! codec that the block acceptance rules are defined against.

pub mod codec;
pub mod multihash;
pub mod types;

pub use codec::{
    decode_canonical, decode_versioned, encode, encode_versioned, CodecError, ENVELOPE_VERSION,
};
pub use multihash::Multihash;
pub use types::{
    Block, BlockHeader, ComputeBandwidthEntry, ComputeBandwidthRegistry, Operation,
    SystemCallTarget, Transaction, TransactionPayload,
};
