//! Object spaces reserved by the chain.

use arbor_statedb::ObjectSpace;

/// Registry of uploaded contract bytecode, keyed by contract id.
pub fn contract_bytecode() -> ObjectSpace {
    ObjectSpace::new(b"contract_bytecode".to_vec())
}
