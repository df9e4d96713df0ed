//! Block, transaction, and registry value objects.

use crate::codec::encode;
use crate::multihash::Multihash;
use borsh::{BorshDeserialize, BorshSerialize};
use serde::{Deserialize, Serialize};

/// Header of a candidate block.
///
/// `previous` is the id of the parent block's state; the zero multihash
/// denotes the genesis parent. `height` must be the parent's height plus one.
#[derive(
    Clone, Debug, PartialEq, Eq, Default, BorshSerialize, BorshDeserialize, Serialize, Deserialize,
)]
pub struct BlockHeader {
    pub previous: Multihash,
    pub height: u64,
    pub timestamp: u64,
    pub nonce: u64,
}

impl BlockHeader {
    /// Block id: the SHA2-256 multihash of the canonical header encoding.
    pub fn id(&self) -> Multihash {
        Multihash::sha2_256(&encode(self))
    }
}

#[derive(Clone, Debug, PartialEq, Eq, Default, BorshSerialize, BorshDeserialize)]
pub struct Block {
    pub header: BlockHeader,
    pub transactions: Vec<Transaction>,
    pub passives: Vec<Vec<u8>>,
}

impl Block {
    pub fn id(&self) -> Multihash {
        self.header.id()
    }
}

/// One operation inside a transaction payload.
#[derive(Clone, Debug, PartialEq, Eq, BorshSerialize, BorshDeserialize)]
pub enum Operation {
    UploadContract {
        contract_id: Vec<u8>,
        bytecode: Vec<u8>,
    },
    CallContract {
        contract_id: Vec<u8>,
        entry_point: u32,
        args: Vec<u8>,
    },
    SetSystemCall {
        call_id: u32,
        target: SystemCallTarget,
    },
}

#[derive(Clone, Debug, PartialEq, Eq, Default, BorshSerialize, BorshDeserialize)]
pub struct TransactionPayload {
    pub resource_limit: u64,
    pub operations: Vec<Operation>,
}

#[derive(Clone, Debug, PartialEq, Eq, Default, BorshSerialize, BorshDeserialize)]
pub struct Transaction {
    pub payload: TransactionPayload,
    pub nonce: u64,
}

impl Transaction {
    pub fn id(&self) -> Multihash {
        Multihash::sha2_256(&encode(self))
    }
}

/// Where a system call resolves to: a native thunk or an installed contract.
#[derive(Clone, Debug, PartialEq, Eq, BorshSerialize, BorshDeserialize)]
pub enum SystemCallTarget {
    Thunk(u32),
    Bundle {
        contract_id: Vec<u8>,
        entry_point: u32,
    },
}

/// Published per-thunk compute costs, stored in the metadata object space.
#[derive(Clone, Debug, PartialEq, Eq, Default, BorshSerialize, BorshDeserialize)]
pub struct ComputeBandwidthRegistry {
    pub entries: Vec<ComputeBandwidthEntry>,
}

#[derive(Clone, Debug, PartialEq, Eq, BorshSerialize, BorshDeserialize)]
pub struct ComputeBandwidthEntry {
    pub name: String,
    pub compute: u64,
}

impl ComputeBandwidthRegistry {
    pub fn compute_for(&self, name: &str) -> Option<u64> {
        self.entries
            .iter()
            .find(|e| e.name == name)
            .map(|e| e.compute)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::multihash::SHA2_256;

    #[test]
    fn block_id_commits_to_header_fields() {
        let mut header = BlockHeader {
            previous: Multihash::zero(SHA2_256),
            height: 1,
            timestamp: 0,
            nonce: 0,
        };
        let id = header.id();
        header.nonce = 1;
        assert_ne!(id, header.id());
    }

    #[test]
    fn registry_lookup_by_name() {
        let registry = ComputeBandwidthRegistry {
            entries: vec![
                ComputeBandwidthEntry {
                    name: "get_object".into(),
                    compute: 100,
                },
                ComputeBandwidthEntry {
                    name: "put_object".into(),
                    compute: 250,
                },
            ],
        };
        assert_eq!(registry.compute_for("put_object"), Some(250));
        assert_eq!(registry.compute_for("unknown"), None);
    }
}
