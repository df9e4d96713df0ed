//! Genesis seeding.
//!
//! Before the first block, the metadata space must carry the compute
//! bandwidth registry, and the dispatch space any initial system-call
//! overrides. The configuration is a JSON document loaded by the node
//! binary.

use arbor_common::{encode, ComputeBandwidthEntry, ComputeBandwidthRegistry, SystemCallTarget};
use arbor_statedb::{keys, ObjectSpace, StateDb};
use serde::{Deserialize, Serialize};
use tracing::info;

use crate::error::ChainError;
use crate::thunk::ThunkDispatcher;

/// Baseline compute cost for thunks the configuration does not price.
pub const DEFAULT_COMPUTE: u64 = 100;

#[derive(Debug, Clone, Default, Serialize, Deserialize)]
pub struct GenesisConfig {
    #[serde(default)]
    pub compute_bandwidth: Vec<BandwidthEntry>,
    #[serde(default)]
    pub system_calls: Vec<SystemCallEntry>,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct BandwidthEntry {
    pub name: String,
    pub compute: u64,
}

/// One initial override: either a thunk redirect or a contract bundle
/// (contract id in hex).
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct SystemCallEntry {
    pub call_id: u32,
    #[serde(default)]
    pub thunk: Option<u32>,
    #[serde(default)]
    pub contract: Option<String>,
    #[serde(default)]
    pub entry_point: u32,
}

impl SystemCallEntry {
    fn resolve(&self, dispatcher: &ThunkDispatcher) -> Result<SystemCallTarget, ChainError> {
        match (&self.thunk, &self.contract) {
            (Some(tid), None) => {
                if !dispatcher.contains(*tid) {
                    return Err(ChainError::ThunkNotFound(*tid));
                }
                Ok(SystemCallTarget::Thunk(*tid))
            }
            (None, Some(contract)) => Ok(SystemCallTarget::Bundle {
                contract_id: hex::decode(contract).map_err(|e| {
                    ChainError::UnexpectedState(format!("bad contract id in genesis: {e}"))
                })?,
                entry_point: self.entry_point,
            }),
            _ => Err(ChainError::UnexpectedState(format!(
                "system call {} must name exactly one of thunk or contract",
                self.call_id
            ))),
        }
    }
}

impl GenesisConfig {
    /// A configuration pricing every registered thunk at the default cost.
    pub fn with_default_bandwidth(dispatcher: &ThunkDispatcher) -> Self {
        let mut names = dispatcher.names();
        names.sort_unstable();
        Self {
            compute_bandwidth: names
                .into_iter()
                .map(|name| BandwidthEntry {
                    name: name.to_string(),
                    compute: DEFAULT_COMPUTE,
                })
                .collect(),
            system_calls: Vec::new(),
        }
    }
}

/// Write the genesis objects into the committed root.
pub fn seed_genesis(
    db: &StateDb,
    dispatcher: &ThunkDispatcher,
    config: &GenesisConfig,
) -> Result<(), ChainError> {
    let registry = ComputeBandwidthRegistry {
        entries: config
            .compute_bandwidth
            .iter()
            .map(|entry| ComputeBandwidthEntry {
                name: entry.name.clone(),
                compute: entry.compute,
            })
            .collect(),
    };
    db.put_root_object(
        &ObjectSpace::metadata(),
        keys::COMPUTE_BANDWIDTH_REGISTRY,
        &encode(&registry),
    )?;

    for entry in &config.system_calls {
        let target = entry.resolve(dispatcher)?;
        db.put_root_object(
            &ObjectSpace::system_call_dispatch(),
            &entry.call_id.to_be_bytes(),
            &encode(&target),
        )?;
    }

    info!(
        thunks = registry.entries.len(),
        overrides = config.system_calls.len(),
        "seeded genesis state"
    );
    Ok(())
}
