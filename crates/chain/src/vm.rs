//! Abstract contract-runtime interface.

use crate::error::ChainError;
use crate::host::HostApi;

/// The backend that interprets contract bytecode.
///
/// The chain crate never executes bytecode itself; it hands the contract's
/// code and entry point to the backend along with a [`HostApi`] handle the
/// running contract uses to reach back into the chain.
pub trait VmBackend: Send + Sync {
    fn run(
        &self,
        host: &mut HostApi<'_>,
        bytecode: &[u8],
        entry_point: u32,
    ) -> Result<(), ChainError>;
}

/// Backend for nodes that carry no contract runtime: any attempt to execute
/// bytecode fails.
pub struct NullVm;

impl VmBackend for NullVm {
    fn run(
        &self,
        _host: &mut HostApi<'_>,
        _bytecode: &[u8],
        _entry_point: u32,
    ) -> Result<(), ChainError> {
        Err(ChainError::Vm("no contract runtime configured".into()))
    }
}
