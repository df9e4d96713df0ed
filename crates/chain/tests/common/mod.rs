//! Shared fixtures: an in-memory state database seeded with genesis data
//! and a scripted VM backend standing in for the contract runtime.

// Each test binary uses a different slice of these helpers.
#![allow(dead_code)]

use std::sync::Arc;

use arbor_chain::thunk::system::{
    CallContractArgs, GetCallerReturn, GetContractArgumentsReturn, LogArgs, SetContractResultArgs,
};
use arbor_chain::{
    ids, seed_genesis, ChainError, GenesisConfig, HostApi, ThunkDispatcher, VmBackend,
};
use arbor_statedb::StateDb;
use borsh::{BorshDeserialize, BorshSerialize};

pub fn encode<T: BorshSerialize>(value: &T) -> Vec<u8> {
    borsh::to_vec(value).unwrap()
}

pub fn decode<T: BorshDeserialize>(raw: &[u8]) -> T {
    T::try_from_slice(raw).unwrap()
}

/// Contract runtime for tests: the "bytecode" names a scripted behavior.
pub struct ScriptVm;

impl VmBackend for ScriptVm {
    fn run(
        &self,
        host: &mut HostApi<'_>,
        bytecode: &[u8],
        _entry_point: u32,
    ) -> Result<(), ChainError> {
        match bytecode {
            // Return the call arguments untouched.
            b"echo" => {
                let raw =
                    host.invoke_system_call(ids::GET_CONTRACT_ARGUMENTS, usize::MAX, &encode(&()))?;
                let args: GetContractArgumentsReturn = decode(&raw);
                host.invoke_system_call(
                    ids::SET_CONTRACT_RESULT,
                    usize::MAX,
                    &encode(&SetContractResultArgs { value: args.value }),
                )?;
                Ok(())
            }
            // Record who called us, at what privilege, and whether we can
            // reach kernel-only entry points:
            // result = [caller_privilege, kernel_ok] ++ caller id
            b"probe" => {
                let kernel_ok = host
                    .invoke_thunk(
                        ids::LOG,
                        usize::MAX,
                        &encode(&LogArgs {
                            message: "probe".into(),
                        }),
                    )
                    .is_ok();
                let raw = host.invoke_system_call(ids::GET_CALLER, usize::MAX, &encode(&()))?;
                let caller: GetCallerReturn = decode(&raw);
                let mut value = vec![caller.privilege, kernel_ok as u8];
                value.extend_from_slice(&caller.caller);
                host.invoke_system_call(
                    ids::SET_CONTRACT_RESULT,
                    usize::MAX,
                    &encode(&SetContractResultArgs { value }),
                )?;
                Ok(())
            }
            // Call the contract named by our arguments (ourselves, usually).
            b"recurse" => {
                let raw =
                    host.invoke_system_call(ids::GET_CONTRACT_ARGUMENTS, usize::MAX, &encode(&()))?;
                let args: GetContractArgumentsReturn = decode(&raw);
                host.invoke_system_call(
                    ids::CALL_CONTRACT,
                    usize::MAX,
                    &encode(&CallContractArgs {
                        contract_id: args.value.clone(),
                        entry_point: 0,
                        args: args.value,
                    }),
                )?;
                Ok(())
            }
            // Terminate with a failure exit code.
            b"fail" => host
                .invoke_system_call(
                    ids::EXIT_CONTRACT,
                    usize::MAX,
                    &encode(&arbor_chain::thunk::system::ExitContractArgs { exit_code: 1 }),
                )
                .map(|_| ()),
            other => Err(ChainError::Vm(format!(
                "unknown script {}",
                String::from_utf8_lossy(other)
            ))),
        }
    }
}

/// In-memory database with the default genesis (all thunks priced) applied.
pub fn seeded_db(dispatcher: &ThunkDispatcher) -> Arc<StateDb> {
    let db = Arc::new(StateDb::in_memory().unwrap());
    let genesis = GenesisConfig::with_default_bandwidth(dispatcher);
    seed_genesis(&db, dispatcher, &genesis).unwrap();
    db
}
