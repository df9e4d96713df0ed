//! Native thunks.
//!
//! Each thunk takes the execution context and a borsh-decoded argument
//! struct, and returns a borsh-encoded value. Everything a contract or the
//! block applier can do to the chain goes through one of these.

use arbor_common::{encode, Block, Multihash, SystemCallTarget, Transaction};
use arbor_statedb::{keys, ObjectSpace};
use borsh::{BorshDeserialize, BorshSerialize};
use tracing::{debug, info, warn};

use crate::chronicler::Event;
use crate::context::ExecutionContext;
use crate::error::ChainError;
use crate::frame::StackFrame;
use crate::host::{self, HostApi};
use crate::privilege::Privilege;
use crate::spaces;
use crate::thunk::{ids, ThunkDispatcher};

/* Argument and return records, one pair per thunk. */

#[derive(Debug, Clone, BorshSerialize, BorshDeserialize)]
pub struct GetObjectArgs {
    pub space: Vec<u8>,
    pub key: Vec<u8>,
}

#[derive(Debug, Clone, BorshSerialize, BorshDeserialize)]
pub struct GetObjectReturn {
    pub value: Option<Vec<u8>>,
}

#[derive(Debug, Clone, BorshSerialize, BorshDeserialize)]
pub struct PutObjectArgs {
    pub space: Vec<u8>,
    pub key: Vec<u8>,
    /// `None` tombstones the object.
    pub value: Option<Vec<u8>>,
}

#[derive(Debug, Clone, BorshSerialize, BorshDeserialize)]
pub struct PutObjectReturn {
    pub size_delta: i64,
}

#[derive(Debug, Clone, BorshSerialize, BorshDeserialize)]
pub struct GetNextObjectReturn {
    pub entry: Option<(Vec<u8>, Vec<u8>)>,
}

#[derive(Debug, Clone, BorshSerialize, BorshDeserialize)]
pub struct CallContractArgs {
    pub contract_id: Vec<u8>,
    pub entry_point: u32,
    pub args: Vec<u8>,
}

#[derive(Debug, Clone, BorshSerialize, BorshDeserialize)]
pub struct CallContractReturn {
    pub value: Vec<u8>,
}

#[derive(Debug, Clone, BorshSerialize, BorshDeserialize)]
pub struct GetEntryPointReturn {
    pub entry_point: u32,
}

#[derive(Debug, Clone, BorshSerialize, BorshDeserialize)]
pub struct GetContractArgumentsReturn {
    pub value: Vec<u8>,
}

#[derive(Debug, Clone, BorshSerialize, BorshDeserialize)]
pub struct SetContractResultArgs {
    pub value: Vec<u8>,
}

#[derive(Debug, Clone, BorshSerialize, BorshDeserialize)]
pub struct GetCallerReturn {
    pub caller: Vec<u8>,
    pub privilege: u8,
}

#[derive(Debug, Clone, BorshSerialize, BorshDeserialize)]
pub struct EmitEventArgs {
    pub name: String,
    pub data: Vec<u8>,
    pub impacted: Vec<Vec<u8>>,
}

#[derive(Debug, Clone, BorshSerialize, BorshDeserialize)]
pub struct LogArgs {
    pub message: String,
}

#[derive(Debug, Clone, BorshSerialize, BorshDeserialize)]
pub struct ExitContractArgs {
    pub exit_code: u32,
}

#[derive(Debug, Clone, BorshSerialize, BorshDeserialize)]
pub struct GetHeadInfoReturn {
    pub id: Multihash,
    pub previous: Option<Multihash>,
    pub height: u64,
}

#[derive(Debug, Clone, BorshSerialize, BorshDeserialize)]
pub struct ApplyBlockArgs {
    pub block: Block,
}

#[derive(Debug, Clone, BorshSerialize, BorshDeserialize)]
pub struct ApplyTransactionArgs {
    pub transaction: Transaction,
}

pub(crate) fn register_all(dispatcher: &mut ThunkDispatcher) {
    dispatcher.register(ids::GET_HEAD_INFO, "get_head_info", get_head_info);
    dispatcher.register(ids::APPLY_BLOCK, "apply_block", apply_block);
    dispatcher.register(ids::APPLY_TRANSACTION, "apply_transaction", apply_transaction);
    dispatcher.register(ids::PUT_OBJECT, "put_object", put_object);
    dispatcher.register(ids::GET_OBJECT, "get_object", get_object);
    dispatcher.register(ids::GET_NEXT_OBJECT, "get_next_object", get_next_object);
    dispatcher.register(ids::GET_PREV_OBJECT, "get_prev_object", get_prev_object);
    dispatcher.register(ids::CALL_CONTRACT, "call_contract", call_contract);
    dispatcher.register(ids::GET_ENTRY_POINT, "get_entry_point", get_entry_point);
    dispatcher.register(
        ids::GET_CONTRACT_ARGUMENTS,
        "get_contract_arguments",
        get_contract_arguments,
    );
    dispatcher.register(
        ids::SET_CONTRACT_RESULT,
        "set_contract_result",
        set_contract_result,
    );
    dispatcher.register(ids::GET_CALLER, "get_caller", get_caller);
    dispatcher.register(
        ids::REQUIRE_SYSTEM_AUTHORITY,
        "require_system_authority",
        require_system_authority,
    );
    dispatcher.register(ids::EMIT_EVENT, "emit_event", emit_event);
    dispatcher.register(ids::LOG, "log", log);
    dispatcher.register(ids::EXIT_CONTRACT, "exit_contract", exit_contract);
}

/// User-mode execution may only touch its own contract space.
fn resolve_space(ctx: &ExecutionContext, raw: &[u8]) -> Result<ObjectSpace, ChainError> {
    let space = ObjectSpace::new(raw.to_vec());
    if ctx.get_privilege()? == Privilege::UserMode
        && space != ObjectSpace::contract(&ctx.get_contract_id())
    {
        return Err(ChainError::InsufficientPrivileges);
    }
    Ok(space)
}

fn require_kernel(ctx: &ExecutionContext) -> Result<(), ChainError> {
    if ctx.get_privilege()? != Privilege::KernelMode {
        return Err(ChainError::InsufficientPrivileges);
    }
    Ok(())
}

fn get_head_info(ctx: &mut ExecutionContext, _args: ()) -> Result<GetHeadInfoReturn, ChainError> {
    let node = ctx.require_state_node()?;
    Ok(GetHeadInfoReturn {
        id: node.id(),
        previous: node.parent_id(),
        height: node.revision(),
    })
}

/// Apply every transaction in the block. Transaction-scoped failures revert
/// that transaction only; the block application continues.
fn apply_block(ctx: &mut ExecutionContext, args: ApplyBlockArgs) -> Result<(), ChainError> {
    require_kernel(ctx)?;
    if ctx.read_only() {
        return Err(ChainError::ReadOnlyContext);
    }

    let block = args.block;
    info!(
        block = %block.id(),
        height = block.header.height,
        transactions = block.transactions.len(),
        "applying block"
    );
    ctx.set_block(block.clone());

    for transaction in block.transactions {
        let id = transaction.id();
        let apply = ApplyTransactionArgs { transaction };
        match host::system_call::<_, ()>(ctx, ids::APPLY_TRANSACTION, &apply) {
            Ok(()) => {}
            Err(e) if e.is_transaction_scoped() => {
                warn!(transaction = %id, error = %e, "transaction reverted");
                ctx.receipt_mut().failed_transactions.push(id);
            }
            Err(e) => {
                ctx.clear_block();
                return Err(e);
            }
        }
    }
    ctx.clear_block();
    Ok(())
}

/// Apply one transaction under an anonymous node and a resource session.
/// On success the anonymous node is replayed into the block node; on failure
/// it is dropped, reverting every write the transaction made.
fn apply_transaction(
    ctx: &mut ExecutionContext,
    args: ApplyTransactionArgs,
) -> Result<(), ChainError> {
    require_kernel(ctx)?;
    if ctx.read_only() {
        return Err(ChainError::ReadOnlyContext);
    }

    let transaction = args.transaction;
    let block_node = ctx.require_state_node()?.clone();
    let parent = ctx.parent_node().cloned();
    let anonymous = block_node.create_anonymous_node();

    ctx.set_state_node(Some(anonymous.clone()), Some(block_node.clone()));
    ctx.set_transaction(transaction.clone());
    let _session = ctx.make_session(transaction.payload.resource_limit);

    let result = apply_operations(ctx, &transaction);

    ctx.finish_session(result.is_ok());
    ctx.clear_transaction();
    ctx.set_state_node(Some(block_node), parent);

    match result {
        Ok(()) => {
            anonymous.commit()?;
            debug!(transaction = %transaction.id(), "transaction applied");
            Ok(())
        }
        Err(e) => Err(e),
    }
}

fn apply_operations(
    ctx: &mut ExecutionContext,
    transaction: &Transaction,
) -> Result<(), ChainError> {
    use arbor_common::Operation;

    for operation in &transaction.payload.operations {
        match operation {
            Operation::UploadContract {
                contract_id,
                bytecode,
            } => {
                let put = PutObjectArgs {
                    space: spaces::contract_bytecode().as_bytes().to_vec(),
                    key: contract_id.clone(),
                    value: Some(bytecode.clone()),
                };
                ctx.with_frame(StackFrame::system(Privilege::KernelMode), |ctx| {
                    host::system_call::<_, PutObjectReturn>(ctx, ids::PUT_OBJECT, &put)
                        .map(|_| ())
                })?;
            }
            Operation::CallContract {
                contract_id,
                entry_point,
                args,
            } => {
                let call = CallContractArgs {
                    contract_id: contract_id.clone(),
                    entry_point: *entry_point,
                    args: args.clone(),
                };
                ctx.with_frame(StackFrame::system(Privilege::UserMode), |ctx| {
                    host::system_call::<_, CallContractReturn>(ctx, ids::CALL_CONTRACT, &call)
                        .map(|_| ())
                })?;
            }
            Operation::SetSystemCall { call_id, target } => {
                ctx.with_frame(StackFrame::system(Privilege::KernelMode), |ctx| {
                    host::system_call::<_, ()>(ctx, ids::REQUIRE_SYSTEM_AUTHORITY, &())?;
                    set_system_call(ctx, *call_id, target)
                })?;
            }
        }
    }
    Ok(())
}

/// Validate an override target and record it in the dispatch space.
fn set_system_call(
    ctx: &mut ExecutionContext,
    call_id: u32,
    target: &SystemCallTarget,
) -> Result<(), ChainError> {
    match target {
        SystemCallTarget::Thunk(tid) => {
            if !ctx.dispatcher().contains(*tid) {
                return Err(ChainError::ThunkNotFound(*tid));
            }
        }
        SystemCallTarget::Bundle { contract_id, .. } => {
            let node = ctx.require_state_node()?;
            if node
                .get_object(&spaces::contract_bytecode(), contract_id)?
                .is_none()
            {
                return Err(ChainError::ContractNotFound(hex::encode(contract_id)));
            }
        }
    }
    let put = PutObjectArgs {
        space: keys::SYSTEM_CALL_DISPATCH.to_vec(),
        key: call_id.to_be_bytes().to_vec(),
        value: Some(encode(target)),
    };
    info!(call_id, "installing system call override");
    host::system_call::<_, PutObjectReturn>(ctx, ids::PUT_OBJECT, &put).map(|_| ())
}

fn get_object(ctx: &mut ExecutionContext, args: GetObjectArgs) -> Result<GetObjectReturn, ChainError> {
    let space = resolve_space(ctx, &args.space)?;
    let node = ctx.require_state_node()?;
    Ok(GetObjectReturn {
        value: node.get_object(&space, &args.key)?,
    })
}

fn put_object(ctx: &mut ExecutionContext, args: PutObjectArgs) -> Result<PutObjectReturn, ChainError> {
    if ctx.read_only() {
        return Err(ChainError::ReadOnlyContext);
    }
    let space = resolve_space(ctx, &args.space)?;
    let node = ctx.require_state_node()?;
    let size_delta = node.put_object(&space, &args.key, args.value.as_deref())?;
    Ok(PutObjectReturn { size_delta })
}

fn get_next_object(
    ctx: &mut ExecutionContext,
    args: GetObjectArgs,
) -> Result<GetNextObjectReturn, ChainError> {
    let space = resolve_space(ctx, &args.space)?;
    let node = ctx.require_state_node()?;
    Ok(GetNextObjectReturn {
        entry: node.get_next_object(&space, &args.key)?,
    })
}

fn get_prev_object(
    ctx: &mut ExecutionContext,
    args: GetObjectArgs,
) -> Result<GetNextObjectReturn, ChainError> {
    let space = resolve_space(ctx, &args.space)?;
    let node = ctx.require_state_node()?;
    Ok(GetNextObjectReturn {
        entry: node.get_prev_object(&space, &args.key)?,
    })
}

/// Run a contract at its entry point. The contract inherits the current
/// privilege and runs under its own stack frame; its return value is
/// whatever it stored with `set_contract_result`.
fn call_contract(
    ctx: &mut ExecutionContext,
    args: CallContractArgs,
) -> Result<CallContractReturn, ChainError> {
    let node = ctx.require_state_node()?;
    let bytecode = node
        .get_object(&spaces::contract_bytecode(), &args.contract_id)?
        .ok_or_else(|| ChainError::ContractNotFound(hex::encode(&args.contract_id)))?;
    let privilege = ctx.get_privilege()?;

    ctx.push_frame(StackFrame::contract(
        args.contract_id,
        args.entry_point,
        args.args,
        privilege,
    ))?;
    let vm = ctx.vm();
    let run = {
        let mut host = HostApi::new(ctx);
        vm.run(&mut host, &bytecode, args.entry_point)
    };
    let frame = ctx.pop_frame()?;

    match run {
        Ok(()) | Err(ChainError::ContractExit(0)) => Ok(CallContractReturn {
            value: frame.call_return,
        }),
        Err(e) => Err(e),
    }
}

fn get_entry_point(ctx: &mut ExecutionContext, _args: ()) -> Result<GetEntryPointReturn, ChainError> {
    Ok(GetEntryPointReturn {
        entry_point: ctx.get_contract_entry_point()?,
    })
}

fn get_contract_arguments(
    ctx: &mut ExecutionContext,
    _args: (),
) -> Result<GetContractArgumentsReturn, ChainError> {
    Ok(GetContractArgumentsReturn {
        value: ctx.get_contract_call_args()?,
    })
}

fn set_contract_result(
    ctx: &mut ExecutionContext,
    args: SetContractResultArgs,
) -> Result<(), ChainError> {
    ctx.set_contract_return(args.value)
}

/// Who called the currently-executing contract, and at what privilege.
///
/// The dispatcher frame and the contract's own frame are popped for the
/// duration of the query so the context resolves the frame the contract was
/// entered from, then both are restored.
fn get_caller(ctx: &mut ExecutionContext, _args: ()) -> Result<GetCallerReturn, ChainError> {
    let top = ctx.pop_frame()?;
    let current = ctx.pop_frame().ok();
    let ret = GetCallerReturn {
        caller: ctx.get_caller(),
        privilege: ctx.get_caller_privilege().value(),
    };
    if let Some(frame) = current {
        ctx.push_frame(frame)?;
    }
    ctx.push_frame(top)?;
    Ok(ret)
}

/// Authority gate for chain-management operations.
fn require_system_authority(ctx: &mut ExecutionContext, _args: ()) -> Result<(), ChainError> {
    if ctx.get_caller_privilege() != Privilege::KernelMode {
        return Err(ChainError::InsufficientPrivileges);
    }
    Ok(())
}

fn emit_event(ctx: &mut ExecutionContext, args: EmitEventArgs) -> Result<(), ChainError> {
    if ctx.read_only() {
        return Err(ChainError::ReadOnlyContext);
    }
    let event = Event {
        sequence: 0,
        source: ctx.get_caller(),
        name: args.name,
        data: args.data,
        impacted: args.impacted,
    };
    ctx.chronicler_mut().push_event(event);
    Ok(())
}

fn log(ctx: &mut ExecutionContext, args: LogArgs) -> Result<(), ChainError> {
    debug!(target: "contract", "{}", args.message);
    ctx.chronicler_mut().push_console(&args.message);
    Ok(())
}

fn exit_contract(_ctx: &mut ExecutionContext, args: ExitContractArgs) -> Result<(), ChainError> {
    Err(ChainError::ContractExit(args.exit_code))
}
