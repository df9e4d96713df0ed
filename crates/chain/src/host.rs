//! Host API: the two entry points contract code can reach.
//!
//! `invoke_thunk` jumps straight to a registered native thunk and is only
//! legal from kernel-mode frames. `invoke_system_call` is the general entry:
//! it consults the dispatch space for a user-installed override and falls
//! through to the native thunk of the same id.

use arbor_common::SystemCallTarget;
use arbor_statedb::keys;
use borsh::{BorshDeserialize, BorshSerialize};

use crate::context::ExecutionContext;
use crate::error::ChainError;
use crate::frame::StackFrame;
use crate::privilege::Privilege;
use crate::thunk::system::{CallContractArgs, CallContractReturn, GetObjectArgs, GetObjectReturn};
use crate::thunk::ids;

/// Borrowed by the VM for the duration of one contract execution.
pub struct HostApi<'a> {
    ctx: &'a mut ExecutionContext,
}

impl<'a> HostApi<'a> {
    pub fn new(ctx: &'a mut ExecutionContext) -> Self {
        Self { ctx }
    }

    pub fn context(&mut self) -> &mut ExecutionContext {
        self.ctx
    }

    /// Directly execute a native thunk. Kernel-mode frames only.
    pub fn invoke_thunk(
        &mut self,
        tid: u32,
        ret_limit: usize,
        args: &[u8],
    ) -> Result<Vec<u8>, ChainError> {
        if self.ctx.get_privilege()? != Privilege::KernelMode {
            return Err(ChainError::InsufficientPrivileges);
        }
        let dispatcher = self.ctx.dispatcher();
        dispatcher.call_thunk(tid, self.ctx, args, ret_limit)
    }

    /// Resolve and execute a system call. Callable from any privilege.
    pub fn invoke_system_call(
        &mut self,
        sid: u32,
        ret_limit: usize,
        args: &[u8],
    ) -> Result<Vec<u8>, ChainError> {
        invoke_system_call(self.ctx, sid, args, ret_limit)
    }
}

/// System-call resolution.
///
/// 1. Look the id up in the dispatch space (under a synthetic kernel frame).
/// 2. Absent: pass through to the native thunk of the same id, executed
///    under the caller's current privilege.
/// 3. A thunk-id override: that thunk, under the caller's privilege.
/// 4. A contract bundle: kernel-mode frame, re-enter the VM through
///    `call_contract`, bounded by the caller's return buffer.
pub fn invoke_system_call(
    ctx: &mut ExecutionContext,
    sid: u32,
    args: &[u8],
    ret_limit: usize,
) -> Result<Vec<u8>, ChainError> {
    let dispatcher = ctx.dispatcher();

    let lookup = GetObjectArgs {
        space: keys::SYSTEM_CALL_DISPATCH.to_vec(),
        key: sid.to_be_bytes().to_vec(),
    };
    let recorded: GetObjectReturn =
        ctx.with_frame(StackFrame::system(Privilege::KernelMode), |ctx| {
            let raw = dispatcher.call_thunk(ids::GET_OBJECT, ctx, &encode(&lookup), usize::MAX)?;
            decode(&raw)
        })?;

    let target = match recorded.value {
        Some(raw) => SystemCallTarget::try_from_slice(&raw).map_err(|e| {
            ChainError::UnexpectedState(format!("corrupt system call target for {sid}: {e}"))
        })?,
        None => SystemCallTarget::Thunk(sid),
    };

    match target {
        SystemCallTarget::Thunk(tid) => {
            let privilege = ctx.get_privilege().unwrap_or(Privilege::KernelMode);
            ctx.with_frame(StackFrame::system(privilege), |ctx| {
                dispatcher.call_thunk(tid, ctx, args, ret_limit)
            })
        }
        SystemCallTarget::Bundle {
            contract_id,
            entry_point,
        } => {
            let call = CallContractArgs {
                contract_id,
                entry_point,
                args: args.to_vec(),
            };
            let ret: CallContractReturn =
                ctx.with_frame(StackFrame::system(Privilege::KernelMode), |ctx| {
                    let raw =
                        dispatcher.call_thunk(ids::CALL_CONTRACT, ctx, &encode(&call), usize::MAX)?;
                    decode(&raw)
                })?;
            if ret.value.len() > ret_limit {
                return Err(ChainError::InsufficientReturnBuffer {
                    needed: ret.value.len(),
                    have: ret_limit,
                });
            }
            Ok(ret.value)
        }
    }
}

/// Typed system-call invocation for in-process callers.
pub fn system_call<A, R>(ctx: &mut ExecutionContext, sid: u32, args: &A) -> Result<R, ChainError>
where
    A: BorshSerialize,
    R: BorshDeserialize,
{
    let raw = invoke_system_call(ctx, sid, &encode(args), usize::MAX)?;
    decode(&raw)
}

fn encode<T: BorshSerialize>(value: &T) -> Vec<u8> {
    borsh::to_vec(value).unwrap_or_default()
}

fn decode<T: BorshDeserialize>(raw: &[u8]) -> Result<T, ChainError> {
    T::try_from_slice(raw)
        .map_err(|e| ChainError::UnexpectedState(format!("malformed thunk return: {e}")))
}
