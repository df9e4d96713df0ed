//! Thunk registry and dispatcher.
//!
//! A thunk is a native function registered under a stable syscall id. The
//! registry is populated once at startup; dispatch decodes the borsh
//! argument blob, debits the caller's resource session by the thunk's
//! published compute bandwidth, runs the function, and enforces the caller's
//! return-buffer limit.

pub mod system;

use std::sync::Arc;

use borsh::{BorshDeserialize, BorshSerialize};
use rustc_hash::FxHashMap;

use crate::context::ExecutionContext;
use crate::error::ChainError;

/// Stable syscall ids of the native thunks.
pub mod ids {
    pub const GET_HEAD_INFO: u32 = 1;
    pub const APPLY_BLOCK: u32 = 2;
    pub const APPLY_TRANSACTION: u32 = 3;
    pub const PUT_OBJECT: u32 = 4;
    pub const GET_OBJECT: u32 = 5;
    pub const GET_NEXT_OBJECT: u32 = 6;
    pub const GET_PREV_OBJECT: u32 = 7;
    pub const CALL_CONTRACT: u32 = 8;
    pub const GET_ENTRY_POINT: u32 = 9;
    pub const GET_CONTRACT_ARGUMENTS: u32 = 10;
    pub const SET_CONTRACT_RESULT: u32 = 11;
    pub const GET_CALLER: u32 = 12;
    pub const REQUIRE_SYSTEM_AUTHORITY: u32 = 13;
    pub const EMIT_EVENT: u32 = 14;
    pub const LOG: u32 = 15;
    pub const EXIT_CONTRACT: u32 = 16;
}

type ThunkFn = Box<dyn Fn(&mut ExecutionContext, &[u8]) -> Result<Vec<u8>, ChainError> + Send + Sync>;

struct Thunk {
    name: &'static str,
    run: ThunkFn,
}

pub struct ThunkDispatcher {
    thunks: FxHashMap<u32, Thunk>,
}

impl Default for ThunkDispatcher {
    fn default() -> Self {
        Self::new()
    }
}

impl ThunkDispatcher {
    /// Registry with every native thunk installed.
    pub fn new() -> Self {
        let mut dispatcher = Self {
            thunks: FxHashMap::default(),
        };
        system::register_all(&mut dispatcher);
        dispatcher
    }

    pub fn shared() -> Arc<Self> {
        Arc::new(Self::new())
    }

    pub(crate) fn register<A, R>(
        &mut self,
        id: u32,
        name: &'static str,
        f: fn(&mut ExecutionContext, A) -> Result<R, ChainError>,
    ) where
        A: BorshDeserialize,
        R: BorshSerialize,
    {
        let thunk = Thunk {
            name,
            run: Box::new(move |ctx, raw| {
                let args = A::try_from_slice(raw).map_err(|e| {
                    ChainError::UnexpectedState(format!("malformed arguments for {name}: {e}"))
                })?;
                let ret = f(ctx, args)?;
                Ok(borsh::to_vec(&ret).unwrap_or_default())
            }),
        };
        self.thunks.insert(id, thunk);
    }

    pub fn contains(&self, id: u32) -> bool {
        self.thunks.contains_key(&id)
    }

    pub fn name_of(&self, id: u32) -> Option<&'static str> {
        self.thunks.get(&id).map(|thunk| thunk.name)
    }

    /// Registered thunk names, for seeding the compute bandwidth registry.
    pub fn names(&self) -> Vec<&'static str> {
        self.thunks.values().map(|thunk| thunk.name).collect()
    }

    /// Execute the thunk registered under `id`.
    ///
    /// Debits the active resource session by the thunk's published compute
    /// bandwidth before running. The produced return must fit `ret_limit`
    /// bytes.
    pub fn call_thunk(
        &self,
        id: u32,
        ctx: &mut ExecutionContext,
        args: &[u8],
        ret_limit: usize,
    ) -> Result<Vec<u8>, ChainError> {
        let thunk = self.thunks.get(&id).ok_or(ChainError::ThunkNotFound(id))?;
        if ctx.resource_meter().session().is_some() {
            let compute = ctx.get_compute_bandwidth(thunk.name)?;
            ctx.resource_meter_mut().use_compute(compute)?;
        }
        let ret = (thunk.run)(ctx, args)?;
        if ret.len() > ret_limit {
            return Err(ChainError::InsufficientReturnBuffer {
                needed: ret.len(),
                have: ret_limit,
            });
        }
        Ok(ret)
    }
}
