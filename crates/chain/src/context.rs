//! Per-transaction execution context.
//!
//! Owns the ambient state a syscall can observe: the writable state node and
//! its read-through parent, the block and transaction being applied, the
//! bounded call stack, the resource meter, and the event log. The context is
//! an explicit handle threaded through every thunk; it never crosses
//! threads.

use std::sync::Arc;

use arbor_common::{Block, ComputeBandwidthRegistry, Transaction};
use arbor_statedb::{ObjectSpace, StateNode};
use borsh::BorshDeserialize;
use rustc_hash::FxHashMap;

use crate::chronicler::Chronicler;
use crate::error::ChainError;
use crate::frame::{StackFrame, STACK_LIMIT};
use crate::meter::{ResourceMeter, Session};
use crate::privilege::{Intent, Privilege};
use crate::receipt::Receipt;
use crate::thunk::ThunkDispatcher;
use crate::vm::VmBackend;

pub struct ExecutionContext {
    vm: Arc<dyn VmBackend>,
    dispatcher: Arc<ThunkDispatcher>,
    intent: Intent,
    current_node: Option<StateNode>,
    parent_node: Option<StateNode>,
    block: Option<Block>,
    transaction: Option<Transaction>,
    stack: Vec<StackFrame>,
    meter: ResourceMeter,
    chronicler: Chronicler,
    receipt: Receipt,
    bandwidth_cache: FxHashMap<String, u64>,
}

impl ExecutionContext {
    pub fn new(vm: Arc<dyn VmBackend>, dispatcher: Arc<ThunkDispatcher>, intent: Intent) -> Self {
        Self {
            vm,
            dispatcher,
            intent,
            current_node: None,
            parent_node: None,
            block: None,
            transaction: None,
            stack: Vec::new(),
            meter: ResourceMeter::default(),
            chronicler: Chronicler::default(),
            receipt: Receipt::default(),
            bandwidth_cache: FxHashMap::default(),
        }
    }

    pub fn vm(&self) -> Arc<dyn VmBackend> {
        Arc::clone(&self.vm)
    }

    pub fn dispatcher(&self) -> Arc<ThunkDispatcher> {
        Arc::clone(&self.dispatcher)
    }

    pub fn intent(&self) -> Intent {
        self.intent
    }

    /// True iff mutating syscalls must be rejected.
    pub fn read_only(&self) -> bool {
        self.intent == Intent::ReadOnly
    }

    /* State nodes */

    /// Install the node being written and its read-through parent. When
    /// `parent` is `None` it is inferred from the node itself.
    pub fn set_state_node(&mut self, node: Option<StateNode>, parent: Option<StateNode>) {
        self.parent_node = match (&node, parent) {
            (_, Some(parent)) => Some(parent),
            (Some(node), None) => node.parent(),
            (None, None) => None,
        };
        self.current_node = node;
    }

    pub fn state_node(&self) -> Option<&StateNode> {
        self.current_node.as_ref()
    }

    /// The read-through parent; falls back to the current node for genesis.
    pub fn parent_node(&self) -> Option<&StateNode> {
        self.parent_node.as_ref().or(self.current_node.as_ref())
    }

    pub fn clear_state_node(&mut self) {
        self.current_node = None;
        self.parent_node = None;
    }

    /// The current node, or the invariant violation explaining its absence.
    pub fn require_state_node(&self) -> Result<&StateNode, ChainError> {
        self.current_node
            .as_ref()
            .ok_or_else(|| ChainError::UnexpectedState("no state node".into()))
    }

    /* Block and transaction */

    pub fn set_block(&mut self, block: Block) {
        self.block = Some(block);
    }

    pub fn block(&self) -> Option<&Block> {
        self.block.as_ref()
    }

    pub fn clear_block(&mut self) {
        self.block = None;
    }

    pub fn set_transaction(&mut self, transaction: Transaction) {
        self.transaction = Some(transaction);
    }

    pub fn transaction(&self) -> Result<&Transaction, ChainError> {
        self.transaction
            .as_ref()
            .ok_or_else(|| ChainError::UnexpectedState("transaction does not exist".into()))
    }

    pub fn clear_transaction(&mut self) {
        self.transaction = None;
    }

    /* Call stack */

    pub fn push_frame(&mut self, frame: StackFrame) -> Result<(), ChainError> {
        if self.stack.len() >= STACK_LIMIT {
            return Err(ChainError::StackOverflow);
        }
        self.stack.push(frame);
        Ok(())
    }

    pub fn pop_frame(&mut self) -> Result<StackFrame, ChainError> {
        self.stack.pop().ok_or(ChainError::StackException)
    }

    /// Run `f` under `frame`; the frame is popped again even when `f` fails.
    pub fn with_frame<T>(
        &mut self,
        frame: StackFrame,
        f: impl FnOnce(&mut Self) -> Result<T, ChainError>,
    ) -> Result<T, ChainError> {
        self.push_frame(frame)?;
        let result = f(self);
        let popped = self.pop_frame();
        match (result, popped) {
            (Ok(value), Ok(_)) => Ok(value),
            (Err(e), _) => Err(e),
            (Ok(_), Err(e)) => Err(e),
        }
    }

    pub fn stack_depth(&self) -> usize {
        self.stack.len()
    }

    /// Contract id of the most-recent frame beneath the top; the empty
    /// system id when the stack holds a single (kernel-origin) frame.
    pub fn get_caller(&self) -> Vec<u8> {
        if self.stack.len() > 1 {
            self.stack[self.stack.len() - 2].contract_id.clone()
        } else {
            Vec::new()
        }
    }

    /// Privilege one frame below the top, defaulting to kernel mode when
    /// there is no beneath-frame.
    pub fn get_caller_privilege(&self) -> Privilege {
        if self.stack.len() > 1 {
            self.stack[self.stack.len() - 2].call_privilege
        } else {
            Privilege::KernelMode
        }
    }

    pub fn get_caller_entry_point(&self) -> u32 {
        if self.stack.len() > 1 {
            self.stack[self.stack.len() - 2].entry_point
        } else {
            0
        }
    }

    pub fn get_privilege(&self) -> Result<Privilege, ChainError> {
        self.stack
            .last()
            .map(|frame| frame.call_privilege)
            .ok_or(ChainError::StackException)
    }

    pub fn set_privilege(&mut self, privilege: Privilege) -> Result<(), ChainError> {
        let frame = self.stack.last_mut().ok_or(ChainError::StackException)?;
        frame.call_privilege = privilege;
        Ok(())
    }

    /// Nearest non-empty contract id scanning from the top down; empty for
    /// pure system execution.
    pub fn get_contract_id(&self) -> Vec<u8> {
        for frame in self.stack.iter().rev() {
            if !frame.contract_id.is_empty() {
                return frame.contract_id.clone();
            }
        }
        Vec::new()
    }

    /* Caller-frame accessors: the frame beneath the top is the contract a
     * syscall frame was entered from. */

    pub fn get_contract_call_args(&self) -> Result<Vec<u8>, ChainError> {
        if self.stack.len() > 1 {
            Ok(self.stack[self.stack.len() - 2].call_args.clone())
        } else {
            Err(ChainError::StackException)
        }
    }

    pub fn get_contract_entry_point(&self) -> Result<u32, ChainError> {
        if self.stack.len() > 1 {
            Ok(self.stack[self.stack.len() - 2].entry_point)
        } else {
            Err(ChainError::StackException)
        }
    }

    pub fn set_contract_return(&mut self, ret: Vec<u8>) -> Result<(), ChainError> {
        let len = self.stack.len();
        if len > 1 {
            self.stack[len - 2].call_return = ret;
            Ok(())
        } else {
            Err(ChainError::StackException)
        }
    }

    /* Metering and events */

    pub fn resource_meter(&self) -> &ResourceMeter {
        &self.meter
    }

    pub fn resource_meter_mut(&mut self) -> &mut ResourceMeter {
        &mut self.meter
    }

    pub fn chronicler(&self) -> &Chronicler {
        &self.chronicler
    }

    pub fn chronicler_mut(&mut self) -> &mut Chronicler {
        &mut self.chronicler
    }

    /// Open a resource session with budget `rc`; the meter and chronicler
    /// both observe it.
    pub fn make_session(&mut self, rc: u64) -> Arc<Session> {
        let session = Session::new(rc);
        self.meter.set_session(Arc::clone(&session));
        self.chronicler.open_session();
        session
    }

    /// Close the active session; `accept` keeps its events, otherwise they
    /// are dropped with the reverted transaction.
    pub fn finish_session(&mut self, accept: bool) {
        self.chronicler.close_session(accept);
        self.meter.clear_session();
    }

    pub fn receipt(&self) -> &Receipt {
        &self.receipt
    }

    pub fn receipt_mut(&mut self) -> &mut Receipt {
        &mut self.receipt
    }

    /// Close out the context: fold events, console output, and compute use
    /// into the receipt and hand it over.
    pub fn into_receipt(mut self) -> Receipt {
        self.receipt.events = self.chronicler.take_events();
        self.receipt.console_output = self.chronicler.take_console();
        self.receipt.compute_used = self.meter.compute_used();
        self.receipt
    }

    /// Published compute cost of a thunk, read from the compute bandwidth
    /// registry in the metadata space and cached per context.
    pub fn get_compute_bandwidth(&mut self, thunk_name: &str) -> Result<u64, ChainError> {
        if let Some(compute) = self.bandwidth_cache.get(thunk_name) {
            return Ok(*compute);
        }
        let node = self.require_state_node()?;
        let raw = node
            .get_object(
                &ObjectSpace::metadata(),
                arbor_statedb::keys::COMPUTE_BANDWIDTH_REGISTRY,
            )?
            .ok_or_else(|| {
                ChainError::UnexpectedState("compute bandwidth registry does not exist".into())
            })?;
        let registry = ComputeBandwidthRegistry::try_from_slice(&raw)
            .map_err(|e| ChainError::UnexpectedState(format!("corrupt bandwidth registry: {e}")))?;
        let compute = registry.compute_for(thunk_name).ok_or_else(|| {
            ChainError::UnexpectedState(format!("no compute bandwidth for {thunk_name}"))
        })?;
        self.bandwidth_cache.insert(thunk_name.to_string(), compute);
        Ok(compute)
    }
}
