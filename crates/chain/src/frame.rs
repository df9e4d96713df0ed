use crate::privilege::Privilege;

/// Maximum call-stack depth.
pub const STACK_LIMIT: usize = 256;

/// One frame of the execution-context call stack.
///
/// An empty `contract_id` denotes the system (kernel origin): synthetic
/// dispatcher frames and the frames the block applier runs under.
#[derive(Debug, Clone, Default)]
pub struct StackFrame {
    pub contract_id: Vec<u8>,
    pub entry_point: u32,
    pub call_args: Vec<u8>,
    pub call_return: Vec<u8>,
    pub call_privilege: Privilege,
}

impl StackFrame {
    /// A system frame with no contract identity.
    pub fn system(privilege: Privilege) -> Self {
        Self {
            call_privilege: privilege,
            ..Self::default()
        }
    }

    /// The frame a contract invocation runs under.
    pub fn contract(
        contract_id: Vec<u8>,
        entry_point: u32,
        call_args: Vec<u8>,
        privilege: Privilege,
    ) -> Self {
        Self {
            contract_id,
            entry_point,
            call_args,
            call_return: Vec::new(),
            call_privilege: privilege,
        }
    }

    pub fn is_system(&self) -> bool {
        self.contract_id.is_empty()
    }
}
