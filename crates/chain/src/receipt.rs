use arbor_common::Multihash;

use crate::chronicler::Event;

/// Summary of one block or transaction application.
#[derive(Debug, Default)]
pub struct Receipt {
    pub events: Vec<Event>,
    pub console_output: String,
    pub compute_used: u64,
    /// Transactions that reverted during block application. Their state
    /// changes were dropped; the block itself stands.
    pub failed_transactions: Vec<Multihash>,
}
