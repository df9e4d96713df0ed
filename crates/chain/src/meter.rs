//! Resource metering.

use std::sync::atomic::{AtomicI64, Ordering};
use std::sync::Arc;

use crate::error::ChainError;

/// Resource budget of one transaction.
///
/// Both the meter and the chronicler observe the active session: the meter
/// debits it on every syscall, the chronicler attributes events to it.
pub struct Session {
    initial: u64,
    remaining: AtomicI64,
}

impl Session {
    pub fn new(resource_limit: u64) -> Arc<Self> {
        Arc::new(Self {
            initial: resource_limit,
            remaining: AtomicI64::new(resource_limit.min(i64::MAX as u64) as i64),
        })
    }

    pub fn remaining(&self) -> i64 {
        self.remaining.load(Ordering::Acquire)
    }

    pub fn used(&self) -> u64 {
        self.initial.saturating_sub(self.remaining().max(0) as u64)
    }

    /// Debit `ticks`; running below zero is an [`ChainError::OutOfResources`].
    pub fn debit(&self, ticks: u64) -> Result<(), ChainError> {
        let ticks = ticks.min(i64::MAX as u64) as i64;
        let after = self.remaining.fetch_sub(ticks, Ordering::AcqRel) - ticks;
        if after < 0 {
            return Err(ChainError::OutOfResources);
        }
        Ok(())
    }
}

/// Per-context meter: total compute consumed plus the active session.
#[derive(Default)]
pub struct ResourceMeter {
    session: Option<Arc<Session>>,
    compute_used: u64,
}

impl ResourceMeter {
    pub fn set_session(&mut self, session: Arc<Session>) {
        self.session = Some(session);
    }

    pub fn clear_session(&mut self) {
        self.session = None;
    }

    pub fn session(&self) -> Option<&Arc<Session>> {
        self.session.as_ref()
    }

    /// Record `ticks` of compute and debit the active session, if any.
    pub fn use_compute(&mut self, ticks: u64) -> Result<(), ChainError> {
        self.compute_used = self.compute_used.saturating_add(ticks);
        if let Some(session) = &self.session {
            session.debit(ticks)?;
        }
        Ok(())
    }

    pub fn compute_used(&self) -> u64 {
        self.compute_used
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn session_underflow_is_out_of_resources() {
        let session = Session::new(100);
        session.debit(60).unwrap();
        session.debit(40).unwrap();
        assert_eq!(session.remaining(), 0);
        assert!(matches!(session.debit(1), Err(ChainError::OutOfResources)));
    }

    #[test]
    fn meter_counts_compute_with_and_without_session() {
        let mut meter = ResourceMeter::default();
        meter.use_compute(10).unwrap();
        assert_eq!(meter.compute_used(), 10);

        let session = Session::new(5);
        meter.set_session(Arc::clone(&session));
        assert!(matches!(
            meter.use_compute(10),
            Err(ChainError::OutOfResources)
        ));
        // The total still accounts for the attempted debit.
        assert_eq!(meter.compute_used(), 20);
    }
}
