//! Event log and console output.

/// One event emitted during execution.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Event {
    /// Position in the accepted event log, assigned on acceptance.
    pub sequence: u32,
    /// Contract that emitted the event; empty for the system.
    pub source: Vec<u8>,
    pub name: String,
    pub data: Vec<u8>,
    pub impacted: Vec<Vec<u8>>,
}

/// Collects events and console output during block application.
///
/// While a session is open, events land in a pending buffer: they are
/// accepted into the log when the session ends successfully and dropped when
/// the transaction reverts.
#[derive(Default)]
pub struct Chronicler {
    session_open: bool,
    pending: Vec<Event>,
    events: Vec<Event>,
    console: String,
}

impl Chronicler {
    pub fn open_session(&mut self) {
        self.session_open = true;
        self.pending.clear();
    }

    /// Close the session, accepting or dropping its buffered events.
    pub fn close_session(&mut self, accept: bool) {
        if accept {
            let pending = std::mem::take(&mut self.pending);
            for event in pending {
                self.push_accepted(event);
            }
        } else {
            self.pending.clear();
        }
        self.session_open = false;
    }

    pub fn push_event(&mut self, event: Event) {
        if self.session_open {
            self.pending.push(event);
        } else {
            self.push_accepted(event);
        }
    }

    fn push_accepted(&mut self, mut event: Event) {
        event.sequence = self.events.len() as u32;
        self.events.push(event);
    }

    /// Append one line of console output.
    pub fn push_console(&mut self, line: &str) {
        self.console.push_str(line);
        self.console.push('\n');
    }

    pub fn events(&self) -> &[Event] {
        &self.events
    }

    pub fn take_events(&mut self) -> Vec<Event> {
        std::mem::take(&mut self.events)
    }

    pub fn take_console(&mut self) -> String {
        std::mem::take(&mut self.console)
    }
}
