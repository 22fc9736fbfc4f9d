//! Guest panic channel.
//!
//! The guest reports an unrecoverable fault through the `js_panic` import.
//! The report is captured as a [`PanicRecord`] and parked in the
//! [`PanicChannel`], whose state only ever moves forward:
//!
//! ```text
//! Running  -->  Reported(record)
//! ```
//!
//! The first report wins.  Later reports are ignored so that the session can
//! never be "un-terminated".

use std::fmt;

use serde::Serialize;

/// A structured guest fault: message, source path and line.
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct PanicRecord {
    /// Panic message; empty when the guest supplied none.
    pub message: String,
    /// Source file the panic originated from.
    pub file: String,
    /// Source line the panic originated from.
    pub line: u32,
}

impl PanicRecord {
    /// Build a new record.
    pub fn new(message: impl Into<String>, file: impl Into<String>, line: u32) -> Self {
        Self {
            message: message.into(),
            file: file.into(),
            line,
        }
    }

    /// Text presented to the end user when the session terminates.
    pub fn alert_text(&self) -> String {
        format!(
            "Caught a panic in {} at line {} :\n{}",
            self.file, self.line, self.message
        )
    }
}

impl fmt::Display for PanicRecord {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(
            f,
            "panicked in {} at line {}: {}",
            self.file, self.line, self.message
        )
    }
}

/// Lifecycle of the panic channel.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum PanicState {
    /// No panic has been reported.
    Running,
    /// A panic was reported; terminal.
    Reported(PanicRecord),
}

/// One-shot holder for the session's panic record.
#[derive(Debug)]
pub struct PanicChannel {
    state: PanicState,
}

impl PanicChannel {
    /// Create a channel in the `Running` state.
    pub fn new() -> Self {
        Self {
            state: PanicState::Running,
        }
    }

    /// Record a panic.
    ///
    /// Returns `true` if this report moved the channel into `Reported`, and
    /// `false` if a panic had already been recorded.
    pub fn report(&mut self, record: PanicRecord) -> bool {
        match &self.state {
            PanicState::Running => {
                tracing::error!(
                    file = %record.file,
                    line = record.line,
                    message = %record.message,
                    "guest reported panic"
                );
                self.state = PanicState::Reported(record);
                true
            }
            PanicState::Reported(first) => {
                tracing::warn!(
                    first_file = %first.file,
                    first_line = first.line,
                    ignored = %record,
                    "ignoring repeated guest panic"
                );
                false
            }
        }
    }

    /// Current state.
    pub fn state(&self) -> &PanicState {
        &self.state
    }

    /// Returns `true` once a panic has been reported.
    pub fn is_reported(&self) -> bool {
        matches!(self.state, PanicState::Reported(_))
    }

    /// The recorded panic, if any.
    pub fn record(&self) -> Option<&PanicRecord> {
        match &self.state {
            PanicState::Running => None,
            PanicState::Reported(record) => Some(record),
        }
    }
}

impl Default for PanicChannel {
    fn default() -> Self {
        Self::new()
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn new_channel_is_running() {
        let channel = PanicChannel::new();
        assert_eq!(channel.state(), &PanicState::Running);
        assert!(!channel.is_reported());
        assert!(channel.record().is_none());
    }

    #[test]
    fn first_report_wins() {
        let mut channel = PanicChannel::new();
        assert!(channel.report(PanicRecord::new("division by zero", "sim.src", 42)));
        assert!(!channel.report(PanicRecord::new("second", "other.src", 1)));

        let record = channel.record().expect("record must be present");
        assert_eq!(record.message, "division by zero");
        assert_eq!(record.file, "sim.src");
        assert_eq!(record.line, 42);
        assert!(channel.is_reported());
    }

    #[test]
    fn alert_text_contains_all_fields() {
        let record = PanicRecord::new("index out of range", "src/grid.rs", 118);
        assert_eq!(
            record.alert_text(),
            "Caught a panic in src/grid.rs at line 118 :\nindex out of range"
        );
    }

    #[test]
    fn empty_message_is_allowed() {
        let record = PanicRecord::new("", "src/main.rs", 3);
        assert_eq!(record.to_string(), "panicked in src/main.rs at line 3: ");
    }

    #[test]
    fn record_serializes_to_json() {
        let record = PanicRecord::new("oops", "a.rs", 9);
        let json = serde_json::to_value(&record).unwrap();
        assert_eq!(
            json,
            serde_json::json!({"message": "oops", "file": "a.rs", "line": 9})
        );
    }
}
