//! User-facing alert channel.
//!
//! Alerts are synchronous: [`AlertSink::alert`] does not return until the
//! user has dismissed the message.  Because the whole session runs on one
//! thread of control, an open alert blocks every other host function and
//! guest call.

use std::io::{self, BufRead, IsTerminal, Write};
use std::sync::{Arc, Mutex};

/// Presents text to the end user and blocks until it is dismissed.
pub trait AlertSink: Send {
    /// Show `message` modally.
    fn alert(&mut self, message: &str);
}

/// Alert sink writing to stderr.
///
/// When `interactive` is set and stdin is a terminal, the sink waits for the
/// user to press Enter before returning.
#[derive(Debug, Clone)]
pub struct ConsoleAlert {
    interactive: bool,
}

impl ConsoleAlert {
    /// Create a console sink.
    pub fn new(interactive: bool) -> Self {
        Self { interactive }
    }
}

impl AlertSink for ConsoleAlert {
    fn alert(&mut self, message: &str) {
        let mut stderr = io::stderr().lock();
        let _ = writeln!(stderr, "\n[alert] {message}");

        if self.interactive && io::stdin().is_terminal() {
            let _ = write!(stderr, "[press Enter to dismiss] ");
            let _ = stderr.flush();
            let mut line = String::new();
            if let Err(err) = io::stdin().lock().read_line(&mut line) {
                tracing::warn!(error = %err, "failed to wait for alert dismissal");
            }
        }
    }
}

/// Alert sink that records every message.
///
/// Clones share the same buffer, so a test can keep one handle while the
/// session owns the other.
#[derive(Debug, Clone, Default)]
pub struct RecordingAlerts {
    messages: Arc<Mutex<Vec<String>>>,
}

impl RecordingAlerts {
    /// Create an empty recorder.
    pub fn new() -> Self {
        Self::default()
    }

    /// Snapshot of all recorded messages, oldest first.
    pub fn messages(&self) -> Vec<String> {
        self.messages
            .lock()
            .map(|m| m.clone())
            .unwrap_or_default()
    }
}

impl AlertSink for RecordingAlerts {
    fn alert(&mut self, message: &str) {
        if let Ok(mut messages) = self.messages.lock() {
            messages.push(message.to_owned());
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn recording_alerts_keep_order() {
        let recorder = RecordingAlerts::new();
        let mut sink: Box<dyn AlertSink> = Box::new(recorder.clone());
        sink.alert("first");
        sink.alert("second");
        assert_eq!(recorder.messages(), vec!["first", "second"]);
    }

    #[test]
    fn non_interactive_console_alert_returns() {
        let mut sink = ConsoleAlert::new(false);
        sink.alert("this goes to stderr");
    }
}
