//! Where user-facing error reports go.
//!
//! Backends never print on their own. They are handed a sink and report
//! every failure through it before returning the error.

use std::sync::{Arc, Mutex};

use tracing::error;

use crate::constants::PROGNAME;

pub trait DiagnosticSink {
    fn report(&self, message: &str);
}

/// Forwards reports to `tracing` at error level, prefixed with the
/// program name.
#[derive(Debug, Clone)]
pub struct TracingSink {
    progname: String,
}

impl TracingSink {
    pub fn new(progname: impl Into<String>) -> Self {
        TracingSink {
            progname: progname.into(),
        }
    }
}

impl Default for TracingSink {
    fn default() -> Self {
        TracingSink::new(PROGNAME)
    }
}

impl DiagnosticSink for TracingSink {
    fn report(&self, message: &str) {
        error!("{}: {}", self.progname, message);
    }
}

/// Keeps reports in memory. Clones share the same buffer.
#[derive(Debug, Clone, Default)]
pub struct MemorySink {
    messages: Arc<Mutex<Vec<String>>>,
}

impl MemorySink {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn messages(&self) -> Vec<String> {
        match self.messages.lock() {
            Ok(messages) => messages.clone(),
            Err(poisoned) => poisoned.into_inner().clone(),
        }
    }
}

impl DiagnosticSink for MemorySink {
    fn report(&self, message: &str) {
        let mut messages = match self.messages.lock() {
            Ok(messages) => messages,
            Err(poisoned) => poisoned.into_inner(),
        };
        messages.push(message.to_owned());
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn memory_sink_clones_share_messages() {
        let sink = MemorySink::new();
        let handle = sink.clone();

        sink.report("first");
        handle.report("second");

        assert_eq!(sink.messages(), vec!["first", "second"]);
    }
}
