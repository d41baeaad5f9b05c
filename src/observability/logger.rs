//! Structured JSON logger
//!
//! One log line per event, deterministic key ordering (event and severity
//! first, remaining fields alphabetical), synchronous writes.

use std::fmt;
use std::io::{self, Write};

use serde_json::{Map, Value};

use super::events::FreshEvent;

/// Log severity levels.
#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord)]
pub enum Severity {
    /// Debug-level detail
    Trace = 0,
    /// Normal operations
    Info = 1,
    /// Recoverable issues
    Warn = 2,
    /// Operation failures
    Error = 3,
}

impl Severity {
    /// String representation.
    pub fn as_str(&self) -> &'static str {
        match self {
            Severity::Trace => "TRACE",
            Severity::Info => "INFO",
            Severity::Warn => "WARN",
            Severity::Error => "ERROR",
        }
    }
}

impl fmt::Display for Severity {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}", self.as_str())
    }
}

/// Structured logger for freshening events.
pub struct Logger;

impl Logger {
    /// Log an event with the given severity and fields to stdout.
    pub fn log(severity: Severity, event: FreshEvent, fields: &[(&str, &str)]) {
        Self::log_to_writer(severity, event, fields, &mut io::stdout());
    }

    /// Log to stderr (for warnings and errors).
    pub fn log_stderr(severity: Severity, event: FreshEvent, fields: &[(&str, &str)]) {
        Self::log_to_writer(severity, event, fields, &mut io::stderr());
    }

    fn log_to_writer<W: Write>(
        severity: Severity,
        event: FreshEvent,
        fields: &[(&str, &str)],
        writer: &mut W,
    ) {
        let line = Self::render(severity, event, fields);
        let _ = writeln!(writer, "{}", line);
        let _ = writer.flush();
    }

    /// Render one log line. serde_json::Map preserves insertion order, so
    /// event and severity always lead; fields are inserted sorted.
    fn render(severity: Severity, event: FreshEvent, fields: &[(&str, &str)]) -> String {
        let mut object = Map::with_capacity(fields.len() + 2);
        object.insert("event".into(), Value::String(event.as_str().into()));
        object.insert("severity".into(), Value::String(severity.as_str().into()));

        let mut sorted: Vec<_> = fields.to_vec();
        sorted.sort_by_key(|(k, _)| *k);
        for (key, value) in sorted {
            object.insert(key.into(), Value::String(value.into()));
        }

        Value::Object(object).to_string()
    }
}
