//! Structured JSON logger
//!
//! Per OBSERVABILITY.md:
//! - Structured logs (JSON), one line = one event
//! - Deterministic key ordering (alphabetical)
//! - Explicit severity levels
//! - Synchronous, no buffering
//!
//! The logger is a value, not a global: subsystems receive a clone at
//! construction time and tag every line with their subsystem name.

use std::fmt;
use std::io::{self, Write};

/// Log severity levels.
#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord)]
pub enum Severity {
    /// Debug-level detail
    Trace = 0,
    /// Normal operations
    Info = 1,
    /// Recoverable issues (tier skipped, flush retried)
    Warn = 2,
    /// Operation failures
    Error = 3,
    /// Unrecoverable state
    Fatal = 4,
}

impl Severity {
    pub fn as_str(&self) -> &'static str {
        match self {
            Severity::Trace => "TRACE",
            Severity::Info => "INFO",
            Severity::Warn => "WARN",
            Severity::Error => "ERROR",
            Severity::Fatal => "FATAL",
        }
    }
}

impl fmt::Display for Severity {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}", self.as_str())
    }
}

/// A structured logger with a subsystem tag and a severity floor.
///
/// Lines below the floor are dropped. WARN and above go to stderr,
/// everything else to stdout.
#[derive(Debug, Clone)]
pub struct Logger {
    subsystem: &'static str,
    floor: Severity,
}

impl Logger {
    /// Create a logger for the given subsystem.
    pub fn new(subsystem: &'static str, floor: Severity) -> Self {
        Self { subsystem, floor }
    }

    /// Derive a logger for a different subsystem with the same floor.
    pub fn for_subsystem(&self, subsystem: &'static str) -> Self {
        Self {
            subsystem,
            floor: self.floor,
        }
    }

    /// Log an event with the given severity and fields.
    ///
    /// Fields are emitted in deterministic order (alphabetical by key).
    pub fn log(&self, severity: Severity, event: &str, fields: &[(&str, &str)]) {
        if severity < self.floor {
            return;
        }
        if severity >= Severity::Warn {
            self.log_to_writer(severity, event, fields, &mut io::stderr());
        } else {
            self.log_to_writer(severity, event, fields, &mut io::stdout());
        }
    }

    /// INFO shorthand.
    pub fn info(&self, event: &str, fields: &[(&str, &str)]) {
        self.log(Severity::Info, event, fields);
    }

    /// WARN shorthand.
    pub fn warn(&self, event: &str, fields: &[(&str, &str)]) {
        self.log(Severity::Warn, event, fields);
    }

    /// ERROR shorthand.
    pub fn error(&self, event: &str, fields: &[(&str, &str)]) {
        self.log(Severity::Error, event, fields);
    }

    fn log_to_writer<W: Write>(
        &self,
        severity: Severity,
        event: &str,
        fields: &[(&str, &str)],
        writer: &mut W,
    ) {
        // Build JSON manually: stable ordering, no allocator churn beyond
        // the one output string.
        let mut output = String::with_capacity(256);

        output.push('{');

        output.push_str("\"event\":\"");
        Self::escape_json_string(&mut output, event);
        output.push('"');

        output.push_str(",\"severity\":\"");
        output.push_str(severity.as_str());
        output.push('"');

        output.push_str(",\"subsystem\":\"");
        Self::escape_json_string(&mut output, self.subsystem);
        output.push('"');

        let mut sorted_fields: Vec<_> = fields.iter().collect();
        sorted_fields.sort_by_key(|(k, _)| *k);

        for (key, value) in sorted_fields {
            output.push_str(",\"");
            Self::escape_json_string(&mut output, key);
            output.push_str("\":\"");
            Self::escape_json_string(&mut output, value);
            output.push('"');
        }

        output.push('}');
        output.push('\n');

        // Logging failure never fails the logged operation.
        let _ = writer.write_all(output.as_bytes());
        let _ = writer.flush();
    }

    fn escape_json_string(output: &mut String, s: &str) {
        for c in s.chars() {
            match c {
                '"' => output.push_str("\\\""),
                '\\' => output.push_str("\\\\"),
                '\n' => output.push_str("\\n"),
                '\r' => output.push_str("\\r"),
                '\t' => output.push_str("\\t"),
                c if c.is_control() => {
                    output.push_str(&format!("\\u{:04x}", c as u32));
                }
                c => output.push(c),
            }
        }
    }
}

impl Default for Logger {
    fn default() -> Self {
        Self::new("core", Severity::Info)
    }
}
