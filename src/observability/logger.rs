//! Structured JSON logger for aeroquery
//!
//! - One log line = one event
//! - `event` and `severity` first, then fields sorted by key
//! - Explicit severity levels
//! - Synchronous, written to stderr so stdout stays free for command output
//!
//! The compiler and the permission engine run on hot paths, so a
//! process-wide minimum severity gates output before any formatting work.

use std::collections::BTreeMap;
use std::fmt;
use std::io::{self, Write};
use std::str::FromStr;
use std::sync::atomic::{AtomicU8, Ordering};

use serde_json::{Map, Value};

/// Log severity levels
#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord)]
pub enum Severity {
    /// Per-operation detail (compilation, field filtering)
    Trace = 0,
    /// Normal operations
    Info = 1,
    /// Rejected input, recoverable issues
    Warn = 2,
    /// Operation failures
    Error = 3,
}

impl Severity {
    pub fn as_str(&self) -> &'static str {
        match self {
            Severity::Trace => "TRACE",
            Severity::Info => "INFO",
            Severity::Warn => "WARN",
            Severity::Error => "ERROR",
        }
    }

    fn from_u8(level: u8) -> Self {
        match level {
            0 => Severity::Trace,
            1 => Severity::Info,
            2 => Severity::Warn,
            _ => Severity::Error,
        }
    }
}

impl fmt::Display for Severity {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}", self.as_str())
    }
}

impl FromStr for Severity {
    type Err = String;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s.to_ascii_lowercase().as_str() {
            "trace" => Ok(Severity::Trace),
            "info" => Ok(Severity::Info),
            "warn" => Ok(Severity::Warn),
            "error" => Ok(Severity::Error),
            other => Err(format!("unknown log level '{}'", other)),
        }
    }
}

static MIN_SEVERITY: AtomicU8 = AtomicU8::new(Severity::Info as u8);

/// Process-wide JSON line logger
pub struct Logger;

impl Logger {
    /// Sets the process-wide minimum severity. Events below it are dropped.
    pub fn set_min_severity(severity: Severity) {
        MIN_SEVERITY.store(severity as u8, Ordering::Relaxed);
    }

    pub fn min_severity() -> Severity {
        Severity::from_u8(MIN_SEVERITY.load(Ordering::Relaxed))
    }

    /// Returns true if an event at `severity` would be written
    pub fn enabled(severity: Severity) -> bool {
        severity >= Self::min_severity()
    }

    /// Log an event with the given severity and fields
    pub fn log(severity: Severity, event: &str, fields: &[(&str, &str)]) {
        if !Self::enabled(severity) {
            return;
        }
        Self::log_to_writer(severity, event, fields, &mut io::stderr().lock());
    }

    fn log_to_writer<W: Write>(
        severity: Severity,
        event: &str,
        fields: &[(&str, &str)],
        writer: &mut W,
    ) {
        let sorted: BTreeMap<&str, &str> = fields.iter().copied().collect();

        let mut line = Map::with_capacity(sorted.len() + 2);
        line.insert("event".into(), Value::from(event));
        line.insert("severity".into(), Value::from(severity.as_str()));
        for (key, value) in sorted {
            line.insert(key.to_string(), Value::from(value));
        }

        let mut output = Value::Object(line).to_string();
        output.push('\n');

        // Single write per line; logging failures never surface to callers
        let _ = writer.write_all(output.as_bytes());
        let _ = writer.flush();
    }
}

/// Capture logs to a buffer for testing
#[cfg(test)]
pub fn capture_log(severity: Severity, event: &str, fields: &[(&str, &str)]) -> String {
    let mut buffer = Vec::new();
    Logger::log_to_writer(severity, event, fields, &mut buffer);
    String::from_utf8(buffer).unwrap()
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_severity_ordering() {
        assert!(Severity::Trace < Severity::Info);
        assert!(Severity::Info < Severity::Warn);
        assert!(Severity::Warn < Severity::Error);
    }

    #[test]
    fn test_parse_severity() {
        assert_eq!("warn".parse::<Severity>().unwrap(), Severity::Warn);
        assert_eq!("TRACE".parse::<Severity>().unwrap(), Severity::Trace);
        assert!("verbose".parse::<Severity>().is_err());
    }

    #[test]
    fn test_log_json_format() {
        let output = capture_log(Severity::Info, "CURSOR_RESET", &[]);

        let parsed: serde_json::Value = serde_json::from_str(&output).unwrap();
        assert_eq!(parsed["event"], "CURSOR_RESET");
        assert_eq!(parsed["severity"], "INFO");
    }

    #[test]
    fn test_log_deterministic_ordering() {
        let output1 = capture_log(
            Severity::Info,
            "TEST",
            &[("zebra", "1"), ("apple", "2"), ("mango", "3")],
        );
        let output2 = capture_log(
            Severity::Info,
            "TEST",
            &[("apple", "2"), ("mango", "3"), ("zebra", "1")],
        );

        assert_eq!(output1, output2);

        let apple_pos = output1.find("apple").unwrap();
        let zebra_pos = output1.find("zebra").unwrap();
        assert!(apple_pos < zebra_pos);
    }

    #[test]
    fn test_log_escapes_special_chars() {
        let output = capture_log(
            Severity::Warn,
            "TEST",
            &[("reason", "field \"tags\"\ninvalid")],
        );

        let parsed: serde_json::Value = serde_json::from_str(&output).unwrap();
        assert_eq!(parsed["reason"], "field \"tags\"\ninvalid");
        assert_eq!(output.chars().filter(|c| *c == '\n').count(), 1);
    }
}
