#![deny(
    clippy::all,
    clippy::pedantic,
    clippy::nursery,
    missing_docs,
    rust_2018_idioms
)]

//! Structured JSON logging shared across every Zappy component. Every
//! component logs through a [`JsonLogger`] with a short dotted event name
//! (`"orchestrator.level.started"`) plus a JSON fields map, rather than
//! `println!` or an ad-hoc format string.

use std::{
    fs::{self, File},
    io::Write,
    path::{Path, PathBuf},
};

use anyhow::Result;
use chrono::{DateTime, Utc};
use parking_lot::Mutex;
use serde::{Deserialize, Serialize};

/// Log severity level.
#[derive(Debug, Clone, Copy, Serialize, Deserialize, PartialEq, Eq, PartialOrd, Ord)]
#[serde(rename_all = "UPPERCASE")]
pub enum LogLevel {
    /// Fine-grained tracing, off by default in production configs.
    Trace,
    /// Debug information.
    Debug,
    /// Informational events.
    Info,
    /// Warning indicator.
    Warn,
    /// Error indicator.
    Error,
}

/// Structured log record.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct LogRecord {
    /// Timestamp in ISO8601.
    pub timestamp: DateTime<Utc>,
    /// Short dotted event name, e.g. `"orchestrator.level.started"`.
    pub event: String,
    /// Severity.
    pub level: LogLevel,
    /// Human-readable message.
    pub message: String,
    /// Arbitrary JSON payload for structured fields.
    #[serde(default, skip_serializing_if = "serde_json::Map::is_empty")]
    pub fields: serde_json::Map<String, serde_json::Value>,
}

impl LogRecord {
    /// Creates a record with the provided info and an empty fields map.
    #[must_use]
    pub fn new(event: impl Into<String>, level: LogLevel, message: impl Into<String>) -> Self {
        Self {
            timestamp: Utc::now(),
            event: event.into(),
            level,
            message: message.into(),
            fields: serde_json::Map::new(),
        }
    }

    /// Attaches a structured fields payload, replacing the empty default.
    #[must_use]
    pub fn with_fields(mut self, fields: serde_json::Value) -> Self {
        if let serde_json::Value::Object(map) = fields {
            self.fields = map;
        }
        self
    }
}

/// Thread-safe JSON-lines logger with append-only semantics.
#[derive(Debug)]
pub struct JsonLogger {
    path: Option<PathBuf>,
    writer: Mutex<Box<dyn Write + Send>>,
    min_level: LogLevel,
}

impl JsonLogger {
    /// Creates or opens a file-backed logger at the desired path.
    pub fn to_file(path: impl AsRef<Path>) -> Result<Self> {
        let path = path.as_ref().to_path_buf();
        if let Some(parent) = path.parent() {
            fs::create_dir_all(parent)?;
        }
        let file = fs::OpenOptions::new()
            .create(true)
            .append(true)
            .open(&path)?;
        Ok(Self {
            path: Some(path),
            writer: Mutex::new(Box::new(file)),
            min_level: LogLevel::Info,
        })
    }

    /// Creates a logger that writes JSON lines to stdout (the default for
    /// the application binary).
    #[must_use]
    pub fn to_stdout() -> Self {
        Self {
            path: None,
            writer: Mutex::new(Box::new(std::io::stdout())),
            min_level: LogLevel::Info,
        }
    }

    /// Sets the minimum level that will actually be written.
    #[must_use]
    pub const fn with_min_level(mut self, level: LogLevel) -> Self {
        self.min_level = level;
        self
    }

    /// Writes a pre-built record as one JSON line, if it meets the
    /// configured minimum level.
    pub fn log(&self, record: &LogRecord) -> Result<()> {
        if record.level < self.min_level {
            return Ok(());
        }
        let mut writer = self.writer.lock();
        serde_json::to_writer(&mut *writer, record)?;
        writer.write_all(b"\n")?;
        writer.flush()?;
        Ok(())
    }

    /// Convenience constructor + write in one call, matching the
    /// `logger.event(LogLevel::Info, "actions.request.accepted", json!({...}))`
    /// call-site idiom used throughout the runtime.
    pub fn event(&self, level: LogLevel, event: &str, fields: serde_json::Value) {
        let record = LogRecord::new(event, level, event).with_fields(fields);
        // Logging must never be allowed to crash the runtime; swallow I/O
        // errors after a best-effort write.
        let _ = self.log(&record);
    }

    /// Returns the underlying file path, if this logger is file-backed.
    #[must_use]
    pub fn path(&self) -> Option<&Path> {
        self.path.as_deref()
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use tempfile::tempdir;

    #[test]
    fn writes_json_lines() {
        let dir = tempdir().unwrap();
        let logger = JsonLogger::to_file(dir.path().join("test.log")).unwrap();
        logger.event(LogLevel::Info, "test.hello", serde_json::json!({"a": 1}));
        let content = fs::read_to_string(logger.path().unwrap()).unwrap();
        assert!(content.contains("\"event\":\"test.hello\""));
        assert!(content.contains("\"a\":1"));
    }

    #[test]
    fn below_min_level_is_suppressed() {
        let dir = tempdir().unwrap();
        let logger = JsonLogger::to_file(dir.path().join("test.log"))
            .unwrap()
            .with_min_level(LogLevel::Warn);
        logger.event(LogLevel::Info, "test.quiet", serde_json::json!({}));
        let content = fs::read_to_string(logger.path().unwrap()).unwrap();
        assert!(content.is_empty());
    }
}
