#![deny(
    clippy::all,
    clippy::pedantic,
    clippy::nursery,
    missing_docs,
    rust_2018_idioms
)]

//! Structured JSON-lines logging shared by the guardian hub and its CLI.

use std::{
    fmt,
    fs::{self, File},
    io::Write,
    path::{Path, PathBuf},
};

use anyhow::Result;
use chrono::{DateTime, Utc};
use parking_lot::Mutex;
use serde::{Deserialize, Serialize};
use serde_json::{Map, Value};

/// Log severity level.
#[derive(Debug, Clone, Copy, Serialize, Deserialize, PartialEq, Eq, PartialOrd, Ord, Hash)]
#[serde(rename_all = "UPPERCASE")]
pub enum LogLevel {
    /// Debug information.
    Debug,
    /// Informational events.
    Info,
    /// Warning indicator.
    Warn,
    /// Error indicator.
    Error,
    /// Terminal condition (e.g. the hub halting).
    Critical,
}

impl fmt::Display for LogLevel {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let label = match self {
            Self::Debug => "DEBUG",
            Self::Info => "INFO",
            Self::Warn => "WARN",
            Self::Error => "ERROR",
            Self::Critical => "CRITICAL",
        };
        f.write_str(label)
    }
}

/// One structured log line.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct LogRecord {
    /// Timestamp in ISO8601.
    pub timestamp: DateTime<Utc>,
    /// Component emitting the record (e.g. `hub`).
    pub component: String,
    /// Severity.
    pub level: LogLevel,
    /// Dotted event name, e.g. `hub.guardian.spawned`.
    pub event: String,
    /// Structured fields attached to the event.
    #[serde(default, skip_serializing_if = "Map::is_empty")]
    pub fields: Map<String, Value>,
}

impl LogRecord {
    /// Creates a record without fields.
    #[must_use]
    pub fn new(component: impl Into<String>, level: LogLevel, event: impl Into<String>) -> Self {
        Self {
            timestamp: Utc::now(),
            component: component.into(),
            level,
            event: event.into(),
            fields: Map::new(),
        }
    }

    /// Attaches the fields of a JSON object. Non-object values are stored under `value`.
    #[must_use]
    pub fn with_fields(mut self, fields: Value) -> Self {
        match fields {
            Value::Object(map) => self.fields = map,
            Value::Null => {}
            other => {
                self.fields.insert("value".into(), other);
            }
        }
        self
    }
}

/// Destination for structured log records.
pub trait LogSink: Send + Sync {
    /// Persists one record.
    fn write(&self, record: &LogRecord) -> Result<()>;
}

/// Thread-safe JSON logger with append-only semantics.
#[derive(Debug)]
pub struct JsonLogger {
    path: PathBuf,
    writer: Mutex<File>,
}

impl JsonLogger {
    /// Creates or opens a logger at the desired path.
    pub fn new(path: impl AsRef<Path>) -> Result<Self> {
        let path = path.as_ref().to_path_buf();
        if let Some(parent) = path.parent() {
            fs::create_dir_all(parent)?;
        }
        let file = fs::OpenOptions::new()
            .create(true)
            .append(true)
            .open(&path)?;
        Ok(Self {
            path,
            writer: Mutex::new(file),
        })
    }

    /// Returns the underlying file path.
    #[must_use]
    pub fn path(&self) -> &Path {
        &self.path
    }
}

impl LogSink for JsonLogger {
    fn write(&self, record: &LogRecord) -> Result<()> {
        let mut line = serde_json::to_vec(record)?;
        line.push(b'\n');
        let mut writer = self.writer.lock();
        writer.write_all(&line)?;
        writer.flush()?;
        Ok(())
    }
}

/// In-memory sink retaining every record, used by tests and embedders that forward logs.
#[derive(Debug, Default)]
pub struct MemoryLogger {
    records: Mutex<Vec<LogRecord>>,
}

impl MemoryLogger {
    /// Creates an empty sink.
    #[must_use]
    pub fn new() -> Self {
        Self::default()
    }

    /// Copy of every record written so far.
    #[must_use]
    pub fn records(&self) -> Vec<LogRecord> {
        self.records.lock().clone()
    }

    /// Records whose event name matches `event`.
    #[must_use]
    pub fn events_named(&self, event: &str) -> Vec<LogRecord> {
        self.records
            .lock()
            .iter()
            .filter(|record| record.event == event)
            .cloned()
            .collect()
    }
}

impl LogSink for MemoryLogger {
    fn write(&self, record: &LogRecord) -> Result<()> {
        self.records.lock().push(record.clone());
        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use serde_json::json;
    use tempfile::tempdir;

    #[test]
    fn writes_json_lines() {
        let dir = tempdir().unwrap();
        let logger = JsonLogger::new(dir.path().join("nested/hub.log")).unwrap();
        logger
            .write(&LogRecord::new("hub", LogLevel::Info, "hub.guardian.seeded"))
            .unwrap();
        logger
            .write(
                &LogRecord::new("hub", LogLevel::Critical, "hub.shutdown")
                    .with_fields(json!({ "pool_size": 27 })),
            )
            .unwrap();
        let content = fs::read_to_string(logger.path()).unwrap();
        let lines: Vec<&str> = content.lines().collect();
        assert_eq!(lines.len(), 2);
        assert!(lines[0].contains("\"event\":\"hub.guardian.seeded\""));
        assert!(lines[1].contains("\"level\":\"CRITICAL\""));
        assert!(lines[1].contains("\"pool_size\":27"));
    }

    #[test]
    fn empty_fields_are_omitted() {
        let record = LogRecord::new("hub", LogLevel::Debug, "noop");
        let encoded = serde_json::to_string(&record).unwrap();
        assert!(!encoded.contains("fields"));
    }

    #[test]
    fn scalar_fields_are_wrapped() {
        let record = LogRecord::new("hub", LogLevel::Warn, "scalar").with_fields(json!(3));
        assert_eq!(record.fields.get("value"), Some(&json!(3)));
    }

    #[test]
    fn memory_logger_filters_by_event() {
        let sink = MemoryLogger::new();
        sink.write(&LogRecord::new("hub", LogLevel::Info, "a"))
            .unwrap();
        sink.write(&LogRecord::new("hub", LogLevel::Warn, "b"))
            .unwrap();
        sink.write(&LogRecord::new("hub", LogLevel::Info, "a"))
            .unwrap();
        assert_eq!(sink.records().len(), 3);
        assert_eq!(sink.events_named("a").len(), 2);
    }

    #[test]
    fn levels_are_ordered_by_severity() {
        assert!(LogLevel::Critical > LogLevel::Error);
        assert!(LogLevel::Debug < LogLevel::Info);
        assert_eq!(LogLevel::Critical.to_string(), "CRITICAL");
    }
}
