//! Structured process log shared by all pipeline stages

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use std::fmt;
use std::sync::{Arc, Mutex, MutexGuard};
use tracing::{debug, error, info};

/// Severity of a process log entry
#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum LogLevel {
    Debug,
    Audit,
    Error,
}

impl fmt::Display for LogLevel {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            LogLevel::Debug => write!(f, "DEBUG"),
            LogLevel::Audit => write!(f, "AUDIT"),
            LogLevel::Error => write!(f, "ERROR"),
        }
    }
}

/// A single process log entry
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct LogEntry {
    pub timestamp: DateTime<Utc>,
    pub level: LogLevel,
    pub title: String,
    /// Key of the record or group the entry is about, if any
    #[serde(skip_serializing_if = "Option::is_none")]
    pub key: Option<String>,
    pub details: String,
}

/// Append-only, cloneable process log
///
/// Clones share the same entries, so a log handed to concurrent stage
/// invocations accumulates into one run-wide record.
#[derive(Debug, Clone, Default)]
pub struct ProcessLog {
    entries: Arc<Mutex<Vec<LogEntry>>>,
}

impl ProcessLog {
    pub fn new() -> Self {
        Self::default()
    }

    /// Append an entry and mirror it to tracing
    pub fn record(
        &self,
        level: LogLevel,
        title: impl Into<String>,
        key: Option<&str>,
        details: impl Into<String>,
    ) {
        let entry = LogEntry {
            timestamp: Utc::now(),
            level,
            title: title.into(),
            key: key.map(str::to_string),
            details: details.into(),
        };

        let key = entry.key.as_deref().unwrap_or("-");
        match level {
            LogLevel::Debug => debug!(title = %entry.title, key, "{}", entry.details),
            LogLevel::Audit => info!(title = %entry.title, key, "{}", entry.details),
            LogLevel::Error => error!(title = %entry.title, key, "{}", entry.details),
        }

        self.lock().push(entry);
    }

    pub fn debug(&self, title: impl Into<String>, details: impl Into<String>) {
        self.record(LogLevel::Debug, title, None, details);
    }

    pub fn audit(&self, title: impl Into<String>, details: impl Into<String>) {
        self.record(LogLevel::Audit, title, None, details);
    }

    /// Record a failure against the key it happened for
    pub fn error(&self, title: impl Into<String>, key: &str, details: impl Into<String>) {
        self.record(LogLevel::Error, title, Some(key), details);
    }

    /// Snapshot of all entries in insertion order
    pub fn entries(&self) -> Vec<LogEntry> {
        self.lock().clone()
    }

    /// Entries at exactly the given level
    pub fn entries_at(&self, level: LogLevel) -> Vec<LogEntry> {
        self.lock()
            .iter()
            .filter(|entry| entry.level == level)
            .cloned()
            .collect()
    }

    /// Entries with the given title
    pub fn entries_titled(&self, title: &str) -> Vec<LogEntry> {
        self.lock()
            .iter()
            .filter(|entry| entry.title == title)
            .cloned()
            .collect()
    }

    pub fn len(&self) -> usize {
        self.lock().len()
    }

    pub fn is_empty(&self) -> bool {
        self.lock().is_empty()
    }

    // A panicking writer cannot leave a half-pushed entry behind.
    fn lock(&self) -> MutexGuard<'_, Vec<LogEntry>> {
        self.entries
            .lock()
            .unwrap_or_else(|poisoned| poisoned.into_inner())
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_clones_share_entries() {
        let log = ProcessLog::new();
        let stage_log = log.clone();

        stage_log.debug("Map Input", "{\"id\":\"1\"}");
        stage_log.error("Sales Order Transformation Error", "3", "INVALID_TRANS");

        assert_eq!(log.len(), 2);
        let errors = log.entries_at(LogLevel::Error);
        assert_eq!(errors.len(), 1);
        assert_eq!(errors[0].key.as_deref(), Some("3"));
        assert_eq!(errors[0].details, "INVALID_TRANS");
    }

    #[test]
    fn test_entries_keep_insertion_order() {
        let log = ProcessLog::new();
        log.audit("Input Summary", "a");
        log.audit("Map Summary", "b");
        log.audit("Reduce Summary", "c");

        let titles: Vec<_> = log.entries().into_iter().map(|e| e.title).collect();
        assert_eq!(titles, vec!["Input Summary", "Map Summary", "Reduce Summary"]);
        assert_eq!(log.entries_titled("Map Summary").len(), 1);
    }

    #[test]
    fn test_concurrent_writers() {
        let log = ProcessLog::new();
        let handles: Vec<_> = (0..8)
            .map(|i| {
                let log = log.clone();
                std::thread::spawn(move || log.debug("worker", i.to_string()))
            })
            .collect();
        for handle in handles {
            handle.join().unwrap();
        }
        assert_eq!(log.len(), 8);
    }

    #[test]
    fn test_entry_serializes_level_in_snake_case() {
        let log = ProcessLog::new();
        log.audit("Run Summary", "done");
        let value = serde_json::to_value(&log.entries()[0]).unwrap();
        assert_eq!(value["level"], "audit");
        assert!(value.get("key").is_none());
    }
}
