//! Critical log lines surfaced on the dashboard.

use serde::{Deserialize, Serialize};

/// Maximum number of log lines kept in a snapshot
pub const CRITICAL_LOG_CAPACITY: usize = 5;

/// Severity of a log line
#[derive(Debug, Clone, Copy, Serialize, Deserialize, PartialEq, Eq)]
#[serde(rename_all = "lowercase")]
pub enum LogLevel {
    Info,
    Warn,
    Error,
    Critical,
}

impl LogLevel {
    /// Best-effort severity detection from free text or a label value.
    pub fn infer(text: &str) -> Self {
        let lower = text.to_ascii_lowercase();
        if lower.contains("crit") || lower.contains("fatal") || lower.contains("panic") {
            LogLevel::Critical
        } else if lower.contains("err") || lower.contains("fail") {
            LogLevel::Error
        } else if lower.contains("warn") {
            LogLevel::Warn
        } else {
            LogLevel::Info
        }
    }
}

impl std::fmt::Display for LogLevel {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            LogLevel::Info => write!(f, "INFO"),
            LogLevel::Warn => write!(f, "WARN"),
            LogLevel::Error => write!(f, "ERROR"),
            LogLevel::Critical => write!(f, "CRIT"),
        }
    }
}

/// One log line
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq)]
pub struct LogEntry {
    pub level: LogLevel,
    pub text: String,
    /// Milliseconds since the Unix epoch
    pub timestamp: i64,
}

impl LogEntry {
    pub fn new(level: LogLevel, text: impl Into<String>, timestamp: i64) -> Self {
        Self {
            level,
            text: text.into(),
            timestamp,
        }
    }
}

/// Bounded, newest-first collection of log lines.
///
/// Serializes as a plain JSON array.
#[derive(Debug, Clone, Default, Serialize, Deserialize, PartialEq)]
#[serde(transparent)]
pub struct CriticalLogs(Vec<LogEntry>);

impl CriticalLogs {
    pub fn new() -> Self {
        Self(Vec::with_capacity(CRITICAL_LOG_CAPACITY))
    }

    /// Insert an entry keeping timestamps in descending order.
    ///
    /// Exact duplicates (same timestamp and text) are ignored so that a
    /// source re-reporting the same lines on every refresh does not evict
    /// older entries. Entries older than everything in a full collection
    /// fall off immediately.
    pub fn record(&mut self, entry: LogEntry) {
        if self
            .0
            .iter()
            .any(|e| e.timestamp == entry.timestamp && e.text == entry.text)
        {
            return;
        }

        // Ties go after existing entries with the same timestamp
        let pos = self
            .0
            .iter()
            .position(|e| e.timestamp < entry.timestamp)
            .unwrap_or(self.0.len());
        self.0.insert(pos, entry);
        self.0.truncate(CRITICAL_LOG_CAPACITY);
    }

    pub fn extend<I: IntoIterator<Item = LogEntry>>(&mut self, entries: I) {
        for entry in entries {
            self.record(entry);
        }
    }

    pub fn len(&self) -> usize {
        self.0.len()
    }

    pub fn is_empty(&self) -> bool {
        self.0.is_empty()
    }

    pub fn latest(&self) -> Option<&LogEntry> {
        self.0.first()
    }

    pub fn iter(&self) -> impl Iterator<Item = &LogEntry> {
        self.0.iter()
    }
}
