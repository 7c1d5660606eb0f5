use chrono::{DateTime, Utc};
use parking_lot::Mutex;
use serde::{Deserialize, Serialize};
use std::collections::{HashMap, VecDeque};

/// Severity of a tracked error.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum ErrorSeverity {
    Low,
    Medium,
    High,
    Critical,
}

/// One tracked error occurrence.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct ErrorRecord {
    /// Coarse classification, e.g. the error variant name.
    pub error_type: String,
    pub message: String,
    pub severity: ErrorSeverity,
    pub timestamp: DateTime<Utc>,
    /// Free-form key/value context (operation name, task id, ...).
    #[serde(default)]
    pub context: HashMap<String, String>,
}

impl ErrorRecord {
    /// A record stamped now, with empty context.
    pub fn new(
        error_type: impl Into<String>,
        message: impl Into<String>,
        severity: ErrorSeverity,
    ) -> Self {
        Self {
            error_type: error_type.into(),
            message: message.into(),
            severity,
            timestamp: Utc::now(),
            context: HashMap::new(),
        }
    }

    /// Attach a context entry.
    pub fn with_context(mut self, key: impl Into<String>, value: impl Into<String>) -> Self {
        self.context.insert(key.into(), value.into());
        self
    }
}

/// Bounded in-memory error history with aggregate queries.
///
/// Holds the most recent `capacity` records; the oldest is evicted first.
pub struct ErrorTracker {
    capacity: usize,
    records: Mutex<VecDeque<ErrorRecord>>,
}

/// Default ring-buffer capacity.
pub const DEFAULT_CAPACITY: usize = 1000;

impl Default for ErrorTracker {
    fn default() -> Self {
        Self::new(DEFAULT_CAPACITY)
    }
}

impl ErrorTracker {
    /// A tracker holding at most `capacity` records.
    pub fn new(capacity: usize) -> Self {
        Self {
            capacity,
            records: Mutex::new(VecDeque::with_capacity(capacity.min(64))),
        }
    }

    /// Append a record, evicting the oldest if at capacity.
    pub fn record(&self, record: ErrorRecord) {
        let mut records = self.records.lock();
        if records.len() == self.capacity {
            records.pop_front();
        }
        records.push_back(record);
    }

    /// Number of records currently held.
    pub fn len(&self) -> usize {
        self.records.lock().len()
    }

    /// True when no records are held.
    pub fn is_empty(&self) -> bool {
        self.records.lock().is_empty()
    }

    /// Occurrences per error type, optionally restricted to records at or
    /// after `since`.
    pub fn count_by_type(&self, since: Option<DateTime<Utc>>) -> HashMap<String, usize> {
        let records = self.records.lock();
        let mut counts = HashMap::new();
        for record in records.iter().filter(|r| in_window(r, since)) {
            *counts.entry(record.error_type.clone()).or_insert(0) += 1;
        }
        counts
    }

    /// Occurrences per severity, optionally restricted to a time window.
    pub fn count_by_severity(&self, since: Option<DateTime<Utc>>) -> HashMap<ErrorSeverity, usize> {
        let records = self.records.lock();
        let mut counts = HashMap::new();
        for record in records.iter().filter(|r| in_window(r, since)) {
            *counts.entry(record.severity).or_insert(0) += 1;
        }
        counts
    }

    /// The error type with the most occurrences in the window, if any.
    pub fn most_frequent_type(&self, since: Option<DateTime<Utc>>) -> Option<String> {
        self.count_by_type(since)
            .into_iter()
            .max_by(|a, b| a.1.cmp(&b.1).then_with(|| b.0.cmp(&a.0)))
            .map(|(error_type, _)| error_type)
    }

    /// The most recent `n` records, newest last.
    pub fn recent(&self, n: usize) -> Vec<ErrorRecord> {
        let records = self.records.lock();
        let skip = records.len().saturating_sub(n);
        records.iter().skip(skip).cloned().collect()
    }
}

fn in_window(record: &ErrorRecord, since: Option<DateTime<Utc>>) -> bool {
    since.map_or(true, |cutoff| record.timestamp >= cutoff)
}
