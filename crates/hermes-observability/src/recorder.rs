//! Bounded execution recorder.
//!
//! The [`ExecutionRecorder`] keeps the most recent execution records in a
//! ring (oldest evicted first) and maintains monotonic lifetime counters.
//! `clear` drops the current records but keeps the counters; `reset` clears
//! both.

use crate::record::ExecutionRecord;
use chrono::{DateTime, Utc};
use hermes_core::ExecutionId;
use parking_lot::Mutex;
use serde::Serialize;
use std::collections::VecDeque;
use std::sync::atomic::{AtomicU64, Ordering};

/// Recorder configuration.
#[derive(Debug, Clone)]
pub struct RecorderConfig {
    /// Maximum number of records retained.
    pub max_records: usize,
}

impl Default for RecorderConfig {
    fn default() -> Self {
        Self { max_records: 1000 }
    }
}

/// Lifetime counters and current occupancy.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
pub struct RecorderStats {
    /// Total records ever recorded.
    pub recorded: u64,
    /// Total successful executions recorded.
    pub succeeded: u64,
    /// Total failed executions recorded.
    pub failed: u64,
    /// Total records evicted by the ring bound.
    pub evicted: u64,
    /// Records currently retained.
    pub current: usize,
}

/// A bounded ring of execution records with lifetime counters.
///
/// # Example
///
/// ```
/// use hermes_observability::{ExecutionRecorder, RecorderConfig};
///
/// let recorder = ExecutionRecorder::new(RecorderConfig { max_records: 100 });
/// assert_eq!(recorder.stats().recorded, 0);
/// ```
#[derive(Debug)]
pub struct ExecutionRecorder {
    max_records: usize,
    records: Mutex<VecDeque<ExecutionRecord>>,
    recorded: AtomicU64,
    succeeded: AtomicU64,
    failed: AtomicU64,
    evicted: AtomicU64,
}

impl ExecutionRecorder {
    /// Creates a recorder retaining at most `config.max_records` records.
    #[must_use]
    pub fn new(config: RecorderConfig) -> Self {
        Self {
            max_records: config.max_records.max(1),
            records: Mutex::new(VecDeque::new()),
            recorded: AtomicU64::new(0),
            succeeded: AtomicU64::new(0),
            failed: AtomicU64::new(0),
            evicted: AtomicU64::new(0),
        }
    }

    /// Stores a record, evicting the oldest entries while over the bound.
    pub fn record(&self, record: ExecutionRecord) {
        self.recorded.fetch_add(1, Ordering::Relaxed);
        if record.succeeded {
            self.succeeded.fetch_add(1, Ordering::Relaxed);
        } else {
            self.failed.fetch_add(1, Ordering::Relaxed);
        }

        let mut records = self.records.lock();
        records.push_back(record);
        while records.len() > self.max_records {
            records.pop_front();
            self.evicted.fetch_add(1, Ordering::Relaxed);
        }
    }

    /// Returns up to `limit` most recent records, newest first.
    #[must_use]
    pub fn recent(&self, limit: usize) -> Vec<ExecutionRecord> {
        self.records
            .lock()
            .iter()
            .rev()
            .take(limit)
            .cloned()
            .collect()
    }

    /// Returns up to `limit` most recent failures, newest first.
    #[must_use]
    pub fn failures(&self, limit: usize) -> Vec<ExecutionRecord> {
        self.records
            .lock()
            .iter()
            .rev()
            .filter(|r| !r.succeeded)
            .take(limit)
            .cloned()
            .collect()
    }

    /// Returns up to `limit` most recent successes, newest first.
    #[must_use]
    pub fn successes(&self, limit: usize) -> Vec<ExecutionRecord> {
        self.records
            .lock()
            .iter()
            .rev()
            .filter(|r| r.succeeded)
            .take(limit)
            .cloned()
            .collect()
    }

    /// Returns all retained records sharing a correlation ID, oldest first.
    #[must_use]
    pub fn by_correlation_id(&self, correlation_id: &str) -> Vec<ExecutionRecord> {
        self.records
            .lock()
            .iter()
            .filter(|r| r.correlation_id.as_deref() == Some(correlation_id))
            .cloned()
            .collect()
    }

    /// Returns all retained records that started within `[from, to]`,
    /// oldest first.
    #[must_use]
    pub fn by_time_range(&self, from: DateTime<Utc>, to: DateTime<Utc>) -> Vec<ExecutionRecord> {
        self.records
            .lock()
            .iter()
            .filter(|r| r.started_at >= from && r.started_at <= to)
            .cloned()
            .collect()
    }

    /// Returns the record for a specific execution, if retained.
    #[must_use]
    pub fn by_id(&self, id: ExecutionId) -> Option<ExecutionRecord> {
        self.records.lock().iter().find(|r| r.id == id).cloned()
    }

    /// Drops the retained records but keeps the lifetime counters.
    pub fn clear(&self) {
        self.records.lock().clear();
    }

    /// Clears the retained records and the lifetime counters.
    pub fn reset(&self) {
        self.records.lock().clear();
        self.recorded.store(0, Ordering::Relaxed);
        self.succeeded.store(0, Ordering::Relaxed);
        self.failed.store(0, Ordering::Relaxed);
        self.evicted.store(0, Ordering::Relaxed);
    }

    /// Returns the lifetime counters and current occupancy.
    #[must_use]
    pub fn stats(&self) -> RecorderStats {
        RecorderStats {
            recorded: self.recorded.load(Ordering::Relaxed),
            succeeded: self.succeeded.load(Ordering::Relaxed),
            failed: self.failed.load(Ordering::Relaxed),
            evicted: self.evicted.load(Ordering::Relaxed),
            current: self.records.lock().len(),
        }
    }
}

impl Default for ExecutionRecorder {
    fn default() -> Self {
        Self::new(RecorderConfig::default())
    }
}
