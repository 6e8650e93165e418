//! Accumulator contract and the basic kinds.
//!
//! An accumulator is a bounded-memory statistics container: it records
//! `(value, timestamp)` samples, produces serializable [`Snapshot`]s, and
//! can be reset. Timestamps are supplied by the caller, which keeps every
//! accumulator fully deterministic under test.

use chrono::{DateTime, Utc};
use parking_lot::Mutex;
use serde::Serialize;

/// A statistics container supporting record/snapshot/reset with bounded
/// memory.
pub trait Accumulator: Send + Sync {
    /// Records one sample.
    fn record(&self, value: f64, timestamp: DateTime<Utc>);

    /// Produces a point-in-time snapshot.
    fn snapshot(&self) -> Snapshot;

    /// Clears all accumulated state.
    fn reset(&self);

    /// Returns the number of samples recorded since the last reset.
    fn count(&self) -> u64;
}

/// A serializable snapshot of any accumulator kind.
#[derive(Debug, Clone, PartialEq, Serialize)]
#[serde(rename_all = "snake_case", tag = "kind")]
pub enum Snapshot {
    /// Basic statistics: count/sum/min/max/last.
    Basic(BasicSnapshot),
    /// Monotonic counter with rate derivation.
    Counter(CounterSnapshot),
    /// Percentile reservoir.
    Histogram(HistogramSnapshot),
    /// Exponentially decayed mean and variance.
    Decay(DecaySnapshot),
}

impl Snapshot {
    /// Merges two same-kind snapshots, `other` being the newer one.
    ///
    /// Used by sliding windows to combine bucket snapshots. Percentiles do
    /// not compose exactly: a merged histogram keeps the exact count, min,
    /// max and weighted mean, and approximates percentiles with those of
    /// the larger bucket. Mismatched kinds resolve to the newer snapshot.
    #[must_use]
    pub fn merge(&self, other: &Snapshot) -> Snapshot {
        match (self, other) {
            (Snapshot::Basic(a), Snapshot::Basic(b)) => Snapshot::Basic(BasicSnapshot {
                count: a.count + b.count,
                sum: a.sum + b.sum,
                min: merge_min(a.min, b.min),
                max: merge_max(a.max, b.max),
                last: b.last.or(a.last),
            }),
            (Snapshot::Counter(a), Snapshot::Counter(b)) => {
                let first_at = match (a.first_at, b.first_at) {
                    (Some(x), Some(y)) => Some(x.min(y)),
                    (x, y) => x.or(y),
                };
                let last_at = match (a.last_at, b.last_at) {
                    (Some(x), Some(y)) => Some(x.max(y)),
                    (x, y) => x.or(y),
                };
                Snapshot::Counter(CounterSnapshot {
                    total: a.total + b.total,
                    count: a.count + b.count,
                    first_at,
                    last_at,
                    rate_per_sec: derive_rate(a.total + b.total, first_at, last_at),
                })
            }
            (Snapshot::Histogram(a), Snapshot::Histogram(b)) => {
                let count = a.count + b.count;
                let dominant = if b.count >= a.count { b } else { a };
                Snapshot::Histogram(HistogramSnapshot {
                    count,
                    min: merge_min(a.min, b.min),
                    max: merge_max(a.max, b.max),
                    mean: weighted_mean(a.mean, a.count, b.mean, b.count),
                    p50: dominant.p50,
                    p90: dominant.p90,
                    p95: dominant.p95,
                    p99: dominant.p99,
                })
            }
            (Snapshot::Decay(a), Snapshot::Decay(b)) => Snapshot::Decay(DecaySnapshot {
                count: a.count + b.count,
                mean: weighted_mean(a.mean, a.count, b.mean, b.count),
                variance: weighted_mean(a.variance, a.count, b.variance, b.count),
                last_at: match (a.last_at, b.last_at) {
                    (Some(x), Some(y)) => Some(x.max(y)),
                    (x, y) => x.or(y),
                },
            }),
            (_, newer) => newer.clone(),
        }
    }

    /// Returns the sample count behind this snapshot.
    #[must_use]
    pub const fn count(&self) -> u64 {
        match self {
            Snapshot::Basic(s) => s.count,
            Snapshot::Counter(s) => s.count,
            Snapshot::Histogram(s) => s.count,
            Snapshot::Decay(s) => s.count,
        }
    }
}

fn merge_min(a: Option<f64>, b: Option<f64>) -> Option<f64> {
    match (a, b) {
        (Some(x), Some(y)) => Some(x.min(y)),
        (x, y) => x.or(y),
    }
}

fn merge_max(a: Option<f64>, b: Option<f64>) -> Option<f64> {
    match (a, b) {
        (Some(x), Some(y)) => Some(x.max(y)),
        (x, y) => x.or(y),
    }
}

fn weighted_mean(a: Option<f64>, a_count: u64, b: Option<f64>, b_count: u64) -> Option<f64> {
    match (a, b) {
        (Some(x), Some(y)) => {
            let total = a_count + b_count;
            if total == 0 {
                None
            } else {
                Some((x * a_count as f64 + y * b_count as f64) / total as f64)
            }
        }
        (x, y) => x.or(y),
    }
}

fn derive_rate(
    total: f64,
    first_at: Option<DateTime<Utc>>,
    last_at: Option<DateTime<Utc>>,
) -> Option<f64> {
    let (first, last) = (first_at?, last_at?);
    let span = (last - first).to_std().ok()?.as_secs_f64();
    if span > 0.0 {
        Some(total / span)
    } else {
        None
    }
}

/// Snapshot of [`BasicStats`].
#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct BasicSnapshot {
    /// Samples recorded.
    pub count: u64,
    /// Sum of all values.
    pub sum: f64,
    /// Smallest value seen.
    pub min: Option<f64>,
    /// Largest value seen.
    pub max: Option<f64>,
    /// Most recent value.
    pub last: Option<f64>,
}

impl BasicSnapshot {
    /// Returns the arithmetic mean, when samples exist.
    #[must_use]
    pub fn mean(&self) -> Option<f64> {
        if self.count == 0 {
            None
        } else {
            Some(self.sum / self.count as f64)
        }
    }
}

/// Snapshot of [`CounterAccumulator`].
#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct CounterSnapshot {
    /// Accumulated total.
    pub total: f64,
    /// Samples recorded.
    pub count: u64,
    /// Timestamp of the first sample.
    pub first_at: Option<DateTime<Utc>>,
    /// Timestamp of the latest sample.
    pub last_at: Option<DateTime<Utc>>,
    /// `total / observed span`, when the span is non-zero.
    pub rate_per_sec: Option<f64>,
}

/// Snapshot of a histogram accumulator.
#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct HistogramSnapshot {
    /// Samples recorded.
    pub count: u64,
    /// Smallest value seen.
    pub min: Option<f64>,
    /// Largest value seen.
    pub max: Option<f64>,
    /// Arithmetic mean of all samples.
    pub mean: Option<f64>,
    /// Median estimate.
    pub p50: Option<f64>,
    /// 90th percentile estimate.
    pub p90: Option<f64>,
    /// 95th percentile estimate.
    pub p95: Option<f64>,
    /// 99th percentile estimate.
    pub p99: Option<f64>,
}

/// Snapshot of an exponential-decay accumulator.
#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct DecaySnapshot {
    /// Samples recorded.
    pub count: u64,
    /// Exponentially weighted mean.
    pub mean: Option<f64>,
    /// Exponentially weighted variance.
    pub variance: Option<f64>,
    /// Timestamp of the latest sample.
    pub last_at: Option<DateTime<Utc>>,
}

/// Count/sum/min/max/last statistics.
///
/// # Example
///
/// ```
/// use chrono::Utc;
/// use hermes_metrics::{Accumulator, BasicStats, Snapshot};
///
/// let stats = BasicStats::new();
/// stats.record(4.0, Utc::now());
/// stats.record(2.0, Utc::now());
///
/// match stats.snapshot() {
///     Snapshot::Basic(s) => {
///         assert_eq!(s.count, 2);
///         assert_eq!(s.min, Some(2.0));
///         assert_eq!(s.last, Some(2.0));
///     }
///     _ => unreachable!(),
/// }
/// ```
#[derive(Debug, Default)]
pub struct BasicStats {
    inner: Mutex<BasicInner>,
}

#[derive(Debug, Default)]
struct BasicInner {
    count: u64,
    sum: f64,
    min: Option<f64>,
    max: Option<f64>,
    last: Option<f64>,
}

impl BasicStats {
    /// Creates an empty accumulator.
    #[must_use]
    pub fn new() -> Self {
        Self::default()
    }
}

impl Accumulator for BasicStats {
    fn record(&self, value: f64, _timestamp: DateTime<Utc>) {
        let mut inner = self.inner.lock();
        inner.count += 1;
        inner.sum += value;
        inner.min = Some(inner.min.map_or(value, |m| m.min(value)));
        inner.max = Some(inner.max.map_or(value, |m| m.max(value)));
        inner.last = Some(value);
    }

    fn snapshot(&self) -> Snapshot {
        let inner = self.inner.lock();
        Snapshot::Basic(BasicSnapshot {
            count: inner.count,
            sum: inner.sum,
            min: inner.min,
            max: inner.max,
            last: inner.last,
        })
    }

    fn reset(&self) {
        *self.inner.lock() = BasicInner::default();
    }

    fn count(&self) -> u64 {
        self.inner.lock().count
    }
}

/// Monotonic counter with rate derivation over the observed span.
#[derive(Debug, Default)]
pub struct CounterAccumulator {
    inner: Mutex<CounterInner>,
}

#[derive(Debug, Default)]
struct CounterInner {
    total: f64,
    count: u64,
    first_at: Option<DateTime<Utc>>,
    last_at: Option<DateTime<Utc>>,
}

impl CounterAccumulator {
    /// Creates an empty counter.
    #[must_use]
    pub fn new() -> Self {
        Self::default()
    }
}

impl Accumulator for CounterAccumulator {
    fn record(&self, value: f64, timestamp: DateTime<Utc>) {
        // Negative increments would break monotonicity; clamp to zero.
        let increment = value.max(0.0);
        let mut inner = self.inner.lock();
        inner.total += increment;
        inner.count += 1;
        if inner.first_at.is_none() {
            inner.first_at = Some(timestamp);
        }
        inner.last_at = Some(inner.last_at.map_or(timestamp, |t| t.max(timestamp)));
    }

    fn snapshot(&self) -> Snapshot {
        let inner = self.inner.lock();
        Snapshot::Counter(CounterSnapshot {
            total: inner.total,
            count: inner.count,
            first_at: inner.first_at,
            last_at: inner.last_at,
            rate_per_sec: derive_rate(inner.total, inner.first_at, inner.last_at),
        })
    }

    fn reset(&self) {
        *self.inner.lock() = CounterInner::default();
    }

    fn count(&self) -> u64 {
        self.inner.lock().count
    }
}
