//! Percentile reservoir histogram.
//!
//! Keeps a bounded uniform sample of all recorded values (algorithm R) and
//! estimates percentiles from it. The replacement RNG is seedable for
//! deterministic tests; below the reservoir capacity the estimates are
//! exact.

use crate::accumulator::{Accumulator, HistogramSnapshot, Snapshot};
use chrono::{DateTime, Utc};
use parking_lot::Mutex;
use rand::rngs::StdRng;
use rand::{Rng, SeedableRng};

/// Default reservoir capacity.
const DEFAULT_RESERVOIR: usize = 1024;

/// A reservoir-sampling histogram accumulator.
///
/// # Example
///
/// ```
/// use chrono::Utc;
/// use hermes_metrics::{Accumulator, HistogramAccumulator, Snapshot};
///
/// let histogram = HistogramAccumulator::with_seed(64, 42);
/// for value in 1..=100 {
///     histogram.record(f64::from(value), Utc::now());
/// }
///
/// match histogram.snapshot() {
///     Snapshot::Histogram(s) => assert_eq!(s.count, 100),
///     _ => unreachable!(),
/// }
/// ```
#[derive(Debug)]
pub struct HistogramAccumulator {
    capacity: usize,
    inner: Mutex<HistogramInner>,
}

#[derive(Debug)]
struct HistogramInner {
    reservoir: Vec<f64>,
    count: u64,
    sum: f64,
    min: Option<f64>,
    max: Option<f64>,
    rng: StdRng,
}

impl HistogramAccumulator {
    /// Creates a histogram with the default reservoir size and an
    /// entropy-seeded RNG.
    #[must_use]
    pub fn new() -> Self {
        Self::with_capacity(DEFAULT_RESERVOIR)
    }

    /// Creates a histogram with a custom reservoir size.
    #[must_use]
    pub fn with_capacity(capacity: usize) -> Self {
        Self {
            capacity: capacity.max(1),
            inner: Mutex::new(HistogramInner {
                reservoir: Vec::new(),
                count: 0,
                sum: 0.0,
                min: None,
                max: None,
                rng: StdRng::from_entropy(),
            }),
        }
    }

    /// Creates a histogram with a fixed RNG seed; sampling decisions are
    /// fully deterministic.
    #[must_use]
    pub fn with_seed(capacity: usize, seed: u64) -> Self {
        Self {
            capacity: capacity.max(1),
            inner: Mutex::new(HistogramInner {
                reservoir: Vec::new(),
                count: 0,
                sum: 0.0,
                min: None,
                max: None,
                rng: StdRng::seed_from_u64(seed),
            }),
        }
    }

    fn percentile(sorted: &[f64], percentile: f64) -> Option<f64> {
        if sorted.is_empty() {
            return None;
        }
        let rank = (percentile / 100.0) * (sorted.len() - 1) as f64;
        Some(sorted[rank.round() as usize])
    }
}

impl Default for HistogramAccumulator {
    fn default() -> Self {
        Self::new()
    }
}

impl Accumulator for HistogramAccumulator {
    fn record(&self, value: f64, _timestamp: DateTime<Utc>) {
        let mut inner = self.inner.lock();
        inner.count += 1;
        inner.sum += value;
        inner.min = Some(inner.min.map_or(value, |m| m.min(value)));
        inner.max = Some(inner.max.map_or(value, |m| m.max(value)));

        if inner.reservoir.len() < self.capacity {
            inner.reservoir.push(value);
        } else {
            // Algorithm R: replace with probability capacity / count.
            let count = inner.count;
            let slot = inner.rng.gen_range(0..count);
            if (slot as usize) < self.capacity {
                inner.reservoir[slot as usize] = value;
            }
        }
    }

    fn snapshot(&self) -> Snapshot {
        let inner = self.inner.lock();
        let mut sorted = inner.reservoir.clone();
        sorted.sort_by(f64::total_cmp);

        Snapshot::Histogram(HistogramSnapshot {
            count: inner.count,
            min: inner.min,
            max: inner.max,
            mean: if inner.count == 0 {
                None
            } else {
                Some(inner.sum / inner.count as f64)
            },
            p50: Self::percentile(&sorted, 50.0),
            p90: Self::percentile(&sorted, 90.0),
            p95: Self::percentile(&sorted, 95.0),
            p99: Self::percentile(&sorted, 99.0),
        })
    }

    fn reset(&self) {
        let mut inner = self.inner.lock();
        inner.reservoir.clear();
        inner.count = 0;
        inner.sum = 0.0;
        inner.min = None;
        inner.max = None;
    }

    fn count(&self) -> u64 {
        self.inner.lock().count
    }
}
