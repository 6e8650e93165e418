//! Windowed aggregation.
//!
//! A [`WindowedAccumulator`] wraps any accumulator kind (via a factory)
//! with a time window:
//!
//! - [`WindowPolicy::Unbounded`] — a single accumulator, no expiry
//! - [`WindowPolicy::Tumbling`] — the accumulator resets when a window
//!   elapses
//! - [`WindowPolicy::Sliding`] — a ring of bucket accumulators covering
//!   the window; snapshots merge the live buckets
//! - [`WindowPolicy::ExponentialDecay`] — samples feed an
//!   exponential-decay accumulator with the given half-life
//!
//! Window rotation is driven entirely by the supplied sample timestamps,
//! never by wall-clock reads, so windowed behaviour is deterministic under
//! test. Sliding windows over percentile reservoirs inherit the merge
//! approximation documented on [`Snapshot::merge`].

use crate::accumulator::{Accumulator, BasicSnapshot, Snapshot};
use crate::decay::EwmaAccumulator;
use chrono::{DateTime, TimeDelta, Utc};
use parking_lot::Mutex;
use std::collections::VecDeque;
use std::sync::Arc;
use std::time::Duration;

/// Factory producing fresh inner accumulators for windows and buckets.
pub type AccumulatorFactory = Arc<dyn Fn() -> Box<dyn Accumulator> + Send + Sync>;

/// How samples age out of a windowed accumulator.
#[derive(Debug, Clone)]
pub enum WindowPolicy {
    /// Keep everything.
    Unbounded,
    /// Reset the accumulator whenever a window elapses.
    Tumbling(Duration),
    /// Cover the window with a ring of bucket accumulators.
    Sliding {
        /// Total window covered by the ring.
        duration: Duration,
        /// Number of buckets the window is divided into.
        buckets: usize,
    },
    /// Feed samples into an exponential-decay accumulator.
    ExponentialDecay {
        /// Half-life of the decay.
        half_life: Duration,
    },
}

/// Interior state of a windowed accumulator.
enum WindowState {
    Single {
        accumulator: Box<dyn Accumulator>,
        window_start: Option<DateTime<Utc>>,
    },
    Ring {
        buckets: VecDeque<Bucket>,
    },
}

struct Bucket {
    start: DateTime<Utc>,
    accumulator: Box<dyn Accumulator>,
}

/// A time-windowed wrapper around any accumulator kind.
///
/// # Example
///
/// ```
/// use chrono::{DateTime, Utc};
/// use hermes_metrics::{
///     Accumulator, BasicStats, Snapshot, WindowPolicy, WindowedAccumulator,
/// };
/// use std::sync::Arc;
/// use std::time::Duration;
///
/// let windowed = WindowedAccumulator::new(
///     WindowPolicy::Tumbling(Duration::from_secs(60)),
///     Arc::new(|| Box::new(BasicStats::new())),
/// );
///
/// let t0 = DateTime::<Utc>::from_timestamp(1_700_000_000, 0).unwrap();
/// windowed.record(1.0, t0);
/// assert_eq!(windowed.count(), 1);
/// ```
pub struct WindowedAccumulator {
    policy: WindowPolicy,
    factory: AccumulatorFactory,
    state: Mutex<WindowState>,
}

impl WindowedAccumulator {
    /// Creates a windowed accumulator.
    ///
    /// The factory is used for the initial accumulator, every tumbling
    /// reset and every sliding bucket. Under
    /// [`WindowPolicy::ExponentialDecay`] the factory is ignored and an
    /// [`EwmaAccumulator`] with the policy's half-life is used.
    #[must_use]
    pub fn new(policy: WindowPolicy, factory: AccumulatorFactory) -> Self {
        let state = match &policy {
            WindowPolicy::Sliding { .. } => WindowState::Ring {
                buckets: VecDeque::new(),
            },
            WindowPolicy::ExponentialDecay { half_life } => WindowState::Single {
                accumulator: Box::new(EwmaAccumulator::new(*half_life)),
                window_start: None,
            },
            _ => WindowState::Single {
                accumulator: factory(),
                window_start: None,
            },
        };
        Self {
            policy,
            factory,
            state: Mutex::new(state),
        }
    }

    fn bucket_len(duration: Duration, buckets: usize) -> TimeDelta {
        let nanos = (duration.as_nanos() / buckets.max(1) as u128).max(1);
        TimeDelta::nanoseconds(nanos as i64)
    }
}

impl Accumulator for WindowedAccumulator {
    fn record(&self, value: f64, timestamp: DateTime<Utc>) {
        let mut state = self.state.lock();
        match (&self.policy, &mut *state) {
            (
                WindowPolicy::Tumbling(window),
                WindowState::Single {
                    accumulator,
                    window_start,
                },
            ) => {
                let window = TimeDelta::from_std(*window).unwrap_or(TimeDelta::MAX);
                match window_start {
                    Some(start) if timestamp - *start >= window => {
                        *accumulator = (self.factory)();
                        *window_start = Some(timestamp);
                    }
                    None => *window_start = Some(timestamp),
                    _ => {}
                }
                accumulator.record(value, timestamp);
            }
            (
                WindowPolicy::Sliding { duration, buckets },
                WindowState::Ring {
                    buckets: ring,
                },
            ) => {
                let bucket_len = Self::bucket_len(*duration, *buckets);
                let window = TimeDelta::from_std(*duration).unwrap_or(TimeDelta::MAX);

                let needs_bucket = match ring.back() {
                    Some(bucket) => timestamp - bucket.start >= bucket_len,
                    None => true,
                };
                if needs_bucket {
                    ring.push_back(Bucket {
                        start: timestamp,
                        accumulator: (self.factory)(),
                    });
                }

                // Expire buckets that no longer intersect the window.
                while let Some(front) = ring.front() {
                    if timestamp - front.start >= window {
                        ring.pop_front();
                    } else {
                        break;
                    }
                }

                if let Some(bucket) = ring.back_mut() {
                    bucket.accumulator.record(value, timestamp);
                }
            }
            (_, WindowState::Single { accumulator, .. }) => {
                accumulator.record(value, timestamp);
            }
            // Ring state only exists under the sliding policy.
            (_, WindowState::Ring { .. }) => {}
        }
    }

    fn snapshot(&self) -> Snapshot {
        let state = self.state.lock();
        match &*state {
            WindowState::Single { accumulator, .. } => accumulator.snapshot(),
            WindowState::Ring { buckets } => {
                let mut merged: Option<Snapshot> = None;
                for bucket in buckets {
                    let snapshot = bucket.accumulator.snapshot();
                    merged = Some(match merged {
                        Some(previous) => previous.merge(&snapshot),
                        None => snapshot,
                    });
                }
                merged.unwrap_or(Snapshot::Basic(BasicSnapshot {
                    count: 0,
                    sum: 0.0,
                    min: None,
                    max: None,
                    last: None,
                }))
            }
        }
    }

    fn reset(&self) {
        let mut state = self.state.lock();
        *state = match &self.policy {
            WindowPolicy::Sliding { .. } => WindowState::Ring {
                buckets: VecDeque::new(),
            },
            WindowPolicy::ExponentialDecay { half_life } => WindowState::Single {
                accumulator: Box::new(EwmaAccumulator::new(*half_life)),
                window_start: None,
            },
            _ => WindowState::Single {
                accumulator: (self.factory)(),
                window_start: None,
            },
        };
    }

    fn count(&self) -> u64 {
        let state = self.state.lock();
        match &*state {
            WindowState::Single { accumulator, .. } => accumulator.count(),
            WindowState::Ring { buckets } => {
                buckets.iter().map(|b| b.accumulator.count()).sum()
            }
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::accumulator::BasicStats;

    fn at(seconds: i64) -> DateTime<Utc> {
        DateTime::<Utc>::from_timestamp(1_700_000_000 + seconds, 0).unwrap()
    }

    fn basic_factory() -> AccumulatorFactory {
        Arc::new(|| Box::new(BasicStats::new()))
    }

    fn basic(snapshot: Snapshot) -> BasicSnapshot {
        match snapshot {
            Snapshot::Basic(s) => s,
            other => panic!("expected Basic, got {other:?}"),
        }
    }

    #[test]
    fn test_unbounded_keeps_everything() {
        let windowed = WindowedAccumulator::new(WindowPolicy::Unbounded, basic_factory());
        windowed.record(1.0, at(0));
        windowed.record(2.0, at(3600));

        assert_eq!(basic(windowed.snapshot()).count, 2);
    }

    #[test]
    fn test_tumbling_resets_on_window_boundary() {
        let windowed = WindowedAccumulator::new(
            WindowPolicy::Tumbling(Duration::from_secs(10)),
            basic_factory(),
        );

        windowed.record(1.0, at(0));
        windowed.record(2.0, at(5));
        assert_eq!(basic(windowed.snapshot()).count, 2);

        // Crossing the window boundary starts a fresh accumulator.
        windowed.record(3.0, at(12));
        let s = basic(windowed.snapshot());
        assert_eq!(s.count, 1);
        assert_eq!(s.last, Some(3.0));
    }

    #[test]
    fn test_sliding_expires_old_buckets() {
        let windowed = WindowedAccumulator::new(
            WindowPolicy::Sliding {
                duration: Duration::from_secs(10),
                buckets: 5,
            },
            basic_factory(),
        );

        windowed.record(1.0, at(0));
        windowed.record(2.0, at(4));
        windowed.record(3.0, at(8));
        assert_eq!(basic(windowed.snapshot()).count, 3);

        // Eleven seconds later the first two buckets are out of window.
        windowed.record(4.0, at(11));
        let s = basic(windowed.snapshot());
        assert_eq!(s.count, 2);
        assert_eq!(s.min, Some(3.0));
        assert_eq!(s.max, Some(4.0));
    }

    #[test]
    fn test_sliding_merges_buckets() {
        let windowed = WindowedAccumulator::new(
            WindowPolicy::Sliding {
                duration: Duration::from_secs(60),
                buckets: 6,
            },
            basic_factory(),
        );

        for i in 0..6 {
            windowed.record(f64::from(i), at(i64::from(i) * 10));
        }

        let s = basic(windowed.snapshot());
        assert_eq!(s.count, 6);
        assert_eq!(s.min, Some(0.0));
        assert_eq!(s.max, Some(5.0));
    }

    #[test]
    fn test_exponential_decay_policy() {
        let windowed = WindowedAccumulator::new(
            WindowPolicy::ExponentialDecay {
                half_life: Duration::from_secs(10),
            },
            basic_factory(),
        );

        windowed.record(0.0, at(0));
        windowed.record(100.0, at(10));

        match windowed.snapshot() {
            Snapshot::Decay(s) => {
                assert!((s.mean.unwrap() - 50.0).abs() < 1e-9);
            }
            other => panic!("expected Decay, got {other:?}"),
        }
    }

    #[test]
    fn test_reset_clears_window() {
        let windowed = WindowedAccumulator::new(
            WindowPolicy::Sliding {
                duration: Duration::from_secs(10),
                buckets: 2,
            },
            basic_factory(),
        );
        windowed.record(1.0, at(0));
        windowed.reset();
        assert_eq!(windowed.count(), 0);
    }
}
