//! Exponentially decayed statistics.
//!
//! Maintains an exponentially weighted moving average and variance where
//! the weight of history halves every `half_life`. Decay is driven by the
//! supplied sample timestamps, so irregular sampling is handled correctly
//! and tests are deterministic.

use crate::accumulator::{Accumulator, DecaySnapshot, Snapshot};
use chrono::{DateTime, Utc};
use parking_lot::Mutex;
use std::time::Duration;

/// EWMA/EWMV accumulator with a half-life decay.
///
/// # Example
///
/// ```
/// use chrono::{DateTime, Utc};
/// use hermes_metrics::{Accumulator, EwmaAccumulator, Snapshot};
/// use std::time::Duration;
///
/// let ewma = EwmaAccumulator::new(Duration::from_secs(60));
/// let t0 = DateTime::<Utc>::from_timestamp(1_700_000_000, 0).unwrap();
/// ewma.record(10.0, t0);
///
/// match ewma.snapshot() {
///     Snapshot::Decay(s) => assert_eq!(s.mean, Some(10.0)),
///     _ => unreachable!(),
/// }
/// ```
#[derive(Debug)]
pub struct EwmaAccumulator {
    half_life: Duration,
    inner: Mutex<DecayInner>,
}

#[derive(Debug, Default)]
struct DecayInner {
    count: u64,
    mean: Option<f64>,
    variance: f64,
    last_at: Option<DateTime<Utc>>,
}

impl EwmaAccumulator {
    /// Creates an accumulator whose history halves in weight every
    /// `half_life`.
    #[must_use]
    pub fn new(half_life: Duration) -> Self {
        Self {
            half_life: half_life.max(Duration::from_millis(1)),
            inner: Mutex::new(DecayInner::default()),
        }
    }

    /// Blend factor for a gap of `dt` seconds: `1 - 2^(-dt / half_life)`.
    fn alpha(&self, dt: f64) -> f64 {
        let half_life = self.half_life.as_secs_f64();
        1.0 - 0.5f64.powf(dt / half_life)
    }
}

impl Accumulator for EwmaAccumulator {
    fn record(&self, value: f64, timestamp: DateTime<Utc>) {
        let mut inner = self.inner.lock();
        inner.count += 1;

        match (inner.mean, inner.last_at) {
            (Some(mean), Some(last_at)) => {
                let dt = (timestamp - last_at)
                    .to_std()
                    .map_or(0.0, |d| d.as_secs_f64());
                // With no gap, weight the new sample as one more
                // observation rather than ignoring it.
                let alpha = if dt > 0.0 {
                    self.alpha(dt)
                } else {
                    1.0 / inner.count as f64
                };
                let delta = value - mean;
                let new_mean = mean + alpha * delta;
                inner.variance = (1.0 - alpha) * (inner.variance + alpha * delta * delta);
                inner.mean = Some(new_mean);
                inner.last_at = Some(last_at.max(timestamp));
            }
            _ => {
                inner.mean = Some(value);
                inner.variance = 0.0;
                inner.last_at = Some(timestamp);
            }
        }
    }

    fn snapshot(&self) -> Snapshot {
        let inner = self.inner.lock();
        Snapshot::Decay(DecaySnapshot {
            count: inner.count,
            mean: inner.mean,
            variance: inner.mean.map(|_| inner.variance),
            last_at: inner.last_at,
        })
    }

    fn reset(&self) {
        *self.inner.lock() = DecayInner::default();
    }

    fn count(&self) -> u64 {
        self.inner.lock().count
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn at(seconds: i64) -> DateTime<Utc> {
        DateTime::<Utc>::from_timestamp(1_700_000_000 + seconds, 0).unwrap()
    }

    fn decay_snapshot(accumulator: &EwmaAccumulator) -> DecaySnapshot {
        match accumulator.snapshot() {
            Snapshot::Decay(s) => s,
            other => panic!("expected Decay, got {other:?}"),
        }
    }

    #[test]
    fn test_first_sample_sets_mean() {
        let ewma = EwmaAccumulator::new(Duration::from_secs(60));
        ewma.record(42.0, at(0));

        let s = decay_snapshot(&ewma);
        assert_eq!(s.count, 1);
        assert_eq!(s.mean, Some(42.0));
        assert_eq!(s.variance, Some(0.0));
    }

    #[test]
    fn test_mean_moves_toward_new_values() {
        let ewma = EwmaAccumulator::new(Duration::from_secs(10));
        ewma.record(0.0, at(0));
        // One half-life later the new value carries half the weight.
        ewma.record(100.0, at(10));

        let mean = decay_snapshot(&ewma).mean.unwrap();
        assert!((mean - 50.0).abs() < 1e-9, "mean was {mean}");
    }

    #[test]
    fn test_old_history_decays_away() {
        let ewma = EwmaAccumulator::new(Duration::from_secs(1));
        ewma.record(1000.0, at(0));
        // Many half-lives later the old sample is nearly irrelevant.
        ewma.record(0.0, at(60));

        let mean = decay_snapshot(&ewma).mean.unwrap();
        assert!(mean < 1.0, "mean was {mean}");
    }

    #[test]
    fn test_variance_tracks_spread() {
        let ewma = EwmaAccumulator::new(Duration::from_secs(10));
        for (i, value) in [10.0, 20.0, 10.0, 20.0, 10.0].iter().enumerate() {
            ewma.record(*value, at(i as i64));
        }

        let s = decay_snapshot(&ewma);
        assert!(s.variance.unwrap() > 0.0);
    }

    #[test]
    fn test_reset() {
        let ewma = EwmaAccumulator::new(Duration::from_secs(10));
        ewma.record(5.0, at(0));
        ewma.reset();

        let s = decay_snapshot(&ewma);
        assert_eq!(s.count, 0);
        assert!(s.mean.is_none());
    }
}
