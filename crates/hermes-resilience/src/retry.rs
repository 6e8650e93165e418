//! Retry policies.
//!
//! A [`RetryPolicy`] decides whether a failed dispatch is re-attempted and
//! how long to wait between attempts. The policy itself is pure decision
//! logic — the bus owns the retry loop, sleeps with cancellation, and never
//! re-attempts a cancelled execution regardless of what the policy says.

use hermes_core::HermesError;
use parking_lot::Mutex;
use rand::rngs::StdRng;
use rand::{Rng, SeedableRng};
use std::sync::Arc;
use std::time::Duration;

/// Decides how long to wait before the next attempt.
///
/// `delay(k)` is the pause after attempt `k` (1-based) fails.
#[derive(Debug)]
pub enum DelayStrategy {
    /// The same delay after every attempt.
    Constant(Duration),

    /// Exponential growth capped at a maximum: `min(base · factor^(k-1), max)`.
    Exponential {
        /// Delay after the first failed attempt.
        base: Duration,
        /// Multiplier applied per attempt.
        factor: f64,
        /// Upper bound on any single delay.
        max: Duration,
    },

    /// Decorrelated jitter over the exponential curve:
    /// `d_k = uniform(base, d_{k-1} · 3)`, clamped to `max`.
    ///
    /// Deterministic under a fixed seed for tests.
    DecorrelatedJitter(JitterState),
}

/// Interior state of the decorrelated-jitter strategy.
#[derive(Debug)]
pub struct JitterState {
    base: Duration,
    max: Duration,
    state: Mutex<(StdRng, Duration)>,
}

impl DelayStrategy {
    /// A constant delay.
    #[must_use]
    pub const fn constant(delay: Duration) -> Self {
        Self::Constant(delay)
    }

    /// A capped exponential delay.
    #[must_use]
    pub const fn exponential(base: Duration, factor: f64, max: Duration) -> Self {
        Self::Exponential { base, factor, max }
    }

    /// Decorrelated jitter seeded from entropy.
    #[must_use]
    pub fn decorrelated_jitter(base: Duration, max: Duration) -> Self {
        Self::DecorrelatedJitter(JitterState {
            base,
            max,
            state: Mutex::new((StdRng::from_entropy(), base)),
        })
    }

    /// Decorrelated jitter with a fixed seed; the delay sequence is fully
    /// deterministic.
    #[must_use]
    pub fn decorrelated_jitter_seeded(base: Duration, max: Duration, seed: u64) -> Self {
        Self::DecorrelatedJitter(JitterState {
            base,
            max,
            state: Mutex::new((StdRng::seed_from_u64(seed), base)),
        })
    }

    /// Returns the delay after failed attempt `attempt` (1-based).
    #[must_use]
    pub fn delay(&self, attempt: u32) -> Duration {
        match self {
            Self::Constant(delay) => *delay,
            Self::Exponential { base, factor, max } => {
                let exponent = attempt.saturating_sub(1);
                let scaled = base.as_secs_f64() * factor.powi(exponent as i32);
                Duration::from_secs_f64(scaled.min(max.as_secs_f64()))
            }
            Self::DecorrelatedJitter(jitter) => {
                let mut state = jitter.state.lock();
                let (rng, prev) = &mut *state;
                let low = jitter.base.as_secs_f64();
                let high = (prev.as_secs_f64() * 3.0).max(low);
                let drawn = if high > low {
                    rng.gen_range(low..=high)
                } else {
                    low
                };
                let next = Duration::from_secs_f64(drawn.min(jitter.max.as_secs_f64()));
                *prev = next;
                next
            }
        }
    }
}

/// Retry decision procedure: attempt budget, delay strategy and a
/// per-attempt predicate.
///
/// # Example
///
/// ```
/// use hermes_resilience::{DelayStrategy, RetryPolicy};
/// use std::time::Duration;
///
/// let policy = RetryPolicy::new(
///     3,
///     DelayStrategy::exponential(Duration::from_millis(100), 2.0, Duration::from_secs(5)),
/// );
/// assert_eq!(policy.max_attempts(), 3);
/// ```
pub struct RetryPolicy {
    max_attempts: u32,
    delay: DelayStrategy,
    should_retry: Arc<dyn Fn(&HermesError, u32) -> bool + Send + Sync>,
}

impl RetryPolicy {
    /// Creates a policy retrying every non-cancelled error up to
    /// `max_attempts` total attempts (clamped to at least 1).
    #[must_use]
    pub fn new(max_attempts: u32, delay: DelayStrategy) -> Self {
        Self {
            max_attempts: max_attempts.max(1),
            delay,
            should_retry: Arc::new(|_, _| true),
        }
    }

    /// Replaces the retry predicate.
    ///
    /// The predicate is evaluated per attempt; returning `false` halts
    /// retries immediately.
    #[must_use]
    pub fn with_should_retry(
        mut self,
        predicate: impl Fn(&HermesError, u32) -> bool + Send + Sync + 'static,
    ) -> Self {
        self.should_retry = Arc::new(predicate);
        self
    }

    /// Restricts retries to errors classified transient by the taxonomy.
    #[must_use]
    pub fn transient_only(self) -> Self {
        self.with_should_retry(|error, _| error.is_transient())
    }

    /// Returns the total attempt budget.
    #[must_use]
    pub const fn max_attempts(&self) -> u32 {
        self.max_attempts
    }

    /// Returns the delay after failed attempt `attempt` (1-based).
    #[must_use]
    pub fn delay_for(&self, attempt: u32) -> Duration {
        self.delay.delay(attempt)
    }

    /// Decides whether attempt `attempt` (1-based) should be followed by
    /// another.
    ///
    /// Cancelled errors are terminal regardless of the predicate.
    #[must_use]
    pub fn should_retry(&self, error: &HermesError, attempt: u32) -> bool {
        if error.is_cancelled() || attempt >= self.max_attempts {
            return false;
        }
        (self.should_retry)(error, attempt)
    }
}

impl std::fmt::Debug for RetryPolicy {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("RetryPolicy")
            .field("max_attempts", &self.max_attempts)
            .field("delay", &self.delay)
            .finish_non_exhaustive()
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_constant_delay() {
        let strategy = DelayStrategy::constant(Duration::from_millis(500));
        assert_eq!(strategy.delay(1), Duration::from_millis(500));
        assert_eq!(strategy.delay(7), Duration::from_millis(500));
    }

    #[test]
    fn test_exponential_delay_grows_and_caps() {
        let strategy = DelayStrategy::exponential(
            Duration::from_millis(100),
            2.0,
            Duration::from_millis(450),
        );
        assert_eq!(strategy.delay(1), Duration::from_millis(100));
        assert_eq!(strategy.delay(2), Duration::from_millis(200));
        assert_eq!(strategy.delay(3), Duration::from_millis(400));
        // Capped at max from here on.
        assert_eq!(strategy.delay(4), Duration::from_millis(450));
        assert_eq!(strategy.delay(10), Duration::from_millis(450));
    }

    #[test]
    fn test_jitter_is_deterministic_under_seed() {
        let a = DelayStrategy::decorrelated_jitter_seeded(
            Duration::from_millis(50),
            Duration::from_secs(2),
            42,
        );
        let b = DelayStrategy::decorrelated_jitter_seeded(
            Duration::from_millis(50),
            Duration::from_secs(2),
            42,
        );

        for attempt in 1..=8 {
            assert_eq!(a.delay(attempt), b.delay(attempt));
        }
    }

    #[test]
    fn test_jitter_stays_bounded() {
        let strategy = DelayStrategy::decorrelated_jitter_seeded(
            Duration::from_millis(100),
            Duration::from_millis(800),
            7,
        );

        for attempt in 1..=32 {
            let delay = strategy.delay(attempt);
            assert!(delay >= Duration::from_millis(100), "below base: {delay:?}");
            assert!(delay <= Duration::from_millis(800), "above max: {delay:?}");
        }
    }

    #[test]
    fn test_policy_clamps_attempts() {
        let policy = RetryPolicy::new(0, DelayStrategy::constant(Duration::ZERO));
        assert_eq!(policy.max_attempts(), 1);
    }

    #[test]
    fn test_policy_never_retries_cancelled() {
        let policy = RetryPolicy::new(5, DelayStrategy::constant(Duration::ZERO));
        assert!(!policy.should_retry(&HermesError::cancelled(), 1));
    }

    #[test]
    fn test_policy_stops_at_budget() {
        let policy = RetryPolicy::new(3, DelayStrategy::constant(Duration::ZERO));
        let error = HermesError::QueueFull;
        assert!(policy.should_retry(&error, 1));
        assert!(policy.should_retry(&error, 2));
        assert!(!policy.should_retry(&error, 3));
    }

    #[test]
    fn test_predicate_false_halts() {
        let policy = RetryPolicy::new(5, DelayStrategy::constant(Duration::ZERO))
            .with_should_retry(|_, attempt| attempt < 2);
        let error = HermesError::QueueFull;
        assert!(policy.should_retry(&error, 1));
        assert!(!policy.should_retry(&error, 2));
    }

    #[test]
    fn test_transient_only() {
        let policy =
            RetryPolicy::new(5, DelayStrategy::constant(Duration::ZERO)).transient_only();
        assert!(policy.should_retry(&HermesError::QueueFull, 1));
        assert!(!policy.should_retry(&HermesError::execution_failed("boom"), 1));
    }
}
