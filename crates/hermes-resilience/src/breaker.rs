//! Circuit breaker.
//!
//! A three-state machine that short-circuits dispatch under sustained
//! failure:
//!
//! - **Closed** — counts consecutive failures; at `failure_threshold` it
//!   opens and arms `open_timeout`. Any success resets the count.
//! - **Open** — every admission fails immediately. Once `open_timeout` has
//!   elapsed, the next admission transitions to half-open.
//! - **Half-open** — admits exactly one probe at a time. `success_threshold`
//!   consecutive probe successes close the breaker; one probe failure
//!   reopens it and re-arms the timeout.
//!
//! Every admission is tagged with the state generation it was issued under;
//! outcomes reported against a stale generation are ignored, so reordered
//! results from earlier epochs can never drive a transition. Cancelled
//! executions release their probe slot without counting as success or
//! failure.

use hermes_core::HermesError;
use parking_lot::Mutex;
use std::time::Duration;
use tokio::time::Instant;

/// Circuit breaker parameters.
#[derive(Debug, Clone)]
pub struct CircuitBreakerConfig {
    /// Consecutive failures in closed state before opening.
    pub failure_threshold: u32,
    /// Consecutive probe successes in half-open state before closing.
    pub success_threshold: u32,
    /// How long the breaker stays open before admitting a probe.
    pub open_timeout: Duration,
}

impl Default for CircuitBreakerConfig {
    fn default() -> Self {
        Self {
            failure_threshold: 5,
            success_threshold: 1,
            open_timeout: Duration::from_secs(30),
        }
    }
}

/// The externally visible breaker state.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum BreakerState {
    /// Normal operation; failures are being counted.
    Closed,
    /// Failing fast; no executions are admitted.
    Open,
    /// Probing; a single execution at a time is admitted.
    HalfOpen,
}

/// Internal state machine.
#[derive(Debug)]
enum State {
    Closed { consecutive_failures: u32 },
    Open { since: Instant },
    HalfOpen { successes: u32, probe_in_flight: bool },
}

#[derive(Debug)]
struct Inner {
    state: State,
    /// Bumped on every transition; ties admissions to their epoch.
    generation: u64,
}

/// Proof of admission, tagged with the issuing epoch.
///
/// Report the outcome back through [`CircuitBreaker::record_success`],
/// [`CircuitBreaker::record_failure`] or
/// [`CircuitBreaker::record_cancelled`].
#[derive(Debug, Clone, Copy)]
pub struct BreakerAdmission {
    generation: u64,
}

/// A three-state circuit breaker with serialized transitions.
///
/// # Example
///
/// ```
/// use hermes_resilience::{BreakerState, CircuitBreaker, CircuitBreakerConfig};
/// use std::time::Duration;
///
/// let breaker = CircuitBreaker::new(CircuitBreakerConfig {
///     failure_threshold: 3,
///     success_threshold: 1,
///     open_timeout: Duration::from_secs(10),
/// });
///
/// let admission = breaker.admit().unwrap();
/// breaker.record_success(admission);
/// assert_eq!(breaker.state(), BreakerState::Closed);
/// ```
#[derive(Debug)]
pub struct CircuitBreaker {
    config: CircuitBreakerConfig,
    inner: Mutex<Inner>,
}

impl CircuitBreaker {
    /// Creates a breaker in the closed state.
    #[must_use]
    pub fn new(config: CircuitBreakerConfig) -> Self {
        Self {
            config,
            inner: Mutex::new(Inner {
                state: State::Closed {
                    consecutive_failures: 0,
                },
                generation: 0,
            }),
        }
    }

    /// Requests admission for one execution.
    ///
    /// # Errors
    ///
    /// Fails with [`HermesError::CircuitBreakerOpen`] while the breaker is
    /// open or a half-open probe is already in flight.
    pub fn admit(&self) -> Result<BreakerAdmission, HermesError> {
        let mut guard = self.inner.lock();
        let inner = &mut *guard;
        match &mut inner.state {
            State::Closed { .. } => Ok(BreakerAdmission {
                generation: inner.generation,
            }),
            State::Open { since } => {
                let elapsed = since.elapsed();
                if elapsed >= self.config.open_timeout {
                    inner.state = State::HalfOpen {
                        successes: 0,
                        probe_in_flight: true,
                    };
                    inner.generation += 1;
                    tracing::debug!("circuit breaker half-open, admitting probe");
                    Ok(BreakerAdmission {
                        generation: inner.generation,
                    })
                } else {
                    Err(HermesError::breaker_open(Some(
                        self.config.open_timeout - elapsed,
                    )))
                }
            }
            State::HalfOpen {
                probe_in_flight, ..
            } => {
                if *probe_in_flight {
                    Err(HermesError::breaker_open(None))
                } else {
                    *probe_in_flight = true;
                    Ok(BreakerAdmission {
                        generation: inner.generation,
                    })
                }
            }
        }
    }

    /// Records a successful execution.
    pub fn record_success(&self, admission: BreakerAdmission) {
        let mut guard = self.inner.lock();
        let inner = &mut *guard;
        if admission.generation != inner.generation {
            return;
        }
        match &mut inner.state {
            State::Closed {
                consecutive_failures,
            } => {
                *consecutive_failures = 0;
            }
            State::HalfOpen {
                successes,
                probe_in_flight,
            } => {
                *probe_in_flight = false;
                *successes += 1;
                if *successes >= self.config.success_threshold {
                    inner.state = State::Closed {
                        consecutive_failures: 0,
                    };
                    inner.generation += 1;
                    tracing::debug!("circuit breaker closed");
                }
            }
            State::Open { .. } => {}
        }
    }

    /// Records a failed execution.
    pub fn record_failure(&self, admission: BreakerAdmission) {
        let mut guard = self.inner.lock();
        let inner = &mut *guard;
        if admission.generation != inner.generation {
            return;
        }
        match &mut inner.state {
            State::Closed {
                consecutive_failures,
            } => {
                *consecutive_failures += 1;
                if *consecutive_failures >= self.config.failure_threshold {
                    inner.state = State::Open {
                        since: Instant::now(),
                    };
                    inner.generation += 1;
                    tracing::debug!(
                        failure_threshold = self.config.failure_threshold,
                        "circuit breaker opened"
                    );
                }
            }
            State::HalfOpen { .. } => {
                inner.state = State::Open {
                    since: Instant::now(),
                };
                inner.generation += 1;
                tracing::debug!("circuit breaker reopened after failed probe");
            }
            State::Open { .. } => {}
        }
    }

    /// Releases an admission whose execution was cancelled.
    ///
    /// Cancellations are neither successes nor failures; in half-open state
    /// this frees the probe slot for the next caller.
    pub fn record_cancelled(&self, admission: BreakerAdmission) {
        let mut guard = self.inner.lock();
        let inner = &mut *guard;
        if admission.generation != inner.generation {
            return;
        }
        if let State::HalfOpen {
            probe_in_flight, ..
        } = &mut inner.state
        {
            *probe_in_flight = false;
        }
    }

    /// Returns the externally visible state.
    #[must_use]
    pub fn state(&self) -> BreakerState {
        match self.inner.lock().state {
            State::Closed { .. } => BreakerState::Closed,
            State::Open { .. } => BreakerState::Open,
            State::HalfOpen { .. } => BreakerState::HalfOpen,
        }
    }

    /// Returns the consecutive failure count while closed.
    #[must_use]
    pub fn consecutive_failures(&self) -> u32 {
        match self.inner.lock().state {
            State::Closed {
                consecutive_failures,
            } => consecutive_failures,
            _ => 0,
        }
    }

    /// Returns the time remaining until the breaker admits a probe, while
    /// open.
    #[must_use]
    pub fn remaining_open(&self) -> Option<Duration> {
        match self.inner.lock().state {
            State::Open { since } => Some(
                self.config
                    .open_timeout
                    .saturating_sub(since.elapsed()),
            ),
            _ => None,
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn breaker(failures: u32, successes: u32, timeout: Duration) -> CircuitBreaker {
        CircuitBreaker::new(CircuitBreakerConfig {
            failure_threshold: failures,
            success_threshold: successes,
            open_timeout: timeout,
        })
    }

    fn fail_once(breaker: &CircuitBreaker) {
        let admission = breaker.admit().expect("admission");
        breaker.record_failure(admission);
    }

    #[tokio::test]
    async fn test_opens_after_consecutive_failures() {
        let breaker = breaker(3, 1, Duration::from_secs(10));

        fail_once(&breaker);
        fail_once(&breaker);
        assert_eq!(breaker.state(), BreakerState::Closed);
        assert_eq!(breaker.consecutive_failures(), 2);

        fail_once(&breaker);
        assert_eq!(breaker.state(), BreakerState::Open);
        assert!(matches!(
            breaker.admit().unwrap_err(),
            HermesError::CircuitBreakerOpen { .. }
        ));
    }

    #[tokio::test]
    async fn test_success_resets_failure_count() {
        let breaker = breaker(3, 1, Duration::from_secs(10));

        fail_once(&breaker);
        fail_once(&breaker);

        let admission = breaker.admit().unwrap();
        breaker.record_success(admission);
        assert_eq!(breaker.consecutive_failures(), 0);

        // The reset means two more failures still do not open.
        fail_once(&breaker);
        fail_once(&breaker);
        assert_eq!(breaker.state(), BreakerState::Closed);
    }

    #[tokio::test(start_paused = true)]
    async fn test_open_timeout_admits_probe() {
        let breaker = breaker(1, 1, Duration::from_millis(100));
        fail_once(&breaker);
        assert_eq!(breaker.state(), BreakerState::Open);

        let err = breaker.admit().unwrap_err();
        match err {
            HermesError::CircuitBreakerOpen { retry_after } => {
                assert!(retry_after.is_some());
            }
            other => panic!("expected CircuitBreakerOpen, got {other:?}"),
        }

        tokio::time::sleep(Duration::from_millis(150)).await;

        let probe = breaker.admit().expect("probe after timeout");
        assert_eq!(breaker.state(), BreakerState::HalfOpen);
        breaker.record_success(probe);
        assert_eq!(breaker.state(), BreakerState::Closed);
    }

    #[tokio::test(start_paused = true)]
    async fn test_half_open_admits_single_probe() {
        let breaker = breaker(1, 1, Duration::from_millis(50));
        fail_once(&breaker);
        tokio::time::sleep(Duration::from_millis(60)).await;

        let _probe = breaker.admit().expect("first probe");
        // A concurrent probe is rejected while the first is in flight.
        assert!(breaker.admit().is_err());
    }

    #[tokio::test(start_paused = true)]
    async fn test_failed_probe_reopens() {
        let breaker = breaker(1, 1, Duration::from_millis(50));
        fail_once(&breaker);
        tokio::time::sleep(Duration::from_millis(60)).await;

        let probe = breaker.admit().unwrap();
        breaker.record_failure(probe);
        assert_eq!(breaker.state(), BreakerState::Open);
        assert!(breaker.remaining_open().is_some());
    }

    #[tokio::test(start_paused = true)]
    async fn test_success_threshold_requires_chain() {
        let breaker = breaker(1, 2, Duration::from_millis(50));
        fail_once(&breaker);
        tokio::time::sleep(Duration::from_millis(60)).await;

        let probe = breaker.admit().unwrap();
        breaker.record_success(probe);
        assert_eq!(breaker.state(), BreakerState::HalfOpen);

        let probe = breaker.admit().unwrap();
        breaker.record_success(probe);
        assert_eq!(breaker.state(), BreakerState::Closed);
    }

    #[tokio::test(start_paused = true)]
    async fn test_cancellation_releases_probe_without_counting() {
        let breaker = breaker(1, 1, Duration::from_millis(50));
        fail_once(&breaker);
        tokio::time::sleep(Duration::from_millis(60)).await;

        let probe = breaker.admit().unwrap();
        breaker.record_cancelled(probe);

        // Probe slot is free again and no success was recorded.
        assert_eq!(breaker.state(), BreakerState::HalfOpen);
        assert!(breaker.admit().is_ok());
    }

    #[tokio::test(start_paused = true)]
    async fn test_stale_outcomes_are_ignored() {
        let breaker = breaker(1, 1, Duration::from_millis(50));

        // Admission from the closed epoch.
        let stale = breaker.admit().unwrap();

        // Meanwhile the breaker opens and moves to half-open.
        fail_once(&breaker);
        tokio::time::sleep(Duration::from_millis(60)).await;
        let probe = breaker.admit().unwrap();

        // The stale success must not close the breaker.
        breaker.record_success(stale);
        assert_eq!(breaker.state(), BreakerState::HalfOpen);

        breaker.record_success(probe);
        assert_eq!(breaker.state(), BreakerState::Closed);
    }
}
