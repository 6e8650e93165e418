//! # Hermes Resilience
//!
//! Retry policies and circuit breaking for the Hermes dispatch runtime.
//!
//! - [`RetryPolicy`] / [`DelayStrategy`] - the decision procedure for
//!   re-attempting failed executions (constant, capped exponential, and
//!   seedable decorrelated-jitter delays)
//! - [`CircuitBreaker`] - a three-state machine that fails fast under
//!   sustained failure
//!
//! The bus composes both on its send path: retries wrap breaker-guarded
//! pipeline executions, and cooperative cancellation always wins — a
//! cancelled execution is never re-attempted and never counted by the
//! breaker.

#![doc(html_root_url = "https://docs.rs/hermes-resilience/0.1.0")]
#![warn(missing_docs)]
#![forbid(unsafe_code)]

mod breaker;
mod retry;

pub use breaker::{BreakerAdmission, BreakerState, CircuitBreaker, CircuitBreakerConfig};
pub use retry::{DelayStrategy, JitterState, RetryPolicy};
