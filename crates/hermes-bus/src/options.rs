//! Dispatch configuration.
//!
//! [`DispatchOptions`] bundles the bus-level concurrency limits, the
//! back-pressure strategy applied when those limits are reached, and the
//! optional per-dispatch deadline. Presets cover the common profiles.

use std::time::Duration;

/// What happens when the concurrency gate is at capacity.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum BackPressureStrategy {
    /// The caller waits (FIFO) until a permit frees up or it is cancelled.
    Suspend,
    /// The caller fails with `QueueFull` immediately, or — with a timeout —
    /// waits up to that duration before failing with `Timeout`.
    Error {
        /// How long to wait before failing, if at all.
        timeout: Option<Duration>,
    },
    /// The command is shed with the `CommandDropped` sentinel. Only valid
    /// where dropping is safe.
    Drop,
}

impl Default for BackPressureStrategy {
    fn default() -> Self {
        Self::Suspend
    }
}

/// Bus-level dispatch options.
///
/// # Example
///
/// ```
/// use hermes_bus::DispatchOptions;
///
/// let options = DispatchOptions::low_latency();
/// assert_eq!(options.max_concurrency, Some(5));
/// assert_eq!(options.max_outstanding, Some(10));
/// ```
#[derive(Debug, Clone, Default)]
pub struct DispatchOptions {
    /// Executions allowed inside pipelines at once. `None` disables the
    /// gate entirely.
    pub max_concurrency: Option<usize>,

    /// Admitted executions including waiters. `None` leaves the queue
    /// unbounded.
    pub max_outstanding: Option<usize>,

    /// Strategy applied when the gate is at capacity.
    pub strategy: BackPressureStrategy,

    /// Deadline applied to every dispatch. `None` leaves executions
    /// unbounded in time.
    pub dispatch_timeout: Option<Duration>,
}

impl DispatchOptions {
    /// No concurrency limits at all.
    #[must_use]
    pub fn unlimited() -> Self {
        Self {
            max_concurrency: None,
            max_outstanding: None,
            strategy: BackPressureStrategy::Suspend,
            dispatch_timeout: None,
        }
    }

    /// Balanced defaults: 10 concurrent, 50 outstanding, suspend.
    #[must_use]
    pub fn standard() -> Self {
        Self {
            max_concurrency: Some(10),
            max_outstanding: Some(50),
            strategy: BackPressureStrategy::Suspend,
            dispatch_timeout: None,
        }
    }

    /// Throughput profile: 50 concurrent, 200 outstanding, suspend.
    #[must_use]
    pub fn high_throughput() -> Self {
        Self {
            max_concurrency: Some(50),
            max_outstanding: Some(200),
            strategy: BackPressureStrategy::Suspend,
            dispatch_timeout: None,
        }
    }

    /// Latency profile: 5 concurrent, 10 outstanding, suspend.
    #[must_use]
    pub fn low_latency() -> Self {
        Self {
            max_concurrency: Some(5),
            max_outstanding: Some(10),
            strategy: BackPressureStrategy::Suspend,
            dispatch_timeout: None,
        }
    }

    /// Returns the options with a different back-pressure strategy.
    #[must_use]
    pub fn with_strategy(mut self, strategy: BackPressureStrategy) -> Self {
        self.strategy = strategy;
        self
    }

    /// Returns the options with a per-dispatch deadline.
    #[must_use]
    pub fn with_dispatch_timeout(mut self, timeout: Duration) -> Self {
        self.dispatch_timeout = Some(timeout);
        self
    }
}
