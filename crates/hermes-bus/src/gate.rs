//! Back-pressure concurrency gate.
//!
//! A counting semaphore with two limits: `max_concurrency` bounds the
//! executions running inside pipelines, `max_outstanding` bounds admitted
//! executions including those waiting for a permit. Waiters queue FIFO; a
//! released permit hands off to the longest-waiting live waiter. Cancelled
//! waiters remove themselves under the lock, and a permit raced to a waiter
//! that just gave up is re-offered to the next one, so
//! `active ≤ max_concurrency` holds at every observation point.

use hermes_core::{CancellationToken, HermesError, HermesResult};
use parking_lot::Mutex;
use serde::Serialize;
use std::collections::VecDeque;
use std::sync::atomic::{AtomicU64, Ordering};
use std::sync::Arc;
use std::time::Duration;
use tokio::sync::oneshot;

use crate::options::BackPressureStrategy;

/// One queued waiter: a one-shot rendezvous signalled on hand-off.
struct Waiter {
    id: u64,
    tx: oneshot::Sender<()>,
}

/// State guarded by the gate lock.
struct GateState {
    /// Permits currently held by executions.
    active: usize,
    /// FIFO queue of waiters.
    waiters: VecDeque<Waiter>,
    /// Monotonic waiter IDs for self-removal.
    next_waiter_id: u64,
}

struct GateInner {
    max_concurrency: usize,
    max_outstanding: Option<usize>,
    state: Mutex<GateState>,
    total_acquired: AtomicU64,
    total_timed_out: AtomicU64,
    total_rejected: AtomicU64,
}

impl GateInner {
    /// Releases one permit: hand off to the first live waiter, otherwise
    /// decrement the active count.
    fn release(&self) {
        let mut state = self.state.lock();
        loop {
            match state.waiters.pop_front() {
                Some(waiter) => {
                    // A send failure means the waiter's future was dropped
                    // without self-removal; skip it and offer the permit to
                    // the next one.
                    if waiter.tx.send(()).is_ok() {
                        return;
                    }
                }
                None => {
                    state.active = state.active.saturating_sub(1);
                    return;
                }
            }
        }
    }

    /// Removes a waiter by ID. Returns `false` when the waiter was already
    /// popped by a releaser, in which case a permit is sitting in its
    /// channel.
    fn remove_waiter(&self, id: u64) -> bool {
        let mut state = self.state.lock();
        match state.waiters.iter().position(|w| w.id == id) {
            Some(index) => {
                state.waiters.remove(index);
                true
            }
            None => false,
        }
    }
}

/// RAII token owning one unit of gate capacity.
///
/// Dropping the permit releases it; release happens exactly once on every
/// execution path.
#[must_use = "dropping the permit releases gate capacity"]
pub struct GatePermit {
    inner: Option<Arc<GateInner>>,
}

impl GatePermit {
    fn new(inner: Arc<GateInner>) -> Self {
        Self { inner: Some(inner) }
    }

    /// Releases the permit explicitly. Idempotent.
    pub fn release(mut self) {
        if let Some(inner) = self.inner.take() {
            inner.release();
        }
    }
}

impl Drop for GatePermit {
    fn drop(&mut self) {
        if let Some(inner) = self.inner.take() {
            inner.release();
        }
    }
}

impl std::fmt::Debug for GatePermit {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("GatePermit")
            .field("held", &self.inner.is_some())
            .finish()
    }
}

/// Observability snapshot of a gate.
#[derive(Debug, Clone, Copy, PartialEq, Serialize)]
pub struct GateStats {
    /// Executions currently holding a permit.
    pub active_operations: usize,
    /// Permits still available.
    pub available_resources: usize,
    /// Waiters queued for a permit.
    pub pending_waiters: usize,
    /// Permits ever acquired.
    pub total_acquired: u64,
    /// Waits that ended in a timeout.
    pub total_timed_out: u64,
    /// Admissions rejected outright.
    pub total_rejected: u64,
    /// `active / max_concurrency` as a percentage.
    pub utilization_percent: f64,
}

/// A bounded FIFO semaphore guarding pipeline executions.
///
/// # Example
///
/// ```ignore
/// let gate = ConcurrencyGate::new(2, Some(3));
/// let permit = gate
///     .acquire(&BackPressureStrategy::Suspend, &cancellation)
///     .await?;
/// // run the execution, then drop the permit
/// ```
pub struct ConcurrencyGate {
    inner: Arc<GateInner>,
}

impl ConcurrencyGate {
    /// Creates a gate with `max_concurrency` permits and an optional bound
    /// on admitted-plus-waiting executions.
    #[must_use]
    pub fn new(max_concurrency: usize, max_outstanding: Option<usize>) -> Self {
        Self {
            inner: Arc::new(GateInner {
                max_concurrency: max_concurrency.max(1),
                max_outstanding,
                state: Mutex::new(GateState {
                    active: 0,
                    waiters: VecDeque::new(),
                    next_waiter_id: 0,
                }),
                total_acquired: AtomicU64::new(0),
                total_timed_out: AtomicU64::new(0),
                total_rejected: AtomicU64::new(0),
            }),
        }
    }

    /// Acquires one permit according to the back-pressure strategy.
    ///
    /// # Errors
    ///
    /// - `QueueFull` when admission would exceed the outstanding bound
    /// - `Timeout` under `Error(Some(t))` when no permit frees up in time
    /// - `CommandDropped` under `Drop` at capacity
    /// - `Cancelled` when the caller's token fires while waiting
    pub async fn acquire(
        &self,
        strategy: &BackPressureStrategy,
        cancellation: &CancellationToken,
    ) -> HermesResult<GatePermit> {
        let (waiter_id, mut rx) = {
            let mut state = self.inner.state.lock();

            // Capacity is only consulted under the lock; FIFO fairness means
            // a fresh caller never jumps an existing queue.
            if state.active < self.inner.max_concurrency && state.waiters.is_empty() {
                state.active += 1;
                self.inner.total_acquired.fetch_add(1, Ordering::Relaxed);
                return Ok(GatePermit::new(Arc::clone(&self.inner)));
            }

            match strategy {
                // Drop never queues: a command that cannot run now is shed.
                BackPressureStrategy::Drop => {
                    self.inner.total_rejected.fetch_add(1, Ordering::Relaxed);
                    return Err(HermesError::CommandDropped);
                }
                // Suspend and Error both admit waiters up to the
                // outstanding bound; they differ in what a queued waiter
                // does (wait forever vs. time out).
                BackPressureStrategy::Suspend | BackPressureStrategy::Error { .. } => {
                    let outstanding = state.active + state.waiters.len();
                    if let Some(max_outstanding) = self.inner.max_outstanding {
                        if outstanding >= max_outstanding {
                            self.inner.total_rejected.fetch_add(1, Ordering::Relaxed);
                            return Err(HermesError::QueueFull);
                        }
                    }

                    let id = state.next_waiter_id;
                    state.next_waiter_id += 1;
                    let (tx, rx) = oneshot::channel();
                    state.waiters.push_back(Waiter { id, tx });
                    (id, rx)
                }
            }
        };

        let wait_budget = match strategy {
            BackPressureStrategy::Error { timeout: Some(t) } => Some(*t),
            _ => None,
        };

        tokio::select! {
            result = &mut rx => {
                match result {
                    Ok(()) => {
                        self.inner.total_acquired.fetch_add(1, Ordering::Relaxed);
                        Ok(GatePermit::new(Arc::clone(&self.inner)))
                    }
                    // The gate never drops a queued sender; treat a closed
                    // channel as a rejected admission.
                    Err(_) => Err(HermesError::QueueFull),
                }
            }
            _ = cancellation.cancelled() => {
                self.abandon_wait(waiter_id, &mut rx);
                Err(cancellation.to_error())
            }
            _ = sleep_budget(wait_budget) => {
                self.abandon_wait(waiter_id, &mut rx);
                self.inner.total_timed_out.fetch_add(1, Ordering::Relaxed);
                Err(HermesError::Timeout {
                    waited: wait_budget.unwrap_or_default(),
                })
            }
        }
    }

    /// Removes an abandoned waiter; when a permit was raced into its
    /// channel, passes it on so capacity is never leaked.
    fn abandon_wait(&self, waiter_id: u64, rx: &mut oneshot::Receiver<()>) {
        if !self.inner.remove_waiter(waiter_id) {
            // A releaser popped this waiter before the self-removal: the
            // hand-off already happened, so the permit must move on.
            if rx.try_recv().is_ok() {
                self.inner.release();
            }
        }
    }

    /// Returns the gate's observability snapshot.
    #[must_use]
    pub fn stats(&self) -> GateStats {
        let state = self.inner.state.lock();
        let active = state.active;
        let max = self.inner.max_concurrency;
        GateStats {
            active_operations: active,
            available_resources: max.saturating_sub(active),
            pending_waiters: state.waiters.len(),
            total_acquired: self.inner.total_acquired.load(Ordering::Relaxed),
            total_timed_out: self.inner.total_timed_out.load(Ordering::Relaxed),
            total_rejected: self.inner.total_rejected.load(Ordering::Relaxed),
            utilization_percent: (active as f64 / max as f64) * 100.0,
        }
    }
}

impl std::fmt::Debug for ConcurrencyGate {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        let stats = self.stats();
        f.debug_struct("ConcurrencyGate")
            .field("max_concurrency", &self.inner.max_concurrency)
            .field("max_outstanding", &self.inner.max_outstanding)
            .field("active", &stats.active_operations)
            .field("pending", &stats.pending_waiters)
            .finish()
    }
}

/// Sleeps for the budget, or forever when there is none.
async fn sleep_budget(budget: Option<Duration>) {
    match budget {
        Some(duration) => tokio::time::sleep(duration).await,
        None => std::future::pending().await,
    }
}
