//! Cooperative cancellation for command executions.
//!
//! Every execution carries a [`CancellationToken`]: a cancel flag, a wakeup
//! channel for suspended waiters, and an optional deadline. Timeouts are
//! implemented as a deadline on the token, so an expiring deadline propagates
//! identically to an external `cancel()` call.
//!
//! Cancellation is cooperative: the runtime polls the token at every
//! suspension point it controls, and middleware performing its own I/O is
//! expected to do the same via [`CancellationToken::check`] or
//! [`CancellationToken::cancelled`].

use crate::error::{HermesError, HermesResult};
use parking_lot::Mutex;
use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::Arc;
use std::time::Duration;
use tokio::sync::broadcast;
use tokio::time::Instant;

/// Shared state behind a cancellation token.
#[derive(Debug)]
struct TokenState {
    /// Whether cancellation has been requested (or a deadline observed).
    cancelled: AtomicBool,

    /// Context describing the cancellation source.
    context: Mutex<Option<String>>,
}

/// A cancellation signal scoped to one command execution.
///
/// The token can be cloned and shared; all clones observe the same state.
/// Cancelling is idempotent, and a deadline (when configured) cancels the
/// token implicitly the first time it is observed after expiry.
///
/// # Example
///
/// ```
/// use hermes_core::CancellationToken;
///
/// let token = CancellationToken::new();
/// assert!(!token.is_cancelled());
///
/// token.cancel();
/// assert!(token.is_cancelled());
/// assert!(token.check().is_err());
/// ```
#[derive(Debug, Clone)]
pub struct CancellationToken {
    state: Arc<TokenState>,

    /// Broadcast sender for waking suspended waiters.
    sender: broadcast::Sender<()>,

    /// Absolute deadline, if the execution is bounded in time.
    deadline: Option<Instant>,
}

impl CancellationToken {
    /// Creates a token with no deadline.
    #[must_use]
    pub fn new() -> Self {
        let (sender, _) = broadcast::channel(1);
        Self {
            state: Arc::new(TokenState {
                cancelled: AtomicBool::new(false),
                context: Mutex::new(None),
            }),
            sender,
            deadline: None,
        }
    }

    /// Creates a token that cancels itself once `timeout` has elapsed.
    #[must_use]
    pub fn with_timeout(timeout: Duration) -> Self {
        let mut token = Self::new();
        token.deadline = Some(Instant::now() + timeout);
        token
    }

    /// Returns the absolute deadline, if one is set.
    #[must_use]
    pub const fn deadline(&self) -> Option<Instant> {
        self.deadline
    }

    /// Requests cancellation.
    ///
    /// Idempotent; the first call wins and later calls are ignored.
    pub fn cancel(&self) {
        self.cancel_internal(None);
    }

    /// Requests cancellation with context describing the source.
    pub fn cancel_with(&self, context: impl Into<String>) {
        self.cancel_internal(Some(context.into()));
    }

    fn cancel_internal(&self, context: Option<String>) {
        if self
            .state
            .cancelled
            .compare_exchange(false, true, Ordering::SeqCst, Ordering::SeqCst)
            .is_ok()
        {
            *self.state.context.lock() = context;
            // Receiver count may be zero; nobody waiting is fine.
            let _ = self.sender.send(());
        }
    }

    /// Returns `true` if cancellation has been requested or the deadline
    /// has passed.
    #[must_use]
    pub fn is_cancelled(&self) -> bool {
        if self.state.cancelled.load(Ordering::SeqCst) {
            return true;
        }
        if let Some(deadline) = self.deadline {
            if Instant::now() >= deadline {
                self.cancel_internal(Some("deadline exceeded".to_string()));
                return true;
            }
        }
        false
    }

    /// Polls the token, failing with a cancelled error when cancellation
    /// has been observed.
    ///
    /// This is the form used at runtime-controlled suspension points.
    pub fn check(&self) -> HermesResult<()> {
        if self.is_cancelled() {
            Err(self.to_error())
        } else {
            Ok(())
        }
    }

    /// Builds the cancelled error for this token's current state.
    #[must_use]
    pub fn to_error(&self) -> HermesError {
        match self.state.context.lock().clone() {
            Some(context) => HermesError::cancelled_with(context),
            None => HermesError::cancelled(),
        }
    }

    /// Waits until the token is cancelled (externally or by deadline).
    pub async fn cancelled(&self) {
        if self.is_cancelled() {
            return;
        }

        let mut receiver = self.sender.subscribe();

        // Re-check after subscribing so a cancel between the first check and
        // the subscription is not missed.
        if self.is_cancelled() {
            return;
        }

        match self.deadline {
            Some(deadline) => {
                tokio::select! {
                    _ = receiver.recv() => {}
                    _ = tokio::time::sleep_until(deadline) => {
                        self.cancel_internal(Some("deadline exceeded".to_string()));
                    }
                }
            }
            None => {
                // Any receive outcome (message or lagged/closed) implies the
                // token was signalled or abandoned.
                let _ = receiver.recv().await;
            }
        }
    }
}

impl Default for CancellationToken {
    fn default() -> Self {
        Self::new()
    }
}
