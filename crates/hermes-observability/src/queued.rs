//! Bounded observer offloading.
//!
//! A slow observer must never block dispatch. The [`QueuedObserver`] adapts
//! any [`EventSink`] into an [`Observer`] whose callbacks only enqueue an
//! owned [`ObserverEvent`] onto a bounded channel; a spawned task drains the
//! channel and feeds the sink. Events that do not fit are dropped and
//! counted rather than applying back-pressure to the pipeline.

use hermes_core::{CommandMetadata, ErrorEnvelope, HermesError, Observer};
use std::sync::atomic::{AtomicU64, Ordering};
use std::sync::Arc;
use std::time::Duration;
use tokio::sync::mpsc;

/// An owned, queueable observation event.
#[derive(Debug, Clone)]
pub enum ObserverEvent {
    /// A pipeline began executing a command.
    PipelineStarted {
        /// Execution metadata.
        metadata: CommandMetadata,
        /// Command type name.
        command: String,
    },
    /// A pipeline completed successfully.
    PipelineFinished {
        /// Execution metadata.
        metadata: CommandMetadata,
        /// Command type name.
        command: String,
        /// Wall-clock execution time.
        elapsed: Duration,
    },
    /// A pipeline failed.
    PipelineFailed {
        /// Execution metadata.
        metadata: CommandMetadata,
        /// Command type name.
        command: String,
        /// Serializable error envelope.
        error: ErrorEnvelope,
        /// Wall-clock execution time.
        elapsed: Duration,
    },
    /// A middleware began its pre-processing side.
    MiddlewareStarted {
        /// Execution metadata.
        metadata: CommandMetadata,
        /// Middleware name.
        middleware: String,
    },
    /// A middleware returned successfully.
    MiddlewareFinished {
        /// Execution metadata.
        metadata: CommandMetadata,
        /// Middleware name.
        middleware: String,
    },
    /// A middleware returned an error.
    MiddlewareFailed {
        /// Execution metadata.
        metadata: CommandMetadata,
        /// Middleware name.
        middleware: String,
        /// Serializable error envelope.
        error: ErrorEnvelope,
    },
    /// The handler was invoked.
    HandlerStarted {
        /// Execution metadata.
        metadata: CommandMetadata,
        /// Command type name.
        command: String,
    },
    /// The handler produced an output.
    HandlerFinished {
        /// Execution metadata.
        metadata: CommandMetadata,
        /// Command type name.
        command: String,
        /// Handler execution time.
        elapsed: Duration,
    },
    /// The handler failed.
    HandlerFailed {
        /// Execution metadata.
        metadata: CommandMetadata,
        /// Command type name.
        command: String,
        /// Serializable error envelope.
        error: ErrorEnvelope,
        /// Handler execution time.
        elapsed: Duration,
    },
    /// A custom named event.
    Custom {
        /// Execution metadata.
        metadata: CommandMetadata,
        /// Event name.
        name: String,
        /// Event payload.
        payload: serde_json::Value,
    },
}

/// Consumer of queued observation events.
pub trait EventSink: Send + Sync + 'static {
    /// Consumes one event. May be arbitrarily slow; only the queue task
    /// waits on it.
    fn consume(&self, event: ObserverEvent);
}

impl<F> EventSink for F
where
    F: Fn(ObserverEvent) + Send + Sync + 'static,
{
    fn consume(&self, event: ObserverEvent) {
        self(event);
    }
}

/// An [`Observer`] that forwards events to an [`EventSink`] through a
/// bounded queue.
///
/// Must be constructed inside a tokio runtime (the drain task is spawned on
/// construction).
///
/// # Example
///
/// ```ignore
/// use hermes_observability::{ObserverEvent, QueuedObserver};
///
/// let observer = QueuedObserver::new(
///     std::sync::Arc::new(|event: ObserverEvent| {
///         // ship to the slow sink
///     }),
///     1024,
/// );
/// ```
pub struct QueuedObserver {
    tx: mpsc::Sender<ObserverEvent>,
    dropped: Arc<AtomicU64>,
}

impl QueuedObserver {
    /// Creates the observer and spawns its drain task.
    #[must_use]
    pub fn new(sink: Arc<dyn EventSink>, capacity: usize) -> Self {
        let (tx, mut rx) = mpsc::channel::<ObserverEvent>(capacity.max(1));
        tokio::spawn(async move {
            while let Some(event) = rx.recv().await {
                sink.consume(event);
            }
        });
        Self {
            tx,
            dropped: Arc::new(AtomicU64::new(0)),
        }
    }

    /// Returns how many events were dropped because the queue was full.
    #[must_use]
    pub fn dropped_events(&self) -> u64 {
        self.dropped.load(Ordering::Relaxed)
    }

    fn enqueue(&self, event: ObserverEvent) {
        if self.tx.try_send(event).is_err() {
            self.dropped.fetch_add(1, Ordering::Relaxed);
            tracing::trace!("observer queue full, event dropped");
        }
    }

    fn envelope(metadata: &CommandMetadata, error: &HermesError) -> ErrorEnvelope {
        error.to_envelope(Some(&metadata.id().to_string()))
    }
}

impl Observer for QueuedObserver {
    fn pipeline_started(&self, metadata: &CommandMetadata, command: &str) {
        self.enqueue(ObserverEvent::PipelineStarted {
            metadata: metadata.clone(),
            command: command.to_string(),
        });
    }

    fn pipeline_finished(&self, metadata: &CommandMetadata, command: &str, elapsed: Duration) {
        self.enqueue(ObserverEvent::PipelineFinished {
            metadata: metadata.clone(),
            command: command.to_string(),
            elapsed,
        });
    }

    fn pipeline_failed(
        &self,
        metadata: &CommandMetadata,
        command: &str,
        error: &HermesError,
        elapsed: Duration,
    ) {
        self.enqueue(ObserverEvent::PipelineFailed {
            metadata: metadata.clone(),
            command: command.to_string(),
            error: Self::envelope(metadata, error),
            elapsed,
        });
    }

    fn middleware_started(&self, metadata: &CommandMetadata, middleware: &str) {
        self.enqueue(ObserverEvent::MiddlewareStarted {
            metadata: metadata.clone(),
            middleware: middleware.to_string(),
        });
    }

    fn middleware_finished(&self, metadata: &CommandMetadata, middleware: &str) {
        self.enqueue(ObserverEvent::MiddlewareFinished {
            metadata: metadata.clone(),
            middleware: middleware.to_string(),
        });
    }

    fn middleware_failed(&self, metadata: &CommandMetadata, middleware: &str, error: &HermesError) {
        self.enqueue(ObserverEvent::MiddlewareFailed {
            metadata: metadata.clone(),
            middleware: middleware.to_string(),
            error: Self::envelope(metadata, error),
        });
    }

    fn handler_started(&self, metadata: &CommandMetadata, command: &str) {
        self.enqueue(ObserverEvent::HandlerStarted {
            metadata: metadata.clone(),
            command: command.to_string(),
        });
    }

    fn handler_finished(&self, metadata: &CommandMetadata, command: &str, elapsed: Duration) {
        self.enqueue(ObserverEvent::HandlerFinished {
            metadata: metadata.clone(),
            command: command.to_string(),
            elapsed,
        });
    }

    fn handler_failed(
        &self,
        metadata: &CommandMetadata,
        command: &str,
        error: &HermesError,
        elapsed: Duration,
    ) {
        self.enqueue(ObserverEvent::HandlerFailed {
            metadata: metadata.clone(),
            command: command.to_string(),
            error: Self::envelope(metadata, error),
            elapsed,
        });
    }

    fn custom_event(&self, metadata: &CommandMetadata, name: &str, payload: &serde_json::Value) {
        self.enqueue(ObserverEvent::Custom {
            metadata: metadata.clone(),
            name: name.to_string(),
            payload: payload.clone(),
        });
    }
}
