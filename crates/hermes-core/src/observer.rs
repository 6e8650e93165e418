//! Execution observation fan-out.
//!
//! An [`Observer`] receives lifecycle callbacks for pipeline, middleware and
//! handler phases plus free-form named events. The [`ObserverRegistry`] is a
//! value-semantic collection of observers carried by the execution context;
//! cloning it is cheap (the observer list is shared).
//!
//! Callbacks are fire-and-forget from the pipeline's perspective and are
//! delivered sequentially, in emission order, for a single execution. A slow
//! observer must not block dispatch: offload expensive sinks onto a bounded
//! queue (see the observability crate's queued observer).

use crate::error::HermesError;
use crate::metadata::CommandMetadata;
use std::sync::Arc;
use std::time::Duration;

/// A side-channel consumer of execution lifecycle events.
///
/// All methods have empty default bodies; implementors override the ones
/// they care about.
#[allow(unused_variables)]
pub trait Observer: Send + Sync + 'static {
    /// A pipeline began executing a command.
    fn pipeline_started(&self, metadata: &CommandMetadata, command: &str) {}

    /// A pipeline completed successfully.
    fn pipeline_finished(&self, metadata: &CommandMetadata, command: &str, elapsed: Duration) {}

    /// A pipeline failed.
    fn pipeline_failed(
        &self,
        metadata: &CommandMetadata,
        command: &str,
        error: &HermesError,
        elapsed: Duration,
    ) {
    }

    /// A middleware began its pre-processing side.
    fn middleware_started(&self, metadata: &CommandMetadata, middleware: &str) {}

    /// A middleware returned successfully.
    fn middleware_finished(&self, metadata: &CommandMetadata, middleware: &str) {}

    /// A middleware returned an error.
    fn middleware_failed(&self, metadata: &CommandMetadata, middleware: &str, error: &HermesError) {
    }

    /// The handler was invoked.
    fn handler_started(&self, metadata: &CommandMetadata, command: &str) {}

    /// The handler produced an output.
    fn handler_finished(&self, metadata: &CommandMetadata, command: &str, elapsed: Duration) {}

    /// The handler failed.
    fn handler_failed(
        &self,
        metadata: &CommandMetadata,
        command: &str,
        error: &HermesError,
        elapsed: Duration,
    ) {
    }

    /// A custom named event was emitted by middleware or a handler.
    fn custom_event(&self, metadata: &CommandMetadata, name: &str, payload: &serde_json::Value) {}
}

/// A value-semantic, copyable collection of observers.
///
/// # Example
///
/// ```
/// use hermes_core::{Observer, ObserverRegistry};
/// use std::sync::Arc;
///
/// struct Noop;
/// impl Observer for Noop {}
///
/// let registry = ObserverRegistry::new().with_observer(Arc::new(Noop));
/// assert_eq!(registry.len(), 1);
/// ```
#[derive(Clone, Default)]
pub struct ObserverRegistry {
    observers: Arc<Vec<Arc<dyn Observer>>>,
}

impl ObserverRegistry {
    /// Creates an empty registry.
    #[must_use]
    pub fn new() -> Self {
        Self::default()
    }

    /// Returns a registry with an additional observer.
    ///
    /// Registries are value-semantic; this clones the observer list rather
    /// than mutating shared state.
    #[must_use]
    pub fn with_observer(&self, observer: Arc<dyn Observer>) -> Self {
        let mut observers: Vec<Arc<dyn Observer>> = self.observers.as_ref().clone();
        observers.push(observer);
        Self {
            observers: Arc::new(observers),
        }
    }

    /// Returns the number of registered observers.
    #[must_use]
    pub fn len(&self) -> usize {
        self.observers.len()
    }

    /// Returns `true` if no observers are registered.
    #[must_use]
    pub fn is_empty(&self) -> bool {
        self.observers.is_empty()
    }

    /// Delivers an event to every observer, sequentially, in registration
    /// order.
    pub fn each(&self, mut f: impl FnMut(&dyn Observer)) {
        for observer in self.observers.iter() {
            f(observer.as_ref());
        }
    }

    /// Emits a custom named event to every observer.
    pub fn emit_custom(&self, metadata: &CommandMetadata, name: &str, payload: &serde_json::Value) {
        self.each(|o| o.custom_event(metadata, name, payload));
    }
}

impl std::fmt::Debug for ObserverRegistry {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("ObserverRegistry")
            .field("observer_count", &self.observers.len())
            .finish()
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use parking_lot::Mutex;

    #[derive(Default)]
    struct EventLog {
        events: Mutex<Vec<String>>,
    }

    impl Observer for EventLog {
        fn pipeline_started(&self, _metadata: &CommandMetadata, command: &str) {
            self.events.lock().push(format!("started:{command}"));
        }

        fn custom_event(
            &self,
            _metadata: &CommandMetadata,
            name: &str,
            payload: &serde_json::Value,
        ) {
            self.events.lock().push(format!("{name}={payload}"));
        }
    }

    #[test]
    fn test_registry_is_value_semantic() {
        let log = Arc::new(EventLog::default());
        let registry = ObserverRegistry::new();
        let extended = registry.with_observer(log);

        assert!(registry.is_empty());
        assert_eq!(extended.len(), 1);
    }

    #[test]
    fn test_events_delivered_in_order() {
        let log = Arc::new(EventLog::default());
        let registry = ObserverRegistry::new().with_observer(log.clone());
        let metadata = CommandMetadata::new();

        registry.each(|o| o.pipeline_started(&metadata, "Ping"));
        registry.emit_custom(&metadata, "cache", &serde_json::json!("hit"));

        let events = log.events.lock();
        assert_eq!(events.as_slice(), ["started:Ping", "cache=\"hit\""]);
    }
}
