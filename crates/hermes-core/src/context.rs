//! Per-execution command context.
//!
//! The [`CommandContext`] is the mutable container bound to exactly one
//! execution. It carries the immutable [`CommandMetadata`], a typed keyed
//! store, a string-keyed annotation map for ad-hoc attributes, the
//! execution's [`CancellationToken`], and an optional observer registry.
//!
//! The typed store is keyed by [`ContextKey`] implementations: opaque
//! type-level identities that each carry their value type. String keys are a
//! deliberately separate channel reserved for free-form annotations
//! (compression stats, encryption flags, auditing hints).
//!
//! A single mutex protects the keyed store and annotations; every operation
//! is synchronous and short, and cooperating middleware within the same
//! execution may access the context concurrently.

use crate::cancellation::CancellationToken;
use crate::metadata::CommandMetadata;
use crate::observer::ObserverRegistry;
use parking_lot::Mutex;
use std::any::{Any, TypeId};
use std::collections::HashMap;

/// A type-level key into the context's typed store.
///
/// Each key type is a distinct identity; its associated `Value` fixes the
/// type stored under it. Keys are usually zero-sized marker types.
///
/// # Example
///
/// ```
/// use hermes_core::{CommandContext, CommandMetadata, ContextKey};
///
/// struct AttemptCount;
///
/// impl ContextKey for AttemptCount {
///     type Value = u32;
/// }
///
/// let ctx = CommandContext::new(CommandMetadata::new());
/// ctx.set::<AttemptCount>(2);
/// assert_eq!(ctx.get::<AttemptCount>(), Some(2));
/// ```
pub trait ContextKey: 'static {
    /// The value type stored under this key.
    type Value: Clone + Send + Sync + 'static;
}

/// Interior state guarded by the context mutex.
#[derive(Default)]
struct ContextState {
    /// Typed values keyed by the key type's identity.
    values: HashMap<TypeId, Box<dyn Any + Send + Sync>>,

    /// Free-form string-keyed annotations.
    annotations: HashMap<String, serde_json::Value>,
}

/// Per-execution context shared by middleware and the handler.
///
/// Created at dispatch entry and discarded when the execution ends.
///
/// # Example
///
/// ```
/// use hermes_core::{CommandContext, CommandMetadata};
///
/// let ctx = CommandContext::new(CommandMetadata::new().with_user_id("u-1"));
/// ctx.annotate("compression.ratio", serde_json::json!(0.42));
///
/// assert_eq!(ctx.metadata().user_id(), Some("u-1"));
/// assert!(ctx.annotation("compression.ratio").is_some());
/// ```
pub struct CommandContext {
    /// Immutable execution identity.
    metadata: CommandMetadata,

    /// Typed store and annotations.
    state: Mutex<ContextState>,

    /// The execution-scoped cancellation view.
    cancellation: CancellationToken,

    /// Optional observation fan-out.
    observers: Mutex<Option<ObserverRegistry>>,
}

impl CommandContext {
    /// Creates a context for one execution with no deadline.
    #[must_use]
    pub fn new(metadata: CommandMetadata) -> Self {
        Self::with_cancellation(metadata, CancellationToken::new())
    }

    /// Creates a context bound to an existing cancellation token.
    #[must_use]
    pub fn with_cancellation(metadata: CommandMetadata, cancellation: CancellationToken) -> Self {
        Self {
            metadata,
            state: Mutex::new(ContextState::default()),
            cancellation,
            observers: Mutex::new(None),
        }
    }

    /// Returns the execution metadata.
    #[must_use]
    pub const fn metadata(&self) -> &CommandMetadata {
        &self.metadata
    }

    /// Returns the execution's cancellation token.
    #[must_use]
    pub const fn cancellation(&self) -> &CancellationToken {
        &self.cancellation
    }

    /// Returns the typed value stored under key `K`, if present.
    #[must_use]
    pub fn get<K: ContextKey>(&self) -> Option<K::Value> {
        self.state
            .lock()
            .values
            .get(&TypeId::of::<K>())
            .and_then(|v| v.downcast_ref::<K::Value>())
            .cloned()
    }

    /// Stores a typed value under key `K`, replacing any previous value.
    pub fn set<K: ContextKey>(&self, value: K::Value) {
        self.state
            .lock()
            .values
            .insert(TypeId::of::<K>(), Box::new(value));
    }

    /// Removes and returns the typed value stored under key `K`.
    pub fn remove<K: ContextKey>(&self) -> Option<K::Value> {
        self.state
            .lock()
            .values
            .remove(&TypeId::of::<K>())
            .and_then(|v| v.downcast::<K::Value>().ok())
            .map(|b| *b)
    }

    /// Mutates the value stored under key `K` in place, inserting the
    /// default when absent.
    ///
    /// The whole update runs under the context lock, so concurrent updates
    /// from cooperating middleware never lose writes.
    pub fn update<K>(&self, f: impl FnOnce(&mut K::Value))
    where
        K: ContextKey,
        K::Value: Default,
    {
        let mut state = self.state.lock();
        let entry = state
            .values
            .entry(TypeId::of::<K>())
            .or_insert_with(|| Box::new(K::Value::default()));
        if let Some(value) = entry.downcast_mut::<K::Value>() {
            f(value);
        }
    }

    /// Sets a string-keyed annotation.
    pub fn annotate(&self, name: impl Into<String>, value: serde_json::Value) {
        self.state.lock().annotations.insert(name.into(), value);
    }

    /// Returns a string-keyed annotation, if present.
    #[must_use]
    pub fn annotation(&self, name: &str) -> Option<serde_json::Value> {
        self.state.lock().annotations.get(name).cloned()
    }

    /// Removes a string-keyed annotation.
    pub fn remove_annotation(&self, name: &str) -> Option<serde_json::Value> {
        self.state.lock().annotations.remove(name)
    }

    /// Returns the observer registry, if one is attached.
    #[must_use]
    pub fn observers(&self) -> Option<ObserverRegistry> {
        self.observers.lock().clone()
    }

    /// Attaches an observer registry to this execution.
    pub fn set_observers(&self, registry: ObserverRegistry) {
        *self.observers.lock() = Some(registry);
    }

    /// Produces a shallow diagnostic snapshot of the context.
    #[must_use]
    pub fn snapshot(&self) -> ContextSnapshot {
        let state = self.state.lock();
        ContextSnapshot {
            metadata: self.metadata.clone(),
            annotations: state.annotations.clone(),
            typed_entries: state.values.len(),
            cancelled: self.cancellation.is_cancelled(),
        }
    }
}

impl std::fmt::Debug for CommandContext {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        let state = self.state.lock();
        f.debug_struct("CommandContext")
            .field("execution_id", &self.metadata.id())
            .field("typed_entries", &state.values.len())
            .field("annotations", &state.annotations.len())
            .field("cancelled", &self.cancellation.is_cancelled())
            .finish()
    }
}

/// A shallow diagnostic copy of a context.
#[derive(Debug, Clone, serde::Serialize)]
pub struct ContextSnapshot {
    /// The execution metadata.
    pub metadata: CommandMetadata,
    /// All string-keyed annotations at snapshot time.
    pub annotations: HashMap<String, serde_json::Value>,
    /// Number of typed entries (values themselves are opaque).
    pub typed_entries: usize,
    /// Whether the execution was already cancelled.
    pub cancelled: bool,
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::sync::Arc;

    struct RetryBudget;

    impl ContextKey for RetryBudget {
        type Value = u32;
    }

    struct Trace;

    impl ContextKey for Trace {
        type Value = Vec<String>;
    }

    fn test_context() -> CommandContext {
        CommandContext::new(CommandMetadata::new())
    }

    #[test]
    fn test_typed_store_roundtrip() {
        let ctx = test_context();
        assert_eq!(ctx.get::<RetryBudget>(), None);

        ctx.set::<RetryBudget>(3);
        assert_eq!(ctx.get::<RetryBudget>(), Some(3));

        assert_eq!(ctx.remove::<RetryBudget>(), Some(3));
        assert_eq!(ctx.get::<RetryBudget>(), None);
    }

    #[test]
    fn test_distinct_keys_do_not_collide() {
        struct A;
        struct B;
        impl ContextKey for A {
            type Value = u32;
        }
        impl ContextKey for B {
            type Value = u32;
        }

        let ctx = test_context();
        ctx.set::<A>(1);
        ctx.set::<B>(2);

        assert_eq!(ctx.get::<A>(), Some(1));
        assert_eq!(ctx.get::<B>(), Some(2));
    }

    #[test]
    fn test_update_inserts_default() {
        let ctx = test_context();
        ctx.update::<Trace>(|t| t.push("auth".to_string()));
        ctx.update::<Trace>(|t| t.push("validate".to_string()));

        assert_eq!(
            ctx.get::<Trace>(),
            Some(vec!["auth".to_string(), "validate".to_string()])
        );
    }

    #[test]
    fn test_annotations() {
        let ctx = test_context();
        ctx.annotate("encryption.applied", serde_json::json!(true));

        assert_eq!(
            ctx.annotation("encryption.applied"),
            Some(serde_json::json!(true))
        );
        assert_eq!(ctx.annotation("missing"), None);
        assert_eq!(
            ctx.remove_annotation("encryption.applied"),
            Some(serde_json::json!(true))
        );
    }

    #[test]
    fn test_snapshot() {
        let ctx = CommandContext::new(CommandMetadata::new().with_correlation_id("corr-7"));
        ctx.set::<RetryBudget>(1);
        ctx.annotate("audit", serde_json::json!("reviewed"));

        let snapshot = ctx.snapshot();
        assert_eq!(snapshot.metadata.correlation_id(), Some("corr-7"));
        assert_eq!(snapshot.typed_entries, 1);
        assert_eq!(snapshot.annotations.len(), 1);
        assert!(!snapshot.cancelled);
    }

    #[test]
    fn test_concurrent_access() {
        let ctx = Arc::new(test_context());
        let mut handles = Vec::new();

        for i in 0..8 {
            let ctx = Arc::clone(&ctx);
            handles.push(std::thread::spawn(move || {
                ctx.update::<Trace>(|t| t.push(format!("writer-{i}")));
                ctx.annotate(format!("key-{i}"), serde_json::json!(i));
            }));
        }

        for handle in handles {
            handle.join().expect("thread should not panic");
        }

        assert_eq!(ctx.get::<Trace>().unwrap().len(), 8);
        assert_eq!(ctx.snapshot().annotations.len(), 8);
    }

    #[test]
    fn test_cancellation_reflected_in_snapshot() {
        let ctx = test_context();
        ctx.cancellation().cancel();
        assert!(ctx.snapshot().cancelled);
    }
}
