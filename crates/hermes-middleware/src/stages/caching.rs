//! Result caching middleware.
//!
//! Caching is opt-in per command type. A cacheable command exposes an
//! explicit, canonical [`CacheableCommand::cache_key`]; keys are never
//! derived from structural hashes of a command's representation. Outputs
//! are stored as JSON values through a pluggable [`CacheStore`], so the
//! backend can be swapped without touching the dispatch path.
//!
//! A cache hit short-circuits the rest of the chain and annotates the
//! context with `cache.hit`.

use crate::middleware::{BoxFuture, Middleware, MiddlewareResult, Next};
use crate::priority::Priority;
use hermes_core::{
    CacheReason, Command, CommandContext, CommandEnvelope, HermesError, OutputEnvelope,
};
use parking_lot::Mutex;
use serde::de::DeserializeOwned;
use serde::Serialize;
use std::any::TypeId;
use std::collections::{HashMap, VecDeque};
use std::sync::Arc;

/// A command whose result may be served from cache.
///
/// The key must be canonical: equal commands produce equal keys, and the
/// key alone identifies the cached result.
pub trait CacheableCommand: Command {
    /// Returns the canonical cache key for this command.
    fn cache_key(&self) -> String;
}

/// A cache backend storing JSON-encoded results.
pub trait CacheStore: Send + Sync + 'static {
    /// Returns the cached value for a key, if present.
    fn get(&self, key: &str) -> Option<serde_json::Value>;

    /// Stores a value under a key.
    fn set(&self, key: String, value: serde_json::Value);

    /// Drops every cached value.
    fn clear(&self);
}

/// A bounded in-memory LRU cache.
///
/// When an insert exceeds the capacity, entries are evicted oldest-first
/// until the store is strictly below its bound again.
pub struct InMemoryCache {
    max_entries: usize,
    inner: Mutex<CacheInner>,
}

#[derive(Default)]
struct CacheInner {
    entries: HashMap<String, serde_json::Value>,
    // Recency order, least recently used at the front.
    order: VecDeque<String>,
}

impl InMemoryCache {
    /// Creates a cache retaining at most `max_entries` values.
    #[must_use]
    pub fn new(max_entries: usize) -> Self {
        Self {
            max_entries: max_entries.max(1),
            inner: Mutex::new(CacheInner::default()),
        }
    }

    /// Returns the number of cached entries.
    #[must_use]
    pub fn len(&self) -> usize {
        self.inner.lock().entries.len()
    }

    /// Returns `true` when the cache is empty.
    #[must_use]
    pub fn is_empty(&self) -> bool {
        self.inner.lock().entries.is_empty()
    }
}

impl CacheStore for InMemoryCache {
    fn get(&self, key: &str) -> Option<serde_json::Value> {
        let mut inner = self.inner.lock();
        let value = inner.entries.get(key).cloned()?;
        // Refresh recency.
        if let Some(position) = inner.order.iter().position(|k| k.as_str() == key) {
            inner.order.remove(position);
        }
        inner.order.push_back(key.to_string());
        Some(value)
    }

    fn set(&self, key: String, value: serde_json::Value) {
        let mut inner = self.inner.lock();
        if inner.entries.insert(key.clone(), value).is_some() {
            if let Some(position) = inner.order.iter().position(|k| *k == key) {
                inner.order.remove(position);
            }
        }
        inner.order.push_back(key);

        // Evict until strictly below the bound, not just once.
        while inner.entries.len() > self.max_entries {
            match inner.order.pop_front() {
                Some(evicted) => {
                    inner.entries.remove(&evicted);
                }
                None => break,
            }
        }
    }

    fn clear(&self) {
        let mut inner = self.inner.lock();
        inner.entries.clear();
        inner.order.clear();
    }
}

/// Per-command-type cache codec.
struct CacheCodec {
    key: Box<dyn Fn(&CommandEnvelope) -> Option<String> + Send + Sync>,
    encode: Box<dyn Fn(&OutputEnvelope) -> Result<serde_json::Value, HermesError> + Send + Sync>,
    decode: Box<dyn Fn(serde_json::Value) -> Result<OutputEnvelope, HermesError> + Send + Sync>,
}

/// Middleware serving registered command types from a cache.
///
/// Commands without a registered codec pass through untouched.
///
/// # Example
///
/// ```ignore
/// use hermes_middleware::stages::{CachingMiddleware, InMemoryCache};
///
/// let caching = CachingMiddleware::new(Arc::new(InMemoryCache::new(1024)))
///     .cacheable::<LookupUser>();
/// bus.add_middleware(Arc::new(caching));
/// ```
pub struct CachingMiddleware {
    store: Arc<dyn CacheStore>,
    codecs: HashMap<TypeId, CacheCodec>,
}

impl CachingMiddleware {
    /// Creates the middleware over a cache backend.
    #[must_use]
    pub fn new(store: Arc<dyn CacheStore>) -> Self {
        Self {
            store,
            codecs: HashMap::new(),
        }
    }

    /// Registers command type `C` as cacheable.
    #[must_use]
    pub fn cacheable<C>(mut self) -> Self
    where
        C: CacheableCommand,
        C::Output: Serialize + DeserializeOwned,
    {
        self.codecs.insert(
            TypeId::of::<C>(),
            CacheCodec {
                key: Box::new(|envelope| {
                    envelope.downcast_ref::<C>().map(CacheableCommand::cache_key)
                }),
                encode: Box::new(|output| {
                    let value = output.downcast_ref::<C::Output>().ok_or_else(|| {
                        HermesError::cache(CacheReason::Serialization(
                            "output type does not match the cached command".to_string(),
                        ))
                    })?;
                    serde_json::to_value(value).map_err(|e| {
                        HermesError::cache(CacheReason::Serialization(e.to_string()))
                    })
                }),
                decode: Box::new(|value| {
                    serde_json::from_value::<C::Output>(value)
                        .map(OutputEnvelope::new)
                        .map_err(|e| {
                            HermesError::cache(CacheReason::Serialization(e.to_string()))
                        })
                }),
            },
        );
        self
    }
}

impl Middleware for CachingMiddleware {
    fn name(&self) -> &'static str {
        "caching"
    }

    fn priority(&self) -> Priority {
        Priority::ENHANCEMENT
    }

    fn short_circuits(&self) -> bool {
        true
    }

    fn execute<'a>(
        &'a self,
        command: CommandEnvelope,
        ctx: &'a CommandContext,
        next: Next<'a>,
    ) -> BoxFuture<'a, MiddlewareResult> {
        Box::pin(async move {
            let Some(codec) = self.codecs.get(&command.type_id()) else {
                return next.run(command, ctx).await;
            };
            let Some(key) = (codec.key)(&command) else {
                return next.run(command, ctx).await;
            };

            if let Some(cached) = self.store.get(&key) {
                // A corrupt entry is not fatal: fall through to the
                // handler and overwrite it.
                match (codec.decode)(cached) {
                    Ok(output) => {
                        ctx.annotate("cache.hit", serde_json::json!(true));
                        return Ok(output);
                    }
                    Err(error) => {
                        tracing::debug!(
                            key = %key,
                            error = %error,
                            "dropping undecodable cache entry"
                        );
                    }
                }
            }

            ctx.annotate("cache.hit", serde_json::json!(false));
            let output = next.run(command, ctx).await?;
            self.store.set(key, (codec.encode)(&output)?);
            Ok(output)
        })
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::pipeline::Pipeline;
    use hermes_core::{CommandHandler, CommandMetadata};
    use std::sync::atomic::{AtomicU32, Ordering};

    #[derive(Clone)]
    struct LookupUser {
        user_id: String,
    }

    impl Command for LookupUser {
        type Output = String;
    }

    impl CacheableCommand for LookupUser {
        fn cache_key(&self) -> String {
            format!("user:{}", self.user_id)
        }
    }

    struct CountingHandler {
        invocations: Arc<AtomicU32>,
    }

    impl CommandHandler<LookupUser> for CountingHandler {
        async fn handle(
            &self,
            command: LookupUser,
            _ctx: &CommandContext,
        ) -> Result<String, HermesError> {
            self.invocations.fetch_add(1, Ordering::SeqCst);
            Ok(format!("profile-of-{}", command.user_id))
        }
    }

    fn cached_pipeline(
        store: Arc<dyn CacheStore>,
        invocations: Arc<AtomicU32>,
    ) -> Pipeline<LookupUser> {
        let pipeline = Pipeline::new(CountingHandler { invocations });
        pipeline.add_middleware(Arc::new(
            CachingMiddleware::new(store).cacheable::<LookupUser>(),
        ));
        pipeline
    }

    #[tokio::test]
    async fn test_second_lookup_is_served_from_cache() {
        let store = Arc::new(InMemoryCache::new(16));
        let invocations = Arc::new(AtomicU32::new(0));
        let pipeline = cached_pipeline(store, Arc::clone(&invocations));

        let command = LookupUser {
            user_id: "42".to_string(),
        };

        let ctx = CommandContext::new(CommandMetadata::new());
        let first = pipeline.execute(command.clone(), &ctx).await.unwrap();
        assert_eq!(ctx.annotation("cache.hit"), Some(serde_json::json!(false)));

        let ctx = CommandContext::new(CommandMetadata::new());
        let second = pipeline.execute(command, &ctx).await.unwrap();
        assert_eq!(ctx.annotation("cache.hit"), Some(serde_json::json!(true)));

        assert_eq!(first, second);
        assert_eq!(invocations.load(Ordering::SeqCst), 1, "handler ran once");
    }

    #[tokio::test]
    async fn test_distinct_keys_do_not_collide() {
        let store = Arc::new(InMemoryCache::new(16));
        let invocations = Arc::new(AtomicU32::new(0));
        let pipeline = cached_pipeline(store, Arc::clone(&invocations));

        for user_id in ["a", "b"] {
            let ctx = CommandContext::new(CommandMetadata::new());
            let output = pipeline
                .execute(
                    LookupUser {
                        user_id: user_id.to_string(),
                    },
                    &ctx,
                )
                .await
                .unwrap();
            assert_eq!(output, format!("profile-of-{user_id}"));
        }
        assert_eq!(invocations.load(Ordering::SeqCst), 2);
    }

    #[test]
    fn test_lru_evicts_until_below_capacity() {
        let cache = InMemoryCache::new(3);
        for i in 0..5 {
            cache.set(format!("k{i}"), serde_json::json!(i));
        }

        assert_eq!(cache.len(), 3);
        // The two oldest entries were evicted.
        assert!(cache.get("k0").is_none());
        assert!(cache.get("k1").is_none());
        assert!(cache.get("k4").is_some());
    }

    #[test]
    fn test_lru_refreshes_on_get() {
        let cache = InMemoryCache::new(2);
        cache.set("a".to_string(), serde_json::json!(1));
        cache.set("b".to_string(), serde_json::json!(2));

        // Touch "a" so "b" becomes the eviction candidate.
        assert!(cache.get("a").is_some());
        cache.set("c".to_string(), serde_json::json!(3));

        assert!(cache.get("a").is_some());
        assert!(cache.get("b").is_none());
    }

    #[test]
    fn test_clear() {
        let cache = InMemoryCache::new(4);
        cache.set("a".to_string(), serde_json::json!(1));
        cache.clear();
        assert!(cache.is_empty());
    }
}
