//! Rate limiting middleware.
//!
//! Enforces per-key dispatch rates with a token bucket: each key owns
//! `capacity` tokens, refilled continuously at `refill_per_sec`. A command
//! consumes one token; when the bucket is empty the command is rejected
//! with a rate-limit error carrying the time until the next token.
//!
//! Keys default to the metadata `user_id` (anonymous callers share one
//! bucket); global and custom extractors are available.

use crate::middleware::{BoxFuture, Middleware, MiddlewareResult, Next};
use crate::priority::Priority;
use hermes_core::{CommandContext, CommandEnvelope, HermesError};
use parking_lot::Mutex;
use std::collections::HashMap;
use std::sync::Arc;
use std::time::Duration;
use tokio::time::Instant;

/// How to derive the rate-limit key for an execution.
#[derive(Clone, Default)]
pub enum KeyExtractor {
    /// Use the metadata `user_id`; anonymous callers share one bucket.
    #[default]
    UserId,
    /// A single bucket for all commands.
    Global,
    /// Use a metadata tag value as the key.
    Tag(String),
    /// Use a custom function to extract the key.
    Custom(Arc<dyn Fn(&CommandContext) -> Option<String> + Send + Sync>),
}

impl std::fmt::Debug for KeyExtractor {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            Self::UserId => write!(f, "KeyExtractor::UserId"),
            Self::Global => write!(f, "KeyExtractor::Global"),
            Self::Tag(t) => f.debug_tuple("KeyExtractor::Tag").field(t).finish(),
            Self::Custom(_) => write!(f, "KeyExtractor::Custom(<fn>)"),
        }
    }
}

/// Configuration for the rate-limit middleware.
#[derive(Debug, Clone)]
pub struct RateLimitConfig {
    /// Bucket capacity (burst size) in tokens.
    pub capacity: f64,
    /// Continuous refill rate in tokens per second.
    pub refill_per_sec: f64,
    /// How keys are derived.
    pub key_extractor: KeyExtractor,
    /// Upper bound on tracked keys before stale buckets are pruned.
    pub max_tracked_keys: usize,
}

impl Default for RateLimitConfig {
    fn default() -> Self {
        Self {
            capacity: 100.0,
            refill_per_sec: 10.0,
            key_extractor: KeyExtractor::default(),
            max_tracked_keys: 10_000,
        }
    }
}

/// One caller's token bucket.
#[derive(Debug)]
struct TokenBucket {
    tokens: f64,
    last_refill: Instant,
}

impl TokenBucket {
    fn new(capacity: f64, now: Instant) -> Self {
        Self {
            tokens: capacity,
            last_refill: now,
        }
    }

    /// Refills from elapsed time, then tries to take one token.
    ///
    /// On rejection returns the wait until a full token is available.
    fn try_acquire(&mut self, config: &RateLimitConfig, now: Instant) -> Result<(), Duration> {
        let elapsed = now.saturating_duration_since(self.last_refill);
        self.tokens =
            (self.tokens + elapsed.as_secs_f64() * config.refill_per_sec).min(config.capacity);
        self.last_refill = now;

        if self.tokens >= 1.0 {
            self.tokens -= 1.0;
            Ok(())
        } else {
            let deficit = 1.0 - self.tokens;
            Err(Duration::from_secs_f64(deficit / config.refill_per_sec))
        }
    }
}

/// Token-bucket rate limiting middleware.
///
/// # Example
///
/// ```ignore
/// use hermes_middleware::stages::{KeyExtractor, RateLimitMiddleware};
///
/// let limiter = RateLimitMiddleware::builder()
///     .capacity(5.0)
///     .refill_per_sec(1.0)
///     .key_extractor(KeyExtractor::UserId)
///     .build();
/// bus.add_middleware(Arc::new(limiter));
/// ```
#[derive(Debug)]
pub struct RateLimitMiddleware {
    config: RateLimitConfig,
    store: Mutex<HashMap<String, TokenBucket>>,
}

impl RateLimitMiddleware {
    /// Creates a limiter with the given configuration.
    #[must_use]
    pub fn new(config: RateLimitConfig) -> Self {
        Self {
            config,
            store: Mutex::new(HashMap::new()),
        }
    }

    /// Creates a builder with default configuration.
    #[must_use]
    pub fn builder() -> RateLimitBuilder {
        RateLimitBuilder {
            config: RateLimitConfig::default(),
        }
    }

    fn key_for(&self, ctx: &CommandContext) -> String {
        match &self.config.key_extractor {
            KeyExtractor::UserId => ctx
                .metadata()
                .user_id()
                .unwrap_or("anonymous")
                .to_string(),
            KeyExtractor::Global => "global".to_string(),
            KeyExtractor::Tag(tag) => ctx
                .metadata()
                .tag(tag)
                .unwrap_or("untagged")
                .to_string(),
            KeyExtractor::Custom(f) => f(ctx).unwrap_or_else(|| "anonymous".to_string()),
        }
    }

    fn check(&self, key: &str) -> Result<(), Duration> {
        let now = Instant::now();
        let mut store = self.store.lock();

        if store.len() >= self.config.max_tracked_keys && !store.contains_key(key) {
            Self::prune(&mut store, &self.config, now);
        }

        store
            .entry(key.to_string())
            .or_insert_with(|| TokenBucket::new(self.config.capacity, now))
            .try_acquire(&self.config, now)
    }

    /// Evicts the stalest buckets until the store is strictly below its
    /// bound.
    fn prune(store: &mut HashMap<String, TokenBucket>, config: &RateLimitConfig, now: Instant) {
        // Buckets idle long enough to be full again carry no state worth
        // keeping.
        let capacity = config.capacity;
        let refill = config.refill_per_sec;
        store.retain(|_, bucket| {
            let refilled = bucket.tokens
                + now.saturating_duration_since(bucket.last_refill).as_secs_f64() * refill;
            refilled < capacity
        });

        while store.len() >= config.max_tracked_keys {
            let stalest = store
                .iter()
                .min_by_key(|(_, bucket)| bucket.last_refill)
                .map(|(key, _)| key.clone());
            match stalest {
                Some(key) => {
                    store.remove(&key);
                }
                None => break,
            }
        }
    }
}

impl Middleware for RateLimitMiddleware {
    fn name(&self) -> &'static str {
        "rate_limit"
    }

    fn priority(&self) -> Priority {
        Priority::TRAFFIC_CONTROL
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
            let key = self.key_for(ctx);
            match self.check(&key) {
                Ok(()) => next.run(command, ctx).await,
                Err(retry_after) => {
                    tracing::debug!(
                        key = %key,
                        command = command.command_type(),
                        retry_after_ms = retry_after.as_millis() as u64,
                        "rate limit exceeded"
                    );
                    Err(HermesError::rate_limited(
                        format!("rate limit exceeded for '{key}'"),
                        Some(retry_after),
                    ))
                }
            }
        })
    }
}

/// Builder for [`RateLimitMiddleware`].
#[derive(Debug)]
pub struct RateLimitBuilder {
    config: RateLimitConfig,
}

impl RateLimitBuilder {
    /// Sets the bucket capacity (burst size).
    #[must_use]
    pub fn capacity(mut self, capacity: f64) -> Self {
        self.config.capacity = capacity;
        self
    }

    /// Sets the refill rate in tokens per second.
    #[must_use]
    pub fn refill_per_sec(mut self, refill: f64) -> Self {
        self.config.refill_per_sec = refill;
        self
    }

    /// Sets the key extractor.
    #[must_use]
    pub fn key_extractor(mut self, extractor: KeyExtractor) -> Self {
        self.config.key_extractor = extractor;
        self
    }

    /// Sets the tracked-key bound.
    #[must_use]
    pub fn max_tracked_keys(mut self, max: usize) -> Self {
        self.config.max_tracked_keys = max;
        self
    }

    /// Builds the middleware.
    #[must_use]
    pub fn build(self) -> RateLimitMiddleware {
        RateLimitMiddleware::new(self.config)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::pipeline::Pipeline;
    use hermes_core::{Command, CommandHandler, CommandMetadata};

    struct TestCommand;

    impl Command for TestCommand {
        type Output = ();
    }

    struct NoopHandler;

    impl CommandHandler<TestCommand> for NoopHandler {
        async fn handle(
            &self,
            _command: TestCommand,
            _ctx: &CommandContext,
        ) -> Result<(), HermesError> {
            Ok(())
        }
    }

    fn limited_pipeline(capacity: f64, refill: f64) -> Pipeline<TestCommand> {
        let pipeline = Pipeline::new(NoopHandler);
        pipeline.add_middleware(Arc::new(
            RateLimitMiddleware::builder()
                .capacity(capacity)
                .refill_per_sec(refill)
                .key_extractor(KeyExtractor::UserId)
                .build(),
        ));
        pipeline
    }

    fn user_ctx(user: &str) -> CommandContext {
        CommandContext::new(CommandMetadata::new().with_user_id(user))
    }

    #[tokio::test]
    async fn test_burst_within_capacity_passes() {
        let pipeline = limited_pipeline(5.0, 1.0);

        for _ in 0..5 {
            let ctx = user_ctx("user1");
            pipeline.execute(TestCommand, &ctx).await.unwrap();
        }
    }

    #[tokio::test]
    async fn test_sixth_call_is_rejected_and_other_user_passes() {
        let pipeline = limited_pipeline(5.0, 1.0);

        for _ in 0..5 {
            let ctx = user_ctx("user1");
            pipeline.execute(TestCommand, &ctx).await.unwrap();
        }

        let ctx = user_ctx("user1");
        let err = pipeline.execute(TestCommand, &ctx).await.unwrap_err();
        match err {
            HermesError::RateLimitExceeded { retry_after, .. } => {
                assert!(retry_after.is_some());
            }
            other => panic!("expected RateLimitExceeded, got {other:?}"),
        }

        // A different key owns a fresh bucket.
        let ctx = user_ctx("user2");
        pipeline.execute(TestCommand, &ctx).await.unwrap();
    }

    #[tokio::test(start_paused = true)]
    async fn test_refill_restores_capacity() {
        let pipeline = limited_pipeline(1.0, 1.0);

        let ctx = user_ctx("user1");
        pipeline.execute(TestCommand, &ctx).await.unwrap();

        let ctx = user_ctx("user1");
        assert!(pipeline.execute(TestCommand, &ctx).await.is_err());

        tokio::time::sleep(Duration::from_millis(1100)).await;

        let ctx = user_ctx("user1");
        pipeline.execute(TestCommand, &ctx).await.unwrap();
    }

    #[tokio::test]
    async fn test_global_extractor_shares_one_bucket() {
        let pipeline = Pipeline::new(NoopHandler);
        pipeline.add_middleware(Arc::new(
            RateLimitMiddleware::builder()
                .capacity(1.0)
                .refill_per_sec(0.001)
                .key_extractor(KeyExtractor::Global)
                .build(),
        ));

        let ctx = user_ctx("a");
        pipeline.execute(TestCommand, &ctx).await.unwrap();

        let ctx = user_ctx("b");
        assert!(pipeline.execute(TestCommand, &ctx).await.is_err());
    }
}
