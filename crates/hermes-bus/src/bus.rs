//! The command bus.
//!
//! [`CommandBus`] routes each command to the pipeline registered for its
//! type, applying global middleware, optional back-pressure, an optional
//! circuit breaker and optional retries along the way:
//!
//! 1. Resolve the pipeline; fail with `HandlerNotFound` when absent.
//! 2. Acquire a gate permit (released on every exit path).
//! 3. Ask the breaker for admission; an open breaker fails fast.
//! 4. Execute the pipeline; report the outcome to the breaker.
//! 5. Retry per policy — never after a cancellation.
//! 6. Record the execution.

use crate::gate::{ConcurrencyGate, GatePermit, GateStats};
use crate::options::DispatchOptions;
use crate::registry::PipelineRegistry;
use chrono::{DateTime, Utc};
use hermes_core::{
    CancellationToken, Command, CommandContext, CommandEnvelope, CommandHandler, CommandMetadata,
    HermesError, HermesResult, Observer, ObserverRegistry, OutputEnvelope,
};
use hermes_middleware::{DynPipeline, Middleware, MiddlewareTrace, Pipeline, PipelineSnapshot};
use hermes_observability::{ExecutionRecord, ExecutionRecorder, RecorderConfig};
use hermes_resilience::{CircuitBreaker, CircuitBreakerConfig, RetryPolicy};
use parking_lot::RwLock;
use std::sync::Arc;
use std::time::Duration;

/// An in-process, type-indexed command bus.
///
/// # Example
///
/// ```rust,ignore
/// use hermes_bus::CommandBus;
///
/// let bus = CommandBus::builder().build();
/// bus.register::<AddNumbers, _>(AddNumbersHandler)?;
///
/// let sum = bus.send(AddNumbers { a: 5, b: 3 }).await?;
/// assert_eq!(sum, 8);
/// ```
pub struct CommandBus {
    registry: PipelineRegistry,
    global_middleware: RwLock<Vec<Arc<dyn Middleware>>>,
    gate: Option<ConcurrencyGate>,
    options: DispatchOptions,
    breaker: Option<Arc<CircuitBreaker>>,
    recorder: Option<Arc<ExecutionRecorder>>,
    observers: ObserverRegistry,
}

impl CommandBus {
    /// Creates a bus with the standard dispatch options.
    #[must_use]
    pub fn new() -> Self {
        Self::builder().build()
    }

    /// Creates a bus builder.
    #[must_use]
    pub fn builder() -> CommandBusBuilder {
        CommandBusBuilder::new()
    }

    /// Registers a handler for command type `C`.
    ///
    /// # Errors
    ///
    /// Fails with [`HermesError::AlreadyRegistered`] when a handler for `C`
    /// is already bound.
    pub fn register<C, H>(&self, handler: H) -> HermesResult<()>
    where
        C: Command,
        H: CommandHandler<C>,
    {
        let pipeline = Pipeline::<C>::new(handler);

        // Hold the global list across the insert so a concurrent
        // add_middleware can neither miss this pipeline nor double-apply.
        let global = self.global_middleware.read();
        for middleware in global.iter() {
            pipeline.add_middleware(Arc::clone(middleware));
        }
        self.registry.insert::<C>(Arc::new(pipeline))
    }

    /// Registers a global middleware, applied to every pipeline — including
    /// those already registered.
    pub fn add_middleware(&self, middleware: Arc<dyn Middleware>) {
        let mut global = self.global_middleware.write();
        global.push(Arc::clone(&middleware));
        self.registry
            .for_each(|pipeline| pipeline.add_middleware(Arc::clone(&middleware)));
    }

    /// Dispatches a command with fresh metadata.
    pub async fn send<C: Command>(&self, command: C) -> Result<C::Output, HermesError> {
        self.send_with_metadata(command, CommandMetadata::new())
            .await
    }

    /// Dispatches a command with caller-supplied metadata.
    pub async fn send_with_metadata<C: Command>(
        &self,
        command: C,
        metadata: CommandMetadata,
    ) -> Result<C::Output, HermesError> {
        let pipeline = self.resolve::<C>()?;
        let ctx = self.execution_context(metadata);
        let started_at = Utc::now();

        let permit = match self.admit(&ctx).await {
            Ok(permit) => permit,
            Err(error) => {
                self.record_outcome(&ctx, C::name(), started_at, Some(&error), 1);
                return Err(error);
            }
        };

        let result = self
            .guarded_attempt(&pipeline, CommandEnvelope::new(command), &ctx)
            .await
            .and_then(OutputEnvelope::downcast::<C::Output>);

        drop(permit);
        self.record_outcome(&ctx, C::name(), started_at, result.as_ref().err(), 1);
        result
    }

    /// Dispatches a command under a retry policy.
    ///
    /// The command is re-submitted from its original value on each attempt,
    /// so the type must be `Clone`. The gate permit spans all attempts.
    /// Cancellation aborts the loop immediately: a cancelled error is never
    /// retried, and the sleep between attempts observes the token.
    pub async fn send_with_policy<C: Command + Clone>(
        &self,
        command: C,
        metadata: CommandMetadata,
        policy: &RetryPolicy,
    ) -> Result<C::Output, HermesError> {
        let pipeline = self.resolve::<C>()?;
        let ctx = self.execution_context(metadata);
        let started_at = Utc::now();

        let permit = match self.admit(&ctx).await {
            Ok(permit) => permit,
            Err(error) => {
                self.record_outcome(&ctx, C::name(), started_at, Some(&error), 1);
                return Err(error);
            }
        };

        let mut attempt: u32 = 1;
        let result = loop {
            let attempt_result = self
                .guarded_attempt(&pipeline, CommandEnvelope::new(command.clone()), &ctx)
                .await
                .and_then(OutputEnvelope::downcast::<C::Output>);

            match attempt_result {
                Ok(output) => break Ok(output),
                Err(error) => {
                    if !policy.should_retry(&error, attempt) {
                        break Err(error);
                    }

                    let delay = policy.delay_for(attempt);
                    tracing::debug!(
                        command = C::name(),
                        attempt,
                        delay_ms = delay.as_millis() as u64,
                        error_code = error.code(),
                        "retrying command"
                    );
                    attempt += 1;

                    tokio::select! {
                        _ = tokio::time::sleep(delay) => {}
                        _ = ctx.cancellation().cancelled() => {
                            break Err(ctx.cancellation().to_error());
                        }
                    }
                }
            }
        };

        drop(permit);
        self.record_outcome(&ctx, C::name(), started_at, result.as_ref().err(), attempt);
        result
    }

    /// Returns the circuit breaker, when configured.
    #[must_use]
    pub fn breaker(&self) -> Option<&CircuitBreaker> {
        self.breaker.as_deref()
    }

    /// Returns the execution recorder, when configured.
    #[must_use]
    pub fn recorder(&self) -> Option<&ExecutionRecorder> {
        self.recorder.as_deref()
    }

    /// Returns the back-pressure gate statistics, when a gate is configured.
    #[must_use]
    pub fn gate_stats(&self) -> Option<GateStats> {
        self.gate.as_ref().map(ConcurrencyGate::stats)
    }

    /// Describes every registered pipeline, sorted by command name.
    #[must_use]
    pub fn describe(&self) -> Vec<PipelineSnapshot> {
        self.registry.describe_all()
    }

    /// Returns the number of registered pipelines.
    #[must_use]
    pub fn pipeline_count(&self) -> usize {
        self.registry.len()
    }

    fn resolve<C: Command>(&self) -> HermesResult<Arc<dyn DynPipeline>> {
        self.registry
            .get::<C>()
            .ok_or_else(|| HermesError::handler_not_found(C::name()))
    }

    fn execution_context(&self, metadata: CommandMetadata) -> CommandContext {
        let cancellation = match self.options.dispatch_timeout {
            Some(timeout) => CancellationToken::with_timeout(timeout),
            None => CancellationToken::new(),
        };
        let ctx = CommandContext::with_cancellation(metadata, cancellation);
        if !self.observers.is_empty() {
            ctx.set_observers(self.observers.clone());
        }
        ctx
    }

    async fn admit(&self, ctx: &CommandContext) -> HermesResult<Option<GatePermit>> {
        match &self.gate {
            Some(gate) => gate
                .acquire(&self.options.strategy, ctx.cancellation())
                .await
                .map(Some),
            None => Ok(None),
        }
    }

    /// One breaker-guarded pipeline execution.
    ///
    /// Breaker admission failures propagate without an outcome record;
    /// cancellations release the admission without counting either way.
    async fn guarded_attempt(
        &self,
        pipeline: &Arc<dyn DynPipeline>,
        envelope: CommandEnvelope,
        ctx: &CommandContext,
    ) -> HermesResult<OutputEnvelope> {
        let admission = match &self.breaker {
            Some(breaker) => Some(breaker.admit()?),
            None => None,
        };

        let result = pipeline.execute_erased(envelope, ctx).await;

        if let (Some(breaker), Some(admission)) = (&self.breaker, admission) {
            match &result {
                Ok(_) => breaker.record_success(admission),
                Err(error) if error.is_cancelled() => breaker.record_cancelled(admission),
                Err(_) => breaker.record_failure(admission),
            }
        }

        result
    }

    fn record_outcome(
        &self,
        ctx: &CommandContext,
        command: &str,
        started_at: DateTime<Utc>,
        error: Option<&HermesError>,
        attempts: u32,
    ) {
        let Some(recorder) = &self.recorder else {
            return;
        };

        let completed_at = Utc::now();
        let mut record = match error {
            None => ExecutionRecord::success(ctx.metadata(), command, started_at, completed_at),
            Some(error) => {
                ExecutionRecord::failure(ctx.metadata(), command, started_at, completed_at, error)
            }
        };
        record = record
            .with_middleware_trace(ctx.get::<MiddlewareTrace>().unwrap_or_default())
            .with_annotations(ctx.snapshot().annotations);
        if attempts > 1 {
            record
                .annotations
                .insert("dispatch.attempts".to_string(), serde_json::json!(attempts));
        }
        recorder.record(record);
    }
}

impl Default for CommandBus {
    fn default() -> Self {
        Self::new()
    }
}

impl std::fmt::Debug for CommandBus {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("CommandBus")
            .field("pipelines", &self.registry.len())
            .field("global_middleware", &self.global_middleware.read().len())
            .field("gated", &self.gate.is_some())
            .field("breaker", &self.breaker.is_some())
            .field("recorder", &self.recorder.is_some())
            .finish()
    }
}

/// Builder for [`CommandBus`].
pub struct CommandBusBuilder {
    options: DispatchOptions,
    breaker: Option<CircuitBreakerConfig>,
    recorder: Option<RecorderConfig>,
    observers: ObserverRegistry,
}

impl CommandBusBuilder {
    /// Creates a builder with the standard dispatch options.
    #[must_use]
    pub fn new() -> Self {
        Self {
            options: DispatchOptions::standard(),
            breaker: None,
            recorder: None,
            observers: ObserverRegistry::new(),
        }
    }

    /// Replaces the dispatch options.
    #[must_use]
    pub fn options(mut self, options: DispatchOptions) -> Self {
        self.options = options;
        self
    }

    /// Enables a circuit breaker on the send path.
    #[must_use]
    pub fn circuit_breaker(mut self, config: CircuitBreakerConfig) -> Self {
        self.breaker = Some(config);
        self
    }

    /// Enables execution recording.
    #[must_use]
    pub fn recorder(mut self, config: RecorderConfig) -> Self {
        self.recorder = Some(config);
        self
    }

    /// Adds an observer notified of every execution's lifecycle.
    #[must_use]
    pub fn observer(mut self, observer: Arc<dyn Observer>) -> Self {
        self.observers = self.observers.with_observer(observer);
        self
    }

    /// Applies a per-dispatch deadline.
    #[must_use]
    pub fn dispatch_timeout(mut self, timeout: Duration) -> Self {
        self.options.dispatch_timeout = Some(timeout);
        self
    }

    /// Builds the bus.
    #[must_use]
    pub fn build(self) -> CommandBus {
        let gate = self
            .options
            .max_concurrency
            .map(|max| ConcurrencyGate::new(max, self.options.max_outstanding));

        CommandBus {
            registry: PipelineRegistry::new(),
            global_middleware: RwLock::new(Vec::new()),
            gate,
            breaker: self.breaker.map(|config| Arc::new(CircuitBreaker::new(config))),
            recorder: self.recorder.map(|config| Arc::new(ExecutionRecorder::new(config))),
            observers: self.observers,
            options: self.options,
        }
    }
}

impl Default for CommandBusBuilder {
    fn default() -> Self {
        Self::new()
    }
}
