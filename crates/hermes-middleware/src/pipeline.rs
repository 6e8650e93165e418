//! Per-command-type execution pipeline.
//!
//! A [`Pipeline`] binds one handler to its middleware chain. The middleware
//! vector is kept sorted ascending by priority with ties resolved by
//! insertion order (a stable sort, observable and preserved under runtime
//! additions). Executions share an immutable chain snapshot; mutations
//! rebuild the snapshot under a write lock, so concurrent callers always see
//! a consistent composition.

use crate::middleware::{BoxFuture, ErasedHandler, Middleware, MiddlewareResult, Next};
use crate::priority::Priority;
use hermes_core::{
    Command, CommandContext, CommandEnvelope, CommandHandler, HermesError, OutputEnvelope,
};
use parking_lot::RwLock;
use serde::{Deserialize, Serialize};
use std::marker::PhantomData;
use std::sync::Arc;
use tokio::time::Instant;

/// One middleware registered with a pipeline.
struct ChainEntry {
    middleware: Arc<dyn Middleware>,
    priority: Priority,
}

/// Chain state guarded by the pipeline's lock.
struct ChainState {
    /// Entries sorted ascending by priority, stable in insertion order.
    entries: Vec<ChainEntry>,

    /// Immutable snapshot shared with in-flight executions.
    snapshot: Arc<[Arc<dyn Middleware>]>,
}

impl ChainState {
    fn rebuild_snapshot(&mut self) {
        self.snapshot = self
            .entries
            .iter()
            .map(|entry| Arc::clone(&entry.middleware))
            .collect();
    }
}

/// Adapts a typed [`CommandHandler`] to the erased chain terminal.
struct HandlerAdapter<C, H> {
    handler: H,
    _marker: PhantomData<fn(C)>,
}

impl<C, H> ErasedHandler for HandlerAdapter<C, H>
where
    C: Command,
    H: CommandHandler<C>,
{
    fn name(&self) -> &'static str {
        std::any::type_name::<H>()
    }

    fn call<'a>(
        &'a self,
        command: CommandEnvelope,
        ctx: &'a CommandContext,
    ) -> BoxFuture<'a, MiddlewareResult> {
        Box::pin(async move {
            let command = command.downcast::<C>().map_err(|envelope| {
                HermesError::execution_failed(format!(
                    "handler for '{}' received a '{}' command",
                    C::name(),
                    envelope.command_type(),
                ))
            })?;
            let output = self.handler.handle(command, ctx).await?;
            Ok(OutputEnvelope::new(output))
        })
    }
}

/// A handler bound to its middleware chain for one command type.
///
/// # Example
///
/// ```rust,ignore
/// use hermes_middleware::Pipeline;
///
/// let pipeline = Pipeline::new(AddNumbersHandler);
/// pipeline.add_middleware(Arc::new(LoggingMiddleware::new()));
///
/// let ctx = CommandContext::new(CommandMetadata::new());
/// let sum = pipeline.execute(AddNumbers { a: 5, b: 3 }, &ctx).await?;
/// ```
pub struct Pipeline<C: Command> {
    handler: Box<dyn ErasedHandler>,
    chain: RwLock<ChainState>,
    _marker: PhantomData<fn(C)>,
}

impl<C: Command> Pipeline<C> {
    /// Creates a pipeline around a handler with an empty chain.
    #[must_use]
    pub fn new<H: CommandHandler<C>>(handler: H) -> Self {
        Self {
            handler: Box::new(HandlerAdapter {
                handler,
                _marker: PhantomData::<fn(C)>,
            }),
            chain: RwLock::new(ChainState {
                entries: Vec::new(),
                snapshot: Arc::from(Vec::new()),
            }),
            _marker: PhantomData,
        }
    }

    /// Inserts a middleware, preserving the stable priority order, and
    /// rebuilds the shared chain snapshot.
    pub fn add_middleware(&self, middleware: Arc<dyn Middleware>) {
        let priority = middleware.priority();
        let mut chain = self.chain.write();

        // Insert after every entry with priority <= the new one: equal
        // priorities keep registration order.
        let index = chain
            .entries
            .partition_point(|entry| entry.priority <= priority);
        chain.entries.insert(
            index,
            ChainEntry {
                middleware,
                priority,
            },
        );
        chain.rebuild_snapshot();
    }

    /// Returns the number of middleware in the chain.
    #[must_use]
    pub fn middleware_count(&self) -> usize {
        self.chain.read().entries.len()
    }

    /// Executes a command through the chain and the handler.
    ///
    /// Cancellation is checked before the first middleware runs; a cancelled
    /// context fails without invoking any middleware or the handler.
    pub async fn execute(
        &self,
        command: C,
        ctx: &CommandContext,
    ) -> Result<C::Output, HermesError> {
        let output = self
            .execute_erased(CommandEnvelope::new(command), ctx)
            .await?;
        output.downcast::<C::Output>()
    }

    /// Executes an erased command through the chain.
    fn run_erased<'a>(
        &'a self,
        command: CommandEnvelope,
        ctx: &'a CommandContext,
    ) -> BoxFuture<'a, MiddlewareResult> {
        Box::pin(async move {
            ctx.cancellation().check()?;

            let snapshot = self.chain.read().snapshot.clone();
            let observers = ctx.observers();
            let command_name = command.command_type();
            let started = Instant::now();

            if let Some(obs) = &observers {
                obs.each(|o| o.pipeline_started(ctx.metadata(), command_name));
            }

            let next = Next::root(&snapshot, self.handler.as_ref());
            let result = next.run(command, ctx).await;

            let elapsed = started.elapsed();
            match &result {
                Ok(_) => {
                    if let Some(obs) = &observers {
                        obs.each(|o| o.pipeline_finished(ctx.metadata(), command_name, elapsed));
                    }
                }
                Err(error) => {
                    if let Some(obs) = &observers {
                        obs.each(|o| {
                            o.pipeline_failed(ctx.metadata(), command_name, error, elapsed);
                        });
                    }
                }
            }

            result
        })
    }

    /// Describes the pipeline composition for diagnostics.
    #[must_use]
    pub fn describe(&self) -> PipelineSnapshot {
        let chain = self.chain.read();
        PipelineSnapshot {
            command: C::name().to_string(),
            handler: self.handler.name().to_string(),
            middleware: chain
                .entries
                .iter()
                .map(|entry| MiddlewareDescriptor {
                    name: entry.middleware.name().to_string(),
                    priority: entry.priority.value(),
                })
                .collect(),
        }
    }
}

/// Object-safe pipeline facade used by the bus registry.
pub trait DynPipeline: Send + Sync + 'static {
    /// Returns the bound command's type name.
    fn command_type(&self) -> &'static str;

    /// Adds a middleware to the chain.
    fn add_middleware(&self, middleware: Arc<dyn Middleware>);

    /// Describes the pipeline composition.
    fn describe(&self) -> PipelineSnapshot;

    /// Executes an erased command through the chain.
    fn execute_erased<'a>(
        &'a self,
        command: CommandEnvelope,
        ctx: &'a CommandContext,
    ) -> BoxFuture<'a, MiddlewareResult>;
}

impl<C: Command> DynPipeline for Pipeline<C> {
    fn command_type(&self) -> &'static str {
        C::name()
    }

    fn add_middleware(&self, middleware: Arc<dyn Middleware>) {
        Pipeline::add_middleware(self, middleware);
    }

    fn describe(&self) -> PipelineSnapshot {
        Pipeline::describe(self)
    }

    fn execute_erased<'a>(
        &'a self,
        command: CommandEnvelope,
        ctx: &'a CommandContext,
    ) -> BoxFuture<'a, MiddlewareResult> {
        self.run_erased(command, ctx)
    }
}

impl<C: Command> Pipeline<C> {
    /// Executes an erased command; see [`DynPipeline::execute_erased`].
    pub fn execute_erased<'a>(
        &'a self,
        command: CommandEnvelope,
        ctx: &'a CommandContext,
    ) -> BoxFuture<'a, MiddlewareResult> {
        self.run_erased(command, ctx)
    }
}

/// A descriptive snapshot of one pipeline's composition.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct PipelineSnapshot {
    /// The command type name.
    pub command: String,
    /// The handler type name.
    pub handler: String,
    /// Middleware in execution order.
    pub middleware: Vec<MiddlewareDescriptor>,
}

/// One middleware as seen in a [`PipelineSnapshot`].
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct MiddlewareDescriptor {
    /// The middleware's name.
    pub name: String,
    /// The middleware's priority value.
    pub priority: i32,
}
