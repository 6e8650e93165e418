//! Core middleware trait and chain continuation.
//!
//! This module defines the [`Middleware`] trait that all middleware stages
//! implement. Middleware observes, transforms and guards command executions:
//! it runs before the handler on the way in and after it on the way out,
//! composed as an onion in ascending priority order.
//!
//! # Contract
//!
//! A middleware receives the type-erased command envelope, the execution
//! context, and a [`Next`] continuation. It may:
//!
//! 1. Pass through — call `next` and return its result unchanged
//! 2. Short-circuit — return a result without calling `next`
//! 3. Fail — return an error without calling `next`
//! 4. Transform the command or context before calling `next`
//! 5. Transform the result or translate the error after `next` returns
//!
//! Middleware that deliberately may finish without calling `next`
//! (authorization rejections, cache hits, rate limiting) must declare it by
//! overriding [`Middleware::short_circuits`]. A middleware that returns
//! success without calling `next` and without that declaration is reported
//! with a `tracing` warning in debug builds; it is never fatal.
//!
//! # Example
//!
//! ```ignore
//! use hermes_middleware::{BoxFuture, Middleware, MiddlewareResult, Next, Priority};
//! use hermes_core::{CommandContext, CommandEnvelope};
//!
//! struct TimingMiddleware;
//!
//! impl Middleware for TimingMiddleware {
//!     fn name(&self) -> &'static str {
//!         "timing"
//!     }
//!
//!     fn priority(&self) -> Priority {
//!         Priority::OBSERVABILITY
//!     }
//!
//!     fn execute<'a>(
//!         &'a self,
//!         command: CommandEnvelope,
//!         ctx: &'a CommandContext,
//!         next: Next<'a>,
//!     ) -> BoxFuture<'a, MiddlewareResult> {
//!         Box::pin(async move {
//!             let started = tokio::time::Instant::now();
//!             let result = next.run(command, ctx).await;
//!             tracing::debug!(elapsed = ?started.elapsed(), "command finished");
//!             result
//!         })
//!     }
//! }
//! ```

use crate::priority::Priority;
use hermes_core::{CommandContext, CommandEnvelope, HermesError, OutputEnvelope};
use std::future::Future;
use std::pin::Pin;
use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::Arc;
use tokio::time::Instant;

/// A boxed future returned by middleware and handlers.
pub type BoxFuture<'a, T> = Pin<Box<dyn Future<Output = T> + Send + 'a>>;

/// The result produced by a chain hop: a type-erased output or an error.
pub type MiddlewareResult = Result<OutputEnvelope, HermesError>;

/// The core middleware trait.
///
/// Implementations are shared across concurrent executions and must be
/// `Send + Sync`. The chain invokes `execute` with a [`Next`] continuation
/// that must be consumed at most once.
pub trait Middleware: Send + Sync + 'static {
    /// Returns the unique name of this middleware stage.
    ///
    /// This name is used for logging, diagnostics and chain inspection.
    fn name(&self) -> &'static str;

    /// Returns the execution priority. Lower priorities run first.
    fn priority(&self) -> Priority;

    /// Declares that this middleware may legitimately return a result
    /// without invoking `next`.
    fn short_circuits(&self) -> bool {
        false
    }

    /// Processes the command through this middleware.
    fn execute<'a>(
        &'a self,
        command: CommandEnvelope,
        ctx: &'a CommandContext,
        next: Next<'a>,
    ) -> BoxFuture<'a, MiddlewareResult>;
}

/// Type-erased terminal of the chain: the adapted handler.
pub(crate) trait ErasedHandler: Send + Sync + 'static {
    /// Returns the concrete handler's type name.
    fn name(&self) -> &'static str;

    /// Invokes the handler with an erased command.
    fn call<'a>(
        &'a self,
        command: CommandEnvelope,
        ctx: &'a CommandContext,
    ) -> BoxFuture<'a, MiddlewareResult>;
}

/// Continuation invoking the remainder of the chain and, ultimately, the
/// handler.
///
/// `Next` is consumed by [`Next::run`], which makes double invocation
/// impossible by construction. Each hop polls cancellation, notifies
/// observers, and appends the stage name to the execution's
/// [`MiddlewareTrace`].
pub struct Next<'a> {
    /// Remaining middleware, first element runs next.
    chain: &'a [Arc<dyn Middleware>],

    /// Terminal handler adapter.
    handler: &'a dyn ErasedHandler,

    /// Flag owned by the parent frame, set when this continuation runs.
    invoked: Option<Arc<AtomicBool>>,
}

impl<'a> Next<'a> {
    /// Creates the root continuation for a full chain.
    pub(crate) fn root(chain: &'a [Arc<dyn Middleware>], handler: &'a dyn ErasedHandler) -> Self {
        Self {
            chain,
            handler,
            invoked: None,
        }
    }

    /// Invokes the next middleware or the handler.
    ///
    /// Consumes `self` so the continuation can run at most once.
    pub async fn run(mut self, command: CommandEnvelope, ctx: &CommandContext) -> MiddlewareResult {
        if let Some(flag) = self.invoked.take() {
            flag.store(true, Ordering::SeqCst);
        }

        // Every chain hop is a suspension point the runtime controls.
        ctx.cancellation().check()?;

        match self.chain.split_first() {
            Some((middleware, rest)) => {
                let observers = ctx.observers();
                if let Some(obs) = &observers {
                    obs.each(|o| o.middleware_started(ctx.metadata(), middleware.name()));
                }
                ctx.update::<MiddlewareTrace>(|trace| trace.push(middleware.name().to_string()));

                let invoked = Arc::new(AtomicBool::new(false));
                let next = Next {
                    chain: rest,
                    handler: self.handler,
                    invoked: Some(Arc::clone(&invoked)),
                };

                let result = middleware.execute(command, ctx, next).await;

                match &result {
                    Ok(_) => {
                        if cfg!(debug_assertions)
                            && !invoked.load(Ordering::SeqCst)
                            && !middleware.short_circuits()
                        {
                            tracing::warn!(
                                middleware = middleware.name(),
                                "middleware returned a result without invoking next \
                                 and does not declare short-circuiting"
                            );
                        }
                        if let Some(obs) = &observers {
                            obs.each(|o| o.middleware_finished(ctx.metadata(), middleware.name()));
                        }
                    }
                    Err(error) => {
                        if let Some(obs) = &observers {
                            obs.each(|o| {
                                o.middleware_failed(ctx.metadata(), middleware.name(), error);
                            });
                        }
                    }
                }

                result
            }
            None => {
                let command_name = command.command_type();
                let observers = ctx.observers();
                if let Some(obs) = &observers {
                    obs.each(|o| o.handler_started(ctx.metadata(), command_name));
                }

                let started = Instant::now();
                let result = self.handler.call(command, ctx).await;
                let elapsed = started.elapsed();

                match &result {
                    Ok(_) => {
                        if let Some(obs) = &observers {
                            obs.each(|o| {
                                o.handler_finished(ctx.metadata(), command_name, elapsed);
                            });
                        }
                    }
                    Err(error) => {
                        if let Some(obs) = &observers {
                            obs.each(|o| {
                                o.handler_failed(ctx.metadata(), command_name, error, elapsed);
                            });
                        }
                    }
                }

                result
            }
        }
    }
}

/// Context key recording the middleware stages entered by one execution, in
/// chain order.
pub struct MiddlewareTrace;

impl hermes_core::ContextKey for MiddlewareTrace {
    type Value = Vec<String>;
}

/// A middleware built from a closure.
///
/// # Example
///
/// ```ignore
/// use hermes_middleware::{FnMiddleware, Priority};
///
/// let passthrough = FnMiddleware::new("passthrough", Priority::CUSTOM, |cmd, ctx, next| {
///     Box::pin(async move { next.run(cmd, ctx).await })
/// });
/// ```
pub struct FnMiddleware<F> {
    name: &'static str,
    priority: Priority,
    short_circuits: bool,
    func: F,
}

impl<F> FnMiddleware<F>
where
    F: for<'a> Fn(CommandEnvelope, &'a CommandContext, Next<'a>) -> BoxFuture<'a, MiddlewareResult>
        + Send
        + Sync
        + 'static,
{
    /// Creates a new function-based middleware.
    #[must_use]
    pub const fn new(name: &'static str, priority: Priority, func: F) -> Self {
        Self {
            name,
            priority,
            short_circuits: false,
            func,
        }
    }

    /// Declares that the closure may finish without invoking `next`.
    #[must_use]
    pub const fn short_circuiting(mut self) -> Self {
        self.short_circuits = true;
        self
    }
}

impl<F> Middleware for FnMiddleware<F>
where
    F: for<'a> Fn(CommandEnvelope, &'a CommandContext, Next<'a>) -> BoxFuture<'a, MiddlewareResult>
        + Send
        + Sync
        + 'static,
{
    fn name(&self) -> &'static str {
        self.name
    }

    fn priority(&self) -> Priority {
        self.priority
    }

    fn short_circuits(&self) -> bool {
        self.short_circuits
    }

    fn execute<'a>(
        &'a self,
        command: CommandEnvelope,
        ctx: &'a CommandContext,
        next: Next<'a>,
    ) -> BoxFuture<'a, MiddlewareResult> {
        (self.func)(command, ctx, next)
    }
}
