//! Handler trait for command processing.
//!
//! The [`CommandHandler`] trait defines the terminal producer of a result
//! for one command type. Handlers receive the immutable command and the
//! per-execution [`CommandContext`].

use crate::command::Command;
use crate::context::CommandContext;
use crate::error::HermesError;
use std::future::Future;

/// A trait for handling typed commands.
///
/// One handler is registered per command type; the pipeline invokes it after
/// every middleware has run its pre-processing side.
///
/// # Example
///
/// ```rust,ignore
/// use hermes_core::{Command, CommandHandler, CommandContext, HermesError};
///
/// struct AddNumbers { a: i64, b: i64 }
///
/// impl Command for AddNumbers {
///     type Output = i64;
/// }
///
/// struct AddNumbersHandler;
///
/// impl CommandHandler<AddNumbers> for AddNumbersHandler {
///     async fn handle(
///         &self,
///         command: AddNumbers,
///         _ctx: &CommandContext,
///     ) -> Result<i64, HermesError> {
///         Ok(command.a + command.b)
///     }
/// }
/// ```
pub trait CommandHandler<C: Command>: Send + Sync + 'static {
    /// Handles a command and produces its output.
    ///
    /// # Errors
    ///
    /// Returns [`HermesError`] if:
    /// - Business logic validation fails
    /// - Required resources are not available
    /// - An internal error occurs
    fn handle(
        &self,
        command: C,
        ctx: &CommandContext,
    ) -> impl Future<Output = Result<C::Output, HermesError>> + Send;
}

/// A function-based handler wrapper.
///
/// This allows using async functions directly as handlers.
///
/// # Example
///
/// ```rust,ignore
/// use hermes_core::FnHandler;
///
/// let handler = FnHandler::new(|command: AddNumbers, _ctx| async move {
///     Ok(command.a + command.b)
/// });
/// ```
pub struct FnHandler<F, C, Fut>
where
    C: Command,
    F: Fn(C, &CommandContext) -> Fut + Send + Sync + 'static,
    Fut: Future<Output = Result<C::Output, HermesError>> + Send,
{
    func: F,
    _phantom: std::marker::PhantomData<fn(C) -> Fut>,
}

impl<F, C, Fut> FnHandler<F, C, Fut>
where
    C: Command,
    F: Fn(C, &CommandContext) -> Fut + Send + Sync + 'static,
    Fut: Future<Output = Result<C::Output, HermesError>> + Send,
{
    /// Creates a new function-based handler.
    #[must_use]
    pub const fn new(func: F) -> Self {
        Self {
            func,
            _phantom: std::marker::PhantomData,
        }
    }
}

impl<F, C, Fut> CommandHandler<C> for FnHandler<F, C, Fut>
where
    C: Command,
    F: Fn(C, &CommandContext) -> Fut + Send + Sync + 'static,
    Fut: Future<Output = Result<C::Output, HermesError>> + Send + 'static,
{
    async fn handle(&self, command: C, ctx: &CommandContext) -> Result<C::Output, HermesError> {
        (self.func)(command, ctx).await
    }
}
