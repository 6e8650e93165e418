//! Structured logging middleware.
//!
//! Emits `tracing` events around each execution: a debug event when a
//! command enters the chain and another when it leaves, carrying the
//! execution ID, command type, outcome and elapsed time. Consumers wire up
//! their own subscriber.

use crate::middleware::{BoxFuture, Middleware, MiddlewareResult, Next};
use crate::priority::Priority;
use hermes_core::{CommandContext, CommandEnvelope};
use tokio::time::Instant;

/// Middleware that logs command entry and exit.
///
/// # Example
///
/// ```ignore
/// use hermes_middleware::stages::LoggingMiddleware;
///
/// bus.add_middleware(Arc::new(LoggingMiddleware::new()));
/// ```
#[derive(Debug, Clone, Default)]
pub struct LoggingMiddleware {
    _private: (),
}

impl LoggingMiddleware {
    /// Creates the logging middleware.
    #[must_use]
    pub fn new() -> Self {
        Self::default()
    }
}

impl Middleware for LoggingMiddleware {
    fn name(&self) -> &'static str {
        "logging"
    }

    fn priority(&self) -> Priority {
        Priority::OBSERVABILITY
    }

    fn execute<'a>(
        &'a self,
        command: CommandEnvelope,
        ctx: &'a CommandContext,
        next: Next<'a>,
    ) -> BoxFuture<'a, MiddlewareResult> {
        Box::pin(async move {
            let command_name = command.command_type();
            let execution_id = ctx.metadata().id();

            tracing::debug!(
                execution_id = %execution_id,
                command = command_name,
                correlation_id = ctx.metadata().correlation_id(),
                "dispatching command"
            );

            let started = Instant::now();
            let result = next.run(command, ctx).await;
            let elapsed = started.elapsed();

            match &result {
                Ok(_) => tracing::debug!(
                    execution_id = %execution_id,
                    command = command_name,
                    elapsed_ms = elapsed.as_millis() as u64,
                    "command succeeded"
                ),
                Err(error) => tracing::debug!(
                    execution_id = %execution_id,
                    command = command_name,
                    elapsed_ms = elapsed.as_millis() as u64,
                    error_code = error.code(),
                    "command failed"
                ),
            }

            result
        })
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::pipeline::Pipeline;
    use hermes_core::{Command, CommandHandler, CommandMetadata, HermesError};
    use std::sync::Arc;

    struct Echo(&'static str);

    impl Command for Echo {
        type Output = &'static str;
    }

    struct EchoHandler;

    impl CommandHandler<Echo> for EchoHandler {
        async fn handle(
            &self,
            command: Echo,
            _ctx: &CommandContext,
        ) -> Result<&'static str, HermesError> {
            Ok(command.0)
        }
    }

    #[tokio::test]
    async fn test_logging_is_transparent() {
        let pipeline = Pipeline::new(EchoHandler);
        pipeline.add_middleware(Arc::new(LoggingMiddleware::new()));

        let ctx = CommandContext::new(CommandMetadata::new());
        let output = pipeline.execute(Echo("hello"), &ctx).await.unwrap();
        assert_eq!(output, "hello");
    }
}
