//! Sanitized dispatcher decorator.
//!
//! [`SanitizedBus`] wraps a [`CommandBus`] with the secure error surface:
//! the dispatch behaviour is identical, but every error is projected through
//! [`HermesError::sanitized`] before reaching the caller, so handler and
//! backend internals never leak. Caller-actionable kinds (validation,
//! authentication, traffic control, cancellation) pass through unchanged.

use crate::bus::CommandBus;
use hermes_core::{Command, CommandMetadata, HermesError};
use hermes_resilience::RetryPolicy;
use std::sync::Arc;

/// A decorator over [`CommandBus`] that never leaks handler internals.
///
/// # Example
///
/// ```rust,ignore
/// use hermes_bus::{CommandBus, SanitizedBus};
///
/// let bus = Arc::new(CommandBus::builder().build());
/// bus.register::<ChargeCard, _>(ChargeCardHandler)?;
///
/// let secure = SanitizedBus::new(Arc::clone(&bus));
/// // A handler panic message or database error surfaces as an opaque
/// // "command execution failed".
/// let result = secure.send(ChargeCard { .. }).await;
/// ```
#[derive(Debug, Clone)]
pub struct SanitizedBus {
    inner: Arc<CommandBus>,
}

impl SanitizedBus {
    /// Wraps a bus with the sanitized error surface.
    #[must_use]
    pub fn new(inner: Arc<CommandBus>) -> Self {
        Self { inner }
    }

    /// Returns the wrapped bus.
    #[must_use]
    pub fn inner(&self) -> &CommandBus {
        &self.inner
    }

    /// Dispatches a command with fresh metadata; see [`CommandBus::send`].
    pub async fn send<C: Command>(&self, command: C) -> Result<C::Output, HermesError> {
        self.inner.send(command).await.map_err(HermesError::sanitized)
    }

    /// Dispatches a command with caller-supplied metadata; see
    /// [`CommandBus::send_with_metadata`].
    pub async fn send_with_metadata<C: Command>(
        &self,
        command: C,
        metadata: CommandMetadata,
    ) -> Result<C::Output, HermesError> {
        self.inner
            .send_with_metadata(command, metadata)
            .await
            .map_err(HermesError::sanitized)
    }

    /// Dispatches a command under a retry policy; see
    /// [`CommandBus::send_with_policy`].
    pub async fn send_with_policy<C: Command + Clone>(
        &self,
        command: C,
        metadata: CommandMetadata,
        policy: &RetryPolicy,
    ) -> Result<C::Output, HermesError> {
        self.inner
            .send_with_policy(command, metadata, policy)
            .await
            .map_err(HermesError::sanitized)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use hermes_core::{CommandContext, CommandHandler, ValidationReason};

    struct Explode;

    impl Command for Explode {
        type Output = ();
    }

    struct ExplodeHandler;

    impl CommandHandler<Explode> for ExplodeHandler {
        async fn handle(&self, _command: Explode, _ctx: &CommandContext) -> Result<(), HermesError> {
            Err(HermesError::execution_failed_with_source(
                "users_pkey violated by duplicate insert",
                std::io::Error::new(std::io::ErrorKind::Other, "pg error 23505"),
            ))
        }
    }

    struct Invalid;

    impl Command for Invalid {
        type Output = ();
    }

    struct InvalidHandler;

    impl CommandHandler<Invalid> for InvalidHandler {
        async fn handle(&self, _command: Invalid, _ctx: &CommandContext) -> Result<(), HermesError> {
            Err(HermesError::validation(ValidationReason::MissingRequired))
        }
    }

    fn secure_bus() -> SanitizedBus {
        let bus = Arc::new(CommandBus::new());
        bus.register::<Explode, _>(ExplodeHandler).unwrap();
        bus.register::<Invalid, _>(InvalidHandler).unwrap();
        SanitizedBus::new(bus)
    }

    #[tokio::test]
    async fn test_internal_errors_are_scrubbed() {
        let bus = secure_bus();
        let err = bus.send(Explode).await.unwrap_err();

        match err {
            HermesError::ExecutionFailed { message, source } => {
                assert_eq!(message, "command execution failed");
                assert!(source.is_none());
            }
            other => panic!("expected sanitized ExecutionFailed, got {other:?}"),
        }
    }

    #[tokio::test]
    async fn test_caller_errors_pass_through() {
        let bus = secure_bus();
        let err = bus.send(Invalid).await.unwrap_err();
        assert!(matches!(err, HermesError::Validation { .. }));
    }

    #[tokio::test]
    async fn test_handler_not_found_passes_through() {
        struct Unknown;
        impl Command for Unknown {
            type Output = ();
        }

        let bus = secure_bus();
        let err = bus.send(Unknown).await.unwrap_err();
        assert!(matches!(err, HermesError::HandlerNotFound { .. }));
    }
}
