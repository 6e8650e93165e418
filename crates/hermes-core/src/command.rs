//! Command data model.
//!
//! A [`Command`] is a typed request with an associated output type. Commands
//! are plain values: immutable once dispatched, `Send`, and identified by
//! their Rust type. The dispatch path is monomorphic per command type — the
//! bus looks pipelines up by [`TypeId`] and downcasts exactly once at the
//! handler boundary — while the middleware chain operates on the type-erased
//! [`CommandEnvelope`] / [`OutputEnvelope`] carriers defined here.

use crate::error::{HermesError, HermesResult};
use std::any::{Any, TypeId};

/// A typed command with an associated output type.
///
/// # Example
///
/// ```
/// use hermes_core::Command;
///
/// struct AddNumbers {
///     a: i64,
///     b: i64,
/// }
///
/// impl Command for AddNumbers {
///     type Output = i64;
/// }
///
/// assert!(AddNumbers::name().contains("AddNumbers"));
/// ```
pub trait Command: Send + 'static {
    /// The result type produced by this command's handler.
    type Output: Send + 'static;

    /// Returns the command's type name, used for registry diagnostics,
    /// records, and error messages.
    #[must_use]
    fn name() -> &'static str
    where
        Self: Sized,
    {
        std::any::type_name::<Self>()
    }
}

/// A type-erased command in flight through the middleware chain.
///
/// The envelope remembers the concrete command's [`TypeId`], so middleware
/// may substitute a derived command of the *same* type via
/// [`CommandEnvelope::swap`] but can never change the command's identity.
pub struct CommandEnvelope {
    payload: Box<dyn Any + Send>,
    type_id: TypeId,
    type_name: &'static str,
}

impl CommandEnvelope {
    /// Wraps a typed command.
    #[must_use]
    pub fn new<C: Command>(command: C) -> Self {
        Self {
            payload: Box::new(command),
            type_id: TypeId::of::<C>(),
            type_name: C::name(),
        }
    }

    /// Returns the wrapped command's type name.
    #[must_use]
    pub const fn command_type(&self) -> &'static str {
        self.type_name
    }

    /// Returns the wrapped command's type identity.
    #[must_use]
    pub const fn type_id(&self) -> TypeId {
        self.type_id
    }

    /// Returns `true` if the envelope holds a command of type `C`.
    #[must_use]
    pub fn is<C: Command>(&self) -> bool {
        self.type_id == TypeId::of::<C>()
    }

    /// Borrows the wrapped command as `C`, if the types match.
    #[must_use]
    pub fn downcast_ref<C: Command>(&self) -> Option<&C> {
        self.payload.downcast_ref::<C>()
    }

    /// Unwraps the command as `C`, returning the envelope on mismatch.
    pub fn downcast<C: Command>(self) -> Result<C, Self> {
        let type_id = self.type_id;
        let type_name = self.type_name;
        match self.payload.downcast::<C>() {
            Ok(command) => Ok(*command),
            Err(payload) => Err(Self {
                payload,
                type_id,
                type_name,
            }),
        }
    }

    /// Substitutes a derived command of the same type.
    ///
    /// Middleware uses this to hand a transformed command to `next`. The
    /// replacement must have the same type identity as the original.
    pub fn swap<C: Command>(&mut self, replacement: C) -> HermesResult<()> {
        if self.type_id != TypeId::of::<C>() {
            return Err(HermesError::execution_failed(format!(
                "cannot substitute command '{}' with '{}'",
                self.type_name,
                C::name(),
            )));
        }
        self.payload = Box::new(replacement);
        Ok(())
    }
}

impl std::fmt::Debug for CommandEnvelope {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("CommandEnvelope")
            .field("command_type", &self.type_name)
            .finish_non_exhaustive()
    }
}

/// A type-erased handler output travelling back up the chain.
pub struct OutputEnvelope {
    payload: Box<dyn Any + Send>,
    type_name: &'static str,
}

impl OutputEnvelope {
    /// Wraps a typed output value.
    #[must_use]
    pub fn new<T: Send + 'static>(output: T) -> Self {
        Self {
            payload: Box::new(output),
            type_name: std::any::type_name::<T>(),
        }
    }

    /// Returns the wrapped output's type name.
    #[must_use]
    pub const fn output_type(&self) -> &'static str {
        self.type_name
    }

    /// Borrows the wrapped output as `T`, if the types match.
    #[must_use]
    pub fn downcast_ref<T: Send + 'static>(&self) -> Option<&T> {
        self.payload.downcast_ref::<T>()
    }

    /// Unwraps the output as `T`.
    ///
    /// Fails with an internal execution error when the stored type does not
    /// match; this indicates a middleware returned a foreign result.
    pub fn downcast<T: Send + 'static>(self) -> HermesResult<T> {
        let type_name = self.type_name;
        self.payload.downcast::<T>().map(|b| *b).map_err(|_| {
            HermesError::execution_failed(format!(
                "pipeline produced '{}' where '{}' was expected",
                type_name,
                std::any::type_name::<T>(),
            ))
        })
    }
}

impl std::fmt::Debug for OutputEnvelope {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("OutputEnvelope")
            .field("output_type", &self.type_name)
            .finish_non_exhaustive()
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    struct Ping {
        sequence: u32,
    }

    impl Command for Ping {
        type Output = u32;
    }

    #[derive(Debug)]
    struct Pong;

    impl Command for Pong {
        type Output = ();
    }

    #[test]
    fn test_envelope_preserves_type_identity() {
        let envelope = CommandEnvelope::new(Ping { sequence: 7 });
        assert!(envelope.is::<Ping>());
        assert!(!envelope.is::<Pong>());
        assert!(envelope.command_type().contains("Ping"));
    }

    #[test]
    fn test_envelope_downcast_ref() {
        let envelope = CommandEnvelope::new(Ping { sequence: 3 });
        assert_eq!(envelope.downcast_ref::<Ping>().unwrap().sequence, 3);
        assert!(envelope.downcast_ref::<Pong>().is_none());
    }

    #[test]
    fn test_envelope_downcast_returns_envelope_on_mismatch() {
        let envelope = CommandEnvelope::new(Ping { sequence: 1 });
        let envelope = envelope.downcast::<Pong>().unwrap_err();
        // The original command survives a failed downcast.
        assert_eq!(envelope.downcast::<Ping>().ok().unwrap().sequence, 1);
    }

    #[test]
    fn test_swap_same_type() {
        let mut envelope = CommandEnvelope::new(Ping { sequence: 1 });
        envelope.swap(Ping { sequence: 2 }).expect("same type");
        assert_eq!(envelope.downcast_ref::<Ping>().unwrap().sequence, 2);
    }

    #[test]
    fn test_swap_rejects_different_type() {
        let mut envelope = CommandEnvelope::new(Ping { sequence: 1 });
        let err = envelope.swap(Pong).unwrap_err();
        assert!(matches!(err, HermesError::ExecutionFailed { .. }));
        // Original payload is untouched.
        assert_eq!(envelope.downcast_ref::<Ping>().unwrap().sequence, 1);
    }

    #[test]
    fn test_output_envelope_roundtrip() {
        let envelope = OutputEnvelope::new(42u32);
        assert_eq!(envelope.downcast::<u32>().unwrap(), 42);
    }

    #[test]
    fn test_output_envelope_mismatch() {
        let envelope = OutputEnvelope::new(42u32);
        let err = envelope.downcast::<String>().unwrap_err();
        assert!(matches!(err, HermesError::ExecutionFailed { .. }));
    }
}
