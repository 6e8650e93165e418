//! Command validation middleware.
//!
//! Validation is declared explicitly per command type: typed rules are
//! registered against the middleware at construction time and looked up by
//! the command's type identity at dispatch. There is no reflection over
//! command shapes — a rule receives the concrete command and decides.
//!
//! The [`FieldRules`] helper covers the common string checks and maps each
//! failure onto the corresponding [`ValidationReason`].

use crate::middleware::{BoxFuture, Middleware, MiddlewareResult, Next};
use crate::priority::Priority;
use hermes_core::{
    Command, CommandContext, CommandEnvelope, HermesError, HermesResult, ValidationReason,
};
use std::any::TypeId;
use std::collections::HashMap;
use std::sync::Arc;

/// A type-erased validation rule.
type ErasedRule = Arc<dyn Fn(&CommandEnvelope) -> HermesResult<()> + Send + Sync>;

/// Middleware that runs declared validation rules before the handler.
///
/// Commands without registered rules pass through untouched.
///
/// # Example
///
/// ```ignore
/// use hermes_middleware::stages::{FieldRules, ValidationMiddleware};
///
/// let validation = ValidationMiddleware::new()
///     .rule::<CreateUser, _>(|cmd| {
///         FieldRules::new("email", &cmd.email).required()?.email()?.finish()
///     });
/// bus.add_middleware(Arc::new(validation));
/// ```
#[derive(Default)]
pub struct ValidationMiddleware {
    rules: HashMap<TypeId, Vec<ErasedRule>>,
}

impl ValidationMiddleware {
    /// Creates an empty validation middleware.
    #[must_use]
    pub fn new() -> Self {
        Self::default()
    }

    /// Registers a rule for command type `C`.
    ///
    /// Multiple rules per type run in registration order; the first failure
    /// wins.
    #[must_use]
    pub fn rule<C, F>(mut self, rule: F) -> Self
    where
        C: Command,
        F: Fn(&C) -> HermesResult<()> + Send + Sync + 'static,
    {
        let erased: ErasedRule = Arc::new(move |envelope| {
            envelope.downcast_ref::<C>().map_or(Ok(()), &rule)
        });
        self.rules.entry(TypeId::of::<C>()).or_default().push(erased);
        self
    }
}

impl Middleware for ValidationMiddleware {
    fn name(&self) -> &'static str {
        "validation"
    }

    fn priority(&self) -> Priority {
        Priority::VALIDATION
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
            if let Some(rules) = self.rules.get(&command.type_id()) {
                for rule in rules {
                    rule(&command)?;
                }
            }
            next.run(command, ctx).await
        })
    }
}

/// Chainable string-field checks mapping onto [`ValidationReason`].
///
/// # Example
///
/// ```
/// use hermes_middleware::stages::FieldRules;
///
/// let result = FieldRules::new("email", "alice@example.com")
///     .required()
///     .and_then(FieldRules::email)
///     .and_then(|f| f.max_len(254))
///     .and_then(FieldRules::finish);
/// assert!(result.is_ok());
/// ```
#[derive(Debug, Clone, Copy)]
pub struct FieldRules<'a> {
    name: &'a str,
    value: &'a str,
}

impl<'a> FieldRules<'a> {
    /// Starts a rule chain for a named field.
    #[must_use]
    pub const fn new(name: &'a str, value: &'a str) -> Self {
        Self { name, value }
    }

    fn fail(self, reason: ValidationReason) -> HermesError {
        HermesError::validation_field(self.name, reason)
    }

    /// The field must be non-empty.
    pub fn required(self) -> HermesResult<Self> {
        if self.value.trim().is_empty() {
            Err(self.fail(ValidationReason::MissingRequired))
        } else {
            Ok(self)
        }
    }

    /// The field must be a plausible email address.
    pub fn email(self) -> HermesResult<Self> {
        let mut parts = self.value.splitn(2, '@');
        let local = parts.next().unwrap_or_default();
        let domain = parts.next().unwrap_or_default();

        let plausible = !local.is_empty()
            && !domain.is_empty()
            && domain.contains('.')
            && !domain.starts_with('.')
            && !domain.ends_with('.');

        if plausible {
            Ok(self)
        } else {
            Err(self.fail(ValidationReason::InvalidEmail))
        }
    }

    /// The field must be at most `max` characters long.
    pub fn max_len(self, max: usize) -> HermesResult<Self> {
        if self.value.chars().count() > max {
            Err(self.fail(ValidationReason::TooLong { max }))
        } else {
            Ok(self)
        }
    }

    /// The field must be at least `min` characters long.
    pub fn min_len(self, min: usize) -> HermesResult<Self> {
        if self.value.chars().count() < min {
            Err(self.fail(ValidationReason::TooShort { min }))
        } else {
            Ok(self)
        }
    }

    /// The field may only contain alphanumeric characters, `-` and `_`.
    pub fn identifier(self) -> HermesResult<Self> {
        if self
            .value
            .chars()
            .all(|c| c.is_ascii_alphanumeric() || c == '-' || c == '_')
        {
            Ok(self)
        } else {
            Err(self.fail(ValidationReason::InvalidCharacters))
        }
    }

    /// The field must match a custom format predicate.
    pub fn format(self, expected: &str, predicate: impl Fn(&str) -> bool) -> HermesResult<Self> {
        if predicate(self.value) {
            Ok(self)
        } else {
            Err(self.fail(ValidationReason::InvalidFormat {
                expected: expected.to_string(),
            }))
        }
    }

    /// The field must satisfy the password strength policy: at least eight
    /// characters with upper case, lower case, and a digit.
    pub fn strong_password(self) -> HermesResult<Self> {
        let long_enough = self.value.chars().count() >= 8;
        let has_upper = self.value.chars().any(char::is_uppercase);
        let has_lower = self.value.chars().any(char::is_lowercase);
        let has_digit = self.value.chars().any(|c| c.is_ascii_digit());

        if long_enough && has_upper && has_lower && has_digit {
            Ok(self)
        } else {
            Err(self.fail(ValidationReason::WeakPassword))
        }
    }

    /// Ends the chain.
    pub fn finish(self) -> HermesResult<()> {
        Ok(())
    }
}
