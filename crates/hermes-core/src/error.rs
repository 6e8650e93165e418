//! Error types for Hermes.
//!
//! This module provides the [`HermesError`] type, which is the standard error
//! type used throughout the Hermes dispatch runtime. Every failure a caller
//! can observe maps onto exactly one variant, and every variant carries a
//! stable machine-readable code plus a process exit code so that embedding
//! CLIs and RPC façades can surface the taxonomy one-to-one.
//!
//! # Sanitized surface
//!
//! Dispatchers running in sanitized mode call [`HermesError::sanitized`] at
//! the boundary: caller-actionable kinds (validation, authentication,
//! traffic control, cancellation) pass through unchanged, while kinds that
//! could leak handler internals collapse into an opaque
//! [`HermesError::ExecutionFailed`] envelope.

use serde::{Deserialize, Serialize};
use std::time::Duration;
use thiserror::Error;

/// Result type alias using [`HermesError`].
pub type HermesResult<T> = Result<T, HermesError>;

/// Categories of errors for classification and handling.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum ErrorCategory {
    /// Dispatch routing errors (no pipeline for the command type).
    Routing,
    /// Registration errors (duplicate pipeline binding).
    Registration,
    /// Command validation errors.
    Validation,
    /// Authentication errors (missing or invalid credentials).
    Authentication,
    /// Authorization errors (insufficient permissions).
    Authorization,
    /// Security policy violations (size/length/content rules).
    Security,
    /// Traffic control rejections (rate limits, back-pressure).
    Traffic,
    /// Resilience outcomes (open breaker, exhausted retries).
    Resilience,
    /// Cooperative cancellation, including deadline expiry.
    Cancelled,
    /// Cryptographic failures (encryption or decryption).
    Crypto,
    /// Payload transformation failures (compression or decompression).
    Payload,
    /// Cache serialization or backend failures.
    Cache,
    /// Internal execution failures.
    Internal,
}

/// Reasons a command field can fail validation.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case", tag = "kind", content = "detail")]
pub enum ValidationReason {
    /// A required field was absent or empty.
    MissingRequired,
    /// The value is not a well-formed email address.
    InvalidEmail,
    /// The value does not match the expected format.
    InvalidFormat {
        /// A human-readable description of the expected format.
        expected: String,
    },
    /// The value exceeds the maximum allowed length.
    TooLong {
        /// Maximum length, inclusive.
        max: usize,
    },
    /// The value is shorter than the minimum required length.
    TooShort {
        /// Minimum length, inclusive.
        min: usize,
    },
    /// The value contains characters outside the allowed set.
    InvalidCharacters,
    /// The value does not meet password strength requirements.
    WeakPassword,
    /// A domain-specific rule failed.
    Custom(String),
}

impl std::fmt::Display for ValidationReason {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            Self::MissingRequired => write!(f, "required value is missing"),
            Self::InvalidEmail => write!(f, "invalid email address"),
            Self::InvalidFormat { expected } => write!(f, "invalid format, expected {expected}"),
            Self::TooLong { max } => write!(f, "value exceeds maximum length of {max}"),
            Self::TooShort { min } => write!(f, "value is shorter than minimum length of {min}"),
            Self::InvalidCharacters => write!(f, "value contains invalid characters"),
            Self::WeakPassword => write!(f, "password does not meet strength requirements"),
            Self::Custom(msg) => write!(f, "{msg}"),
        }
    }
}

/// Reasons a cache interaction can fail.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case", tag = "kind", content = "detail")]
pub enum CacheReason {
    /// The cached value could not be serialized or deserialized.
    Serialization(String),
    /// The cache backend reported an error.
    Backend(String),
}

impl std::fmt::Display for CacheReason {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            Self::Serialization(msg) => write!(f, "serialization failed: {msg}"),
            Self::Backend(msg) => write!(f, "backend error: {msg}"),
        }
    }
}

/// Terminal outcomes of the resilience layer.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case", tag = "kind")]
pub enum ResilienceReason {
    /// Every permitted attempt failed.
    RetriesExhausted {
        /// Number of attempts performed.
        attempts: u32,
    },
    /// The circuit breaker rejected the attempt.
    BreakerOpen,
}

impl std::fmt::Display for ResilienceReason {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            Self::RetriesExhausted { attempts } => {
                write!(f, "all {attempts} attempts failed")
            }
            Self::BreakerOpen => write!(f, "circuit breaker is open"),
        }
    }
}

/// Standard error type for Hermes.
///
/// `HermesError` provides structured errors with:
/// - Error categorization via [`ErrorCategory`]
/// - Stable machine-readable codes and process exit codes
/// - Serializable error envelope for embedding façades
/// - Error chaining support on the opaque internal variant
///
/// # Example
///
/// ```
/// use hermes_core::{HermesError, ErrorCategory};
///
/// fn resolve(command: &str) -> Result<(), HermesError> {
///     Err(HermesError::handler_not_found(command))
/// }
///
/// let err = resolve("CreateUser").unwrap_err();
/// assert_eq!(err.category(), ErrorCategory::Routing);
/// ```
#[derive(Error, Debug)]
pub enum HermesError {
    /// No pipeline is registered for the command's type.
    #[error("No handler registered for command '{command}'")]
    HandlerNotFound {
        /// The command type name.
        command: String,
    },

    /// A pipeline is already registered for the command's type.
    #[error("Command '{command}' is already registered")]
    AlreadyRegistered {
        /// The command type name.
        command: String,
    },

    /// Command validation failed.
    #[error("Validation error{}: {reason}", .field.as_deref().map(|f| format!(" on field '{f}'")).unwrap_or_default())]
    Validation {
        /// The field that failed validation, when known.
        field: Option<String>,
        /// The validation failure reason.
        reason: ValidationReason,
    },

    /// Authentication failed.
    #[error("Authentication error: {message}")]
    Authentication {
        /// Human-readable error message.
        message: String,
    },

    /// Authorization denied.
    #[error("Authorization denied: required '{required}', actual '{actual}'")]
    Authorization {
        /// The permission that was required.
        required: String,
        /// The permission the caller actually held.
        actual: String,
    },

    /// A security policy rule was broken.
    #[error("Security policy violation: {message}")]
    SecurityPolicy {
        /// Human-readable error message.
        message: String,
    },

    /// Traffic control rejected the command.
    #[error("Rate limit exceeded: {message}")]
    RateLimitExceeded {
        /// Human-readable error message.
        message: String,
        /// Time until the limiter admits the caller again.
        retry_after: Option<Duration>,
    },

    /// The circuit breaker is open.
    #[error("Circuit breaker is open")]
    CircuitBreakerOpen {
        /// Time until the breaker will admit a probe.
        retry_after: Option<Duration>,
    },

    /// Back-pressure queue is at capacity.
    #[error("Dispatch queue is full")]
    QueueFull,

    /// The caller's wait for admission timed out.
    #[error("Timed out after {waited:?} waiting for dispatch capacity")]
    Timeout {
        /// How long the caller waited before giving up.
        waited: Duration,
    },

    /// The command was shed by the drop back-pressure strategy.
    #[error("Command was dropped by back-pressure policy")]
    CommandDropped,

    /// The execution was cancelled cooperatively, including by deadline.
    #[error("Execution cancelled{}", .context.as_deref().map(|c| format!(": {c}")).unwrap_or_default())]
    Cancelled {
        /// Optional context describing the cancellation source.
        context: Option<String>,
    },

    /// Encryption failed.
    #[error("Encryption failed: {message}")]
    Encryption {
        /// Human-readable error message.
        message: String,
    },

    /// Decryption failed (missing key, algorithm mismatch, tag mismatch).
    #[error("Decryption failed: {message}")]
    Decryption {
        /// Human-readable error message.
        message: String,
    },

    /// Compression failed.
    #[error("Compression failed: {message}")]
    Compression {
        /// Human-readable error message.
        message: String,
    },

    /// Decompression failed.
    #[error("Decompression failed: {message}")]
    Decompression {
        /// Human-readable error message.
        message: String,
    },

    /// A cache interaction failed.
    ///
    /// Cacheable commands must expose an explicit `cache_key()`; keys are
    /// never derived from structural hashes of a command's representation.
    #[error("Cache error: {reason}")]
    Cache {
        /// The cache failure reason.
        reason: CacheReason,
    },

    /// A resilience policy reached a terminal outcome.
    #[error("Resilience: {reason}")]
    Resilience {
        /// The terminal resilience outcome.
        reason: ResilienceReason,
    },

    /// A generic wrap for handler-raised errors in sanitized mode.
    #[error("Execution failed: {message}")]
    ExecutionFailed {
        /// Human-readable error message.
        message: String,
        /// The underlying error (not exposed to callers in sanitized mode).
        #[source]
        source: Option<anyhow::Error>,
    },
}

impl HermesError {
    /// Creates a handler-not-found error.
    #[must_use]
    pub fn handler_not_found(command: impl Into<String>) -> Self {
        Self::HandlerNotFound {
            command: command.into(),
        }
    }

    /// Creates a duplicate-registration error.
    #[must_use]
    pub fn already_registered(command: impl Into<String>) -> Self {
        Self::AlreadyRegistered {
            command: command.into(),
        }
    }

    /// Creates a validation error without field context.
    #[must_use]
    pub fn validation(reason: ValidationReason) -> Self {
        Self::Validation {
            field: None,
            reason,
        }
    }

    /// Creates a validation error for a specific field.
    #[must_use]
    pub fn validation_field(field: impl Into<String>, reason: ValidationReason) -> Self {
        Self::Validation {
            field: Some(field.into()),
            reason,
        }
    }

    /// Creates an authentication error.
    #[must_use]
    pub fn authentication(message: impl Into<String>) -> Self {
        Self::Authentication {
            message: message.into(),
        }
    }

    /// Creates an authorization error.
    #[must_use]
    pub fn authorization(required: impl Into<String>, actual: impl Into<String>) -> Self {
        Self::Authorization {
            required: required.into(),
            actual: actual.into(),
        }
    }

    /// Creates a security policy error.
    #[must_use]
    pub fn security_policy(message: impl Into<String>) -> Self {
        Self::SecurityPolicy {
            message: message.into(),
        }
    }

    /// Creates a rate-limited error.
    #[must_use]
    pub fn rate_limited(message: impl Into<String>, retry_after: Option<Duration>) -> Self {
        Self::RateLimitExceeded {
            message: message.into(),
            retry_after,
        }
    }

    /// Creates an open-breaker error.
    #[must_use]
    pub fn breaker_open(retry_after: Option<Duration>) -> Self {
        Self::CircuitBreakerOpen { retry_after }
    }

    /// Creates a cancelled error without context.
    #[must_use]
    pub fn cancelled() -> Self {
        Self::Cancelled { context: None }
    }

    /// Creates a cancelled error with context describing the source.
    #[must_use]
    pub fn cancelled_with(context: impl Into<String>) -> Self {
        Self::Cancelled {
            context: Some(context.into()),
        }
    }

    /// Creates an encryption error.
    #[must_use]
    pub fn encryption(message: impl Into<String>) -> Self {
        Self::Encryption {
            message: message.into(),
        }
    }

    /// Creates a decryption error.
    #[must_use]
    pub fn decryption(message: impl Into<String>) -> Self {
        Self::Decryption {
            message: message.into(),
        }
    }

    /// Creates a compression error.
    #[must_use]
    pub fn compression(message: impl Into<String>) -> Self {
        Self::Compression {
            message: message.into(),
        }
    }

    /// Creates a decompression error.
    #[must_use]
    pub fn decompression(message: impl Into<String>) -> Self {
        Self::Decompression {
            message: message.into(),
        }
    }

    /// Creates a cache error.
    #[must_use]
    pub fn cache(reason: CacheReason) -> Self {
        Self::Cache { reason }
    }

    /// Creates a retries-exhausted resilience error.
    #[must_use]
    pub fn retries_exhausted(attempts: u32) -> Self {
        Self::Resilience {
            reason: ResilienceReason::RetriesExhausted { attempts },
        }
    }

    /// Creates an execution-failed error.
    #[must_use]
    pub fn execution_failed(message: impl Into<String>) -> Self {
        Self::ExecutionFailed {
            message: message.into(),
            source: None,
        }
    }

    /// Creates an execution-failed error with a source error.
    pub fn execution_failed_with_source(
        message: impl Into<String>,
        source: impl Into<anyhow::Error>,
    ) -> Self {
        Self::ExecutionFailed {
            message: message.into(),
            source: Some(source.into()),
        }
    }

    /// Returns the error category.
    #[must_use]
    pub const fn category(&self) -> ErrorCategory {
        match self {
            Self::HandlerNotFound { .. } => ErrorCategory::Routing,
            Self::AlreadyRegistered { .. } => ErrorCategory::Registration,
            Self::Validation { .. } => ErrorCategory::Validation,
            Self::Authentication { .. } => ErrorCategory::Authentication,
            Self::Authorization { .. } => ErrorCategory::Authorization,
            Self::SecurityPolicy { .. } => ErrorCategory::Security,
            Self::RateLimitExceeded { .. }
            | Self::QueueFull
            | Self::Timeout { .. }
            | Self::CommandDropped => ErrorCategory::Traffic,
            Self::CircuitBreakerOpen { .. } | Self::Resilience { .. } => ErrorCategory::Resilience,
            Self::Cancelled { .. } => ErrorCategory::Cancelled,
            Self::Encryption { .. } | Self::Decryption { .. } => ErrorCategory::Crypto,
            Self::Compression { .. } | Self::Decompression { .. } => ErrorCategory::Payload,
            Self::Cache { .. } => ErrorCategory::Cache,
            Self::ExecutionFailed { .. } => ErrorCategory::Internal,
        }
    }

    /// Returns the stable machine-readable error code.
    #[must_use]
    pub const fn code(&self) -> &'static str {
        match self {
            Self::HandlerNotFound { .. } => "HANDLER_NOT_FOUND",
            Self::AlreadyRegistered { .. } => "ALREADY_REGISTERED",
            Self::Validation { .. } => "VALIDATION_ERROR",
            Self::Authentication { .. } => "AUTHENTICATION_ERROR",
            Self::Authorization { .. } => "AUTHORIZATION_DENIED",
            Self::SecurityPolicy { .. } => "SECURITY_POLICY_VIOLATION",
            Self::RateLimitExceeded { .. } => "RATE_LIMIT_EXCEEDED",
            Self::CircuitBreakerOpen { .. } => "CIRCUIT_BREAKER_OPEN",
            Self::QueueFull => "QUEUE_FULL",
            Self::Timeout { .. } => "TIMEOUT",
            Self::CommandDropped => "COMMAND_DROPPED",
            Self::Cancelled { .. } => "CANCELLED",
            Self::Encryption { .. } => "ENCRYPTION_FAILED",
            Self::Decryption { .. } => "DECRYPTION_FAILED",
            Self::Compression { .. } => "COMPRESSION_FAILED",
            Self::Decompression { .. } => "DECOMPRESSION_FAILED",
            Self::Cache { .. } => "CACHE_ERROR",
            Self::Resilience { .. } => "RESILIENCE_ERROR",
            Self::ExecutionFailed { .. } => "EXECUTION_FAILED",
        }
    }

    /// Returns the process exit code for this error.
    ///
    /// Embedding CLI façades map the taxonomy one-to-one onto exit codes.
    #[must_use]
    pub const fn exit_code(&self) -> i32 {
        match self {
            Self::HandlerNotFound { .. } => 2,
            Self::AlreadyRegistered { .. } => 3,
            Self::Validation { .. } => 4,
            Self::Authentication { .. } => 5,
            Self::Authorization { .. } => 6,
            Self::SecurityPolicy { .. } => 7,
            Self::RateLimitExceeded { .. } => 8,
            Self::CircuitBreakerOpen { .. } => 9,
            Self::QueueFull => 10,
            Self::Timeout { .. } => 11,
            Self::CommandDropped => 12,
            Self::Cancelled { .. } => 13,
            Self::Encryption { .. } => 14,
            Self::Decryption { .. } => 15,
            Self::Compression { .. } => 16,
            Self::Decompression { .. } => 17,
            Self::Cache { .. } => 18,
            Self::Resilience { .. } => 19,
            Self::ExecutionFailed { .. } => 1,
        }
    }

    /// Returns `true` if this error is a cooperative cancellation.
    ///
    /// Cancellations are never retried and never count as circuit-breaker
    /// failures.
    #[must_use]
    pub const fn is_cancelled(&self) -> bool {
        matches!(self, Self::Cancelled { .. })
    }

    /// Returns `true` if this error is transient and safe to retry by
    /// default.
    #[must_use]
    pub const fn is_transient(&self) -> bool {
        matches!(
            self,
            Self::QueueFull | Self::Timeout { .. } | Self::RateLimitExceeded { .. }
        )
    }

    /// Projects this error onto the sanitized dispatcher surface.
    ///
    /// Caller-actionable kinds pass through unchanged. Kinds that can carry
    /// handler or backend internals collapse into an opaque
    /// [`HermesError::ExecutionFailed`] with the source dropped.
    #[must_use]
    pub fn sanitized(self) -> Self {
        match self {
            Self::ExecutionFailed { .. }
            | Self::Encryption { .. }
            | Self::Decryption { .. }
            | Self::Compression { .. }
            | Self::Decompression { .. }
            | Self::Cache { .. } => Self::execution_failed("command execution failed"),
            other => other,
        }
    }

    /// Converts this error to a serializable error envelope.
    #[must_use]
    pub fn to_envelope(&self, execution_id: Option<&str>) -> ErrorEnvelope {
        ErrorEnvelope {
            error: ErrorDetail {
                code: self.code().to_string(),
                message: self.to_string(),
                category: self.category(),
                details: self.error_details(),
            },
            execution_id: execution_id.map(ToString::to_string),
        }
    }

    /// Returns additional error details for the envelope.
    fn error_details(&self) -> Option<serde_json::Value> {
        match self {
            Self::Validation { field, reason } => Some(serde_json::json!({
                "field": field,
                "reason": reason,
            })),
            Self::Authorization { required, actual } => Some(serde_json::json!({
                "required": required,
                "actual": actual,
            })),
            Self::RateLimitExceeded {
                retry_after: Some(after),
                ..
            }
            | Self::CircuitBreakerOpen {
                retry_after: Some(after),
            } => Some(serde_json::json!({
                "retry_after_seconds": after.as_secs_f64(),
            })),
            Self::Timeout { waited } => Some(serde_json::json!({
                "waited_seconds": waited.as_secs_f64(),
            })),
            Self::Cache { reason } => serde_json::to_value(reason).ok(),
            Self::Resilience { reason } => serde_json::to_value(reason).ok(),
            _ => None,
        }
    }
}

/// Serializable error envelope for embedding façades.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct ErrorEnvelope {
    /// The error details.
    pub error: ErrorDetail,
    /// The execution ID for correlation.
    #[serde(skip_serializing_if = "Option::is_none")]
    pub execution_id: Option<String>,
}

/// Error detail within an envelope.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct ErrorDetail {
    /// Machine-readable error code.
    pub code: String,
    /// Human-readable error message.
    pub message: String,
    /// Error category.
    pub category: ErrorCategory,
    /// Additional error details.
    #[serde(skip_serializing_if = "Option::is_none")]
    pub details: Option<serde_json::Value>,
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_validation_error() {
        let error = HermesError::validation_field("email", ValidationReason::InvalidEmail);
        assert_eq!(error.category(), ErrorCategory::Validation);
        assert_eq!(error.code(), "VALIDATION_ERROR");
        assert!(error.to_string().contains("email"));
    }

    #[test]
    fn test_validation_reason_display() {
        assert_eq!(
            ValidationReason::TooLong { max: 64 }.to_string(),
            "value exceeds maximum length of 64"
        );
        assert_eq!(
            ValidationReason::InvalidFormat {
                expected: "ISO-8601".to_string()
            }
            .to_string(),
            "invalid format, expected ISO-8601"
        );
    }

    #[test]
    fn test_authorization_error() {
        let error = HermesError::authorization("admin", "viewer");
        assert_eq!(error.category(), ErrorCategory::Authorization);
        assert!(error.to_string().contains("admin"));
        assert!(error.to_string().contains("viewer"));
    }

    #[test]
    fn test_rate_limited_envelope() {
        let error = HermesError::rate_limited("too many requests", Some(Duration::from_secs(60)));
        let envelope = error.to_envelope(None);
        let details = envelope.error.details.unwrap();
        assert!((details["retry_after_seconds"].as_f64().unwrap() - 60.0).abs() < f64::EPSILON);
    }

    #[test]
    fn test_cancelled_is_never_transient() {
        let error = HermesError::cancelled();
        assert!(error.is_cancelled());
        assert!(!error.is_transient());
    }

    #[test]
    fn test_transient_classification() {
        assert!(HermesError::QueueFull.is_transient());
        assert!(HermesError::Timeout {
            waited: Duration::from_secs(1)
        }
        .is_transient());
        assert!(!HermesError::handler_not_found("X").is_transient());
        assert!(!HermesError::execution_failed("boom").is_transient());
    }

    #[test]
    fn test_sanitized_passes_through_caller_errors() {
        let error = HermesError::validation(ValidationReason::MissingRequired).sanitized();
        assert!(matches!(error, HermesError::Validation { .. }));

        let error = HermesError::cancelled().sanitized();
        assert!(error.is_cancelled());
    }

    #[test]
    fn test_sanitized_scrubs_internals() {
        let error = HermesError::execution_failed_with_source(
            "database constraint violated on users_pkey",
            std::io::Error::new(std::io::ErrorKind::Other, "pg: duplicate key"),
        )
        .sanitized();

        match error {
            HermesError::ExecutionFailed { message, source } => {
                assert_eq!(message, "command execution failed");
                assert!(source.is_none());
            }
            other => panic!("expected ExecutionFailed, got {other:?}"),
        }
    }

    #[test]
    fn test_envelope_serialization() {
        let error = HermesError::handler_not_found("CreateUser");
        let envelope = error.to_envelope(Some("exec-123"));

        let json = serde_json::to_string(&envelope).expect("serialization should work");
        assert!(json.contains("\"code\":\"HANDLER_NOT_FOUND\""));
        assert!(json.contains("\"execution_id\":\"exec-123\""));
        assert!(json.contains("\"category\":\"routing\""));
    }

    #[test]
    fn test_exit_codes_are_distinct() {
        let errors = [
            HermesError::handler_not_found("X"),
            HermesError::already_registered("X"),
            HermesError::validation(ValidationReason::MissingRequired),
            HermesError::authentication("no token"),
            HermesError::authorization("a", "b"),
            HermesError::security_policy("too large"),
            HermesError::rate_limited("limited", None),
            HermesError::breaker_open(None),
            HermesError::QueueFull,
            HermesError::Timeout {
                waited: Duration::ZERO,
            },
            HermesError::CommandDropped,
            HermesError::cancelled(),
            HermesError::encryption("bad key"),
            HermesError::decryption("tag mismatch"),
            HermesError::compression("deflate failed"),
            HermesError::decompression("truncated"),
            HermesError::cache(CacheReason::Backend("down".to_string())),
            HermesError::retries_exhausted(3),
            HermesError::execution_failed("boom"),
        ];

        let mut codes: Vec<i32> = errors.iter().map(HermesError::exit_code).collect();
        codes.sort_unstable();
        codes.dedup();
        assert_eq!(codes.len(), errors.len(), "exit codes must be distinct");
    }
}
