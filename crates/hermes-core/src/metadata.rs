//! Execution identity and metadata.
//!
//! [`CommandMetadata`] is the immutable identity record attached to every
//! dispatched command: who sent it, when, and how to correlate it across
//! systems. It is created at dispatch time and never mutated afterwards.

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use std::collections::BTreeMap;
use uuid::Uuid;

/// A unique identifier for each execution, using UUID v7.
///
/// UUID v7 is time-ordered, which makes it ideal for execution tracking
/// and log correlation.
///
/// # Example
///
/// ```
/// use hermes_core::ExecutionId;
///
/// let id = ExecutionId::new();
/// println!("Execution ID: {}", id);
/// ```
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(transparent)]
pub struct ExecutionId(Uuid);

impl ExecutionId {
    /// Creates a new unique execution ID using UUID v7.
    #[must_use]
    pub fn new() -> Self {
        Self(Uuid::now_v7())
    }

    /// Creates an `ExecutionId` from an existing UUID.
    #[must_use]
    pub const fn from_uuid(uuid: Uuid) -> Self {
        Self(uuid)
    }

    /// Returns the underlying UUID.
    #[must_use]
    pub const fn as_uuid(&self) -> &Uuid {
        &self.0
    }
}

impl Default for ExecutionId {
    fn default() -> Self {
        Self::new()
    }
}

impl std::fmt::Display for ExecutionId {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        write!(f, "{}", self.0)
    }
}

impl From<Uuid> for ExecutionId {
    fn from(uuid: Uuid) -> Self {
        Self(uuid)
    }
}

impl From<ExecutionId> for Uuid {
    fn from(id: ExecutionId) -> Self {
        id.0
    }
}

/// Immutable identity record for one command execution.
///
/// Metadata is created by the caller (or defaulted by the bus) at dispatch
/// time and flows unchanged through the middleware chain and into
/// diagnostics.
///
/// # Example
///
/// ```
/// use hermes_core::CommandMetadata;
///
/// let metadata = CommandMetadata::new()
///     .with_correlation_id("order-flow-7")
///     .with_user_id("user-42")
///     .with_tag("tenant", "acme");
///
/// assert_eq!(metadata.user_id(), Some("user-42"));
/// ```
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct CommandMetadata {
    /// Unique identifier for this execution.
    id: ExecutionId,

    /// Correlation ID for tracing across executions.
    correlation_id: Option<String>,

    /// The identity of the caller, when known.
    user_id: Option<String>,

    /// When the command was issued.
    issued_at: DateTime<Utc>,

    /// Free-form name/tag set.
    tags: BTreeMap<String, String>,
}

impl CommandMetadata {
    /// Creates metadata with a fresh execution ID and the current time.
    #[must_use]
    pub fn new() -> Self {
        Self {
            id: ExecutionId::new(),
            correlation_id: None,
            user_id: None,
            issued_at: Utc::now(),
            tags: BTreeMap::new(),
        }
    }

    /// Returns metadata with the specified correlation ID.
    #[must_use]
    pub fn with_correlation_id(mut self, correlation_id: impl Into<String>) -> Self {
        self.correlation_id = Some(correlation_id.into());
        self
    }

    /// Returns metadata with the specified user ID.
    #[must_use]
    pub fn with_user_id(mut self, user_id: impl Into<String>) -> Self {
        self.user_id = Some(user_id.into());
        self
    }

    /// Returns metadata with an additional tag.
    #[must_use]
    pub fn with_tag(mut self, name: impl Into<String>, value: impl Into<String>) -> Self {
        self.tags.insert(name.into(), value.into());
        self
    }

    /// Returns the execution ID.
    #[must_use]
    pub const fn id(&self) -> ExecutionId {
        self.id
    }

    /// Returns the correlation ID if set.
    #[must_use]
    pub fn correlation_id(&self) -> Option<&str> {
        self.correlation_id.as_deref()
    }

    /// Returns the user ID if set.
    #[must_use]
    pub fn user_id(&self) -> Option<&str> {
        self.user_id.as_deref()
    }

    /// Returns when the command was issued.
    #[must_use]
    pub const fn issued_at(&self) -> DateTime<Utc> {
        self.issued_at
    }

    /// Returns a tag value by name.
    #[must_use]
    pub fn tag(&self, name: &str) -> Option<&str> {
        self.tags.get(name).map(String::as_str)
    }

    /// Returns all tags.
    #[must_use]
    pub const fn tags(&self) -> &BTreeMap<String, String> {
        &self.tags
    }
}

impl Default for CommandMetadata {
    fn default() -> Self {
        Self::new()
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_execution_id_unique() {
        let a = ExecutionId::new();
        let b = ExecutionId::new();
        assert_ne!(a, b, "each ExecutionId should be unique");
    }

    #[test]
    fn test_execution_id_display() {
        let id = ExecutionId::new();
        let display = id.to_string();
        assert_eq!(display.len(), 36, "UUID string should be 36 characters");
        assert!(display.contains('-'));
    }

    #[test]
    fn test_execution_id_serialization() {
        let id = ExecutionId::new();
        let json = serde_json::to_string(&id).expect("serialization should work");
        let parsed: ExecutionId = serde_json::from_str(&json).expect("deserialization should work");
        assert_eq!(id, parsed);
    }

    #[test]
    fn test_metadata_defaults() {
        let metadata = CommandMetadata::new();
        assert!(metadata.correlation_id().is_none());
        assert!(metadata.user_id().is_none());
        assert!(metadata.tags().is_empty());
    }

    #[test]
    fn test_metadata_builder_pattern() {
        let metadata = CommandMetadata::new()
            .with_correlation_id("corr-1")
            .with_user_id("user-1")
            .with_tag("env", "prod")
            .with_tag("tenant", "acme");

        assert_eq!(metadata.correlation_id(), Some("corr-1"));
        assert_eq!(metadata.user_id(), Some("user-1"));
        assert_eq!(metadata.tag("env"), Some("prod"));
        assert_eq!(metadata.tag("tenant"), Some("acme"));
        assert_eq!(metadata.tag("missing"), None);
    }

    #[test]
    fn test_metadata_roundtrip() {
        let metadata = CommandMetadata::new().with_user_id("user-9");
        let json = serde_json::to_string(&metadata).expect("serialize");
        let parsed: CommandMetadata = serde_json::from_str(&json).expect("deserialize");
        assert_eq!(parsed.id(), metadata.id());
        assert_eq!(parsed.user_id(), Some("user-9"));
    }
}
