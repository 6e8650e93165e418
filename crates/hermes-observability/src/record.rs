//! Execution records.
//!
//! One [`ExecutionRecord`] is produced per dispatch: identity, timing,
//! outcome, the middleware stages entered, and the context annotations at
//! completion time. Records are serializable diagnostics artefacts.

use chrono::{DateTime, Utc};
use hermes_core::{CommandMetadata, ExecutionId, HermesError};
use serde::{Deserialize, Serialize};
use std::collections::HashMap;
use std::time::Duration;

/// A diagnostic artefact describing one completed dispatch.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct ExecutionRecord {
    /// The execution's unique ID.
    pub id: ExecutionId,

    /// The command type name.
    pub command: String,

    /// The correlation ID, when provided.
    pub correlation_id: Option<String>,

    /// When the dispatch entered the pipeline.
    pub started_at: DateTime<Utc>,

    /// When the dispatch completed.
    pub completed_at: DateTime<Utc>,

    /// Whether the dispatch produced a result.
    pub succeeded: bool,

    /// The error code, when the dispatch failed.
    pub error_code: Option<String>,

    /// The error message, when the dispatch failed.
    pub error_message: Option<String>,

    /// Middleware stages entered, in chain order.
    pub middleware_trace: Vec<String>,

    /// Context annotations at completion time.
    pub annotations: HashMap<String, serde_json::Value>,
}

impl ExecutionRecord {
    /// Builds a success record.
    #[must_use]
    pub fn success(
        metadata: &CommandMetadata,
        command: &str,
        started_at: DateTime<Utc>,
        completed_at: DateTime<Utc>,
    ) -> Self {
        Self {
            id: metadata.id(),
            command: command.to_string(),
            correlation_id: metadata.correlation_id().map(ToString::to_string),
            started_at,
            completed_at,
            succeeded: true,
            error_code: None,
            error_message: None,
            middleware_trace: Vec::new(),
            annotations: HashMap::new(),
        }
    }

    /// Builds a failure record.
    #[must_use]
    pub fn failure(
        metadata: &CommandMetadata,
        command: &str,
        started_at: DateTime<Utc>,
        completed_at: DateTime<Utc>,
        error: &HermesError,
    ) -> Self {
        Self {
            id: metadata.id(),
            command: command.to_string(),
            correlation_id: metadata.correlation_id().map(ToString::to_string),
            started_at,
            completed_at,
            succeeded: false,
            error_code: Some(error.code().to_string()),
            error_message: Some(error.to_string()),
            middleware_trace: Vec::new(),
            annotations: HashMap::new(),
        }
    }

    /// Attaches the middleware trace.
    #[must_use]
    pub fn with_middleware_trace(mut self, trace: Vec<String>) -> Self {
        self.middleware_trace = trace;
        self
    }

    /// Attaches the context annotations.
    #[must_use]
    pub fn with_annotations(mut self, annotations: HashMap<String, serde_json::Value>) -> Self {
        self.annotations = annotations;
        self
    }

    /// Returns the execution duration.
    #[must_use]
    pub fn duration(&self) -> Duration {
        (self.completed_at - self.started_at)
            .to_std()
            .unwrap_or(Duration::ZERO)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use chrono::TimeDelta;

    #[test]
    fn test_success_record() {
        let metadata = CommandMetadata::new().with_correlation_id("corr-1");
        let started = Utc::now();
        let completed = started + TimeDelta::milliseconds(25);

        let record = ExecutionRecord::success(&metadata, "Ping", started, completed)
            .with_middleware_trace(vec!["logging".to_string()]);

        assert!(record.succeeded);
        assert_eq!(record.id, metadata.id());
        assert_eq!(record.correlation_id.as_deref(), Some("corr-1"));
        assert_eq!(record.duration(), Duration::from_millis(25));
        assert_eq!(record.middleware_trace, ["logging"]);
    }

    #[test]
    fn test_failure_record() {
        let metadata = CommandMetadata::new();
        let now = Utc::now();
        let error = HermesError::handler_not_found("Ping");

        let record = ExecutionRecord::failure(&metadata, "Ping", now, now, &error);
        assert!(!record.succeeded);
        assert_eq!(record.error_code.as_deref(), Some("HANDLER_NOT_FOUND"));
        assert!(record.error_message.unwrap().contains("Ping"));
    }

    #[test]
    fn test_record_serializes() {
        let metadata = CommandMetadata::new();
        let now = Utc::now();
        let record = ExecutionRecord::success(&metadata, "Ping", now, now);

        let json = serde_json::to_string(&record).expect("serialize");
        assert!(json.contains("\"command\":\"Ping\""));
    }

    #[test]
    fn test_duration_never_negative() {
        let metadata = CommandMetadata::new();
        let now = Utc::now();
        let record =
            ExecutionRecord::success(&metadata, "Ping", now, now - TimeDelta::seconds(1));
        assert_eq!(record.duration(), Duration::ZERO);
    }
}
