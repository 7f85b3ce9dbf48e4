//! Structured error types for pipeline operations
//!
//! Collaborator failures arrive as [`ServiceError`] payloads and are wrapped
//! into a [`PipelineError`] variant naming the operation that failed. Only
//! extraction and configuration errors abort a run; everything else is local
//! to one map or reduce invocation.

use crate::pipeline::StageType;
use serde::{Deserialize, Serialize};
use thiserror::Error;

/// Error payload returned by an external collaborator
#[derive(Debug, Clone, PartialEq, Eq, Error, Serialize, Deserialize)]
#[error("{code}: {message}")]
pub struct ServiceError {
    /// Machine-readable error code reported by the collaborator
    pub code: String,
    /// Human-readable description
    pub message: String,
}

impl ServiceError {
    pub fn new(code: impl Into<String>, message: impl Into<String>) -> Self {
        Self {
            code: code.into(),
            message: message.into(),
        }
    }
}

/// Main error type for pipeline operations
#[derive(Debug, Error)]
pub enum PipelineError {
    #[error("Query execution failed: {source}")]
    QueryExecution {
        query: String,
        #[source]
        source: ServiceError,
    },

    #[error("Extracted row {index} is not a valid deal record: {source}")]
    InvalidRecord {
        index: usize,
        #[source]
        source: serde_json::Error,
    },

    #[error("Failed to transform {from_type} {record_id} into {to_type}: {source}")]
    Transformation {
        record_id: String,
        from_type: String,
        to_type: String,
        #[source]
        source: ServiceError,
    },

    #[error("Failed to update {record_type} {record_id}: {source}")]
    Mutation {
        record_type: String,
        record_id: String,
        #[source]
        source: ServiceError,
    },

    #[error("Failed to notify {recipient} for {owner_key}: {source}")]
    Notification {
        owner_key: String,
        recipient: String,
        #[source]
        source: ServiceError,
    },

    #[error("Invalid pipeline configuration: {field}: {reason}")]
    InvalidConfiguration { field: String, reason: String },

    #[error("{stage} invocation for key {key} failed: {message}")]
    StageFailed {
        stage: StageType,
        key: String,
        message: String,
    },
}

/// Result type for pipeline operations
pub type PipelineResult<T> = Result<T, PipelineError>;

impl PipelineError {
    /// Whether this error aborts the whole run rather than a single invocation
    pub fn is_fatal(&self) -> bool {
        matches!(
            self,
            PipelineError::QueryExecution { .. } | PipelineError::InvalidConfiguration { .. }
        )
    }

    /// Short category name used in process log titles
    pub fn category(&self) -> &'static str {
        match self {
            PipelineError::QueryExecution { .. } => "QueryExecutionError",
            PipelineError::InvalidRecord { .. } => "InvalidRecordError",
            PipelineError::Transformation { .. } => "TransformationError",
            PipelineError::Mutation { .. } => "MutationError",
            PipelineError::Notification { .. } => "NotificationError",
            PipelineError::InvalidConfiguration { .. } => "ConfigurationError",
            PipelineError::StageFailed { .. } => "StageError",
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_only_query_and_config_errors_are_fatal() {
        let query = PipelineError::QueryExecution {
            query: "SELECT 1".to_string(),
            source: ServiceError::new("SSS_SEARCH_ERROR", "syntax"),
        };
        let transform = PipelineError::Transformation {
            record_id: "3".to_string(),
            from_type: "opportunity".to_string(),
            to_type: "salesorder".to_string(),
            source: ServiceError::new("INVALID_TRANS", "locked"),
        };
        let mutation = PipelineError::Mutation {
            record_type: "opportunity".to_string(),
            record_id: "1".to_string(),
            source: ServiceError::new("RCRD_LOCKED", "locked"),
        };
        let config = PipelineError::InvalidConfiguration {
            field: "runtime.map_concurrency".to_string(),
            reason: "must be greater than 0".to_string(),
        };

        let malformed = PipelineError::InvalidRecord {
            index: 1,
            source: serde_json::from_str::<u32>("\"x\"").unwrap_err(),
        };

        assert!(query.is_fatal());
        assert!(config.is_fatal());
        assert!(!malformed.is_fatal());
        assert!(!transform.is_fatal());
        assert!(!mutation.is_fatal());
    }

    #[test]
    fn test_error_messages_carry_collaborator_payload() {
        let err = PipelineError::Notification {
            owner_key: "A".to_string(),
            recipient: "a@x".to_string(),
            source: ServiceError::new("SMTP_DOWN", "relay unavailable"),
        };

        let message = err.to_string();
        assert!(message.contains("a@x"));
        assert!(message.contains("SMTP_DOWN: relay unavailable"));
        assert_eq!(err.category(), "NotificationError");
    }
}
