//! Error types for quizgen.

use serde::Serialize;
use thiserror::Error;
use uuid::Uuid;

/// Result type alias using quizgen's Error type.
pub type Result<T> = std::result::Result<T, Error>;

/// Coarse error classification surfaced to callers.
///
/// Hosts map these onto their own transport (HTTP status, exception class).
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize)]
#[serde(rename_all = "snake_case")]
pub enum ErrorKind {
    /// A configuration invariant or input rule was violated.
    Validation,
    /// The requested transition is illegal in the entity's current state.
    Conflict,
    /// The referenced entity is absent or not owned by the caller.
    NotFound,
    /// An external collaborator (analysis, generation, store) failed.
    Upstream,
    /// A batch completed for some but not all targeted items.
    PartialFailure,
    /// The caller lacks the role required for the operation.
    Forbidden,
    /// Infrastructure or programming error.
    Internal,
}

/// One item a batched operation could not complete.
#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct FailedItem {
    pub id: String,
    pub reason: String,
}

/// Structured outcome of a batch that partially failed.
///
/// Carries enough detail for the caller to re-invoke the operation for the
/// remainder; re-invocation never repeats the succeeded items.
#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct PartialFailure {
    /// Operation name ("deploy", "repair").
    pub operation: String,
    pub succeeded: Vec<String>,
    pub failed: Vec<FailedItem>,
    /// Container created by the operation, if any (quiz id for deployments).
    #[serde(skip_serializing_if = "Option::is_none")]
    pub container_id: Option<i64>,
}

impl std::fmt::Display for PartialFailure {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        write!(
            f,
            "{} completed for {} item(s), failed for {}",
            self.operation,
            self.succeeded.len(),
            self.failed.len()
        )?;
        if let Some(container) = self.container_id {
            write!(f, " (container {})", container)?;
        }
        Ok(())
    }
}

/// Core error type for quizgen operations.
#[derive(Error, Debug)]
pub enum Error {
    /// Database operation failed (wraps sqlx::Error)
    #[error("Database error: {0}")]
    Database(#[from] sqlx::Error),

    /// Configuration invariant or input rule violated
    #[error("Validation error: {0}")]
    Validation(String),

    /// Regeneration ceiling reached for a question
    #[error("Regeneration limit exceeded for question {question_id}: {count} of {max} used")]
    RegenerationLimitExceeded {
        question_id: Uuid,
        count: u32,
        max: u32,
    },

    /// Illegal state transition
    #[error("Conflict: {0}")]
    Conflict(String),

    /// Resource absent or not owned by the caller
    #[error("Not found: {0}")]
    NotFound(String),

    /// External collaborator failed or timed out
    #[error("Upstream error: {0}")]
    Upstream(String),

    /// Upstream failure that moved a request to `failed`
    #[error("Request {request_id} failed: {message}")]
    RequestFailed { request_id: Uuid, message: String },

    /// Batch operation completed partially
    #[error("Partial failure: {0}")]
    PartialFailure(PartialFailure),

    /// Authenticated but not authorized
    #[error("Forbidden: {0}")]
    Forbidden(String),

    /// Serialization/deserialization error
    #[error("Serialization error: {0}")]
    Serialization(String),

    /// Configuration error
    #[error("Configuration error: {0}")]
    Config(String),

    /// HTTP/network request failed
    #[error("Request error: {0}")]
    Request(String),

    /// Internal error
    #[error("Internal error: {0}")]
    Internal(String),
}

impl Error {
    /// Classify this error into one of the caller-facing kinds.
    pub fn kind(&self) -> ErrorKind {
        match self {
            Error::Validation(_) | Error::RegenerationLimitExceeded { .. } => {
                ErrorKind::Validation
            }
            Error::Conflict(_) => ErrorKind::Conflict,
            Error::NotFound(_) => ErrorKind::NotFound,
            Error::Upstream(_) | Error::RequestFailed { .. } | Error::Request(_) => {
                ErrorKind::Upstream
            }
            Error::PartialFailure(_) => ErrorKind::PartialFailure,
            Error::Forbidden(_) => ErrorKind::Forbidden,
            Error::Database(_)
            | Error::Serialization(_)
            | Error::Config(_)
            | Error::Internal(_) => ErrorKind::Internal,
        }
    }

    /// Message to record on a failed request. Upstream text is kept verbatim.
    pub fn failure_message(&self) -> String {
        match self {
            Error::Upstream(msg) | Error::Request(msg) => msg.clone(),
            Error::RequestFailed { message, .. } => message.clone(),
            other => other.to_string(),
        }
    }
}

impl From<serde_json::Error> for Error {
    fn from(e: serde_json::Error) -> Self {
        Error::Serialization(e.to_string())
    }
}

impl From<reqwest::Error> for Error {
    fn from(e: reqwest::Error) -> Self {
        Error::Request(e.to_string())
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_error_display_validation() {
        let err = Error::Validation("type counts sum to 8, expected 10".to_string());
        assert_eq!(
            err.to_string(),
            "Validation error: type counts sum to 8, expected 10"
        );
    }

    #[test]
    fn test_regeneration_limit_is_validation_kind() {
        let err = Error::RegenerationLimitExceeded {
            question_id: Uuid::nil(),
            count: 5,
            max: 5,
        };
        assert_eq!(err.kind(), ErrorKind::Validation);
        assert!(err.to_string().contains("5 of 5"));
    }

    #[test]
    fn test_error_kinds() {
        assert_eq!(Error::Conflict("x".into()).kind(), ErrorKind::Conflict);
        assert_eq!(Error::NotFound("x".into()).kind(), ErrorKind::NotFound);
        assert_eq!(Error::Upstream("x".into()).kind(), ErrorKind::Upstream);
        assert_eq!(Error::Forbidden("x".into()).kind(), ErrorKind::Forbidden);
        assert_eq!(Error::Internal("x".into()).kind(), ErrorKind::Internal);
        assert_eq!(
            Error::RequestFailed {
                request_id: Uuid::nil(),
                message: "boom".into()
            }
            .kind(),
            ErrorKind::Upstream
        );
    }

    #[test]
    fn test_failure_message_preserves_upstream_text() {
        let err = Error::Upstream("AI topic analysis is temporarily unavailable".into());
        assert_eq!(
            err.failure_message(),
            "AI topic analysis is temporarily unavailable"
        );

        let err = Error::Validation("bad".into());
        assert_eq!(err.failure_message(), "Validation error: bad");
    }

    #[test]
    fn test_partial_failure_display() {
        let pf = PartialFailure {
            operation: "deploy".into(),
            succeeded: vec!["a".into(), "b".into()],
            failed: vec![FailedItem {
                id: "c".into(),
                reason: "attach failed".into(),
            }],
            container_id: Some(42),
        };
        let err = Error::PartialFailure(pf);
        assert_eq!(err.kind(), ErrorKind::PartialFailure);
        assert_eq!(
            err.to_string(),
            "Partial failure: deploy completed for 2 item(s), failed for 1 (container 42)"
        );
    }

    #[test]
    fn test_from_serde_json_error() {
        let json_err = serde_json::from_str::<i32>("not a number").unwrap_err();
        let err: Error = json_err.into();
        match err {
            Error::Serialization(msg) => assert!(!msg.is_empty()),
            _ => panic!("Expected Serialization error"),
        }
    }

    #[test]
    fn test_error_is_send_sync() {
        fn assert_send<T: Send>() {}
        fn assert_sync<T: Sync>() {}

        assert_send::<Error>();
        assert_sync::<Error>();
    }
}
