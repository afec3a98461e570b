//! Error types for reaper-daemon

use axum::{
    http::StatusCode,
    response::{IntoResponse, Response},
    Json,
};
use reaper_types::DurationParseError;
use serde::Serialize;
use std::time::Duration;
use thiserror::Error;

/// Daemon-level errors
#[derive(Debug, Error)]
pub enum DaemonError {
    /// Configuration error
    #[error("Configuration error: {0}")]
    Config(String),

    /// Server startup error
    #[error("Server error: {0}")]
    Server(String),

    /// Storage error
    #[error("Storage error: {0}")]
    Storage(#[from] StorageError),

    /// IO error
    #[error("IO error: {0}")]
    Io(#[from] std::io::Error),
}

impl From<config::ConfigError> for DaemonError {
    fn from(err: config::ConfigError) -> Self {
        DaemonError::Config(err.to_string())
    }
}

/// Storage-specific errors
#[derive(Debug, Error)]
pub enum StorageError {
    /// Item not found
    #[error("Not found: {0}")]
    NotFound(String),

    /// Connection error
    #[error("Connection error: {0}")]
    Connection(String),

    /// Query error
    #[error("Query error: {0}")]
    Query(String),
}

/// How the work queue should treat a failed reconciliation
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ErrorClass {
    /// Retrying later may succeed
    Transient,
    /// Retrying cannot succeed until the resource is changed
    Permanent,
}

/// Reconciliation failures
#[derive(Debug, Error)]
pub enum ReconcileError {
    #[error("getting resource from store: {0}")]
    Fetch(#[source] StorageError),

    #[error("deleting resource: {0}")]
    Delete(#[source] StorageError),

    #[error("{operation} cancelled")]
    Cancelled { operation: &'static str },

    #[error("{operation} exceeded deadline of {timeout:?}")]
    DeadlineExceeded {
        operation: &'static str,
        timeout: Duration,
    },

    #[error("failed parsing {annotation} with value {value:?}: {source}")]
    InvalidTtl {
        annotation: String,
        value: String,
        #[source]
        source: DurationParseError,
    },
}

impl ReconcileError {
    pub fn class(&self) -> ErrorClass {
        match self {
            ReconcileError::InvalidTtl { .. } => ErrorClass::Permanent,
            ReconcileError::Fetch(_)
            | ReconcileError::Delete(_)
            | ReconcileError::Cancelled { .. }
            | ReconcileError::DeadlineExceeded { .. } => ErrorClass::Transient,
        }
    }

    pub fn is_permanent(&self) -> bool {
        self.class() == ErrorClass::Permanent
    }
}

/// API-specific errors
#[derive(Debug, Error)]
pub enum ApiError {
    /// Resource not found
    #[error("Not found: {0}")]
    NotFound(String),

    /// Bad request
    #[error("Bad request: {0}")]
    BadRequest(String),

    /// Storage error
    #[error("Storage error: {0}")]
    Storage(#[from] StorageError),
}

/// Error response body
#[derive(Debug, Serialize)]
pub struct ErrorResponse {
    pub error: String,
    pub code: String,
}

impl IntoResponse for ApiError {
    fn into_response(self) -> Response {
        let (status, code) = match &self {
            ApiError::NotFound(_) => (StatusCode::NOT_FOUND, "NOT_FOUND"),
            ApiError::BadRequest(_) => (StatusCode::BAD_REQUEST, "BAD_REQUEST"),
            ApiError::Storage(StorageError::NotFound(_)) => (StatusCode::NOT_FOUND, "NOT_FOUND"),
            ApiError::Storage(_) => (StatusCode::INTERNAL_SERVER_ERROR, "STORAGE_ERROR"),
        };

        let body = ErrorResponse {
            error: self.to_string(),
            code: code.to_string(),
        };

        (status, Json(body)).into_response()
    }
}

/// Result type alias for API operations
pub type ApiResult<T> = Result<T, ApiError>;

/// Result type alias for daemon operations
pub type DaemonResult<T> = Result<T, DaemonError>;

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_api_error_status_codes() {
        assert_eq!(
            ApiError::NotFound("test".to_string()).into_response().status(),
            StatusCode::NOT_FOUND
        );
        assert_eq!(
            ApiError::BadRequest("test".to_string())
                .into_response()
                .status(),
            StatusCode::BAD_REQUEST
        );
        assert_eq!(
            ApiError::Storage(StorageError::Connection("down".to_string()))
                .into_response()
                .status(),
            StatusCode::INTERNAL_SERVER_ERROR
        );
        assert_eq!(
            ApiError::Storage(StorageError::NotFound("gone".to_string()))
                .into_response()
                .status(),
            StatusCode::NOT_FOUND
        );
    }

    #[test]
    fn test_reconcile_error_classes() {
        let invalid = ReconcileError::InvalidTtl {
            annotation: "ttl".to_string(),
            value: "bad".to_string(),
            source: DurationParseError::Empty,
        };
        assert_eq!(invalid.class(), ErrorClass::Permanent);
        assert!(invalid.to_string().contains("failed parsing ttl"));

        let cancelled = ReconcileError::Cancelled {
            operation: "deleting resource",
        };
        assert_eq!(cancelled.class(), ErrorClass::Transient);

        let fetch = ReconcileError::Fetch(StorageError::Connection("refused".to_string()));
        assert!(!fetch.is_permanent());
        assert_eq!(
            fetch.to_string(),
            "getting resource from store: Connection error: refused"
        );
    }
}
