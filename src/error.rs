//! Error types for the table engine.
//!
//! Two layers: [`StoreError`] is what the storage and table plumbing return
//! internally, [`ApiError`] is what crosses the engine boundary inside a
//! [`Response`](crate::types::Response) envelope.

use serde::{Deserialize, Serialize};
use thiserror::Error;

/// Internal error type for storage and table operations.
#[derive(Debug, Error)]
pub enum StoreError {
    #[error("IO error: {0}")]
    Io(#[from] std::io::Error),

    #[error("Serialization error: {0}")]
    Serialization(String),

    #[error("Deserialization error: {0}")]
    Deserialization(String),

    #[error("Storage is locked by another process")]
    Locked,

    #[error("Invalid storage key: {0}")]
    InvalidKey(String),

    #[error("Invalid operation: {0}")]
    InvalidOperation(String),
}

impl From<serde_json::Error> for StoreError {
    fn from(e: serde_json::Error) -> Self {
        StoreError::Serialization(e.to_string())
    }
}

/// Result type for storage and table operations.
pub type Result<T> = std::result::Result<T, StoreError>;

/// Category of a failure reported through a response envelope.
#[derive(Clone, Copy, Debug, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum ErrorKind {
    /// Referenced row, account, order or session is absent.
    NotFound,
    /// Duplicate registration or a transition out of a terminal state.
    Conflict,
    /// Unknown procedure name.
    Unsupported,
    /// Malformed payload or parameters.
    InvalidInput,
    /// Operation requires a signed-in session.
    Unauthorized,
    /// Engine-internal failure (persistence write, encoding).
    Internal,
}

impl ErrorKind {
    /// HTTP-like status code reported alongside this kind of failure.
    pub fn status(self) -> u16 {
        match self {
            ErrorKind::NotFound | ErrorKind::Unsupported => 404,
            ErrorKind::Conflict | ErrorKind::InvalidInput => 400,
            ErrorKind::Unauthorized => 401,
            ErrorKind::Internal => 500,
        }
    }
}

/// Error descriptor carried in the `error` field of a response.
#[derive(Clone, Debug, PartialEq, Eq, Error, Serialize, Deserialize)]
#[error("{message}")]
pub struct ApiError {
    pub kind: ErrorKind,
    pub message: String,
    pub details: String,
    pub hint: String,
    pub code: String,
}

impl ApiError {
    pub fn new(kind: ErrorKind, message: impl Into<String>) -> Self {
        Self {
            kind,
            message: message.into(),
            details: String::new(),
            hint: String::new(),
            code: kind.status().to_string(),
        }
    }

    pub fn not_found(message: impl Into<String>) -> Self {
        Self::new(ErrorKind::NotFound, message)
    }

    pub fn conflict(message: impl Into<String>) -> Self {
        Self::new(ErrorKind::Conflict, message)
    }

    pub fn unsupported(message: impl Into<String>) -> Self {
        Self::new(ErrorKind::Unsupported, message)
    }

    pub fn invalid_input(message: impl Into<String>) -> Self {
        Self::new(ErrorKind::InvalidInput, message)
    }

    pub fn unauthorized(message: impl Into<String>) -> Self {
        Self::new(ErrorKind::Unauthorized, message)
    }

    pub fn internal(message: impl Into<String>) -> Self {
        Self::new(ErrorKind::Internal, message)
    }

    /// Attach a details string.
    pub fn with_details(mut self, details: impl Into<String>) -> Self {
        self.details = details.into();
        self
    }

    /// Attach a hint string.
    pub fn with_hint(mut self, hint: impl Into<String>) -> Self {
        self.hint = hint.into();
        self
    }

    pub fn status(&self) -> u16 {
        self.kind.status()
    }
}

impl From<StoreError> for ApiError {
    fn from(e: StoreError) -> Self {
        ApiError::internal("Storage failure").with_details(e.to_string())
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_kind_status_codes() {
        assert_eq!(ErrorKind::NotFound.status(), 404);
        assert_eq!(ErrorKind::Unsupported.status(), 404);
        assert_eq!(ErrorKind::Conflict.status(), 400);
        assert_eq!(ErrorKind::Unauthorized.status(), 401);
        assert_eq!(ErrorKind::Internal.status(), 500);
    }

    #[test]
    fn test_store_error_becomes_internal() {
        let err: ApiError = StoreError::Locked.into();
        assert_eq!(err.kind, ErrorKind::Internal);
        assert_eq!(err.code, "500");
        assert!(err.details.contains("locked"));
    }
}
