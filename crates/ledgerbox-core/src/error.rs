//! Error types for the ledgerbox attachment pipeline.

use thiserror::Error;

use crate::models::AttachmentStatus;

/// Result type alias using ledgerbox's Error type.
pub type Result<T> = std::result::Result<T, Error>;

/// Core error type for ledgerbox operations.
#[derive(Error, Debug)]
pub enum Error {
    /// Database operation failed (wraps sqlx::Error)
    #[error("Database error: {0}")]
    Database(#[from] sqlx::Error),

    /// Referenced email/attachment/quota row does not exist
    #[error("Not found: {0}")]
    NotFound(String),

    /// Tenant mismatch on entity access, checked before any mutation
    #[error("Access denied: {0}")]
    AccessDenied(String),

    /// Tenant storage budget is exhausted; blocks new processing, not reads
    #[error("Storage quota exceeded: {used} of {total} bytes used")]
    QuotaExceeded { used: i64, total: i64 },

    /// Attachment status write rejected by the transition table
    #[error("Invalid status transition: {from} -> {to}")]
    InvalidTransition {
        from: AttachmentStatus,
        to: AttachmentStatus,
    },

    /// Malformed payload, unsupported provider, bad argument
    #[error("Invalid input: {0}")]
    InvalidInput(String),

    /// Storage backend put/get failed
    #[error("Storage error: {0}")]
    Storage(String),

    /// Provider byte fetch failed
    #[error("Provider error: {0}")]
    Provider(String),

    /// Job queue error
    #[error("Job error: {0}")]
    Job(String),

    /// Serialization/deserialization error
    #[error("Serialization error: {0}")]
    Serialization(String),

    /// Configuration error
    #[error("Configuration error: {0}")]
    Config(String),

    /// File I/O operation failed
    #[error("I/O error: {0}")]
    Io(#[from] std::io::Error),

    /// Internal error
    #[error("Internal error: {0}")]
    Internal(String),
}

impl Error {
    /// Whether this failure is eligible for redelivery by the job queue.
    ///
    /// Provider/storage/database/IO failures are transient; validation and
    /// authorization failures are not, although the retry counter is still
    /// allowed to run out on them (the queue treats all failures alike).
    pub fn is_transient(&self) -> bool {
        matches!(
            self,
            Error::Database(_)
                | Error::Storage(_)
                | Error::Provider(_)
                | Error::Io(_)
                | Error::Job(_)
        )
    }

    /// Whether this error is the caller's fault rather than the server's.
    pub fn is_client_error(&self) -> bool {
        matches!(
            self,
            Error::NotFound(_)
                | Error::AccessDenied(_)
                | Error::QuotaExceeded { .. }
                | Error::InvalidInput(_)
                | Error::InvalidTransition { .. }
        )
    }
}

impl From<serde_json::Error> for Error {
    fn from(e: serde_json::Error) -> Self {
        Error::Serialization(e.to_string())
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_error_display_not_found() {
        let err = Error::NotFound("email 42".to_string());
        assert_eq!(err.to_string(), "Not found: email 42");
    }

    #[test]
    fn test_error_display_quota_exceeded() {
        let err = Error::QuotaExceeded {
            used: 5_368_709_120,
            total: 5_368_709_120,
        };
        assert!(err.to_string().contains("quota exceeded"));
        assert!(err.to_string().contains("5368709120"));
    }

    #[test]
    fn test_error_display_invalid_transition() {
        let err = Error::InvalidTransition {
            from: AttachmentStatus::Completed,
            to: AttachmentStatus::Downloading,
        };
        assert_eq!(
            err.to_string(),
            "Invalid status transition: completed -> downloading"
        );
    }

    #[test]
    fn test_transient_classification() {
        assert!(Error::Storage("disk full".into()).is_transient());
        assert!(Error::Provider("timeout".into()).is_transient());
        assert!(!Error::AccessDenied("org mismatch".into()).is_transient());
        assert!(!Error::InvalidInput("bad provider".into()).is_transient());
        assert!(!Error::QuotaExceeded { used: 1, total: 1 }.is_transient());
    }

    #[test]
    fn test_client_error_classification() {
        assert!(Error::NotFound("x".into()).is_client_error());
        assert!(Error::AccessDenied("x".into()).is_client_error());
        assert!(Error::InvalidInput("x".into()).is_client_error());
        assert!(!Error::Storage("x".into()).is_client_error());
        assert!(!Error::Internal("x".into()).is_client_error());
    }

    #[test]
    fn test_from_serde_json_error() {
        let json_err = serde_json::from_str::<i32>("not a number").unwrap_err();
        let err: Error = json_err.into();
        assert!(matches!(err, Error::Serialization(_)));
    }

    #[test]
    fn test_from_io_error() {
        let io_err = std::io::Error::new(std::io::ErrorKind::NotFound, "file not found");
        let err: Error = io_err.into();
        assert!(matches!(err, Error::Io(_)));
        assert!(err.is_transient());
    }

    #[test]
    fn test_error_is_send_sync() {
        fn assert_send<T: Send>() {}
        fn assert_sync<T: Sync>() {}

        assert_send::<Error>();
        assert_sync::<Error>();
    }
}
