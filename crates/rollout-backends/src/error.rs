//! Error types for rollout-backends

use thiserror::Error;

/// Errors reported by a version-control or chat backend.
#[derive(Error, Debug, Clone, PartialEq, Eq)]
pub enum BackendError {
    /// The requested object (file, ref, commit, pull request) does not exist
    #[error("not found: {what}")]
    NotFound { what: String },

    /// The backend refused the write (non-fast-forward, validation failure)
    #[error("rejected by backend: {message}")]
    Rejected { message: String },

    /// Any other non-success HTTP status
    #[error("HTTP {status}: {message}")]
    Http { status: u16, message: String },

    /// Connection, TLS or request construction failure
    #[error("transport error: {0}")]
    Transport(String),

    /// Response body could not be decoded
    #[error("decode error: {0}")]
    Decode(String),

    /// Caller passed an argument the backend cannot act on
    #[error("invalid input: {0}")]
    InvalidInput(String),
}

impl BackendError {
    pub fn not_found(what: impl Into<String>) -> Self {
        BackendError::NotFound { what: what.into() }
    }

    pub fn is_not_found(&self) -> bool {
        matches!(self, BackendError::NotFound { .. })
    }
}

/// Result type for backend operations
pub type BackendResult<T> = std::result::Result<T, BackendError>;
