//! Session error types.

use carapace_core::SessionId;
use thiserror::Error;

/// Errors raised by the session manager.
#[derive(Debug, Error)]
pub enum SessionError {
    /// The session does not exist (deleted, retired, or never created).
    #[error("session not found: {0}")]
    NotFound(SessionId),

    /// A filesystem operation failed.
    #[error("session storage error at {path}: {source}")]
    Storage {
        /// Path that failed.
        path: String,
        /// Underlying I/O error.
        source: std::io::Error,
    },

    /// A state document or history entry could not be (de)serialized.
    #[error("session serialization error: {0}")]
    Serialization(#[from] serde_json::Error),
}

/// Result type for session operations.
pub type SessionResult<T> = Result<T, SessionError>;
