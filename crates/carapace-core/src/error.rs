//! Core error types.

use thiserror::Error;

/// Errors produced by core types and channels.
#[derive(Debug, Error)]
pub enum CoreError {
    /// The channel's peer is gone.
    #[error("channel closed")]
    ChannelClosed,

    /// Sending on the channel failed for a transport reason.
    #[error("channel send failed: {0}")]
    ChannelSend(String),

    /// A wire frame could not be serialized or parsed.
    #[error("serialization error: {0}")]
    Serialization(#[from] serde_json::Error),
}

/// Result type for core operations.
pub type CoreResult<T> = Result<T, CoreError>;
