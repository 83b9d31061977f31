//! LLM-related error types.

use thiserror::Error;

/// Errors that can occur with LLM operations.
#[derive(Debug, Error)]
pub enum LlmError {
    /// API key not configured.
    #[error("API key not configured for {provider}")]
    ApiKeyNotConfigured {
        /// Provider name.
        provider: String,
    },

    /// API request failed.
    #[error("API request failed: {0}")]
    ApiRequestFailed(String),

    /// Rate limit exceeded.
    #[error("rate limit exceeded, retry after {retry_after_secs} seconds")]
    RateLimitExceeded {
        /// Seconds to wait before retrying.
        retry_after_secs: u64,
    },

    /// Invalid response from the API.
    #[error("invalid API response: {0}")]
    InvalidResponse(String),

    /// HTTP error.
    #[error("HTTP error: {0}")]
    HttpError(#[from] reqwest::Error),

    /// Configuration error.
    #[error("configuration error: {0}")]
    ConfigError(String),
}

/// Result type for LLM operations.
pub type LlmResult<T> = Result<T, LlmError>;
