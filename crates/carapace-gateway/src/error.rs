//! Gateway error types.

use thiserror::Error;

/// Errors raised by the gateway.
#[derive(Debug, Error)]
pub enum GatewayError {
    /// Configuration problem (exit code 1).
    #[error("configuration error: {0}")]
    Config(#[from] carapace_config::ConfigError),

    /// Rule file problem (exit code 1).
    #[error("rule error: {0}")]
    Rules(#[from] carapace_rules::RuleError),

    /// Session storage problem.
    #[error("session error: {0}")]
    Session(#[from] carapace_session::SessionError),

    /// The agent loop failed mid-turn.
    #[error("agent error: {0}")]
    Agent(String),

    /// Could not bind the listen address (exit code 2).
    #[error("failed to bind {addr}: {source}")]
    Bind {
        /// Address that failed.
        addr: String,
        /// Underlying I/O error.
        source: std::io::Error,
    },

    /// The server loop failed after startup.
    #[error("server error: {0}")]
    Serve(String),
}

/// Result type for gateway operations.
pub type GatewayResult<T> = Result<T, GatewayError>;
