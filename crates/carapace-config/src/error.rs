//! Configuration error types.

use thiserror::Error;

/// Errors raised while loading or validating configuration.
#[derive(Debug, Error)]
pub enum ConfigError {
    /// A file could not be read.
    #[error("failed to read {path}: {source}")]
    Read {
        /// Path that failed.
        path: String,
        /// Underlying I/O error.
        source: std::io::Error,
    },

    /// A file could not be written.
    #[error("failed to write {path}: {source}")]
    Write {
        /// Path that failed.
        path: String,
        /// Underlying I/O error.
        source: std::io::Error,
    },

    /// A file could not be parsed.
    #[error("failed to parse {path}: {source}")]
    Parse {
        /// Path that failed.
        path: String,
        /// Underlying YAML error.
        source: serde_yaml::Error,
    },

    /// A value failed validation.
    #[error("invalid configuration for {field}: {message}")]
    Validation {
        /// Dotted field path.
        field: String,
        /// What went wrong.
        message: String,
    },
}

/// Result type for configuration operations.
pub type ConfigResult<T> = Result<T, ConfigError>;
