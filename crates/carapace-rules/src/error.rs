//! Rule error types.

use thiserror::Error;

/// Errors raised by the rule store and engine.
#[derive(Debug, Error)]
pub enum RuleError {
    /// The rule file could not be read.
    #[error("failed to read rules from {path}: {source}")]
    Read {
        /// Path that failed.
        path: String,
        /// Underlying I/O error.
        source: std::io::Error,
    },

    /// The rule file could not be parsed.
    #[error("failed to parse rules: {0}")]
    Parse(#[from] serde_yaml::Error),

    /// A rule failed validation; no partial rule set is published.
    #[error("invalid rule '{rule_id}': {message}")]
    Validation {
        /// The offending rule id (or `<unnamed>`).
        rule_id: String,
        /// What went wrong.
        message: String,
    },

    /// An LLM evaluation failed. The engine maps this to fail-open
    /// (activation) or fail-closed (applicability); it never propagates.
    #[error("rule evaluation failed: {0}")]
    Evaluation(String),
}

/// Result type for rule operations.
pub type RuleResult<T> = Result<T, RuleError>;
