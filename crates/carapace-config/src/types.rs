//! Typed configuration sections.

use serde::{Deserialize, Serialize};

use crate::error::{ConfigError, ConfigResult};

/// Top-level gateway configuration (`config.yaml`).
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct Config {
    /// Process-wide settings.
    pub carapace: CarapaceSection,
    /// Bind address.
    pub server: ServerSection,
    /// Model selection.
    pub agent: AgentSection,
    /// Session retention and approval timing.
    pub sessions: SessionsSection,
}

/// Process-wide settings.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(default)]
pub struct CarapaceSection {
    /// Log level filter (`error`, `warn`, `info`, `debug`, `trace`).
    pub log_level: String,
}

impl Default for CarapaceSection {
    fn default() -> Self {
        Self {
            log_level: "info".to_string(),
        }
    }
}

/// Bind address for the HTTP/WebSocket server.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(default)]
pub struct ServerSection {
    /// Host to bind.
    pub host: String,
    /// Port to bind.
    pub port: u16,
}

impl Default for ServerSection {
    fn default() -> Self {
        Self {
            host: "127.0.0.1".to_string(),
            port: 8321,
        }
    }
}

/// Model selection for the agent and the auxiliary security pipeline.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(default)]
pub struct AgentSection {
    /// Main agent model.
    pub model: String,
    /// Fast, inexpensive model for classification and rule evaluation.
    pub classifier_model: String,
}

impl Default for AgentSection {
    fn default() -> Self {
        Self {
            model: "claude-sonnet-4-20250514".to_string(),
            classifier_model: "claude-3-5-haiku-20241022".to_string(),
        }
    }
}

/// Session retention and approval timing.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(default)]
pub struct SessionsSection {
    /// Sessions idle longer than this are removed by the retention sweep.
    pub history_retention_days: u32,
    /// How long a pending approval waits before converting to `cancelled`.
    pub approval_timeout_secs: u64,
}

impl Default for SessionsSection {
    fn default() -> Self {
        Self {
            history_retention_days: 90,
            approval_timeout_secs: 600,
        }
    }
}

const LOG_LEVELS: &[&str] = &["error", "warn", "info", "debug", "trace"];

impl Config {
    /// Validate the configuration.
    ///
    /// # Errors
    ///
    /// Returns [`ConfigError::Validation`] naming the offending field.
    pub fn validate(&self) -> ConfigResult<()> {
        if !LOG_LEVELS.contains(&self.carapace.log_level.as_str()) {
            return Err(ConfigError::Validation {
                field: "carapace.log_level".to_string(),
                message: format!(
                    "unknown log level '{}', expected one of {LOG_LEVELS:?}",
                    self.carapace.log_level
                ),
            });
        }
        if self.server.port == 0 {
            return Err(ConfigError::Validation {
                field: "server.port".to_string(),
                message: "port must be non-zero".to_string(),
            });
        }
        if self.agent.model.is_empty() {
            return Err(ConfigError::Validation {
                field: "agent.model".to_string(),
                message: "model must not be empty".to_string(),
            });
        }
        if self.agent.classifier_model.is_empty() {
            return Err(ConfigError::Validation {
                field: "agent.classifier_model".to_string(),
                message: "classifier_model must not be empty".to_string(),
            });
        }
        if self.sessions.approval_timeout_secs == 0 {
            return Err(ConfigError::Validation {
                field: "sessions.approval_timeout_secs".to_string(),
                message: "approval timeout must be at least one second".to_string(),
            });
        }
        Ok(())
    }
}
