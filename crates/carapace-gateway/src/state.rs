//! Shared application state.

use std::sync::Arc;

use carapace_config::Config;
use carapace_gate::SecurityGate;
use carapace_rules::RuleStore;
use carapace_session::SessionManager;

use crate::agent::AgentEngine;

/// State shared by every handler and connection.
///
/// Everything is behind an `Arc`; cloning the state is cheap and the
/// pieces are individually shareable with background tasks.
#[derive(Clone)]
pub struct AppState {
    /// Loaded configuration.
    pub config: Arc<Config>,
    /// Session manager (locks, persistence, lifecycle).
    pub sessions: Arc<SessionManager>,
    /// Current rule-set snapshot holder.
    pub rules: Arc<RuleStore>,
    /// The security gate every tool invocation goes through.
    pub gate: Arc<SecurityGate>,
    /// The agent loop driven by user messages.
    pub agent: Arc<dyn AgentEngine>,
    /// Bearer token for both planes.
    pub token: String,
}

impl std::fmt::Debug for AppState {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("AppState")
            .field("config", &self.config)
            .finish_non_exhaustive()
    }
}
