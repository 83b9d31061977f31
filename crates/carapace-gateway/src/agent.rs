//! The agent-loop seam.
//!
//! The agent loop itself is outside the security core; the two meet only
//! at the tool-dispatch boundary. An engine drives one turn per user
//! message, and any engine that dispatches tools
//! MUST route every invocation through [`SecurityGate::gate`] before
//! executing it; the gate owns classification, rule enforcement, and
//! approvals.
//!
//! [`LlmChatAgent`] is the built-in minimal engine: plain chat turns with
//! no tool dispatch. Richer engines (sandboxed shells, skill runners) plug
//! in through the same trait.

use async_trait::async_trait;
use std::sync::Arc;

use carapace_core::{Channel, HistoryEntry};
use carapace_gate::SecurityGate;
use carapace_llm::{LlmProvider, Message};
use carapace_session::{SessionHandle, SessionManager};

use crate::error::{GatewayError, GatewayResult};

/// How many history entries are replayed as conversation context.
const CONTEXT_WINDOW_ENTRIES: usize = 40;

/// Drives one agent turn per user message.
#[async_trait]
pub trait AgentEngine: Send + Sync {
    /// Run a turn. The handle holds the session's exclusive lock for the
    /// whole turn; the channel carries progress and approval traffic.
    ///
    /// Returns the final assistant text for the turn.
    ///
    /// # Errors
    ///
    /// Returns a [`GatewayError`] when the turn cannot complete; the
    /// connection loop reports it to the client and the turn ends.
    async fn run_turn(
        &self,
        gate: &SecurityGate,
        sessions: &SessionManager,
        handle: &mut SessionHandle,
        channel: &dyn Channel,
        user_input: &str,
    ) -> GatewayResult<String>;
}

/// Minimal built-in engine: conversation only, no tools.
pub struct LlmChatAgent {
    provider: Arc<dyn LlmProvider>,
}

impl std::fmt::Debug for LlmChatAgent {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("LlmChatAgent").finish_non_exhaustive()
    }
}

impl LlmChatAgent {
    /// Create a chat agent over a provider.
    #[must_use]
    pub fn new(provider: Arc<dyn LlmProvider>) -> Self {
        Self { provider }
    }

    fn system_prompt(handle: &SessionHandle) -> String {
        let state = handle.state();
        let activated: Vec<&str> = state.activated_rules.iter().map(String::as_str).collect();
        let disabled: Vec<&str> = state.disabled_rules.iter().map(String::as_str).collect();
        format!(
            "You are Carapace, a personal assistant running behind a \
             security gateway. Every tool invocation is classified and \
             checked against the user's rules before it runs.\n\n\
             # Session Info\n\
             Session ID: {}\n\
             Activated rules: {}\n\
             Disabled rules: {}",
            state.session_id,
            if activated.is_empty() {
                "(none)".to_string()
            } else {
                activated.join(", ")
            },
            if disabled.is_empty() {
                "(none)".to_string()
            } else {
                disabled.join(", ")
            },
        )
    }
}

#[async_trait]
impl AgentEngine for LlmChatAgent {
    async fn run_turn(
        &self,
        _gate: &SecurityGate,
        sessions: &SessionManager,
        handle: &mut SessionHandle,
        _channel: &dyn Channel,
        user_input: &str,
    ) -> GatewayResult<String> {
        let session_id = handle.id().clone();
        sessions.append_history(&session_id, &HistoryEntry::user_message(user_input))?;

        let history = sessions.load_history(&session_id)?;
        let start = history.len().saturating_sub(CONTEXT_WINDOW_ENTRIES);
        let messages: Vec<Message> = history[start..]
            .iter()
            .filter_map(|entry| match entry {
                HistoryEntry::UserMessage { content, .. } => Some(Message::user(content)),
                HistoryEntry::AssistantMessage { content, .. } => {
                    Some(Message::assistant(content))
                }
                _ => None,
            })
            .collect();

        let reply = self
            .provider
            .complete(&messages, &Self::system_prompt(handle))
            .await
            .map_err(|e| GatewayError::Agent(e.to_string()))?;

        sessions.append_history(&session_id, &HistoryEntry::assistant_message(&reply))?;
        Ok(reply)
    }
}
