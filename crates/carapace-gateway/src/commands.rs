//! Server-side slash commands.
//!
//! A `message` payload beginning with `/` is parsed here instead of being
//! handed to the agent. Each command answers with a `command_result`
//! carrying a well-defined `data` shape.

use serde_json::{json, Value};
use tracing::info;

use carapace_core::{ServerMessage, SessionId};
use carapace_session::SessionError;

use crate::state::AppState;

/// What the connection loop should do after a command.
#[derive(Debug)]
pub struct CommandReply {
    /// The message to send back.
    pub message: ServerMessage,
    /// When set, the connection rebinds to this session (after `/reset`).
    pub switch_to: Option<SessionId>,
    /// When set, the connection closes (after `/quit`).
    pub disconnect: bool,
}

impl CommandReply {
    fn result(command: &str, data: Value) -> Self {
        Self {
            message: ServerMessage::CommandResult {
                command: command.to_string(),
                data,
            },
            switch_to: None,
            disconnect: false,
        }
    }

    fn error(detail: impl Into<String>) -> Self {
        Self {
            message: ServerMessage::Error {
                detail: detail.into(),
            },
            switch_to: None,
            disconnect: false,
        }
    }
}

/// Truncate a trigger for display in `/rules` rows.
fn truncate_trigger(trigger: &str) -> String {
    const MAX: usize = 50;
    if trigger.chars().count() <= MAX {
        trigger.to_string()
    } else {
        let mut out: String = trigger.chars().take(MAX).collect();
        out.push_str("...");
        out
    }
}

/// Handle one slash command against a session.
pub async fn handle_command(state: &AppState, session_id: &SessionId, input: &str) -> CommandReply {
    let trimmed = input.trim();
    let (cmd, arg) = match trimmed.split_once(char::is_whitespace) {
        Some((cmd, rest)) => (cmd, rest.trim()),
        None => (trimmed, ""),
    };

    match cmd.to_ascii_lowercase().as_str() {
        "/help" => help_reply(),
        "/rules" => rules_reply(state, session_id),
        "/disable" => toggle_rule(state, session_id, arg, true).await,
        "/enable" => toggle_rule(state, session_id, arg, false).await,
        "/session" => session_reply(state, session_id),
        "/reset" => reset_reply(state, session_id).await,
        "/approve" => CommandReply::result("approve", json!({"error": "no pending approval"})),
        "/deny" => CommandReply::result("deny", json!({"error": "no pending approval"})),
        "/quit" | "/exit" => CommandReply {
            message: ServerMessage::CommandResult {
                command: "quit".to_string(),
                data: json!({"message": "goodbye"}),
            },
            switch_to: None,
            disconnect: true,
        },
        other => CommandReply::error(format!("Unknown command: {other}")),
    }
}

fn help_reply() -> CommandReply {
    CommandReply::result(
        "help",
        json!({
            "commands": [
                {"command": "/rules", "description": "List all rules and their status"},
                {"command": "/disable <id>", "description": "Disable a rule for this session"},
                {"command": "/enable <id>", "description": "Re-enable a disabled rule"},
                {"command": "/reset", "description": "Create a new session (clears state)"},
                {"command": "/session", "description": "Show current session state"},
                {"command": "/approve", "description": "Approve the pending operation"},
                {"command": "/deny", "description": "Deny the pending operation"},
                {"command": "/quit", "description": "Disconnect"},
                {"command": "/help", "description": "Show this help"},
            ]
        }),
    )
}

fn rules_reply(state: &AppState, session_id: &SessionId) -> CommandReply {
    let session = match state.sessions.load_state(session_id) {
        Ok(session) => session,
        Err(e) => return CommandReply::error(e.to_string()),
    };
    let snapshot = state.rules.snapshot();

    let rows: Vec<Value> = snapshot
        .all()
        .iter()
        .map(|rule| {
            let status = if session.is_rule_disabled(&rule.id) {
                "disabled"
            } else if session.is_rule_activated(&rule.id) {
                "activated"
            } else if rule.is_always() {
                "always-on"
            } else {
                "inactive"
            };
            json!({
                "id": rule.id,
                "trigger": truncate_trigger(&rule.trigger),
                "mode": rule.mode.to_string(),
                "status": status,
            })
        })
        .collect();

    CommandReply::result("rules", Value::Array(rows))
}

async fn toggle_rule(
    state: &AppState,
    session_id: &SessionId,
    rule_id: &str,
    disable: bool,
) -> CommandReply {
    let command = if disable { "disable" } else { "enable" };
    if rule_id.is_empty() {
        return CommandReply::result(command, json!({"error": format!("Usage: /{command} <rule-id>")}));
    }
    if !state.rules.snapshot().contains(rule_id) {
        return CommandReply::result(command, json!({"error": format!("Unknown rule: {rule_id}")}));
    }

    let mut handle = match state.sessions.open(session_id).await {
        Ok(handle) => handle,
        Err(e) => return CommandReply::error(e.to_string()),
    };
    let changed = if disable {
        handle.state_mut().disable_rule(rule_id)
    } else {
        handle.state_mut().enable_rule(rule_id)
    };
    if changed {
        if let Err(e) = state.sessions.save_state(handle.state()) {
            return CommandReply::error(e.to_string());
        }
    }

    info!(session_id = %session_id, rule_id, command, "rule toggled");
    let verb = if disable { "disabled" } else { "re-enabled" };
    CommandReply::result(
        command,
        json!({"rule_id": rule_id, "message": format!("Rule '{rule_id}' {verb}")}),
    )
}

fn session_reply(state: &AppState, session_id: &SessionId) -> CommandReply {
    match state.sessions.load_state(session_id) {
        Ok(session) => CommandReply::result(
            "session",
            json!({
                "session_id": session.session_id,
                "channel_type": session.channel_type,
                "activated_rules": session.activated_rules,
                "disabled_rules": session.disabled_rules,
                "approved_credentials": session.approved_credentials,
            }),
        ),
        Err(SessionError::NotFound(_)) => CommandReply::error("Session not found"),
        Err(e) => CommandReply::error(e.to_string()),
    }
}

async fn reset_reply(state: &AppState, session_id: &SessionId) -> CommandReply {
    let mut handle = match state.sessions.open(session_id).await {
        Ok(handle) => handle,
        Err(e) => return CommandReply::error(e.to_string()),
    };
    match state.sessions.reset(&mut handle) {
        Ok(successor) => {
            let mut reply = CommandReply::result(
                "reset",
                json!({
                    "session_id": successor.session_id,
                    "message": format!("New session {}", successor.session_id),
                }),
            );
            reply.switch_to = Some(successor.session_id);
            reply
        }
        Err(e) => CommandReply::error(e.to_string()),
    }
}
