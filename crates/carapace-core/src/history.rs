//! Append-only session history records.
//!
//! History serves two masters: it is the conversation context replayed to
//! the agent, and it is the input over which rule triggers are evaluated.
//! Entries are persisted as JSON lines and are never rewritten.

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use serde_json::Value;

use crate::classification::OperationClassification;
use crate::types::ToolCallId;

/// One record in a session's append-only history.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(tag = "type", rename_all = "snake_case")]
pub enum HistoryEntry {
    /// A message from the user.
    UserMessage {
        /// Message text.
        content: String,
        /// When the entry was produced.
        at: DateTime<Utc>,
    },
    /// A message from the agent.
    AssistantMessage {
        /// Message text.
        content: String,
        /// When the entry was produced.
        at: DateTime<Utc>,
    },
    /// The agent asked to invoke a tool.
    ToolCall {
        /// Tool name.
        tool: String,
        /// Tool arguments.
        args: Value,
        /// When the entry was produced.
        at: DateTime<Utc>,
    },
    /// The classifier's verdict on a tool invocation.
    Classification {
        /// Tool name.
        tool: String,
        /// The classification.
        classification: OperationClassification,
        /// When the entry was produced.
        at: DateTime<Utc>,
    },
    /// An approval round trip was started.
    ApprovalRequest {
        /// Correlation id.
        tool_call_id: ToolCallId,
        /// Tool name.
        tool: String,
        /// Tool arguments.
        args: Value,
        /// Rules that forced the approval.
        triggered_rules: Vec<String>,
        /// When the entry was produced.
        at: DateTime<Utc>,
    },
    /// The user answered an approval request.
    ApprovalResponse {
        /// Correlation id.
        tool_call_id: ToolCallId,
        /// Whether the user approved.
        approved: bool,
        /// When the entry was produced.
        at: DateTime<Utc>,
    },
    /// Something went wrong during the turn.
    Error {
        /// Human-readable detail.
        detail: String,
        /// When the entry was produced.
        at: DateTime<Utc>,
    },
}

impl HistoryEntry {
    /// Record a user message, stamped now.
    #[must_use]
    pub fn user_message(content: impl Into<String>) -> Self {
        Self::UserMessage {
            content: content.into(),
            at: Utc::now(),
        }
    }

    /// Record an assistant message, stamped now.
    #[must_use]
    pub fn assistant_message(content: impl Into<String>) -> Self {
        Self::AssistantMessage {
            content: content.into(),
            at: Utc::now(),
        }
    }

    /// Record a tool call, stamped now.
    #[must_use]
    pub fn tool_call(tool: impl Into<String>, args: Value) -> Self {
        Self::ToolCall {
            tool: tool.into(),
            args,
            at: Utc::now(),
        }
    }

    /// Record a classification, stamped now.
    #[must_use]
    pub fn classification(tool: impl Into<String>, classification: OperationClassification) -> Self {
        Self::Classification {
            tool: tool.into(),
            classification,
            at: Utc::now(),
        }
    }

    /// Record an approval request, stamped now.
    #[must_use]
    pub fn approval_request(
        tool_call_id: ToolCallId,
        tool: impl Into<String>,
        args: Value,
        triggered_rules: Vec<String>,
    ) -> Self {
        Self::ApprovalRequest {
            tool_call_id,
            tool: tool.into(),
            args,
            triggered_rules,
            at: Utc::now(),
        }
    }

    /// Record an approval response, stamped now.
    #[must_use]
    pub fn approval_response(tool_call_id: ToolCallId, approved: bool) -> Self {
        Self::ApprovalResponse {
            tool_call_id,
            approved,
            at: Utc::now(),
        }
    }

    /// Record an error, stamped now.
    #[must_use]
    pub fn error(detail: impl Into<String>) -> Self {
        Self::Error {
            detail: detail.into(),
            at: Utc::now(),
        }
    }

    /// The role this entry carries on the control-plane history endpoint.
    #[must_use]
    pub fn role(&self) -> &'static str {
        match self {
            Self::UserMessage { .. } => "user",
            Self::AssistantMessage { .. } => "assistant",
            Self::ToolCall { .. } | Self::Classification { .. } => "tool_call",
            Self::ApprovalRequest { .. } | Self::ApprovalResponse { .. } | Self::Error { .. } => {
                "command"
            }
        }
    }

    /// When this entry was produced.
    #[must_use]
    pub fn at(&self) -> DateTime<Utc> {
        match self {
            Self::UserMessage { at, .. }
            | Self::AssistantMessage { at, .. }
            | Self::ToolCall { at, .. }
            | Self::Classification { at, .. }
            | Self::ApprovalRequest { at, .. }
            | Self::ApprovalResponse { at, .. }
            | Self::Error { at, .. } => *at,
        }
    }

    /// A single compact line describing this entry, used when summarizing
    /// session history for rule-trigger evaluation.
    #[must_use]
    pub fn summary_line(&self) -> String {
        const MAX: usize = 120;
        let line = match self {
            Self::UserMessage { content, .. } => format!("user: {content}"),
            Self::AssistantMessage { content, .. } => format!("assistant: {content}"),
            Self::ToolCall { tool, args, .. } => format!("tool_call: {tool} {args}"),
            Self::Classification {
                tool,
                classification,
                ..
            } => format!("classified: {tool} as {classification}"),
            Self::ApprovalRequest { tool, .. } => format!("approval_requested: {tool}"),
            Self::ApprovalResponse { approved, .. } => {
                format!(
                    "approval_response: {}",
                    if *approved { "approved" } else { "denied" }
                )
            }
            Self::Error { detail, .. } => format!("error: {detail}"),
        };
        truncate(&line, MAX)
    }
}

fn truncate(s: &str, max: usize) -> String {
    if s.chars().count() <= max {
        s.to_string()
    } else {
        let mut out: String = s.chars().take(max.saturating_sub(3)).collect();
        out.push_str("...");
        out
    }
}
