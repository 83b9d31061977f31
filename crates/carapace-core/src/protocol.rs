//! Wire protocol for a session's duplex channel.
//!
//! Messages are tagged records; the discriminator is the `type` field. The
//! channel transports them as JSON text frames, but nothing in this module
//! assumes a particular transport.

use serde::{Deserialize, Serialize};
use serde_json::Value;

use crate::classification::OperationClassification;
use crate::types::ToolCallId;

/// Messages a client sends to the gateway.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(tag = "type", rename_all = "snake_case")]
pub enum ClientMessage {
    /// Plain user input. Content beginning with `/` is parsed server-side
    /// as a slash command.
    Message {
        /// Message text.
        content: String,
    },
    /// Answer to a pending approval request.
    ApprovalResponse {
        /// Correlation id from the matching `approval_request`.
        tool_call_id: ToolCallId,
        /// Whether the user approved the operation.
        approved: bool,
    },
    /// An explicit structured command (equivalent to a `/name args` message).
    Command {
        /// Command name, without the leading slash.
        name: String,
        /// Positional arguments.
        #[serde(default)]
        args: Vec<String>,
    },
}

impl ClientMessage {
    /// Parse a raw JSON frame into a client message.
    ///
    /// # Errors
    ///
    /// Returns the underlying serde error for unknown or malformed frames.
    pub fn parse(raw: &str) -> Result<Self, serde_json::Error> {
        serde_json::from_str(raw)
    }
}

/// Messages the gateway sends to a client.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(tag = "type", rename_all = "snake_case")]
pub enum ServerMessage {
    /// The agent turn finished with this final text.
    Done {
        /// Final assistant output.
        content: String,
    },
    /// Progress notice: a tool call passed through the gate.
    ToolCall {
        /// Tool name.
        tool: String,
        /// Tool arguments.
        args: Value,
        /// One-line summary (classification, triggered rules).
        detail: String,
    },
    /// The gate needs the user's consent to continue.
    ApprovalRequest {
        /// Correlation id; echo it back in the `approval_response`.
        tool_call_id: ToolCallId,
        /// Tool name.
        tool: String,
        /// Tool arguments.
        args: Value,
        /// Classification of the operation.
        classification: OperationClassification,
        /// Ids of the rules that forced the approval.
        triggered_rules: Vec<String>,
        /// Human-readable rule descriptions.
        descriptions: Vec<String>,
    },
    /// Result of a slash command.
    CommandResult {
        /// Command name, without the leading slash.
        command: String,
        /// Command-specific payload.
        data: Value,
    },
    /// Something went wrong.
    Error {
        /// Human-readable detail.
        detail: String,
    },
    /// Reserved for streaming token output.
    Token {
        /// Token text.
        content: String,
    },
}

impl ServerMessage {
    /// Serialize to a JSON text frame.
    ///
    /// # Errors
    ///
    /// Returns the underlying serde error (should not happen for these
    /// types in practice).
    pub fn to_frame(&self) -> Result<String, serde_json::Error> {
        serde_json::to_string(self)
    }
}
