//! The approval gate.
//!
//! Serialises a `needs_approval` decision into a request/response round
//! trip over the session's channel. The calling task blocks cooperatively
//! until the matching response arrives, the channel disconnects, the
//! session is reset or deleted, or the configured timeout elapses.

use std::time::Duration;

use serde_json::Value;
use tokio::sync::watch;
use tracing::{debug, warn};

use carapace_core::{
    Channel, ClientMessage, OperationClassification, ServerMessage, ToolCallId,
};

/// How a pending approval resolved.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ApprovalOutcome {
    /// The user approved the operation.
    Approved,
    /// The user denied the operation.
    Denied,
    /// Disconnect, timeout, or session reset/delete. Treated like a denial
    /// by the orchestrator but logged distinctly.
    Cancelled,
}

/// Everything the user needs to make the call.
#[derive(Debug, Clone)]
pub struct PendingApproval {
    /// Correlation id; at most one response is accepted for it.
    pub tool_call_id: ToolCallId,
    /// Tool name.
    pub tool: String,
    /// Tool arguments.
    pub args: Value,
    /// Classification of the operation.
    pub classification: OperationClassification,
    /// Ids of the rules that forced the approval.
    pub triggered_rules: Vec<String>,
    /// Human-readable rule descriptions.
    pub descriptions: Vec<String>,
}

/// Waits for user consent over a channel.
#[derive(Debug, Clone)]
pub struct ApprovalGate {
    timeout: Duration,
}

impl Default for ApprovalGate {
    fn default() -> Self {
        Self::new(Self::DEFAULT_TIMEOUT)
    }
}

impl ApprovalGate {
    /// Default wait before a pending approval converts to `cancelled`.
    pub const DEFAULT_TIMEOUT: Duration = Duration::from_secs(600);

    /// Create a gate with an explicit timeout.
    #[must_use]
    pub fn new(timeout: Duration) -> Self {
        Self { timeout }
    }

    /// Send the approval request and block until it resolves.
    ///
    /// While waiting, a plain `message` of `/approve` or `/deny` resolves
    /// the pending request, so bare chat clients can answer without
    /// structured frames. Responses carrying any other `tool_call_id` are
    /// discarded.
    pub async fn await_approval(
        &self,
        channel: &dyn Channel,
        request: &PendingApproval,
        mut cancel: watch::Receiver<bool>,
    ) -> ApprovalOutcome {
        let message = ServerMessage::ApprovalRequest {
            tool_call_id: request.tool_call_id.clone(),
            tool: request.tool.clone(),
            args: request.args.clone(),
            classification: request.classification.clone(),
            triggered_rules: request.triggered_rules.clone(),
            descriptions: request.descriptions.clone(),
        };
        if channel.send(message).await.is_err() {
            warn!(tool_call_id = %request.tool_call_id, "channel gone before approval request was sent");
            return ApprovalOutcome::Cancelled;
        }

        if *cancel.borrow() {
            return ApprovalOutcome::Cancelled;
        }

        let deadline = tokio::time::sleep(self.timeout);
        tokio::pin!(deadline);

        loop {
            tokio::select! {
                () = &mut deadline => {
                    warn!(tool_call_id = %request.tool_call_id, "approval timed out");
                    return ApprovalOutcome::Cancelled;
                }
                changed = cancel.changed() => {
                    match changed {
                        Ok(()) if *cancel.borrow() => {
                            warn!(tool_call_id = %request.tool_call_id, "session cancelled during approval wait");
                            return ApprovalOutcome::Cancelled;
                        }
                        Ok(()) => {}
                        Err(_) => return ApprovalOutcome::Cancelled,
                    }
                }
                received = channel.receive() => {
                    match received {
                        None => {
                            warn!(tool_call_id = %request.tool_call_id, "channel disconnected during approval wait");
                            return ApprovalOutcome::Cancelled;
                        }
                        Some(ClientMessage::ApprovalResponse { tool_call_id, approved }) => {
                            if tool_call_id == request.tool_call_id {
                                return if approved {
                                    ApprovalOutcome::Approved
                                } else {
                                    ApprovalOutcome::Denied
                                };
                            }
                            debug!(got = %tool_call_id, expected = %request.tool_call_id, "discarding unmatched approval response");
                        }
                        Some(ClientMessage::Message { content }) => {
                            match content.trim() {
                                "/approve" => return ApprovalOutcome::Approved,
                                "/deny" => return ApprovalOutcome::Denied,
                                _ => {
                                    let _ = channel
                                        .send(ServerMessage::Error {
                                            detail: "an approval is pending; reply /approve or /deny"
                                                .to_string(),
                                        })
                                        .await;
                                }
                            }
                        }
                        Some(ClientMessage::Command { name, .. }) => match name.as_str() {
                            "approve" => return ApprovalOutcome::Approved,
                            "deny" => return ApprovalOutcome::Denied,
                            _ => {
                                let _ = channel
                                    .send(ServerMessage::Error {
                                        detail: "an approval is pending; reply /approve or /deny"
                                            .to_string(),
                                    })
                                    .await;
                            }
                        },
                    }
                }
            }
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use async_trait::async_trait;
    use carapace_core::{CoreError, CoreResult, OperationType};
    use serde_json::json;
    use std::collections::VecDeque;
    use std::sync::Mutex;

    /// In-memory channel fed with a script of client messages.
    struct ScriptedChannel {
        inbound: Mutex<VecDeque<ClientMessage>>,
        sent: Mutex<Vec<ServerMessage>>,
        closed: Mutex<bool>,
    }

    impl ScriptedChannel {
        fn new(script: Vec<ClientMessage>) -> Self {
            Self {
                inbound: Mutex::new(script.into()),
                sent: Mutex::new(Vec::new()),
                closed: Mutex::new(false),
            }
        }

        fn sent(&self) -> Vec<ServerMessage> {
            self.sent.lock().unwrap().clone()
        }
    }

    #[async_trait]
    impl Channel for ScriptedChannel {
        async fn send(&self, message: ServerMessage) -> CoreResult<()> {
            if *self.closed.lock().unwrap() {
                return Err(CoreError::ChannelClosed);
            }
            self.sent.lock().unwrap().push(message);
            Ok(())
        }

        async fn receive(&self) -> Option<ClientMessage> {
            self.inbound.lock().unwrap().pop_front()
        }

        async fn close(&self) {
            *self.closed.lock().unwrap() = true;
        }
    }

    fn request() -> PendingApproval {
        PendingApproval {
            tool_call_id: ToolCallId::from("call-1"),
            tool: "write_file".to_string(),
            args: json!({"path": "/a"}),
            classification: OperationClassification::new(OperationType::WriteLocal),
            triggered_rules: vec!["no-write-after-web".to_string()],
            descriptions: vec!["[no-write-after-web] writes need approval".to_string()],
        }
    }

    fn cancel_pair() -> (watch::Sender<bool>, watch::Receiver<bool>) {
        watch::channel(false)
    }

    #[tokio::test]
    async fn test_approved() {
        let channel = ScriptedChannel::new(vec![ClientMessage::ApprovalResponse {
            tool_call_id: ToolCallId::from("call-1"),
            approved: true,
        }]);
        let (_tx, rx) = cancel_pair();
        let outcome = ApprovalGate::default()
            .await_approval(&channel, &request(), rx)
            .await;
        assert_eq!(outcome, ApprovalOutcome::Approved);
        assert!(matches!(
            channel.sent()[0],
            ServerMessage::ApprovalRequest { .. }
        ));
    }

    #[tokio::test]
    async fn test_denied() {
        let channel = ScriptedChannel::new(vec![ClientMessage::ApprovalResponse {
            tool_call_id: ToolCallId::from("call-1"),
            approved: false,
        }]);
        let (_tx, rx) = cancel_pair();
        let outcome = ApprovalGate::default()
            .await_approval(&channel, &request(), rx)
            .await;
        assert_eq!(outcome, ApprovalOutcome::Denied);
    }

    #[tokio::test]
    async fn test_unmatched_response_discarded() {
        let channel = ScriptedChannel::new(vec![
            ClientMessage::ApprovalResponse {
                tool_call_id: ToolCallId::from("stale"),
                approved: true,
            },
            ClientMessage::ApprovalResponse {
                tool_call_id: ToolCallId::from("call-1"),
                approved: false,
            },
        ]);
        let (_tx, rx) = cancel_pair();
        let outcome = ApprovalGate::default()
            .await_approval(&channel, &request(), rx)
            .await;
        assert_eq!(outcome, ApprovalOutcome::Denied);
    }

    #[tokio::test]
    async fn test_disconnect_is_cancelled() {
        let channel = ScriptedChannel::new(vec![]);
        let (_tx, rx) = cancel_pair();
        let outcome = ApprovalGate::default()
            .await_approval(&channel, &request(), rx)
            .await;
        assert_eq!(outcome, ApprovalOutcome::Cancelled);
    }

    #[tokio::test]
    async fn test_timeout_is_cancelled() {
        // A channel that never produces input.
        struct SilentChannel;

        #[async_trait]
        impl Channel for SilentChannel {
            async fn send(&self, _message: ServerMessage) -> CoreResult<()> {
                Ok(())
            }

            async fn receive(&self) -> Option<ClientMessage> {
                std::future::pending().await
            }

            async fn close(&self) {}
        }

        let (_tx, rx) = cancel_pair();
        let outcome = ApprovalGate::new(Duration::from_millis(20))
            .await_approval(&SilentChannel, &request(), rx)
            .await;
        assert_eq!(outcome, ApprovalOutcome::Cancelled);
    }

    #[tokio::test]
    async fn test_session_cancel_interrupts_wait() {
        struct SilentChannel;

        #[async_trait]
        impl Channel for SilentChannel {
            async fn send(&self, _message: ServerMessage) -> CoreResult<()> {
                Ok(())
            }

            async fn receive(&self) -> Option<ClientMessage> {
                std::future::pending().await
            }

            async fn close(&self) {}
        }

        let (tx, rx) = cancel_pair();
        let wait = tokio::spawn(async move {
            ApprovalGate::default()
                .await_approval(&SilentChannel, &request(), rx)
                .await
        });
        tokio::time::sleep(Duration::from_millis(10)).await;
        tx.send(true).unwrap();
        assert_eq!(wait.await.unwrap(), ApprovalOutcome::Cancelled);
    }

    #[tokio::test]
    async fn test_slash_approve_resolves() {
        let channel = ScriptedChannel::new(vec![ClientMessage::Message {
            content: "/approve".to_string(),
        }]);
        let (_tx, rx) = cancel_pair();
        let outcome = ApprovalGate::default()
            .await_approval(&channel, &request(), rx)
            .await;
        assert_eq!(outcome, ApprovalOutcome::Approved);
    }

    #[tokio::test]
    async fn test_other_chat_gets_notice_and_wait_continues() {
        let channel = ScriptedChannel::new(vec![
            ClientMessage::Message {
                content: "what is going on?".to_string(),
            },
            ClientMessage::Message {
                content: "/deny".to_string(),
            },
        ]);
        let (_tx, rx) = cancel_pair();
        let outcome = ApprovalGate::default()
            .await_approval(&channel, &request(), rx)
            .await;
        assert_eq!(outcome, ApprovalOutcome::Denied);
        let sent = channel.sent();
        assert!(sent
            .iter()
            .any(|m| matches!(m, ServerMessage::Error { .. })));
    }

    #[tokio::test]
    async fn test_closed_channel_before_send_is_cancelled() {
        let channel = ScriptedChannel::new(vec![]);
        channel.close().await;
        let (_tx, rx) = cancel_pair();
        let outcome = ApprovalGate::default()
            .await_approval(&channel, &request(), rx)
            .await;
        assert_eq!(outcome, ApprovalOutcome::Cancelled);
    }
}
