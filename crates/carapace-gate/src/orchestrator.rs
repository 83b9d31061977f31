//! The security-gate orchestrator.

use serde_json::Value;
use std::sync::Arc;
use tracing::{error, info, warn};

use carapace_core::{
    Channel, HistoryEntry, OperationClassification, OperationSignature, ServerMessage, ToolCallId,
};
use carapace_rules::{Decision, GateDecision, RuleEngine, RuleStore};
use carapace_session::{SessionHandle, SessionManager, SessionResult};

use crate::approval::{ApprovalGate, ApprovalOutcome, PendingApproval};
use crate::classifier::OperationClassifier;

/// How many recent history entries feed trigger evaluation.
const HISTORY_SUMMARY_WINDOW: usize = 20;

/// What the agent's tool dispatch does next.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum GateResult {
    /// Run the tool.
    Allow,
    /// Do not run the tool; report `reason` to the agent as the tool-call
    /// result so it can plan an alternative.
    Deny {
        /// Why the operation was refused.
        reason: String,
    },
    /// Do not run the tool; a block-mode rule forbids it outright.
    Block {
        /// Why the operation was blocked.
        reason: String,
    },
}

impl GateResult {
    /// Whether the tool may run.
    #[must_use]
    pub fn is_allowed(&self) -> bool {
        matches!(self, Self::Allow)
    }
}

/// Composes classifier → rule engine → approval gate for every tool
/// invocation. The session's exclusive lock (the handle) is held across
/// the whole sequence, including any approval wait.
pub struct SecurityGate {
    classifier: OperationClassifier,
    engine: RuleEngine,
    approval: ApprovalGate,
    sessions: Arc<SessionManager>,
    rules: Arc<RuleStore>,
}

impl std::fmt::Debug for SecurityGate {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("SecurityGate").finish_non_exhaustive()
    }
}

impl SecurityGate {
    /// Assemble the gate.
    #[must_use]
    pub fn new(
        classifier: OperationClassifier,
        engine: RuleEngine,
        approval: ApprovalGate,
        sessions: Arc<SessionManager>,
        rules: Arc<RuleStore>,
    ) -> Self {
        Self {
            classifier,
            engine,
            approval,
            sessions,
            rules,
        }
    }

    /// Gate one tool invocation.
    ///
    /// Persistence failures abort the operation: the turn ends with an
    /// error history entry (best effort), an `error` message to the client,
    /// and a denial to the agent. They never panic and never allow the
    /// tool to run unchecked.
    pub async fn gate(
        &self,
        handle: &mut SessionHandle,
        channel: &dyn Channel,
        tool: &str,
        args: &Value,
        hint: Option<&OperationClassification>,
    ) -> GateResult {
        match self.gate_inner(handle, channel, tool, args, hint).await {
            Ok(result) => result,
            Err(e) => {
                error!(session_id = %handle.id(), tool, error = %e, "gate aborted on persistence error");
                let detail = format!("security gate error: {e}");
                if let Err(append_err) = self
                    .sessions
                    .append_history(handle.id(), &HistoryEntry::error(&detail))
                {
                    warn!(error = %append_err, "failed to record gate error in history");
                }
                let _ = channel
                    .send(ServerMessage::Error {
                        detail: detail.clone(),
                    })
                    .await;
                GateResult::Deny { reason: detail }
            }
        }
    }

    async fn gate_inner(
        &self,
        handle: &mut SessionHandle,
        channel: &dyn Channel,
        tool: &str,
        args: &Value,
        hint: Option<&OperationClassification>,
    ) -> SessionResult<GateResult> {
        let session_id = handle.id().clone();

        // History first: every state change is motivated by a persisted
        // entry that precedes it.
        self.sessions
            .append_history(&session_id, &HistoryEntry::tool_call(tool, args.clone()))?;

        let classification = self.classifier.classify(tool, args, hint).await;
        self.sessions.append_history(
            &session_id,
            &HistoryEntry::classification(tool, classification.clone()),
        )?;

        let signature = OperationSignature::compute(tool, args, &classification);
        let ruleset = self.rules.snapshot();
        let history_summary = self.history_summary(&session_id)?;

        let decision = self
            .engine
            .evaluate(
                handle.state_mut(),
                &ruleset,
                &classification,
                tool,
                args,
                &signature,
                &history_summary,
            )
            .await;

        handle.state_mut().touch();
        self.sessions.save_state(handle.state())?;

        let _ = channel
            .send(ServerMessage::ToolCall {
                tool: tool.to_string(),
                args: args.clone(),
                detail: detail_line(&classification, &decision),
            })
            .await;

        match decision.decision {
            Decision::Allow => Ok(GateResult::Allow),
            Decision::Block => {
                info!(session_id = %session_id, tool, reason = %decision.reason, "operation blocked");
                self.sessions.append_history(
                    &session_id,
                    &HistoryEntry::error(format!("operation blocked: {}", decision.reason)),
                )?;
                Ok(GateResult::Block {
                    reason: decision.reason,
                })
            }
            Decision::NeedsApproval => {
                self.run_approval(handle, channel, tool, args, classification, signature, decision)
                    .await
            }
        }
    }

    #[allow(clippy::too_many_arguments)]
    async fn run_approval(
        &self,
        handle: &mut SessionHandle,
        channel: &dyn Channel,
        tool: &str,
        args: &Value,
        classification: OperationClassification,
        signature: OperationSignature,
        decision: GateDecision,
    ) -> SessionResult<GateResult> {
        let session_id = handle.id().clone();
        let tool_call_id = ToolCallId::generate();

        self.sessions.append_history(
            &session_id,
            &HistoryEntry::approval_request(
                tool_call_id.clone(),
                tool,
                args.clone(),
                decision.triggered_rule_ids.clone(),
            ),
        )?;

        let pending = PendingApproval {
            tool_call_id: tool_call_id.clone(),
            tool: tool.to_string(),
            args: args.clone(),
            classification,
            triggered_rules: decision.triggered_rule_ids,
            descriptions: decision.descriptions,
        };

        let outcome = self
            .approval
            .await_approval(channel, &pending, handle.cancel_watch())
            .await;

        match outcome {
            ApprovalOutcome::Approved => {
                self.sessions.append_history(
                    &session_id,
                    &HistoryEntry::approval_response(tool_call_id, true),
                )?;
                handle.state_mut().approve_operation(&signature);
                self.sessions.save_state(handle.state())?;
                info!(session_id = %session_id, tool, "operation approved");
                Ok(GateResult::Allow)
            }
            ApprovalOutcome::Denied => {
                self.sessions.append_history(
                    &session_id,
                    &HistoryEntry::approval_response(tool_call_id, false),
                )?;
                info!(session_id = %session_id, tool, "operation denied by user");
                Ok(GateResult::Deny {
                    reason: "User denied this operation.".to_string(),
                })
            }
            ApprovalOutcome::Cancelled => {
                // Distinct from a denial in the log and history, identical
                // to the agent.
                warn!(session_id = %session_id, tool, "approval cancelled");
                self.sessions.append_history(
                    &session_id,
                    &HistoryEntry::error(format!(
                        "approval cancelled for tool call {tool_call_id}"
                    )),
                )?;
                Ok(GateResult::Deny {
                    reason: "Approval cancelled.".to_string(),
                })
            }
        }
    }

    fn history_summary(&self, session_id: &carapace_core::SessionId) -> SessionResult<String> {
        let history = self.sessions.load_history(session_id)?;
        let start = history.len().saturating_sub(HISTORY_SUMMARY_WINDOW);
        Ok(history[start..]
            .iter()
            .map(HistoryEntry::summary_line)
            .collect::<Vec<_>>()
            .join("\n"))
    }
}

fn detail_line(classification: &OperationClassification, decision: &GateDecision) -> String {
    let mut detail = format!("[{}]", classification.operation_type);
    if !classification.categories.is_empty() {
        detail.push_str(&format!(" ({})", classification.categories.join(", ")));
    }
    if !decision.triggered_rule_ids.is_empty() {
        detail.push_str(&format!(" rules: {}", decision.triggered_rule_ids.join(", ")));
    }
    match decision.decision {
        Decision::NeedsApproval => detail.push_str(" -> approval required"),
        Decision::Block => detail.push_str(" -> blocked"),
        Decision::Allow => {}
    }
    detail
}
