//! Shared fixtures: a scripted classifier, a keyword rule evaluator, and a
//! recording channel. Everything is deterministic; no network, no model.

// Each test binary compiles its own copy; not every binary uses every fixture.
#![allow(dead_code)]

use async_trait::async_trait;
use serde_json::Value;
use std::collections::VecDeque;
use std::sync::{Arc, Mutex};
use std::time::Duration;

use carapace_core::{
    Channel, ClientMessage, CoreError, CoreResult, OperationClassification, OperationType,
    ServerMessage,
};
use carapace_gate::{ApprovalGate, OperationClassifier, SecurityGate};
use carapace_llm::{LlmProvider, LlmResult, Message};
use carapace_rules::{Rule, RuleEngine, RuleEvaluator, RuleResult, RuleStore};
use carapace_session::SessionManager;

/// Classifier provider that answers from the tool name and arguments in
/// the prompt, the way the real model is prompted to.
pub struct ScriptedClassifierProvider;

#[async_trait]
impl LlmProvider for ScriptedClassifierProvider {
    fn name(&self) -> &str {
        "scripted"
    }

    fn model(&self) -> &str {
        "scripted-classifier"
    }

    async fn complete(&self, messages: &[Message], _system: &str) -> LlmResult<String> {
        let prompt = messages.last().map_or("", |m| m.content.as_str());
        let classification = if prompt.contains("Tool: fetch") {
            r#"{"operation_type": "read_external", "categories": ["web"], "description": "fetch a url", "confidence": 0.95}"#
        } else if prompt.contains("skills/") {
            r#"{"operation_type": "skill_modify", "categories": ["skills"], "description": "modify a skill", "confidence": 0.9}"#
        } else if prompt.contains("Tool: write_file") {
            r#"{"operation_type": "write_local", "categories": ["documents"], "description": "write a file", "confidence": 0.9}"#
        } else if prompt.contains("Tool: read") {
            r#"{"operation_type": "read_local", "categories": [], "description": "read a file", "confidence": 0.9}"#
        } else {
            r#"{"operation_type": "execute", "categories": [], "description": "run a command", "confidence": 0.5}"#
        };
        Ok(classification.to_string())
    }
}

/// Deterministic stand-in for the LLM rule evaluator: triggers about the
/// internet fire on external reads, effects about writes cover write-ish
/// operations, effects about skills cover skill modification.
pub struct KeywordEvaluator;

#[async_trait]
impl RuleEvaluator for KeywordEvaluator {
    async fn trigger_fired(
        &self,
        rule: &Rule,
        _activated_rules: &[String],
        _history_summary: &str,
        classification: &OperationClassification,
    ) -> RuleResult<bool> {
        let trigger = rule.trigger.to_ascii_lowercase();
        if trigger.contains("internet") || trigger.contains("web") {
            return Ok(classification.operation_type == OperationType::ReadExternal);
        }
        Ok(false)
    }

    async fn effect_applies(
        &self,
        rule: &Rule,
        classification: &OperationClassification,
        _tool: &str,
        _args: &Value,
    ) -> RuleResult<bool> {
        let effect = rule.effect.to_ascii_lowercase();
        if effect.contains("skills") {
            return Ok(classification.operation_type == OperationType::SkillModify);
        }
        if effect.contains("write") {
            return Ok(matches!(
                classification.operation_type,
                OperationType::WriteLocal
                    | OperationType::WriteExternal
                    | OperationType::WriteSensitive
                    | OperationType::SkillModify
            ));
        }
        Ok(false)
    }
}

/// How the channel answers approval requests.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum AutoRespond {
    Approve,
    Deny,
    Never,
}

/// Recording channel that optionally answers its own approval requests
/// with the correct `tool_call_id`.
pub struct RecordingChannel {
    auto: AutoRespond,
    inbound: Mutex<VecDeque<ClientMessage>>,
    sent: Mutex<Vec<ServerMessage>>,
}

impl RecordingChannel {
    pub fn new(auto: AutoRespond) -> Self {
        Self {
            auto,
            inbound: Mutex::new(VecDeque::new()),
            sent: Mutex::new(Vec::new()),
        }
    }

    pub fn sent(&self) -> Vec<ServerMessage> {
        self.sent.lock().unwrap().clone()
    }

    pub fn approval_requests_sent(&self) -> usize {
        self.sent()
            .iter()
            .filter(|m| matches!(m, ServerMessage::ApprovalRequest { .. }))
            .count()
    }
}

#[async_trait]
impl Channel for RecordingChannel {
    async fn send(&self, message: ServerMessage) -> CoreResult<()> {
        if let ServerMessage::ApprovalRequest { tool_call_id, .. } = &message {
            match self.auto {
                AutoRespond::Approve => {
                    self.inbound
                        .lock()
                        .unwrap()
                        .push_back(ClientMessage::ApprovalResponse {
                            tool_call_id: tool_call_id.clone(),
                            approved: true,
                        });
                }
                AutoRespond::Deny => {
                    self.inbound
                        .lock()
                        .unwrap()
                        .push_back(ClientMessage::ApprovalResponse {
                            tool_call_id: tool_call_id.clone(),
                            approved: false,
                        });
                }
                AutoRespond::Never => {}
            }
        }
        self.sent.lock().unwrap().push(message);
        Ok(())
    }

    async fn receive(&self) -> Option<ClientMessage> {
        self.inbound.lock().unwrap().pop_front()
    }

    async fn close(&self) {}
}

/// A silent channel whose receive never resolves (user walked away).
pub struct SilentChannel;

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

/// A channel whose peer is already gone.
pub struct ClosedChannel;

#[async_trait]
impl Channel for ClosedChannel {
    async fn send(&self, _message: ServerMessage) -> CoreResult<()> {
        Err(CoreError::ChannelClosed)
    }

    async fn receive(&self) -> Option<ClientMessage> {
        None
    }

    async fn close(&self) {}
}

/// A full pipeline over a temp data dir with the scripted classifier and
/// keyword evaluator.
pub struct Fixture {
    pub sessions: Arc<SessionManager>,
    pub rules: Arc<RuleStore>,
    pub gate: Arc<SecurityGate>,
    _dir: tempfile::TempDir,
}

impl Fixture {
    pub fn new(rules_yaml: &str) -> Self {
        Self::with_timeout(rules_yaml, Duration::from_secs(600))
    }

    pub fn with_timeout(rules_yaml: &str, approval_timeout: Duration) -> Self {
        let dir = tempfile::tempdir().unwrap();
        std::fs::write(dir.path().join("rules.yaml"), rules_yaml).unwrap();

        let sessions = Arc::new(SessionManager::new(dir.path()).unwrap());
        let rules = Arc::new(RuleStore::load(&dir.path().join("rules.yaml")).unwrap());
        let gate = Arc::new(SecurityGate::new(
            OperationClassifier::new(Arc::new(ScriptedClassifierProvider)),
            RuleEngine::new(Arc::new(KeywordEvaluator)),
            ApprovalGate::new(approval_timeout),
            Arc::clone(&sessions),
            Arc::clone(&rules),
        ));

        Self {
            sessions,
            rules,
            gate,
            _dir: dir,
        }
    }
}
