//! The rule engine.
//!
//! Runs under the session's exclusive lock. One evaluation does, in order:
//!
//! 1. **Activation pass**: every dormant conditional rule is checked
//!    against the session so far; satisfied triggers join
//!    `activated_rules` (monotonic) and invalidate the decision cache.
//!    Disabled rules still activate; disabling suppresses enforcement, not
//!    bookkeeping.
//! 2. **Approved-operation shortcut**: a signature the user has already
//!    approved in this session is allowed without an applicability pass.
//! 3. **Applicability pass**: every in-force rule (always-rules plus
//!    activated, minus disabled) is checked against the concrete
//!    operation. Newly activated rules apply in the same pass that
//!    activated them.
//! 4. **Aggregation**: any applicable `block` rule blocks; otherwise any
//!    applicable `approve` rule requires approval; otherwise allow.
//!
//! Failure asymmetry: an evaluation error during activation counts as
//! "trigger not satisfied" (errors must not create new restrictions), while
//! an error during applicability counts as "applies, approve mode" (errors
//! must never weaken an established restriction).

use serde_json::Value;
use sha2::{Digest, Sha256};
use std::sync::Arc;
use tracing::{debug, warn};

use carapace_core::{OperationClassification, OperationSignature};
use carapace_session::SessionState;

use crate::evaluator::RuleEvaluator;
use crate::rule::RuleMode;
use crate::store::RuleSet;

/// The verdict on one operation.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Decision {
    /// Proceed without user involvement.
    Allow,
    /// Proceed only with user approval.
    NeedsApproval,
    /// Refuse outright; no approval is offered.
    Block,
}

/// Full output of one engine evaluation.
#[derive(Debug, Clone)]
pub struct GateDecision {
    /// The aggregated verdict.
    pub decision: Decision,
    /// Ids of the rules that apply to this operation, in file order.
    pub triggered_rule_ids: Vec<String>,
    /// Human-readable descriptions of the applicable rules.
    pub descriptions: Vec<String>,
    /// One-line explanation of the verdict.
    pub reason: String,
    /// Rule ids activated during this evaluation.
    pub newly_activated: Vec<String>,
}

/// The rule engine. Stateless itself; all session-scoped state lives in
/// [`SessionState`].
pub struct RuleEngine {
    evaluator: Arc<dyn RuleEvaluator>,
}

impl std::fmt::Debug for RuleEngine {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("RuleEngine").finish_non_exhaustive()
    }
}

impl RuleEngine {
    /// Create an engine over an evaluator.
    #[must_use]
    pub fn new(evaluator: Arc<dyn RuleEvaluator>) -> Self {
        Self { evaluator }
    }

    /// Evaluate one classified operation. Must be called with the session's
    /// exclusive lock held; mutates activation state and caches in place.
    pub async fn evaluate(
        &self,
        state: &mut SessionState,
        rules: &RuleSet,
        classification: &OperationClassification,
        tool: &str,
        args: &Value,
        signature: &OperationSignature,
        history_summary: &str,
    ) -> GateDecision {
        let activated_before: Vec<String> = state.activated_rules.iter().cloned().collect();
        let context_hash = activation_context_hash(history_summary, classification);

        // Pass 1: trigger activation.
        let mut newly_activated = Vec::new();
        for rule in rules.all() {
            if rule.is_always() || state.is_rule_activated(&rule.id) {
                continue;
            }
            let cache_key = SessionState::trigger_cache_key(&rule.id, &context_hash);
            let fired = match state.trigger_cache.get(&cache_key) {
                Some(cached) => *cached,
                None => {
                    let outcome = self
                        .evaluator
                        .trigger_fired(rule, &activated_before, history_summary, classification)
                        .await;
                    match outcome {
                        Ok(fired) => {
                            state.trigger_cache.insert(cache_key, fired);
                            fired
                        }
                        Err(e) => {
                            // Fail open: uncertainty must not invent restrictions.
                            warn!(rule_id = %rule.id, error = %e, "trigger evaluation failed, treating as not satisfied");
                            false
                        }
                    }
                }
            };
            if fired {
                state.activate_rule(rule.id.clone());
                newly_activated.push(rule.id.clone());
                debug!(rule_id = %rule.id, "rule activated");
            }
        }

        // Approved-operation shortcut: activation bookkeeping above still
        // ran, but a signature the user already approved skips enforcement.
        if state.is_operation_approved(signature) {
            return GateDecision {
                decision: Decision::Allow,
                triggered_rule_ids: Vec::new(),
                descriptions: Vec::new(),
                reason: "operation previously approved in this session".to_string(),
                newly_activated,
            };
        }

        // Pass 2: applicability of in-force rules.
        let mut triggered_rule_ids = Vec::new();
        let mut descriptions = Vec::new();
        let mut block_hit = false;
        let mut approve_hit = false;

        for rule in rules.all() {
            if state.is_rule_disabled(&rule.id) {
                continue;
            }
            if !rule.is_always() && !state.is_rule_activated(&rule.id) {
                continue;
            }

            let cache_key = SessionState::decision_cache_key(&rule.id, signature);
            let (applies, mode) = match state.decision_cache.get(&cache_key) {
                Some(cached) => (*cached, rule.mode),
                None => {
                    let outcome = self
                        .evaluator
                        .effect_applies(rule, classification, tool, args)
                        .await;
                    match outcome {
                        Ok(applies) => {
                            state.decision_cache.insert(cache_key, applies);
                            (applies, rule.mode)
                        }
                        Err(e) => {
                            // Fail closed: an in-force rule we cannot judge
                            // gates the operation behind approval.
                            warn!(rule_id = %rule.id, error = %e, "effect evaluation failed, requiring approval");
                            (true, RuleMode::Approve)
                        }
                    }
                }
            };

            if applies {
                triggered_rule_ids.push(rule.id.clone());
                descriptions.push(format!("[{}] {}", rule.id, rule.description.trim()));
                match mode {
                    RuleMode::Block => block_hit = true,
                    RuleMode::Approve => approve_hit = true,
                }
            }
        }

        let (decision, reason) = if block_hit {
            (
                Decision::Block,
                format!("blocked by rule(s): {}", triggered_rule_ids.join(", ")),
            )
        } else if approve_hit {
            (
                Decision::NeedsApproval,
                format!(
                    "approval required by rule(s): {}",
                    triggered_rule_ids.join(", ")
                ),
            )
        } else {
            (Decision::Allow, "no applicable rule".to_string())
        };

        GateDecision {
            decision,
            triggered_rule_ids,
            descriptions,
            reason,
            newly_activated,
        }
    }
}

/// Hash of everything a trigger evaluation can see, used as the trigger
/// cache key. Two calls with identical context reuse the first answer.
fn activation_context_hash(
    history_summary: &str,
    classification: &OperationClassification,
) -> String {
    let mut hasher = Sha256::new();
    hasher.update(history_summary.as_bytes());
    hasher.update([0x1f]);
    hasher.update(classification.operation_type.as_str().as_bytes());
    hasher.update([0x1f]);
    for category in &classification.categories {
        hasher.update(category.as_bytes());
        hasher.update([0x1e]);
    }
    hasher.update(classification.description.as_bytes());
    hex::encode(hasher.finalize())
}
