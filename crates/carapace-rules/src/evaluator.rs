//! The LLM seam for rule judgments.
//!
//! Both judgments are boolean: has a trigger condition become true, and
//! does a rule's effect cover a specific operation. The trait lets tests
//! script answers; the production implementation prompts the auxiliary
//! model.

use async_trait::async_trait;
use serde_json::Value;
use std::sync::Arc;

use carapace_core::OperationClassification;
use carapace_llm::LlmProvider;

use crate::error::{RuleError, RuleResult};
use crate::rule::Rule;

/// Answers the two boolean questions the engine asks about a rule.
#[async_trait]
pub trait RuleEvaluator: Send + Sync {
    /// Has this rule's trigger condition become true, given the session so
    /// far and the operation about to run?
    async fn trigger_fired(
        &self,
        rule: &Rule,
        activated_rules: &[String],
        history_summary: &str,
        classification: &OperationClassification,
    ) -> RuleResult<bool>;

    /// Does this rule's effect restrict the specific operation?
    async fn effect_applies(
        &self,
        rule: &Rule,
        classification: &OperationClassification,
        tool: &str,
        args: &Value,
    ) -> RuleResult<bool>;
}

const EVALUATOR_SYSTEM: &str = "\
You are a security rule evaluator. You will be given a rule with a trigger \
condition and an effect description, session context, and an operation \
classification. Answer with exactly one word, true or false.

Be precise. If a rule says 'block all write operations' and the operation \
is a read, answer false. If the rule says 'block outbound communication' \
and the operation is writing a local file, answer false.";

/// Production evaluator backed by the fast auxiliary model.
pub struct LlmRuleEvaluator {
    provider: Arc<dyn LlmProvider>,
}

impl LlmRuleEvaluator {
    /// Create an evaluator over a provider.
    #[must_use]
    pub fn new(provider: Arc<dyn LlmProvider>) -> Self {
        Self { provider }
    }

    async fn ask(&self, prompt: &str) -> RuleResult<bool> {
        let answer = self
            .provider
            .complete_simple(EVALUATOR_SYSTEM, prompt)
            .await
            .map_err(|e| RuleError::Evaluation(e.to_string()))?;
        parse_bool(&answer)
            .ok_or_else(|| RuleError::Evaluation(format!("unparseable evaluator answer: {answer}")))
    }
}

#[async_trait]
impl RuleEvaluator for LlmRuleEvaluator {
    async fn trigger_fired(
        &self,
        rule: &Rule,
        activated_rules: &[String],
        history_summary: &str,
        classification: &OperationClassification,
    ) -> RuleResult<bool> {
        let prompt = format!(
            "Rule trigger: \"{}\"\n\
             Current operation: {} (categories: {:?}, description: {})\n\
             Already activated rules: {:?}\n\
             Session so far:\n{}\n\n\
             Has this trigger condition become true based on the current \
             operation? Answer true if this operation causes the trigger to \
             be met (e.g., if the trigger is 'the agent has read content \
             from the internet' and the operation is read_external, then \
             true). Answer false otherwise.",
            rule.trigger,
            classification.operation_type,
            classification.categories,
            classification.description,
            activated_rules,
            history_summary,
        );
        self.ask(&prompt).await
    }

    async fn effect_applies(
        &self,
        rule: &Rule,
        classification: &OperationClassification,
        tool: &str,
        args: &Value,
    ) -> RuleResult<bool> {
        let prompt = format!(
            "Rule effect: \"{}\"\n\
             Operation type: {}\n\
             Operation categories: {:?}\n\
             Operation description: {}\n\
             Tool: {tool}\n\
             Arguments: {args}\n\n\
             Does this rule's effect restrict/gate this specific operation? \
             Answer true if the operation falls under what the rule \
             restricts. Answer false if the operation is not restricted by \
             this rule.",
            rule.effect,
            classification.operation_type,
            classification.categories,
            classification.description,
        );
        self.ask(&prompt).await
    }
}

/// Parse a model's answer into a boolean. Tolerates case, whitespace, and
/// trailing punctuation, but refuses ambiguous answers.
fn parse_bool(answer: &str) -> Option<bool> {
    let normalized = answer.trim().to_ascii_lowercase();
    let word: String = normalized
        .chars()
        .take_while(|c| c.is_ascii_alphabetic())
        .collect();
    match word.as_str() {
        "true" | "yes" => Some(true),
        "false" | "no" => Some(false),
        _ => None,
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use carapace_core::OperationType;
    use carapace_llm::{LlmResult, Message};

    struct Canned(&'static str);

    #[async_trait]
    impl LlmProvider for Canned {
        fn name(&self) -> &str {
            "canned"
        }

        fn model(&self) -> &str {
            "canned-1"
        }

        async fn complete(&self, _messages: &[Message], _system: &str) -> LlmResult<String> {
            Ok(self.0.to_string())
        }
    }

    fn rule() -> Rule {
        Rule {
            id: "r".to_string(),
            trigger: "the agent has read from the internet".to_string(),
            effect: "writing local files".to_string(),
            mode: crate::rule::RuleMode::Approve,
            description: String::new(),
        }
    }

    #[test]
    fn test_parse_bool() {
        assert_eq!(parse_bool("true"), Some(true));
        assert_eq!(parse_bool("  True.  "), Some(true));
        assert_eq!(parse_bool("FALSE"), Some(false));
        assert_eq!(parse_bool("yes"), Some(true));
        assert_eq!(parse_bool("maybe"), None);
        assert_eq!(parse_bool(""), None);
    }

    #[tokio::test]
    async fn test_trigger_fired_parses_answer() {
        let evaluator = LlmRuleEvaluator::new(Arc::new(Canned("True")));
        let fired = evaluator
            .trigger_fired(
                &rule(),
                &[],
                "",
                &OperationClassification::new(OperationType::ReadExternal),
            )
            .await
            .unwrap();
        assert!(fired);
    }

    #[tokio::test]
    async fn test_garbage_answer_is_error() {
        let evaluator = LlmRuleEvaluator::new(Arc::new(Canned("it depends")));
        let result = evaluator
            .effect_applies(
                &rule(),
                &OperationClassification::new(OperationType::WriteLocal),
                "write_file",
                &serde_json::json!({}),
            )
            .await;
        assert!(matches!(result, Err(RuleError::Evaluation(_))));
    }
}
