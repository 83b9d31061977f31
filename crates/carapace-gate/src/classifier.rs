//! The operation classifier.
//!
//! One fast LLM call per tool invocation, turning `(tool, args)` into an
//! [`OperationClassification`]. The classifier is fail-safe: a model error
//! or unparseable output yields the conservative default (`execute` at
//! confidence zero) rather than an error, so the pipeline always has a
//! classification to enforce against. Post-processing is deterministic for
//! a fixed model response.

use serde_json::Value;
use std::sync::Arc;
use tracing::{debug, warn};

use carapace_core::OperationClassification;
use carapace_llm::LlmProvider;

/// Cap on argument text included in the prompt.
const MAX_ARGS_CHARS: usize = 2000;

const CLASSIFIER_SYSTEM: &str = "\
You are a security classifier for an AI agent system. Given a tool name, \
its arguments, and an optional hint, classify the operation.

Operation types:
- read_local: reading files, listing directories, read-only shell commands
- write_local: writing/modifying local files
- read_external: reading from the internet, APIs, external services
- write_external: sending emails, posting to APIs, outbound communication
- read_sensitive: reading personal data (finances, health, documents)
- write_sensitive: modifying personal/sensitive data
- execute: running arbitrary code or commands that modify state
- credential_access: fetching or using credentials/secrets
- memory_read: reading agent memory files
- memory_write: writing/modifying agent memory files
- skill_modify: creating, editing, or deleting skill files

Categories are free-form tags like: finance, email, documents, web, \
skills, shell, memory, health.

Be precise. A shell command like 'ls' or 'cat' is read_local. A shell \
command like 'rm' or 'curl -X POST' is execute or write_external. Reading \
a file in memory/ is memory_read. Writing to memory/ is memory_write.

Respond with a single JSON object: {\"operation_type\": ..., \
\"categories\": [...], \"description\": ..., \"confidence\": 0.0-1.0}. \
No other text.";

/// Classifies tool invocations with the auxiliary model.
pub struct OperationClassifier {
    provider: Arc<dyn LlmProvider>,
}

impl std::fmt::Debug for OperationClassifier {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("OperationClassifier").finish_non_exhaustive()
    }
}

impl OperationClassifier {
    /// Create a classifier over a provider.
    #[must_use]
    pub fn new(provider: Arc<dyn LlmProvider>) -> Self {
        Self { provider }
    }

    /// Classify one tool invocation.
    ///
    /// `hint` is an optional prior from the tool's manifest; the model may
    /// override it. Never fails: model errors produce
    /// [`OperationClassification::unclassified`].
    pub async fn classify(
        &self,
        tool: &str,
        args: &Value,
        hint: Option<&OperationClassification>,
    ) -> OperationClassification {
        let mut args_text = args.to_string();
        if args_text.chars().count() > MAX_ARGS_CHARS {
            args_text = args_text.chars().take(MAX_ARGS_CHARS).collect();
            args_text.push_str("...");
        }

        let mut prompt = format!("Tool: {tool}\nArguments: {args_text}");
        if let Some(hint) = hint {
            prompt.push_str(&format!(
                "\nHint from tool manifest: likely {}",
                hint.operation_type
            ));
        }

        match self
            .provider
            .complete_simple(CLASSIFIER_SYSTEM, &prompt)
            .await
        {
            Ok(text) => match parse_classification(&text) {
                Some(classification) => {
                    debug!(tool, %classification, "classified operation");
                    classification
                }
                None => {
                    warn!(tool, "unparseable classifier output, using conservative default");
                    OperationClassification::unclassified()
                }
            },
            Err(e) => {
                warn!(tool, error = %e, "classifier model unavailable, using conservative default");
                OperationClassification::unclassified()
            }
        }
    }
}

/// Extract a classification from model output. Tolerates prose around the
/// JSON object but nothing else.
fn parse_classification(text: &str) -> Option<OperationClassification> {
    let start = text.find('{')?;
    let end = text.rfind('}')?;
    if end < start {
        return None;
    }
    let parsed: OperationClassification = serde_json::from_str(&text[start..=end]).ok()?;
    Some(OperationClassification {
        confidence: parsed.confidence.clamp(0.0, 1.0),
        ..parsed
    })
}
