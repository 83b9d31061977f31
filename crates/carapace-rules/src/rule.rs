//! The rule model.

use serde::{Deserialize, Serialize};
use std::fmt;

/// What happens when a rule applies to an operation.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum RuleMode {
    /// The operation is gated behind a user approval.
    #[default]
    Approve,
    /// The operation is refused outright, no approval offered.
    Block,
}

impl fmt::Display for RuleMode {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Self::Approve => f.write_str("approve"),
            Self::Block => f.write_str("block"),
        }
    }
}

/// A named, plain-English security constraint. Immutable after load.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct Rule {
    /// Stable identifier, unique within a rule file.
    pub id: String,
    /// Either the literal `always`, or a natural-language condition over
    /// the session's history.
    pub trigger: String,
    /// Natural-language description of which operations the rule restricts.
    pub effect: String,
    /// What applying the rule does.
    #[serde(default)]
    pub mode: RuleMode,
    /// Human-readable text shown in approval prompts.
    #[serde(default)]
    pub description: String,
}

impl Rule {
    /// Whether this rule is in force from session creation.
    #[must_use]
    pub fn is_always(&self) -> bool {
        self.trigger.trim().eq_ignore_ascii_case("always")
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn rule(trigger: &str) -> Rule {
        Rule {
            id: "r".to_string(),
            trigger: trigger.to_string(),
            effect: "e".to_string(),
            mode: RuleMode::Approve,
            description: String::new(),
        }
    }

    #[test]
    fn test_always_detection() {
        assert!(rule("always").is_always());
        assert!(rule("  Always  ").is_always());
        assert!(rule("ALWAYS").is_always());
    }

    #[test]
    fn test_conditional_is_not_always() {
        assert!(!rule("when the agent reads external data").is_always());
        assert!(!rule("").is_always());
    }

    #[test]
    fn test_mode_defaults_to_approve() {
        let parsed: Rule =
            serde_yaml::from_str("id: r\ntrigger: always\neffect: everything\n").unwrap();
        assert_eq!(parsed.mode, RuleMode::Approve);
        assert!(parsed.description.is_empty());
    }

    #[test]
    fn test_mode_wire_names() {
        assert_eq!(serde_json::to_string(&RuleMode::Block).unwrap(), "\"block\"");
        assert_eq!(RuleMode::Approve.to_string(), "approve");
    }
}
