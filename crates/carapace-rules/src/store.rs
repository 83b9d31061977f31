//! Rule file loading and immutable snapshots.

use std::collections::HashSet;
use std::path::Path;
use std::sync::{Arc, RwLock};

use serde::{Deserialize, Serialize};
use tracing::info;

use crate::error::{RuleError, RuleResult};
use crate::rule::Rule;

/// On-disk shape of `rules.yaml`.
#[derive(Debug, Default, Serialize, Deserialize)]
struct RulesFile {
    #[serde(default)]
    rules: Vec<Rule>,
}

/// An immutable, validated set of rules in file order.
///
/// File order is the tiebreak the engine uses when reporting triggered
/// rules.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct RuleSet {
    rules: Vec<Rule>,
}

impl RuleSet {
    /// Build a rule set from already-parsed rules, validating each.
    ///
    /// # Errors
    ///
    /// Returns [`RuleError::Validation`] for a duplicate or empty id, or an
    /// empty trigger. Validation failures publish nothing.
    pub fn from_rules(rules: Vec<Rule>) -> RuleResult<Self> {
        let mut seen = HashSet::new();
        for rule in &rules {
            if rule.id.trim().is_empty() {
                return Err(RuleError::Validation {
                    rule_id: "<unnamed>".to_string(),
                    message: "rule id must not be empty".to_string(),
                });
            }
            if !seen.insert(rule.id.as_str()) {
                return Err(RuleError::Validation {
                    rule_id: rule.id.clone(),
                    message: "duplicate rule id".to_string(),
                });
            }
            if rule.trigger.trim().is_empty() {
                return Err(RuleError::Validation {
                    rule_id: rule.id.clone(),
                    message: "trigger must not be empty".to_string(),
                });
            }
        }
        Ok(Self { rules })
    }

    /// Parse and validate a YAML rule file body.
    ///
    /// # Errors
    ///
    /// Returns a parse or validation error; nothing is published on failure.
    pub fn parse(raw: &str) -> RuleResult<Self> {
        let file: RulesFile = serde_yaml::from_str(raw)?;
        Self::from_rules(file.rules)
    }

    /// Serialize back to the YAML file shape. Parse → serialize → parse is
    /// identity.
    ///
    /// # Errors
    ///
    /// Returns a serialization error (does not happen for valid rule sets).
    pub fn to_yaml(&self) -> RuleResult<String> {
        let file = RulesFile {
            rules: self.rules.clone(),
        };
        Ok(serde_yaml::to_string(&file)?)
    }

    /// All rules, in file order.
    #[must_use]
    pub fn all(&self) -> &[Rule] {
        &self.rules
    }

    /// Look up a rule by id.
    #[must_use]
    pub fn get(&self, id: &str) -> Option<&Rule> {
        self.rules.iter().find(|r| r.id == id)
    }

    /// Whether a rule with this id exists.
    #[must_use]
    pub fn contains(&self, id: &str) -> bool {
        self.get(id).is_some()
    }

    /// Number of rules.
    #[must_use]
    pub fn len(&self) -> usize {
        self.rules.len()
    }

    /// Whether the set is empty.
    #[must_use]
    pub fn is_empty(&self) -> bool {
        self.rules.is_empty()
    }
}

/// Process-wide holder of the current rule set.
///
/// The snapshot pointer is swapped atomically on reload; a failed reload
/// leaves the running set untouched. Sessions capture a snapshot per turn
/// and never observe a half-loaded set.
#[derive(Debug)]
pub struct RuleStore {
    current: RwLock<Arc<RuleSet>>,
}

impl RuleStore {
    /// Create a store with an empty rule set.
    #[must_use]
    pub fn empty() -> Self {
        Self {
            current: RwLock::new(Arc::new(RuleSet::default())),
        }
    }

    /// Load the rule file at `path`. A missing file yields an empty set.
    ///
    /// # Errors
    ///
    /// Returns a [`RuleError`] when the file exists but is unreadable,
    /// malformed, or invalid.
    pub fn load(path: &Path) -> RuleResult<Self> {
        let set = Self::read_set(path)?;
        info!(path = %path.display(), rules = set.len(), "loaded rule set");
        Ok(Self {
            current: RwLock::new(Arc::new(set)),
        })
    }

    /// Re-read the rule file, swapping the snapshot only on success.
    ///
    /// # Errors
    ///
    /// Returns a [`RuleError`] on failure; the previously loaded set keeps
    /// serving.
    pub fn reload(&self, path: &Path) -> RuleResult<()> {
        let set = Self::read_set(path)?;
        info!(path = %path.display(), rules = set.len(), "reloaded rule set");
        let mut guard = self.current.write().unwrap_or_else(|e| e.into_inner());
        *guard = Arc::new(set);
        Ok(())
    }

    /// The current immutable snapshot.
    #[must_use]
    pub fn snapshot(&self) -> Arc<RuleSet> {
        Arc::clone(&self.current.read().unwrap_or_else(|e| e.into_inner()))
    }

    fn read_set(path: &Path) -> RuleResult<RuleSet> {
        match std::fs::read_to_string(path) {
            Ok(raw) => RuleSet::parse(&raw),
            Err(e) if e.kind() == std::io::ErrorKind::NotFound => Ok(RuleSet::default()),
            Err(e) => Err(RuleError::Read {
                path: path.display().to_string(),
                source: e,
            }),
        }
    }
}
