//! The per-session state document.

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use std::collections::{BTreeMap, BTreeSet};

use carapace_core::{OperationSignature, SessionId};

/// Mutable, persisted state of one session.
///
/// `activated_rules` is monotonic: ids are only ever added. The only way to
/// shed activations is a reset, which retires this session and starts a new
/// one. Both evaluation caches are dropped whenever the set of in-force
/// rules changes, so cached sub-results never outlive the context they were
/// computed in.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct SessionState {
    /// Opaque unique identifier.
    pub session_id: SessionId,
    /// How to reach the user (`cli`, `web`, ...).
    pub channel_type: String,
    /// Channel-specific address, free-form.
    #[serde(default)]
    pub channel_ref: String,
    /// Rule ids whose trigger has fired at least once in this session.
    #[serde(default)]
    pub activated_rules: BTreeSet<String>,
    /// Rule ids the user has explicitly disabled for this session.
    #[serde(default)]
    pub disabled_rules: BTreeSet<String>,
    /// Credential names approved in this session.
    #[serde(default)]
    pub approved_credentials: BTreeSet<String>,
    /// Operation signatures that have been approved in this session.
    #[serde(default)]
    pub approved_operations: BTreeSet<String>,
    /// Cache of trigger evaluations, keyed by rule id and activation-context
    /// hash.
    #[serde(default)]
    pub trigger_cache: BTreeMap<String, bool>,
    /// Cache of effect-applicability evaluations, keyed by rule id and
    /// operation signature.
    #[serde(default)]
    pub decision_cache: BTreeMap<String, bool>,
    /// Set when this session was retired by a reset.
    #[serde(default)]
    pub retired: bool,
    /// The session that replaced this one after a reset.
    #[serde(default)]
    pub successor: Option<SessionId>,
    /// Creation time.
    pub created_at: DateTime<Utc>,
    /// Last activity time.
    pub last_active: DateTime<Utc>,
}

impl SessionState {
    /// Create a fresh session bound to a channel.
    #[must_use]
    pub fn new(channel_type: impl Into<String>, channel_ref: impl Into<String>) -> Self {
        let now = Utc::now();
        Self {
            session_id: SessionId::generate(),
            channel_type: channel_type.into(),
            channel_ref: channel_ref.into(),
            activated_rules: BTreeSet::new(),
            disabled_rules: BTreeSet::new(),
            approved_credentials: BTreeSet::new(),
            approved_operations: BTreeSet::new(),
            trigger_cache: BTreeMap::new(),
            decision_cache: BTreeMap::new(),
            retired: false,
            successor: None,
            created_at: now,
            last_active: now,
        }
    }

    /// Update the last-active timestamp.
    pub fn touch(&mut self) {
        self.last_active = Utc::now();
    }

    /// Record a rule activation. Returns `true` when the id was new.
    ///
    /// Clears the decision cache: applicability answers computed before the
    /// activation no longer describe the in-force rule set.
    pub fn activate_rule(&mut self, rule_id: impl Into<String>) -> bool {
        let added = self.activated_rules.insert(rule_id.into());
        if added {
            self.decision_cache.clear();
        }
        added
    }

    /// Disable a rule for this session. Returns `true` when newly disabled.
    pub fn disable_rule(&mut self, rule_id: impl Into<String>) -> bool {
        let added = self.disabled_rules.insert(rule_id.into());
        if added {
            self.decision_cache.clear();
        }
        added
    }

    /// Re-enable a previously disabled rule. Returns `true` when it was
    /// disabled.
    pub fn enable_rule(&mut self, rule_id: &str) -> bool {
        let removed = self.disabled_rules.remove(rule_id);
        if removed {
            self.decision_cache.clear();
        }
        removed
    }

    /// Whether the rule is disabled in this session.
    #[must_use]
    pub fn is_rule_disabled(&self, rule_id: &str) -> bool {
        self.disabled_rules.contains(rule_id)
    }

    /// Whether the rule has been activated in this session.
    #[must_use]
    pub fn is_rule_activated(&self, rule_id: &str) -> bool {
        self.activated_rules.contains(rule_id)
    }

    /// Record an approved operation signature.
    pub fn approve_operation(&mut self, signature: &OperationSignature) {
        self.approved_operations.insert(signature.as_str().to_string());
    }

    /// Whether an operation signature has been approved in this session.
    #[must_use]
    pub fn is_operation_approved(&self, signature: &OperationSignature) -> bool {
        self.approved_operations.contains(signature.as_str())
    }

    /// Record an approved credential name.
    pub fn approve_credential(&mut self, name: impl Into<String>) {
        self.approved_credentials.insert(name.into());
    }

    /// Cache key for a trigger evaluation.
    #[must_use]
    pub fn trigger_cache_key(rule_id: &str, context_hash: &str) -> String {
        format!("{rule_id}\u{1f}{context_hash}")
    }

    /// Cache key for an effect-applicability evaluation.
    #[must_use]
    pub fn decision_cache_key(rule_id: &str, signature: &OperationSignature) -> String {
        format!("{rule_id}\u{1f}{}", signature.as_str())
    }
}
