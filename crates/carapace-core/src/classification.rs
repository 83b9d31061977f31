//! Operation classification model.
//!
//! Every tool invocation is classified by a fast auxiliary LLM before the
//! rule engine sees it. The classification is deliberately coarse: an
//! operation type from a closed vocabulary plus free-form category tags.

use serde::{Deserialize, Serialize};
use std::fmt;

/// The closed vocabulary of operation types.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum OperationType {
    /// Reading files, listing directories, read-only shell commands.
    ReadLocal,
    /// Writing or modifying local files.
    WriteLocal,
    /// Reading from the internet, APIs, external services.
    ReadExternal,
    /// Sending emails, posting to APIs, outbound communication.
    WriteExternal,
    /// Reading personal data (finances, health, documents).
    ReadSensitive,
    /// Modifying personal or sensitive data.
    WriteSensitive,
    /// Running arbitrary code or commands that modify state.
    Execute,
    /// Fetching or using credentials or secrets.
    CredentialAccess,
    /// Reading agent memory files.
    MemoryRead,
    /// Writing or modifying agent memory files.
    MemoryWrite,
    /// Creating, editing, or deleting skill files.
    SkillModify,
}

impl OperationType {
    /// Every operation type, in declaration order.
    pub const ALL: [Self; 11] = [
        Self::ReadLocal,
        Self::WriteLocal,
        Self::ReadExternal,
        Self::WriteExternal,
        Self::ReadSensitive,
        Self::WriteSensitive,
        Self::Execute,
        Self::CredentialAccess,
        Self::MemoryRead,
        Self::MemoryWrite,
        Self::SkillModify,
    ];

    /// The wire name of this operation type.
    #[must_use]
    pub fn as_str(self) -> &'static str {
        match self {
            Self::ReadLocal => "read_local",
            Self::WriteLocal => "write_local",
            Self::ReadExternal => "read_external",
            Self::WriteExternal => "write_external",
            Self::ReadSensitive => "read_sensitive",
            Self::WriteSensitive => "write_sensitive",
            Self::Execute => "execute",
            Self::CredentialAccess => "credential_access",
            Self::MemoryRead => "memory_read",
            Self::MemoryWrite => "memory_write",
            Self::SkillModify => "skill_modify",
        }
    }
}

impl fmt::Display for OperationType {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

fn default_confidence() -> f64 {
    1.0
}

/// Structured classification of a single tool invocation.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct OperationClassification {
    /// The classified operation type.
    pub operation_type: OperationType,
    /// Free-form domain tags, e.g. `finance`, `email`, `documents`.
    #[serde(default)]
    pub categories: Vec<String>,
    /// Short natural-language summary of the operation.
    #[serde(default)]
    pub description: String,
    /// Classifier confidence in `[0, 1]`. Zero when the model was
    /// unreachable or its output unparseable.
    #[serde(default = "default_confidence")]
    pub confidence: f64,
}

impl OperationClassification {
    /// Create a classification with full confidence and no categories.
    #[must_use]
    pub fn new(operation_type: OperationType) -> Self {
        Self {
            operation_type,
            categories: Vec::new(),
            description: String::new(),
            confidence: 1.0,
        }
    }

    /// The conservative fallback used when the classifier cannot produce a
    /// real answer: `execute` at zero confidence, which the broadest rules
    /// are written to gate.
    #[must_use]
    pub fn unclassified() -> Self {
        Self {
            operation_type: OperationType::Execute,
            categories: Vec::new(),
            description: "unclassified".to_string(),
            confidence: 0.0,
        }
    }

    /// Add category tags.
    #[must_use]
    pub fn with_categories(mut self, categories: impl IntoIterator<Item = String>) -> Self {
        self.categories.extend(categories);
        self
    }

    /// Set the description.
    #[must_use]
    pub fn with_description(mut self, description: impl Into<String>) -> Self {
        self.description = description.into();
        self
    }

    /// Set the confidence, clamped to `[0, 1]`.
    #[must_use]
    pub fn with_confidence(mut self, confidence: f64) -> Self {
        self.confidence = confidence.clamp(0.0, 1.0);
        self
    }
}

impl fmt::Display for OperationClassification {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}", self.operation_type)?;
        if !self.categories.is_empty() {
            write!(f, " ({})", self.categories.join(", "))?;
        }
        Ok(())
    }
}
