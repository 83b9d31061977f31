//! Deterministic operation signatures.
//!
//! A signature fingerprints one tool invocation for approval and decision
//! caching: two invocations with the same signature are interchangeable.
//! The hash covers the tool name, the canonicalized arguments, the
//! classified operation type, and the sorted category set.
//!
//! Canonicalization sorts object keys recursively and strips volatile keys
//! (timestamps, nonces) at any depth, so that incidental differences
//! re-prompt the user rather than silently reusing an approval.

use serde_json::Value;
use sha2::{Digest, Sha256};
use std::fmt;

use crate::classification::OperationClassification;

/// Argument keys that never participate in a signature.
const VOLATILE_KEYS: &[&str] = &["timestamp", "nonce", "request_id"];

/// A deterministic fingerprint of a tool invocation.
#[derive(
    Debug, Clone, PartialEq, Eq, Hash, PartialOrd, Ord, serde::Serialize, serde::Deserialize,
)]
#[serde(transparent)]
pub struct OperationSignature(String);

impl OperationSignature {
    /// Compute the signature for `(tool, args, classification)`.
    #[must_use]
    pub fn compute(tool: &str, args: &Value, classification: &OperationClassification) -> Self {
        let mut canonical = String::new();
        canonicalize(args, &mut canonical);

        let mut categories: Vec<&str> = classification
            .categories
            .iter()
            .map(String::as_str)
            .collect();
        categories.sort_unstable();

        let mut hasher = Sha256::new();
        hasher.update(tool.as_bytes());
        hasher.update([0x1f]);
        hasher.update(canonical.as_bytes());
        hasher.update([0x1f]);
        hasher.update(classification.operation_type.as_str().as_bytes());
        hasher.update([0x1f]);
        for category in categories {
            hasher.update(category.as_bytes());
            hasher.update([0x1e]);
        }
        Self(hex::encode(hasher.finalize()))
    }

    /// View the signature as a hex string.
    #[must_use]
    pub fn as_str(&self) -> &str {
        &self.0
    }
}

impl fmt::Display for OperationSignature {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(&self.0)
    }
}

/// Render `value` into `out` with object keys sorted and volatile keys
/// removed. The rendering is JSON-like but stable: `serde_json` map order
/// never leaks into the hash.
fn canonicalize(value: &Value, out: &mut String) {
    match value {
        Value::Object(map) => {
            let mut keys: Vec<&String> = map
                .keys()
                .filter(|k| !VOLATILE_KEYS.contains(&k.as_str()))
                .collect();
            keys.sort_unstable();
            out.push('{');
            for (i, key) in keys.iter().enumerate() {
                if i > 0 {
                    out.push(',');
                }
                out.push_str(&Value::String((*key).clone()).to_string());
                out.push(':');
                canonicalize(&map[*key], out);
            }
            out.push('}');
        }
        Value::Array(items) => {
            out.push('[');
            for (i, item) in items.iter().enumerate() {
                if i > 0 {
                    out.push(',');
                }
                canonicalize(item, out);
            }
            out.push(']');
        }
        other => out.push_str(&other.to_string()),
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::classification::OperationType;
    use serde_json::json;

    fn classification() -> OperationClassification {
        OperationClassification::new(OperationType::WriteLocal)
            .with_categories(["documents".to_string(), "backup".to_string()])
    }

    #[test]
    fn test_key_order_does_not_matter() {
        let a = OperationSignature::compute(
            "write_file",
            &json!({"path": "/a", "data": "b"}),
            &classification(),
        );
        let b = OperationSignature::compute(
            "write_file",
            &json!({"data": "b", "path": "/a"}),
            &classification(),
        );
        assert_eq!(a, b);
    }

    #[test]
    fn test_category_order_does_not_matter() {
        let c1 = OperationClassification::new(OperationType::WriteLocal)
            .with_categories(["a".to_string(), "b".to_string()]);
        let c2 = OperationClassification::new(OperationType::WriteLocal)
            .with_categories(["b".to_string(), "a".to_string()]);
        let args = json!({"path": "/a"});
        assert_eq!(
            OperationSignature::compute("t", &args, &c1),
            OperationSignature::compute("t", &args, &c2)
        );
    }

    #[test]
    fn test_volatile_keys_stripped_at_depth() {
        let a = OperationSignature::compute(
            "post",
            &json!({"body": {"nonce": "123", "text": "hi"}, "timestamp": 1}),
            &classification(),
        );
        let b = OperationSignature::compute(
            "post",
            &json!({"body": {"nonce": "999", "text": "hi"}}),
            &classification(),
        );
        assert_eq!(a, b);
    }

    #[test]
    fn test_arg_value_change_re_prompts() {
        let a = OperationSignature::compute("write_file", &json!({"path": "/a"}), &classification());
        let b = OperationSignature::compute("write_file", &json!({"path": "/b"}), &classification());
        assert_ne!(a, b);
    }

    #[test]
    fn test_operation_type_participates() {
        let args = json!({"path": "/a"});
        let read = OperationClassification::new(OperationType::ReadLocal);
        let write = OperationClassification::new(OperationType::WriteLocal);
        assert_ne!(
            OperationSignature::compute("t", &args, &read),
            OperationSignature::compute("t", &args, &write)
        );
    }

    #[test]
    fn test_string_escaping_is_unambiguous() {
        // A crafted key must not collide with a key/value boundary.
        let a = OperationSignature::compute("t", &json!({"a\":1,\"b": 2}), &classification());
        let b = OperationSignature::compute("t", &json!({"a": 1, "b": 2}), &classification());
        assert_ne!(a, b);
    }
}
