//! Plain-English security rules and the engine that enforces them.
//!
//! A rule has a `trigger` (when it arms) and an `effect` (what it
//! restricts), both written in natural language and judged by a fast LLM.
//! The engine keeps a monotonic set of activated rules per session and
//! turns each classified tool invocation into a decision: `allow`,
//! `needs_approval`, or `block`.

#![deny(unsafe_code)]
#![warn(missing_docs)]
#![warn(unreachable_pub)]

pub mod engine;
pub mod error;
pub mod evaluator;
pub mod rule;
pub mod store;

pub use engine::{Decision, GateDecision, RuleEngine};
pub use error::{RuleError, RuleResult};
pub use evaluator::{LlmRuleEvaluator, RuleEvaluator};
pub use rule::{Rule, RuleMode};
pub use store::{RuleSet, RuleStore};
