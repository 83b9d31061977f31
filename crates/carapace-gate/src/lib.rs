//! The security gate: every tool invocation passes through here.
//!
//! [`SecurityGate::gate`] is the single entry point the agent loop calls
//! from its tool-dispatch path. It composes the operation classifier, the
//! rule engine, and the approval gate, updates session state, and returns
//! a [`GateResult`].

#![deny(unsafe_code)]
#![warn(missing_docs)]
#![warn(unreachable_pub)]

pub mod approval;
pub mod classifier;
pub mod orchestrator;

pub use approval::{ApprovalGate, ApprovalOutcome, PendingApproval};
pub use classifier::OperationClassifier;
pub use orchestrator::{GateResult, SecurityGate};
