//! Carapace Core - Foundation types for the Carapace security gateway.
//!
//! This crate provides:
//! - Identifier newtypes (`SessionId`, `ToolCallId`)
//! - The operation classification model produced by the auxiliary LLM
//! - Deterministic operation signatures for approval/decision caching
//! - Append-only session history entries
//! - The duplex wire protocol spoken over a session channel
//! - The [`Channel`] trait connecting the approval gate to a frontend

#![deny(unsafe_code)]
#![warn(missing_docs)]
#![warn(unreachable_pub)]

pub mod channel;
pub mod classification;
pub mod error;
pub mod history;
pub mod prelude;
pub mod protocol;
pub mod signature;
pub mod types;

pub use channel::Channel;
pub use classification::{OperationClassification, OperationType};
pub use error::{CoreError, CoreResult};
pub use history::HistoryEntry;
pub use protocol::{ClientMessage, ServerMessage};
pub use signature::OperationSignature;
pub use types::{SessionId, ToolCallId};
