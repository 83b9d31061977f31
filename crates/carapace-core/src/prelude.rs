//! Convenient re-exports for downstream crates.

pub use crate::channel::Channel;
pub use crate::classification::{OperationClassification, OperationType};
pub use crate::error::{CoreError, CoreResult};
pub use crate::history::HistoryEntry;
pub use crate::protocol::{ClientMessage, ServerMessage};
pub use crate::signature::OperationSignature;
pub use crate::types::{SessionId, ToolCallId};
