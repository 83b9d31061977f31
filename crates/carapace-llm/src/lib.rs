//! LLM access for the Carapace security pipeline.
//!
//! The gateway makes two kinds of auxiliary model calls: operation
//! classification and boolean rule judgments. Both go through the
//! [`LlmProvider`] trait so that tests can script answers and so that the
//! agent's main model and the fast classifier model can be configured
//! independently.

#![deny(unsafe_code)]
#![warn(missing_docs)]
#![warn(unreachable_pub)]

pub mod claude;
pub mod error;
pub mod provider;

pub use claude::ClaudeProvider;
pub use error::{LlmError, LlmResult};
pub use provider::{LlmProvider, Message, MessageRole, ProviderConfig};
