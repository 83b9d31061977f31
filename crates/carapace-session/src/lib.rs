//! Session management for the Carapace gateway.
//!
//! A session is a persistent conversation context with its own
//! rule-activation state and history. This crate owns:
//!
//! - [`SessionState`]: the mutable, persisted per-session record
//! - [`SessionManager`]: creation, exclusive locking, persistence, listing,
//!   deletion, reset, and the retention sweep
//!
//! State is only ever mutated through a [`SessionHandle`], which holds the
//! session's exclusive lock for the duration of an agent turn. History is an
//! append-only JSON-lines file flushed before any dependent state change;
//! the state document is rewritten atomically (write-temp-then-rename).

#![deny(unsafe_code)]
#![warn(missing_docs)]
#![warn(unreachable_pub)]

pub mod error;
pub mod manager;
pub mod state;

pub use error::{SessionError, SessionResult};
pub use manager::{SessionHandle, SessionInfo, SessionManager};
pub use state::SessionState;
