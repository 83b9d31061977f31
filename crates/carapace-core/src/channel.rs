//! The channel abstraction between the core and a frontend.
//!
//! A channel is an already-authenticated duplex message stream scoped to a
//! single session. The approval gate only ever calls
//! [`Channel::send`] with an `approval_request` and reads responses back;
//! the rest of the protocol flows through the same pair of methods in the
//! connection loop.

use async_trait::async_trait;

use crate::error::CoreResult;
use crate::protocol::{ClientMessage, ServerMessage};

/// A duplex, per-session message stream.
///
/// Implementations own the transport (a WebSocket, an in-memory pair in
/// tests) and are responsible for connection-level authentication; the core
/// treats every message received here as already authenticated.
#[async_trait]
pub trait Channel: Send + Sync {
    /// Send a message to the client.
    ///
    /// # Errors
    ///
    /// Returns [`crate::CoreError::ChannelClosed`] when the connection is
    /// gone; callers treat this as a disconnect.
    async fn send(&self, message: ServerMessage) -> CoreResult<()>;

    /// Receive the next message from the client.
    ///
    /// Returns `None` once the connection has closed and all buffered
    /// messages have been drained.
    async fn receive(&self) -> Option<ClientMessage>;

    /// Close the channel. Subsequent sends fail and receives drain to
    /// `None`.
    async fn close(&self);
}
