//! The Carapace gateway: HTTP control plane and WebSocket data plane.
//!
//! The control plane manages sessions (`GET/POST /sessions`,
//! `GET/DELETE /sessions/{id}`, `GET /sessions/{id}/history`). The data
//! plane is one WebSocket per session (`/chat/{id}`) carrying the duplex
//! protocol from `carapace-core`, including the approval round trips.
//! Both planes are authenticated with the bearer token from
//! `server.token`.

#![deny(unsafe_code)]
#![warn(missing_docs)]
#![warn(unreachable_pub)]

pub mod agent;
pub mod commands;
pub mod error;
pub mod routes;
pub mod server;
pub mod state;
pub mod ws;

pub use agent::{AgentEngine, LlmChatAgent};
pub use error::{GatewayError, GatewayResult};
pub use server::{build_router, run, spawn_retention_sweep};
pub use state::AppState;
