//! Configuration for the Carapace gateway.
//!
//! Everything lives under a single data directory (default `./data`,
//! overridden by `CARAPACE_DATA_DIR`):
//!
//! ```text
//! config.yaml      server and agent configuration
//! rules.yaml       security rule definitions
//! server.token     bearer token, generated on first start (mode 0600)
//! sessions/<id>/   per-session state and history
//! ```
//!
//! Malformed configuration fails loading atomically; a missing file yields
//! defaults.

#![deny(unsafe_code)]
#![warn(missing_docs)]
#![warn(unreachable_pub)]

pub mod auth;
pub mod error;
pub mod loader;
pub mod types;

pub use auth::ensure_token;
pub use error::{ConfigError, ConfigResult};
pub use loader::{data_dir, ensure_data_dir, load_config};
pub use types::Config;
