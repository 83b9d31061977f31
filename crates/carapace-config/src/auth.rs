//! Bearer-token bootstrap.
//!
//! The token authenticates both the HTTP control plane and WebSocket
//! upgrades. It is generated once, stored in `server.token` with owner-only
//! permissions, and reused on subsequent starts.

use std::path::Path;

use base64::engine::general_purpose::URL_SAFE_NO_PAD;
use base64::Engine;
use rand::RngCore;

use crate::error::{ConfigError, ConfigResult};

const TOKEN_FILE: &str = "server.token";
const TOKEN_BYTES: usize = 32;

/// Return the bearer token, generating one on first call.
///
/// # Errors
///
/// Returns a [`ConfigError`] if the token file cannot be read or written.
pub fn ensure_token(data_dir: &Path) -> ConfigResult<String> {
    let path = data_dir.join(TOKEN_FILE);

    match std::fs::read_to_string(&path) {
        Ok(existing) => {
            let token = existing.trim().to_string();
            if !token.is_empty() {
                return Ok(token);
            }
        }
        Err(e) if e.kind() == std::io::ErrorKind::NotFound => {}
        Err(e) => {
            return Err(ConfigError::Read {
                path: path.display().to_string(),
                source: e,
            })
        }
    }

    let mut bytes = [0u8; TOKEN_BYTES];
    rand::thread_rng().fill_bytes(&mut bytes);
    let token = URL_SAFE_NO_PAD.encode(bytes);

    std::fs::write(&path, format!("{token}\n")).map_err(|e| ConfigError::Write {
        path: path.display().to_string(),
        source: e,
    })?;

    #[cfg(unix)]
    {
        use std::os::unix::fs::PermissionsExt;
        let perms = std::fs::Permissions::from_mode(0o600);
        std::fs::set_permissions(&path, perms).map_err(|e| ConfigError::Write {
            path: path.display().to_string(),
            source: e,
        })?;
    }

    Ok(token)
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_token_generated_once() {
        let dir = tempfile::tempdir().unwrap();
        let first = ensure_token(dir.path()).unwrap();
        let second = ensure_token(dir.path()).unwrap();
        assert_eq!(first, second);
        assert!(first.len() >= 40);
    }

    #[test]
    fn test_token_is_url_safe() {
        let dir = tempfile::tempdir().unwrap();
        let token = ensure_token(dir.path()).unwrap();
        assert!(token
            .chars()
            .all(|c| c.is_ascii_alphanumeric() || c == '-' || c == '_'));
    }

    #[cfg(unix)]
    #[test]
    fn test_token_file_mode() {
        use std::os::unix::fs::PermissionsExt;
        let dir = tempfile::tempdir().unwrap();
        ensure_token(dir.path()).unwrap();
        let mode = std::fs::metadata(dir.path().join(TOKEN_FILE))
            .unwrap()
            .permissions()
            .mode();
        assert_eq!(mode & 0o777, 0o600);
    }

    #[test]
    fn test_empty_token_file_regenerated() {
        let dir = tempfile::tempdir().unwrap();
        std::fs::write(dir.path().join(TOKEN_FILE), "\n").unwrap();
        let token = ensure_token(dir.path()).unwrap();
        assert!(!token.is_empty());
    }
}
