//! Data-directory resolution, bootstrap, and config loading.

use std::path::{Path, PathBuf};

use tracing::info;

use crate::error::{ConfigError, ConfigResult};
use crate::types::Config;

/// Environment variable naming the data root.
pub const DATA_DIR_ENV: &str = "CARAPACE_DATA_DIR";

const CONFIG_FILE: &str = "config.yaml";
const RULES_FILE: &str = "rules.yaml";

/// Default `config.yaml` written on first start.
const DEFAULT_CONFIG_YAML: &str = "\
carapace:
  log_level: info
server:
  host: 127.0.0.1
  port: 8321
agent:
  model: claude-sonnet-4-20250514
  classifier_model: claude-3-5-haiku-20241022
sessions:
  history_retention_days: 90
  approval_timeout_secs: 600
";

/// Default `rules.yaml` written on first start.
const DEFAULT_RULES_YAML: &str = "\
rules:
  - id: skill-modification
    trigger: always
    effect: creating, editing, or deleting skill files
    mode: approve
    description: Changes to skills need your approval.
  - id: no-write-after-web
    trigger: the agent has read content from the internet
    effect: writing local files or sending data externally
    mode: approve
    description: After reading from the web, writes need your approval.
";

/// Resolve the data directory from `CARAPACE_DATA_DIR`, defaulting to
/// `./data`.
#[must_use]
pub fn data_dir() -> PathBuf {
    std::env::var(DATA_DIR_ENV)
        .map(PathBuf::from)
        .unwrap_or_else(|_| PathBuf::from("./data"))
}

/// Ensure the data directory exists with a default `config.yaml`,
/// `rules.yaml`, and sessions root. Existing files are never overwritten.
///
/// Returns the relative paths that were created.
///
/// # Errors
///
/// Returns a [`ConfigError`] if a directory or seed file cannot be created.
pub fn ensure_data_dir(data_dir: &Path) -> ConfigResult<Vec<String>> {
    let mut created = Vec::new();

    for dir in [data_dir.to_path_buf(), data_dir.join("sessions")] {
        std::fs::create_dir_all(&dir).map_err(|e| ConfigError::Write {
            path: dir.display().to_string(),
            source: e,
        })?;
    }

    for (name, contents) in [
        (CONFIG_FILE, DEFAULT_CONFIG_YAML),
        (RULES_FILE, DEFAULT_RULES_YAML),
    ] {
        let path = data_dir.join(name);
        if !path.exists() {
            std::fs::write(&path, contents).map_err(|e| ConfigError::Write {
                path: path.display().to_string(),
                source: e,
            })?;
            info!(path = %path.display(), "seeded default file");
            created.push(name.to_string());
        }
    }

    Ok(created)
}

/// Load `config.yaml` from the data directory.
///
/// A missing file yields the default configuration; a malformed or invalid
/// file is an error, so a bad edit never half-applies.
///
/// # Errors
///
/// Returns a [`ConfigError`] if the file exists but cannot be read, parsed,
/// or validated.
pub fn load_config(data_dir: &Path) -> ConfigResult<Config> {
    let path = data_dir.join(CONFIG_FILE);
    let config = match std::fs::read_to_string(&path) {
        Ok(raw) => serde_yaml::from_str(&raw).map_err(|e| ConfigError::Parse {
            path: path.display().to_string(),
            source: e,
        })?,
        Err(e) if e.kind() == std::io::ErrorKind::NotFound => Config::default(),
        Err(e) => {
            return Err(ConfigError::Read {
                path: path.display().to_string(),
                source: e,
            })
        }
    };
    config.validate()?;
    Ok(config)
}
