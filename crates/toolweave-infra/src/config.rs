//! Global configuration loader for toolweave.
//!
//! Reads `config.toml` from the data directory (`~/.toolweave/` in production)
//! and deserializes it into [`GlobalConfig`]. Falls back to defaults when the
//! file is missing or malformed.

use std::path::{Path, PathBuf};

use thiserror::Error;
use toolweave_types::config::GlobalConfig;

/// Environment variable that overrides the data directory.
pub const DATA_DIR_ENV: &str = "TOOLWEAVE_DATA_DIR";

#[derive(Debug, Error)]
pub enum ConfigError {
    #[error("cannot determine home directory; set {DATA_DIR_ENV}")]
    NoHomeDirectory,
}

/// Resolve the data directory: `TOOLWEAVE_DATA_DIR` if set and non-empty,
/// otherwise `~/.toolweave`.
pub fn resolve_data_dir() -> Result<PathBuf, ConfigError> {
    data_dir_from(std::env::var(DATA_DIR_ENV).ok(), dirs::home_dir())
}

fn data_dir_from(env_value: Option<String>, home: Option<PathBuf>) -> Result<PathBuf, ConfigError> {
    match env_value {
        Some(dir) if !dir.trim().is_empty() => Ok(PathBuf::from(dir)),
        _ => home
            .map(|h| h.join(".toolweave"))
            .ok_or(ConfigError::NoHomeDirectory),
    }
}

/// Load global configuration from `{data_dir}/config.toml`.
///
/// Missing or unparseable files yield [`GlobalConfig::default()`]; the latter
/// is logged at warn level.
pub async fn load_global_config(data_dir: &Path) -> GlobalConfig {
    let config_path = data_dir.join("config.toml");

    let content = match tokio::fs::read_to_string(&config_path).await {
        Ok(content) => content,
        Err(err) if err.kind() == std::io::ErrorKind::NotFound => {
            tracing::debug!(path = %config_path.display(), "no config.toml found, using defaults");
            return GlobalConfig::default();
        }
        Err(err) => {
            tracing::warn!(path = %config_path.display(), error = %err, "failed to read config, using defaults");
            return GlobalConfig::default();
        }
    };

    match toml::from_str::<GlobalConfig>(&content) {
        Ok(config) => {
            tracing::debug!(
                path = %config_path.display(),
                tools = config.tools.len(),
                "loaded config"
            );
            config
        }
        Err(err) => {
            tracing::warn!(path = %config_path.display(), error = %err, "failed to parse config, using defaults");
            GlobalConfig::default()
        }
    }
}
