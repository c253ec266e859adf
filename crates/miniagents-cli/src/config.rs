//! Runtime configuration loader.
//!
//! Reads a TOML file into [`RuntimeConfig`]. Falls back to defaults when the
//! file is missing or malformed so a demo run never fails on configuration.

use std::path::Path;

use miniagents_types::config::RuntimeConfig;
use thiserror::Error;

#[derive(Debug, Error)]
pub enum ConfigError {
    #[error("invalid runtime config: {0}")]
    Parse(#[from] toml::de::Error),

    #[error("event_capacity must be at least 1")]
    ZeroEventCapacity,
}

/// Parse and validate a TOML runtime config.
pub fn parse_runtime_config(content: &str) -> Result<RuntimeConfig, ConfigError> {
    let config: RuntimeConfig = toml::from_str(content)?;
    if config.event_capacity == 0 {
        return Err(ConfigError::ZeroEventCapacity);
    }
    Ok(config)
}

/// Load the runtime config from `path`.
///
/// - If the file does not exist, returns [`RuntimeConfig::default()`].
/// - If the file cannot be read or parsed, logs a warning and returns the default.
pub async fn load_runtime_config(path: &Path) -> RuntimeConfig {
    let content = match tokio::fs::read_to_string(path).await {
        Ok(content) => content,
        Err(err) if err.kind() == std::io::ErrorKind::NotFound => {
            tracing::debug!("No config found at {}, using defaults", path.display());
            return RuntimeConfig::default();
        }
        Err(err) => {
            tracing::warn!("Failed to read {}: {err}, using defaults", path.display());
            return RuntimeConfig::default();
        }
    };

    match parse_runtime_config(&content) {
        Ok(config) => config,
        Err(err) => {
            tracing::warn!("Failed to load {}: {err}, using defaults", path.display());
            RuntimeConfig::default()
        }
    }
}
