//! Runtime configuration types for MiniAgents.
//!
//! `RuntimeConfig` controls how a run context schedules producers and agents,
//! how agent failures surface, and whether resolved messages are handed to
//! persistence hooks. Loaded from `miniagents.toml`; every field has a default.

use serde::{Deserialize, Serialize};

/// When producers and agent bodies start running.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum SchedulingMode {
    /// Start as soon as the promise is created (agents start at `inquire`).
    #[default]
    Eager,
    /// Start on the first demand for the promise's pieces or value.
    OnDemand,
}

/// Top-level configuration for a run context.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct RuntimeConfig {
    /// Scheduling mode for producers and agent bodies.
    #[serde(default)]
    pub scheduling: SchedulingMode,

    /// Emit agent failures as a trailing error message instead of failing the
    /// agent's output sequence.
    #[serde(default)]
    pub errors_as_messages: bool,

    /// Capacity of the runtime event broadcast channel.
    #[serde(default = "default_event_capacity")]
    pub event_capacity: usize,

    /// Hand every resolved message to the registered persisters.
    #[serde(default = "default_persist_messages")]
    pub persist_messages: bool,
}

fn default_event_capacity() -> usize {
    1024
}

fn default_persist_messages() -> bool {
    true
}

impl Default for RuntimeConfig {
    fn default() -> Self {
        Self {
            scheduling: SchedulingMode::default(),
            errors_as_messages: false,
            event_capacity: default_event_capacity(),
            persist_messages: default_persist_messages(),
        }
    }
}

impl RuntimeConfig {
    /// Default configuration with on-demand scheduling.
    pub fn on_demand() -> Self {
        Self {
            scheduling: SchedulingMode::OnDemand,
            ..Self::default()
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_runtime_config_default_values() {
        let config = RuntimeConfig::default();
        assert_eq!(config.scheduling, SchedulingMode::Eager);
        assert!(!config.errors_as_messages);
        assert_eq!(config.event_capacity, 1024);
        assert!(config.persist_messages);
    }

    #[test]
    fn test_runtime_config_deserialize_with_defaults() {
        let config: RuntimeConfig = toml::from_str("").unwrap();
        assert_eq!(config, RuntimeConfig::default());
    }

    #[test]
    fn test_runtime_config_deserialize_with_values() {
        let toml_str = r#"
scheduling = "on_demand"
errors_as_messages = true
event_capacity = 64
persist_messages = false
"#;
        let config: RuntimeConfig = toml::from_str(toml_str).unwrap();
        assert_eq!(config.scheduling, SchedulingMode::OnDemand);
        assert!(config.errors_as_messages);
        assert_eq!(config.event_capacity, 64);
        assert!(!config.persist_messages);
    }

    #[test]
    fn test_unknown_scheduling_mode_rejected() {
        let result: Result<RuntimeConfig, _> = toml::from_str(r#"scheduling = "whenever""#);
        assert!(result.is_err());
    }

    #[test]
    fn test_runtime_config_serde_roundtrip() {
        let config = RuntimeConfig::on_demand();
        let json = serde_json::to_string(&config).unwrap();
        assert!(json.contains("\"on_demand\""));
        let parsed: RuntimeConfig = serde_json::from_str(&json).unwrap();
        assert_eq!(parsed, config);
    }
}
