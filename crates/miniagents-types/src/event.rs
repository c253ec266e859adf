//! Event types for the MiniAgents runtime event bus.
//!
//! `RuntimeEvent` is broadcast while agents run. All variants are
//! Clone + Send + Sync for use with tokio broadcast channels.

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use uuid::Uuid;

/// Events emitted by a run context.
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(tag = "type", rename_all = "snake_case")]
pub enum RuntimeEvent {
    /// An agent body began executing for one interaction.
    AgentStarted {
        agent: String,
        interaction_id: Uuid,
        at: DateTime<Utc>,
    },

    /// An agent body returned successfully.
    AgentCompleted {
        agent: String,
        interaction_id: Uuid,
        duration_ms: u64,
    },

    /// An agent body returned an error or panicked.
    AgentFailed {
        agent: String,
        interaction_id: Uuid,
        error: String,
        /// Whether the failure was turned into an error message.
        as_message: bool,
    },

    /// A resolved message was handed to the persisters.
    MessagePersisted { hash_key: String },

    /// The run context was cancelled.
    RunCancelled { run_id: Uuid },
}

impl RuntimeEvent {
    /// Name of the agent this event concerns, if any.
    pub fn agent(&self) -> Option<&str> {
        match self {
            Self::AgentStarted { agent, .. }
            | Self::AgentCompleted { agent, .. }
            | Self::AgentFailed { agent, .. } => Some(agent),
            Self::MessagePersisted { .. } | Self::RunCancelled { .. } => None,
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_agent_failed_json_shape() {
        let event = RuntimeEvent::AgentFailed {
            agent: "echo".to_string(),
            interaction_id: Uuid::now_v7(),
            error: "boom".to_string(),
            as_message: false,
        };
        let json = serde_json::to_string(&event).unwrap();
        assert!(json.contains("\"type\":\"agent_failed\""));
        assert!(json.contains("\"agent\":\"echo\""));

        let parsed: RuntimeEvent = serde_json::from_str(&json).unwrap();
        assert!(matches!(parsed, RuntimeEvent::AgentFailed { .. }));
    }

    #[test]
    fn test_agent_accessor() {
        let started = RuntimeEvent::AgentStarted {
            agent: "a".to_string(),
            interaction_id: Uuid::now_v7(),
            at: Utc::now(),
        };
        assert_eq!(started.agent(), Some("a"));

        let persisted = RuntimeEvent::MessagePersisted {
            hash_key: "abc".to_string(),
        };
        assert_eq!(persisted.agent(), None);
    }
}
