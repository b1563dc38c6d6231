use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use uuid::Uuid;

#[derive(Debug, Clone, Copy, Serialize, Deserialize, PartialEq, Eq)]
#[serde(rename_all = "snake_case")]
pub enum ActorType {
    System,
    Operator,
}

impl ActorType {
    pub fn as_str(&self) -> &'static str {
        match self {
            ActorType::System => "system",
            ActorType::Operator => "operator",
        }
    }
}

/// Append-only audit row written on every settlement batch and order relay
/// state change. Never mutated.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct AuditLogEntry {
    pub id: Uuid,
    pub entity_type: String,
    pub entity_id: String,
    pub action: String,
    pub previous_state: Option<String>,
    pub new_state: Option<String>,
    pub actor_id: String,
    pub actor_type: ActorType,
    pub description: String,
    pub timestamp: DateTime<Utc>,
}

impl AuditLogEntry {
    /// Entry for a state transition on an auditable entity.
    pub fn transition(
        entity_type: &str,
        entity_id: &str,
        action: &str,
        previous_state: Option<String>,
        new_state: Option<String>,
        actor_id: &str,
        actor_type: ActorType,
        description: String,
    ) -> Self {
        Self {
            id: Uuid::new_v4(),
            entity_type: entity_type.to_string(),
            entity_id: entity_id.to_string(),
            action: action.to_string(),
            previous_state,
            new_state,
            actor_id: actor_id.to_string(),
            actor_type,
            description,
            timestamp: Utc::now(),
        }
    }
}
