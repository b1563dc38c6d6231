use std::sync::Arc;

use affil_core::audit::{ActorType, AuditLogEntry};
use affil_core::repository::AuditLogRepository;
use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use tracing::info;
use uuid::Uuid;

/// Fulfillment hand-off status
#[derive(Debug, Clone, Copy, Serialize, Deserialize, PartialEq, Eq)]
#[serde(rename_all = "snake_case")]
pub enum RelayStatus {
    Created,
    Acknowledged,
    Shipped,
    Delivered,
    Cancelled,
    Failed,
}

impl RelayStatus {
    pub fn is_terminal(&self) -> bool {
        matches!(
            self,
            RelayStatus::Delivered | RelayStatus::Cancelled | RelayStatus::Failed
        )
    }

    /// The forward fulfillment path. Cancelled/Failed are reachable from any
    /// non-terminal state instead.
    fn next_forward(&self) -> Option<RelayStatus> {
        match self {
            RelayStatus::Created => Some(RelayStatus::Acknowledged),
            RelayStatus::Acknowledged => Some(RelayStatus::Shipped),
            RelayStatus::Shipped => Some(RelayStatus::Delivered),
            _ => None,
        }
    }
}

/// Dropshipping order hand-off record. Keyed by a caller-supplied idempotency
/// key so retried webhook deliveries never create duplicate rows.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct OrderRelay {
    pub id: Uuid,
    pub order_id: String,
    pub supplier_id: Uuid,
    pub idempotency_key: String,
    pub status: RelayStatus,
    pub failure_reason: Option<String>,
    pub created_at: DateTime<Utc>,
    pub updated_at: DateTime<Utc>,
}

impl OrderRelay {
    pub fn new(order_id: String, supplier_id: Uuid, idempotency_key: String) -> Self {
        let now = Utc::now();
        Self {
            id: Uuid::new_v4(),
            order_id,
            supplier_id,
            idempotency_key,
            status: RelayStatus::Created,
            failure_reason: None,
            created_at: now,
            updated_at: now,
        }
    }

    /// Moves the relay to `target`. Forward moves must follow
    /// created -> acknowledged -> shipped -> delivered one step at a time;
    /// cancelled/failed are allowed from any non-terminal state.
    pub fn transition(&mut self, target: RelayStatus, reason: Option<String>) -> Result<(), InvalidTransition> {
        let allowed = match target {
            RelayStatus::Cancelled | RelayStatus::Failed => !self.status.is_terminal(),
            _ => self.status.next_forward() == Some(target),
        };
        if !allowed {
            return Err(InvalidTransition {
                from: format!("{:?}", self.status),
                to: format!("{:?}", target),
            });
        }
        if matches!(target, RelayStatus::Cancelled | RelayStatus::Failed) {
            self.failure_reason = reason;
        }
        self.status = target;
        self.updated_at = Utc::now();
        Ok(())
    }
}

#[derive(Debug, thiserror::Error)]
#[error("Invalid relay transition from {from} to {to}")]
pub struct InvalidTransition {
    pub from: String,
    pub to: String,
}

/// Repository trait for relay data access
#[async_trait::async_trait]
pub trait RelayRepository: Send + Sync {
    /// Inserts unless a relay with the same idempotency key exists; always
    /// returns the surviving row.
    async fn insert_idempotent(
        &self,
        relay: &OrderRelay,
    ) -> Result<OrderRelay, Box<dyn std::error::Error + Send + Sync>>;

    async fn get(
        &self,
        id: Uuid,
    ) -> Result<Option<OrderRelay>, Box<dyn std::error::Error + Send + Sync>>;

    async fn list(
        &self,
        page: u32,
        limit: u32,
    ) -> Result<(Vec<OrderRelay>, u64), Box<dyn std::error::Error + Send + Sync>>;

    async fn update(
        &self,
        relay: &OrderRelay,
    ) -> Result<(), Box<dyn std::error::Error + Send + Sync>>;
}

#[derive(Debug, Clone)]
pub struct CreateRelayRequest {
    pub order_id: String,
    pub supplier_id: Uuid,
    pub idempotency_key: String,
}

#[derive(Debug, thiserror::Error)]
pub enum RelayError {
    #[error("Order relay not found: {0}")]
    NotFound(Uuid),

    #[error("Invalid relay transition from {from} to {to}")]
    InvalidTransition { from: String, to: String },

    #[error("Store error: {0}")]
    Store(#[from] Box<dyn std::error::Error + Send + Sync>),
}

impl From<InvalidTransition> for RelayError {
    fn from(e: InvalidTransition) -> Self {
        RelayError::InvalidTransition { from: e.from, to: e.to }
    }
}

/// Tracks order hand-off to suppliers. Shares the audit/idempotency
/// discipline of settlement but never touches money.
pub struct RelayService {
    relays: Arc<dyn RelayRepository>,
    audit: Arc<dyn AuditLogRepository>,
}

impl RelayService {
    pub fn new(relays: Arc<dyn RelayRepository>, audit: Arc<dyn AuditLogRepository>) -> Self {
        Self { relays, audit }
    }

    /// Creates a relay, or returns the existing one when the idempotency key
    /// was already seen (retried webhook delivery).
    pub async fn create(&self, req: CreateRelayRequest, actor_id: &str) -> Result<OrderRelay, RelayError> {
        let candidate = OrderRelay::new(req.order_id, req.supplier_id, req.idempotency_key);
        let relay = self.relays.insert_idempotent(&candidate).await?;

        if relay.id == candidate.id {
            self.log(&relay, "create", None, actor_id, format!("Relay created for order {}", relay.order_id))
                .await?;
        } else {
            info!(relay_id = %relay.id, idempotency_key = %relay.idempotency_key, "Duplicate relay delivery, returning existing row");
        }
        Ok(relay)
    }

    pub async fn transition(
        &self,
        id: Uuid,
        target: RelayStatus,
        reason: Option<String>,
        actor_id: &str,
    ) -> Result<OrderRelay, RelayError> {
        let mut relay = self.relays.get(id).await?.ok_or(RelayError::NotFound(id))?;
        let previous = format!("{:?}", relay.status);
        relay.transition(target, reason)?;
        self.relays.update(&relay).await?;
        self.log(&relay, "transition", Some(previous), actor_id, format!("Relay moved to {:?}", target))
            .await?;
        Ok(relay)
    }

    pub async fn get(&self, id: Uuid) -> Result<OrderRelay, RelayError> {
        self.relays.get(id).await?.ok_or(RelayError::NotFound(id))
    }

    pub async fn list(&self, page: u32, limit: u32) -> Result<(Vec<OrderRelay>, u64), RelayError> {
        Ok(self.relays.list(page, limit).await?)
    }

    async fn log(
        &self,
        relay: &OrderRelay,
        action: &str,
        previous_state: Option<String>,
        actor_id: &str,
        description: String,
    ) -> Result<(), RelayError> {
        let entry = AuditLogEntry::transition(
            "order_relay",
            &relay.id.to_string(),
            action,
            previous_state,
            Some(format!("{:?}", relay.status)),
            actor_id,
            ActorType::Operator,
            description,
        );
        self.audit.append(&entry).await?;
        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn relay() -> OrderRelay {
        OrderRelay::new("O1".to_string(), Uuid::new_v4(), "key-1".to_string())
    }

    #[test]
    fn test_forward_path() {
        let mut r = relay();
        r.transition(RelayStatus::Acknowledged, None).unwrap();
        r.transition(RelayStatus::Shipped, None).unwrap();
        r.transition(RelayStatus::Delivered, None).unwrap();
        assert_eq!(r.status, RelayStatus::Delivered);
    }

    #[test]
    fn test_cannot_skip_steps() {
        let mut r = relay();
        assert!(r.transition(RelayStatus::Shipped, None).is_err());
        assert!(r.transition(RelayStatus::Delivered, None).is_err());
    }

    #[test]
    fn test_cancel_from_any_non_terminal() {
        let mut r = relay();
        r.transition(RelayStatus::Acknowledged, None).unwrap();
        r.transition(RelayStatus::Cancelled, Some("supplier out of stock".to_string()))
            .unwrap();
        assert_eq!(r.status, RelayStatus::Cancelled);
        assert_eq!(r.failure_reason.as_deref(), Some("supplier out of stock"));
    }

    #[test]
    fn test_terminal_states_reject_everything() {
        let mut r = relay();
        r.transition(RelayStatus::Failed, Some("timeout".to_string())).unwrap();
        assert!(r.transition(RelayStatus::Acknowledged, None).is_err());
        assert!(r.transition(RelayStatus::Cancelled, None).is_err());
    }
}
