use async_trait::async_trait;
use uuid::Uuid;

/// Order lifecycle events consumed from the commerce platform.
#[derive(Debug, serde::Serialize, serde::Deserialize, Clone)]
#[serde(tag = "event_type", rename_all = "snake_case")]
pub enum OrderEvent {
    OrderCreated(OrderCreatedEvent),
    OrderConfirmed(OrderConfirmedEvent),
    OrderCancelled(OrderCancelledEvent),
    OrderRefunded(OrderRefundedEvent),
}

impl OrderEvent {
    pub fn order_id(&self) -> &str {
        match self {
            OrderEvent::OrderCreated(e) => &e.order_id,
            OrderEvent::OrderConfirmed(e) => &e.order_id,
            OrderEvent::OrderCancelled(e) => &e.order_id,
            OrderEvent::OrderRefunded(e) => &e.order_id,
        }
    }
}

#[derive(Debug, serde::Serialize, serde::Deserialize, Clone)]
pub struct OrderCreatedEvent {
    pub order_id: String,
    pub product_id: Uuid,
    pub order_amount_minor: i64,
    pub product_price_minor: i64,
    pub quantity: i32,
    pub currency: Option<String>,
    pub customer_id: Option<String>,
    pub is_new_customer: Option<bool>,
    pub referral_code: Option<String>,
    pub metadata: Option<serde_json::Value>,
    pub timestamp: i64,
}

#[derive(Debug, serde::Serialize, serde::Deserialize, Clone)]
pub struct OrderConfirmedEvent {
    pub order_id: String,
    pub timestamp: i64,
}

#[derive(Debug, serde::Serialize, serde::Deserialize, Clone)]
pub struct OrderCancelledEvent {
    pub order_id: String,
    pub reason: Option<String>,
    pub timestamp: i64,
}

#[derive(Debug, serde::Serialize, serde::Deserialize, Clone)]
pub struct OrderRefundedEvent {
    pub order_id: String,
    /// Cumulative amount refunded on the order so far, not an increment.
    /// A redelivered event carries the same total as the original.
    pub refund_amount_minor: i64,
    pub refund_quantity: Option<i32>,
    pub is_partial_refund: bool,
    pub timestamp: i64,
}

/// Destination for events whose processing failed on a transient error.
/// Terminal rejections (validation, state conflicts) are never dead-lettered.
#[async_trait]
pub trait DeadLetterSink: Send + Sync {
    async fn push(
        &self,
        event: &OrderEvent,
        error: &str,
    ) -> Result<(), Box<dyn std::error::Error + Send + Sync>>;
}
