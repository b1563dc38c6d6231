use async_trait::async_trait;
use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use uuid::Uuid;

/// Conversion status in the attribution lifecycle
#[derive(Debug, Clone, Copy, Serialize, Deserialize, PartialEq, Eq)]
#[serde(rename_all = "snake_case")]
pub enum ConversionStatus {
    Pending,
    Confirmed,
    Cancelled,
    Refunded,
    PartiallyRefunded,
}

/// The record asserting "this order is attributed to this partner."
/// Exactly one Conversion exists per (order_id, referral_code) pair.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct Conversion {
    pub id: Uuid,
    pub order_id: String,
    pub product_id: Uuid,
    pub referral_code: String,
    pub partner_id: Uuid,
    pub order_amount_minor: i64,
    pub product_price_minor: i64,
    pub quantity: i32,
    pub currency: String,
    pub customer_id: Option<String>,
    pub is_new_customer: bool,
    pub refunded_minor: i64,
    pub status: ConversionStatus,
    pub created_at: DateTime<Utc>,
    pub updated_at: DateTime<Utc>,
}

impl Conversion {
    pub fn is_terminal(&self) -> bool {
        matches!(
            self.status,
            ConversionStatus::Cancelled | ConversionStatus::Refunded
        )
    }

    /// Transition: Pending -> Confirmed. Confirming an already-confirmed
    /// conversion is a no-op so re-delivered order events stay idempotent.
    pub fn confirm(&mut self) -> Result<(), InvalidTransition> {
        match self.status {
            ConversionStatus::Pending => {
                self.set_status(ConversionStatus::Confirmed);
                Ok(())
            }
            ConversionStatus::Confirmed => Ok(()),
            _ => Err(self.rejected("confirmed")),
        }
    }

    /// Transition: any non-terminal -> Cancelled
    pub fn cancel(&mut self) -> Result<(), InvalidTransition> {
        if self.is_terminal() {
            return Err(self.rejected("cancelled"));
        }
        self.set_status(ConversionStatus::Cancelled);
        Ok(())
    }

    /// Records the cumulative refunded total for the order. Writing a total
    /// the conversion already holds is a no-op, so a redelivered refund event
    /// never moves the number twice. Full refunds land on Refunded (terminal),
    /// partial refunds on PartiallyRefunded.
    pub fn apply_refund(&mut self, refunded_total_minor: i64, full: bool) -> Result<(), InvalidTransition> {
        if self.is_terminal() {
            return Err(self.rejected(if full { "refunded" } else { "partially_refunded" }));
        }
        self.refunded_minor = self.refunded_minor.max(refunded_total_minor);
        if full {
            self.set_status(ConversionStatus::Refunded);
        } else {
            self.set_status(ConversionStatus::PartiallyRefunded);
        }
        Ok(())
    }

    fn set_status(&mut self, status: ConversionStatus) {
        self.status = status;
        self.updated_at = Utc::now();
    }

    fn rejected(&self, to: &str) -> InvalidTransition {
        InvalidTransition {
            from: format!("{:?}", self.status),
            to: to.to_string(),
        }
    }
}

#[derive(Debug, thiserror::Error)]
#[error("Invalid conversion transition from {from} to {to}")]
pub struct InvalidTransition {
    pub from: String,
    pub to: String,
}

/// Repository trait for conversion data access
#[async_trait]
pub trait ConversionRepository: Send + Sync {
    async fn insert(
        &self,
        conversion: &Conversion,
    ) -> Result<(), Box<dyn std::error::Error + Send + Sync>>;

    async fn get(
        &self,
        id: Uuid,
    ) -> Result<Option<Conversion>, Box<dyn std::error::Error + Send + Sync>>;

    async fn find_by_order_and_code(
        &self,
        order_id: &str,
        referral_code: &str,
    ) -> Result<Option<Conversion>, Box<dyn std::error::Error + Send + Sync>>;

    async fn find_by_order(
        &self,
        order_id: &str,
    ) -> Result<Vec<Conversion>, Box<dyn std::error::Error + Send + Sync>>;

    async fn update(
        &self,
        conversion: &Conversion,
    ) -> Result<(), Box<dyn std::error::Error + Send + Sync>>;
}
