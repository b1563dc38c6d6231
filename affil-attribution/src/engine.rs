use std::sync::Arc;

use affil_core::repository::{PartnerRepository, ProductDirectory};
use chrono::Utc;
use tracing::info;
use uuid::Uuid;

use crate::models::{Conversion, ConversionRepository, ConversionStatus};

#[derive(Debug, Clone)]
pub struct CreateConversionRequest {
    pub order_id: String,
    pub product_id: Uuid,
    pub referral_code: String,
    pub order_amount_minor: i64,
    pub product_price_minor: i64,
    pub quantity: i32,
    pub currency: Option<String>,
    pub customer_id: Option<String>,
    pub is_new_customer: bool,
}

/// How a refund landed, so the orchestrator can decide what happens to the
/// associated commission.
#[derive(Debug, Clone)]
pub enum RefundOutcome {
    Full(Conversion),
    Partial(Conversion),
}

impl RefundOutcome {
    pub fn conversion(&self) -> &Conversion {
        match self {
            RefundOutcome::Full(c) => c,
            RefundOutcome::Partial(c) => c,
        }
    }
}

#[derive(Debug, thiserror::Error)]
pub enum AttributionError {
    #[error("Invalid referral code: {0}")]
    InvalidReferral(String),

    #[error("Product not eligible for the partner program: {0}")]
    ProductNotEligible(String),

    #[error("Invalid amount: {0}")]
    InvalidAmount(String),

    #[error("Conversion not found: {0}")]
    NotFound(Uuid),

    #[error("Invalid conversion transition from {from} to {to}")]
    InvalidTransition { from: String, to: String },

    #[error("Store error: {0}")]
    Store(#[from] Box<dyn std::error::Error + Send + Sync>),
}

impl AttributionError {
    /// Store failures may succeed on redelivery; everything else is a
    /// terminal rejection.
    pub fn is_retryable(&self) -> bool {
        matches!(self, AttributionError::Store(_))
    }
}

impl From<crate::models::InvalidTransition> for AttributionError {
    fn from(e: crate::models::InvalidTransition) -> Self {
        AttributionError::InvalidTransition { from: e.from, to: e.to }
    }
}

/// Turns order events plus referral codes into Conversion records.
pub struct AttributionEngine {
    conversions: Arc<dyn ConversionRepository>,
    partners: Arc<dyn PartnerRepository>,
    products: Arc<dyn ProductDirectory>,
}

impl AttributionEngine {
    pub fn new(
        conversions: Arc<dyn ConversionRepository>,
        partners: Arc<dyn PartnerRepository>,
        products: Arc<dyn ProductDirectory>,
    ) -> Self {
        Self { conversions, partners, products }
    }

    /// Creates a pending Conversion for an order placed with a referral code.
    /// Idempotent on (order_id, referral_code): a duplicate order event
    /// returns the existing row.
    pub async fn create_conversion(
        &self,
        req: CreateConversionRequest,
    ) -> Result<Conversion, AttributionError> {
        if req.order_amount_minor <= 0 || req.product_price_minor <= 0 || req.quantity <= 0 {
            return Err(AttributionError::InvalidAmount(format!(
                "order amount {}, price {}, quantity {}",
                req.order_amount_minor, req.product_price_minor, req.quantity
            )));
        }

        let partner = self
            .partners
            .find_by_referral_code(&req.referral_code)
            .await?
            .filter(|p| p.is_active())
            .ok_or_else(|| AttributionError::InvalidReferral(req.referral_code.clone()))?;

        let category = self
            .products
            .category_of(req.product_id)
            .await?
            .ok_or_else(|| AttributionError::ProductNotEligible(req.product_id.to_string()))?;
        if !category.partner_eligible() {
            return Err(AttributionError::ProductNotEligible(format!(
                "{} ({})",
                req.product_id,
                category.as_str()
            )));
        }

        if let Some(existing) = self
            .conversions
            .find_by_order_and_code(&req.order_id, &req.referral_code)
            .await?
        {
            info!(order_id = %req.order_id, conversion_id = %existing.id, "Conversion already exists for order");
            return Ok(existing);
        }

        let now = Utc::now();
        let conversion = Conversion {
            id: Uuid::new_v4(),
            order_id: req.order_id,
            product_id: req.product_id,
            referral_code: req.referral_code,
            partner_id: partner.id,
            order_amount_minor: req.order_amount_minor,
            product_price_minor: req.product_price_minor,
            quantity: req.quantity,
            currency: req.currency.unwrap_or_else(|| "JPY".to_string()),
            customer_id: req.customer_id,
            is_new_customer: req.is_new_customer,
            refunded_minor: 0,
            status: ConversionStatus::Pending,
            created_at: now,
            updated_at: now,
        };

        self.conversions.insert(&conversion).await?;
        info!(conversion_id = %conversion.id, order_id = %conversion.order_id, partner_id = %partner.id, "Conversion created");

        Ok(conversion)
    }

    /// Transition: Pending -> Confirmed (idempotent on Confirmed)
    pub async fn confirm_conversion(&self, id: Uuid) -> Result<Conversion, AttributionError> {
        let mut conversion = self.load(id).await?;
        conversion.confirm()?;
        self.conversions.update(&conversion).await?;
        Ok(conversion)
    }

    /// Transition: any non-terminal -> Cancelled
    pub async fn cancel_conversion(&self, id: Uuid) -> Result<Conversion, AttributionError> {
        let mut conversion = self.load(id).await?;
        conversion.cancel()?;
        self.conversions.update(&conversion).await?;
        Ok(conversion)
    }

    /// Records the cumulative refunded total reported by the order system and
    /// classifies the refund as full or partial. A total the conversion
    /// already holds is a redelivered event: nothing is written and the
    /// existing classification is returned. A total reaching the order
    /// amount, or one flagged non-partial by the source, is full.
    pub async fn process_refund(
        &self,
        id: Uuid,
        refunded_total_minor: i64,
        _refund_quantity: Option<i32>,
        is_partial: bool,
    ) -> Result<RefundOutcome, AttributionError> {
        if refunded_total_minor <= 0 {
            return Err(AttributionError::InvalidAmount(format!(
                "refund amount {}",
                refunded_total_minor
            )));
        }

        let mut conversion = self.load(id).await?;
        if refunded_total_minor <= conversion.refunded_minor {
            info!(conversion_id = %id, refunded_total_minor, "Refund total already recorded");
            return Ok(match conversion.status {
                ConversionStatus::Refunded => RefundOutcome::Full(conversion),
                _ => RefundOutcome::Partial(conversion),
            });
        }

        let full = !is_partial || refunded_total_minor >= conversion.order_amount_minor;
        conversion.apply_refund(refunded_total_minor, full)?;
        self.conversions.update(&conversion).await?;

        Ok(if full {
            RefundOutcome::Full(conversion)
        } else {
            RefundOutcome::Partial(conversion)
        })
    }

    /// Lookup for replay/idempotency checks by downstream consumers.
    pub async fn conversions_for_order(
        &self,
        order_id: &str,
    ) -> Result<Vec<Conversion>, AttributionError> {
        Ok(self.conversions.find_by_order(order_id).await?)
    }

    async fn load(&self, id: Uuid) -> Result<Conversion, AttributionError> {
        self.conversions
            .get(id)
            .await?
            .ok_or(AttributionError::NotFound(id))
    }
}
