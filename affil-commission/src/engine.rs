use std::sync::Arc;

use affil_attribution::models::{ConversionRepository, ConversionStatus};
use affil_core::money::apply_bps;
use affil_core::partner::PartnerTier;
use affil_core::repository::PartnerRepository;
use chrono::{DateTime, Duration, Utc};
use tracing::{error, info};
use uuid::Uuid;

use crate::models::{
    Commission, CommissionAdjustment, CommissionFilter, CommissionPage, CommissionRepository,
    CommissionStatus,
};

/// Injected business rules: hold period and commission rates in basis points.
#[derive(Debug, Clone)]
pub struct CommissionRules {
    pub base_rate_bps: i64,
    pub hold_days: i64,
    pub bronze_bonus_bps: i64,
    pub silver_bonus_bps: i64,
    pub gold_bonus_bps: i64,
    pub platinum_bonus_bps: i64,
}

impl CommissionRules {
    pub fn bonus_for(&self, tier: PartnerTier) -> i64 {
        match tier {
            PartnerTier::Bronze => self.bronze_bonus_bps,
            PartnerTier::Silver => self.silver_bonus_bps,
            PartnerTier::Gold => self.gold_bonus_bps,
            PartnerTier::Platinum => self.platinum_bonus_bps,
        }
    }
}

#[derive(Debug, thiserror::Error)]
pub enum CommissionError {
    #[error("Commission not found: {0}")]
    NotFound(Uuid),

    #[error("Conversion not found: {0}")]
    ConversionNotFound(Uuid),

    #[error("Conversion not confirmed: {0}")]
    ConversionNotConfirmed(Uuid),

    #[error("Partner not found: {0}")]
    PartnerNotFound(Uuid),

    #[error("Commission already paid: {0}")]
    AlreadyPaid(Uuid),

    #[error("Invalid commission transition from {from} to {to}")]
    InvalidTransition { from: String, to: String },

    #[error("Invalid amount: {0}")]
    InvalidAmount(String),

    #[error("Store error: {0}")]
    Store(#[from] Box<dyn std::error::Error + Send + Sync>),
}

impl CommissionError {
    pub fn is_retryable(&self) -> bool {
        matches!(self, CommissionError::Store(_))
    }
}

impl From<crate::models::InvalidTransition> for CommissionError {
    fn from(e: crate::models::InvalidTransition) -> Self {
        CommissionError::InvalidTransition { from: e.from, to: e.to }
    }
}

/// Computes, holds, confirms, adjusts and cancels commissions, keeping the
/// partner balance buckets in step with every transition.
pub struct CommissionEngine {
    commissions: Arc<dyn CommissionRepository>,
    conversions: Arc<dyn ConversionRepository>,
    partners: Arc<dyn PartnerRepository>,
    rules: CommissionRules,
}

impl CommissionEngine {
    pub fn new(
        commissions: Arc<dyn CommissionRepository>,
        conversions: Arc<dyn ConversionRepository>,
        partners: Arc<dyn PartnerRepository>,
        rules: CommissionRules,
    ) -> Self {
        Self { commissions, conversions, partners, rules }
    }

    /// Creates the pending commission for a confirmed conversion, crediting
    /// the partner's pending balance in the same transaction as the insert.
    /// Idempotent on conversion id: a redelivered event gets the existing
    /// commission back and moves no money.
    pub async fn create_commission(&self, conversion_id: Uuid) -> Result<Commission, CommissionError> {
        let conversion = self
            .conversions
            .get(conversion_id)
            .await?
            .ok_or(CommissionError::ConversionNotFound(conversion_id))?;

        if conversion.status != ConversionStatus::Confirmed {
            return Err(CommissionError::ConversionNotConfirmed(conversion_id));
        }

        if let Some(existing) = self.commissions.find_by_conversion(conversion_id).await? {
            return Ok(existing);
        }

        let partner = self
            .partners
            .get(conversion.partner_id)
            .await?
            .ok_or(CommissionError::PartnerNotFound(conversion.partner_id))?;

        let bonus_bps = self.rules.bonus_for(partner.tier);
        let gross_minor = conversion.product_price_minor * conversion.quantity as i64;
        let amount_minor = apply_bps(gross_minor, self.rules.base_rate_bps + bonus_bps);

        let now = Utc::now();
        let commission = Commission {
            id: Uuid::new_v4(),
            conversion_id,
            partner_id: partner.id,
            amount_minor,
            original_amount_minor: amount_minor,
            rate_bps: self.rules.base_rate_bps,
            bonus_bps,
            status: CommissionStatus::Pending,
            hold_until: now + Duration::days(self.rules.hold_days),
            cancellation_reason: None,
            created_at: now,
            updated_at: now,
        };

        let inserted = self.commissions.insert_and_credit(&commission).await?;
        if !inserted {
            // Lost the race to a concurrent duplicate event; the winner
            // already carried the credit
            if let Some(existing) = self.commissions.find_by_conversion(conversion_id).await? {
                return Ok(existing);
            }
        }

        info!(
            commission_id = %commission.id,
            partner_id = %partner.id,
            amount_minor,
            hold_until = %commission.hold_until,
            "Commission created"
        );

        Ok(commission)
    }

    /// Scheduled job: confirms every pending commission whose hold has
    /// expired, moving the amount from pending to available. Each row is
    /// flipped atomically, so a partial run leaves nothing half-moved and
    /// the next tick picks up the rest.
    pub async fn auto_confirm_commissions(&self, now: DateTime<Utc>) -> Result<u64, CommissionError> {
        let due = self.commissions.due_for_confirmation(now).await?;
        let mut confirmed = 0u64;

        for commission in due {
            match self
                .commissions
                .confirm_and_release(commission.id, commission.partner_id, commission.amount_minor)
                .await
            {
                Ok(true) => confirmed += 1,
                Ok(false) => {} // already handled by a concurrent run
                Err(e) => {
                    error!(commission_id = %commission.id, "Auto-confirm failed: {}", e);
                }
            }
        }

        if confirmed > 0 {
            info!(confirmed, "Auto-confirmed commissions past hold");
        }
        Ok(confirmed)
    }

    /// Adjusts the amount of a pending or confirmed commission, recording an
    /// audited adjustment row and applying the delta to the bucket the money
    /// currently sits in.
    pub async fn adjust_commission(
        &self,
        id: Uuid,
        new_amount_minor: i64,
        reason: String,
    ) -> Result<Commission, CommissionError> {
        if new_amount_minor < 0 {
            return Err(CommissionError::InvalidAmount(format!(
                "adjusted amount {}",
                new_amount_minor
            )));
        }

        let mut commission = self.load(id).await?;
        let bucket = match commission.status {
            CommissionStatus::Pending => Bucket::Pending,
            CommissionStatus::Confirmed => Bucket::Available,
            CommissionStatus::Paid => return Err(CommissionError::AlreadyPaid(id)),
            CommissionStatus::Cancelled => {
                return Err(CommissionError::InvalidTransition {
                    from: "Cancelled".to_string(),
                    to: "adjusted".to_string(),
                })
            }
        };

        let previous_amount = commission.amount_minor;
        let delta = new_amount_minor - previous_amount;

        let adjustment = CommissionAdjustment {
            id: Uuid::new_v4(),
            commission_id: id,
            previous_amount_minor: previous_amount,
            new_amount_minor,
            reason: reason.clone(),
            created_at: Utc::now(),
        };
        self.commissions.insert_adjustment(&adjustment).await?;

        commission.amount_minor = new_amount_minor;
        commission.updated_at = Utc::now();
        self.commissions.update(&commission).await?;

        self.apply_bucket_delta(commission.partner_id, bucket, delta).await?;

        info!(
            commission_id = %id,
            previous_amount,
            new_amount_minor,
            reason = %reason,
            "Commission adjusted"
        );

        Ok(commission)
    }

    /// Cancels a pending or confirmed commission and reverses its amount out
    /// of the bucket it currently occupies.
    pub async fn cancel_commission(&self, id: Uuid, reason: String) -> Result<Commission, CommissionError> {
        let mut commission = self.load(id).await?;
        let bucket = match commission.status {
            CommissionStatus::Pending => Bucket::Pending,
            CommissionStatus::Confirmed => Bucket::Available,
            CommissionStatus::Paid => return Err(CommissionError::AlreadyPaid(id)),
            CommissionStatus::Cancelled => {
                return Err(CommissionError::InvalidTransition {
                    from: "Cancelled".to_string(),
                    to: "cancelled".to_string(),
                })
            }
        };

        let amount = commission.amount_minor;
        commission.cancel(reason.clone())?;
        self.commissions.update(&commission).await?;
        self.apply_bucket_delta(commission.partner_id, bucket, -amount).await?;

        info!(commission_id = %id, amount, reason = %reason, "Commission cancelled");
        Ok(commission)
    }

    /// Paged read by partner/status/period, for the orchestrator's
    /// idempotency lookups and settlement aggregation.
    pub async fn get_commissions(&self, filter: &CommissionFilter) -> Result<CommissionPage, CommissionError> {
        Ok(self.commissions.list(filter).await?)
    }

    pub async fn find_by_conversion(&self, conversion_id: Uuid) -> Result<Option<Commission>, CommissionError> {
        Ok(self.commissions.find_by_conversion(conversion_id).await?)
    }

    async fn load(&self, id: Uuid) -> Result<Commission, CommissionError> {
        self.commissions
            .get(id)
            .await?
            .ok_or(CommissionError::NotFound(id))
    }

    async fn apply_bucket_delta(
        &self,
        partner_id: Uuid,
        bucket: Bucket,
        delta: i64,
    ) -> Result<(), CommissionError> {
        let (pending, available) = match bucket {
            Bucket::Pending => (delta, 0),
            Bucket::Available => (0, delta),
        };
        self.partners
            .apply_balance_delta(partner_id, pending, available, 0)
            .await?;
        Ok(())
    }
}

enum Bucket {
    Pending,
    Available,
}
