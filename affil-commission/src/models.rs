use async_trait::async_trait;
use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use uuid::Uuid;

/// Commission status.
/// pending --(hold expires)--> confirmed --(batch paid)--> paid;
/// pending|confirmed --(cancel)--> cancelled (terminal).
#[derive(Debug, Clone, Copy, Serialize, Deserialize, PartialEq, Eq)]
#[serde(rename_all = "snake_case")]
pub enum CommissionStatus {
    Pending,
    Confirmed,
    Cancelled,
    Paid,
}

/// The monetary consequence of a confirmed Conversion, 1:1 per conversion.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct Commission {
    pub id: Uuid,
    pub conversion_id: Uuid,
    pub partner_id: Uuid,
    pub amount_minor: i64,
    pub original_amount_minor: i64,
    pub rate_bps: i64,
    pub bonus_bps: i64,
    pub status: CommissionStatus,
    pub hold_until: DateTime<Utc>,
    pub cancellation_reason: Option<String>,
    pub created_at: DateTime<Utc>,
    pub updated_at: DateTime<Utc>,
}

impl Commission {
    /// Transition: Pending -> Confirmed. Guarded by hold expiry in the
    /// auto-confirm job; the model only enforces the status machine.
    pub fn confirm(&mut self) -> Result<(), InvalidTransition> {
        if self.status != CommissionStatus::Pending {
            return Err(self.rejected("confirmed"));
        }
        self.set_status(CommissionStatus::Confirmed);
        Ok(())
    }

    /// Transition: Pending|Confirmed -> Cancelled
    pub fn cancel(&mut self, reason: String) -> Result<(), InvalidTransition> {
        if !matches!(self.status, CommissionStatus::Pending | CommissionStatus::Confirmed) {
            return Err(self.rejected("cancelled"));
        }
        self.cancellation_reason = Some(reason);
        self.set_status(CommissionStatus::Cancelled);
        Ok(())
    }

    /// Transition: Confirmed -> Paid. Only the settlement payment path calls
    /// this; a commission is never paid outside a batch.
    pub fn mark_paid(&mut self) -> Result<(), InvalidTransition> {
        if self.status != CommissionStatus::Confirmed {
            return Err(self.rejected("paid"));
        }
        self.set_status(CommissionStatus::Paid);
        Ok(())
    }

    fn set_status(&mut self, status: CommissionStatus) {
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
#[error("Invalid commission transition from {from} to {to}")]
pub struct InvalidTransition {
    pub from: String,
    pub to: String,
}

/// Audited amount change. Adjustments are logged deltas, never silent
/// overwrites.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct CommissionAdjustment {
    pub id: Uuid,
    pub commission_id: Uuid,
    pub previous_amount_minor: i64,
    pub new_amount_minor: i64,
    pub reason: String,
    pub created_at: DateTime<Utc>,
}

#[derive(Debug, Clone, Default)]
pub struct CommissionFilter {
    pub partner_id: Option<Uuid>,
    pub status: Option<CommissionStatus>,
    pub created_from: Option<DateTime<Utc>>,
    pub created_to: Option<DateTime<Utc>>,
    pub page: u32,
    pub limit: u32,
}

#[derive(Debug, Clone)]
pub struct CommissionPage {
    pub commissions: Vec<Commission>,
    pub total: u64,
}

/// Repository trait for commission data access
#[async_trait]
pub trait CommissionRepository: Send + Sync {
    /// Inserts the commission, credits its amount to the partner's pending
    /// balance and counts the order, all in one transaction. Returns false
    /// without touching balances when the conversion already has a commission
    /// (uniqueness on conversion_id), so a redelivered event can neither skip
    /// the credit nor apply it twice.
    async fn insert_and_credit(
        &self,
        commission: &Commission,
    ) -> Result<bool, Box<dyn std::error::Error + Send + Sync>>;

    async fn get(
        &self,
        id: Uuid,
    ) -> Result<Option<Commission>, Box<dyn std::error::Error + Send + Sync>>;

    async fn find_by_conversion(
        &self,
        conversion_id: Uuid,
    ) -> Result<Option<Commission>, Box<dyn std::error::Error + Send + Sync>>;

    async fn update(
        &self,
        commission: &Commission,
    ) -> Result<(), Box<dyn std::error::Error + Send + Sync>>;

    async fn insert_adjustment(
        &self,
        adjustment: &CommissionAdjustment,
    ) -> Result<(), Box<dyn std::error::Error + Send + Sync>>;

    async fn list(
        &self,
        filter: &CommissionFilter,
    ) -> Result<CommissionPage, Box<dyn std::error::Error + Send + Sync>>;

    /// Pending commissions whose hold has expired at `now`.
    async fn due_for_confirmation(
        &self,
        now: DateTime<Utc>,
    ) -> Result<Vec<Commission>, Box<dyn std::error::Error + Send + Sync>>;

    /// Atomically flips one pending commission to confirmed and moves its
    /// amount from the partner's pending bucket to available. A commission
    /// no longer pending is skipped (returns false), keeping the job safe
    /// to re-run.
    async fn confirm_and_release(
        &self,
        commission_id: Uuid,
        partner_id: Uuid,
        amount_minor: i64,
    ) -> Result<bool, Box<dyn std::error::Error + Send + Sync>>;
}

#[cfg(test)]
mod tests {
    use super::*;

    fn commission() -> Commission {
        let now = Utc::now();
        Commission {
            id: Uuid::new_v4(),
            conversion_id: Uuid::new_v4(),
            partner_id: Uuid::new_v4(),
            amount_minor: 400,
            original_amount_minor: 400,
            rate_bps: 300,
            bonus_bps: 100,
            status: CommissionStatus::Pending,
            hold_until: now + chrono::Duration::days(7),
            cancellation_reason: None,
            created_at: now,
            updated_at: now,
        }
    }

    #[test]
    fn test_commission_lifecycle() {
        let mut c = commission();
        c.confirm().unwrap();
        assert_eq!(c.status, CommissionStatus::Confirmed);
        c.mark_paid().unwrap();
        assert_eq!(c.status, CommissionStatus::Paid);
    }

    #[test]
    fn test_cannot_pay_pending_commission() {
        let mut c = commission();
        assert!(c.mark_paid().is_err());
    }

    #[test]
    fn test_cancel_records_reason_and_is_terminal() {
        let mut c = commission();
        c.cancel("order cancelled".to_string()).unwrap();
        assert_eq!(c.status, CommissionStatus::Cancelled);
        assert_eq!(c.cancellation_reason.as_deref(), Some("order cancelled"));
        assert!(c.confirm().is_err());
        assert!(c.cancel("again".to_string()).is_err());
    }

    #[test]
    fn test_paid_commission_cannot_be_cancelled() {
        let mut c = commission();
        c.confirm().unwrap();
        c.mark_paid().unwrap();
        assert!(c.cancel("too late".to_string()).is_err());
    }
}
