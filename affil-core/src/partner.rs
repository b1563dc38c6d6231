use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use uuid::Uuid;

/// Partner tier. Each tier carries a commission bonus (configured in basis
/// points) and a payout cadence.
#[derive(Debug, Clone, Copy, Serialize, Deserialize, PartialEq, Eq)]
#[serde(rename_all = "snake_case")]
pub enum PartnerTier {
    Bronze,
    Silver,
    Gold,
    Platinum,
}

impl PartnerTier {
    pub fn payout_cadence(&self) -> PayoutCadence {
        match self {
            PartnerTier::Bronze => PayoutCadence::Monthly,
            PartnerTier::Silver => PayoutCadence::Monthly,
            PartnerTier::Gold => PayoutCadence::Biweekly,
            PartnerTier::Platinum => PayoutCadence::Weekly,
        }
    }

    pub fn as_str(&self) -> &'static str {
        match self {
            PartnerTier::Bronze => "bronze",
            PartnerTier::Silver => "silver",
            PartnerTier::Gold => "gold",
            PartnerTier::Platinum => "platinum",
        }
    }
}

#[derive(Debug, Clone, Copy, Serialize, Deserialize, PartialEq, Eq)]
#[serde(rename_all = "snake_case")]
pub enum PayoutCadence {
    Weekly,
    Biweekly,
    Monthly,
}

/// Partner account status in the program lifecycle
#[derive(Debug, Clone, Copy, Serialize, Deserialize, PartialEq, Eq)]
#[serde(rename_all = "snake_case")]
pub enum PartnerStatus {
    Pending,
    Active,
    Suspended,
    Rejected,
}

/// A referrer enrolled in the affiliate program. Balances are in minor units
/// and mutate only through commission transitions, never by direct edit.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct Partner {
    pub id: Uuid,
    pub name: String,
    pub referral_code: String,
    pub tier: PartnerTier,
    pub status: PartnerStatus,
    pub pending_minor: i64,
    pub available_minor: i64,
    pub paid_out_minor: i64,
    pub total_clicks: i64,
    pub total_orders: i64,
    pub conversion_rate: f64,
    pub created_at: DateTime<Utc>,
    pub updated_at: DateTime<Utc>,
}

impl Partner {
    pub fn new(name: String, referral_code: String, tier: PartnerTier) -> Self {
        let now = Utc::now();
        Self {
            id: Uuid::new_v4(),
            name,
            referral_code,
            tier,
            status: PartnerStatus::Pending,
            pending_minor: 0,
            available_minor: 0,
            paid_out_minor: 0,
            total_clicks: 0,
            total_orders: 0,
            conversion_rate: 0.0,
            created_at: now,
            updated_at: now,
        }
    }

    pub fn is_active(&self) -> bool {
        self.status == PartnerStatus::Active
    }

    /// Transition: Pending -> Active
    pub fn approve(&mut self) -> Result<(), PartnerError> {
        if self.status != PartnerStatus::Pending {
            return Err(self.invalid_transition("active"));
        }
        self.set_status(PartnerStatus::Active);
        Ok(())
    }

    /// Transition: Pending -> Rejected
    pub fn reject(&mut self) -> Result<(), PartnerError> {
        if self.status != PartnerStatus::Pending {
            return Err(self.invalid_transition("rejected"));
        }
        self.set_status(PartnerStatus::Rejected);
        Ok(())
    }

    /// Transition: Active -> Suspended
    pub fn suspend(&mut self) -> Result<(), PartnerError> {
        if self.status != PartnerStatus::Active {
            return Err(self.invalid_transition("suspended"));
        }
        self.set_status(PartnerStatus::Suspended);
        Ok(())
    }

    /// Transition: Suspended -> Active
    pub fn reactivate(&mut self) -> Result<(), PartnerError> {
        if self.status != PartnerStatus::Suspended {
            return Err(self.invalid_transition("active"));
        }
        self.set_status(PartnerStatus::Active);
        Ok(())
    }

    pub fn record_click(&mut self) {
        self.total_clicks += 1;
        self.recompute_conversion_rate();
        self.updated_at = Utc::now();
    }

    pub fn record_order(&mut self) {
        self.total_orders += 1;
        self.recompute_conversion_rate();
        self.updated_at = Utc::now();
    }

    fn recompute_conversion_rate(&mut self) {
        self.conversion_rate = if self.total_clicks > 0 {
            self.total_orders as f64 / self.total_clicks as f64
        } else {
            0.0
        };
    }

    fn set_status(&mut self, status: PartnerStatus) {
        self.status = status;
        self.updated_at = Utc::now();
    }

    fn invalid_transition(&self, to: &str) -> PartnerError {
        PartnerError::InvalidTransition {
            from: format!("{:?}", self.status),
            to: to.to_string(),
        }
    }
}

#[derive(Debug, thiserror::Error)]
pub enum PartnerError {
    #[error("Partner not found: {0}")]
    NotFound(String),

    #[error("Invalid partner transition from {from} to {to}")]
    InvalidTransition { from: String, to: String },

    #[error("Referral code already registered: {0}")]
    DuplicateReferralCode(String),
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_partner_lifecycle() {
        let mut partner = Partner::new("Aoi Beauty".to_string(), "AOI2024".to_string(), PartnerTier::Gold);
        assert_eq!(partner.status, PartnerStatus::Pending);
        assert!(!partner.is_active());

        partner.approve().unwrap();
        assert!(partner.is_active());

        partner.suspend().unwrap();
        assert_eq!(partner.status, PartnerStatus::Suspended);

        partner.reactivate().unwrap();
        assert!(partner.is_active());
    }

    #[test]
    fn test_reject_only_from_pending() {
        let mut partner = Partner::new("p".to_string(), "CODE1".to_string(), PartnerTier::Bronze);
        partner.approve().unwrap();
        assert!(partner.reject().is_err());
    }

    #[test]
    fn test_cannot_reactivate_active_partner() {
        let mut partner = Partner::new("p".to_string(), "CODE2".to_string(), PartnerTier::Bronze);
        partner.approve().unwrap();
        assert!(partner.reactivate().is_err());
    }

    #[test]
    fn test_conversion_rate_tracks_clicks_and_orders() {
        let mut partner = Partner::new("p".to_string(), "CODE3".to_string(), PartnerTier::Silver);
        assert_eq!(partner.conversion_rate, 0.0);

        for _ in 0..4 {
            partner.record_click();
        }
        partner.record_order();
        assert_eq!(partner.total_clicks, 4);
        assert_eq!(partner.total_orders, 1);
        assert!((partner.conversion_rate - 0.25).abs() < f64::EPSILON);
    }

    #[test]
    fn test_payout_cadence_by_tier() {
        assert_eq!(PartnerTier::Platinum.payout_cadence(), PayoutCadence::Weekly);
        assert_eq!(PartnerTier::Gold.payout_cadence(), PayoutCadence::Biweekly);
        assert_eq!(PartnerTier::Bronze.payout_cadence(), PayoutCadence::Monthly);
    }
}
