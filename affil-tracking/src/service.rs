use std::sync::Arc;

use affil_core::repository::PartnerRepository;
use affil_shared::pii::Masked;
use chrono::{Duration, Utc};
use tracing::{info, warn};
use uuid::Uuid;

use crate::models::{ClickRecord, ClickRepository};

#[derive(Debug, Clone)]
pub struct RecordClickRequest {
    pub referral_code: String,
    pub product_id: Option<Uuid>,
    pub campaign: Option<String>,
    pub medium: Option<String>,
    pub source: Option<String>,
    pub ip_address: Option<String>,
    pub user_agent: Option<String>,
    pub session_id: Option<String>,
}

#[derive(Debug, thiserror::Error)]
pub enum TrackingError {
    #[error("Store error: {0}")]
    Store(#[from] Box<dyn std::error::Error + Send + Sync>),
}

/// Records referral clicks and runs the scheduled PII retention sweep.
pub struct TrackingService {
    clicks: Arc<dyn ClickRepository>,
    partners: Arc<dyn PartnerRepository>,
}

impl TrackingService {
    pub fn new(clicks: Arc<dyn ClickRepository>, partners: Arc<dyn PartnerRepository>) -> Self {
        Self { clicks, partners }
    }

    /// Records a click for an active partner. Unknown or inactive referral
    /// codes are logged and dropped; clicks are best-effort, not money.
    pub async fn record_click(
        &self,
        req: RecordClickRequest,
    ) -> Result<Option<ClickRecord>, TrackingError> {
        let partner = match self.partners.find_by_referral_code(&req.referral_code).await? {
            Some(p) if p.is_active() => p,
            Some(p) => {
                warn!(
                    referral_code = %req.referral_code,
                    status = ?p.status,
                    "Dropping click for inactive partner"
                );
                return Ok(None);
            }
            None => {
                warn!(referral_code = %req.referral_code, "Dropping click for unknown referral code");
                return Ok(None);
            }
        };

        let click = ClickRecord {
            id: Uuid::new_v4(),
            partner_id: partner.id,
            referral_code: req.referral_code,
            product_id: req.product_id,
            campaign: req.campaign,
            medium: req.medium,
            source: req.source,
            ip_address: req.ip_address.map(Masked),
            user_agent: req.user_agent.map(Masked),
            session_id: req.session_id.map(Masked),
            recorded_at: Utc::now(),
            anonymized_at: None,
        };

        self.clicks.insert(&click).await?;
        self.partners.increment_clicks(partner.id).await?;

        Ok(Some(click))
    }

    /// Scheduled job: strips PII from clicks older than the retention window.
    /// Safe to re-run; already-anonymized rows are skipped by the store.
    pub async fn anonymize_old_clicks(&self, retention_days: i64) -> Result<u64, TrackingError> {
        let cutoff = Utc::now() - Duration::days(retention_days);
        let count = self.clicks.anonymize_older_than(cutoff).await?;
        if count > 0 {
            info!(count, retention_days, "Anonymized old click records");
        }
        Ok(count)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use affil_core::partner::{Partner, PartnerStatus, PartnerTier};
    use async_trait::async_trait;
    use chrono::DateTime;
    use std::collections::HashMap;
    use std::sync::Mutex;

    struct FakePartnerRepo {
        partners: Mutex<HashMap<Uuid, Partner>>,
    }

    impl FakePartnerRepo {
        fn with_partner(partner: Partner) -> Self {
            let mut partners = HashMap::new();
            partners.insert(partner.id, partner);
            Self { partners: Mutex::new(partners) }
        }
    }

    #[async_trait]
    impl PartnerRepository for FakePartnerRepo {
        async fn insert(&self, partner: &Partner) -> Result<(), Box<dyn std::error::Error + Send + Sync>> {
            self.partners.lock().unwrap().insert(partner.id, partner.clone());
            Ok(())
        }

        async fn get(&self, id: Uuid) -> Result<Option<Partner>, Box<dyn std::error::Error + Send + Sync>> {
            Ok(self.partners.lock().unwrap().get(&id).cloned())
        }

        async fn find_by_referral_code(&self, referral_code: &str) -> Result<Option<Partner>, Box<dyn std::error::Error + Send + Sync>> {
            Ok(self
                .partners
                .lock()
                .unwrap()
                .values()
                .find(|p| p.referral_code == referral_code)
                .cloned())
        }

        async fn update_status(&self, id: Uuid, status: PartnerStatus) -> Result<(), Box<dyn std::error::Error + Send + Sync>> {
            if let Some(p) = self.partners.lock().unwrap().get_mut(&id) {
                p.status = status;
            }
            Ok(())
        }

        async fn apply_balance_delta(&self, id: Uuid, pending: i64, available: i64, paid_out: i64) -> Result<(), Box<dyn std::error::Error + Send + Sync>> {
            if let Some(p) = self.partners.lock().unwrap().get_mut(&id) {
                p.pending_minor += pending;
                p.available_minor += available;
                p.paid_out_minor += paid_out;
            }
            Ok(())
        }

        async fn increment_clicks(&self, id: Uuid) -> Result<(), Box<dyn std::error::Error + Send + Sync>> {
            if let Some(p) = self.partners.lock().unwrap().get_mut(&id) {
                p.record_click();
            }
            Ok(())
        }
    }

    struct FakeClickRepo {
        clicks: Mutex<Vec<ClickRecord>>,
    }

    impl FakeClickRepo {
        fn new() -> Self {
            Self { clicks: Mutex::new(Vec::new()) }
        }
    }

    #[async_trait]
    impl ClickRepository for FakeClickRepo {
        async fn insert(&self, click: &ClickRecord) -> Result<(), Box<dyn std::error::Error + Send + Sync>> {
            self.clicks.lock().unwrap().push(click.clone());
            Ok(())
        }

        async fn get(&self, id: Uuid) -> Result<Option<ClickRecord>, Box<dyn std::error::Error + Send + Sync>> {
            Ok(self.clicks.lock().unwrap().iter().find(|c| c.id == id).cloned())
        }

        async fn anonymize_older_than(&self, cutoff: DateTime<Utc>) -> Result<u64, Box<dyn std::error::Error + Send + Sync>> {
            let mut count = 0;
            for click in self.clicks.lock().unwrap().iter_mut() {
                if click.recorded_at < cutoff && click.anonymize() {
                    count += 1;
                }
            }
            Ok(count)
        }
    }

    fn active_partner(code: &str) -> Partner {
        let mut partner = Partner::new("p".to_string(), code.to_string(), PartnerTier::Gold);
        partner.approve().unwrap();
        partner
    }

    fn click_request(code: &str) -> RecordClickRequest {
        RecordClickRequest {
            referral_code: code.to_string(),
            product_id: None,
            campaign: None,
            medium: None,
            source: None,
            ip_address: Some("203.0.113.7".to_string()),
            user_agent: None,
            session_id: None,
        }
    }

    #[tokio::test]
    async fn records_click_and_increments_counter() {
        let partner = active_partner("GOLD1");
        let partner_id = partner.id;
        let partners = Arc::new(FakePartnerRepo::with_partner(partner));
        let clicks = Arc::new(FakeClickRepo::new());
        let service = TrackingService::new(clicks.clone(), partners.clone());

        let recorded = service.record_click(click_request("GOLD1")).await.unwrap();
        assert!(recorded.is_some());
        assert_eq!(recorded.unwrap().partner_id, partner_id);

        let partner = partners.get(partner_id).await.unwrap().unwrap();
        assert_eq!(partner.total_clicks, 1);
    }

    #[tokio::test]
    async fn unknown_referral_code_is_dropped_without_error() {
        let partners = Arc::new(FakePartnerRepo::with_partner(active_partner("GOLD1")));
        let clicks = Arc::new(FakeClickRepo::new());
        let service = TrackingService::new(clicks.clone(), partners);

        let recorded = service.record_click(click_request("NOPE")).await.unwrap();
        assert!(recorded.is_none());
        assert!(clicks.clicks.lock().unwrap().is_empty());
    }

    #[tokio::test]
    async fn inactive_partner_click_is_dropped() {
        let partner = Partner::new("p".to_string(), "PEND1".to_string(), PartnerTier::Bronze);
        let partners = Arc::new(FakePartnerRepo::with_partner(partner));
        let clicks = Arc::new(FakeClickRepo::new());
        let service = TrackingService::new(clicks, partners);

        let recorded = service.record_click(click_request("PEND1")).await.unwrap();
        assert!(recorded.is_none());
    }

    #[tokio::test]
    async fn anonymization_is_idempotent() {
        let partner = active_partner("GOLD1");
        let partners = Arc::new(FakePartnerRepo::with_partner(partner));
        let clicks = Arc::new(FakeClickRepo::new());
        let service = TrackingService::new(clicks.clone(), partners);

        service.record_click(click_request("GOLD1")).await.unwrap();

        // Backdate the click past the retention window
        clicks.clicks.lock().unwrap()[0].recorded_at = Utc::now() - Duration::days(400);

        let first = service.anonymize_old_clicks(365).await.unwrap();
        assert_eq!(first, 1);
        let second = service.anonymize_old_clicks(365).await.unwrap();
        assert_eq!(second, 0);
    }
}
