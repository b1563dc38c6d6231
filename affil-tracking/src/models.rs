use affil_shared::pii::Masked;
use async_trait::async_trait;
use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use uuid::Uuid;

/// A referral click. Best-effort analytics, never an authoritative money
/// event. PII fields are stripped by the scheduled anonymization job.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct ClickRecord {
    pub id: Uuid,
    pub partner_id: Uuid,
    pub referral_code: String,
    pub product_id: Option<Uuid>,
    pub campaign: Option<String>,
    pub medium: Option<String>,
    pub source: Option<String>,
    pub ip_address: Option<Masked<String>>,
    pub user_agent: Option<Masked<String>>,
    pub session_id: Option<Masked<String>>,
    pub recorded_at: DateTime<Utc>,
    pub anonymized_at: Option<DateTime<Utc>>,
}

impl ClickRecord {
    pub fn is_anonymized(&self) -> bool {
        self.anonymized_at.is_some()
    }

    /// Strips PII and stamps the anonymization time. Returns false if the
    /// row was already anonymized (the job must be a no-op on re-run).
    pub fn anonymize(&mut self) -> bool {
        if self.is_anonymized() {
            return false;
        }
        self.ip_address = None;
        self.user_agent = None;
        self.session_id = None;
        self.anonymized_at = Some(Utc::now());
        true
    }
}

/// Repository trait for click data access
#[async_trait]
pub trait ClickRepository: Send + Sync {
    async fn insert(
        &self,
        click: &ClickRecord,
    ) -> Result<(), Box<dyn std::error::Error + Send + Sync>>;

    async fn get(
        &self,
        id: Uuid,
    ) -> Result<Option<ClickRecord>, Box<dyn std::error::Error + Send + Sync>>;

    /// Strips PII from all non-anonymized clicks recorded before the cutoff.
    /// Returns the number of rows touched.
    async fn anonymize_older_than(
        &self,
        cutoff: DateTime<Utc>,
    ) -> Result<u64, Box<dyn std::error::Error + Send + Sync>>;
}

#[cfg(test)]
mod tests {
    use super::*;

    fn click_with_pii() -> ClickRecord {
        ClickRecord {
            id: Uuid::new_v4(),
            partner_id: Uuid::new_v4(),
            referral_code: "CODE1".to_string(),
            product_id: None,
            campaign: Some("spring".to_string()),
            medium: None,
            source: None,
            ip_address: Some(Masked("203.0.113.7".to_string())),
            user_agent: Some(Masked("Mozilla/5.0".to_string())),
            session_id: Some(Masked("sess-1".to_string())),
            recorded_at: Utc::now(),
            anonymized_at: None,
        }
    }

    #[test]
    fn anonymize_strips_pii_once() {
        let mut click = click_with_pii();
        assert!(click.anonymize());
        assert!(click.ip_address.is_none());
        assert!(click.user_agent.is_none());
        assert!(click.session_id.is_none());
        assert!(click.is_anonymized());

        // second run is a no-op
        assert!(!click.anonymize());
    }

    #[test]
    fn anonymize_keeps_non_pii_fields() {
        let mut click = click_with_pii();
        click.anonymize();
        assert_eq!(click.campaign.as_deref(), Some("spring"));
        assert_eq!(click.referral_code, "CODE1");
    }
}
