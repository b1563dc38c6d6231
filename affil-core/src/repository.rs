use async_trait::async_trait;
use uuid::Uuid;

use crate::audit::AuditLogEntry;
use crate::partner::{Partner, PartnerStatus};
use crate::products::ProductCategory;

/// Repository trait for partner data access. Balance mutation goes through
/// `apply_balance_delta` so concurrent commission transitions cannot lose
/// updates to a read-modify-write race.
#[async_trait]
pub trait PartnerRepository: Send + Sync {
    async fn insert(
        &self,
        partner: &Partner,
    ) -> Result<(), Box<dyn std::error::Error + Send + Sync>>;

    async fn get(
        &self,
        id: Uuid,
    ) -> Result<Option<Partner>, Box<dyn std::error::Error + Send + Sync>>;

    async fn find_by_referral_code(
        &self,
        referral_code: &str,
    ) -> Result<Option<Partner>, Box<dyn std::error::Error + Send + Sync>>;

    async fn update_status(
        &self,
        id: Uuid,
        status: PartnerStatus,
    ) -> Result<(), Box<dyn std::error::Error + Send + Sync>>;

    /// Atomic increment/decrement of the three balance buckets.
    async fn apply_balance_delta(
        &self,
        id: Uuid,
        pending_delta: i64,
        available_delta: i64,
        paid_out_delta: i64,
    ) -> Result<(), Box<dyn std::error::Error + Send + Sync>>;

    async fn increment_clicks(
        &self,
        id: Uuid,
    ) -> Result<(), Box<dyn std::error::Error + Send + Sync>>;
}

/// Repository trait for the append-only audit log
#[async_trait]
pub trait AuditLogRepository: Send + Sync {
    async fn append(
        &self,
        entry: &AuditLogEntry,
    ) -> Result<(), Box<dyn std::error::Error + Send + Sync>>;

    async fn for_entity(
        &self,
        entity_type: &str,
        entity_id: &str,
    ) -> Result<Vec<AuditLogEntry>, Box<dyn std::error::Error + Send + Sync>>;
}

/// Read-only category lookup against the product catalog. Catalog management
/// itself lives outside this system.
#[async_trait]
pub trait ProductDirectory: Send + Sync {
    async fn category_of(
        &self,
        product_id: Uuid,
    ) -> Result<Option<ProductCategory>, Box<dyn std::error::Error + Send + Sync>>;
}
