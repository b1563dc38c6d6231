use affil_core::partner::{Partner, PartnerStatus, PartnerTier};
use affil_core::repository::PartnerRepository;
use async_trait::async_trait;
use sqlx::PgPool;
use uuid::Uuid;

pub struct PgPartnerRepository {
    pool: PgPool,
}

impl PgPartnerRepository {
    pub fn new(pool: PgPool) -> Self {
        Self { pool }
    }
}

// Internal struct for type-safe querying
#[derive(sqlx::FromRow)]
struct PartnerRow {
    id: Uuid,
    name: String,
    referral_code: String,
    tier: String,
    status: String,
    pending_minor: i64,
    available_minor: i64,
    paid_out_minor: i64,
    total_clicks: i64,
    total_orders: i64,
    conversion_rate: f64,
    created_at: chrono::DateTime<chrono::Utc>,
    updated_at: chrono::DateTime<chrono::Utc>,
}

impl PartnerRow {
    fn into_partner(self) -> Result<Partner, Box<dyn std::error::Error + Send + Sync>> {
        Ok(Partner {
            id: self.id,
            name: self.name,
            referral_code: self.referral_code,
            tier: parse_tier(&self.tier)?,
            status: parse_status(&self.status)?,
            pending_minor: self.pending_minor,
            available_minor: self.available_minor,
            paid_out_minor: self.paid_out_minor,
            total_clicks: self.total_clicks,
            total_orders: self.total_orders,
            conversion_rate: self.conversion_rate,
            created_at: self.created_at,
            updated_at: self.updated_at,
        })
    }
}

fn parse_tier(value: &str) -> Result<PartnerTier, Box<dyn std::error::Error + Send + Sync>> {
    match value {
        "bronze" => Ok(PartnerTier::Bronze),
        "silver" => Ok(PartnerTier::Silver),
        "gold" => Ok(PartnerTier::Gold),
        "platinum" => Ok(PartnerTier::Platinum),
        other => Err(format!("Unknown partner tier: {}", other).into()),
    }
}

fn parse_status(value: &str) -> Result<PartnerStatus, Box<dyn std::error::Error + Send + Sync>> {
    match value {
        "pending" => Ok(PartnerStatus::Pending),
        "active" => Ok(PartnerStatus::Active),
        "suspended" => Ok(PartnerStatus::Suspended),
        "rejected" => Ok(PartnerStatus::Rejected),
        other => Err(format!("Unknown partner status: {}", other).into()),
    }
}

fn status_str(status: PartnerStatus) -> &'static str {
    match status {
        PartnerStatus::Pending => "pending",
        PartnerStatus::Active => "active",
        PartnerStatus::Suspended => "suspended",
        PartnerStatus::Rejected => "rejected",
    }
}

const SELECT_COLUMNS: &str = "id, name, referral_code, tier, status, pending_minor, available_minor, paid_out_minor, total_clicks, total_orders, conversion_rate, created_at, updated_at";

#[async_trait]
impl PartnerRepository for PgPartnerRepository {
    async fn insert(&self, partner: &Partner) -> Result<(), Box<dyn std::error::Error + Send + Sync>> {
        sqlx::query(
            r#"
            INSERT INTO partners (id, name, referral_code, tier, status, pending_minor, available_minor, paid_out_minor, total_clicks, total_orders, conversion_rate, created_at, updated_at)
            VALUES ($1, $2, $3, $4, $5, $6, $7, $8, $9, $10, $11, $12, $13)
            "#,
        )
        .bind(partner.id)
        .bind(&partner.name)
        .bind(&partner.referral_code)
        .bind(partner.tier.as_str())
        .bind(status_str(partner.status))
        .bind(partner.pending_minor)
        .bind(partner.available_minor)
        .bind(partner.paid_out_minor)
        .bind(partner.total_clicks)
        .bind(partner.total_orders)
        .bind(partner.conversion_rate)
        .bind(partner.created_at)
        .bind(partner.updated_at)
        .execute(&self.pool)
        .await?;
        Ok(())
    }

    async fn get(&self, id: Uuid) -> Result<Option<Partner>, Box<dyn std::error::Error + Send + Sync>> {
        let row: Option<PartnerRow> = sqlx::query_as(&format!(
            "SELECT {} FROM partners WHERE id = $1",
            SELECT_COLUMNS
        ))
        .bind(id)
        .fetch_optional(&self.pool)
        .await?;

        row.map(PartnerRow::into_partner).transpose()
    }

    async fn find_by_referral_code(
        &self,
        referral_code: &str,
    ) -> Result<Option<Partner>, Box<dyn std::error::Error + Send + Sync>> {
        let row: Option<PartnerRow> = sqlx::query_as(&format!(
            "SELECT {} FROM partners WHERE referral_code = $1",
            SELECT_COLUMNS
        ))
        .bind(referral_code)
        .fetch_optional(&self.pool)
        .await?;

        row.map(PartnerRow::into_partner).transpose()
    }

    async fn update_status(
        &self,
        id: Uuid,
        status: PartnerStatus,
    ) -> Result<(), Box<dyn std::error::Error + Send + Sync>> {
        sqlx::query("UPDATE partners SET status = $1, updated_at = NOW() WHERE id = $2")
            .bind(status_str(status))
            .bind(id)
            .execute(&self.pool)
            .await?;
        Ok(())
    }

    async fn apply_balance_delta(
        &self,
        id: Uuid,
        pending_delta: i64,
        available_delta: i64,
        paid_out_delta: i64,
    ) -> Result<(), Box<dyn std::error::Error + Send + Sync>> {
        // Atomic in-database increments; never read-modify-write in app code
        sqlx::query(
            r#"
            UPDATE partners
            SET pending_minor = pending_minor + $1,
                available_minor = available_minor + $2,
                paid_out_minor = paid_out_minor + $3,
                updated_at = NOW()
            WHERE id = $4
            "#,
        )
        .bind(pending_delta)
        .bind(available_delta)
        .bind(paid_out_delta)
        .bind(id)
        .execute(&self.pool)
        .await?;
        Ok(())
    }

    async fn increment_clicks(&self, id: Uuid) -> Result<(), Box<dyn std::error::Error + Send + Sync>> {
        sqlx::query(
            r#"
            UPDATE partners
            SET total_clicks = total_clicks + 1,
                conversion_rate = total_orders::float8 / (total_clicks + 1),
                updated_at = NOW()
            WHERE id = $1
            "#,
        )
        .bind(id)
        .execute(&self.pool)
        .await?;
        Ok(())
    }
}
