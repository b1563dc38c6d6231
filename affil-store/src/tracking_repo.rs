use affil_shared::pii::Masked;
use affil_tracking::models::{ClickRecord, ClickRepository};
use async_trait::async_trait;
use chrono::{DateTime, Utc};
use sqlx::PgPool;
use uuid::Uuid;

pub struct PgClickRepository {
    pool: PgPool,
}

impl PgClickRepository {
    pub fn new(pool: PgPool) -> Self {
        Self { pool }
    }
}

#[derive(sqlx::FromRow)]
struct ClickRow {
    id: Uuid,
    partner_id: Uuid,
    referral_code: String,
    product_id: Option<Uuid>,
    campaign: Option<String>,
    medium: Option<String>,
    source: Option<String>,
    ip_address: Option<String>,
    user_agent: Option<String>,
    session_id: Option<String>,
    recorded_at: DateTime<Utc>,
    anonymized_at: Option<DateTime<Utc>>,
}

impl From<ClickRow> for ClickRecord {
    fn from(row: ClickRow) -> Self {
        ClickRecord {
            id: row.id,
            partner_id: row.partner_id,
            referral_code: row.referral_code,
            product_id: row.product_id,
            campaign: row.campaign,
            medium: row.medium,
            source: row.source,
            ip_address: row.ip_address.map(Masked),
            user_agent: row.user_agent.map(Masked),
            session_id: row.session_id.map(Masked),
            recorded_at: row.recorded_at,
            anonymized_at: row.anonymized_at,
        }
    }
}

#[async_trait]
impl ClickRepository for PgClickRepository {
    async fn insert(&self, click: &ClickRecord) -> Result<(), Box<dyn std::error::Error + Send + Sync>> {
        sqlx::query(
            r#"
            INSERT INTO clicks (id, partner_id, referral_code, product_id, campaign, medium, source, ip_address, user_agent, session_id, recorded_at)
            VALUES ($1, $2, $3, $4, $5, $6, $7, $8, $9, $10, $11)
            "#,
        )
        .bind(click.id)
        .bind(click.partner_id)
        .bind(&click.referral_code)
        .bind(click.product_id)
        .bind(&click.campaign)
        .bind(&click.medium)
        .bind(&click.source)
        .bind(click.ip_address.as_ref().map(|m| m.0.clone()))
        .bind(click.user_agent.as_ref().map(|m| m.0.clone()))
        .bind(click.session_id.as_ref().map(|m| m.0.clone()))
        .bind(click.recorded_at)
        .execute(&self.pool)
        .await?;
        Ok(())
    }

    async fn get(&self, id: Uuid) -> Result<Option<ClickRecord>, Box<dyn std::error::Error + Send + Sync>> {
        let row: Option<ClickRow> = sqlx::query_as(
            "SELECT id, partner_id, referral_code, product_id, campaign, medium, source, ip_address, user_agent, session_id, recorded_at, anonymized_at FROM clicks WHERE id = $1",
        )
        .bind(id)
        .fetch_optional(&self.pool)
        .await?;
        Ok(row.map(ClickRecord::from))
    }

    async fn anonymize_older_than(
        &self,
        cutoff: DateTime<Utc>,
    ) -> Result<u64, Box<dyn std::error::Error + Send + Sync>> {
        // Already-anonymized rows are excluded, so re-runs are no-ops
        let result = sqlx::query(
            r#"
            UPDATE clicks
            SET ip_address = NULL, user_agent = NULL, session_id = NULL, anonymized_at = NOW()
            WHERE recorded_at < $1 AND anonymized_at IS NULL
            "#,
        )
        .bind(cutoff)
        .execute(&self.pool)
        .await?;
        Ok(result.rows_affected())
    }
}
