use affil_settlement::relay::{OrderRelay, RelayRepository, RelayStatus};
use async_trait::async_trait;
use chrono::{DateTime, Utc};
use sqlx::{PgPool, Row};
use uuid::Uuid;

pub struct PgRelayRepository {
    pool: PgPool,
}

impl PgRelayRepository {
    pub fn new(pool: PgPool) -> Self {
        Self { pool }
    }
}

#[derive(sqlx::FromRow)]
struct RelayRow {
    id: Uuid,
    order_id: String,
    supplier_id: Uuid,
    idempotency_key: String,
    status: String,
    failure_reason: Option<String>,
    created_at: DateTime<Utc>,
    updated_at: DateTime<Utc>,
}

impl RelayRow {
    fn into_relay(self) -> Result<OrderRelay, Box<dyn std::error::Error + Send + Sync>> {
        Ok(OrderRelay {
            id: self.id,
            order_id: self.order_id,
            supplier_id: self.supplier_id,
            idempotency_key: self.idempotency_key,
            status: parse_status(&self.status)?,
            failure_reason: self.failure_reason,
            created_at: self.created_at,
            updated_at: self.updated_at,
        })
    }
}

fn parse_status(value: &str) -> Result<RelayStatus, Box<dyn std::error::Error + Send + Sync>> {
    match value {
        "created" => Ok(RelayStatus::Created),
        "acknowledged" => Ok(RelayStatus::Acknowledged),
        "shipped" => Ok(RelayStatus::Shipped),
        "delivered" => Ok(RelayStatus::Delivered),
        "cancelled" => Ok(RelayStatus::Cancelled),
        "failed" => Ok(RelayStatus::Failed),
        other => Err(format!("Unknown relay status: {}", other).into()),
    }
}

fn status_str(status: RelayStatus) -> &'static str {
    match status {
        RelayStatus::Created => "created",
        RelayStatus::Acknowledged => "acknowledged",
        RelayStatus::Shipped => "shipped",
        RelayStatus::Delivered => "delivered",
        RelayStatus::Cancelled => "cancelled",
        RelayStatus::Failed => "failed",
    }
}

const SELECT_COLUMNS: &str = "id, order_id, supplier_id, idempotency_key, status, failure_reason, created_at, updated_at";

#[async_trait]
impl RelayRepository for PgRelayRepository {
    async fn insert_idempotent(&self, relay: &OrderRelay) -> Result<OrderRelay, Box<dyn std::error::Error + Send + Sync>> {
        sqlx::query(
            r#"
            INSERT INTO order_relays (id, order_id, supplier_id, idempotency_key, status, failure_reason, created_at, updated_at)
            VALUES ($1, $2, $3, $4, $5, $6, $7, $8)
            ON CONFLICT (idempotency_key) DO NOTHING
            "#,
        )
        .bind(relay.id)
        .bind(&relay.order_id)
        .bind(relay.supplier_id)
        .bind(&relay.idempotency_key)
        .bind(status_str(relay.status))
        .bind(&relay.failure_reason)
        .bind(relay.created_at)
        .bind(relay.updated_at)
        .execute(&self.pool)
        .await?;

        // The surviving row is authoritative whether or not we just wrote it
        let row: RelayRow = sqlx::query_as(&format!(
            "SELECT {} FROM order_relays WHERE idempotency_key = $1",
            SELECT_COLUMNS
        ))
        .bind(&relay.idempotency_key)
        .fetch_one(&self.pool)
        .await?;
        row.into_relay()
    }

    async fn get(&self, id: Uuid) -> Result<Option<OrderRelay>, Box<dyn std::error::Error + Send + Sync>> {
        let row: Option<RelayRow> = sqlx::query_as(&format!(
            "SELECT {} FROM order_relays WHERE id = $1",
            SELECT_COLUMNS
        ))
        .bind(id)
        .fetch_optional(&self.pool)
        .await?;
        row.map(RelayRow::into_relay).transpose()
    }

    async fn list(
        &self,
        page: u32,
        limit: u32,
    ) -> Result<(Vec<OrderRelay>, u64), Box<dyn std::error::Error + Send + Sync>> {
        let total: i64 = sqlx::query("SELECT COUNT(*) AS total FROM order_relays")
            .fetch_one(&self.pool)
            .await?
            .try_get("total")?;

        let offset = page.saturating_sub(1) as i64 * limit as i64;
        let rows: Vec<RelayRow> = sqlx::query_as(&format!(
            "SELECT {} FROM order_relays ORDER BY created_at DESC LIMIT $1 OFFSET $2",
            SELECT_COLUMNS
        ))
        .bind(limit as i64)
        .bind(offset)
        .fetch_all(&self.pool)
        .await?;

        let relays = rows
            .into_iter()
            .map(RelayRow::into_relay)
            .collect::<Result<Vec<_>, _>>()?;
        Ok((relays, total as u64))
    }

    async fn update(&self, relay: &OrderRelay) -> Result<(), Box<dyn std::error::Error + Send + Sync>> {
        sqlx::query(
            r#"
            UPDATE order_relays
            SET status = $1, failure_reason = $2, updated_at = $3
            WHERE id = $4
            "#,
        )
        .bind(status_str(relay.status))
        .bind(&relay.failure_reason)
        .bind(relay.updated_at)
        .bind(relay.id)
        .execute(&self.pool)
        .await?;
        Ok(())
    }
}
