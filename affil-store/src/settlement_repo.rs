use affil_settlement::batch::{
    PayeeType, SettlementBatch, SettlementLine, SettlementRepository, SettlementStatus,
};
use async_trait::async_trait;
use chrono::{DateTime, Utc};
use sqlx::{PgPool, Row};
use uuid::Uuid;

pub struct PgSettlementRepository {
    pool: PgPool,
}

impl PgSettlementRepository {
    pub fn new(pool: PgPool) -> Self {
        Self { pool }
    }
}

#[derive(sqlx::FromRow)]
struct BatchRow {
    id: Uuid,
    payee_id: Uuid,
    payee_type: String,
    period_start: DateTime<Utc>,
    period_end: DateTime<Utc>,
    status: String,
    total_minor: i64,
    failure_reason: Option<String>,
    created_at: DateTime<Utc>,
    updated_at: DateTime<Utc>,
}

impl BatchRow {
    fn into_batch(self) -> Result<SettlementBatch, Box<dyn std::error::Error + Send + Sync>> {
        Ok(SettlementBatch {
            id: self.id,
            payee_id: self.payee_id,
            payee_type: parse_payee_type(&self.payee_type)?,
            period_start: self.period_start,
            period_end: self.period_end,
            status: parse_status(&self.status)?,
            total_minor: self.total_minor,
            failure_reason: self.failure_reason,
            created_at: self.created_at,
            updated_at: self.updated_at,
        })
    }
}

#[derive(sqlx::FromRow)]
struct LineRow {
    id: Uuid,
    batch_id: Uuid,
    commission_id: Uuid,
    conversion_id: Uuid,
    amount_minor: i64,
    description: String,
}

impl From<LineRow> for SettlementLine {
    fn from(row: LineRow) -> Self {
        SettlementLine {
            id: row.id,
            batch_id: row.batch_id,
            commission_id: row.commission_id,
            conversion_id: row.conversion_id,
            amount_minor: row.amount_minor,
            description: row.description,
        }
    }
}

fn parse_status(value: &str) -> Result<SettlementStatus, Box<dyn std::error::Error + Send + Sync>> {
    match value {
        "OPEN" => Ok(SettlementStatus::Open),
        "CLOSED" => Ok(SettlementStatus::Closed),
        "PROCESSING" => Ok(SettlementStatus::Processing),
        "PAID" => Ok(SettlementStatus::Paid),
        "FAILED" => Ok(SettlementStatus::Failed),
        other => Err(format!("Unknown settlement status: {}", other).into()),
    }
}

fn status_str(status: SettlementStatus) -> &'static str {
    match status {
        SettlementStatus::Open => "OPEN",
        SettlementStatus::Closed => "CLOSED",
        SettlementStatus::Processing => "PROCESSING",
        SettlementStatus::Paid => "PAID",
        SettlementStatus::Failed => "FAILED",
    }
}

fn parse_payee_type(value: &str) -> Result<PayeeType, Box<dyn std::error::Error + Send + Sync>> {
    match value {
        "seller" => Ok(PayeeType::Seller),
        "supplier" => Ok(PayeeType::Supplier),
        "partner" => Ok(PayeeType::Partner),
        other => Err(format!("Unknown payee type: {}", other).into()),
    }
}

fn payee_type_str(payee_type: PayeeType) -> &'static str {
    match payee_type {
        PayeeType::Seller => "seller",
        PayeeType::Supplier => "supplier",
        PayeeType::Partner => "partner",
    }
}

const BATCH_COLUMNS: &str = "id, payee_id, payee_type, period_start, period_end, status, total_minor, failure_reason, created_at, updated_at";

#[async_trait]
impl SettlementRepository for PgSettlementRepository {
    async fn insert(&self, batch: &SettlementBatch) -> Result<(), Box<dyn std::error::Error + Send + Sync>> {
        sqlx::query(
            r#"
            INSERT INTO settlement_batches (id, payee_id, payee_type, period_start, period_end, status, total_minor, failure_reason, created_at, updated_at)
            VALUES ($1, $2, $3, $4, $5, $6, $7, $8, $9, $10)
            "#,
        )
        .bind(batch.id)
        .bind(batch.payee_id)
        .bind(payee_type_str(batch.payee_type))
        .bind(batch.period_start)
        .bind(batch.period_end)
        .bind(status_str(batch.status))
        .bind(batch.total_minor)
        .bind(&batch.failure_reason)
        .bind(batch.created_at)
        .bind(batch.updated_at)
        .execute(&self.pool)
        .await?;
        Ok(())
    }

    async fn get(&self, id: Uuid) -> Result<Option<SettlementBatch>, Box<dyn std::error::Error + Send + Sync>> {
        let row: Option<BatchRow> = sqlx::query_as(&format!(
            "SELECT {} FROM settlement_batches WHERE id = $1",
            BATCH_COLUMNS
        ))
        .bind(id)
        .fetch_optional(&self.pool)
        .await?;
        row.map(BatchRow::into_batch).transpose()
    }

    async fn lines_for(&self, batch_id: Uuid) -> Result<Vec<SettlementLine>, Box<dyn std::error::Error + Send + Sync>> {
        let rows: Vec<LineRow> = sqlx::query_as(
            "SELECT id, batch_id, commission_id, conversion_id, amount_minor, description FROM settlement_lines WHERE batch_id = $1",
        )
        .bind(batch_id)
        .fetch_all(&self.pool)
        .await?;
        Ok(rows.into_iter().map(SettlementLine::from).collect())
    }

    async fn list(
        &self,
        page: u32,
        limit: u32,
    ) -> Result<(Vec<SettlementBatch>, u64), Box<dyn std::error::Error + Send + Sync>> {
        let total: i64 = sqlx::query("SELECT COUNT(*) AS total FROM settlement_batches")
            .fetch_one(&self.pool)
            .await?
            .try_get("total")?;

        let offset = page.saturating_sub(1) as i64 * limit as i64;
        let rows: Vec<BatchRow> = sqlx::query_as(&format!(
            "SELECT {} FROM settlement_batches ORDER BY created_at DESC LIMIT $1 OFFSET $2",
            BATCH_COLUMNS
        ))
        .bind(limit as i64)
        .bind(offset)
        .fetch_all(&self.pool)
        .await?;

        let batches = rows
            .into_iter()
            .map(BatchRow::into_batch)
            .collect::<Result<Vec<_>, _>>()?;
        Ok((batches, total as u64))
    }

    async fn update(&self, batch: &SettlementBatch) -> Result<(), Box<dyn std::error::Error + Send + Sync>> {
        sqlx::query(
            r#"
            UPDATE settlement_batches
            SET status = $1, total_minor = $2, failure_reason = $3, updated_at = $4
            WHERE id = $5
            "#,
        )
        .bind(status_str(batch.status))
        .bind(batch.total_minor)
        .bind(&batch.failure_reason)
        .bind(batch.updated_at)
        .bind(batch.id)
        .execute(&self.pool)
        .await?;
        Ok(())
    }

    async fn replace_lines(
        &self,
        batch_id: Uuid,
        lines: &[SettlementLine],
        total_minor: i64,
    ) -> Result<(), Box<dyn std::error::Error + Send + Sync>> {
        let mut tx = self.pool.begin().await?;

        sqlx::query("DELETE FROM settlement_lines WHERE batch_id = $1")
            .bind(batch_id)
            .execute(&mut *tx)
            .await?;

        for line in lines {
            sqlx::query(
                r#"
                INSERT INTO settlement_lines (id, batch_id, commission_id, conversion_id, amount_minor, description)
                VALUES ($1, $2, $3, $4, $5, $6)
                "#,
            )
            .bind(line.id)
            .bind(line.batch_id)
            .bind(line.commission_id)
            .bind(line.conversion_id)
            .bind(line.amount_minor)
            .bind(&line.description)
            .execute(&mut *tx)
            .await?;
        }

        sqlx::query("UPDATE settlement_batches SET total_minor = $1, updated_at = NOW() WHERE id = $2")
            .bind(total_minor)
            .bind(batch_id)
            .execute(&mut *tx)
            .await?;

        tx.commit().await?;
        Ok(())
    }

    async fn commit_payment(&self, batch: &SettlementBatch) -> Result<(), Box<dyn std::error::Error + Send + Sync>> {
        let mut tx = self.pool.begin().await?;

        let line_count: i64 =
            sqlx::query("SELECT COUNT(*) AS total FROM settlement_lines WHERE batch_id = $1")
                .bind(batch.id)
                .fetch_one(&mut *tx)
                .await?
                .try_get("total")?;

        // Flip every covered commission; if any row is not confirmed the
        // count mismatch aborts the whole transition
        let flipped = sqlx::query(
            r#"
            UPDATE commissions
            SET status = 'paid', updated_at = NOW()
            WHERE status = 'confirmed'
              AND id IN (SELECT commission_id FROM settlement_lines WHERE batch_id = $1)
            "#,
        )
        .bind(batch.id)
        .execute(&mut *tx)
        .await?;

        if flipped.rows_affected() != line_count as u64 {
            tx.rollback().await?;
            return Err(format!(
                "Settlement batch {} covers {} lines but only {} commissions were payable",
                batch.id,
                line_count,
                flipped.rows_affected()
            )
            .into());
        }

        // Move each partner's share from available to paid_out
        sqlx::query(
            r#"
            UPDATE partners p
            SET available_minor = p.available_minor - s.amount,
                paid_out_minor = p.paid_out_minor + s.amount,
                updated_at = NOW()
            FROM (
                SELECT c.partner_id, SUM(l.amount_minor) AS amount
                FROM settlement_lines l
                JOIN commissions c ON c.id = l.commission_id
                WHERE l.batch_id = $1
                GROUP BY c.partner_id
            ) s
            WHERE p.id = s.partner_id
            "#,
        )
        .bind(batch.id)
        .execute(&mut *tx)
        .await?;

        sqlx::query("UPDATE settlement_batches SET status = 'PAID', updated_at = NOW() WHERE id = $1")
            .bind(batch.id)
            .execute(&mut *tx)
            .await?;

        tx.commit().await?;
        Ok(())
    }
}
