use affil_commission::models::{
    Commission, CommissionAdjustment, CommissionFilter, CommissionPage, CommissionRepository,
    CommissionStatus,
};
use async_trait::async_trait;
use chrono::{DateTime, Utc};
use sqlx::{PgPool, Row};
use uuid::Uuid;

pub struct PgCommissionRepository {
    pool: PgPool,
}

impl PgCommissionRepository {
    pub fn new(pool: PgPool) -> Self {
        Self { pool }
    }
}

#[derive(sqlx::FromRow)]
struct CommissionRow {
    id: Uuid,
    conversion_id: Uuid,
    partner_id: Uuid,
    amount_minor: i64,
    original_amount_minor: i64,
    rate_bps: i64,
    bonus_bps: i64,
    status: String,
    hold_until: DateTime<Utc>,
    cancellation_reason: Option<String>,
    created_at: DateTime<Utc>,
    updated_at: DateTime<Utc>,
}

impl CommissionRow {
    fn into_commission(self) -> Result<Commission, Box<dyn std::error::Error + Send + Sync>> {
        Ok(Commission {
            id: self.id,
            conversion_id: self.conversion_id,
            partner_id: self.partner_id,
            amount_minor: self.amount_minor,
            original_amount_minor: self.original_amount_minor,
            rate_bps: self.rate_bps,
            bonus_bps: self.bonus_bps,
            status: parse_status(&self.status)?,
            hold_until: self.hold_until,
            cancellation_reason: self.cancellation_reason,
            created_at: self.created_at,
            updated_at: self.updated_at,
        })
    }
}

fn parse_status(value: &str) -> Result<CommissionStatus, Box<dyn std::error::Error + Send + Sync>> {
    match value {
        "pending" => Ok(CommissionStatus::Pending),
        "confirmed" => Ok(CommissionStatus::Confirmed),
        "cancelled" => Ok(CommissionStatus::Cancelled),
        "paid" => Ok(CommissionStatus::Paid),
        other => Err(format!("Unknown commission status: {}", other).into()),
    }
}

fn status_str(status: CommissionStatus) -> &'static str {
    match status {
        CommissionStatus::Pending => "pending",
        CommissionStatus::Confirmed => "confirmed",
        CommissionStatus::Cancelled => "cancelled",
        CommissionStatus::Paid => "paid",
    }
}

const SELECT_COLUMNS: &str = "id, conversion_id, partner_id, amount_minor, original_amount_minor, rate_bps, bonus_bps, status, hold_until, cancellation_reason, created_at, updated_at";

#[async_trait]
impl CommissionRepository for PgCommissionRepository {
    async fn insert_and_credit(&self, commission: &Commission) -> Result<bool, Box<dyn std::error::Error + Send + Sync>> {
        let mut tx = self.pool.begin().await?;

        // Uniqueness on conversion_id enforces one commission per conversion
        // even under concurrent duplicate events; losing the insert means the
        // winner already carried the balance credit
        let result = sqlx::query(
            r#"
            INSERT INTO commissions (id, conversion_id, partner_id, amount_minor, original_amount_minor, rate_bps, bonus_bps, status, hold_until, cancellation_reason, created_at, updated_at)
            VALUES ($1, $2, $3, $4, $5, $6, $7, $8, $9, $10, $11, $12)
            ON CONFLICT (conversion_id) DO NOTHING
            "#,
        )
        .bind(commission.id)
        .bind(commission.conversion_id)
        .bind(commission.partner_id)
        .bind(commission.amount_minor)
        .bind(commission.original_amount_minor)
        .bind(commission.rate_bps)
        .bind(commission.bonus_bps)
        .bind(status_str(commission.status))
        .bind(commission.hold_until)
        .bind(&commission.cancellation_reason)
        .bind(commission.created_at)
        .bind(commission.updated_at)
        .execute(&mut *tx)
        .await?;

        if result.rows_affected() == 0 {
            tx.rollback().await?;
            return Ok(false);
        }

        sqlx::query(
            r#"
            UPDATE partners
            SET pending_minor = pending_minor + $1,
                total_orders = total_orders + 1,
                conversion_rate = CASE WHEN total_clicks > 0
                    THEN (total_orders + 1)::float8 / total_clicks
                    ELSE 0 END,
                updated_at = NOW()
            WHERE id = $2
            "#,
        )
        .bind(commission.amount_minor)
        .bind(commission.partner_id)
        .execute(&mut *tx)
        .await?;

        tx.commit().await?;
        Ok(true)
    }

    async fn get(&self, id: Uuid) -> Result<Option<Commission>, Box<dyn std::error::Error + Send + Sync>> {
        let row: Option<CommissionRow> = sqlx::query_as(&format!(
            "SELECT {} FROM commissions WHERE id = $1",
            SELECT_COLUMNS
        ))
        .bind(id)
        .fetch_optional(&self.pool)
        .await?;
        row.map(CommissionRow::into_commission).transpose()
    }

    async fn find_by_conversion(
        &self,
        conversion_id: Uuid,
    ) -> Result<Option<Commission>, Box<dyn std::error::Error + Send + Sync>> {
        let row: Option<CommissionRow> = sqlx::query_as(&format!(
            "SELECT {} FROM commissions WHERE conversion_id = $1",
            SELECT_COLUMNS
        ))
        .bind(conversion_id)
        .fetch_optional(&self.pool)
        .await?;
        row.map(CommissionRow::into_commission).transpose()
    }

    async fn update(&self, commission: &Commission) -> Result<(), Box<dyn std::error::Error + Send + Sync>> {
        sqlx::query(
            r#"
            UPDATE commissions
            SET amount_minor = $1, status = $2, cancellation_reason = $3, updated_at = $4
            WHERE id = $5
            "#,
        )
        .bind(commission.amount_minor)
        .bind(status_str(commission.status))
        .bind(&commission.cancellation_reason)
        .bind(commission.updated_at)
        .bind(commission.id)
        .execute(&self.pool)
        .await?;
        Ok(())
    }

    async fn insert_adjustment(
        &self,
        adjustment: &CommissionAdjustment,
    ) -> Result<(), Box<dyn std::error::Error + Send + Sync>> {
        sqlx::query(
            r#"
            INSERT INTO commission_adjustments (id, commission_id, previous_amount_minor, new_amount_minor, reason, created_at)
            VALUES ($1, $2, $3, $4, $5, $6)
            "#,
        )
        .bind(adjustment.id)
        .bind(adjustment.commission_id)
        .bind(adjustment.previous_amount_minor)
        .bind(adjustment.new_amount_minor)
        .bind(&adjustment.reason)
        .bind(adjustment.created_at)
        .execute(&self.pool)
        .await?;
        Ok(())
    }

    async fn list(
        &self,
        filter: &CommissionFilter,
    ) -> Result<CommissionPage, Box<dyn std::error::Error + Send + Sync>> {
        let mut where_clauses = Vec::new();
        if filter.partner_id.is_some() {
            where_clauses.push(format!("partner_id = ${}", where_clauses.len() + 1));
        }
        if filter.status.is_some() {
            where_clauses.push(format!("status = ${}", where_clauses.len() + 1));
        }
        if filter.created_from.is_some() {
            where_clauses.push(format!("created_at >= ${}", where_clauses.len() + 1));
        }
        if filter.created_to.is_some() {
            where_clauses.push(format!("created_at < ${}", where_clauses.len() + 1));
        }
        let where_sql = if where_clauses.is_empty() {
            String::new()
        } else {
            format!("WHERE {}", where_clauses.join(" AND "))
        };

        let count_sql = format!("SELECT COUNT(*) AS total FROM commissions {}", where_sql);
        let mut count_query = sqlx::query(&count_sql);
        if let Some(partner_id) = filter.partner_id {
            count_query = count_query.bind(partner_id);
        }
        if let Some(status) = filter.status {
            count_query = count_query.bind(status_str(status));
        }
        if let Some(from) = filter.created_from {
            count_query = count_query.bind(from);
        }
        if let Some(to) = filter.created_to {
            count_query = count_query.bind(to);
        }
        let total: i64 = count_query.fetch_one(&self.pool).await?.try_get("total")?;

        // limit 0 means unpaged (settlement aggregation reads whole periods)
        let page_sql = if filter.limit > 0 {
            let offset = filter.page.saturating_sub(1).max(0) as i64 * filter.limit as i64;
            format!(
                "SELECT {} FROM commissions {} ORDER BY created_at DESC LIMIT {} OFFSET {}",
                SELECT_COLUMNS, where_sql, filter.limit, offset
            )
        } else {
            format!(
                "SELECT {} FROM commissions {} ORDER BY created_at DESC",
                SELECT_COLUMNS, where_sql
            )
        };

        let mut page_query = sqlx::query_as::<_, CommissionRow>(&page_sql);
        if let Some(partner_id) = filter.partner_id {
            page_query = page_query.bind(partner_id);
        }
        if let Some(status) = filter.status {
            page_query = page_query.bind(status_str(status));
        }
        if let Some(from) = filter.created_from {
            page_query = page_query.bind(from);
        }
        if let Some(to) = filter.created_to {
            page_query = page_query.bind(to);
        }
        let rows = page_query.fetch_all(&self.pool).await?;

        let commissions = rows
            .into_iter()
            .map(CommissionRow::into_commission)
            .collect::<Result<Vec<_>, _>>()?;

        Ok(CommissionPage { commissions, total: total as u64 })
    }

    async fn due_for_confirmation(
        &self,
        now: DateTime<Utc>,
    ) -> Result<Vec<Commission>, Box<dyn std::error::Error + Send + Sync>> {
        let rows: Vec<CommissionRow> = sqlx::query_as(&format!(
            "SELECT {} FROM commissions WHERE status = 'pending' AND hold_until <= $1 ORDER BY hold_until",
            SELECT_COLUMNS
        ))
        .bind(now)
        .fetch_all(&self.pool)
        .await?;
        rows.into_iter().map(CommissionRow::into_commission).collect()
    }

    async fn confirm_and_release(
        &self,
        commission_id: Uuid,
        partner_id: Uuid,
        amount_minor: i64,
    ) -> Result<bool, Box<dyn std::error::Error + Send + Sync>> {
        let mut tx = self.pool.begin().await?;

        // Status guard inside the update: a row no longer pending was handled
        // by a concurrent run and must not move balances twice
        let result = sqlx::query(
            "UPDATE commissions SET status = 'confirmed', updated_at = NOW() WHERE id = $1 AND status = 'pending'",
        )
        .bind(commission_id)
        .execute(&mut *tx)
        .await?;

        if result.rows_affected() == 0 {
            tx.rollback().await?;
            return Ok(false);
        }

        sqlx::query(
            r#"
            UPDATE partners
            SET pending_minor = pending_minor - $1,
                available_minor = available_minor + $1,
                updated_at = NOW()
            WHERE id = $2
            "#,
        )
        .bind(amount_minor)
        .bind(partner_id)
        .execute(&mut *tx)
        .await?;

        tx.commit().await?;
        Ok(true)
    }
}
