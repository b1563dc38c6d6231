use affil_attribution::models::{Conversion, ConversionRepository, ConversionStatus};
use async_trait::async_trait;
use chrono::{DateTime, Utc};
use sqlx::PgPool;
use uuid::Uuid;

pub struct PgConversionRepository {
    pool: PgPool,
}

impl PgConversionRepository {
    pub fn new(pool: PgPool) -> Self {
        Self { pool }
    }
}

#[derive(sqlx::FromRow)]
struct ConversionRow {
    id: Uuid,
    order_id: String,
    product_id: Uuid,
    referral_code: String,
    partner_id: Uuid,
    order_amount_minor: i64,
    product_price_minor: i64,
    quantity: i32,
    currency: String,
    customer_id: Option<String>,
    is_new_customer: bool,
    refunded_minor: i64,
    status: String,
    created_at: DateTime<Utc>,
    updated_at: DateTime<Utc>,
}

impl ConversionRow {
    fn into_conversion(self) -> Result<Conversion, Box<dyn std::error::Error + Send + Sync>> {
        Ok(Conversion {
            id: self.id,
            order_id: self.order_id,
            product_id: self.product_id,
            referral_code: self.referral_code,
            partner_id: self.partner_id,
            order_amount_minor: self.order_amount_minor,
            product_price_minor: self.product_price_minor,
            quantity: self.quantity,
            currency: self.currency,
            customer_id: self.customer_id,
            is_new_customer: self.is_new_customer,
            refunded_minor: self.refunded_minor,
            status: parse_status(&self.status)?,
            created_at: self.created_at,
            updated_at: self.updated_at,
        })
    }
}

fn parse_status(value: &str) -> Result<ConversionStatus, Box<dyn std::error::Error + Send + Sync>> {
    match value {
        "pending" => Ok(ConversionStatus::Pending),
        "confirmed" => Ok(ConversionStatus::Confirmed),
        "cancelled" => Ok(ConversionStatus::Cancelled),
        "refunded" => Ok(ConversionStatus::Refunded),
        "partially_refunded" => Ok(ConversionStatus::PartiallyRefunded),
        other => Err(format!("Unknown conversion status: {}", other).into()),
    }
}

fn status_str(status: ConversionStatus) -> &'static str {
    match status {
        ConversionStatus::Pending => "pending",
        ConversionStatus::Confirmed => "confirmed",
        ConversionStatus::Cancelled => "cancelled",
        ConversionStatus::Refunded => "refunded",
        ConversionStatus::PartiallyRefunded => "partially_refunded",
    }
}

const SELECT_COLUMNS: &str = "id, order_id, product_id, referral_code, partner_id, order_amount_minor, product_price_minor, quantity, currency, customer_id, is_new_customer, refunded_minor, status, created_at, updated_at";

#[async_trait]
impl ConversionRepository for PgConversionRepository {
    async fn insert(&self, conversion: &Conversion) -> Result<(), Box<dyn std::error::Error + Send + Sync>> {
        // ON CONFLICT keeps the (order_id, referral_code) uniqueness race-safe
        // under duplicate event delivery
        sqlx::query(
            r#"
            INSERT INTO conversions (id, order_id, product_id, referral_code, partner_id, order_amount_minor, product_price_minor, quantity, currency, customer_id, is_new_customer, refunded_minor, status, created_at, updated_at)
            VALUES ($1, $2, $3, $4, $5, $6, $7, $8, $9, $10, $11, $12, $13, $14, $15)
            ON CONFLICT (order_id, referral_code) DO NOTHING
            "#,
        )
        .bind(conversion.id)
        .bind(&conversion.order_id)
        .bind(conversion.product_id)
        .bind(&conversion.referral_code)
        .bind(conversion.partner_id)
        .bind(conversion.order_amount_minor)
        .bind(conversion.product_price_minor)
        .bind(conversion.quantity)
        .bind(&conversion.currency)
        .bind(&conversion.customer_id)
        .bind(conversion.is_new_customer)
        .bind(conversion.refunded_minor)
        .bind(status_str(conversion.status))
        .bind(conversion.created_at)
        .bind(conversion.updated_at)
        .execute(&self.pool)
        .await?;
        Ok(())
    }

    async fn get(&self, id: Uuid) -> Result<Option<Conversion>, Box<dyn std::error::Error + Send + Sync>> {
        let row: Option<ConversionRow> = sqlx::query_as(&format!(
            "SELECT {} FROM conversions WHERE id = $1",
            SELECT_COLUMNS
        ))
        .bind(id)
        .fetch_optional(&self.pool)
        .await?;
        row.map(ConversionRow::into_conversion).transpose()
    }

    async fn find_by_order_and_code(
        &self,
        order_id: &str,
        referral_code: &str,
    ) -> Result<Option<Conversion>, Box<dyn std::error::Error + Send + Sync>> {
        let row: Option<ConversionRow> = sqlx::query_as(&format!(
            "SELECT {} FROM conversions WHERE order_id = $1 AND referral_code = $2",
            SELECT_COLUMNS
        ))
        .bind(order_id)
        .bind(referral_code)
        .fetch_optional(&self.pool)
        .await?;
        row.map(ConversionRow::into_conversion).transpose()
    }

    async fn find_by_order(
        &self,
        order_id: &str,
    ) -> Result<Vec<Conversion>, Box<dyn std::error::Error + Send + Sync>> {
        let rows: Vec<ConversionRow> = sqlx::query_as(&format!(
            "SELECT {} FROM conversions WHERE order_id = $1 ORDER BY created_at",
            SELECT_COLUMNS
        ))
        .bind(order_id)
        .fetch_all(&self.pool)
        .await?;
        rows.into_iter().map(ConversionRow::into_conversion).collect()
    }

    async fn update(&self, conversion: &Conversion) -> Result<(), Box<dyn std::error::Error + Send + Sync>> {
        sqlx::query(
            r#"
            UPDATE conversions
            SET status = $1, refunded_minor = $2, updated_at = $3
            WHERE id = $4
            "#,
        )
        .bind(status_str(conversion.status))
        .bind(conversion.refunded_minor)
        .bind(conversion.updated_at)
        .bind(conversion.id)
        .execute(&self.pool)
        .await?;
        Ok(())
    }
}
