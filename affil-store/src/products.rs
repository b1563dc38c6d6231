use affil_core::products::ProductCategory;
use affil_core::repository::ProductDirectory;
use async_trait::async_trait;
use sqlx::{PgPool, Row};
use uuid::Uuid;

/// Read-only category lookup against the platform's product table.
pub struct PgProductDirectory {
    pool: PgPool,
}

impl PgProductDirectory {
    pub fn new(pool: PgPool) -> Self {
        Self { pool }
    }
}

#[async_trait]
impl ProductDirectory for PgProductDirectory {
    async fn category_of(
        &self,
        product_id: Uuid,
    ) -> Result<Option<ProductCategory>, Box<dyn std::error::Error + Send + Sync>> {
        let row = sqlx::query("SELECT category FROM products WHERE id = $1")
            .bind(product_id)
            .fetch_optional(&self.pool)
            .await?;

        match row {
            Some(row) => {
                let category: String = row.try_get("category")?;
                let parsed = ProductCategory::parse(&category)
                    .ok_or_else(|| format!("Unknown product category: {}", category))?;
                Ok(Some(parsed))
            }
            None => Ok(None),
        }
    }
}
