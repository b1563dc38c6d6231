use sqlx::postgres::PgPoolOptions;
use sqlx::{Pool, Postgres, Row};
use std::time::Duration;
use tracing::info;

#[derive(Clone)]
pub struct DbClient {
    pub pool: Pool<Postgres>,
}

impl DbClient {
    pub async fn new(connection_string: &str) -> Result<Self, sqlx::Error> {
        let pool = PgPoolOptions::new()
            .max_connections(5)
            .acquire_timeout(Duration::from_secs(3))
            .connect(connection_string)
            .await?;

        Ok(Self { pool })
    }

    pub async fn migrate(&self) -> Result<(), sqlx::migrate::MigrateError> {
        info!("Running database migrations...");
        sqlx::migrate!("../migrations").run(&self.pool).await?;
        info!("Migrations completed successfully.");
        Ok(())
    }

    /// Overlays file/env business rules with operator overrides stored in the
    /// business_rules table. Rows are `{"value": <number>}` keyed by rule name.
    pub async fn fetch_business_rules(
        &self,
        defaults: crate::app_config::BusinessRules,
    ) -> Result<crate::app_config::BusinessRules, sqlx::Error> {
        let rows = sqlx::query("SELECT rule_key, rule_value FROM business_rules")
            .fetch_all(&self.pool)
            .await?;

        let mut rules = defaults;

        for row in rows {
            let rule_key: String = row.try_get("rule_key")?;
            let rule_value: serde_json::Value = row.try_get("rule_value")?;

            if let Some(v) = rule_value.get("value").and_then(|v| v.as_i64()) {
                match rule_key.as_str() {
                    "hold_days" => rules.hold_days = v,
                    "click_retention_days" => rules.click_retention_days = v,
                    "base_rate_bps" => rules.base_rate_bps = v,
                    "bronze_bonus_bps" => rules.bronze_bonus_bps = v,
                    "silver_bonus_bps" => rules.silver_bonus_bps = v,
                    "gold_bonus_bps" => rules.gold_bonus_bps = v,
                    "platinum_bonus_bps" => rules.platinum_bonus_bps = v,
                    "click_rate_limit_per_minute" => rules.click_rate_limit_per_minute = v,
                    _ => {}
                }
            }
        }

        Ok(rules)
    }
}
