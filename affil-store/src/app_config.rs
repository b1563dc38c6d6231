use affil_commission::engine::CommissionRules;
use serde::Deserialize;
use std::env;

#[derive(Debug, Deserialize, Clone)]
pub struct Config {
    pub server: ServerConfig,
    pub database: DatabaseConfig,
    pub redis: RedisConfig,
    pub kafka: KafkaConfig,
    pub business_rules: BusinessRules,
}

/// Injected business rules. Hold period, retention window, commission rates
/// and rate limits are configuration, never constants.
#[derive(Debug, Deserialize, Clone)]
pub struct BusinessRules {
    pub hold_days: i64,
    pub click_retention_days: i64,
    pub base_rate_bps: i64,
    pub bronze_bonus_bps: i64,
    pub silver_bonus_bps: i64,
    pub gold_bonus_bps: i64,
    pub platinum_bonus_bps: i64,
    #[serde(default = "default_rate_limit")]
    pub click_rate_limit_per_minute: i64,
}

fn default_rate_limit() -> i64 {
    100
}

impl BusinessRules {
    pub fn commission_rules(&self) -> CommissionRules {
        CommissionRules {
            base_rate_bps: self.base_rate_bps,
            hold_days: self.hold_days,
            bronze_bonus_bps: self.bronze_bonus_bps,
            silver_bonus_bps: self.silver_bonus_bps,
            gold_bonus_bps: self.gold_bonus_bps,
            platinum_bonus_bps: self.platinum_bonus_bps,
        }
    }
}

#[derive(Debug, Deserialize, Clone)]
pub struct ServerConfig {
    pub port: u16,
}

#[derive(Debug, Deserialize, Clone)]
pub struct DatabaseConfig {
    pub url: String,
}

#[derive(Debug, Deserialize, Clone)]
pub struct RedisConfig {
    pub url: String,
}

#[derive(Debug, Deserialize, Clone)]
pub struct KafkaConfig {
    pub brokers: String,
    pub order_events_topic: String,
    pub dead_letter_topic: String,
    pub consumer_group: String,
}

impl Config {
    pub fn load() -> Result<Self, config::ConfigError> {
        let run_mode = env::var("RUN_MODE").unwrap_or_else(|_| "development".into());

        let s = config::Config::builder()
            // Start off by merging in the "default" configuration file
            .add_source(config::File::with_name("config/default"))
            // Layer the current environment file on top (optional)
            .add_source(config::File::with_name(&format!("config/{}", run_mode)).required(false))
            // Local overrides, not checked in
            .add_source(config::File::with_name("config/local").required(false))
            // Environment variables win, e.g. AFFIL__SERVER__PORT=8080
            .add_source(config::Environment::with_prefix("AFFIL").separator("__"))
            .build()?;

        s.try_deserialize()
    }
}
