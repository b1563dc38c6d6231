pub mod app_config;
pub mod attribution_repo;
pub mod audit_repo;
pub mod commission_repo;
pub mod database;
pub mod events;
pub mod memory;
pub mod partner_repo;
pub mod products;
pub mod redis_repo;
pub mod relay_repo;
pub mod settlement_repo;
pub mod tracking_repo;

pub use database::DbClient;
pub use events::{EventProducer, KafkaDeadLetterSink};
pub use memory::MemoryStore;
pub use redis_repo::RedisClient;
