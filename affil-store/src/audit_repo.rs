use affil_core::audit::{ActorType, AuditLogEntry};
use affil_core::repository::AuditLogRepository;
use async_trait::async_trait;
use chrono::{DateTime, Utc};
use sqlx::PgPool;
use uuid::Uuid;

pub struct PgAuditLogRepository {
    pool: PgPool,
}

impl PgAuditLogRepository {
    pub fn new(pool: PgPool) -> Self {
        Self { pool }
    }
}

#[derive(sqlx::FromRow)]
struct AuditRow {
    id: Uuid,
    entity_type: String,
    entity_id: String,
    action: String,
    previous_state: Option<String>,
    new_state: Option<String>,
    actor_id: String,
    actor_type: String,
    description: String,
    timestamp: DateTime<Utc>,
}

impl AuditRow {
    fn into_entry(self) -> Result<AuditLogEntry, Box<dyn std::error::Error + Send + Sync>> {
        let actor_type = match self.actor_type.as_str() {
            "system" => ActorType::System,
            "operator" => ActorType::Operator,
            other => return Err(format!("Unknown actor type: {}", other).into()),
        };
        Ok(AuditLogEntry {
            id: self.id,
            entity_type: self.entity_type,
            entity_id: self.entity_id,
            action: self.action,
            previous_state: self.previous_state,
            new_state: self.new_state,
            actor_id: self.actor_id,
            actor_type,
            description: self.description,
            timestamp: self.timestamp,
        })
    }
}

#[async_trait]
impl AuditLogRepository for PgAuditLogRepository {
    async fn append(&self, entry: &AuditLogEntry) -> Result<(), Box<dyn std::error::Error + Send + Sync>> {
        sqlx::query(
            r#"
            INSERT INTO audit_log (id, entity_type, entity_id, action, previous_state, new_state, actor_id, actor_type, description, timestamp)
            VALUES ($1, $2, $3, $4, $5, $6, $7, $8, $9, $10)
            "#,
        )
        .bind(entry.id)
        .bind(&entry.entity_type)
        .bind(&entry.entity_id)
        .bind(&entry.action)
        .bind(&entry.previous_state)
        .bind(&entry.new_state)
        .bind(&entry.actor_id)
        .bind(entry.actor_type.as_str())
        .bind(&entry.description)
        .bind(entry.timestamp)
        .execute(&self.pool)
        .await?;
        Ok(())
    }

    async fn for_entity(
        &self,
        entity_type: &str,
        entity_id: &str,
    ) -> Result<Vec<AuditLogEntry>, Box<dyn std::error::Error + Send + Sync>> {
        let rows: Vec<AuditRow> = sqlx::query_as(
            r#"
            SELECT id, entity_type, entity_id, action, previous_state, new_state, actor_id, actor_type, description, timestamp
            FROM audit_log
            WHERE entity_type = $1 AND entity_id = $2
            ORDER BY timestamp
            "#,
        )
        .bind(entity_type)
        .bind(entity_id)
        .fetch_all(&self.pool)
        .await?;
        rows.into_iter().map(AuditRow::into_entry).collect()
    }
}
