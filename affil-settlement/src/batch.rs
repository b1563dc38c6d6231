use std::sync::Arc;

use affil_commission::models::{CommissionFilter, CommissionRepository, CommissionStatus};
use affil_core::audit::{ActorType, AuditLogEntry};
use affil_core::repository::AuditLogRepository;
use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use tracing::info;
use uuid::Uuid;

/// Settlement batch status. Wire representation keeps the operator-facing
/// upper-case convention.
#[derive(Debug, Clone, Copy, Serialize, Deserialize, PartialEq, Eq)]
#[serde(rename_all = "SCREAMING_SNAKE_CASE")]
pub enum SettlementStatus {
    Open,
    Closed,
    Processing,
    Paid,
    Failed,
}

#[derive(Debug, Clone, Copy, Serialize, Deserialize, PartialEq, Eq)]
#[serde(rename_all = "snake_case")]
pub enum PayeeType {
    Seller,
    Supplier,
    Partner,
}

/// A payee-period aggregation of confirmed commissions with its own payout
/// lifecycle, independent of the per-conversion lifecycle.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct SettlementBatch {
    pub id: Uuid,
    pub payee_id: Uuid,
    pub payee_type: PayeeType,
    pub period_start: DateTime<Utc>,
    pub period_end: DateTime<Utc>,
    pub status: SettlementStatus,
    pub total_minor: i64,
    pub failure_reason: Option<String>,
    pub created_at: DateTime<Utc>,
    pub updated_at: DateTime<Utc>,
}

impl SettlementBatch {
    pub fn new(payee_id: Uuid, payee_type: PayeeType, period_start: DateTime<Utc>, period_end: DateTime<Utc>) -> Self {
        let now = Utc::now();
        Self {
            id: Uuid::new_v4(),
            payee_id,
            payee_type,
            period_start,
            period_end,
            status: SettlementStatus::Open,
            total_minor: 0,
            failure_reason: None,
            created_at: now,
            updated_at: now,
        }
    }

    /// Transition: OPEN -> CLOSED; totals become immutable.
    pub fn close(&mut self) -> Result<(), InvalidTransition> {
        self.guard(SettlementStatus::Open, "CLOSED")?;
        self.set_status(SettlementStatus::Closed);
        Ok(())
    }

    /// Transition: CLOSED -> PROCESSING (hand-off to the payout mechanism)
    pub fn start_processing(&mut self) -> Result<(), InvalidTransition> {
        self.guard(SettlementStatus::Closed, "PROCESSING")?;
        self.set_status(SettlementStatus::Processing);
        Ok(())
    }

    /// Transition: PROCESSING -> PAID
    pub fn mark_paid(&mut self) -> Result<(), InvalidTransition> {
        self.guard(SettlementStatus::Processing, "PAID")?;
        self.set_status(SettlementStatus::Paid);
        Ok(())
    }

    /// Transition: PROCESSING -> FAILED
    pub fn mark_failed(&mut self, reason: String) -> Result<(), InvalidTransition> {
        self.guard(SettlementStatus::Processing, "FAILED")?;
        self.failure_reason = Some(reason);
        self.set_status(SettlementStatus::Failed);
        Ok(())
    }

    /// Transition: FAILED -> PROCESSING, only via this explicit retry.
    pub fn retry(&mut self) -> Result<(), InvalidTransition> {
        self.guard(SettlementStatus::Failed, "PROCESSING")?;
        self.failure_reason = None;
        self.set_status(SettlementStatus::Processing);
        Ok(())
    }

    fn guard(&self, expected: SettlementStatus, to: &str) -> Result<(), InvalidTransition> {
        if self.status != expected {
            return Err(InvalidTransition {
                from: format!("{:?}", self.status),
                to: to.to_string(),
            });
        }
        Ok(())
    }

    fn set_status(&mut self, status: SettlementStatus) {
        self.status = status;
        self.updated_at = Utc::now();
    }
}

#[derive(Debug, thiserror::Error)]
#[error("Invalid settlement transition from {from} to {to}")]
pub struct InvalidTransition {
    pub from: String,
    pub to: String,
}

/// One confirmed commission inside a batch
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct SettlementLine {
    pub id: Uuid,
    pub batch_id: Uuid,
    pub commission_id: Uuid,
    pub conversion_id: Uuid,
    pub amount_minor: i64,
    pub description: String,
}

/// Repository trait for settlement batch data access
#[async_trait::async_trait]
pub trait SettlementRepository: Send + Sync {
    async fn insert(
        &self,
        batch: &SettlementBatch,
    ) -> Result<(), Box<dyn std::error::Error + Send + Sync>>;

    async fn get(
        &self,
        id: Uuid,
    ) -> Result<Option<SettlementBatch>, Box<dyn std::error::Error + Send + Sync>>;

    async fn lines_for(
        &self,
        batch_id: Uuid,
    ) -> Result<Vec<SettlementLine>, Box<dyn std::error::Error + Send + Sync>>;

    async fn list(
        &self,
        page: u32,
        limit: u32,
    ) -> Result<(Vec<SettlementBatch>, u64), Box<dyn std::error::Error + Send + Sync>>;

    async fn update(
        &self,
        batch: &SettlementBatch,
    ) -> Result<(), Box<dyn std::error::Error + Send + Sync>>;

    /// Replaces the line items and total of a batch still being calculated.
    async fn replace_lines(
        &self,
        batch_id: Uuid,
        lines: &[SettlementLine],
        total_minor: i64,
    ) -> Result<(), Box<dyn std::error::Error + Send + Sync>>;

    /// All-or-nothing payment commit: persists the batch as PAID, flips every
    /// covered commission confirmed -> paid and moves the partner amounts
    /// available -> paid_out. If any commission is not in confirmed state the
    /// whole transition fails and nothing is applied.
    async fn commit_payment(
        &self,
        batch: &SettlementBatch,
    ) -> Result<(), Box<dyn std::error::Error + Send + Sync>>;
}

#[derive(Debug, thiserror::Error)]
pub enum SettlementError {
    #[error("Settlement batch not found: {0}")]
    NotFound(Uuid),

    #[error("Invalid settlement transition from {from} to {to}")]
    InvalidTransition { from: String, to: String },

    #[error("Invalid settlement period: {0}")]
    InvalidPeriod(String),

    #[error("Store error: {0}")]
    Store(#[from] Box<dyn std::error::Error + Send + Sync>),
}

impl From<InvalidTransition> for SettlementError {
    fn from(e: InvalidTransition) -> Self {
        SettlementError::InvalidTransition { from: e.from, to: e.to }
    }
}

/// Drives the settlement batch lifecycle. Every state change appends an
/// audit row; transition failures propagate to the caller because a
/// half-applied financial transition is unacceptable.
pub struct SettlementEngine {
    batches: Arc<dyn SettlementRepository>,
    commissions: Arc<dyn CommissionRepository>,
    audit: Arc<dyn AuditLogRepository>,
}

impl SettlementEngine {
    pub fn new(
        batches: Arc<dyn SettlementRepository>,
        commissions: Arc<dyn CommissionRepository>,
        audit: Arc<dyn AuditLogRepository>,
    ) -> Self {
        Self { batches, commissions, audit }
    }

    pub async fn create(
        &self,
        payee_id: Uuid,
        payee_type: PayeeType,
        period_start: DateTime<Utc>,
        period_end: DateTime<Utc>,
        actor_id: &str,
    ) -> Result<SettlementBatch, SettlementError> {
        if period_end <= period_start {
            return Err(SettlementError::InvalidPeriod(format!(
                "period end {} not after start {}",
                period_end, period_start
            )));
        }

        let batch = SettlementBatch::new(payee_id, payee_type, period_start, period_end);
        self.batches.insert(&batch).await?;
        self.log(&batch, "create", None, actor_id, format!("Settlement batch created for payee {}", payee_id))
            .await?;
        Ok(batch)
    }

    /// Aggregates confirmed commissions for the payee within the period into
    /// line items and a total. OPEN batches only; commission rows are read,
    /// never mutated here.
    pub async fn calculate(&self, id: Uuid, actor_id: &str) -> Result<SettlementBatch, SettlementError> {
        let mut batch = self.load(id).await?;
        if batch.status != SettlementStatus::Open {
            return Err(SettlementError::InvalidTransition {
                from: format!("{:?}", batch.status),
                to: "calculated".to_string(),
            });
        }

        let filter = CommissionFilter {
            partner_id: Some(batch.payee_id),
            status: Some(CommissionStatus::Confirmed),
            created_from: Some(batch.period_start),
            created_to: Some(batch.period_end),
            page: 0,
            limit: 0, // unpaged: settlement needs the full period
        };
        let page = self.commissions.list(&filter).await?;

        let lines: Vec<SettlementLine> = page
            .commissions
            .iter()
            .map(|c| SettlementLine {
                id: Uuid::new_v4(),
                batch_id: batch.id,
                commission_id: c.id,
                conversion_id: c.conversion_id,
                amount_minor: c.amount_minor,
                description: format!("Commission for conversion {}", c.conversion_id),
            })
            .collect();
        let total_minor: i64 = lines.iter().map(|l| l.amount_minor).sum();

        self.batches.replace_lines(batch.id, &lines, total_minor).await?;
        batch.total_minor = total_minor;
        batch.updated_at = Utc::now();

        self.log(
            &batch,
            "calculate",
            None,
            actor_id,
            format!("Calculated {} line items totalling {}", lines.len(), total_minor),
        )
        .await?;

        info!(batch_id = %batch.id, lines = lines.len(), total_minor, "Settlement batch calculated");
        Ok(batch)
    }

    pub async fn confirm(&self, id: Uuid, actor_id: &str) -> Result<SettlementBatch, SettlementError> {
        self.transition(id, actor_id, "confirm", |b| b.close()).await
    }

    pub async fn start_processing(&self, id: Uuid, actor_id: &str) -> Result<SettlementBatch, SettlementError> {
        self.transition(id, actor_id, "start_processing", |b| b.start_processing())
            .await
    }

    /// PROCESSING -> PAID. The only path by which commissions become paid.
    pub async fn mark_as_paid(&self, id: Uuid, actor_id: &str) -> Result<SettlementBatch, SettlementError> {
        let mut batch = self.load(id).await?;
        let previous = format!("{:?}", batch.status);
        batch.mark_paid()?;

        self.batches.commit_payment(&batch).await?;
        self.log(&batch, "mark_as_paid", Some(previous), actor_id, "Settlement batch paid out".to_string())
            .await?;

        info!(batch_id = %batch.id, total_minor = batch.total_minor, "Settlement batch paid");
        Ok(batch)
    }

    pub async fn mark_as_failed(
        &self,
        id: Uuid,
        reason: String,
        actor_id: &str,
    ) -> Result<SettlementBatch, SettlementError> {
        let mut batch = self.load(id).await?;
        let previous = format!("{:?}", batch.status);
        batch.mark_failed(reason.clone())?;
        self.batches.update(&batch).await?;
        self.log(&batch, "mark_as_failed", Some(previous), actor_id, format!("Payout failed: {}", reason))
            .await?;
        Ok(batch)
    }

    /// FAILED -> PROCESSING only, never a silent re-entry.
    pub async fn retry(&self, id: Uuid, actor_id: &str) -> Result<SettlementBatch, SettlementError> {
        self.transition(id, actor_id, "retry", |b| b.retry()).await
    }

    pub async fn get(&self, id: Uuid) -> Result<(SettlementBatch, Vec<SettlementLine>), SettlementError> {
        let batch = self.load(id).await?;
        let lines = self.batches.lines_for(id).await?;
        Ok((batch, lines))
    }

    pub async fn list(&self, page: u32, limit: u32) -> Result<(Vec<SettlementBatch>, u64), SettlementError> {
        Ok(self.batches.list(page, limit).await?)
    }

    pub async fn audit_trail(&self, id: Uuid) -> Result<Vec<AuditLogEntry>, SettlementError> {
        Ok(self.audit.for_entity("settlement_batch", &id.to_string()).await?)
    }

    async fn transition<F>(
        &self,
        id: Uuid,
        actor_id: &str,
        action: &str,
        apply: F,
    ) -> Result<SettlementBatch, SettlementError>
    where
        F: FnOnce(&mut SettlementBatch) -> Result<(), InvalidTransition>,
    {
        let mut batch = self.load(id).await?;
        let previous = format!("{:?}", batch.status);
        apply(&mut batch)?;
        self.batches.update(&batch).await?;
        self.log(&batch, action, Some(previous), actor_id, format!("Settlement batch {}", action))
            .await?;
        Ok(batch)
    }

    async fn load(&self, id: Uuid) -> Result<SettlementBatch, SettlementError> {
        self.batches.get(id).await?.ok_or(SettlementError::NotFound(id))
    }

    async fn log(
        &self,
        batch: &SettlementBatch,
        action: &str,
        previous_state: Option<String>,
        actor_id: &str,
        description: String,
    ) -> Result<(), SettlementError> {
        let entry = AuditLogEntry::transition(
            "settlement_batch",
            &batch.id.to_string(),
            action,
            previous_state,
            Some(format!("{:?}", batch.status)),
            actor_id,
            ActorType::Operator,
            description,
        );
        self.audit.append(&entry).await?;
        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn batch() -> SettlementBatch {
        SettlementBatch::new(
            Uuid::new_v4(),
            PayeeType::Partner,
            Utc::now() - chrono::Duration::days(30),
            Utc::now(),
        )
    }

    #[test]
    fn test_happy_path_lifecycle() {
        let mut b = batch();
        assert_eq!(b.status, SettlementStatus::Open);
        b.close().unwrap();
        b.start_processing().unwrap();
        b.mark_paid().unwrap();
        assert_eq!(b.status, SettlementStatus::Paid);
    }

    #[test]
    fn test_retry_only_from_failed() {
        let mut b = batch();
        assert!(b.retry().is_err());
        b.close().unwrap();
        assert!(b.retry().is_err());
        b.start_processing().unwrap();
        assert!(b.retry().is_err());
        b.mark_failed("gateway timeout".to_string()).unwrap();
        b.retry().unwrap();
        assert_eq!(b.status, SettlementStatus::Processing);
        assert!(b.failure_reason.is_none());
        b.mark_paid().unwrap();
        assert!(b.retry().is_err());
    }

    #[test]
    fn test_cannot_pay_without_processing() {
        let mut b = batch();
        assert!(b.mark_paid().is_err());
        b.close().unwrap();
        assert!(b.mark_paid().is_err());
    }

    #[test]
    fn test_failure_records_reason() {
        let mut b = batch();
        b.close().unwrap();
        b.start_processing().unwrap();
        b.mark_failed("gateway timeout".to_string()).unwrap();
        assert_eq!(b.failure_reason.as_deref(), Some("gateway timeout"));
    }
}
