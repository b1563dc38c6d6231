//! HashMap-backed implementations of every repository trait, behind one
//! shared lock. Used by tests and local runs without Postgres.

use std::collections::HashMap;
use std::sync::Mutex;

use affil_attribution::models::{Conversion, ConversionRepository};
use affil_commission::models::{
    Commission, CommissionAdjustment, CommissionFilter, CommissionPage, CommissionRepository,
    CommissionStatus,
};
use affil_core::audit::AuditLogEntry;
use affil_core::partner::{Partner, PartnerStatus};
use affil_core::products::ProductCategory;
use affil_core::repository::{AuditLogRepository, PartnerRepository, ProductDirectory};
use affil_settlement::batch::{
    SettlementBatch, SettlementLine, SettlementRepository, SettlementStatus,
};
use affil_settlement::relay::{OrderRelay, RelayRepository};
use affil_tracking::models::{ClickRecord, ClickRepository};
use async_trait::async_trait;
use chrono::{DateTime, Utc};
use uuid::Uuid;

#[derive(Default)]
struct Inner {
    partners: HashMap<Uuid, Partner>,
    clicks: HashMap<Uuid, ClickRecord>,
    conversions: HashMap<Uuid, Conversion>,
    commissions: HashMap<Uuid, Commission>,
    adjustments: Vec<CommissionAdjustment>,
    batches: HashMap<Uuid, SettlementBatch>,
    lines: HashMap<Uuid, Vec<SettlementLine>>,
    relays: HashMap<Uuid, OrderRelay>,
    audit: Vec<AuditLogEntry>,
    products: HashMap<Uuid, ProductCategory>,
}

#[derive(Default)]
pub struct MemoryStore {
    inner: Mutex<Inner>,
}

impl MemoryStore {
    pub fn new() -> Self {
        Self::default()
    }

    /// Seeds a catalog entry for the read-only directory.
    pub fn add_product(&self, product_id: Uuid, category: ProductCategory) {
        self.inner.lock().unwrap().products.insert(product_id, category);
    }

    pub fn adjustments_for(&self, commission_id: Uuid) -> Vec<CommissionAdjustment> {
        self.inner
            .lock()
            .unwrap()
            .adjustments
            .iter()
            .filter(|a| a.commission_id == commission_id)
            .cloned()
            .collect()
    }

    pub fn click_count(&self) -> usize {
        self.inner.lock().unwrap().clicks.len()
    }
}

#[async_trait]
impl PartnerRepository for MemoryStore {
    async fn insert(&self, partner: &Partner) -> Result<(), Box<dyn std::error::Error + Send + Sync>> {
        let mut inner = self.inner.lock().unwrap();
        if inner
            .partners
            .values()
            .any(|p| p.referral_code == partner.referral_code)
        {
            return Err(format!("Referral code already registered: {}", partner.referral_code).into());
        }
        inner.partners.insert(partner.id, partner.clone());
        Ok(())
    }

    async fn get(&self, id: Uuid) -> Result<Option<Partner>, Box<dyn std::error::Error + Send + Sync>> {
        Ok(self.inner.lock().unwrap().partners.get(&id).cloned())
    }

    async fn find_by_referral_code(
        &self,
        referral_code: &str,
    ) -> Result<Option<Partner>, Box<dyn std::error::Error + Send + Sync>> {
        Ok(self
            .inner
            .lock()
            .unwrap()
            .partners
            .values()
            .find(|p| p.referral_code == referral_code)
            .cloned())
    }

    async fn update_status(
        &self,
        id: Uuid,
        status: PartnerStatus,
    ) -> Result<(), Box<dyn std::error::Error + Send + Sync>> {
        let mut inner = self.inner.lock().unwrap();
        let partner = inner
            .partners
            .get_mut(&id)
            .ok_or_else(|| format!("Partner not found: {}", id))?;
        partner.status = status;
        partner.updated_at = Utc::now();
        Ok(())
    }

    async fn apply_balance_delta(
        &self,
        id: Uuid,
        pending_delta: i64,
        available_delta: i64,
        paid_out_delta: i64,
    ) -> Result<(), Box<dyn std::error::Error + Send + Sync>> {
        let mut inner = self.inner.lock().unwrap();
        let partner = inner
            .partners
            .get_mut(&id)
            .ok_or_else(|| format!("Partner not found: {}", id))?;
        partner.pending_minor += pending_delta;
        partner.available_minor += available_delta;
        partner.paid_out_minor += paid_out_delta;
        partner.updated_at = Utc::now();
        Ok(())
    }

    async fn increment_clicks(&self, id: Uuid) -> Result<(), Box<dyn std::error::Error + Send + Sync>> {
        let mut inner = self.inner.lock().unwrap();
        let partner = inner
            .partners
            .get_mut(&id)
            .ok_or_else(|| format!("Partner not found: {}", id))?;
        partner.record_click();
        Ok(())
    }
}

#[async_trait]
impl ClickRepository for MemoryStore {
    async fn insert(&self, click: &ClickRecord) -> Result<(), Box<dyn std::error::Error + Send + Sync>> {
        self.inner.lock().unwrap().clicks.insert(click.id, click.clone());
        Ok(())
    }

    async fn get(&self, id: Uuid) -> Result<Option<ClickRecord>, Box<dyn std::error::Error + Send + Sync>> {
        Ok(self.inner.lock().unwrap().clicks.get(&id).cloned())
    }

    async fn anonymize_older_than(
        &self,
        cutoff: DateTime<Utc>,
    ) -> Result<u64, Box<dyn std::error::Error + Send + Sync>> {
        let mut count = 0;
        for click in self.inner.lock().unwrap().clicks.values_mut() {
            if click.recorded_at < cutoff && click.anonymize() {
                count += 1;
            }
        }
        Ok(count)
    }
}

#[async_trait]
impl ConversionRepository for MemoryStore {
    async fn insert(&self, conversion: &Conversion) -> Result<(), Box<dyn std::error::Error + Send + Sync>> {
        let mut inner = self.inner.lock().unwrap();
        // Same semantics as the unique (order_id, referral_code) index: the
        // first writer wins, a duplicate insert is silently dropped
        let exists = inner.conversions.values().any(|c| {
            c.order_id == conversion.order_id && c.referral_code == conversion.referral_code
        });
        if !exists {
            inner.conversions.insert(conversion.id, conversion.clone());
        }
        Ok(())
    }

    async fn get(&self, id: Uuid) -> Result<Option<Conversion>, Box<dyn std::error::Error + Send + Sync>> {
        Ok(self.inner.lock().unwrap().conversions.get(&id).cloned())
    }

    async fn find_by_order_and_code(
        &self,
        order_id: &str,
        referral_code: &str,
    ) -> Result<Option<Conversion>, Box<dyn std::error::Error + Send + Sync>> {
        Ok(self
            .inner
            .lock()
            .unwrap()
            .conversions
            .values()
            .find(|c| c.order_id == order_id && c.referral_code == referral_code)
            .cloned())
    }

    async fn find_by_order(
        &self,
        order_id: &str,
    ) -> Result<Vec<Conversion>, Box<dyn std::error::Error + Send + Sync>> {
        let mut conversions: Vec<Conversion> = self
            .inner
            .lock()
            .unwrap()
            .conversions
            .values()
            .filter(|c| c.order_id == order_id)
            .cloned()
            .collect();
        conversions.sort_by_key(|c| c.created_at);
        Ok(conversions)
    }

    async fn update(&self, conversion: &Conversion) -> Result<(), Box<dyn std::error::Error + Send + Sync>> {
        self.inner
            .lock()
            .unwrap()
            .conversions
            .insert(conversion.id, conversion.clone());
        Ok(())
    }
}

#[async_trait]
impl CommissionRepository for MemoryStore {
    async fn insert_and_credit(&self, commission: &Commission) -> Result<bool, Box<dyn std::error::Error + Send + Sync>> {
        let mut inner = self.inner.lock().unwrap();
        let exists = inner
            .commissions
            .values()
            .any(|c| c.conversion_id == commission.conversion_id);
        if exists {
            return Ok(false);
        }

        // Resolve the partner before writing anything so a failure leaves
        // no commission row without its matching credit
        let partner = inner
            .partners
            .get_mut(&commission.partner_id)
            .ok_or_else(|| format!("Partner not found: {}", commission.partner_id))?;
        partner.pending_minor += commission.amount_minor;
        partner.record_order();

        inner.commissions.insert(commission.id, commission.clone());
        Ok(true)
    }

    async fn get(&self, id: Uuid) -> Result<Option<Commission>, Box<dyn std::error::Error + Send + Sync>> {
        Ok(self.inner.lock().unwrap().commissions.get(&id).cloned())
    }

    async fn find_by_conversion(
        &self,
        conversion_id: Uuid,
    ) -> Result<Option<Commission>, Box<dyn std::error::Error + Send + Sync>> {
        Ok(self
            .inner
            .lock()
            .unwrap()
            .commissions
            .values()
            .find(|c| c.conversion_id == conversion_id)
            .cloned())
    }

    async fn update(&self, commission: &Commission) -> Result<(), Box<dyn std::error::Error + Send + Sync>> {
        self.inner
            .lock()
            .unwrap()
            .commissions
            .insert(commission.id, commission.clone());
        Ok(())
    }

    async fn insert_adjustment(
        &self,
        adjustment: &CommissionAdjustment,
    ) -> Result<(), Box<dyn std::error::Error + Send + Sync>> {
        self.inner.lock().unwrap().adjustments.push(adjustment.clone());
        Ok(())
    }

    async fn list(
        &self,
        filter: &CommissionFilter,
    ) -> Result<CommissionPage, Box<dyn std::error::Error + Send + Sync>> {
        let inner = self.inner.lock().unwrap();
        let mut matching: Vec<Commission> = inner
            .commissions
            .values()
            .filter(|c| filter.partner_id.map_or(true, |p| c.partner_id == p))
            .filter(|c| filter.status.map_or(true, |s| c.status == s))
            .filter(|c| filter.created_from.map_or(true, |from| c.created_at >= from))
            .filter(|c| filter.created_to.map_or(true, |to| c.created_at < to))
            .cloned()
            .collect();
        matching.sort_by(|a, b| b.created_at.cmp(&a.created_at));

        let total = matching.len() as u64;
        let commissions = if filter.limit > 0 {
            let offset = filter.page.saturating_sub(1) as usize * filter.limit as usize;
            matching
                .into_iter()
                .skip(offset)
                .take(filter.limit as usize)
                .collect()
        } else {
            matching
        };

        Ok(CommissionPage { commissions, total })
    }

    async fn due_for_confirmation(
        &self,
        now: DateTime<Utc>,
    ) -> Result<Vec<Commission>, Box<dyn std::error::Error + Send + Sync>> {
        Ok(self
            .inner
            .lock()
            .unwrap()
            .commissions
            .values()
            .filter(|c| c.status == CommissionStatus::Pending && c.hold_until <= now)
            .cloned()
            .collect())
    }

    async fn confirm_and_release(
        &self,
        commission_id: Uuid,
        partner_id: Uuid,
        amount_minor: i64,
    ) -> Result<bool, Box<dyn std::error::Error + Send + Sync>> {
        let mut inner = self.inner.lock().unwrap();

        let commission = inner
            .commissions
            .get_mut(&commission_id)
            .ok_or_else(|| format!("Commission not found: {}", commission_id))?;
        if commission.status != CommissionStatus::Pending {
            return Ok(false);
        }
        commission.confirm()?;

        let partner = inner
            .partners
            .get_mut(&partner_id)
            .ok_or_else(|| format!("Partner not found: {}", partner_id))?;
        partner.pending_minor -= amount_minor;
        partner.available_minor += amount_minor;
        partner.updated_at = Utc::now();

        Ok(true)
    }
}

#[async_trait]
impl SettlementRepository for MemoryStore {
    async fn insert(&self, batch: &SettlementBatch) -> Result<(), Box<dyn std::error::Error + Send + Sync>> {
        self.inner.lock().unwrap().batches.insert(batch.id, batch.clone());
        Ok(())
    }

    async fn get(&self, id: Uuid) -> Result<Option<SettlementBatch>, Box<dyn std::error::Error + Send + Sync>> {
        Ok(self.inner.lock().unwrap().batches.get(&id).cloned())
    }

    async fn lines_for(&self, batch_id: Uuid) -> Result<Vec<SettlementLine>, Box<dyn std::error::Error + Send + Sync>> {
        Ok(self
            .inner
            .lock()
            .unwrap()
            .lines
            .get(&batch_id)
            .cloned()
            .unwrap_or_default())
    }

    async fn list(
        &self,
        page: u32,
        limit: u32,
    ) -> Result<(Vec<SettlementBatch>, u64), Box<dyn std::error::Error + Send + Sync>> {
        let inner = self.inner.lock().unwrap();
        let mut batches: Vec<SettlementBatch> = inner.batches.values().cloned().collect();
        batches.sort_by(|a, b| b.created_at.cmp(&a.created_at));
        let total = batches.len() as u64;
        let offset = page.saturating_sub(1) as usize * limit as usize;
        let page_items = batches.into_iter().skip(offset).take(limit as usize).collect();
        Ok((page_items, total))
    }

    async fn update(&self, batch: &SettlementBatch) -> Result<(), Box<dyn std::error::Error + Send + Sync>> {
        self.inner.lock().unwrap().batches.insert(batch.id, batch.clone());
        Ok(())
    }

    async fn replace_lines(
        &self,
        batch_id: Uuid,
        lines: &[SettlementLine],
        total_minor: i64,
    ) -> Result<(), Box<dyn std::error::Error + Send + Sync>> {
        let mut inner = self.inner.lock().unwrap();
        inner.lines.insert(batch_id, lines.to_vec());
        if let Some(batch) = inner.batches.get_mut(&batch_id) {
            batch.total_minor = total_minor;
            batch.updated_at = Utc::now();
        }
        Ok(())
    }

    async fn commit_payment(&self, batch: &SettlementBatch) -> Result<(), Box<dyn std::error::Error + Send + Sync>> {
        let mut inner = self.inner.lock().unwrap();
        let lines = inner.lines.get(&batch.id).cloned().unwrap_or_default();

        // All-or-nothing: verify every covered commission first
        for line in &lines {
            let commission = inner
                .commissions
                .get(&line.commission_id)
                .ok_or_else(|| format!("Commission not found: {}", line.commission_id))?;
            if commission.status != CommissionStatus::Confirmed {
                return Err(format!(
                    "Settlement batch {} covers non-payable commission {} in state {:?}",
                    batch.id, commission.id, commission.status
                )
                .into());
            }
        }

        for line in &lines {
            let (partner_id, amount) = {
                let commission = inner
                    .commissions
                    .get_mut(&line.commission_id)
                    .ok_or_else(|| format!("Commission not found: {}", line.commission_id))?;
                commission.mark_paid()?;
                (commission.partner_id, commission.amount_minor)
            };
            let partner = inner
                .partners
                .get_mut(&partner_id)
                .ok_or_else(|| format!("Partner not found: {}", partner_id))?;
            partner.available_minor -= amount;
            partner.paid_out_minor += amount;
            partner.updated_at = Utc::now();
        }

        inner.batches.insert(batch.id, batch.clone());
        Ok(())
    }
}

#[async_trait]
impl RelayRepository for MemoryStore {
    async fn insert_idempotent(&self, relay: &OrderRelay) -> Result<OrderRelay, Box<dyn std::error::Error + Send + Sync>> {
        let mut inner = self.inner.lock().unwrap();
        if let Some(existing) = inner
            .relays
            .values()
            .find(|r| r.idempotency_key == relay.idempotency_key)
        {
            return Ok(existing.clone());
        }
        inner.relays.insert(relay.id, relay.clone());
        Ok(relay.clone())
    }

    async fn get(&self, id: Uuid) -> Result<Option<OrderRelay>, Box<dyn std::error::Error + Send + Sync>> {
        Ok(self.inner.lock().unwrap().relays.get(&id).cloned())
    }

    async fn list(
        &self,
        page: u32,
        limit: u32,
    ) -> Result<(Vec<OrderRelay>, u64), Box<dyn std::error::Error + Send + Sync>> {
        let inner = self.inner.lock().unwrap();
        let mut relays: Vec<OrderRelay> = inner.relays.values().cloned().collect();
        relays.sort_by(|a, b| b.created_at.cmp(&a.created_at));
        let total = relays.len() as u64;
        let offset = page.saturating_sub(1) as usize * limit as usize;
        let page_items = relays.into_iter().skip(offset).take(limit as usize).collect();
        Ok((page_items, total))
    }

    async fn update(&self, relay: &OrderRelay) -> Result<(), Box<dyn std::error::Error + Send + Sync>> {
        self.inner.lock().unwrap().relays.insert(relay.id, relay.clone());
        Ok(())
    }
}

#[async_trait]
impl AuditLogRepository for MemoryStore {
    async fn append(&self, entry: &AuditLogEntry) -> Result<(), Box<dyn std::error::Error + Send + Sync>> {
        self.inner.lock().unwrap().audit.push(entry.clone());
        Ok(())
    }

    async fn for_entity(
        &self,
        entity_type: &str,
        entity_id: &str,
    ) -> Result<Vec<AuditLogEntry>, Box<dyn std::error::Error + Send + Sync>> {
        Ok(self
            .inner
            .lock()
            .unwrap()
            .audit
            .iter()
            .filter(|e| e.entity_type == entity_type && e.entity_id == entity_id)
            .cloned()
            .collect())
    }
}

#[async_trait]
impl ProductDirectory for MemoryStore {
    async fn category_of(
        &self,
        product_id: Uuid,
    ) -> Result<Option<ProductCategory>, Box<dyn std::error::Error + Send + Sync>> {
        Ok(self.inner.lock().unwrap().products.get(&product_id).copied())
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use affil_core::partner::PartnerTier;
    use chrono::Duration;

    async fn seeded_partner(store: &MemoryStore) -> Partner {
        let mut partner =
            Partner::new("Aki Media".to_string(), "GOLD1".to_string(), PartnerTier::Gold);
        partner.approve().unwrap();
        PartnerRepository::insert(store, &partner).await.unwrap();
        partner
    }

    fn commission_for(partner_id: Uuid, amount_minor: i64) -> Commission {
        let now = Utc::now();
        Commission {
            id: Uuid::new_v4(),
            conversion_id: Uuid::new_v4(),
            partner_id,
            amount_minor,
            original_amount_minor: amount_minor,
            rate_bps: 300,
            bonus_bps: 100,
            status: CommissionStatus::Pending,
            hold_until: now + Duration::days(7),
            cancellation_reason: None,
            created_at: now,
            updated_at: now,
        }
    }

    #[tokio::test]
    async fn insert_and_credit_moves_the_money_with_the_row() {
        let store = MemoryStore::new();
        let partner = seeded_partner(&store).await;

        let commission = commission_for(partner.id, 400);
        assert!(store.insert_and_credit(&commission).await.unwrap());

        let partner = PartnerRepository::get(&store, partner.id).await.unwrap().unwrap();
        assert_eq!(partner.pending_minor, 400);
        assert_eq!(partner.total_orders, 1);
    }

    #[tokio::test]
    async fn duplicate_conversion_neither_inserts_nor_credits() {
        let store = MemoryStore::new();
        let partner = seeded_partner(&store).await;

        let commission = commission_for(partner.id, 400);
        assert!(store.insert_and_credit(&commission).await.unwrap());

        let mut duplicate = commission_for(partner.id, 400);
        duplicate.conversion_id = commission.conversion_id;
        assert!(!store.insert_and_credit(&duplicate).await.unwrap());
        assert!(CommissionRepository::get(&store, duplicate.id).await.unwrap().is_none());

        let partner = PartnerRepository::get(&store, partner.id).await.unwrap().unwrap();
        assert_eq!(partner.pending_minor, 400);
        assert_eq!(partner.total_orders, 1);
    }

    #[tokio::test]
    async fn failed_credit_leaves_no_orphaned_commission() {
        let store = MemoryStore::new();
        let commission = commission_for(Uuid::new_v4(), 400);

        assert!(store.insert_and_credit(&commission).await.is_err());
        assert!(CommissionRepository::get(&store, commission.id).await.unwrap().is_none());
    }
}
