use std::sync::{Arc, Mutex};

use affil_attribution::engine::AttributionEngine;
use affil_attribution::models::ConversionStatus;
use affil_commission::engine::{CommissionEngine, CommissionRules};
use affil_commission::models::CommissionStatus;
use affil_core::partner::{Partner, PartnerTier};
use affil_core::products::ProductCategory;
use affil_core::repository::PartnerRepository;
use affil_orchestrator::EventOrchestrator;
use affil_shared::models::events::{
    DeadLetterSink, OrderCancelledEvent, OrderConfirmedEvent, OrderCreatedEvent, OrderEvent,
    OrderRefundedEvent,
};
use affil_store::MemoryStore;
use async_trait::async_trait;
use chrono::{Duration, Utc};
use uuid::Uuid;

struct RecordingDeadLetters {
    pushed: Mutex<Vec<(OrderEvent, String)>>,
}

impl RecordingDeadLetters {
    fn new() -> Self {
        Self { pushed: Mutex::new(Vec::new()) }
    }

    fn count(&self) -> usize {
        self.pushed.lock().unwrap().len()
    }
}

#[async_trait]
impl DeadLetterSink for RecordingDeadLetters {
    async fn push(
        &self,
        event: &OrderEvent,
        error: &str,
    ) -> Result<(), Box<dyn std::error::Error + Send + Sync>> {
        self.pushed.lock().unwrap().push((event.clone(), error.to_string()));
        Ok(())
    }
}

struct Pipeline {
    store: Arc<MemoryStore>,
    orchestrator: EventOrchestrator,
    attribution: Arc<AttributionEngine>,
    commissions: Arc<CommissionEngine>,
    dead_letters: Arc<RecordingDeadLetters>,
}

fn rules() -> CommissionRules {
    CommissionRules {
        base_rate_bps: 300,
        hold_days: 7,
        bronze_bonus_bps: 0,
        silver_bonus_bps: 50,
        gold_bonus_bps: 100,
        platinum_bonus_bps: 200,
    }
}

fn pipeline() -> Pipeline {
    let store = Arc::new(MemoryStore::new());
    let attribution = Arc::new(AttributionEngine::new(
        store.clone(),
        store.clone(),
        store.clone(),
    ));
    let commissions = Arc::new(CommissionEngine::new(
        store.clone(),
        store.clone(),
        store.clone(),
        rules(),
    ));
    let dead_letters = Arc::new(RecordingDeadLetters::new());
    let orchestrator = EventOrchestrator::new(
        attribution.clone(),
        commissions.clone(),
        dead_letters.clone(),
    );
    Pipeline { store, orchestrator, attribution, commissions, dead_letters }
}

async fn seed_partner(store: &Arc<MemoryStore>, code: &str, tier: PartnerTier) -> Partner {
    let mut partner = Partner::new("Aki Media".to_string(), code.to_string(), tier);
    partner.approve().unwrap();
    PartnerRepository::insert(store.as_ref(), &partner).await.unwrap();
    partner
}

fn seed_product(store: &Arc<MemoryStore>, category: ProductCategory) -> Uuid {
    let product_id = Uuid::new_v4();
    store.add_product(product_id, category);
    product_id
}

fn created_event(order_id: &str, product_id: Uuid, code: &str, amount: i64) -> OrderEvent {
    OrderEvent::OrderCreated(OrderCreatedEvent {
        order_id: order_id.to_string(),
        product_id,
        order_amount_minor: amount,
        product_price_minor: amount,
        quantity: 1,
        currency: Some("JPY".to_string()),
        customer_id: Some("C-1".to_string()),
        is_new_customer: Some(true),
        referral_code: Some(code.to_string()),
        metadata: None,
        timestamp: Utc::now().timestamp(),
    })
}

fn confirmed_event(order_id: &str) -> OrderEvent {
    OrderEvent::OrderConfirmed(OrderConfirmedEvent {
        order_id: order_id.to_string(),
        timestamp: Utc::now().timestamp(),
    })
}

#[tokio::test]
async fn gold_tier_order_earns_bonus_commission_on_hold() {
    let p = pipeline();
    let partner = seed_partner(&p.store, "GOLD1", PartnerTier::Gold).await;
    let product_id = seed_product(&p.store, ProductCategory::Cosmetics);

    p.orchestrator.handle(created_event("O-1", product_id, "GOLD1", 10_000)).await;
    p.orchestrator.handle(confirmed_event("O-1")).await;

    let conversions = p.attribution.conversions_for_order("O-1").await.unwrap();
    assert_eq!(conversions.len(), 1);
    assert_eq!(conversions[0].status, ConversionStatus::Confirmed);

    // 3% base + 1% gold bonus on 10,000
    let commission = p
        .commissions
        .find_by_conversion(conversions[0].id)
        .await
        .unwrap()
        .unwrap();
    assert_eq!(commission.amount_minor, 400);
    assert_eq!(commission.status, CommissionStatus::Pending);
    assert!(commission.hold_until > Utc::now() + Duration::days(6));

    let partner = PartnerRepository::get(p.store.as_ref(), partner.id)
        .await
        .unwrap()
        .unwrap();
    assert_eq!(partner.pending_minor, 400);
    assert_eq!(partner.available_minor, 0);
    assert_eq!(partner.total_orders, 1);
    assert_eq!(p.dead_letters.count(), 0);
}

#[tokio::test]
async fn redelivered_confirmation_creates_no_duplicate_commission() {
    let p = pipeline();
    let partner = seed_partner(&p.store, "GOLD1", PartnerTier::Gold).await;
    let product_id = seed_product(&p.store, ProductCategory::Cosmetics);

    p.orchestrator.handle(created_event("O-1", product_id, "GOLD1", 10_000)).await;
    p.orchestrator.handle(confirmed_event("O-1")).await;
    p.orchestrator.handle(confirmed_event("O-1")).await;

    let partner = PartnerRepository::get(p.store.as_ref(), partner.id)
        .await
        .unwrap()
        .unwrap();
    assert_eq!(partner.pending_minor, 400);
    assert_eq!(partner.total_orders, 1);
}

#[tokio::test]
async fn full_refund_reverses_conversion_and_commission() {
    let p = pipeline();
    let partner = seed_partner(&p.store, "GOLD1", PartnerTier::Gold).await;
    let product_id = seed_product(&p.store, ProductCategory::Cosmetics);

    p.orchestrator.handle(created_event("O-1", product_id, "GOLD1", 10_000)).await;
    p.orchestrator.handle(confirmed_event("O-1")).await;
    p.orchestrator
        .handle(OrderEvent::OrderRefunded(OrderRefundedEvent {
            order_id: "O-1".to_string(),
            refund_amount_minor: 10_000,
            refund_quantity: Some(1),
            is_partial_refund: false,
            timestamp: Utc::now().timestamp(),
        }))
        .await;

    let conversions = p.attribution.conversions_for_order("O-1").await.unwrap();
    assert_eq!(conversions[0].status, ConversionStatus::Refunded);

    let commission = p
        .commissions
        .find_by_conversion(conversions[0].id)
        .await
        .unwrap()
        .unwrap();
    assert_eq!(commission.status, CommissionStatus::Cancelled);

    let partner = PartnerRepository::get(p.store.as_ref(), partner.id)
        .await
        .unwrap()
        .unwrap();
    assert_eq!(partner.pending_minor, 0);
    assert_eq!(partner.available_minor, 0);
}

#[tokio::test]
async fn partial_refund_prorates_commission() {
    let p = pipeline();
    let partner = seed_partner(&p.store, "GOLD1", PartnerTier::Gold).await;
    let product_id = seed_product(&p.store, ProductCategory::Cosmetics);

    p.orchestrator.handle(created_event("O-1", product_id, "GOLD1", 10_000)).await;
    p.orchestrator.handle(confirmed_event("O-1")).await;
    p.orchestrator
        .handle(OrderEvent::OrderRefunded(OrderRefundedEvent {
            order_id: "O-1".to_string(),
            refund_amount_minor: 4_000,
            refund_quantity: None,
            is_partial_refund: true,
            timestamp: Utc::now().timestamp(),
        }))
        .await;

    let conversions = p.attribution.conversions_for_order("O-1").await.unwrap();
    assert_eq!(conversions[0].status, ConversionStatus::PartiallyRefunded);
    assert_eq!(conversions[0].refunded_minor, 4_000);

    // 400 * (10,000 - 4,000) / 10,000
    let commission = p
        .commissions
        .find_by_conversion(conversions[0].id)
        .await
        .unwrap()
        .unwrap();
    assert_eq!(commission.amount_minor, 240);
    assert_eq!(commission.status, CommissionStatus::Pending);

    let adjustments = p.store.adjustments_for(commission.id);
    assert_eq!(adjustments.len(), 1);
    assert_eq!(adjustments[0].previous_amount_minor, 400);
    assert_eq!(adjustments[0].new_amount_minor, 240);

    let partner = PartnerRepository::get(p.store.as_ref(), partner.id)
        .await
        .unwrap()
        .unwrap();
    assert_eq!(partner.pending_minor, 240);
}

#[tokio::test]
async fn redelivered_partial_refund_applies_once() {
    let p = pipeline();
    let partner = seed_partner(&p.store, "GOLD1", PartnerTier::Gold).await;
    let product_id = seed_product(&p.store, ProductCategory::Cosmetics);

    p.orchestrator.handle(created_event("O-1", product_id, "GOLD1", 10_000)).await;
    p.orchestrator.handle(confirmed_event("O-1")).await;

    let refund = OrderEvent::OrderRefunded(OrderRefundedEvent {
        order_id: "O-1".to_string(),
        refund_amount_minor: 4_000,
        refund_quantity: None,
        is_partial_refund: true,
        timestamp: Utc::now().timestamp(),
    });
    p.orchestrator.handle(refund.clone()).await;
    p.orchestrator.handle(refund).await;

    let conversions = p.attribution.conversions_for_order("O-1").await.unwrap();
    assert_eq!(conversions[0].refunded_minor, 4_000);

    let commission = p
        .commissions
        .find_by_conversion(conversions[0].id)
        .await
        .unwrap()
        .unwrap();
    assert_eq!(commission.amount_minor, 240);
    assert_eq!(p.store.adjustments_for(commission.id).len(), 1);

    let partner = PartnerRepository::get(p.store.as_ref(), partner.id)
        .await
        .unwrap()
        .unwrap();
    assert_eq!(partner.pending_minor, 240);
    assert_eq!(p.dead_letters.count(), 0);
}

#[tokio::test]
async fn second_partial_refund_prorates_from_the_new_total() {
    let p = pipeline();
    let partner = seed_partner(&p.store, "GOLD1", PartnerTier::Gold).await;
    let product_id = seed_product(&p.store, ProductCategory::Cosmetics);

    p.orchestrator.handle(created_event("O-1", product_id, "GOLD1", 10_000)).await;
    p.orchestrator.handle(confirmed_event("O-1")).await;

    // The order system reports the running total, so a second refund of
    // 2,000 arrives as a total of 6,000
    for total in [4_000, 6_000] {
        p.orchestrator
            .handle(OrderEvent::OrderRefunded(OrderRefundedEvent {
                order_id: "O-1".to_string(),
                refund_amount_minor: total,
                refund_quantity: None,
                is_partial_refund: true,
                timestamp: Utc::now().timestamp(),
            }))
            .await;
    }

    let conversions = p.attribution.conversions_for_order("O-1").await.unwrap();
    assert_eq!(conversions[0].refunded_minor, 6_000);

    // 400 * (10,000 - 6,000) / 10,000
    let commission = p
        .commissions
        .find_by_conversion(conversions[0].id)
        .await
        .unwrap()
        .unwrap();
    assert_eq!(commission.amount_minor, 160);
    assert_eq!(p.store.adjustments_for(commission.id).len(), 2);

    let partner = PartnerRepository::get(p.store.as_ref(), partner.id)
        .await
        .unwrap()
        .unwrap();
    assert_eq!(partner.pending_minor, 160);
}

#[tokio::test]
async fn auto_confirm_releases_each_commission_exactly_once() {
    let p = pipeline();
    let partner = seed_partner(&p.store, "GOLD1", PartnerTier::Gold).await;
    let product_id = seed_product(&p.store, ProductCategory::Cosmetics);

    p.orchestrator.handle(created_event("O-1", product_id, "GOLD1", 10_000)).await;
    p.orchestrator.handle(confirmed_event("O-1")).await;

    let after_hold = Utc::now() + Duration::days(8);
    let first = p.commissions.auto_confirm_commissions(after_hold).await.unwrap();
    assert_eq!(first, 1);
    let second = p.commissions.auto_confirm_commissions(after_hold).await.unwrap();
    assert_eq!(second, 0);

    let partner = PartnerRepository::get(p.store.as_ref(), partner.id)
        .await
        .unwrap()
        .unwrap();
    assert_eq!(partner.pending_minor, 0);
    assert_eq!(partner.available_minor, 400);
}

#[tokio::test]
async fn pharmaceutical_orders_never_convert() {
    let p = pipeline();
    seed_partner(&p.store, "GOLD1", PartnerTier::Gold).await;
    let product_id = seed_product(&p.store, ProductCategory::Pharmaceutical);

    p.orchestrator.handle(created_event("O-1", product_id, "GOLD1", 10_000)).await;

    let conversions = p.attribution.conversions_for_order("O-1").await.unwrap();
    assert!(conversions.is_empty());
    // Ineligible products are a terminal rejection, not a redeliverable failure
    assert_eq!(p.dead_letters.count(), 0);
}

#[tokio::test]
async fn cancellation_before_payout_reverses_everything() {
    let p = pipeline();
    let partner = seed_partner(&p.store, "GOLD1", PartnerTier::Gold).await;
    let product_id = seed_product(&p.store, ProductCategory::Health);

    p.orchestrator.handle(created_event("O-1", product_id, "GOLD1", 10_000)).await;
    p.orchestrator.handle(confirmed_event("O-1")).await;

    // Hold has already expired, so the money sits in available
    let after_hold = Utc::now() + Duration::days(8);
    p.commissions.auto_confirm_commissions(after_hold).await.unwrap();

    p.orchestrator
        .handle(OrderEvent::OrderCancelled(OrderCancelledEvent {
            order_id: "O-1".to_string(),
            reason: Some("customer dispute".to_string()),
            timestamp: Utc::now().timestamp(),
        }))
        .await;

    let conversions = p.attribution.conversions_for_order("O-1").await.unwrap();
    assert_eq!(conversions[0].status, ConversionStatus::Cancelled);

    let commission = p
        .commissions
        .find_by_conversion(conversions[0].id)
        .await
        .unwrap()
        .unwrap();
    assert_eq!(commission.status, CommissionStatus::Cancelled);
    assert_eq!(commission.cancellation_reason.as_deref(), Some("customer dispute"));

    let partner = PartnerRepository::get(p.store.as_ref(), partner.id)
        .await
        .unwrap()
        .unwrap();
    assert_eq!(partner.pending_minor, 0);
    assert_eq!(partner.available_minor, 0);
    assert_eq!(partner.paid_out_minor, 0);
}

#[tokio::test]
async fn order_without_referral_code_is_ignored() {
    let p = pipeline();
    seed_partner(&p.store, "GOLD1", PartnerTier::Gold).await;
    let product_id = seed_product(&p.store, ProductCategory::Cosmetics);

    p.orchestrator
        .handle(OrderEvent::OrderCreated(OrderCreatedEvent {
            order_id: "O-1".to_string(),
            product_id,
            order_amount_minor: 10_000,
            product_price_minor: 10_000,
            quantity: 1,
            currency: None,
            customer_id: None,
            is_new_customer: None,
            referral_code: None,
            metadata: None,
            timestamp: Utc::now().timestamp(),
        }))
        .await;

    let conversions = p.attribution.conversions_for_order("O-1").await.unwrap();
    assert!(conversions.is_empty());
    assert_eq!(p.dead_letters.count(), 0);
}
