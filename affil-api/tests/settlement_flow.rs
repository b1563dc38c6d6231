use std::sync::Arc;

use affil_api::{app, AppState};
use affil_attribution::engine::{AttributionEngine, CreateConversionRequest};
use affil_commission::engine::{CommissionEngine, CommissionRules};
use affil_commission::models::{CommissionRepository, CommissionStatus};
use affil_core::partner::{Partner, PartnerTier};
use affil_core::products::ProductCategory;
use affil_core::repository::PartnerRepository;
use affil_settlement::batch::{PayeeType, SettlementEngine, SettlementStatus};
use affil_settlement::relay::RelayService;
use affil_store::{MemoryStore, RedisClient};
use affil_tracking::service::TrackingService;
use axum::body::Body;
use axum::http::{Request, StatusCode};
use chrono::{Duration, Utc};
use tower::ServiceExt;
use uuid::Uuid;

struct Harness {
    store: Arc<MemoryStore>,
    state: AppState,
    attribution: Arc<AttributionEngine>,
    commissions: Arc<CommissionEngine>,
    settlements: Arc<SettlementEngine>,
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

async fn harness() -> Harness {
    let store = Arc::new(MemoryStore::new());
    let tracking = Arc::new(TrackingService::new(store.clone(), store.clone()));
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
    let settlements = Arc::new(SettlementEngine::new(
        store.clone(),
        store.clone(),
        store.clone(),
    ));
    let relays = Arc::new(RelayService::new(store.clone(), store.clone()));

    // Client construction does not connect; the rate limiter fails open
    let redis = Arc::new(RedisClient::new("redis://127.0.0.1:1").await.unwrap());

    let state = AppState {
        tracking,
        attribution: attribution.clone(),
        commissions: commissions.clone(),
        settlements: settlements.clone(),
        relays,
        redis,
        click_rate_limit_per_minute: 100,
    };

    Harness { store, state, attribution, commissions, settlements }
}

async fn seed_partner(store: &Arc<MemoryStore>, code: &str) -> Partner {
    let mut partner = Partner::new("Aki Media".to_string(), code.to_string(), PartnerTier::Gold);
    partner.approve().unwrap();
    PartnerRepository::insert(store.as_ref(), &partner).await.unwrap();
    partner
}

/// Runs an order through attribution and commission and releases the hold,
/// leaving one confirmed commission for the partner.
async fn confirmed_commission(h: &Harness, partner: &Partner, order_id: &str, amount: i64) -> Uuid {
    let product_id = Uuid::new_v4();
    h.store.add_product(product_id, ProductCategory::Cosmetics);

    let conversion = h
        .attribution
        .create_conversion(CreateConversionRequest {
            order_id: order_id.to_string(),
            product_id,
            referral_code: partner.referral_code.clone(),
            order_amount_minor: amount,
            product_price_minor: amount,
            quantity: 1,
            currency: Some("JPY".to_string()),
            customer_id: None,
            is_new_customer: false,
        })
        .await
        .unwrap();
    h.attribution.confirm_conversion(conversion.id).await.unwrap();
    let commission = h.commissions.create_commission(conversion.id).await.unwrap();

    let released = h
        .commissions
        .auto_confirm_commissions(Utc::now() + Duration::days(8))
        .await
        .unwrap();
    assert!(released >= 1);
    commission.id
}

async fn body_json(response: axum::response::Response) -> serde_json::Value {
    let bytes = axum::body::to_bytes(response.into_body(), usize::MAX).await.unwrap();
    serde_json::from_slice(&bytes).unwrap()
}

#[tokio::test]
async fn settlement_lifecycle_with_failed_payout_and_retry() {
    let h = harness().await;
    let partner = seed_partner(&h.store, "GOLD1").await;
    let commission_id = confirmed_commission(&h, &partner, "O-1", 10_000).await;

    let batch = h
        .settlements
        .create(
            partner.id,
            PayeeType::Partner,
            Utc::now() - Duration::days(30),
            Utc::now() + Duration::days(1),
            "ops-1",
        )
        .await
        .unwrap();

    let batch = h.settlements.calculate(batch.id, "ops-1").await.unwrap();
    assert_eq!(batch.total_minor, 400);

    h.settlements.confirm(batch.id, "ops-1").await.unwrap();
    h.settlements.start_processing(batch.id, "ops-1").await.unwrap();
    let failed = h
        .settlements
        .mark_as_failed(batch.id, "gateway timeout".to_string(), "ops-1")
        .await
        .unwrap();
    assert_eq!(failed.status, SettlementStatus::Failed);
    assert_eq!(failed.failure_reason.as_deref(), Some("gateway timeout"));

    // Commissions stay untouched until the batch actually pays
    let commission = CommissionRepository::get(h.store.as_ref(), commission_id)
        .await
        .unwrap()
        .unwrap();
    assert_eq!(commission.status, CommissionStatus::Confirmed);

    let retried = h.settlements.retry(batch.id, "ops-1").await.unwrap();
    assert!(retried.failure_reason.is_none());
    let paid = h.settlements.mark_as_paid(batch.id, "ops-1").await.unwrap();
    assert_eq!(paid.status, SettlementStatus::Paid);

    let commission = CommissionRepository::get(h.store.as_ref(), commission_id)
        .await
        .unwrap()
        .unwrap();
    assert_eq!(commission.status, CommissionStatus::Paid);

    let partner = PartnerRepository::get(h.store.as_ref(), partner.id)
        .await
        .unwrap()
        .unwrap();
    assert_eq!(partner.available_minor, 0);
    assert_eq!(partner.paid_out_minor, 400);

    // Every operator action leaves an audit row
    let trail = h.settlements.audit_trail(batch.id).await.unwrap();
    let actions: Vec<&str> = trail.iter().map(|e| e.action.as_str()).collect();
    assert_eq!(
        actions,
        vec!["create", "calculate", "confirm", "start_processing", "mark_as_failed", "retry", "mark_as_paid"]
    );
}

#[tokio::test]
async fn settlement_routes_create_and_fetch() {
    let h = harness().await;
    let payee_id = Uuid::new_v4();

    let request = Request::builder()
        .method("POST")
        .uri("/v1/settlements")
        .header("content-type", "application/json")
        .body(Body::from(
            serde_json::json!({
                "payee_id": payee_id,
                "payee_type": "partner",
                "period_start": Utc::now() - Duration::days(30),
                "period_end": Utc::now(),
            })
            .to_string(),
        ))
        .unwrap();
    let response = app(h.state.clone()).oneshot(request).await.unwrap();
    assert_eq!(response.status(), StatusCode::CREATED);

    let body = body_json(response).await;
    assert_eq!(body["success"], true);
    assert_eq!(body["data"]["status"], "OPEN");
    let id = body["data"]["id"].as_str().unwrap().to_string();

    let request = Request::builder()
        .uri(format!("/v1/settlements/{}", id))
        .body(Body::empty())
        .unwrap();
    let response = app(h.state.clone()).oneshot(request).await.unwrap();
    assert_eq!(response.status(), StatusCode::OK);
    let body = body_json(response).await;
    assert_eq!(body["data"]["payee_id"], payee_id.to_string());
}

#[tokio::test]
async fn invalid_settlement_transition_returns_conflict() {
    let h = harness().await;
    let batch = h
        .settlements
        .create(
            Uuid::new_v4(),
            PayeeType::Partner,
            Utc::now() - Duration::days(30),
            Utc::now(),
            "ops-1",
        )
        .await
        .unwrap();

    // OPEN -> PROCESSING skips confirmation
    let request = Request::builder()
        .method("POST")
        .uri(format!("/v1/settlements/{}/process", batch.id))
        .body(Body::empty())
        .unwrap();
    let response = app(h.state.clone()).oneshot(request).await.unwrap();
    assert_eq!(response.status(), StatusCode::CONFLICT);
    let body = body_json(response).await;
    assert_eq!(body["success"], false);
    assert_eq!(body["error"]["code"], "CONFLICT");
}

#[tokio::test]
async fn unknown_settlement_returns_not_found() {
    let h = harness().await;
    let request = Request::builder()
        .uri(format!("/v1/settlements/{}", Uuid::new_v4()))
        .body(Body::empty())
        .unwrap();
    let response = app(h.state.clone()).oneshot(request).await.unwrap();
    assert_eq!(response.status(), StatusCode::NOT_FOUND);
}

#[tokio::test]
async fn relay_creation_is_idempotent_over_http() {
    let h = harness().await;
    let supplier_id = Uuid::new_v4();

    let make_request = || {
        Request::builder()
            .method("POST")
            .uri("/v1/relays")
            .header("content-type", "application/json")
            .body(Body::from(
                serde_json::json!({
                    "order_id": "O-1",
                    "supplier_id": supplier_id,
                    "idempotency_key": "wh-123",
                })
                .to_string(),
            ))
            .unwrap()
    };

    let first = app(h.state.clone()).oneshot(make_request()).await.unwrap();
    assert_eq!(first.status(), StatusCode::CREATED);
    let first_body = body_json(first).await;

    let second = app(h.state.clone()).oneshot(make_request()).await.unwrap();
    assert_eq!(second.status(), StatusCode::CREATED);
    let second_body = body_json(second).await;

    assert_eq!(first_body["data"]["id"], second_body["data"]["id"]);
}

#[tokio::test]
async fn commission_list_is_paged() {
    let h = harness().await;
    let partner = seed_partner(&h.store, "GOLD1").await;
    for i in 0..3 {
        confirmed_commission(&h, &partner, &format!("O-{}", i), 10_000).await;
    }

    let request = Request::builder()
        .uri(format!("/v1/commissions?partner_id={}&page=1&limit=2", partner.id))
        .body(Body::empty())
        .unwrap();
    let response = app(h.state.clone()).oneshot(request).await.unwrap();
    assert_eq!(response.status(), StatusCode::OK);
    let body = body_json(response).await;
    assert_eq!(body["meta"]["total"], 3);
    assert_eq!(body["meta"]["total_pages"], 2);
    assert_eq!(body["data"].as_array().unwrap().len(), 2);
}
