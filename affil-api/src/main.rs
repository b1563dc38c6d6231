use std::net::SocketAddr;
use std::sync::Arc;

use affil_api::{app, state::AppState};
use affil_attribution::engine::AttributionEngine;
use affil_commission::engine::CommissionEngine;
use affil_orchestrator::orchestrator::EventOrchestrator;
use affil_settlement::batch::SettlementEngine;
use affil_settlement::relay::RelayService;
use affil_tracking::service::TrackingService;
use tracing_subscriber::{layer::SubscriberExt, util::SubscriberInitExt};

#[tokio::main]
async fn main() {
    tracing_subscriber::registry()
        .with(
            tracing_subscriber::EnvFilter::try_from_default_env()
                .unwrap_or_else(|_| "affil_api=debug,tower_http=debug,axum::rejection=trace".into()),
        )
        .with(tracing_subscriber::fmt::layer())
        .init();

    let config = affil_store::app_config::Config::load().expect("Failed to load config");
    tracing::info!("Starting affiliate pipeline API on port {}", config.server.port);

    let db = affil_store::DbClient::new(&config.database.url)
        .await
        .expect("Failed to connect to Postgres");
    db.migrate().await.expect("Failed to run migrations");

    // File/env defaults overlaid with operator overrides from the database
    let rules = db
        .fetch_business_rules(config.business_rules.clone())
        .await
        .expect("Failed to load business rules");

    let redis = Arc::new(
        affil_store::RedisClient::new(&config.redis.url)
            .await
            .expect("Failed to connect to Redis"),
    );

    let producer = affil_store::EventProducer::new(&config.kafka.brokers)
        .expect("Failed to create Kafka producer");
    let dead_letters = Arc::new(affil_store::KafkaDeadLetterSink::new(
        producer,
        config.kafka.dead_letter_topic.clone(),
    ));

    let partners = Arc::new(affil_store::partner_repo::PgPartnerRepository::new(db.pool.clone()));
    let clicks = Arc::new(affil_store::tracking_repo::PgClickRepository::new(db.pool.clone()));
    let conversions = Arc::new(affil_store::attribution_repo::PgConversionRepository::new(db.pool.clone()));
    let commissions_repo = Arc::new(affil_store::commission_repo::PgCommissionRepository::new(db.pool.clone()));
    let settlements_repo = Arc::new(affil_store::settlement_repo::PgSettlementRepository::new(db.pool.clone()));
    let relays_repo = Arc::new(affil_store::relay_repo::PgRelayRepository::new(db.pool.clone()));
    let audit = Arc::new(affil_store::audit_repo::PgAuditLogRepository::new(db.pool.clone()));
    let products = Arc::new(affil_store::products::PgProductDirectory::new(db.pool.clone()));

    let tracking = Arc::new(TrackingService::new(clicks, partners.clone()));
    let attribution = Arc::new(AttributionEngine::new(
        conversions.clone(),
        partners.clone(),
        products,
    ));
    let commissions = Arc::new(CommissionEngine::new(
        commissions_repo.clone(),
        conversions,
        partners.clone(),
        rules.commission_rules(),
    ));
    let settlements = Arc::new(SettlementEngine::new(
        settlements_repo,
        commissions_repo,
        audit.clone(),
    ));
    let relays = Arc::new(RelayService::new(relays_repo, audit));

    let orchestrator = Arc::new(EventOrchestrator::new(
        attribution.clone(),
        commissions.clone(),
        dead_letters,
    ));

    tokio::spawn(affil_api::worker::start_order_event_worker(
        config.kafka.brokers.clone(),
        config.kafka.consumer_group.clone(),
        config.kafka.order_events_topic.clone(),
        orchestrator,
    ));

    tokio::spawn(affil_api::scheduler::start_daily_jobs(
        commissions.clone(),
        tracking.clone(),
        rules.click_retention_days,
    ));

    let app_state = AppState {
        tracking,
        attribution,
        commissions,
        settlements,
        relays,
        redis,
        click_rate_limit_per_minute: rules.click_rate_limit_per_minute,
    };

    let app = app(app_state);

    let addr = SocketAddr::from(([0, 0, 0, 0], config.server.port));
    tracing::info!("Listening on {}", addr);

    let listener = tokio::net::TcpListener::bind(addr).await.unwrap();
    axum::serve(
        listener,
        app.into_make_service_with_connect_info::<SocketAddr>(),
    )
    .await
    .unwrap();
}
