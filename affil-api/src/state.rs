use std::sync::Arc;

use affil_attribution::engine::AttributionEngine;
use affil_commission::engine::CommissionEngine;
use affil_settlement::batch::SettlementEngine;
use affil_settlement::relay::RelayService;
use affil_store::RedisClient;
use affil_tracking::service::TrackingService;

#[derive(Clone)]
pub struct AppState {
    pub tracking: Arc<TrackingService>,
    pub attribution: Arc<AttributionEngine>,
    pub commissions: Arc<CommissionEngine>,
    pub settlements: Arc<SettlementEngine>,
    pub relays: Arc<RelayService>,
    pub redis: Arc<RedisClient>,
    pub click_rate_limit_per_minute: i64,
}
