use std::sync::Arc;

use affil_commission::engine::CommissionEngine;
use affil_tracking::service::TrackingService;
use chrono::Utc;
use tokio::time::{sleep, Duration};
use tracing::{error, info};

const DAILY: Duration = Duration::from_secs(24 * 60 * 60);

/// Daily background jobs: hold-expiry confirmation and the click PII sweep.
/// Each job catches its own errors so one failure never starves the other.
pub async fn start_daily_jobs(
    commissions: Arc<CommissionEngine>,
    tracking: Arc<TrackingService>,
    click_retention_days: i64,
) {
    info!("Daily job scheduler started");

    loop {
        match commissions.auto_confirm_commissions(Utc::now()).await {
            Ok(confirmed) => {
                if confirmed > 0 {
                    info!(confirmed, "Daily commission confirmation run finished");
                }
            }
            Err(e) => error!("Commission confirmation run failed: {}", e),
        }

        match tracking.anonymize_old_clicks(click_retention_days).await {
            Ok(anonymized) => {
                if anonymized > 0 {
                    info!(anonymized, "Daily click anonymization run finished");
                }
            }
            Err(e) => error!("Click anonymization run failed: {}", e),
        }

        sleep(DAILY).await;
    }
}
