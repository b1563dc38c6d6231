use axum::{
    extract::{ConnectInfo, State},
    http::{HeaderMap, StatusCode},
    routing::post,
    Json, Router,
};
use serde::{Deserialize, Serialize};
use std::net::SocketAddr;
use uuid::Uuid;

use crate::error::ApiError;
use crate::state::AppState;
use affil_tracking::service::RecordClickRequest;

pub fn routes() -> Router<AppState> {
    Router::new().route("/v1/tracking/click", post(record_click))
}

#[derive(Debug, Deserialize)]
pub struct ClickRequest {
    pub referral_code: String,
    pub product_id: Option<Uuid>,
    pub campaign: Option<String>,
    pub medium: Option<String>,
    pub source: Option<String>,
    pub session_id: Option<String>,
}

#[derive(Debug, Serialize)]
pub struct ClickResponse {
    pub success: bool,
    pub click_id: Option<Uuid>,
}

/// POST /v1/tracking/click
async fn record_click(
    State(state): State<AppState>,
    ConnectInfo(addr): ConnectInfo<SocketAddr>,
    headers: HeaderMap,
    Json(req): Json<ClickRequest>,
) -> Result<(StatusCode, Json<ClickResponse>), ApiError> {
    let user_agent = headers
        .get(axum::http::header::USER_AGENT)
        .and_then(|v| v.to_str().ok())
        .map(|v| v.to_string());

    let recorded = state
        .tracking
        .record_click(RecordClickRequest {
            referral_code: req.referral_code,
            product_id: req.product_id,
            campaign: req.campaign,
            medium: req.medium,
            source: req.source,
            ip_address: Some(addr.ip().to_string()),
            user_agent,
            session_id: req.session_id,
        })
        .await?;

    // Unknown codes are accepted and dropped; the endpoint never tells a
    // caller which referral codes exist
    Ok((
        StatusCode::ACCEPTED,
        Json(ClickResponse {
            success: true,
            click_id: recorded.map(|c| c.id),
        }),
    ))
}
