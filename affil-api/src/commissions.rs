use axum::{
    extract::{Path, Query, State},
    routing::{get, post},
    Json, Router,
};
use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use uuid::Uuid;

use crate::error::ApiError;
use crate::state::AppState;
use affil_commission::models::{Commission, CommissionFilter, CommissionStatus};

pub fn routes() -> Router<AppState> {
    Router::new()
        .route("/v1/commissions", get(list_commissions))
        .route("/v1/commissions/{id}/adjust", post(adjust_commission))
        .route("/v1/commissions/{id}/cancel", post(cancel_commission))
}

#[derive(Debug, Deserialize)]
pub struct CommissionListParams {
    pub partner_id: Option<Uuid>,
    pub status: Option<CommissionStatus>,
    pub from: Option<DateTime<Utc>>,
    pub to: Option<DateTime<Utc>>,
    #[serde(default = "default_page")]
    pub page: u32,
    #[serde(default = "default_limit")]
    pub limit: u32,
}

fn default_page() -> u32 {
    1
}

fn default_limit() -> u32 {
    20
}

#[derive(Debug, Serialize)]
pub struct PageMeta {
    pub total: u64,
    pub page: u32,
    pub limit: u32,
    pub total_pages: u64,
}

impl PageMeta {
    pub fn new(total: u64, page: u32, limit: u32) -> Self {
        let total_pages = if limit > 0 {
            total.div_ceil(limit as u64)
        } else {
            1
        };
        Self { total, page, limit, total_pages }
    }
}

#[derive(Debug, Serialize)]
pub struct CommissionListResponse {
    pub success: bool,
    pub data: Vec<Commission>,
    pub meta: PageMeta,
}

/// GET /v1/commissions
async fn list_commissions(
    State(state): State<AppState>,
    Query(params): Query<CommissionListParams>,
) -> Result<Json<CommissionListResponse>, ApiError> {
    if params.limit == 0 || params.limit > 100 {
        return Err(ApiError::Validation("limit must be between 1 and 100".to_string()));
    }

    let filter = CommissionFilter {
        partner_id: params.partner_id,
        status: params.status,
        created_from: params.from,
        created_to: params.to,
        page: params.page,
        limit: params.limit,
    };
    let page = state.commissions.get_commissions(&filter).await?;

    Ok(Json(CommissionListResponse {
        success: true,
        meta: PageMeta::new(page.total, params.page, params.limit),
        data: page.commissions,
    }))
}

#[derive(Debug, Deserialize)]
pub struct AdjustCommissionRequest {
    pub new_amount_minor: i64,
    pub reason: String,
}

#[derive(Debug, Serialize)]
pub struct CommissionResponse {
    pub success: bool,
    pub data: Commission,
}

/// POST /v1/commissions/{id}/adjust
async fn adjust_commission(
    State(state): State<AppState>,
    Path(id): Path<Uuid>,
    Json(req): Json<AdjustCommissionRequest>,
) -> Result<Json<CommissionResponse>, ApiError> {
    if req.reason.trim().is_empty() {
        return Err(ApiError::Validation("reason is required".to_string()));
    }
    let commission = state
        .commissions
        .adjust_commission(id, req.new_amount_minor, req.reason)
        .await?;
    Ok(Json(CommissionResponse { success: true, data: commission }))
}

#[derive(Debug, Deserialize)]
pub struct CancelCommissionRequest {
    pub reason: String,
}

/// POST /v1/commissions/{id}/cancel
async fn cancel_commission(
    State(state): State<AppState>,
    Path(id): Path<Uuid>,
    Json(req): Json<CancelCommissionRequest>,
) -> Result<Json<CommissionResponse>, ApiError> {
    if req.reason.trim().is_empty() {
        return Err(ApiError::Validation("reason is required".to_string()));
    }
    let commission = state.commissions.cancel_commission(id, req.reason).await?;
    Ok(Json(CommissionResponse { success: true, data: commission }))
}
