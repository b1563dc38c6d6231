use axum::{
    extract::{Path, Query, State},
    http::StatusCode,
    routing::{get, post},
    Json, Router,
};
use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use uuid::Uuid;

use crate::commissions::PageMeta;
use crate::error::ApiError;
use crate::state::AppState;
use affil_core::audit::AuditLogEntry;
use affil_settlement::batch::{PayeeType, SettlementBatch, SettlementLine};

pub fn routes() -> Router<AppState> {
    Router::new()
        .route("/v1/settlements", post(create_settlement).get(list_settlements))
        .route("/v1/settlements/{id}", get(get_settlement))
        .route("/v1/settlements/{id}/audit", get(settlement_audit))
        .route("/v1/settlements/{id}/calculate", post(calculate_settlement))
        .route("/v1/settlements/{id}/confirm", post(confirm_settlement))
        .route("/v1/settlements/{id}/process", post(process_settlement))
        .route("/v1/settlements/{id}/pay", post(pay_settlement))
        .route("/v1/settlements/{id}/fail", post(fail_settlement))
        .route("/v1/settlements/{id}/retry", post(retry_settlement))
}

// Operator identity comes from the gateway in production; the header is
// optional here and falls back to a generic operator id.
const DEFAULT_ACTOR: &str = "operator";

#[derive(Debug, Deserialize)]
pub struct CreateSettlementRequest {
    pub payee_id: Uuid,
    pub payee_type: PayeeType,
    pub period_start: DateTime<Utc>,
    pub period_end: DateTime<Utc>,
}

#[derive(Debug, Serialize)]
pub struct SettlementResponse {
    pub success: bool,
    pub data: SettlementBatch,
}

#[derive(Debug, Serialize)]
pub struct SettlementDetailResponse {
    pub success: bool,
    pub data: SettlementBatch,
    pub lines: Vec<SettlementLine>,
}

/// POST /v1/settlements
async fn create_settlement(
    State(state): State<AppState>,
    Json(req): Json<CreateSettlementRequest>,
) -> Result<(StatusCode, Json<SettlementResponse>), ApiError> {
    let batch = state
        .settlements
        .create(req.payee_id, req.payee_type, req.period_start, req.period_end, DEFAULT_ACTOR)
        .await?;
    Ok((StatusCode::CREATED, Json(SettlementResponse { success: true, data: batch })))
}

#[derive(Debug, Deserialize)]
pub struct SettlementListParams {
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
pub struct SettlementListResponse {
    pub success: bool,
    pub data: Vec<SettlementBatch>,
    pub meta: PageMeta,
}

/// GET /v1/settlements
async fn list_settlements(
    State(state): State<AppState>,
    Query(params): Query<SettlementListParams>,
) -> Result<Json<SettlementListResponse>, ApiError> {
    if params.limit == 0 || params.limit > 100 {
        return Err(ApiError::Validation("limit must be between 1 and 100".to_string()));
    }
    let (batches, total) = state.settlements.list(params.page, params.limit).await?;
    Ok(Json(SettlementListResponse {
        success: true,
        meta: PageMeta::new(total, params.page, params.limit),
        data: batches,
    }))
}

/// GET /v1/settlements/{id}
async fn get_settlement(
    State(state): State<AppState>,
    Path(id): Path<Uuid>,
) -> Result<Json<SettlementDetailResponse>, ApiError> {
    let (batch, lines) = state.settlements.get(id).await?;
    Ok(Json(SettlementDetailResponse { success: true, data: batch, lines }))
}

#[derive(Debug, Serialize)]
pub struct AuditResponse {
    pub success: bool,
    pub data: Vec<AuditLogEntry>,
}

/// GET /v1/settlements/{id}/audit
async fn settlement_audit(
    State(state): State<AppState>,
    Path(id): Path<Uuid>,
) -> Result<Json<AuditResponse>, ApiError> {
    let entries = state.settlements.audit_trail(id).await?;
    Ok(Json(AuditResponse { success: true, data: entries }))
}

/// POST /v1/settlements/{id}/calculate
async fn calculate_settlement(
    State(state): State<AppState>,
    Path(id): Path<Uuid>,
) -> Result<Json<SettlementResponse>, ApiError> {
    let batch = state.settlements.calculate(id, DEFAULT_ACTOR).await?;
    Ok(Json(SettlementResponse { success: true, data: batch }))
}

/// POST /v1/settlements/{id}/confirm
async fn confirm_settlement(
    State(state): State<AppState>,
    Path(id): Path<Uuid>,
) -> Result<Json<SettlementResponse>, ApiError> {
    let batch = state.settlements.confirm(id, DEFAULT_ACTOR).await?;
    Ok(Json(SettlementResponse { success: true, data: batch }))
}

/// POST /v1/settlements/{id}/process
async fn process_settlement(
    State(state): State<AppState>,
    Path(id): Path<Uuid>,
) -> Result<Json<SettlementResponse>, ApiError> {
    let batch = state.settlements.start_processing(id, DEFAULT_ACTOR).await?;
    Ok(Json(SettlementResponse { success: true, data: batch }))
}

/// POST /v1/settlements/{id}/pay
async fn pay_settlement(
    State(state): State<AppState>,
    Path(id): Path<Uuid>,
) -> Result<Json<SettlementResponse>, ApiError> {
    let batch = state.settlements.mark_as_paid(id, DEFAULT_ACTOR).await?;
    Ok(Json(SettlementResponse { success: true, data: batch }))
}

#[derive(Debug, Deserialize)]
pub struct FailSettlementRequest {
    pub reason: String,
}

/// POST /v1/settlements/{id}/fail
async fn fail_settlement(
    State(state): State<AppState>,
    Path(id): Path<Uuid>,
    Json(req): Json<FailSettlementRequest>,
) -> Result<Json<SettlementResponse>, ApiError> {
    if req.reason.trim().is_empty() {
        return Err(ApiError::Validation("reason is required".to_string()));
    }
    let batch = state.settlements.mark_as_failed(id, req.reason, DEFAULT_ACTOR).await?;
    Ok(Json(SettlementResponse { success: true, data: batch }))
}

/// POST /v1/settlements/{id}/retry
async fn retry_settlement(
    State(state): State<AppState>,
    Path(id): Path<Uuid>,
) -> Result<Json<SettlementResponse>, ApiError> {
    let batch = state.settlements.retry(id, DEFAULT_ACTOR).await?;
    Ok(Json(SettlementResponse { success: true, data: batch }))
}
