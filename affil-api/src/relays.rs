use axum::{
    extract::{Path, Query, State},
    http::StatusCode,
    routing::{get, post},
    Json, Router,
};
use serde::{Deserialize, Serialize};
use uuid::Uuid;

use crate::commissions::PageMeta;
use crate::error::ApiError;
use crate::state::AppState;
use affil_settlement::relay::{CreateRelayRequest, OrderRelay, RelayStatus};

pub fn routes() -> Router<AppState> {
    Router::new()
        .route("/v1/relays", post(create_relay).get(list_relays))
        .route("/v1/relays/{id}", get(get_relay))
        .route("/v1/relays/{id}/transition", post(transition_relay))
}

const DEFAULT_ACTOR: &str = "operator";

#[derive(Debug, Deserialize)]
pub struct RelayRequest {
    pub order_id: String,
    pub supplier_id: Uuid,
    pub idempotency_key: String,
}

#[derive(Debug, Serialize)]
pub struct RelayResponse {
    pub success: bool,
    pub data: OrderRelay,
}

/// POST /v1/relays
async fn create_relay(
    State(state): State<AppState>,
    Json(req): Json<RelayRequest>,
) -> Result<(StatusCode, Json<RelayResponse>), ApiError> {
    if req.idempotency_key.trim().is_empty() {
        return Err(ApiError::Validation("idempotency_key is required".to_string()));
    }
    let relay = state
        .relays
        .create(
            CreateRelayRequest {
                order_id: req.order_id,
                supplier_id: req.supplier_id,
                idempotency_key: req.idempotency_key,
            },
            DEFAULT_ACTOR,
        )
        .await?;
    Ok((StatusCode::CREATED, Json(RelayResponse { success: true, data: relay })))
}

#[derive(Debug, Deserialize)]
pub struct RelayListParams {
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
pub struct RelayListResponse {
    pub success: bool,
    pub data: Vec<OrderRelay>,
    pub meta: PageMeta,
}

/// GET /v1/relays
async fn list_relays(
    State(state): State<AppState>,
    Query(params): Query<RelayListParams>,
) -> Result<Json<RelayListResponse>, ApiError> {
    if params.limit == 0 || params.limit > 100 {
        return Err(ApiError::Validation("limit must be between 1 and 100".to_string()));
    }
    let (relays, total) = state.relays.list(params.page, params.limit).await?;
    Ok(Json(RelayListResponse {
        success: true,
        meta: PageMeta::new(total, params.page, params.limit),
        data: relays,
    }))
}

/// GET /v1/relays/{id}
async fn get_relay(
    State(state): State<AppState>,
    Path(id): Path<Uuid>,
) -> Result<Json<RelayResponse>, ApiError> {
    let relay = state.relays.get(id).await?;
    Ok(Json(RelayResponse { success: true, data: relay }))
}

#[derive(Debug, Deserialize)]
pub struct TransitionRelayRequest {
    pub status: RelayStatus,
    pub reason: Option<String>,
}

/// POST /v1/relays/{id}/transition
async fn transition_relay(
    State(state): State<AppState>,
    Path(id): Path<Uuid>,
    Json(req): Json<TransitionRelayRequest>,
) -> Result<Json<RelayResponse>, ApiError> {
    let relay = state
        .relays
        .transition(id, req.status, req.reason, DEFAULT_ACTOR)
        .await?;
    Ok(Json(RelayResponse { success: true, data: relay }))
}
