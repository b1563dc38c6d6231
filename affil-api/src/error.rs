use axum::{
    http::StatusCode,
    response::{IntoResponse, Response},
    Json,
};
use serde_json::json;

use affil_attribution::engine::AttributionError;
use affil_commission::engine::CommissionError;
use affil_settlement::batch::SettlementError;
use affil_settlement::relay::RelayError;
use affil_tracking::service::TrackingError;

#[derive(Debug)]
pub enum ApiError {
    Validation(String),
    NotFound(String),
    Conflict(String),
    Internal(String),
    Anyhow(anyhow::Error),
}

impl IntoResponse for ApiError {
    fn into_response(self) -> Response {
        let (status, code, message) = match self {
            ApiError::Validation(msg) => (StatusCode::BAD_REQUEST, "VALIDATION_ERROR", msg),
            ApiError::NotFound(msg) => (StatusCode::NOT_FOUND, "NOT_FOUND", msg),
            ApiError::Conflict(msg) => (StatusCode::CONFLICT, "CONFLICT", msg),
            ApiError::Internal(msg) => {
                tracing::error!("Internal Server Error: {}", msg);
                (StatusCode::INTERNAL_SERVER_ERROR, "INTERNAL_ERROR", "Internal Server Error".to_string())
            }
            ApiError::Anyhow(err) => {
                tracing::error!("Internal Server Error: {}", err);
                (StatusCode::INTERNAL_SERVER_ERROR, "INTERNAL_ERROR", "Internal Server Error".to_string())
            }
        };

        let body = Json(json!({
            "success": false,
            "error": {
                "code": code,
                "message": message,
            },
        }));

        (status, body).into_response()
    }
}

impl From<anyhow::Error> for ApiError {
    fn from(err: anyhow::Error) -> Self {
        Self::Anyhow(err)
    }
}

impl From<TrackingError> for ApiError {
    fn from(err: TrackingError) -> Self {
        match err {
            TrackingError::Store(e) => ApiError::Internal(e.to_string()),
        }
    }
}

impl From<AttributionError> for ApiError {
    fn from(err: AttributionError) -> Self {
        match err {
            AttributionError::InvalidReferral(_)
            | AttributionError::ProductNotEligible(_)
            | AttributionError::InvalidAmount(_) => ApiError::Validation(err.to_string()),
            AttributionError::NotFound(_) => ApiError::NotFound(err.to_string()),
            AttributionError::InvalidTransition { .. } => ApiError::Conflict(err.to_string()),
            AttributionError::Store(e) => ApiError::Internal(e.to_string()),
        }
    }
}

impl From<CommissionError> for ApiError {
    fn from(err: CommissionError) -> Self {
        match err {
            CommissionError::InvalidAmount(_) => ApiError::Validation(err.to_string()),
            CommissionError::NotFound(_)
            | CommissionError::ConversionNotFound(_)
            | CommissionError::PartnerNotFound(_) => ApiError::NotFound(err.to_string()),
            CommissionError::AlreadyPaid(_)
            | CommissionError::ConversionNotConfirmed(_)
            | CommissionError::InvalidTransition { .. } => ApiError::Conflict(err.to_string()),
            CommissionError::Store(e) => ApiError::Internal(e.to_string()),
        }
    }
}

impl From<SettlementError> for ApiError {
    fn from(err: SettlementError) -> Self {
        match err {
            SettlementError::InvalidPeriod(_) => ApiError::Validation(err.to_string()),
            SettlementError::NotFound(_) => ApiError::NotFound(err.to_string()),
            SettlementError::InvalidTransition { .. } => ApiError::Conflict(err.to_string()),
            SettlementError::Store(e) => ApiError::Internal(e.to_string()),
        }
    }
}

impl From<RelayError> for ApiError {
    fn from(err: RelayError) -> Self {
        match err {
            RelayError::NotFound(_) => ApiError::NotFound(err.to_string()),
            RelayError::InvalidTransition { .. } => ApiError::Conflict(err.to_string()),
            RelayError::Store(e) => ApiError::Internal(e.to_string()),
        }
    }
}
