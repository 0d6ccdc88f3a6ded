//! API Error types

use axum::{
    http::StatusCode,
    response::{IntoResponse, Response},
    Json,
};
use rust_decimal::prelude::ToPrimitive;
use rust_decimal::Decimal;
use serde::Serialize;
use thiserror::Error;

use tollgate_core::error::AgentError;
use tollgate_core::types::PauseReason;

/// API error types
#[derive(Error, Debug)]
pub enum ApiError {
    #[error("Not found: {0}")]
    NotFound(String),

    #[error("Bad request: {0}")]
    BadRequest(String),

    #[error("Unauthorized: {0}")]
    Unauthorized(String),

    #[error("Conflict: {0}")]
    Conflict(String),

    #[error("Payments paused: {reason}")]
    PaymentsPaused {
        reason: PauseReason,
        balance: Decimal,
        threshold: Decimal,
    },

    #[error("Upstream chain error: {0}")]
    BadGateway(String),

    #[error("Upstream timeout: {0}")]
    GatewayTimeout(String),

    #[error("Internal error: {0}")]
    Internal(String),
}

/// Error response body
#[derive(Serialize)]
pub struct ErrorResponse {
    pub error: String,
    pub code: String,
}

/// Body for the 503 paused response
#[derive(Serialize)]
#[serde(rename_all = "camelCase")]
pub struct PausedResponse {
    pub pause_reason: PauseReason,
    pub balance: f64,
    pub threshold: f64,
}

impl From<AgentError> for ApiError {
    fn from(e: AgentError) -> Self {
        match e {
            AgentError::RequestNotFound(msg) => ApiError::NotFound(msg),
            AgentError::PaymentsPaused {
                reason,
                balance,
                threshold,
            } => ApiError::PaymentsPaused {
                reason,
                balance,
                threshold,
            },
            AgentError::SessionInvalid(msg) => ApiError::Unauthorized(msg),
            AgentError::FacilitatorSignatureInvalid => {
                ApiError::Unauthorized("facilitator signature invalid".to_string())
            }
            AgentError::ChainTimeout { waited_secs } => {
                ApiError::GatewayTimeout(format!("confirmation timed out after {}s", waited_secs))
            }
            AgentError::ChainRejected(msg) => ApiError::BadGateway(msg),
            AgentError::InvalidTransition(msg) => ApiError::Conflict(msg),
            AgentError::Configuration(msg) => ApiError::Internal(msg),
            AgentError::SignerUnavailable => {
                ApiError::Internal("custodial signer unavailable".to_string())
            }
            other => ApiError::Internal(other.to_string()),
        }
    }
}

impl IntoResponse for ApiError {
    fn into_response(self) -> Response {
        // The paused body carries the gate context instead of the generic
        // error shape.
        if let ApiError::PaymentsPaused {
            reason,
            balance,
            threshold,
        } = &self
        {
            let body = PausedResponse {
                pause_reason: *reason,
                balance: balance.to_f64().unwrap_or(0.0),
                threshold: threshold.to_f64().unwrap_or(0.0),
            };
            return (StatusCode::SERVICE_UNAVAILABLE, Json(body)).into_response();
        }

        let (status, code, message) = match &self {
            ApiError::NotFound(msg) => (StatusCode::NOT_FOUND, "NOT_FOUND", msg.clone()),
            ApiError::BadRequest(msg) => (StatusCode::BAD_REQUEST, "BAD_REQUEST", msg.clone()),
            ApiError::Unauthorized(msg) => (StatusCode::UNAUTHORIZED, "UNAUTHORIZED", msg.clone()),
            ApiError::Conflict(msg) => (StatusCode::CONFLICT, "CONFLICT", msg.clone()),
            ApiError::PaymentsPaused { .. } => unreachable!("handled above"),
            ApiError::BadGateway(msg) => (StatusCode::BAD_GATEWAY, "CHAIN_REJECTED", msg.clone()),
            ApiError::GatewayTimeout(msg) => {
                (StatusCode::GATEWAY_TIMEOUT, "CHAIN_TIMEOUT", msg.clone())
            }
            ApiError::Internal(msg) => {
                (StatusCode::INTERNAL_SERVER_ERROR, "INTERNAL_ERROR", msg.clone())
            }
        };

        let body = ErrorResponse {
            error: message,
            code: code.to_string(),
        };
        (status, Json(body)).into_response()
    }
}

/// API result type
pub type ApiResult<T> = Result<T, ApiError>;
