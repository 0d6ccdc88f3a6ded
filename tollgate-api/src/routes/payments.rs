//! Payment endpoints

use axum::{
    body::Bytes,
    extract::State,
    http::HeaderMap,
    Json,
};

use tollgate_agent::{CallbackDisposition, ExecuteOutcome};
use tollgate_core::types::PaymentStatus;

use crate::dto::{
    to_number, BalanceResponse, CallbackBody, CallbackResponse, ExecuteBody, ExecuteResponse,
};
use crate::error::{ApiError, ApiResult};
use crate::state::AppState;

/// Signature header on facilitator callbacks.
const SIGNATURE_HEADER: &str = "x-facilitator-signature";

/// Execute the payment for a premium request.
pub async fn execute(
    State(state): State<AppState>,
    Json(body): Json<ExecuteBody>,
) -> ApiResult<Json<ExecuteResponse>> {
    let outcome = state
        .runtime
        .executor()
        .execute(&body.request_id, body.session_id.as_deref())
        .await?;

    Ok(Json(match outcome {
        ExecuteOutcome::Confirmed { tx_hash, balance } => ExecuteResponse {
            status: "confirmed",
            tx_hash: Some(tx_hash),
            balance: Some(to_number(balance)),
        },
        ExecuteOutcome::AlreadyFulfilled { tx_hash } => ExecuteResponse {
            status: "already-fulfilled",
            tx_hash,
            balance: None,
        },
        ExecuteOutcome::Noop { tx_hash } => ExecuteResponse {
            status: "noop",
            tx_hash,
            balance: None,
        },
    }))
}

/// Current balance and gate state.
pub async fn balance(State(state): State<AppState>) -> ApiResult<Json<BalanceResponse>> {
    let view = state.runtime.monitor().view().await?;
    Ok(Json(view.into()))
}

/// Inbound facilitator callback. The raw body is authenticated with the
/// shared-secret HMAC before anything is parsed.
pub async fn facilitator_callback(
    State(state): State<AppState>,
    headers: HeaderMap,
    body: Bytes,
) -> ApiResult<Json<CallbackResponse>> {
    let signature = headers
        .get(SIGNATURE_HEADER)
        .and_then(|v| v.to_str().ok())
        .ok_or_else(|| ApiError::Unauthorized("missing facilitator signature".to_string()))?;

    if !state
        .runtime
        .facilitator()
        .verify_callback(&body, signature)
    {
        return Err(ApiError::Unauthorized(
            "facilitator signature invalid".to_string(),
        ));
    }

    let callback: CallbackBody = serde_json::from_slice(&body)
        .map_err(|e| ApiError::BadRequest(format!("invalid callback body: {}", e)))?;

    let disposition = match callback.status.as_str() {
        "confirmed" => CallbackDisposition::Confirmed,
        "rejected" => CallbackDisposition::Rejected,
        other => {
            return Err(ApiError::BadRequest(format!(
                "unknown callback status: {}",
                other
            )))
        }
    };

    let payment = state
        .runtime
        .coordinator()
        .apply_facilitator_callback(&callback.tx_hash, disposition, callback.reason)
        .await?;

    Ok(Json(CallbackResponse {
        payment_id: payment.id,
        tx_hash: payment.tx_hash,
        status: match payment.status {
            PaymentStatus::Pending => "PENDING",
            PaymentStatus::Confirmed => "CONFIRMED",
            PaymentStatus::Failed => "FAILED",
        }
        .to_string(),
        failure_code: payment.failure_code,
    }))
}
