//! Premium request endpoint

use axum::{
    extract::State,
    http::{HeaderMap, HeaderValue, StatusCode},
    response::{IntoResponse, Response},
    Json,
};

use tollgate_core::catalog::Endpoint;
use tollgate_agent::RequestOutcome;

use crate::dto::{
    to_number, FailedResponse, FulfilledResponse, PaymentRequiredResponse, RequestBody,
};
use crate::error::{ApiError, ApiResult};
use crate::state::AppState;

/// Ask for a premium endpoint: 200 with data, 402 with payment
/// instructions, or 409 when the request failed terminally.
pub async fn post_request(
    State(state): State<AppState>,
    Json(body): Json<RequestBody>,
) -> ApiResult<Response> {
    let endpoint = Endpoint::parse(&body.endpoint)
        .map_err(|_| ApiError::BadRequest(format!("unknown endpoint: {}", body.endpoint)))?;

    let outcome = state
        .runtime
        .coordinator()
        .request_or_advance(endpoint, body.request_id.as_deref())
        .await?;

    Ok(match outcome {
        RequestOutcome::Fulfilled { request_id, data } => (
            StatusCode::OK,
            Json(FulfilledResponse {
                status: "FULFILLED",
                request_id,
                data,
            }),
        )
            .into_response(),
        RequestOutcome::PaymentRequired {
            request_id,
            amount,
            currency,
            facilitator_url,
        } => {
            let mut headers = HeaderMap::new();
            headers.insert("Payment-Network", HeaderValue::from_static("solana-devnet"));
            if let Ok(value) = HeaderValue::from_str(&currency) {
                headers.insert("Payment-Methods", value);
            }
            if let Ok(value) = HeaderValue::from_str(&facilitator_url) {
                headers.insert("Payment-Facilitator", value);
            }
            (
                StatusCode::PAYMENT_REQUIRED,
                headers,
                Json(PaymentRequiredResponse {
                    status: "PAYMENT_REQUIRED",
                    request_id,
                    amount: to_number(amount),
                    currency,
                    facilitator_url,
                }),
            )
                .into_response()
        }
        RequestOutcome::Failed { request_id } => (
            StatusCode::CONFLICT,
            Json(FailedResponse {
                status: "FAILED",
                request_id,
            }),
        )
            .into_response(),
    })
}
