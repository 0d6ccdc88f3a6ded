//! Session capability endpoints

use axum::{
    extract::{Path, State},
    Json,
};

use crate::dto::{IssueSessionBody, RevokeSessionBody, SessionDto};
use crate::error::ApiResult;
use crate::state::AppState;

/// Every known capability, newest first.
pub async fn list(State(state): State<AppState>) -> ApiResult<Json<Vec<SessionDto>>> {
    let sessions = state.runtime.sessions().list().await?;
    Ok(Json(sessions.into_iter().map(SessionDto::from).collect()))
}

/// Issue a new capability.
pub async fn issue(
    State(state): State<AppState>,
    Json(body): Json<IssueSessionBody>,
) -> ApiResult<Json<SessionDto>> {
    let session = state
        .runtime
        .sessions()
        .issue(
            &body.wallet_key,
            &body.session_key,
            body.nonce,
            body.max_signatures,
            body.ttl_secs,
        )
        .await?;
    Ok(Json(session.into()))
}

/// Revoke a capability.
pub async fn revoke(
    State(state): State<AppState>,
    Path(id): Path<String>,
    body: Option<Json<RevokeSessionBody>>,
) -> ApiResult<Json<SessionDto>> {
    let reason = body
        .and_then(|Json(b)| b.reason)
        .unwrap_or_else(|| "operator".to_string());
    let session = state.runtime.sessions().revoke(&id, &reason).await?;
    Ok(Json(session.into()))
}
