//! Admin authentication
//!
//! Guards the observability and session surfaces with a bearer token
//! equal to the configured admin key. With no key configured the guard
//! is open, which is the development posture; production sets
//! `ADMIN_API_KEY`.

use axum::{
    extract::{Request, State},
    http::header::AUTHORIZATION,
    middleware::Next,
    response::{IntoResponse, Response},
};

use crate::error::ApiError;
use crate::state::AppState;

/// Bearer-token middleware for admin-guarded routes.
pub async fn admin_guard(
    State(state): State<AppState>,
    request: Request,
    next: Next,
) -> Response {
    let expected = match state.admin_api_key() {
        Some(key) if !key.is_empty() => key,
        // No key configured: guard disabled.
        _ => return next.run(request).await,
    };

    let provided = request
        .headers()
        .get(AUTHORIZATION)
        .and_then(|v| v.to_str().ok())
        .and_then(|v| v.strip_prefix("Bearer "));

    match provided {
        Some(token) if token == expected => next.run(request).await,
        Some(_) => ApiError::Unauthorized("invalid admin token".to_string()).into_response(),
        None => ApiError::Unauthorized(
            "admin endpoint requires Authorization: Bearer <key>".to_string(),
        )
        .into_response(),
    }
}
