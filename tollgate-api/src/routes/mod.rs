//! Route assembly

pub mod autonomy;
pub mod events;
pub mod health;
pub mod ledger;
pub mod payments;
pub mod request;
pub mod sessions;

use axum::{
    middleware,
    routing::{get, post},
    Router,
};

use crate::auth::admin_guard;
use crate::state::AppState;

/// Assemble the full router. The observability and session surfaces sit
/// behind the admin bearer guard; the payment path is open.
pub fn create_router(state: AppState) -> Router {
    let public = Router::new()
        .route("/health", get(health::health))
        .route("/ready", get(health::ready))
        .route("/request", post(request::post_request))
        .route("/payments/execute", post(payments::execute))
        .route("/payments/balance", get(payments::balance))
        .route(
            "/payments/facilitator/callback",
            post(payments::facilitator_callback),
        );

    let admin = Router::new()
        .route("/logs/ledger", get(ledger::query))
        .route("/logs/ledger/export", get(ledger::export_csv))
        .route("/autonomy/queue", get(autonomy::queue))
        .route("/sessions", get(sessions::list).post(sessions::issue))
        .route("/sessions/:id/revoke", post(sessions::revoke))
        .route("/events/stream", get(events::stream))
        .route_layer(middleware::from_fn_with_state(
            state.clone(),
            admin_guard,
        ));

    public.merge(admin).with_state(state)
}
