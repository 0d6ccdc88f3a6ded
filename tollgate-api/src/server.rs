//! API Server setup

use axum::http::HeaderValue;
use axum::Router;
use std::net::SocketAddr;
use tokio::net::TcpListener;
use tower_http::cors::{AllowOrigin, Any, CorsLayer};
use tower_http::trace::TraceLayer;

use crate::routes::create_router;
use crate::state::AppState;

/// Build the router with tracing and CORS applied.
pub fn create_server(state: AppState) -> Router {
    let origins = state.runtime.config().allowed_origins.clone();

    let mut router = create_router(state);
    router = router.layer(TraceLayer::new_for_http());

    let cors = if origins.is_empty() || origins.iter().any(|o| o == "*") {
        CorsLayer::new()
            .allow_origin(Any)
            .allow_methods(Any)
            .allow_headers(Any)
    } else {
        let parsed: Vec<HeaderValue> = origins
            .iter()
            .filter_map(|o| o.parse().ok())
            .collect();
        CorsLayer::new()
            .allow_origin(AllowOrigin::list(parsed))
            .allow_methods(Any)
            .allow_headers(Any)
    };
    router.layer(cors)
}

/// Run the API server until shutdown.
pub async fn run_server(
    state: AppState,
    addr: SocketAddr,
) -> Result<(), Box<dyn std::error::Error + Send + Sync>> {
    let router = create_server(state);

    tracing::info!("tollgate api listening on {}", addr);

    let listener = TcpListener::bind(addr).await?;
    axum::serve(listener, router).await?;
    Ok(())
}

/// Start the server in the background and return the bound address
/// (useful with port 0).
pub async fn start_background_server(
    state: AppState,
    addr: SocketAddr,
) -> Result<SocketAddr, Box<dyn std::error::Error + Send + Sync>> {
    let router = create_server(state);

    let listener = TcpListener::bind(addr).await?;
    let actual_addr = listener.local_addr()?;

    tokio::spawn(async move {
        if let Err(e) = axum::serve(listener, router).await {
            tracing::error!("server error: {}", e);
        }
    });

    Ok(actual_addr)
}
