//! Tollgate server binary.

use std::net::SocketAddr;
use std::sync::Arc;

use tracing_subscriber::EnvFilter;

use tollgate_agent::{AgentConfig, AgentRuntime};
use tollgate_api::{run_server, AppState};
use tollgate_store::{MemoryRepository, Repository};

#[tokio::main]
async fn main() -> Result<(), Box<dyn std::error::Error + Send + Sync>> {
    tracing_subscriber::fmt()
        .with_env_filter(
            EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new("info")),
        )
        .init();

    let config = AgentConfig::from_env();
    let repo: Arc<dyn Repository> = Arc::new(MemoryRepository::new());
    let runtime = Arc::new(AgentRuntime::with_solana(config, repo)?);
    runtime.start_background_services().await?;

    let host = std::env::var("HOST").unwrap_or_else(|_| "0.0.0.0".to_string());
    let port: u16 = std::env::var("PORT")
        .ok()
        .and_then(|p| p.parse().ok())
        .unwrap_or(8402);
    let addr: SocketAddr = format!("{}:{}", host, port).parse()?;

    run_server(AppState::new(runtime), addr).await
}
