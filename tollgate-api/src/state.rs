//! API application state

use std::sync::Arc;

use tollgate_agent::AgentRuntime;

/// Shared state for every handler
#[derive(Clone)]
pub struct AppState {
    /// The wired agent
    pub runtime: Arc<AgentRuntime>,
}

impl AppState {
    pub fn new(runtime: Arc<AgentRuntime>) -> Self {
        Self { runtime }
    }

    /// The configured admin bearer key, if any.
    pub fn admin_api_key(&self) -> Option<&str> {
        self.runtime.config().admin_api_key.as_deref()
    }
}
