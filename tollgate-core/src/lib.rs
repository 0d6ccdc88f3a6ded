//! Tollgate Core - Domain Model
//!
//! Shared domain model for the Tollgate payment agent: the premium request
//! lifecycle, payment and session entities, the autonomy task queue, the
//! closed endpoint catalog, the append-only ledger record types, the
//! in-process event bus, and the classified error enum every other crate
//! maps from.
//!
//! # Architecture
//!
//! - **types**: entities with their state machines enforced in methods
//! - **catalog**: the closed table of premium endpoints and offerings
//! - **events**: broadcast fan-out of agent events to subscribers
//! - **ids**: typed identifier and hash constructors
//! - **error**: `AgentError` / `AgentResult`, shared across the workspace

pub mod catalog;
pub mod error;
pub mod events;
pub mod ids;
pub mod types;

pub use catalog::Endpoint;
pub use error::{AgentError, AgentResult};
pub use events::{AgentEvent, EventBus};
