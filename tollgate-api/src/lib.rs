//! Tollgate API - Boundary Adapters
//!
//! The thin HTTP and SSE surface over the payment orchestration core:
//! the 402 request flow, payment execution, the balance view, the
//! facilitator callback, and the admin-guarded observability endpoints
//! (ledger query/export, autonomy queue, sessions, event stream).
//!
//! Everything interesting happens in `tollgate-agent`; handlers here
//! parse, delegate, and map outcomes onto status codes.

pub mod auth;
pub mod dto;
pub mod error;
pub mod routes;
pub mod server;
pub mod state;

pub use error::{ApiError, ApiResult};
pub use routes::create_router;
pub use server::{create_server, run_server, start_background_server};
pub use state::AppState;
