//! Tollgate Store - Persistence Layer
//!
//! The repository abstraction the agent runs against, a thread-safe
//! in-memory backend, and the ledger service that turns repository
//! appends into committed-then-published observability events.
//!
//! SQL or document backends slot in behind [`Repository`]; nothing above
//! this crate knows which one is wired.

pub mod ledger;
pub mod memory;
pub mod repo;

pub use ledger::{Ledger, QueryPage};
pub use memory::MemoryRepository;
pub use repo::Repository;
