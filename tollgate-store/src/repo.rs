//! Repository abstraction.
//!
//! Defines every persistence operation the agent needs. Updates on
//! versioned entities are optimistic: the caller passes the entity at the
//! version it read, a mismatch yields `RepositoryTransient`, and a
//! successful update bumps the stored version. `create_payment` enforces
//! global transaction-hash uniqueness and reports a collision as
//! `DuplicatePayment`.

use async_trait::async_trait;
use chrono::{DateTime, Utc};

use tollgate_core::catalog::Endpoint;
use tollgate_core::error::AgentResult;
use tollgate_core::types::{
    AutonomyTask, BalanceSnapshot, LedgerCursor, LedgerEntry, LedgerFilter, LedgerPage, Payment,
    PremiumRequest, SessionCapability, SystemState,
};

/// Persistence operations for the payment agent
#[async_trait]
pub trait Repository: Send + Sync {
    // ==================== Premium requests ====================

    /// Persist a new request.
    async fn create_request(&self, request: &PremiumRequest) -> AgentResult<()>;

    /// Fetch a request by id.
    async fn get_request(&self, id: &str) -> AgentResult<Option<PremiumRequest>>;

    /// The live (non-terminal) request for an endpoint, if any.
    async fn find_live_request(&self, endpoint: Endpoint) -> AgentResult<Option<PremiumRequest>>;

    /// Optimistic update; returns the stored entity at its new version.
    async fn update_request(&self, request: &PremiumRequest) -> AgentResult<PremiumRequest>;

    // ==================== Payments ====================

    /// Persist a new payment. Fails with `DuplicatePayment` when the
    /// transaction hash is already recorded.
    async fn create_payment(&self, payment: &Payment) -> AgentResult<()>;

    /// Fetch a payment by id.
    async fn get_payment(&self, id: &str) -> AgentResult<Option<Payment>>;

    /// Fetch a payment by its transaction hash.
    async fn find_payment_by_tx_hash(&self, tx_hash: &str) -> AgentResult<Option<Payment>>;

    /// Optimistic update; returns the stored entity at its new version.
    async fn update_payment(&self, payment: &Payment) -> AgentResult<Payment>;

    // ==================== Session capabilities ====================

    /// Persist a new capability.
    async fn create_session(&self, session: &SessionCapability) -> AgentResult<()>;

    /// Fetch a capability by id.
    async fn get_session(&self, id: &str) -> AgentResult<Option<SessionCapability>>;

    /// Optimistic update; the version check is what makes concurrent
    /// usage-increment and read-side expiry transitions race-free.
    async fn update_session(&self, session: &SessionCapability) -> AgentResult<SessionCapability>;

    /// All capabilities, newest first.
    async fn list_sessions(&self) -> AgentResult<Vec<SessionCapability>>;

    // ==================== Autonomy tasks ====================

    /// Insert or replace the task for an endpoint.
    async fn upsert_task(&self, task: &AutonomyTask) -> AgentResult<()>;

    /// Fetch the task for an endpoint.
    async fn get_task(&self, endpoint: Endpoint) -> AgentResult<Option<AutonomyTask>>;

    /// All tasks.
    async fn list_tasks(&self) -> AgentResult<Vec<AutonomyTask>>;

    /// Atomically take the run lock: succeeds only while the task is
    /// runnable (not RUNNING, unlocked, eligibility time passed). Returns
    /// the locked task, or `None` when the condition no longer holds.
    async fn try_lock_task(
        &self,
        endpoint: Endpoint,
        now: DateTime<Utc>,
        score: f64,
    ) -> AgentResult<Option<AutonomyTask>>;

    /// Store the task state after a run completes.
    async fn update_task(&self, task: &AutonomyTask) -> AgentResult<()>;

    // ==================== Balance snapshots ====================

    /// Append a snapshot.
    async fn insert_snapshot(&self, snapshot: &BalanceSnapshot) -> AgentResult<()>;

    /// Most recent snapshot, if any.
    async fn latest_snapshot(&self) -> AgentResult<Option<BalanceSnapshot>>;

    // ==================== System state ====================

    /// The singleton gate state (default when never written).
    async fn get_system_state(&self) -> AgentResult<SystemState>;

    /// Replace the singleton gate state.
    async fn put_system_state(&self, state: &SystemState) -> AgentResult<()>;

    // ==================== Ledger ====================

    /// Append an entry; returns its insert sequence.
    async fn append_ledger(&self, entry: &LedgerEntry) -> AgentResult<u64>;

    /// Filtered scan, newest-first, resuming strictly after `cursor`.
    async fn scan_ledger(
        &self,
        filter: &LedgerFilter,
        limit: usize,
        cursor: Option<LedgerCursor>,
    ) -> AgentResult<LedgerPage>;
}
