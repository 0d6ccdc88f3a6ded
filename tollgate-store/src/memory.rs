//! In-memory repository.
//!
//! Thread-safe backend over `RwLock`-protected tables, used by tests and
//! local runs. Payments and their hash index live behind a single lock so
//! uniqueness checks and inserts are atomic; the task table's lock
//! acquisition is a single conditional write.

use std::collections::HashMap;
use std::sync::Arc;

use async_trait::async_trait;
use chrono::{DateTime, Utc};
use tokio::sync::RwLock;

use tollgate_core::catalog::Endpoint;
use tollgate_core::error::{AgentError, AgentResult};
use tollgate_core::types::{
    AutonomyTask, BalanceSnapshot, LedgerCursor, LedgerEntry, LedgerFilter, LedgerPage, Payment,
    PremiumRequest, SessionCapability, SystemState,
};

use crate::repo::Repository;

/// Payment table with its uniqueness index
#[derive(Debug, Default)]
struct PaymentTable {
    by_id: HashMap<String, Payment>,
    by_tx_hash: HashMap<String, String>,
}

/// Ledger entries with their insert sequence
#[derive(Debug, Default)]
struct LedgerTable {
    entries: Vec<(u64, LedgerEntry)>,
    next_seq: u64,
}

/// In-memory repository
#[derive(Debug, Default)]
pub struct MemoryRepository {
    requests: Arc<RwLock<HashMap<String, PremiumRequest>>>,
    payments: Arc<RwLock<PaymentTable>>,
    sessions: Arc<RwLock<HashMap<String, SessionCapability>>>,
    tasks: Arc<RwLock<HashMap<Endpoint, AutonomyTask>>>,
    snapshots: Arc<RwLock<Vec<BalanceSnapshot>>>,
    system: Arc<RwLock<Option<SystemState>>>,
    ledger: Arc<RwLock<LedgerTable>>,
}

impl MemoryRepository {
    /// Empty repository.
    pub fn new() -> Self {
        Self::default()
    }

    /// Drop all data.
    pub async fn clear(&self) {
        self.requests.write().await.clear();
        *self.payments.write().await = PaymentTable::default();
        self.sessions.write().await.clear();
        self.tasks.write().await.clear();
        self.snapshots.write().await.clear();
        *self.system.write().await = None;
        *self.ledger.write().await = LedgerTable::default();
    }
}

fn version_conflict(kind: &str, id: &str) -> AgentError {
    AgentError::RepositoryTransient(format!("{} {} was updated concurrently", kind, id))
}

#[async_trait]
impl Repository for MemoryRepository {
    // ==================== Premium requests ====================

    async fn create_request(&self, request: &PremiumRequest) -> AgentResult<()> {
        let mut requests = self.requests.write().await;
        if requests.contains_key(&request.id) {
            return Err(AgentError::Repository(format!(
                "request {} already exists",
                request.id
            )));
        }
        requests.insert(request.id.clone(), request.clone());
        Ok(())
    }

    async fn get_request(&self, id: &str) -> AgentResult<Option<PremiumRequest>> {
        Ok(self.requests.read().await.get(id).cloned())
    }

    async fn find_live_request(&self, endpoint: Endpoint) -> AgentResult<Option<PremiumRequest>> {
        let requests = self.requests.read().await;
        Ok(requests
            .values()
            .filter(|r| r.endpoint == endpoint && !r.status.is_terminal())
            .max_by_key(|r| r.created_at)
            .cloned())
    }

    async fn update_request(&self, request: &PremiumRequest) -> AgentResult<PremiumRequest> {
        let mut requests = self.requests.write().await;
        let stored = requests
            .get_mut(&request.id)
            .ok_or_else(|| AgentError::RequestNotFound(request.id.clone()))?;
        if stored.version != request.version {
            return Err(version_conflict("request", &request.id));
        }
        let mut updated = request.clone();
        updated.version += 1;
        *stored = updated.clone();
        Ok(updated)
    }

    // ==================== Payments ====================

    async fn create_payment(&self, payment: &Payment) -> AgentResult<()> {
        let mut table = self.payments.write().await;
        if table.by_tx_hash.contains_key(&payment.tx_hash) {
            return Err(AgentError::DuplicatePayment(payment.tx_hash.clone()));
        }
        table
            .by_tx_hash
            .insert(payment.tx_hash.clone(), payment.id.clone());
        table.by_id.insert(payment.id.clone(), payment.clone());
        Ok(())
    }

    async fn get_payment(&self, id: &str) -> AgentResult<Option<Payment>> {
        Ok(self.payments.read().await.by_id.get(id).cloned())
    }

    async fn find_payment_by_tx_hash(&self, tx_hash: &str) -> AgentResult<Option<Payment>> {
        let table = self.payments.read().await;
        Ok(table
            .by_tx_hash
            .get(tx_hash)
            .and_then(|id| table.by_id.get(id))
            .cloned())
    }

    async fn update_payment(&self, payment: &Payment) -> AgentResult<Payment> {
        let mut table = self.payments.write().await;
        let stored = table
            .by_id
            .get_mut(&payment.id)
            .ok_or_else(|| AgentError::Repository(format!("payment {} not found", payment.id)))?;
        if stored.version != payment.version {
            return Err(version_conflict("payment", &payment.id));
        }
        let mut updated = payment.clone();
        updated.version += 1;
        *stored = updated.clone();
        Ok(updated)
    }

    // ==================== Session capabilities ====================

    async fn create_session(&self, session: &SessionCapability) -> AgentResult<()> {
        let mut sessions = self.sessions.write().await;
        sessions.insert(session.id.clone(), session.clone());
        Ok(())
    }

    async fn get_session(&self, id: &str) -> AgentResult<Option<SessionCapability>> {
        Ok(self.sessions.read().await.get(id).cloned())
    }

    async fn update_session(&self, session: &SessionCapability) -> AgentResult<SessionCapability> {
        let mut sessions = self.sessions.write().await;
        let stored = sessions
            .get_mut(&session.id)
            .ok_or_else(|| AgentError::SessionInvalid(format!("session {} unknown", session.id)))?;
        if stored.version != session.version {
            return Err(version_conflict("session", &session.id));
        }
        let mut updated = session.clone();
        updated.version += 1;
        *stored = updated.clone();
        Ok(updated)
    }

    async fn list_sessions(&self) -> AgentResult<Vec<SessionCapability>> {
        let sessions = self.sessions.read().await;
        let mut all: Vec<_> = sessions.values().cloned().collect();
        all.sort_by(|a, b| b.created_at.cmp(&a.created_at));
        Ok(all)
    }

    // ==================== Autonomy tasks ====================

    async fn upsert_task(&self, task: &AutonomyTask) -> AgentResult<()> {
        self.tasks.write().await.insert(task.endpoint, task.clone());
        Ok(())
    }

    async fn get_task(&self, endpoint: Endpoint) -> AgentResult<Option<AutonomyTask>> {
        Ok(self.tasks.read().await.get(&endpoint).cloned())
    }

    async fn list_tasks(&self) -> AgentResult<Vec<AutonomyTask>> {
        let tasks = self.tasks.read().await;
        let mut all: Vec<_> = tasks.values().cloned().collect();
        all.sort_by_key(|t| t.endpoint);
        Ok(all)
    }

    async fn try_lock_task(
        &self,
        endpoint: Endpoint,
        now: DateTime<Utc>,
        score: f64,
    ) -> AgentResult<Option<AutonomyTask>> {
        let mut tasks = self.tasks.write().await;
        let task = match tasks.get_mut(&endpoint) {
            Some(task) => task,
            None => return Ok(None),
        };
        if !task.is_runnable_at(now) {
            return Ok(None);
        }
        task.begin_run(now, score);
        Ok(Some(task.clone()))
    }

    async fn update_task(&self, task: &AutonomyTask) -> AgentResult<()> {
        self.tasks.write().await.insert(task.endpoint, task.clone());
        Ok(())
    }

    // ==================== Balance snapshots ====================

    async fn insert_snapshot(&self, snapshot: &BalanceSnapshot) -> AgentResult<()> {
        self.snapshots.write().await.push(snapshot.clone());
        Ok(())
    }

    async fn latest_snapshot(&self) -> AgentResult<Option<BalanceSnapshot>> {
        Ok(self.snapshots.read().await.last().cloned())
    }

    // ==================== System state ====================

    async fn get_system_state(&self) -> AgentResult<SystemState> {
        Ok(self.system.read().await.clone().unwrap_or_default())
    }

    async fn put_system_state(&self, state: &SystemState) -> AgentResult<()> {
        *self.system.write().await = Some(state.clone());
        Ok(())
    }

    // ==================== Ledger ====================

    async fn append_ledger(&self, entry: &LedgerEntry) -> AgentResult<u64> {
        let mut table = self.ledger.write().await;
        let seq = table.next_seq;
        table.next_seq += 1;
        table.entries.push((seq, entry.clone()));
        Ok(seq)
    }

    async fn scan_ledger(
        &self,
        filter: &LedgerFilter,
        limit: usize,
        cursor: Option<LedgerCursor>,
    ) -> AgentResult<LedgerPage> {
        let table = self.ledger.read().await;

        // Newest-first: timestamp, then insert order, then id.
        let mut matched: Vec<&(u64, LedgerEntry)> = table
            .entries
            .iter()
            .filter(|(_, e)| filter.matches(e))
            .collect();
        matched.sort_by(|(seq_a, a), (seq_b, b)| {
            (b.timestamp, seq_b, &b.id).cmp(&(a.timestamp, seq_a, &a.id))
        });

        let after_cursor: Vec<&(u64, LedgerEntry)> = match cursor {
            Some(cursor) => matched
                .into_iter()
                .filter(|(seq, e)| {
                    (e.timestamp.timestamp_millis(), *seq) < (cursor.timestamp_ms, cursor.seq)
                })
                .collect(),
            None => matched,
        };

        let has_more = after_cursor.len() > limit;
        let page: Vec<(u64, LedgerEntry)> = after_cursor
            .into_iter()
            .take(limit)
            .map(|(seq, e)| (*seq, e.clone()))
            .collect();

        let next_cursor = if has_more {
            page.last().map(|(seq, e)| LedgerCursor {
                timestamp_ms: e.timestamp.timestamp_millis(),
                seq: *seq,
            })
        } else {
            None
        };

        Ok(LedgerPage {
            entries: page.into_iter().map(|(_, e)| e).collect(),
            next_cursor,
        })
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use rust_decimal_macros::dec;
    use tollgate_core::catalog;

    fn repo() -> MemoryRepository {
        MemoryRepository::new()
    }

    fn request() -> PremiumRequest {
        let offering = catalog::offering(Endpoint::Market, "https://facilitator.test");
        PremiumRequest::new(
            Endpoint::Market,
            offering.amount,
            offering.currency,
            offering.facilitator_url,
        )
    }

    #[tokio::test]
    async fn test_duplicate_tx_hash_rejected() {
        let repo = repo();
        let first = Payment::confirmed("req:1", "sig-1", dec!(0.05), "USDC");
        repo.create_payment(&first).await.unwrap();

        let second = Payment::confirmed("req:2", "sig-1", dec!(0.05), "USDC");
        match repo.create_payment(&second).await {
            Err(AgentError::DuplicatePayment(hash)) => assert_eq!(hash, "sig-1"),
            other => panic!("expected DuplicatePayment, got {:?}", other.err()),
        }

        // The original row is untouched.
        let stored = repo.find_payment_by_tx_hash("sig-1").await.unwrap().unwrap();
        assert_eq!(stored.id, first.id);
    }

    #[tokio::test]
    async fn test_optimistic_update_conflict() {
        let repo = repo();
        let req = request();
        repo.create_request(&req).await.unwrap();

        let mut copy_a = repo.get_request(&req.id).await.unwrap().unwrap();
        let mut copy_b = copy_a.clone();

        copy_a.mark_paid("sig-1").unwrap();
        repo.update_request(&copy_a).await.unwrap();

        copy_b.mark_failed().unwrap();
        match repo.update_request(&copy_b).await {
            Err(AgentError::RepositoryTransient(_)) => {}
            other => panic!("expected transient conflict, got {:?}", other.err()),
        }
    }

    #[tokio::test]
    async fn test_find_live_request_skips_terminal() {
        let repo = repo();
        let mut done = request();
        done.mark_failed().unwrap();
        repo.create_request(&done).await.unwrap();
        assert!(repo
            .find_live_request(Endpoint::Market)
            .await
            .unwrap()
            .is_none());

        let live = request();
        repo.create_request(&live).await.unwrap();
        let found = repo.find_live_request(Endpoint::Market).await.unwrap();
        assert_eq!(found.unwrap().id, live.id);
    }

    #[tokio::test]
    async fn test_task_lock_is_single_shot() {
        let repo = repo();
        let task = catalog::seed_task(Endpoint::Market);
        repo.upsert_task(&task).await.unwrap();

        let now = Utc::now();
        let locked = repo.try_lock_task(Endpoint::Market, now, 1.0).await.unwrap();
        assert!(locked.is_some());

        // The second acquisition sees the lock and refuses.
        let second = repo.try_lock_task(Endpoint::Market, now, 1.0).await.unwrap();
        assert!(second.is_none());
    }

    #[tokio::test]
    async fn test_ledger_pagination_newest_first() {
        let repo = repo();
        for i in 0..5 {
            repo.append_ledger(&LedgerEntry::payment(format!("event-{}", i)))
                .await
                .unwrap();
        }

        let filter = LedgerFilter::default();
        let first = repo.scan_ledger(&filter, 2, None).await.unwrap();
        assert_eq!(first.entries.len(), 2);
        assert_eq!(first.entries[0].event, "event-4");
        let cursor = first.next_cursor.expect("more pages");

        let second = repo.scan_ledger(&filter, 2, Some(cursor)).await.unwrap();
        assert_eq!(second.entries[0].event, "event-2");

        let third = repo
            .scan_ledger(&filter, 2, second.next_cursor)
            .await
            .unwrap();
        assert_eq!(third.entries.len(), 1);
        assert!(third.next_cursor.is_none());
    }

    #[tokio::test]
    async fn test_system_state_defaults_unpaused() {
        let repo = repo();
        let state = repo.get_system_state().await.unwrap();
        assert!(!state.payments_paused);
    }
}
