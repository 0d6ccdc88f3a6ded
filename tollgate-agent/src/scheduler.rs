//! Autonomy scheduler.
//!
//! The periodic loop that keeps premium data fresh without a human in the
//! loop. Each tick gates on the balance monitor, scores every eligible
//! task by staleness against its freshness window, runs the single best
//! candidate under an atomically-acquired lock, and converts any failure
//! into an exponential-backoff reschedule. The scheduler never
//! propagates errors upward; every outcome lands in the ledger and on
//! the bus instead.

use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::Arc;
use std::time::Duration;

use chrono::Utc;
use tokio::sync::RwLock;
use tokio::time::interval;
use tracing::{debug, info, warn};

use tollgate_core::catalog::{self, Endpoint};
use tollgate_core::error::{AgentError, AgentResult};
use tollgate_core::events::{AgentEvent, EventBus};
use tollgate_core::types::{AutonomyTask, LedgerEntry};
use tollgate_store::{Ledger, Repository};

use crate::balance::BalanceMonitor;
use crate::chain::ChainGateway;
use crate::coordinator::{RequestCoordinator, RequestOutcome};
use crate::executor::PaymentExecutor;
use crate::session::SessionRegistry;

/// Scheduler tunables
#[derive(Debug, Clone)]
pub struct SchedulerConfig {
    /// Tick interval in seconds (min 5)
    pub interval_secs: u64,
    /// Score floor below which a task is not worth running
    pub min_run_score: f64,
    /// Backoff cap in seconds
    pub max_backoff_secs: u64,
}

/// One task with its score as of a snapshot instant
#[derive(Debug, Clone)]
pub struct ScoredTask {
    pub task: AutonomyTask,
    pub score: f64,
}

/// Priority-weighted periodic task runner
pub struct AutonomyScheduler {
    repo: Arc<dyn Repository>,
    ledger: Ledger,
    bus: EventBus,
    monitor: Arc<BalanceMonitor>,
    sessions: SessionRegistry,
    executor: Arc<PaymentExecutor>,
    coordinator: RequestCoordinator,
    chain: Arc<dyn ChainGateway>,
    config: SchedulerConfig,
    /// The one capability the scheduler pays under, replaced on
    /// expiry/exhaustion
    session_slot: RwLock<Option<String>>,
    running: Arc<AtomicBool>,
}

impl AutonomyScheduler {
    #[allow(clippy::too_many_arguments)]
    pub fn new(
        repo: Arc<dyn Repository>,
        ledger: Ledger,
        bus: EventBus,
        monitor: Arc<BalanceMonitor>,
        sessions: SessionRegistry,
        executor: Arc<PaymentExecutor>,
        coordinator: RequestCoordinator,
        chain: Arc<dyn ChainGateway>,
        config: SchedulerConfig,
    ) -> Self {
        Self {
            repo,
            ledger,
            bus,
            monitor,
            sessions,
            executor,
            coordinator,
            chain,
            config,
            session_slot: RwLock::new(None),
            running: Arc::new(AtomicBool::new(false)),
        }
    }

    /// Make sure every catalog endpoint has a task on the queue.
    pub async fn seed_tasks(&self) -> AgentResult<()> {
        for endpoint in Endpoint::all() {
            if self.repo.get_task(endpoint).await?.is_none() {
                self.repo.upsert_task(&catalog::seed_task(endpoint)).await?;
                debug!(endpoint = %endpoint, "autonomy task seeded");
            }
        }
        Ok(())
    }

    /// Every task with its current score, for the queue snapshot surface.
    pub async fn queue_snapshot(&self) -> AgentResult<Vec<ScoredTask>> {
        let now = Utc::now();
        Ok(self
            .repo
            .list_tasks()
            .await?
            .into_iter()
            .map(|task| ScoredTask {
                score: task.score_at(now),
                task,
            })
            .collect())
    }

    /// Run one tick: pick and execute at most one task. Returns the
    /// endpoint that ran, if any.
    pub async fn tick(&self) -> AgentResult<Option<Endpoint>> {
        if let Err(e) = self.monitor.ensure_payments_active().await {
            debug!(error = %e, "tick skipped while payments are paused");
            return Ok(None);
        }

        let now = Utc::now();
        let tasks = self.repo.list_tasks().await?;
        let mut candidates: Vec<(f64, Endpoint)> = tasks
            .iter()
            .filter(|t| t.is_runnable_at(now))
            .map(|t| (t.score_at(now), t.endpoint))
            .filter(|(score, _)| *score >= self.config.min_run_score)
            .collect();

        if candidates.is_empty() {
            return Ok(None);
        }

        // Highest score first; ties break on the endpoint tag.
        candidates.sort_by(|(score_a, ep_a), (score_b, ep_b)| {
            score_b
                .partial_cmp(score_a)
                .unwrap_or(std::cmp::Ordering::Equal)
                .then_with(|| ep_a.as_str().cmp(ep_b.as_str()))
        });
        let (score, endpoint) = candidates[0];

        let task = match self.repo.try_lock_task(endpoint, now, score).await? {
            Some(task) => task,
            // Another runner took it between scoring and locking.
            None => return Ok(None),
        };

        info!(endpoint = %endpoint, score, "autonomy task selected");

        match self.run_task(endpoint).await {
            Ok(()) => {
                self.finish_success(task).await?;
                Ok(Some(endpoint))
            }
            Err(error) => {
                self.finish_failure(task, &error).await?;
                Ok(Some(endpoint))
            }
        }
    }

    /// Fetch → pay → fetch for one endpoint.
    async fn run_task(&self, endpoint: Endpoint) -> AgentResult<()> {
        match self.coordinator.request_or_advance(endpoint, None).await? {
            RequestOutcome::Fulfilled { .. } => Ok(()),
            RequestOutcome::Failed { request_id } => Err(AgentError::InvalidTransition(format!(
                "request {} is failed",
                request_id
            ))),
            RequestOutcome::PaymentRequired { request_id, .. } => {
                let session_id = self.ensure_session().await?;
                self.executor
                    .execute(&request_id, Some(&session_id))
                    .await?;
                match self
                    .coordinator
                    .request_or_advance(endpoint, Some(&request_id))
                    .await?
                {
                    RequestOutcome::Fulfilled { .. } => Ok(()),
                    other => Err(AgentError::InvalidTransition(format!(
                        "request {} did not fulfil after payment: {:?}",
                        request_id, other
                    ))),
                }
            }
        }
    }

    /// Reuse the scheduler's capability while it is usable; issue a new
    /// one once it expires or exhausts.
    async fn ensure_session(&self) -> AgentResult<String> {
        if let Some(id) = self.session_slot.read().await.clone() {
            if self.sessions.get_active(&id).await?.is_some() {
                return Ok(id);
            }
        }

        let wallet = self
            .chain
            .signer_pubkey()
            .unwrap_or_else(|_| "unconfigured".to_string());
        let session = self
            .sessions
            .issue(&wallet, "autonomy-scheduler", None, None, None)
            .await?;
        *self.session_slot.write().await = Some(session.id.clone());
        Ok(session.id)
    }

    async fn finish_success(&self, mut task: AutonomyTask) -> AgentResult<()> {
        let now = Utc::now();
        task.complete_success(now);
        self.repo.update_task(&task).await?;

        self.ledger
            .append(
                LedgerEntry::autonomy("task-success").with_metadata(serde_json::json!({
                    "endpoint": task.endpoint.as_str(),
                    "score": task.last_score,
                    "nextEligibleAt": task.next_eligible_at,
                })),
            )
            .await?;
        self.publish_queue_update(&task);
        info!(endpoint = %task.endpoint, "autonomy task succeeded");
        Ok(())
    }

    async fn finish_failure(&self, mut task: AutonomyTask, error: &AgentError) -> AgentResult<()> {
        let now = Utc::now();
        task.complete_failure(now, error.to_string(), self.config.max_backoff_secs);
        self.repo.update_task(&task).await?;

        self.ledger
            .append(
                LedgerEntry::autonomy("task-failure").with_metadata(serde_json::json!({
                    "endpoint": task.endpoint.as_str(),
                    "error": error.to_string(),
                    "failureCount": task.failure_count,
                    "nextEligibleAt": task.next_eligible_at,
                })),
            )
            .await?;
        self.publish_queue_update(&task);
        warn!(
            endpoint = %task.endpoint,
            failure_count = task.failure_count,
            error = %error,
            "autonomy task failed; backing off"
        );
        Ok(())
    }

    fn publish_queue_update(&self, task: &AutonomyTask) {
        self.bus.publish(AgentEvent::QueueUpdate {
            endpoint: task.endpoint.to_string(),
            status: task.status,
            failure_count: task.failure_count,
            next_eligible_at: task.next_eligible_at,
        });
    }

    /// Start the background tick loop.
    pub fn start(self: &Arc<Self>) {
        if self.running.swap(true, Ordering::SeqCst) {
            warn!("scheduler already running");
            return;
        }

        let scheduler = Arc::clone(self);
        tokio::spawn(async move {
            let interval_secs = scheduler.config.interval_secs.max(5);
            let mut ticker = interval(Duration::from_secs(interval_secs));
            info!(interval_secs, "autonomy scheduler started");
            while scheduler.running.load(Ordering::SeqCst) {
                ticker.tick().await;
                if !scheduler.running.load(Ordering::SeqCst) {
                    break;
                }
                if let Err(e) = scheduler.tick().await {
                    warn!(error = %e, "scheduler tick failed");
                }
            }
            info!("autonomy scheduler stopped");
        });
    }

    /// Stop the background tick loop.
    pub fn stop(&self) {
        self.running.store(false, Ordering::SeqCst);
    }

    /// Whether the loop is running.
    pub fn is_running(&self) -> bool {
        self.running.load(Ordering::SeqCst)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use rust_decimal_macros::dec;
    use tollgate_core::types::{LedgerCategory, LedgerFilter, TaskStatus};
    use tollgate_store::MemoryRepository;

    use crate::chain::FakeChain;
    use crate::facilitator::FacilitatorClient;

    struct Harness {
        repo: Arc<dyn Repository>,
        chain: Arc<FakeChain>,
        scheduler: Arc<AutonomyScheduler>,
        monitor: Arc<BalanceMonitor>,
    }

    fn harness(lamports: u64) -> Harness {
        let repo: Arc<dyn Repository> = Arc::new(MemoryRepository::new());
        let bus = EventBus::default();
        let ledger = Ledger::new(repo.clone(), bus.clone());
        let chain = Arc::new(FakeChain::with_lamports(lamports));
        let monitor = Arc::new(BalanceMonitor::new(
            repo.clone(),
            ledger.clone(),
            bus.clone(),
            chain.clone(),
            dec!(0.05),
            30,
        ));
        let sessions = SessionRegistry::new(repo.clone(), ledger.clone(), 3, 3600);
        let facilitator =
            FacilitatorClient::new("http://192.0.2.1:9", None, 1, ledger.clone()).unwrap();
        let coordinator = RequestCoordinator::new(
            repo.clone(),
            ledger.clone(),
            bus.clone(),
            "https://facilitator.test",
        );
        let executor = Arc::new(PaymentExecutor::new(
            repo.clone(),
            ledger.clone(),
            bus.clone(),
            chain.clone(),
            monitor.clone(),
            sessions.clone(),
            facilitator,
            Some("Recipient111111111111111111111111111111111".to_string()),
        ));
        let scheduler = Arc::new(AutonomyScheduler::new(
            repo.clone(),
            ledger,
            bus,
            monitor.clone(),
            sessions,
            executor,
            coordinator,
            chain.clone(),
            SchedulerConfig {
                interval_secs: 5,
                min_run_score: 0.5,
                max_backoff_secs: 900,
            },
        ));
        Harness {
            repo,
            chain,
            scheduler,
            monitor,
        }
    }

    async fn autonomy_events(repo: &Arc<dyn Repository>) -> Vec<String> {
        let filter = LedgerFilter {
            category: Some(LedgerCategory::Autonomy),
            ..Default::default()
        };
        repo.scan_ledger(&filter, 100, None)
            .await
            .unwrap()
            .entries
            .into_iter()
            .map(|e| e.event)
            .collect()
    }

    #[tokio::test]
    async fn test_tick_runs_best_task_end_to_end() {
        // 2 units of headroom
        let h = harness(2_000_000_000);
        h.scheduler.seed_tasks().await.unwrap();

        // Both seeds score 400 before their first run; the tie breaks
        // lexicographically to knowledge.
        let ran = h.scheduler.tick().await.unwrap();
        assert_eq!(ran, Some(Endpoint::Knowledge));

        let task = h.repo.get_task(Endpoint::Knowledge).await.unwrap().unwrap();
        assert_eq!(task.status, TaskStatus::Idle);
        assert!(task.last_success_at.is_some());
        assert_eq!(task.failure_count, 0);

        let events = autonomy_events(&h.repo).await;
        assert_eq!(events, vec!["task-success".to_string()]);

        // One payment went out for it.
        assert_eq!(h.chain.transfers().await.len(), 1);
    }

    #[tokio::test]
    async fn test_tick_skips_while_paused() {
        let h = harness(10_000_000); // 0.01, under threshold
        h.scheduler.seed_tasks().await.unwrap();
        h.monitor.poll_once().await.unwrap();

        let ran = h.scheduler.tick().await.unwrap();
        assert_eq!(ran, None);
        assert!(autonomy_events(&h.repo).await.is_empty());
        assert!(h.chain.transfers().await.is_empty());
    }

    #[tokio::test]
    async fn test_failure_backs_off_exponentially() {
        let h = harness(2_000_000_000);
        h.scheduler.seed_tasks().await.unwrap();

        // Force three consecutive failures for the best task.
        let mut deltas = Vec::new();
        for _ in 0..3 {
            h.chain
                .fail_next_transfer(AgentError::ChainRejected("node down".into()))
                .await;
            let before = Utc::now();
            h.scheduler.tick().await.unwrap();
            let task = h.repo.get_task(Endpoint::Knowledge).await.unwrap().unwrap();
            assert_eq!(task.status, TaskStatus::Backoff);
            deltas.push((task.next_eligible_at - before).num_seconds());

            // Clear the backoff so the next tick can pick it again.
            let mut unblocked = task.clone();
            unblocked.next_eligible_at = Utc::now();
            unblocked.status = TaskStatus::Backoff;
            h.repo.update_task(&unblocked).await.unwrap();
        }

        // 30, 60, 120 within a second of slack.
        assert!((29..=31).contains(&deltas[0]), "got {:?}", deltas);
        assert!((59..=61).contains(&deltas[1]), "got {:?}", deltas);
        assert!((119..=121).contains(&deltas[2]), "got {:?}", deltas);

        let task = h.repo.get_task(Endpoint::Knowledge).await.unwrap().unwrap();
        assert_eq!(task.failure_count, 3);
        assert!(task.last_error.is_some());

        let events = autonomy_events(&h.repo).await;
        assert_eq!(events.iter().filter(|e| *e == "task-failure").count(), 3);
    }

    #[tokio::test]
    async fn test_success_after_failures_resets() {
        let h = harness(2_000_000_000);
        h.scheduler.seed_tasks().await.unwrap();

        h.chain
            .fail_next_transfer(AgentError::ChainRejected("blip".into()))
            .await;
        h.scheduler.tick().await.unwrap();

        let mut task = h.repo.get_task(Endpoint::Knowledge).await.unwrap().unwrap();
        assert_eq!(task.failure_count, 1);
        task.next_eligible_at = Utc::now();
        h.repo.update_task(&task).await.unwrap();

        h.scheduler.tick().await.unwrap();
        let task = h.repo.get_task(Endpoint::Knowledge).await.unwrap().unwrap();
        assert_eq!(task.failure_count, 0);
        assert_eq!(task.status, TaskStatus::Idle);
    }

    #[tokio::test]
    async fn test_session_reuse_across_ticks() {
        let h = harness(5_000_000_000);
        h.scheduler.seed_tasks().await.unwrap();

        h.scheduler.tick().await.unwrap();
        // Unblock the remaining task and run again.
        h.scheduler.tick().await.unwrap();

        // Two payments, one scheduler session (budget 3 covers both).
        assert_eq!(h.chain.transfers().await.len(), 2);
        let sessions = h.repo.list_sessions().await.unwrap();
        assert_eq!(sessions.len(), 1);
        assert_eq!(sessions[0].signatures_used, 2);
    }

    #[tokio::test]
    async fn test_queue_snapshot_scores_everything() {
        let h = harness(2_000_000_000);
        h.scheduler.seed_tasks().await.unwrap();

        let snapshot = h.scheduler.queue_snapshot().await.unwrap();
        assert_eq!(snapshot.len(), 2);
        assert!(snapshot.iter().all(|s| s.score > 0.0));
    }
}
