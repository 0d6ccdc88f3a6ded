//! Tollgate Agent - Payment Orchestration Core
//!
//! The autonomous side of the 402 convention: when a premium endpoint
//! demands payment, this crate pays on Solana devnet, waits for
//! confirmation, reconciles with the external facilitator, and unlocks
//! the data. Everything runs under a balance-driven circuit breaker,
//! bounded session capabilities, and an append-only audit ledger.
//!
//! # Architecture
//!
//! - **chain**: the [`chain::ChainGateway`] seam, its Solana JSON-RPC
//!   implementation, and a deterministic fake for tests
//! - **signer**: the custodial keypair and wire-format transfer builder
//! - **session**: bounded signing capabilities
//! - **balance**: wallet polling and the pause/resume payment gate
//! - **facilitator**: verification submits and HMAC callback checks
//! - **executor**: one payment attempt, end to end
//! - **coordinator**: the premium request state machine
//! - **scheduler**: the score-ranked autonomy loop
//!
//! [`AgentRuntime`] wires all of it from an [`AgentConfig`] and a
//! repository, and owns the background service lifecycle.

pub mod balance;
pub mod chain;
pub mod config;
pub mod coordinator;
pub mod executor;
pub mod facilitator;
pub mod scheduler;
pub mod session;
pub mod signer;

pub use balance::{BalanceMonitor, BalanceView};
pub use chain::{ChainGateway, FakeChain, SolanaGateway};
pub use config::{AgentConfig, Commitment, SolanaRpcConfig};
pub use coordinator::{CallbackDisposition, RequestCoordinator, RequestOutcome};
pub use executor::{ExecuteOutcome, PaymentExecutor};
pub use facilitator::{FacilitatorClient, VerificationSubmission};
pub use scheduler::{AutonomyScheduler, SchedulerConfig, ScoredTask};
pub use session::SessionRegistry;
pub use signer::Keypair;

use std::sync::Arc;

use chrono::Utc;
use tracing::info;

use tollgate_core::error::AgentResult;
use tollgate_core::events::{AgentEvent, EventBus};
use tollgate_store::{Ledger, Repository};

/// Fully wired agent
///
/// Construction is side-effect free; [`AgentRuntime::start_background_services`]
/// brings up the balance monitor and scheduler loops.
pub struct AgentRuntime {
    config: AgentConfig,
    repo: Arc<dyn Repository>,
    bus: EventBus,
    ledger: Ledger,
    monitor: Arc<BalanceMonitor>,
    sessions: SessionRegistry,
    facilitator: FacilitatorClient,
    executor: Arc<PaymentExecutor>,
    coordinator: RequestCoordinator,
    scheduler: Arc<AutonomyScheduler>,
}

impl AgentRuntime {
    /// Wire the runtime over an explicit chain gateway. Tests and local
    /// runs hand in a [`FakeChain`]; production hands in a
    /// [`SolanaGateway`] (see [`AgentRuntime::with_solana`]).
    pub fn new(
        config: AgentConfig,
        repo: Arc<dyn Repository>,
        chain: Arc<dyn ChainGateway>,
    ) -> AgentResult<Self> {
        let bus = EventBus::default();
        let ledger = Ledger::new(repo.clone(), bus.clone());

        let monitor = Arc::new(BalanceMonitor::new(
            repo.clone(),
            ledger.clone(),
            bus.clone(),
            chain.clone(),
            config.balance_threshold,
            config.balance_poll_interval_secs,
        ));

        let sessions = SessionRegistry::new(
            repo.clone(),
            ledger.clone(),
            config.session_max_signatures,
            config.session_expiry_secs,
        );

        let facilitator = FacilitatorClient::new(
            config.facilitator_base_url.clone(),
            config.facilitator_secret.clone(),
            config.facilitator_timeout_secs,
            ledger.clone(),
        )?;

        let executor = Arc::new(PaymentExecutor::new(
            repo.clone(),
            ledger.clone(),
            bus.clone(),
            chain.clone(),
            monitor.clone(),
            sessions.clone(),
            facilitator.clone(),
            config.recipient_pubkey.clone(),
        ));

        let coordinator = RequestCoordinator::new(
            repo.clone(),
            ledger.clone(),
            bus.clone(),
            config.facilitator_base_url.clone(),
        );

        let scheduler = Arc::new(AutonomyScheduler::new(
            repo.clone(),
            ledger.clone(),
            bus.clone(),
            monitor.clone(),
            sessions.clone(),
            executor.clone(),
            coordinator.clone(),
            chain,
            SchedulerConfig {
                interval_secs: config.autonomy_interval_secs,
                min_run_score: config.autonomy_min_run_score,
                max_backoff_secs: config.autonomy_max_backoff_secs,
            },
        ));

        Ok(Self {
            config,
            repo,
            bus,
            ledger,
            monitor,
            sessions,
            facilitator,
            executor,
            coordinator,
            scheduler,
        })
    }

    /// Wire the runtime against the real Solana RPC, resolving the
    /// custodial keypair from configuration.
    pub fn with_solana(config: AgentConfig, repo: Arc<dyn Repository>) -> AgentResult<Self> {
        let keypair = config
            .signer_private_key
            .as_deref()
            .map(Keypair::from_encoded)
            .transpose()?;
        let gateway = Arc::new(SolanaGateway::new(config.rpc.clone(), keypair)?);
        Self::new(config, repo, gateway)
    }

    /// Seed the autonomy queue and start the periodic loops.
    pub async fn start_background_services(&self) -> AgentResult<()> {
        self.scheduler.seed_tasks().await?;
        self.monitor.start();
        self.scheduler.start();
        self.bus.publish(AgentEvent::Bootstrap { at: Utc::now() });
        info!("agent background services started");
        Ok(())
    }

    /// Stop the periodic loops.
    pub fn stop_background_services(&self) {
        self.monitor.stop();
        self.scheduler.stop();
        info!("agent background services stopped");
    }

    /// Configuration the runtime was built with.
    pub fn config(&self) -> &AgentConfig {
        &self.config
    }

    /// The shared repository handle.
    pub fn repo(&self) -> &Arc<dyn Repository> {
        &self.repo
    }

    /// The event bus.
    pub fn bus(&self) -> &EventBus {
        &self.bus
    }

    /// The ledger service.
    pub fn ledger(&self) -> &Ledger {
        &self.ledger
    }

    /// The balance monitor and payment gate.
    pub fn monitor(&self) -> &Arc<BalanceMonitor> {
        &self.monitor
    }

    /// The session registry.
    pub fn sessions(&self) -> &SessionRegistry {
        &self.sessions
    }

    /// The facilitator client.
    pub fn facilitator(&self) -> &FacilitatorClient {
        &self.facilitator
    }

    /// The payment executor.
    pub fn executor(&self) -> &Arc<PaymentExecutor> {
        &self.executor
    }

    /// The request coordinator.
    pub fn coordinator(&self) -> &RequestCoordinator {
        &self.coordinator
    }

    /// The autonomy scheduler.
    pub fn scheduler(&self) -> &Arc<AutonomyScheduler> {
        &self.scheduler
    }
}
