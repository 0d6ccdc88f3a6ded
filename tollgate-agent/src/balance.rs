//! Balance monitor and payment gate.
//!
//! Polls the signer's wallet on an interval, records every sample as a
//! snapshot, and drives the singleton pause/resume gate from the derived
//! status. The gate transitions are edge-triggered: the first LOW sample
//! pauses and writes `payments-paused`, the first OK sample after a
//! low-balance pause resumes and writes `payments-resumed`; repeats of
//! the same condition change nothing. A failed sample never moves the
//! gate.
//!
//! Every payment submission path calls [`BalanceMonitor::ensure_payments_active`]
//! before touching the chain; a pause committed by this monitor is
//! visible to the very next call.

use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::Arc;
use std::time::Duration;

use chrono::{DateTime, Utc};
use rust_decimal::Decimal;
use tokio::time::interval;
use tracing::{debug, info, warn};

use tollgate_core::error::{AgentError, AgentResult};
use tollgate_core::events::{AgentEvent, EventBus};
use tollgate_core::types::{
    BalanceSnapshot, BalanceSource, BalanceStatus, LedgerEntry, PauseReason,
};
use tollgate_store::{Ledger, Repository};

use crate::chain::{lamports_to_units, ChainGateway};

/// Current gate and balance view
#[derive(Debug, Clone)]
pub struct BalanceView {
    pub balance: Decimal,
    pub status: BalanceStatus,
    pub threshold: Decimal,
    pub paused: bool,
    pub pause_reason: Option<PauseReason>,
    pub last_updated: Option<DateTime<Utc>>,
}

/// Wallet poller and payment gate
pub struct BalanceMonitor {
    repo: Arc<dyn Repository>,
    ledger: Ledger,
    bus: EventBus,
    chain: Arc<dyn ChainGateway>,
    threshold: Decimal,
    poll_interval_secs: u64,
    running: Arc<AtomicBool>,
}

impl BalanceMonitor {
    pub fn new(
        repo: Arc<dyn Repository>,
        ledger: Ledger,
        bus: EventBus,
        chain: Arc<dyn ChainGateway>,
        threshold: Decimal,
        poll_interval_secs: u64,
    ) -> Self {
        Self {
            repo,
            ledger,
            bus,
            chain,
            threshold,
            poll_interval_secs: poll_interval_secs.max(5),
            running: Arc::new(AtomicBool::new(false)),
        }
    }

    /// Configured pause threshold.
    pub fn threshold(&self) -> Decimal {
        self.threshold
    }

    /// Take one sample and run it through the gate.
    pub async fn poll_once(&self) -> AgentResult<BalanceSnapshot> {
        let snapshot = match self.chain.balance_of_signer().await {
            Ok(lamports) => BalanceSnapshot::sampled(
                lamports_to_units(lamports),
                self.threshold,
                BalanceSource::Poll,
            ),
            Err(e) => {
                warn!(error = %e, "balance sample failed");
                BalanceSnapshot::errored(self.threshold, BalanceSource::Poll)
            }
        };
        self.ingest(snapshot.clone()).await?;
        Ok(snapshot)
    }

    /// Record a snapshot and apply its status to the gate. Also the entry
    /// point for post-payment read-backs and seeded fixtures.
    pub async fn ingest(&self, snapshot: BalanceSnapshot) -> AgentResult<()> {
        self.repo.insert_snapshot(&snapshot).await?;
        self.bus.publish(AgentEvent::from_snapshot(&snapshot));

        let mut state = self.repo.get_system_state().await?;
        match snapshot.status {
            BalanceStatus::Low => {
                if !state.payments_paused {
                    state.pause(PauseReason::LowBalance);
                    self.repo.put_system_state(&state).await?;
                    self.ledger
                        .append(
                            LedgerEntry::system("payments-paused").with_metadata(
                                serde_json::json!({
                                    "reason": PauseReason::LowBalance,
                                    "balance": snapshot.balance.to_string(),
                                    "threshold": self.threshold.to_string(),
                                }),
                            ),
                        )
                        .await?;
                    info!(
                        balance = %snapshot.balance,
                        threshold = %self.threshold,
                        "payments paused on low balance"
                    );
                }
            }
            BalanceStatus::Ok => {
                if state.payments_paused && state.pause_reason == Some(PauseReason::LowBalance) {
                    state.resume();
                    self.repo.put_system_state(&state).await?;
                    self.ledger
                        .append(
                            LedgerEntry::system("payments-resumed").with_metadata(
                                serde_json::json!({
                                    "balance": snapshot.balance.to_string(),
                                    "threshold": self.threshold.to_string(),
                                }),
                            ),
                        )
                        .await?;
                    info!(balance = %snapshot.balance, "payments resumed");
                }
            }
            BalanceStatus::Error => {
                debug!("errored sample leaves the gate unchanged");
            }
            BalanceStatus::Unknown => {}
        }
        Ok(())
    }

    /// Record a post-payment balance read-back.
    pub async fn ingest_payment_balance(&self, balance: Decimal) -> AgentResult<()> {
        self.ingest(BalanceSnapshot::sampled(
            balance,
            self.threshold,
            BalanceSource::Payment,
        ))
        .await
    }

    /// Fail with `PaymentsPaused` while the gate is closed.
    pub async fn ensure_payments_active(&self) -> AgentResult<()> {
        let state = self.repo.get_system_state().await?;
        if state.payments_paused {
            let balance = self
                .repo
                .latest_snapshot()
                .await?
                .map(|s| s.balance)
                .unwrap_or(Decimal::ZERO);
            return Err(AgentError::PaymentsPaused {
                reason: state.pause_reason.unwrap_or(PauseReason::LowBalance),
                balance,
                threshold: self.threshold,
            });
        }
        Ok(())
    }

    /// Gate and balance view for the API surface.
    pub async fn view(&self) -> AgentResult<BalanceView> {
        let state = self.repo.get_system_state().await?;
        let snapshot = self.repo.latest_snapshot().await?;
        Ok(BalanceView {
            balance: snapshot.as_ref().map(|s| s.balance).unwrap_or(Decimal::ZERO),
            status: snapshot
                .as_ref()
                .map(|s| s.status)
                .unwrap_or(BalanceStatus::Unknown),
            threshold: self.threshold,
            paused: state.payments_paused,
            pause_reason: state.pause_reason,
            last_updated: snapshot.map(|s| s.sampled_at),
        })
    }

    /// Start the background poll loop.
    pub fn start(self: &Arc<Self>) {
        if self.running.swap(true, Ordering::SeqCst) {
            warn!("balance monitor already running");
            return;
        }

        let monitor = Arc::clone(self);
        tokio::spawn(async move {
            let mut ticker = interval(Duration::from_secs(monitor.poll_interval_secs));
            info!(
                interval_secs = monitor.poll_interval_secs,
                "balance monitor started"
            );
            while monitor.running.load(Ordering::SeqCst) {
                ticker.tick().await;
                if !monitor.running.load(Ordering::SeqCst) {
                    break;
                }
                if let Err(e) = monitor.poll_once().await {
                    warn!(error = %e, "balance poll cycle failed");
                }
            }
            info!("balance monitor stopped");
        });
    }

    /// Stop the background poll loop.
    pub fn stop(&self) {
        self.running.store(false, Ordering::SeqCst);
    }

    /// Whether the loop is running.
    pub fn is_running(&self) -> bool {
        self.running.load(Ordering::SeqCst)
    }
}
