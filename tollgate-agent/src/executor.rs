//! Payment executor.
//!
//! Drives one payment attempt end to end: gate check, request load,
//! signer and session resolution, lamport conversion, chain transfer,
//! then the commit fan-out (payment row, request transition, session
//! usage, balance read-back, ledger, bus, best-effort facilitator
//! submit). The executor never retries; the scheduler owns retry policy
//! so every attempt is a distinct, observable event.
//!
//! Failure handling is audit-first. A validation failure (gate closed,
//! unknown request, no signer, invalid session) propagates without
//! touching payment storage. A failure once the chain attempt has begun
//! records a FAILED payment row under a marked synthetic hash plus a
//! `PAYMENT:failed` ledger entry before propagating, which keeps a
//! timed-out transfer reconcilable by a later facilitator callback. A
//! duplicate signature from a deduplicating node resolves to the
//! existing row instead of failing.

use std::sync::Arc;

use rust_decimal::Decimal;
use tracing::{debug, info, warn};

use tollgate_core::error::{AgentError, AgentResult};
use tollgate_core::events::{AgentEvent, EventBus};
use tollgate_core::types::{LedgerEntry, Payment, PaymentStatus, PremiumRequest, RequestStatus};
use tollgate_store::{Ledger, Repository};

use crate::balance::BalanceMonitor;
use crate::chain::{lamports_to_units, units_to_lamports, ChainGateway};
use crate::facilitator::{FacilitatorClient, VerificationSubmission};
use crate::session::SessionRegistry;

/// Attempts at attaching a confirmed payment to its request.
const ATTACH_ATTEMPTS: u32 = 3;

/// Result of one execute call
#[derive(Debug, Clone)]
pub enum ExecuteOutcome {
    /// Transfer confirmed and recorded
    Confirmed { tx_hash: String, balance: Decimal },
    /// The request was already fulfilled; nothing moved
    AlreadyFulfilled { tx_hash: Option<String> },
    /// The request is not payable (already paid or failed); nothing moved
    Noop { tx_hash: Option<String> },
}

/// Executes payments for premium requests
pub struct PaymentExecutor {
    repo: Arc<dyn Repository>,
    ledger: Ledger,
    bus: EventBus,
    chain: Arc<dyn ChainGateway>,
    monitor: Arc<BalanceMonitor>,
    sessions: SessionRegistry,
    facilitator: FacilitatorClient,
    recipient: Option<String>,
}

impl PaymentExecutor {
    #[allow(clippy::too_many_arguments)]
    pub fn new(
        repo: Arc<dyn Repository>,
        ledger: Ledger,
        bus: EventBus,
        chain: Arc<dyn ChainGateway>,
        monitor: Arc<BalanceMonitor>,
        sessions: SessionRegistry,
        facilitator: FacilitatorClient,
        recipient: Option<String>,
    ) -> Self {
        Self {
            repo,
            ledger,
            bus,
            chain,
            monitor,
            sessions,
            facilitator,
            recipient,
        }
    }

    /// Execute a payment for `request_id`, optionally under a session
    /// capability.
    pub async fn execute(
        &self,
        request_id: &str,
        session_id: Option<&str>,
    ) -> AgentResult<ExecuteOutcome> {
        self.monitor.ensure_payments_active().await?;

        let request = self
            .repo
            .get_request(request_id)
            .await?
            .ok_or_else(|| AgentError::RequestNotFound(request_id.to_string()))?;

        match request.status {
            RequestStatus::Fulfilled => {
                return Ok(ExecuteOutcome::AlreadyFulfilled {
                    tx_hash: request.payment_hash,
                })
            }
            RequestStatus::PaymentRequired => {}
            _ => {
                return Ok(ExecuteOutcome::Noop {
                    tx_hash: request.payment_hash,
                })
            }
        }

        // Signer and recipient must both resolve before anything moves.
        let _signer = self.chain.signer_pubkey()?;
        let recipient = self.recipient.clone().ok_or_else(|| {
            AgentError::Configuration("payment recipient public key is not set".to_string())
        })?;

        if let Some(id) = session_id {
            self.sessions.get_active(id).await?.ok_or_else(|| {
                AgentError::SessionInvalid(format!("session {} is not active", id))
            })?;
        }

        let lamports = units_to_lamports(request.amount)?;

        let tx_hash = match self.chain.transfer_from_signer(&recipient, lamports).await {
            Ok(signature) => signature,
            Err(error) => return Err(self.record_chain_failure(&request, error).await),
        };

        info!(
            request_id = %request.id,
            tx_hash = %tx_hash,
            lamports,
            "transfer confirmed"
        );

        let payment = Payment::confirmed(&request.id, &tx_hash, request.amount, &request.currency);
        match self.repo.create_payment(&payment).await {
            Ok(()) => {}
            Err(AgentError::DuplicatePayment(hash)) => {
                return self.reconcile_duplicate(&request, &hash).await;
            }
            Err(error) => {
                // The chain moved funds but the audit row could not be
                // written; leave a trace before giving up.
                let _ = self
                    .ledger
                    .append(
                        LedgerEntry::payment("orphaned")
                            .with_request_id(&request.id)
                            .with_tx_hash(&tx_hash)
                            .with_metadata(serde_json::json!({ "error": error.to_string() })),
                    )
                    .await;
                return Err(error);
            }
        }

        self.attach_payment(&request, &tx_hash).await?;

        if let Some(id) = session_id {
            if let Err(error) = self.sessions.increment_usage(id).await {
                // Usage accounting must not undo a committed payment.
                warn!(session_id = %id, error = %error, "session usage increment failed");
            }
        }

        let balance = self.read_back_balance().await;

        self.ledger
            .append(
                LedgerEntry::payment("confirmed")
                    .with_request_id(&request.id)
                    .with_payment_id(&payment.id)
                    .with_tx_hash(&tx_hash)
                    .with_metadata(serde_json::json!({
                        "amount": request.amount.to_string(),
                        "currency": request.currency,
                    })),
            )
            .await?;

        self.bus.publish(AgentEvent::PaymentStatus {
            payment_id: payment.id.clone(),
            request_id: request.id.clone(),
            tx_hash: tx_hash.clone(),
            status: PaymentStatus::Confirmed,
            failure_code: None,
        });

        let submission = VerificationSubmission {
            tx_hash: tx_hash.clone(),
            request_id: request.id.clone(),
            endpoint: request.endpoint.to_string(),
            amount: request.amount.to_string(),
            currency: request.currency.clone(),
        };
        if let Err(error) = self.facilitator.submit(&submission).await {
            // Best-effort: the chain already confirmed.
            debug!(tx_hash = %tx_hash, error = %error, "facilitator submit deferred to callback");
        }

        Ok(ExecuteOutcome::Confirmed { tx_hash, balance })
    }

    /// Record a chain-phase failure: FAILED row under a synthetic hash,
    /// `PAYMENT:failed` entry, FAILED bus event; then hand the error back.
    async fn record_chain_failure(&self, request: &PremiumRequest, error: AgentError) -> AgentError {
        let payment = Payment::failed(
            &request.id,
            request.amount,
            &request.currency,
            error.to_string(),
        );
        if let Err(persist_error) = self.repo.create_payment(&payment).await {
            warn!(
                request_id = %request.id,
                error = %persist_error,
                "failed payment row could not be written"
            );
        }

        let appended = self
            .ledger
            .append(
                LedgerEntry::payment("failed")
                    .with_request_id(&request.id)
                    .with_payment_id(&payment.id)
                    .with_tx_hash(&payment.tx_hash)
                    .with_metadata(serde_json::json!({ "error": error.to_string() })),
            )
            .await;
        if let Err(ledger_error) = appended {
            warn!(request_id = %request.id, error = %ledger_error, "failure entry not recorded");
        }

        self.bus.publish(AgentEvent::PaymentStatus {
            payment_id: payment.id,
            request_id: request.id.clone(),
            tx_hash: payment.tx_hash,
            status: PaymentStatus::Failed,
            failure_code: Some(error.to_string()),
        });

        error
    }

    /// A deduplicating node returned a signature that is already recorded:
    /// keep the existing row untouched and report what it says.
    async fn reconcile_duplicate(
        &self,
        request: &PremiumRequest,
        tx_hash: &str,
    ) -> AgentResult<ExecuteOutcome> {
        let existing = self
            .repo
            .find_payment_by_tx_hash(tx_hash)
            .await?
            .ok_or_else(|| {
                AgentError::Repository(format!(
                    "duplicate reported for {} but no payment found",
                    tx_hash
                ))
            })?;

        self.ledger
            .append(
                LedgerEntry::payment("duplicate-reconciled")
                    .with_request_id(&request.id)
                    .with_payment_id(&existing.id)
                    .with_tx_hash(tx_hash),
            )
            .await?;

        info!(tx_hash = %tx_hash, payment_id = %existing.id, "duplicate signature reconciled");

        match existing.status {
            PaymentStatus::Confirmed => {
                // A retried submission for this request can land here when
                // a prior attempt committed the payment row but stopped
                // before the request update; finish the attach so the
                // confirmed payment backs the request.
                if existing.request_id == request.id {
                    self.attach_payment(request, tx_hash).await?;
                }
                Ok(ExecuteOutcome::Confirmed {
                    tx_hash: tx_hash.to_string(),
                    balance: self.latest_balance().await,
                })
            }
            _ => Ok(ExecuteOutcome::Noop {
                tx_hash: Some(tx_hash.to_string()),
            }),
        }
    }

    /// Move the request to PAID with the signature pinned. A concurrent
    /// transition that makes this impossible leaves the payment in place
    /// and records `PAYMENT:orphaned`.
    async fn attach_payment(&self, request: &PremiumRequest, tx_hash: &str) -> AgentResult<()> {
        let mut current = request.clone();
        for attempt in 1..=ATTACH_ATTEMPTS {
            let mut updated = current.clone();
            if updated.mark_paid(tx_hash).is_err() {
                self.record_orphaned(&current.id, tx_hash, "request no longer payable")
                    .await;
                return Ok(());
            }
            match self.repo.update_request(&updated).await {
                Ok(_) => return Ok(()),
                Err(AgentError::RepositoryTransient(_)) if attempt < ATTACH_ATTEMPTS => {
                    current = self
                        .repo
                        .get_request(&request.id)
                        .await?
                        .ok_or_else(|| AgentError::RequestNotFound(request.id.clone()))?;
                }
                Err(error) => {
                    self.record_orphaned(&current.id, tx_hash, &error.to_string())
                        .await;
                    return Err(error);
                }
            }
        }
        self.record_orphaned(&request.id, tx_hash, "request update kept conflicting")
            .await;
        Err(AgentError::RepositoryTransient(format!(
            "request {} update kept conflicting",
            request.id
        )))
    }

    async fn record_orphaned(&self, request_id: &str, tx_hash: &str, detail: &str) {
        warn!(request_id, tx_hash, detail, "confirmed payment orphaned");
        let _ = self
            .ledger
            .append(
                LedgerEntry::payment("orphaned")
                    .with_request_id(request_id)
                    .with_tx_hash(tx_hash)
                    .with_metadata(serde_json::json!({ "detail": detail })),
            )
            .await;
    }

    /// Post-confirmation balance: the chain reading is authoritative and
    /// flows through the monitor's gate logic.
    async fn read_back_balance(&self) -> Decimal {
        match self.chain.balance_of_signer().await {
            Ok(lamports) => {
                let balance = lamports_to_units(lamports);
                if let Err(error) = self.monitor.ingest_payment_balance(balance).await {
                    warn!(error = %error, "post-payment snapshot not recorded");
                }
                balance
            }
            Err(error) => {
                warn!(error = %error, "post-payment balance read failed");
                self.latest_balance().await
            }
        }
    }

    async fn latest_balance(&self) -> Decimal {
        self.repo
            .latest_snapshot()
            .await
            .ok()
            .flatten()
            .map(|s| s.balance)
            .unwrap_or(Decimal::ZERO)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use rust_decimal_macros::dec;
    use tollgate_core::catalog::{self, Endpoint};
    use tollgate_core::types::{LedgerCategory, LedgerFilter};
    use tollgate_store::MemoryRepository;

    use crate::chain::FakeChain;

    struct Harness {
        repo: Arc<dyn Repository>,
        chain: Arc<FakeChain>,
        executor: PaymentExecutor,
        sessions: SessionRegistry,
        monitor: Arc<BalanceMonitor>,
        bus: EventBus,
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
        let facilitator = FacilitatorClient::new(
            // unreachable; submits fail fast and stay best-effort
            "http://192.0.2.1:9",
            None,
            1,
            ledger.clone(),
        )
        .unwrap();
        let executor = PaymentExecutor::new(
            repo.clone(),
            ledger,
            bus.clone(),
            chain.clone(),
            monitor.clone(),
            sessions.clone(),
            facilitator,
            Some("Recipient111111111111111111111111111111111".to_string()),
        );
        Harness {
            repo,
            chain,
            executor,
            sessions,
            monitor,
            bus,
        }
    }

    async fn seeded_request(repo: &Arc<dyn Repository>) -> PremiumRequest {
        let offering = catalog::offering(Endpoint::Market, "https://facilitator.test");
        let request = PremiumRequest::new(
            Endpoint::Market,
            offering.amount,
            offering.currency,
            offering.facilitator_url,
        );
        repo.create_request(&request).await.unwrap();
        request
    }

    async fn payment_events(repo: &Arc<dyn Repository>) -> Vec<String> {
        let filter = LedgerFilter {
            category: Some(LedgerCategory::Payment),
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
    async fn test_happy_path_confirms_and_decreases_balance() {
        // 0.2 units of headroom
        let h = harness(200_000_000);
        let request = seeded_request(&h.repo).await;

        let outcome = h.executor.execute(&request.id, None).await.unwrap();
        let (tx_hash, balance) = match outcome {
            ExecuteOutcome::Confirmed { tx_hash, balance } => (tx_hash, balance),
            other => panic!("expected confirmation, got {:?}", other),
        };
        assert_eq!(tx_hash.len(), 64);
        assert_eq!(balance, dec!(0.15));

        let stored = h.repo.get_request(&request.id).await.unwrap().unwrap();
        assert_eq!(stored.status, RequestStatus::Paid);
        assert_eq!(stored.payment_hash.as_deref(), Some(tx_hash.as_str()));

        let payment = h
            .repo
            .find_payment_by_tx_hash(&tx_hash)
            .await
            .unwrap()
            .unwrap();
        assert_eq!(payment.status, PaymentStatus::Confirmed);
        assert!(payment.confirmed_at.is_some());

        let events = payment_events(&h.repo).await;
        assert!(events.contains(&"confirmed".to_string()));
    }

    #[tokio::test]
    async fn test_paused_gate_blocks_execution() {
        let h = harness(10_000_000); // 0.01, below threshold
        let request = seeded_request(&h.repo).await;
        h.monitor.poll_once().await.unwrap();

        let err = h.executor.execute(&request.id, None).await.unwrap_err();
        assert!(matches!(err, AgentError::PaymentsPaused { .. }));
        assert!(h.chain.transfers().await.is_empty());
    }

    #[tokio::test]
    async fn test_unknown_request() {
        let h = harness(200_000_000);
        let err = h.executor.execute("req:missing", None).await.unwrap_err();
        assert!(matches!(err, AgentError::RequestNotFound(_)));
    }

    #[tokio::test]
    async fn test_session_exhaustion_blocks_second_run() {
        let h = harness(1_000_000_000);
        let session = h
            .sessions
            .issue("wallet", "test", None, Some(1), None)
            .await
            .unwrap();

        let first = seeded_request(&h.repo).await;
        let outcome = h.executor.execute(&first.id, Some(&session.id)).await;
        assert!(matches!(outcome, Ok(ExecuteOutcome::Confirmed { .. })));

        let second = seeded_request(&h.repo).await;
        let err = h
            .executor
            .execute(&second.id, Some(&session.id))
            .await
            .unwrap_err();
        assert!(matches!(err, AgentError::SessionInvalid(_)));

        // Exactly one transfer went out, and the rejected run left no
        // payment audit entries behind.
        assert_eq!(h.chain.transfers().await.len(), 1);
        let confirmed_events = payment_events(&h.repo)
            .await
            .into_iter()
            .filter(|e| e == "confirmed" || e == "failed")
            .count();
        assert_eq!(confirmed_events, 1);
    }

    #[tokio::test]
    async fn test_chain_failure_records_failed_row() {
        let h = harness(1_000_000_000);
        let request = seeded_request(&h.repo).await;
        h.chain
            .fail_next_transfer(AgentError::ChainTimeout { waited_secs: 30 })
            .await;

        let mut rx = h.bus.subscribe();
        let err = h.executor.execute(&request.id, None).await.unwrap_err();
        assert!(matches!(err, AgentError::ChainTimeout { .. }));

        // FAILED row under a marked synthetic hash.
        let events = payment_events(&h.repo).await;
        assert!(events.contains(&"failed".to_string()));

        // The request is still payable.
        let stored = h.repo.get_request(&request.id).await.unwrap().unwrap();
        assert_eq!(stored.status, RequestStatus::PaymentRequired);

        // FAILED status went out on the bus.
        loop {
            match rx.recv().await.unwrap() {
                AgentEvent::PaymentStatus { status, tx_hash, .. } => {
                    assert_eq!(status, PaymentStatus::Failed);
                    assert!(tx_hash.starts_with("failed:"));
                    break;
                }
                _ => continue,
            }
        }
    }

    #[tokio::test]
    async fn test_duplicate_signature_attaches_same_request() {
        let h = harness(1_000_000_000);
        let request = seeded_request(&h.repo).await;

        // A prior attempt confirmed on chain and committed the payment
        // row, then stopped before the request update.
        let sig = h
            .chain
            .transfer_from_signer("Recipient111111111111111111111111111111111", 50_000_000)
            .await
            .unwrap();
        let payment = Payment::confirmed(&request.id, &sig, dec!(0.05), "USDC");
        h.repo.create_payment(&payment).await.unwrap();

        // The retry sees the node deduplicate to the same signature.
        h.chain.set_repeat_signature(true).await;
        let outcome = h.executor.execute(&request.id, None).await.unwrap();
        match outcome {
            ExecuteOutcome::Confirmed { tx_hash, .. } => assert_eq!(tx_hash, sig),
            other => panic!("expected confirmation, got {:?}", other),
        }

        // The reconciled payment now backs the request.
        let updated = h.repo.get_request(&request.id).await.unwrap().unwrap();
        assert_eq!(updated.status, RequestStatus::Paid);
        assert_eq!(updated.payment_hash.as_deref(), Some(sig.as_str()));

        // Still a single row, plus one reconciliation entry.
        let stored = h.repo.find_payment_by_tx_hash(&sig).await.unwrap().unwrap();
        assert_eq!(stored.id, payment.id);
        let events = payment_events(&h.repo).await;
        assert_eq!(
            events
                .iter()
                .filter(|e| *e == "duplicate-reconciled")
                .count(),
            1
        );
    }

    #[tokio::test]
    async fn test_duplicate_signature_reconciles_across_requests() {
        let h = harness(1_000_000_000);
        let first = seeded_request(&h.repo).await;
        let outcome = h.executor.execute(&first.id, None).await.unwrap();
        let tx_hash = match outcome {
            ExecuteOutcome::Confirmed { tx_hash, .. } => tx_hash,
            other => panic!("expected confirmation, got {:?}", other),
        };

        // The node now deduplicates: a second request sees the same
        // signature again.
        h.chain.set_repeat_signature(true).await;
        let second = seeded_request(&h.repo).await;
        let outcome = h.executor.execute(&second.id, None).await.unwrap();
        assert!(matches!(outcome, ExecuteOutcome::Confirmed { .. }));

        // No second row; the original payment and its request are
        // untouched; the other request gains no hash it never paid for.
        let payment = h
            .repo
            .find_payment_by_tx_hash(&tx_hash)
            .await
            .unwrap()
            .unwrap();
        assert_eq!(payment.request_id, first.id);

        let first_stored = h.repo.get_request(&first.id).await.unwrap().unwrap();
        assert_eq!(first_stored.status, RequestStatus::Paid);
        assert_eq!(first_stored.payment_hash.as_deref(), Some(tx_hash.as_str()));

        let second_stored = h.repo.get_request(&second.id).await.unwrap().unwrap();
        assert_eq!(second_stored.status, RequestStatus::PaymentRequired);
        assert!(second_stored.payment_hash.is_none());

        let events = payment_events(&h.repo).await;
        assert_eq!(
            events
                .iter()
                .filter(|e| *e == "duplicate-reconciled")
                .count(),
            1
        );
    }

    #[tokio::test]
    async fn test_fulfilled_request_is_already_fulfilled() {
        let h = harness(1_000_000_000);
        let mut request = seeded_request(&h.repo).await;
        request.mark_paid("sig-done").unwrap();
        request
            .mark_fulfilled(catalog::payload(Endpoint::Market))
            .unwrap();
        let request = h.repo.update_request(&request).await.unwrap();

        let outcome = h.executor.execute(&request.id, None).await.unwrap();
        match outcome {
            ExecuteOutcome::AlreadyFulfilled { tx_hash } => {
                assert_eq!(tx_hash.as_deref(), Some("sig-done"))
            }
            other => panic!("expected already-fulfilled, got {:?}", other),
        }
        assert!(h.chain.transfers().await.is_empty());
    }

    #[tokio::test]
    async fn test_paid_request_is_noop() {
        let h = harness(1_000_000_000);
        let mut request = seeded_request(&h.repo).await;
        request.mark_paid("sig-done").unwrap();
        let request = h.repo.update_request(&request).await.unwrap();

        let outcome = h.executor.execute(&request.id, None).await.unwrap();
        assert!(matches!(outcome, ExecuteOutcome::Noop { .. }));
        assert!(h.chain.transfers().await.is_empty());
    }
}
