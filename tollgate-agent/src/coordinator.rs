//! Request coordinator.
//!
//! Owns the premium request lifecycle: creating a request from the
//! catalog offering when a client first asks, advancing PAID requests to
//! FULFILLED with the canonical payload, and reconciling facilitator
//! callbacks onto payments. All request transitions flow through here.

use std::sync::Arc;
use std::time::Duration;

use rust_decimal::Decimal;
use tracing::{debug, info};

use tollgate_core::catalog::{self, Endpoint};
use tollgate_core::error::{AgentError, AgentResult};
use tollgate_core::events::{AgentEvent, EventBus};
use tollgate_core::types::{
    LedgerEntry, Payment, PaymentStatus, PremiumRequest, RequestStatus,
};
use tollgate_store::{Ledger, Repository};

/// Reconciliation attempts on optimistic-lock conflicts.
const CALLBACK_ATTEMPTS: u32 = 3;
/// Linear delay between reconciliation attempts.
const CALLBACK_RETRY_DELAY: Duration = Duration::from_millis(150);

/// What a facilitator callback asserts about a payment
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum CallbackDisposition {
    /// The facilitator attests the payment is valid
    Confirmed,
    /// The facilitator rejects the payment
    Rejected,
}

/// Result of asking for an endpoint
#[derive(Debug, Clone)]
pub enum RequestOutcome {
    /// Data unlocked
    Fulfilled {
        request_id: String,
        data: serde_json::Value,
    },
    /// Payment instructions
    PaymentRequired {
        request_id: String,
        amount: Decimal,
        currency: String,
        facilitator_url: String,
    },
    /// The request failed terminally
    Failed { request_id: String },
}

/// Premium request lifecycle driver
#[derive(Clone)]
pub struct RequestCoordinator {
    repo: Arc<dyn Repository>,
    ledger: Ledger,
    bus: EventBus,
    facilitator_base_url: String,
}

impl RequestCoordinator {
    pub fn new(
        repo: Arc<dyn Repository>,
        ledger: Ledger,
        bus: EventBus,
        facilitator_base_url: impl Into<String>,
    ) -> Self {
        Self {
            repo,
            ledger,
            bus,
            facilitator_base_url: facilitator_base_url.into(),
        }
    }

    /// Ask for an endpoint, or advance an existing request. A client with
    /// no request id reuses the live request for the endpoint when one
    /// exists; only genuine creation emits `REQUEST:payment-required`.
    pub async fn request_or_advance(
        &self,
        endpoint: Endpoint,
        existing_id: Option<&str>,
    ) -> AgentResult<RequestOutcome> {
        let request = match existing_id {
            Some(id) => self
                .repo
                .get_request(id)
                .await?
                .ok_or_else(|| AgentError::RequestNotFound(id.to_string()))?,
            None => match self.repo.find_live_request(endpoint).await? {
                Some(live) => live,
                None => return self.create_request(endpoint).await,
            },
        };

        match request.status {
            RequestStatus::Fulfilled => {
                let data = request
                    .data
                    .clone()
                    .unwrap_or_else(|| catalog::payload(endpoint));
                Ok(RequestOutcome::Fulfilled {
                    request_id: request.id,
                    data,
                })
            }
            RequestStatus::Paid => self.fulfil(request).await,
            RequestStatus::PaymentRequired => Ok(RequestOutcome::PaymentRequired {
                request_id: request.id.clone(),
                amount: request.amount,
                currency: request.currency.clone(),
                facilitator_url: request.facilitator_url,
            }),
            RequestStatus::Failed => Ok(RequestOutcome::Failed {
                request_id: request.id,
            }),
        }
    }

    async fn create_request(&self, endpoint: Endpoint) -> AgentResult<RequestOutcome> {
        let offering = catalog::offering(endpoint, &self.facilitator_base_url);
        let request = PremiumRequest::new(
            endpoint,
            offering.amount,
            offering.currency,
            offering.facilitator_url.clone(),
        );
        self.repo.create_request(&request).await?;

        self.ledger
            .append(
                LedgerEntry::request("payment-required")
                    .with_request_id(&request.id)
                    .with_metadata(serde_json::json!({
                        "endpoint": endpoint.as_str(),
                        "amount": offering.amount.to_string(),
                        "currency": offering.currency,
                    })),
            )
            .await?;

        info!(request_id = %request.id, endpoint = %endpoint, "premium request created");

        Ok(RequestOutcome::PaymentRequired {
            request_id: request.id,
            amount: offering.amount,
            currency: offering.currency.to_string(),
            facilitator_url: offering.facilitator_url,
        })
    }

    /// PAID → FULFILLED with the canonical payload for the endpoint.
    async fn fulfil(&self, request: PremiumRequest) -> AgentResult<RequestOutcome> {
        let data = catalog::payload(request.endpoint);
        let mut current = request;
        for attempt in 1..=CALLBACK_ATTEMPTS {
            let mut updated = current.clone();
            updated.mark_fulfilled(data.clone())?;
            match self.repo.update_request(&updated).await {
                Ok(stored) => {
                    self.ledger
                        .append(
                            LedgerEntry::request("data-fulfilled")
                                .with_request_id(&stored.id)
                                .with_metadata(serde_json::json!({
                                    "endpoint": stored.endpoint.as_str(),
                                })),
                        )
                        .await?;
                    info!(request_id = %stored.id, "request fulfilled");
                    return Ok(RequestOutcome::Fulfilled {
                        request_id: stored.id,
                        data,
                    });
                }
                Err(AgentError::RepositoryTransient(_)) if attempt < CALLBACK_ATTEMPTS => {
                    current = self
                        .repo
                        .get_request(&updated.id)
                        .await?
                        .ok_or_else(|| AgentError::RequestNotFound(updated.id.clone()))?;
                    if current.status == RequestStatus::Fulfilled {
                        let data = current.data.clone().unwrap_or(data);
                        return Ok(RequestOutcome::Fulfilled {
                            request_id: current.id,
                            data,
                        });
                    }
                }
                Err(e) => return Err(e),
            }
        }
        Err(AgentError::RepositoryTransient(
            "request fulfilment kept conflicting".to_string(),
        ))
    }

    /// Terminally fail a request that can no longer be served.
    pub async fn fail_request(&self, id: &str, reason: &str) -> AgentResult<PremiumRequest> {
        for attempt in 1..=CALLBACK_ATTEMPTS {
            let mut request = self
                .repo
                .get_request(id)
                .await?
                .ok_or_else(|| AgentError::RequestNotFound(id.to_string()))?;
            request.mark_failed()?;
            match self.repo.update_request(&request).await {
                Ok(stored) => {
                    self.ledger
                        .append(
                            LedgerEntry::request("failed")
                                .with_request_id(id)
                                .with_metadata(serde_json::json!({ "reason": reason })),
                        )
                        .await?;
                    info!(request_id = %id, reason, "request failed");
                    return Ok(stored);
                }
                Err(AgentError::RepositoryTransient(_)) if attempt < CALLBACK_ATTEMPTS => {
                    tokio::time::sleep(CALLBACK_RETRY_DELAY).await;
                }
                Err(e) => return Err(e),
            }
        }
        Err(AgentError::RepositoryTransient(format!(
            "request {} failure kept conflicting",
            id
        )))
    }

    /// Apply an authenticated facilitator callback to the payment with
    /// `tx_hash`. Idempotent: re-applying the same terminal assertion adds
    /// a `facilitator-callback-duplicate` entry and changes nothing.
    pub async fn apply_facilitator_callback(
        &self,
        tx_hash: &str,
        disposition: CallbackDisposition,
        reason: Option<String>,
    ) -> AgentResult<Payment> {
        let payment = self
            .repo
            .find_payment_by_tx_hash(tx_hash)
            .await?
            .ok_or_else(|| AgentError::RequestNotFound(format!("payment for {}", tx_hash)))?;

        let target = match disposition {
            CallbackDisposition::Confirmed => PaymentStatus::Confirmed,
            CallbackDisposition::Rejected => PaymentStatus::Failed,
        };

        if payment.status == target
            && (target != PaymentStatus::Failed || payment.failure_code == reason)
        {
            self.ledger
                .append(
                    LedgerEntry::payment("facilitator-callback-duplicate")
                        .with_payment_id(&payment.id)
                        .with_request_id(&payment.request_id)
                        .with_tx_hash(tx_hash),
                )
                .await?;
            debug!(tx_hash, "duplicate facilitator callback ignored");
            return Ok(payment);
        }

        let updated = self
            .update_payment_with_retry(&payment.id, target, reason.clone())
            .await?;

        if target == PaymentStatus::Confirmed {
            self.advance_request_for_confirmation(&updated).await?;
        }

        self.ledger
            .append(
                LedgerEntry::payment("facilitator-callback")
                    .with_payment_id(&updated.id)
                    .with_request_id(&updated.request_id)
                    .with_tx_hash(tx_hash)
                    .with_metadata(serde_json::json!({
                        "status": match disposition {
                            CallbackDisposition::Confirmed => "confirmed",
                            CallbackDisposition::Rejected => "rejected",
                        },
                        "reason": reason,
                    })),
            )
            .await?;

        self.bus.publish(AgentEvent::PaymentStatus {
            payment_id: updated.id.clone(),
            request_id: updated.request_id.clone(),
            tx_hash: tx_hash.to_string(),
            status: updated.status,
            failure_code: updated.failure_code.clone(),
        });

        info!(tx_hash, status = ?updated.status, "facilitator callback applied");
        Ok(updated)
    }

    async fn update_payment_with_retry(
        &self,
        payment_id: &str,
        target: PaymentStatus,
        reason: Option<String>,
    ) -> AgentResult<Payment> {
        for attempt in 1..=CALLBACK_ATTEMPTS {
            let mut payment = self
                .repo
                .get_payment(payment_id)
                .await?
                .ok_or_else(|| AgentError::Repository(format!("payment {} lost", payment_id)))?;

            match target {
                PaymentStatus::Confirmed => payment.mark_confirmed()?,
                PaymentStatus::Failed => {
                    payment.mark_failed(reason.clone().unwrap_or_else(|| "rejected".to_string()))?
                }
                PaymentStatus::Pending => {
                    return Err(AgentError::InvalidTransition(
                        "callbacks cannot move a payment back to pending".to_string(),
                    ))
                }
            }

            match self.repo.update_payment(&payment).await {
                Ok(updated) => return Ok(updated),
                Err(AgentError::RepositoryTransient(_)) if attempt < CALLBACK_ATTEMPTS => {
                    tokio::time::sleep(CALLBACK_RETRY_DELAY).await;
                }
                Err(e) => return Err(e),
            }
        }
        Err(AgentError::RepositoryTransient(format!(
            "payment {} update kept conflicting",
            payment_id
        )))
    }

    /// A late confirmation also moves the owning request to PAID so the
    /// payment/request invariant holds.
    async fn advance_request_for_confirmation(&self, payment: &Payment) -> AgentResult<()> {
        for attempt in 1..=CALLBACK_ATTEMPTS {
            let request = match self.repo.get_request(&payment.request_id).await? {
                Some(request) => request,
                None => return Ok(()),
            };
            if request.status != RequestStatus::PaymentRequired {
                return Ok(());
            }
            let mut updated = request;
            if updated.mark_paid(&payment.tx_hash).is_err() {
                return Ok(());
            }
            match self.repo.update_request(&updated).await {
                Ok(_) => return Ok(()),
                Err(AgentError::RepositoryTransient(_)) if attempt < CALLBACK_ATTEMPTS => {
                    tokio::time::sleep(CALLBACK_RETRY_DELAY).await;
                }
                Err(e) => return Err(e),
            }
        }
        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use rust_decimal_macros::dec;
    use tollgate_core::types::{LedgerCategory, LedgerFilter};
    use tollgate_store::MemoryRepository;

    fn coordinator() -> (RequestCoordinator, Arc<dyn Repository>, EventBus) {
        let repo: Arc<dyn Repository> = Arc::new(MemoryRepository::new());
        let bus = EventBus::default();
        let ledger = Ledger::new(repo.clone(), bus.clone());
        (
            RequestCoordinator::new(
                repo.clone(),
                ledger,
                bus.clone(),
                "https://facilitator.test",
            ),
            repo,
            bus,
        )
    }

    async fn events(repo: &Arc<dyn Repository>, category: LedgerCategory) -> Vec<String> {
        let filter = LedgerFilter {
            category: Some(category),
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
    async fn test_first_ask_creates_payment_required() {
        let (coordinator, repo, _bus) = coordinator();

        let outcome = coordinator
            .request_or_advance(Endpoint::Market, None)
            .await
            .unwrap();
        match outcome {
            RequestOutcome::PaymentRequired {
                amount,
                currency,
                facilitator_url,
                ..
            } => {
                assert_eq!(amount, dec!(0.05));
                assert_eq!(currency, "USDC");
                assert!(facilitator_url.contains("/verify/market"));
            }
            other => panic!("expected payment-required, got {:?}", other),
        }

        let request_events = events(&repo, LedgerCategory::Request).await;
        assert_eq!(request_events, vec!["payment-required".to_string()]);
    }

    #[tokio::test]
    async fn test_repeat_ask_reuses_live_request() {
        let (coordinator, repo, _bus) = coordinator();

        let first = coordinator
            .request_or_advance(Endpoint::Market, None)
            .await
            .unwrap();
        let second = coordinator
            .request_or_advance(Endpoint::Market, None)
            .await
            .unwrap();

        let (id_a, id_b) = match (first, second) {
            (
                RequestOutcome::PaymentRequired { request_id: a, .. },
                RequestOutcome::PaymentRequired { request_id: b, .. },
            ) => (a, b),
            other => panic!("expected two payment-required outcomes, got {:?}", other),
        };
        assert_eq!(id_a, id_b);

        // Only the creation logged.
        let request_events = events(&repo, LedgerCategory::Request).await;
        assert_eq!(request_events.len(), 1);
    }

    #[tokio::test]
    async fn test_paid_request_fulfils_with_canonical_payload() {
        let (coordinator, repo, _bus) = coordinator();

        let outcome = coordinator
            .request_or_advance(Endpoint::Market, None)
            .await
            .unwrap();
        let request_id = match outcome {
            RequestOutcome::PaymentRequired { request_id, .. } => request_id,
            other => panic!("unexpected {:?}", other),
        };

        let mut request = repo.get_request(&request_id).await.unwrap().unwrap();
        request.mark_paid("sig-1").unwrap();
        repo.update_request(&request).await.unwrap();

        let outcome = coordinator
            .request_or_advance(Endpoint::Market, Some(&request_id))
            .await
            .unwrap();
        match outcome {
            RequestOutcome::Fulfilled { data, .. } => {
                assert!(data.get("prices").is_some());
                assert!(data.get("arbitrageSignals").is_some());
                assert!(data.get("sentiment").is_some());
            }
            other => panic!("expected fulfilled, got {:?}", other),
        }

        // Fulfilment is sticky and serves the stored payload.
        let outcome = coordinator
            .request_or_advance(Endpoint::Market, Some(&request_id))
            .await
            .unwrap();
        assert!(matches!(outcome, RequestOutcome::Fulfilled { .. }));

        let request_events = events(&repo, LedgerCategory::Request).await;
        assert_eq!(
            request_events
                .iter()
                .filter(|e| *e == "data-fulfilled")
                .count(),
            1
        );
    }

    #[tokio::test]
    async fn test_unknown_existing_id() {
        let (coordinator, _repo, _bus) = coordinator();
        let err = coordinator
            .request_or_advance(Endpoint::Market, Some("req:missing"))
            .await
            .unwrap_err();
        assert!(matches!(err, AgentError::RequestNotFound(_)));
    }

    #[tokio::test]
    async fn test_callback_confirms_timed_out_payment() {
        let (coordinator, repo, bus) = coordinator();
        let mut rx = bus.subscribe();

        // A request whose payment timed out: FAILED row, request still
        // awaiting payment.
        let outcome = coordinator
            .request_or_advance(Endpoint::Market, None)
            .await
            .unwrap();
        let request_id = match outcome {
            RequestOutcome::PaymentRequired { request_id, .. } => request_id,
            other => panic!("unexpected {:?}", other),
        };
        let mut payment = Payment::failed(&request_id, dec!(0.05), "USDC", "timeout");
        payment.tx_hash = "a".repeat(64);
        repo.create_payment(&payment).await.unwrap();

        let updated = coordinator
            .apply_facilitator_callback(&payment.tx_hash, CallbackDisposition::Confirmed, None)
            .await
            .unwrap();
        assert_eq!(updated.status, PaymentStatus::Confirmed);
        assert!(updated.confirmed_at.is_some());

        // The owning request advanced and pinned the hash.
        let request = repo.get_request(&request_id).await.unwrap().unwrap();
        assert_eq!(request.status, RequestStatus::Paid);
        assert_eq!(request.payment_hash.as_deref(), Some(payment.tx_hash.as_str()));

        // One callback entry, one CONFIRMED bus event.
        let payment_events = events(&repo, LedgerCategory::Payment).await;
        assert_eq!(
            payment_events
                .iter()
                .filter(|e| *e == "facilitator-callback")
                .count(),
            1
        );
        loop {
            match rx.recv().await.unwrap() {
                AgentEvent::PaymentStatus { status, .. } => {
                    assert_eq!(status, PaymentStatus::Confirmed);
                    break;
                }
                _ => continue,
            }
        }
    }

    #[tokio::test]
    async fn test_callback_idempotent() {
        let (coordinator, repo, _bus) = coordinator();

        let payment = Payment::confirmed("req:1", "b".repeat(64), dec!(0.05), "USDC");
        repo.create_payment(&payment).await.unwrap();

        let first = coordinator
            .apply_facilitator_callback(&payment.tx_hash, CallbackDisposition::Confirmed, None)
            .await
            .unwrap();
        let second = coordinator
            .apply_facilitator_callback(&payment.tx_hash, CallbackDisposition::Confirmed, None)
            .await
            .unwrap();
        assert_eq!(first.status, second.status);
        assert_eq!(first.confirmed_at, second.confirmed_at);

        let payment_events = events(&repo, LedgerCategory::Payment).await;
        assert_eq!(
            payment_events
                .iter()
                .filter(|e| *e == "facilitator-callback")
                .count(),
            0
        );
        assert_eq!(
            payment_events
                .iter()
                .filter(|e| *e == "facilitator-callback-duplicate")
                .count(),
            2
        );
    }

    #[tokio::test]
    async fn test_callback_unknown_tx() {
        let (coordinator, _repo, _bus) = coordinator();
        let err = coordinator
            .apply_facilitator_callback("missing", CallbackDisposition::Confirmed, None)
            .await
            .unwrap_err();
        assert!(matches!(err, AgentError::RequestNotFound(_)));
    }

    #[tokio::test]
    async fn test_failed_request_stays_failed() {
        let (coordinator, repo, _bus) = coordinator();

        let outcome = coordinator
            .request_or_advance(Endpoint::Knowledge, None)
            .await
            .unwrap();
        let request_id = match outcome {
            RequestOutcome::PaymentRequired { request_id, .. } => request_id,
            other => panic!("unexpected {:?}", other),
        };

        coordinator
            .fail_request(&request_id, "endpoint retired")
            .await
            .unwrap();

        let outcome = coordinator
            .request_or_advance(Endpoint::Knowledge, Some(&request_id))
            .await
            .unwrap();
        assert!(matches!(outcome, RequestOutcome::Failed { .. }));

        // Terminal means terminal.
        assert!(coordinator
            .fail_request(&request_id, "again")
            .await
            .is_err());

        let request_events = events(&repo, LedgerCategory::Request).await;
        assert_eq!(
            request_events.iter().filter(|e| *e == "failed").count(),
            1
        );
    }

    #[tokio::test]
    async fn test_callback_rejection_sets_failure_code() {
        let (coordinator, repo, _bus) = coordinator();

        let payment = Payment::pending("req:1", "c".repeat(64), dec!(0.05), "USDC");
        repo.create_payment(&payment).await.unwrap();

        let updated = coordinator
            .apply_facilitator_callback(
                &payment.tx_hash,
                CallbackDisposition::Rejected,
                Some("amount-mismatch".to_string()),
            )
            .await
            .unwrap();
        assert_eq!(updated.status, PaymentStatus::Failed);
        assert_eq!(updated.failure_code.as_deref(), Some("amount-mismatch"));
    }
}
