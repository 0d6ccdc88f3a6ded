//! Premium request lifecycle.
//!
//! One `PremiumRequest` captures a client intent to consume a premium
//! endpoint. Transitions run PAYMENT_REQUIRED → PAID → FULFILLED, with
//! FAILED reachable from any non-terminal state; terminal states reject
//! further mutation.

use chrono::{DateTime, Utc};
use rust_decimal::Decimal;
use serde::{Deserialize, Serialize};

use crate::catalog::Endpoint;
use crate::error::{AgentError, AgentResult};
use crate::ids;

/// Premium request status
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "SCREAMING_SNAKE_CASE")]
pub enum RequestStatus {
    /// Awaiting an on-chain payment
    PaymentRequired,
    /// Payment confirmed, data not yet attached
    Paid,
    /// Data payload attached; terminal
    Fulfilled,
    /// Terminal failure
    Failed,
}

impl RequestStatus {
    /// Terminal states reject all mutation.
    pub fn is_terminal(&self) -> bool {
        matches!(self, RequestStatus::Fulfilled | RequestStatus::Failed)
    }
}

/// One client intent to consume a premium endpoint
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct PremiumRequest {
    /// Request id
    pub id: String,
    /// Endpoint tag from the closed catalog
    pub endpoint: Endpoint,
    /// Lifecycle status
    pub status: RequestStatus,
    /// Quoted amount in whole currency units
    pub amount: Decimal,
    /// Currency tag
    pub currency: String,
    /// Facilitator verification URL
    pub facilitator_url: String,
    /// Confirmed chain signature; write-once
    pub payment_hash: Option<String>,
    /// Fulfilled data payload
    pub data: Option<serde_json::Value>,
    /// Creation time
    pub created_at: DateTime<Utc>,
    /// Last update time
    pub updated_at: DateTime<Utc>,
    /// Optimistic concurrency version
    pub version: u64,
}

impl PremiumRequest {
    /// Create a new request awaiting payment.
    pub fn new(
        endpoint: Endpoint,
        amount: Decimal,
        currency: impl Into<String>,
        facilitator_url: impl Into<String>,
    ) -> Self {
        let now = Utc::now();
        Self {
            id: ids::request_id(),
            endpoint,
            status: RequestStatus::PaymentRequired,
            amount,
            currency: currency.into(),
            facilitator_url: facilitator_url.into(),
            payment_hash: None,
            data: None,
            created_at: now,
            updated_at: now,
            version: 0,
        }
    }

    fn guard_mutable(&self) -> AgentResult<()> {
        if self.status.is_terminal() {
            return Err(AgentError::InvalidTransition(format!(
                "request {} is terminal ({:?})",
                self.id, self.status
            )));
        }
        Ok(())
    }

    /// PAYMENT_REQUIRED → PAID, pinning the chain signature.
    pub fn mark_paid(&mut self, payment_hash: impl Into<String>) -> AgentResult<()> {
        self.guard_mutable()?;
        if self.status != RequestStatus::PaymentRequired {
            return Err(AgentError::InvalidTransition(format!(
                "request {} cannot be paid from {:?}",
                self.id, self.status
            )));
        }
        if self.payment_hash.is_some() {
            return Err(AgentError::InvalidTransition(format!(
                "request {} already carries a payment hash",
                self.id
            )));
        }
        self.status = RequestStatus::Paid;
        self.payment_hash = Some(payment_hash.into());
        self.updated_at = Utc::now();
        Ok(())
    }

    /// PAID → FULFILLED, attaching the canonical payload.
    pub fn mark_fulfilled(&mut self, data: serde_json::Value) -> AgentResult<()> {
        self.guard_mutable()?;
        if self.status != RequestStatus::Paid {
            return Err(AgentError::InvalidTransition(format!(
                "request {} cannot be fulfilled from {:?}",
                self.id, self.status
            )));
        }
        self.status = RequestStatus::Fulfilled;
        self.data = Some(data);
        self.updated_at = Utc::now();
        Ok(())
    }

    /// Any non-terminal state → FAILED.
    pub fn mark_failed(&mut self) -> AgentResult<()> {
        self.guard_mutable()?;
        self.status = RequestStatus::Failed;
        self.updated_at = Utc::now();
        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use rust_decimal_macros::dec;

    fn request() -> PremiumRequest {
        PremiumRequest::new(
            Endpoint::Market,
            dec!(0.05),
            "USDC",
            "https://facilitator.test/verify/market",
        )
    }

    #[test]
    fn test_happy_path_transitions() {
        let mut req = request();
        assert_eq!(req.status, RequestStatus::PaymentRequired);

        req.mark_paid("sig-1").unwrap();
        assert_eq!(req.status, RequestStatus::Paid);
        assert_eq!(req.payment_hash.as_deref(), Some("sig-1"));

        req.mark_fulfilled(serde_json::json!({"ok": true})).unwrap();
        assert_eq!(req.status, RequestStatus::Fulfilled);
    }

    #[test]
    fn test_terminal_rejects_mutation() {
        let mut req = request();
        req.mark_failed().unwrap();
        assert!(req.mark_paid("sig").is_err());
        assert!(req.mark_failed().is_err());
    }

    #[test]
    fn test_payment_hash_write_once() {
        let mut req = request();
        req.mark_paid("sig-1").unwrap();
        // Paid state blocks a second mark_paid before the hash guard fires.
        assert!(req.mark_paid("sig-2").is_err());
        assert_eq!(req.payment_hash.as_deref(), Some("sig-1"));
    }

    #[test]
    fn test_fulfil_requires_paid() {
        let mut req = request();
        assert!(req.mark_fulfilled(serde_json::json!({})).is_err());
    }

    #[test]
    fn test_failed_reachable_from_paid() {
        let mut req = request();
        req.mark_paid("sig-1").unwrap();
        req.mark_failed().unwrap();
        assert_eq!(req.status, RequestStatus::Failed);
    }
}
