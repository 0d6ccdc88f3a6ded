//! Payment attempts against a premium request.

use chrono::{DateTime, Utc};
use rust_decimal::Decimal;
use serde::{Deserialize, Serialize};

use crate::error::{AgentError, AgentResult};
use crate::ids;

/// Payment status
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "SCREAMING_SNAKE_CASE")]
pub enum PaymentStatus {
    /// Submitted, awaiting confirmation
    Pending,
    /// Confirmed on chain or by the facilitator
    Confirmed,
    /// Terminal failure
    Failed,
}

/// One attempt to satisfy a premium request
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct Payment {
    /// Payment id
    pub id: String,
    /// Owning premium request
    pub request_id: String,
    /// Chain signature or marked synthetic hash; globally unique
    pub tx_hash: String,
    /// Amount in whole currency units
    pub amount: Decimal,
    /// Currency tag
    pub currency: String,
    /// Status
    pub status: PaymentStatus,
    /// Failure code when status is FAILED
    pub failure_code: Option<String>,
    /// Confirmation time; set iff CONFIRMED
    pub confirmed_at: Option<DateTime<Utc>>,
    /// Creation time
    pub created_at: DateTime<Utc>,
    /// Optimistic concurrency version
    pub version: u64,
}

impl Payment {
    /// New pending payment.
    pub fn pending(
        request_id: impl Into<String>,
        tx_hash: impl Into<String>,
        amount: Decimal,
        currency: impl Into<String>,
    ) -> Self {
        Self {
            id: ids::payment_id(),
            request_id: request_id.into(),
            tx_hash: tx_hash.into(),
            amount,
            currency: currency.into(),
            status: PaymentStatus::Pending,
            failure_code: None,
            confirmed_at: None,
            created_at: Utc::now(),
            version: 0,
        }
    }

    /// New payment recorded directly as confirmed.
    pub fn confirmed(
        request_id: impl Into<String>,
        tx_hash: impl Into<String>,
        amount: Decimal,
        currency: impl Into<String>,
    ) -> Self {
        let mut payment = Self::pending(request_id, tx_hash, amount, currency);
        payment.status = PaymentStatus::Confirmed;
        payment.confirmed_at = Some(Utc::now());
        payment
    }

    /// New payment recorded directly as failed, with a marked synthetic
    /// hash preserving uniqueness.
    pub fn failed(
        request_id: impl Into<String>,
        amount: Decimal,
        currency: impl Into<String>,
        failure_code: impl Into<String>,
    ) -> Self {
        let mut payment = Self::pending(request_id, ids::synthetic_tx_hash(), amount, currency);
        payment.status = PaymentStatus::Failed;
        payment.failure_code = Some(failure_code.into());
        payment
    }

    /// PENDING|FAILED → CONFIRMED (facilitator reconciliation may flip a
    /// timed-out payment).
    pub fn mark_confirmed(&mut self) -> AgentResult<()> {
        if self.status == PaymentStatus::Confirmed {
            return Err(AgentError::InvalidTransition(format!(
                "payment {} already confirmed",
                self.id
            )));
        }
        self.status = PaymentStatus::Confirmed;
        self.failure_code = None;
        self.confirmed_at = Some(Utc::now());
        Ok(())
    }

    /// PENDING → FAILED with a failure code.
    pub fn mark_failed(&mut self, failure_code: impl Into<String>) -> AgentResult<()> {
        if self.status == PaymentStatus::Confirmed {
            return Err(AgentError::InvalidTransition(format!(
                "payment {} is confirmed; cannot fail",
                self.id
            )));
        }
        self.status = PaymentStatus::Failed;
        self.failure_code = Some(failure_code.into());
        Ok(())
    }
}
