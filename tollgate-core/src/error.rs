//! Agent Error Types
//!
//! Classified failures shared by the store, agent and API crates.

use rust_decimal::Decimal;
use thiserror::Error;

use crate::types::system::PauseReason;

/// Tollgate agent error
#[derive(Error, Debug)]
pub enum AgentError {
    /// Premium request id is unknown
    #[error("request not found: {0}")]
    RequestNotFound(String),

    /// The payment gate is closed
    #[error("payments are paused: {reason}")]
    PaymentsPaused {
        reason: PauseReason,
        balance: Decimal,
        threshold: Decimal,
    },

    /// No custodial signer configured
    #[error("custodial signer unavailable")]
    SignerUnavailable,

    /// Session capability is expired, exhausted, revoked or unknown
    #[error("session invalid: {0}")]
    SessionInvalid(String),

    /// Chain RPC returned a hard error
    #[error("chain rejected transaction: {0}")]
    ChainRejected(String),

    /// Confirmation deadline exceeded
    #[error("chain confirmation timed out after {waited_secs}s")]
    ChainTimeout { waited_secs: u64 },

    /// Facilitator submit failed (best-effort path)
    #[error("facilitator unavailable: {0}")]
    FacilitatorUnavailable(String),

    /// Inbound facilitator callback signature mismatch
    #[error("facilitator signature invalid")]
    FacilitatorSignatureInvalid,

    /// Transaction hash uniqueness tripped
    #[error("duplicate payment for transaction {0}")]
    DuplicatePayment(String),

    /// Optimistic-lock conflict; safe to retry
    #[error("transient repository conflict: {0}")]
    RepositoryTransient(String),

    /// Repository failure
    #[error("repository error: {0}")]
    Repository(String),

    /// Entity state machine rejected the transition
    #[error("invalid state transition: {0}")]
    InvalidTransition(String),

    /// Configuration error
    #[error("configuration error: {0}")]
    Configuration(String),

    /// Serialization error
    #[error("serialization error: {0}")]
    Serialization(String),
}

/// Tollgate result type
pub type AgentResult<T> = Result<T, AgentError>;

impl From<serde_json::Error> for AgentError {
    fn from(e: serde_json::Error) -> Self {
        AgentError::Serialization(e.to_string())
    }
}

impl AgentError {
    /// Whether a retry at the same level may succeed.
    pub fn is_transient(&self) -> bool {
        matches!(
            self,
            AgentError::RepositoryTransient(_) | AgentError::ChainTimeout { .. }
        )
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use rust_decimal_macros::dec;

    #[test]
    fn test_paused_display_carries_reason() {
        let err = AgentError::PaymentsPaused {
            reason: PauseReason::LowBalance,
            balance: dec!(0.01),
            threshold: dec!(0.05),
        };
        assert!(err.to_string().contains("LOW_BALANCE"));
    }

    #[test]
    fn test_transient_classification() {
        assert!(AgentError::RepositoryTransient("version".into()).is_transient());
        assert!(AgentError::ChainTimeout { waited_secs: 30 }.is_transient());
        assert!(!AgentError::SignerUnavailable.is_transient());
    }
}
