//! Chain gateway.
//!
//! The seam between the orchestration core and the chain RPC. The
//! executor and balance monitor only see [`ChainGateway`]; the Solana
//! implementation lives in [`solana`], and [`fake`] provides the
//! deterministic in-process chain used by tests and local runs.

pub mod fake;
pub mod solana;

use async_trait::async_trait;
use rust_decimal::prelude::ToPrimitive;
use rust_decimal::Decimal;

use tollgate_core::error::{AgentError, AgentResult};

pub use fake::FakeChain;
pub use solana::{SolanaGateway, SolanaRpcClient};

/// Lamports per whole unit.
pub const LAMPORTS_PER_UNIT: u64 = 1_000_000_000;

/// Abstraction over the chain the agent pays on
#[async_trait]
pub trait ChainGateway: Send + Sync {
    /// The custodial signer's address, or `SignerUnavailable`.
    fn signer_pubkey(&self) -> AgentResult<String>;

    /// Current signer balance in lamports.
    async fn balance_of_signer(&self) -> AgentResult<u64>;

    /// Sign, submit and confirm a transfer; returns the chain signature.
    async fn transfer_from_signer(&self, recipient: &str, lamports: u64) -> AgentResult<String>;
}

/// Convert a whole-unit amount to lamports, rounding down but never below
/// one lamport for a positive amount.
pub fn units_to_lamports(amount: Decimal) -> AgentResult<u64> {
    if amount <= Decimal::ZERO {
        return Err(AgentError::ChainRejected(format!(
            "non-positive transfer amount: {}",
            amount
        )));
    }
    let lamports = (amount * Decimal::from(LAMPORTS_PER_UNIT))
        .floor()
        .to_u64()
        .ok_or_else(|| {
            AgentError::ChainRejected(format!("amount {} exceeds the lamport range", amount))
        })?;
    Ok(lamports.max(1))
}

/// Convert lamports to whole units.
pub fn lamports_to_units(lamports: u64) -> Decimal {
    Decimal::from(lamports) / Decimal::from(LAMPORTS_PER_UNIT)
}

#[cfg(test)]
mod tests {
    use super::*;
    use rust_decimal_macros::dec;

    #[test]
    fn test_units_to_lamports() {
        assert_eq!(units_to_lamports(dec!(0.05)).unwrap(), 50_000_000);
        assert_eq!(units_to_lamports(dec!(1)).unwrap(), LAMPORTS_PER_UNIT);
        // Sub-lamport amounts still move at least one lamport.
        assert_eq!(units_to_lamports(dec!(0.0000000001)).unwrap(), 1);
        assert!(units_to_lamports(Decimal::ZERO).is_err());
    }

    #[test]
    fn test_lamports_to_units_roundtrip() {
        assert_eq!(lamports_to_units(50_000_000), dec!(0.05));
        assert_eq!(units_to_lamports(lamports_to_units(123_456_789)).unwrap(), 123_456_789);
    }
}
