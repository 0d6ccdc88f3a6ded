//! Sampled wallet balances.

use chrono::{DateTime, Utc};
use rust_decimal::Decimal;
use serde::{Deserialize, Serialize};

use crate::ids;

/// Derived balance status
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "SCREAMING_SNAKE_CASE")]
pub enum BalanceStatus {
    /// Balance at or above the threshold
    Ok,
    /// Balance below the threshold
    Low,
    /// The sample could not be taken
    Error,
    /// No sample yet
    Unknown,
}

/// Where a snapshot came from
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum BalanceSource {
    /// Periodic monitor poll
    Poll,
    /// Post-confirmation read-back after a payment
    Payment,
    /// Seeded by an operator or test fixture
    Seed,
}

/// One sampled wallet balance
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct BalanceSnapshot {
    /// Snapshot id
    pub id: String,
    /// Balance in whole currency units; zero when the sample failed
    pub balance: Decimal,
    /// Derived status
    pub status: BalanceStatus,
    /// Threshold the status was derived against
    pub threshold: Decimal,
    /// Sample origin
    pub source: BalanceSource,
    /// Sample time
    pub sampled_at: DateTime<Utc>,
}

impl BalanceSnapshot {
    /// Snapshot from a successful sample; LOW iff balance < threshold.
    pub fn sampled(balance: Decimal, threshold: Decimal, source: BalanceSource) -> Self {
        let status = if balance < threshold {
            BalanceStatus::Low
        } else {
            BalanceStatus::Ok
        };
        Self {
            id: ids::snapshot_id(),
            balance,
            status,
            threshold,
            source,
            sampled_at: Utc::now(),
        }
    }

    /// Snapshot recording a failed sample.
    pub fn errored(threshold: Decimal, source: BalanceSource) -> Self {
        Self {
            id: ids::snapshot_id(),
            balance: Decimal::ZERO,
            status: BalanceStatus::Error,
            threshold,
            source,
            sampled_at: Utc::now(),
        }
    }
}
