//! Append-only ledger entries and their query model.

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};

use crate::ids;

/// Ledger category
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "SCREAMING_SNAKE_CASE")]
pub enum LedgerCategory {
    Request,
    Payment,
    Balance,
    System,
    Autonomy,
}

impl LedgerCategory {
    pub fn as_str(&self) -> &'static str {
        match self {
            LedgerCategory::Request => "REQUEST",
            LedgerCategory::Payment => "PAYMENT",
            LedgerCategory::Balance => "BALANCE",
            LedgerCategory::System => "SYSTEM",
            LedgerCategory::Autonomy => "AUTONOMY",
        }
    }

    pub fn parse(s: &str) -> Option<Self> {
        match s.to_uppercase().as_str() {
            "REQUEST" => Some(Self::Request),
            "PAYMENT" => Some(Self::Payment),
            "BALANCE" => Some(Self::Balance),
            "SYSTEM" => Some(Self::System),
            "AUTONOMY" => Some(Self::Autonomy),
            _ => None,
        }
    }
}

/// Immutable observability record
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct LedgerEntry {
    /// Entry id
    pub id: String,
    /// Record time
    pub timestamp: DateTime<Utc>,
    /// Category
    pub category: LedgerCategory,
    /// Event tag, free-form within the category
    pub event: String,
    /// Correlated premium request
    pub request_id: Option<String>,
    /// Correlated payment
    pub payment_id: Option<String>,
    /// Correlated chain transaction
    pub tx_hash: Option<String>,
    /// Structured metadata; opaque to the core
    pub metadata: Option<serde_json::Value>,
}

impl LedgerEntry {
    /// New entry with the given category and event tag.
    pub fn new(category: LedgerCategory, event: impl Into<String>) -> Self {
        Self {
            id: ids::ledger_id(),
            timestamp: Utc::now(),
            category,
            event: event.into(),
            request_id: None,
            payment_id: None,
            tx_hash: None,
            metadata: None,
        }
    }

    pub fn request(event: impl Into<String>) -> Self {
        Self::new(LedgerCategory::Request, event)
    }

    pub fn payment(event: impl Into<String>) -> Self {
        Self::new(LedgerCategory::Payment, event)
    }

    pub fn balance(event: impl Into<String>) -> Self {
        Self::new(LedgerCategory::Balance, event)
    }

    pub fn system(event: impl Into<String>) -> Self {
        Self::new(LedgerCategory::System, event)
    }

    pub fn autonomy(event: impl Into<String>) -> Self {
        Self::new(LedgerCategory::Autonomy, event)
    }

    pub fn with_request_id(mut self, id: impl Into<String>) -> Self {
        self.request_id = Some(id.into());
        self
    }

    pub fn with_payment_id(mut self, id: impl Into<String>) -> Self {
        self.payment_id = Some(id.into());
        self
    }

    pub fn with_tx_hash(mut self, hash: impl Into<String>) -> Self {
        self.tx_hash = Some(hash.into());
        self
    }

    pub fn with_metadata(mut self, metadata: serde_json::Value) -> Self {
        self.metadata = Some(metadata);
        self
    }
}

/// Conjunctive ledger query filter
#[derive(Debug, Clone, Default)]
pub struct LedgerFilter {
    pub category: Option<LedgerCategory>,
    pub event: Option<String>,
    pub request_id: Option<String>,
    pub payment_id: Option<String>,
    pub tx_hash: Option<String>,
    pub from: Option<DateTime<Utc>>,
    pub to: Option<DateTime<Utc>>,
}

impl LedgerFilter {
    /// Whether an entry passes every set clause.
    pub fn matches(&self, entry: &LedgerEntry) -> bool {
        if let Some(category) = self.category {
            if entry.category != category {
                return false;
            }
        }
        if let Some(event) = &self.event {
            if &entry.event != event {
                return false;
            }
        }
        if let Some(request_id) = &self.request_id {
            if entry.request_id.as_ref() != Some(request_id) {
                return false;
            }
        }
        if let Some(payment_id) = &self.payment_id {
            if entry.payment_id.as_ref() != Some(payment_id) {
                return false;
            }
        }
        if let Some(tx_hash) = &self.tx_hash {
            if entry.tx_hash.as_ref() != Some(tx_hash) {
                return false;
            }
        }
        if let Some(from) = self.from {
            if entry.timestamp < from {
                return false;
            }
        }
        if let Some(to) = self.to {
            if entry.timestamp > to {
                return false;
            }
        }
        true
    }
}

/// Position of the last entry a page ended on; newest-first scans resume
/// strictly after it.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub struct LedgerCursor {
    /// Timestamp of the boundary entry (milliseconds since epoch)
    pub timestamp_ms: i64,
    /// Insert sequence of the boundary entry
    pub seq: u64,
}

/// One page of ledger entries, newest-first
#[derive(Debug, Clone)]
pub struct LedgerPage {
    pub entries: Vec<LedgerEntry>,
    /// Present when more entries exist beyond this page
    pub next_cursor: Option<LedgerCursor>,
}
