//! Wire DTOs
//!
//! Request and response shapes for the HTTP surface. Monetary amounts go
//! out as JSON numbers; domain entities are mapped here rather than
//! serialized directly.

use chrono::{DateTime, Utc};
use rust_decimal::prelude::ToPrimitive;
use rust_decimal::Decimal;
use serde::{Deserialize, Serialize};

use tollgate_core::types::{
    BalanceStatus, LedgerEntry, PauseReason, SessionCapability, SessionStatus, TaskStatus,
};
use tollgate_agent::{BalanceView, ScoredTask};

pub(crate) fn to_number(amount: Decimal) -> f64 {
    amount.to_f64().unwrap_or(0.0)
}

// ==================== /request ====================

#[derive(Debug, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct RequestBody {
    pub endpoint: String,
    pub request_id: Option<String>,
}

#[derive(Debug, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct FulfilledResponse {
    pub status: &'static str,
    pub request_id: String,
    pub data: serde_json::Value,
}

#[derive(Debug, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct PaymentRequiredResponse {
    pub status: &'static str,
    pub request_id: String,
    pub amount: f64,
    pub currency: String,
    pub facilitator_url: String,
}

#[derive(Debug, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct FailedResponse {
    pub status: &'static str,
    pub request_id: String,
}

// ==================== /payments ====================

#[derive(Debug, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct ExecuteBody {
    pub request_id: String,
    pub session_id: Option<String>,
}

#[derive(Debug, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct ExecuteResponse {
    pub status: &'static str,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub tx_hash: Option<String>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub balance: Option<f64>,
}

#[derive(Debug, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct BalanceResponse {
    pub balance: f64,
    pub status: BalanceStatus,
    pub threshold: f64,
    pub paused: bool,
    pub pause_reason: Option<PauseReason>,
    pub last_updated: Option<DateTime<Utc>>,
}

impl From<BalanceView> for BalanceResponse {
    fn from(view: BalanceView) -> Self {
        Self {
            balance: to_number(view.balance),
            status: view.status,
            threshold: to_number(view.threshold),
            paused: view.paused,
            pause_reason: view.pause_reason,
            last_updated: view.last_updated,
        }
    }
}

#[derive(Debug, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct CallbackBody {
    pub tx_hash: String,
    pub status: String,
    pub reason: Option<String>,
}

#[derive(Debug, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct CallbackResponse {
    pub payment_id: String,
    pub tx_hash: String,
    pub status: String,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub failure_code: Option<String>,
}

// ==================== /logs/ledger ====================

#[derive(Debug, Default, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct LedgerQueryParams {
    pub limit: Option<usize>,
    pub cursor: Option<String>,
    pub category: Option<String>,
    pub event: Option<String>,
    pub request_id: Option<String>,
    pub payment_id: Option<String>,
    pub tx_hash: Option<String>,
    pub from: Option<DateTime<Utc>>,
    pub to: Option<DateTime<Utc>>,
}

#[derive(Debug, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct LedgerEntryDto {
    pub id: String,
    pub timestamp: DateTime<Utc>,
    pub category: String,
    pub event: String,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub request_id: Option<String>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub payment_id: Option<String>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub tx_hash: Option<String>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub metadata: Option<serde_json::Value>,
}

impl From<LedgerEntry> for LedgerEntryDto {
    fn from(entry: LedgerEntry) -> Self {
        Self {
            id: entry.id,
            timestamp: entry.timestamp,
            category: entry.category.as_str().to_string(),
            event: entry.event,
            request_id: entry.request_id,
            payment_id: entry.payment_id,
            tx_hash: entry.tx_hash,
            metadata: entry.metadata,
        }
    }
}

#[derive(Debug, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct LedgerPageResponse {
    pub items: Vec<LedgerEntryDto>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub next_cursor: Option<String>,
}

// ==================== /autonomy ====================

#[derive(Debug, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct QueueTaskDto {
    pub endpoint: String,
    pub status: TaskStatus,
    pub value_score: f64,
    pub cost: f64,
    pub freshness_window_secs: u64,
    pub base_backoff_secs: u64,
    pub failure_count: u32,
    pub score: f64,
    pub next_eligible_at: DateTime<Utc>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub last_run_at: Option<DateTime<Utc>>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub last_success_at: Option<DateTime<Utc>>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub last_error: Option<String>,
}

impl From<ScoredTask> for QueueTaskDto {
    fn from(scored: ScoredTask) -> Self {
        let task = scored.task;
        Self {
            endpoint: task.endpoint.to_string(),
            status: task.status,
            value_score: task.value_score,
            cost: task.cost,
            freshness_window_secs: task.freshness_window_secs,
            base_backoff_secs: task.base_backoff_secs,
            failure_count: task.failure_count,
            score: scored.score,
            next_eligible_at: task.next_eligible_at,
            last_run_at: task.last_run_at,
            last_success_at: task.last_success_at,
            last_error: task.last_error,
        }
    }
}

// ==================== /sessions ====================

#[derive(Debug, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct IssueSessionBody {
    pub wallet_key: String,
    pub session_key: String,
    pub nonce: Option<String>,
    pub max_signatures: Option<u32>,
    pub ttl_secs: Option<u64>,
}

#[derive(Debug, Deserialize, Default)]
#[serde(rename_all = "camelCase")]
pub struct RevokeSessionBody {
    pub reason: Option<String>,
}

#[derive(Debug, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct SessionDto {
    pub id: String,
    pub wallet_key: String,
    pub session_key: String,
    pub status: SessionStatus,
    pub max_signatures: u32,
    pub signatures_used: u32,
    pub expires_at: DateTime<Utc>,
    pub created_at: DateTime<Utc>,
}

impl From<SessionCapability> for SessionDto {
    fn from(session: SessionCapability) -> Self {
        Self {
            id: session.id,
            wallet_key: session.wallet_key,
            session_key: session.session_key,
            status: session.status,
            max_signatures: session.max_signatures,
            signatures_used: session.signatures_used,
            expires_at: session.expires_at,
            created_at: session.created_at,
        }
    }
}
