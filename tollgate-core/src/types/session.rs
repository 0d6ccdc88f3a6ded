//! Session capabilities: bounded, time-limited signing authority.

use chrono::{DateTime, Duration, Utc};
use serde::{Deserialize, Serialize};

use crate::error::{AgentError, AgentResult};
use crate::ids;

/// Session capability status
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "SCREAMING_SNAKE_CASE")]
pub enum SessionStatus {
    /// Usable for signing
    Active,
    /// Clock ran past the expiry; terminal
    Expired,
    /// Signature budget consumed; terminal
    Exhausted,
    /// Explicitly revoked; terminal
    Revoked,
}

/// Bounded authority to produce signatures on behalf of a wallet
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct SessionCapability {
    /// Capability id
    pub id: String,
    /// Wallet public key the capability signs for
    pub wallet_key: String,
    /// Caller-chosen session identifier
    pub session_key: String,
    /// Replay nonce
    pub nonce: String,
    /// Maximum signatures allowed
    pub max_signatures: u32,
    /// Signatures consumed so far
    pub signatures_used: u32,
    /// Status
    pub status: SessionStatus,
    /// Expiry instant
    pub expires_at: DateTime<Utc>,
    /// Creation time
    pub created_at: DateTime<Utc>,
    /// Optimistic concurrency version
    pub version: u64,
}

impl SessionCapability {
    /// Issue a fresh capability.
    pub fn issue(
        wallet_key: impl Into<String>,
        session_key: impl Into<String>,
        nonce: impl Into<String>,
        max_signatures: u32,
        ttl_secs: u64,
    ) -> Self {
        let now = Utc::now();
        Self {
            id: ids::session_id(),
            wallet_key: wallet_key.into(),
            session_key: session_key.into(),
            nonce: nonce.into(),
            max_signatures,
            signatures_used: 0,
            status: SessionStatus::Active,
            expires_at: now + Duration::seconds(ttl_secs as i64),
            created_at: now,
            version: 0,
        }
    }

    /// Expiry is derived from the clock on read.
    pub fn is_expired_at(&self, now: DateTime<Utc>) -> bool {
        now >= self.expires_at
    }

    /// Whether the capability can sign right now.
    pub fn is_usable_at(&self, now: DateTime<Utc>) -> bool {
        self.status == SessionStatus::Active
            && !self.is_expired_at(now)
            && self.signatures_used < self.max_signatures
    }

    /// Consume one signature. Hitting the budget flips to EXHAUSTED.
    pub fn consume_signature(&mut self) -> AgentResult<()> {
        if self.status != SessionStatus::Active {
            return Err(AgentError::SessionInvalid(format!(
                "session {} is {:?}",
                self.id, self.status
            )));
        }
        if self.signatures_used >= self.max_signatures {
            self.status = SessionStatus::Exhausted;
            return Err(AgentError::SessionInvalid(format!(
                "session {} signature budget exhausted",
                self.id
            )));
        }
        self.signatures_used += 1;
        if self.signatures_used >= self.max_signatures {
            self.status = SessionStatus::Exhausted;
        }
        Ok(())
    }

    /// Extend the expiry. Only an ACTIVE capability can be refreshed; the
    /// terminal states never reactivate.
    pub fn refresh(&mut self, ttl_secs: u64) -> AgentResult<()> {
        if self.status != SessionStatus::Active {
            return Err(AgentError::SessionInvalid(format!(
                "session {} is {:?} and not refreshable",
                self.id, self.status
            )));
        }
        self.expires_at = Utc::now() + Duration::seconds(ttl_secs as i64);
        Ok(())
    }

    /// Terminal transition to REVOKED.
    pub fn revoke(&mut self) {
        self.status = SessionStatus::Revoked;
    }
}
