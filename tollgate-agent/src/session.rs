//! Session registry.
//!
//! Issues and tracks session capabilities, the bounded signing authority
//! every autonomous payment runs under. Reads derive EXPIRED/EXHAUSTED
//! transitions from the clock and the usage counter; writes go through
//! the repository's optimistic versioning, so a concurrent increment and
//! read-side transition cannot both win.

use std::sync::Arc;

use chrono::Utc;
use tracing::{debug, info};
use uuid::Uuid;

use tollgate_core::error::{AgentError, AgentResult};
use tollgate_core::types::{LedgerEntry, SessionCapability, SessionStatus};
use tollgate_store::{Ledger, Repository};

/// Attempts at a versioned update before giving up.
const UPDATE_ATTEMPTS: u32 = 3;

/// Issues and resolves session capabilities
#[derive(Clone)]
pub struct SessionRegistry {
    repo: Arc<dyn Repository>,
    ledger: Ledger,
    default_max_signatures: u32,
    default_ttl_secs: u64,
}

impl SessionRegistry {
    pub fn new(
        repo: Arc<dyn Repository>,
        ledger: Ledger,
        default_max_signatures: u32,
        default_ttl_secs: u64,
    ) -> Self {
        Self {
            repo,
            ledger,
            default_max_signatures,
            default_ttl_secs,
        }
    }

    /// Issue a new ACTIVE capability and record it in the ledger.
    pub async fn issue(
        &self,
        wallet_key: &str,
        session_key: &str,
        nonce: Option<String>,
        max_signatures: Option<u32>,
        ttl_secs: Option<u64>,
    ) -> AgentResult<SessionCapability> {
        let session = SessionCapability::issue(
            wallet_key,
            session_key,
            nonce.unwrap_or_else(|| Uuid::new_v4().to_string()),
            max_signatures.unwrap_or(self.default_max_signatures),
            ttl_secs.unwrap_or(self.default_ttl_secs),
        );
        self.repo.create_session(&session).await?;

        self.ledger
            .append(
                LedgerEntry::system("session-issued").with_metadata(serde_json::json!({
                    "sessionId": session.id,
                    "walletKey": session.wallet_key,
                    "maxSignatures": session.max_signatures,
                    "expiresAt": session.expires_at,
                })),
            )
            .await?;

        info!(session_id = %session.id, wallet = %session.wallet_key, "session issued");
        Ok(session)
    }

    /// The capability iff it is usable right now. An expired or exhausted
    /// capability is transitioned in storage and reported absent.
    pub async fn get_active(&self, id: &str) -> AgentResult<Option<SessionCapability>> {
        let now = Utc::now();
        for _ in 0..UPDATE_ATTEMPTS {
            let session = match self.repo.get_session(id).await? {
                Some(session) => session,
                None => return Ok(None),
            };

            if session.status != SessionStatus::Active {
                return Ok(None);
            }

            if session.is_expired_at(now) {
                let mut expired = session.clone();
                expired.status = SessionStatus::Expired;
                match self.repo.update_session(&expired).await {
                    Ok(_) => {
                        debug!(session_id = %id, "session expired on read");
                        return Ok(None);
                    }
                    Err(AgentError::RepositoryTransient(_)) => continue,
                    Err(e) => return Err(e),
                }
            }

            if session.signatures_used >= session.max_signatures {
                let mut exhausted = session.clone();
                exhausted.status = SessionStatus::Exhausted;
                match self.repo.update_session(&exhausted).await {
                    Ok(_) => {
                        debug!(session_id = %id, "session exhausted on read");
                        return Ok(None);
                    }
                    Err(AgentError::RepositoryTransient(_)) => continue,
                    Err(e) => return Err(e),
                }
            }

            return Ok(Some(session));
        }
        Err(AgentError::RepositoryTransient(format!(
            "session {} kept changing during read",
            id
        )))
    }

    /// Consume one signature, exactly once per successful submission. The
    /// version check on the update makes concurrent increments serialize.
    pub async fn increment_usage(&self, id: &str) -> AgentResult<SessionCapability> {
        for _ in 0..UPDATE_ATTEMPTS {
            let mut session = self
                .repo
                .get_session(id)
                .await?
                .ok_or_else(|| AgentError::SessionInvalid(format!("session {} unknown", id)))?;

            session.consume_signature()?;

            match self.repo.update_session(&session).await {
                Ok(updated) => {
                    debug!(
                        session_id = %id,
                        used = updated.signatures_used,
                        max = updated.max_signatures,
                        "session usage incremented"
                    );
                    return Ok(updated);
                }
                Err(AgentError::RepositoryTransient(_)) => continue,
                Err(e) => return Err(e),
            }
        }
        Err(AgentError::RepositoryTransient(format!(
            "session {} usage increment kept conflicting",
            id
        )))
    }

    /// Extend an ACTIVE capability's expiry. Terminal capabilities are not
    /// refreshable.
    pub async fn refresh(&self, id: &str, ttl_secs: Option<u64>) -> AgentResult<SessionCapability> {
        let mut session = self
            .repo
            .get_session(id)
            .await?
            .ok_or_else(|| AgentError::SessionInvalid(format!("session {} unknown", id)))?;
        session.refresh(ttl_secs.unwrap_or(self.default_ttl_secs))?;
        self.repo.update_session(&session).await
    }

    /// Terminal transition to REVOKED.
    pub async fn revoke(&self, id: &str, reason: &str) -> AgentResult<SessionCapability> {
        let mut session = self
            .repo
            .get_session(id)
            .await?
            .ok_or_else(|| AgentError::SessionInvalid(format!("session {} unknown", id)))?;
        session.revoke();
        let updated = self.repo.update_session(&session).await?;

        self.ledger
            .append(
                LedgerEntry::system("session-revoked").with_metadata(serde_json::json!({
                    "sessionId": id,
                    "reason": reason,
                })),
            )
            .await?;

        info!(session_id = %id, reason, "session revoked");
        Ok(updated)
    }

    /// Every known capability, newest first.
    pub async fn list(&self) -> AgentResult<Vec<SessionCapability>> {
        self.repo.list_sessions().await
    }
}
