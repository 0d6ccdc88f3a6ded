//! Facilitator client.
//!
//! Two concerns, kept apart: submitting verification packets to the
//! facilitator (best-effort; a failed submit never fails a payment the
//! chain already confirmed), and verifying inbound signed callbacks with
//! HMAC-SHA-256 over the raw body, compared in constant time. A missing
//! shared secret rejects every callback.

use std::time::Duration;

use hmac::{Hmac, Mac};
use reqwest::Client;
use serde::Serialize;
use sha2::Sha256;
use tracing::{debug, warn};

use tollgate_core::error::{AgentError, AgentResult};
use tollgate_core::types::LedgerEntry;
use tollgate_store::Ledger;

type HmacSha256 = Hmac<Sha256>;

/// Verification packet sent to the facilitator after a confirmed payment
#[derive(Debug, Clone, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct VerificationSubmission {
    pub tx_hash: String,
    pub request_id: String,
    pub endpoint: String,
    pub amount: String,
    pub currency: String,
}

/// HTTP client for the external facilitator
#[derive(Clone)]
pub struct FacilitatorClient {
    client: Client,
    base_url: String,
    secret: Option<String>,
    ledger: Ledger,
}

impl FacilitatorClient {
    pub fn new(
        base_url: impl Into<String>,
        secret: Option<String>,
        timeout_secs: u64,
        ledger: Ledger,
    ) -> AgentResult<Self> {
        let client = Client::builder()
            .timeout(Duration::from_secs(timeout_secs))
            .build()
            .map_err(|e| {
                AgentError::FacilitatorUnavailable(format!("client build failed: {}", e))
            })?;
        Ok(Self {
            client,
            base_url: base_url.into().trim_end_matches('/').to_string(),
            secret,
            ledger,
        })
    }

    /// POST the verification packet. Success and failure are both recorded
    /// in the ledger; failure propagates so the caller can decide whether
    /// it matters (it does not for an already-confirmed payment).
    pub async fn submit(&self, submission: &VerificationSubmission) -> AgentResult<()> {
        let url = format!("{}/verifications", self.base_url);
        let result = async {
            let response = self
                .client
                .post(&url)
                .json(submission)
                .send()
                .await
                .map_err(|e| AgentError::FacilitatorUnavailable(e.to_string()))?;
            let status = response.status();
            if !status.is_success() {
                let body = response.text().await.unwrap_or_default();
                return Err(AgentError::FacilitatorUnavailable(format!(
                    "http {} - {}",
                    status, body
                )));
            }
            Ok(())
        }
        .await;

        match result {
            Ok(()) => {
                debug!(tx_hash = %submission.tx_hash, "facilitator verification submitted");
                self.ledger
                    .append(
                        LedgerEntry::payment("facilitator-submitted")
                            .with_request_id(&submission.request_id)
                            .with_tx_hash(&submission.tx_hash),
                    )
                    .await?;
                Ok(())
            }
            Err(e) => {
                warn!(tx_hash = %submission.tx_hash, error = %e, "facilitator submit failed");
                self.ledger
                    .append(
                        LedgerEntry::payment("facilitator-submit-failed")
                            .with_request_id(&submission.request_id)
                            .with_tx_hash(&submission.tx_hash)
                            .with_metadata(serde_json::json!({ "error": e.to_string() })),
                    )
                    .await?;
                Err(e)
            }
        }
    }

    /// Verify an inbound callback: hex HMAC-SHA-256 of the raw body under
    /// the shared secret, constant-time comparison. No secret, no trust.
    pub fn verify_callback(&self, body: &[u8], signature_hex: &str) -> bool {
        let secret = match &self.secret {
            Some(secret) if !secret.is_empty() => secret,
            _ => return false,
        };
        let expected = match hex::decode(signature_hex.trim()) {
            Ok(bytes) => bytes,
            Err(_) => return false,
        };
        let mut mac = match HmacSha256::new_from_slice(secret.as_bytes()) {
            Ok(mac) => mac,
            Err(_) => return false,
        };
        mac.update(body);
        mac.verify_slice(&expected).is_ok()
    }
}

/// Hex HMAC-SHA-256 of `body` under `secret`; what a facilitator puts in
/// the signature header.
pub fn sign_callback(secret: &str, body: &[u8]) -> String {
    let mut mac = HmacSha256::new_from_slice(secret.as_bytes()).expect("hmac accepts any key size");
    mac.update(body);
    hex::encode(mac.finalize().into_bytes())
}
