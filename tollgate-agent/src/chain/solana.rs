//! Solana JSON-RPC client and gateway.
//!
//! Thin, typed JSON-RPC surface over the Solana node: balance reads,
//! recent blockhash, transaction submission and signature-status polling.
//! Confirmation waits are bounded by the configured deadline.

use std::sync::atomic::{AtomicU64, Ordering};
use std::time::Duration;

use async_trait::async_trait;
use reqwest::Client;
use serde::Deserialize;
use tracing::{debug, warn};

use tollgate_core::error::{AgentError, AgentResult};

use crate::config::SolanaRpcConfig;
use crate::signer::{build_transfer, Keypair};

use super::ChainGateway;

/// Solana JSON-RPC client
pub struct SolanaRpcClient {
    /// HTTP client
    client: Client,
    /// RPC configuration
    config: SolanaRpcConfig,
    /// Request ID counter
    request_id: AtomicU64,
}

/// JSON-RPC request
#[derive(Debug, serde::Serialize)]
struct RpcRequest<'a> {
    jsonrpc: &'static str,
    id: u64,
    method: &'a str,
    params: serde_json::Value,
}

/// JSON-RPC response
#[derive(Debug, Deserialize)]
struct RpcResponse<T> {
    result: Option<T>,
    error: Option<RpcError>,
    #[allow(dead_code)]
    id: u64,
}

/// JSON-RPC error
#[derive(Debug, Deserialize)]
struct RpcError {
    code: i64,
    message: String,
}

/// Envelope used by value-bearing RPC results
#[derive(Debug, Deserialize)]
struct RpcEnvelope<T> {
    #[allow(dead_code)]
    context: serde_json::Value,
    value: T,
}

/// Latest blockhash result
#[derive(Debug, Deserialize)]
#[serde(rename_all = "camelCase")]
struct LatestBlockhash {
    blockhash: String,
    #[allow(dead_code)]
    last_valid_block_height: u64,
}

/// One signature status from `getSignatureStatuses`
#[derive(Debug, Clone, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct SignatureStatus {
    /// Slot the transaction was processed in
    pub slot: u64,
    /// Confirmations since processing; absent once rooted
    pub confirmations: Option<u64>,
    /// Error, if the transaction failed on chain
    pub err: Option<serde_json::Value>,
    /// processed / confirmed / finalized
    pub confirmation_status: Option<String>,
}

impl SolanaRpcClient {
    /// Create a new client
    pub fn new(config: SolanaRpcConfig) -> AgentResult<Self> {
        let client = Client::builder()
            .timeout(Duration::from_secs(config.timeout_secs))
            .build()
            .map_err(|e| AgentError::ChainRejected(format!("rpc client build failed: {}", e)))?;

        Ok(Self {
            client,
            config,
            request_id: AtomicU64::new(0),
        })
    }

    /// Make an RPC call
    async fn call<T: for<'de> Deserialize<'de>>(
        &self,
        method: &str,
        params: serde_json::Value,
    ) -> AgentResult<T> {
        let id = self.request_id.fetch_add(1, Ordering::SeqCst);
        let request = RpcRequest {
            jsonrpc: "2.0",
            id,
            method,
            params,
        };

        debug!("solana rpc call: {} id={}", method, id);

        let response = self
            .client
            .post(&self.config.url)
            .json(&request)
            .send()
            .await
            .map_err(|e| AgentError::ChainRejected(format!("rpc connection failed: {}", e)))?;

        let status = response.status();
        if !status.is_success() {
            let body = response.text().await.unwrap_or_default();
            return Err(AgentError::ChainRejected(format!(
                "rpc http {} - {}",
                status, body
            )));
        }

        let rpc_response: RpcResponse<T> = response
            .json()
            .await
            .map_err(|e| AgentError::ChainRejected(format!("rpc decode failed: {}", e)))?;

        if let Some(error) = rpc_response.error {
            return Err(AgentError::ChainRejected(format!(
                "rpc error {}: {}",
                error.code, error.message
            )));
        }

        rpc_response
            .result
            .ok_or_else(|| AgentError::ChainRejected("empty rpc response".to_string()))
    }

    /// Signer balance in lamports.
    pub async fn get_balance(&self, pubkey: &str) -> AgentResult<u64> {
        let envelope: RpcEnvelope<u64> = self
            .call(
                "getBalance",
                serde_json::json!([pubkey, {"commitment": self.config.commitment.as_str()}]),
            )
            .await?;
        Ok(envelope.value)
    }

    /// A recent blockhash to anchor a transaction to.
    pub async fn get_latest_blockhash(&self) -> AgentResult<String> {
        let envelope: RpcEnvelope<LatestBlockhash> = self
            .call(
                "getLatestBlockhash",
                serde_json::json!([{"commitment": self.config.commitment.as_str()}]),
            )
            .await?;
        Ok(envelope.value.blockhash)
    }

    /// Submit a base64-encoded signed transaction; returns the signature.
    pub async fn send_transaction(&self, tx_base64: &str) -> AgentResult<String> {
        self.call(
            "sendTransaction",
            serde_json::json!([tx_base64, {
                "encoding": "base64",
                "preflightCommitment": self.config.commitment.as_str(),
            }]),
        )
        .await
    }

    /// Status of one signature, if the node knows it.
    pub async fn get_signature_status(
        &self,
        signature: &str,
    ) -> AgentResult<Option<SignatureStatus>> {
        let envelope: RpcEnvelope<Vec<Option<SignatureStatus>>> = self
            .call(
                "getSignatureStatuses",
                serde_json::json!([[signature], {"searchTransactionHistory": true}]),
            )
            .await?;
        Ok(envelope.value.into_iter().next().flatten())
    }

    /// Poll until the signature reaches the configured commitment, the
    /// chain reports a hard error, or the deadline passes.
    pub async fn wait_for_confirmation(&self, signature: &str) -> AgentResult<()> {
        let deadline = Duration::from_secs(self.config.confirm_deadline_secs);
        let poll = Duration::from_secs(self.config.confirm_poll_secs.max(1));
        let start = std::time::Instant::now();

        loop {
            if start.elapsed() > deadline {
                return Err(AgentError::ChainTimeout {
                    waited_secs: start.elapsed().as_secs(),
                });
            }

            match self.get_signature_status(signature).await {
                Ok(Some(status)) => {
                    if let Some(err) = status.err {
                        return Err(AgentError::ChainRejected(format!(
                            "transaction {} failed on chain: {}",
                            signature, err
                        )));
                    }
                    if let Some(observed) = &status.confirmation_status {
                        if self.config.commitment.satisfied_by(observed) {
                            debug!(
                                signature,
                                slot = status.slot,
                                "transaction confirmed"
                            );
                            return Ok(());
                        }
                    }
                }
                Ok(None) => {
                    debug!(signature, "signature not yet visible");
                }
                Err(e) => {
                    // Transient RPC trouble; the deadline bounds us.
                    warn!(signature, error = %e, "status poll failed");
                }
            }

            tokio::time::sleep(poll).await;
        }
    }

    /// RPC configuration.
    pub fn config(&self) -> &SolanaRpcConfig {
        &self.config
    }
}

/// Chain gateway backed by the Solana RPC and the custodial keypair
pub struct SolanaGateway {
    rpc: SolanaRpcClient,
    keypair: Option<Keypair>,
}

impl SolanaGateway {
    /// Gateway over an RPC endpoint; the keypair is optional so a node
    /// without signing authority can still watch balances.
    pub fn new(config: SolanaRpcConfig, keypair: Option<Keypair>) -> AgentResult<Self> {
        Ok(Self {
            rpc: SolanaRpcClient::new(config)?,
            keypair,
        })
    }

    fn keypair(&self) -> AgentResult<&Keypair> {
        self.keypair.as_ref().ok_or(AgentError::SignerUnavailable)
    }

    /// The underlying RPC client.
    pub fn rpc(&self) -> &SolanaRpcClient {
        &self.rpc
    }
}

#[async_trait]
impl ChainGateway for SolanaGateway {
    fn signer_pubkey(&self) -> AgentResult<String> {
        Ok(self.keypair()?.public_key_base58())
    }

    async fn balance_of_signer(&self) -> AgentResult<u64> {
        let pubkey = self.signer_pubkey()?;
        self.rpc.get_balance(&pubkey).await
    }

    async fn transfer_from_signer(&self, recipient: &str, lamports: u64) -> AgentResult<String> {
        let keypair = self.keypair()?;

        let blockhash = self.rpc.get_latest_blockhash().await?;
        let built = build_transfer(keypair, recipient, lamports, &blockhash)?;

        let signature = self.rpc.send_transaction(&built.tx_base64).await?;
        if signature != built.signature {
            debug!(
                expected = %built.signature,
                returned = %signature,
                "node returned a different signature id"
            );
        }

        self.rpc.wait_for_confirmation(&signature).await?;
        Ok(signature)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::config::Commitment;

    #[test]
    fn test_gateway_without_keypair_has_no_signer() {
        let gateway = SolanaGateway::new(SolanaRpcConfig::default(), None).unwrap();
        assert!(matches!(
            gateway.signer_pubkey(),
            Err(AgentError::SignerUnavailable)
        ));
    }

    #[test]
    fn test_signature_status_decoding() {
        let raw = serde_json::json!({
            "slot": 123,
            "confirmations": 4,
            "err": null,
            "confirmationStatus": "confirmed"
        });
        let status: SignatureStatus = serde_json::from_value(raw).unwrap();
        assert_eq!(status.slot, 123);
        assert!(Commitment::Confirmed.satisfied_by(status.confirmation_status.as_deref().unwrap()));
    }
}
