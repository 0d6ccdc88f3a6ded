//! Deterministic in-process chain.
//!
//! Stands in for the Solana gateway in tests and local development: keeps
//! a lamport balance, debits transfers, and mints deterministic 64-char
//! hex signatures. Failure injection and duplicate-signature mode let the
//! suite drive the executor's error and reconciliation paths.

use std::sync::atomic::{AtomicU64, Ordering};

use async_trait::async_trait;
use sha2::{Digest, Sha256};
use tokio::sync::RwLock;

use tollgate_core::error::{AgentError, AgentResult};

use super::ChainGateway;

/// One transfer the fake chain accepted
#[derive(Debug, Clone)]
pub struct FakeTransfer {
    pub recipient: String,
    pub lamports: u64,
    pub signature: String,
}

/// In-process chain stand-in
pub struct FakeChain {
    pubkey: String,
    lamports: RwLock<u64>,
    transfers: RwLock<Vec<FakeTransfer>>,
    next_error: RwLock<Option<AgentError>>,
    repeat_signature: RwLock<bool>,
    counter: AtomicU64,
}

impl FakeChain {
    /// Chain with the given starting balance.
    pub fn with_lamports(lamports: u64) -> Self {
        Self {
            pubkey: "FakeSigner1111111111111111111111111111111111".to_string(),
            lamports: RwLock::new(lamports),
            transfers: RwLock::new(Vec::new()),
            next_error: RwLock::new(None),
            repeat_signature: RwLock::new(false),
            counter: AtomicU64::new(0),
        }
    }

    /// Overwrite the balance.
    pub async fn set_lamports(&self, lamports: u64) {
        *self.lamports.write().await = lamports;
    }

    /// Fail the next transfer with `error`, once.
    pub async fn fail_next_transfer(&self, error: AgentError) {
        *self.next_error.write().await = Some(error);
    }

    /// When set, transfers re-issue the previous signature instead of a
    /// fresh one, emulating a node deduplicating a retried transaction.
    pub async fn set_repeat_signature(&self, repeat: bool) {
        *self.repeat_signature.write().await = repeat;
    }

    /// Every accepted transfer, in order.
    pub async fn transfers(&self) -> Vec<FakeTransfer> {
        self.transfers.read().await.clone()
    }

    fn mint_signature(&self, recipient: &str, lamports: u64) -> String {
        let nonce = self.counter.fetch_add(1, Ordering::SeqCst);
        let mut hasher = Sha256::new();
        hasher.update(nonce.to_le_bytes());
        hasher.update(recipient.as_bytes());
        hasher.update(lamports.to_le_bytes());
        hex::encode(hasher.finalize())
    }
}

impl Default for FakeChain {
    fn default() -> Self {
        // One unit of headroom.
        Self::with_lamports(1_000_000_000)
    }
}

#[async_trait]
impl ChainGateway for FakeChain {
    fn signer_pubkey(&self) -> AgentResult<String> {
        Ok(self.pubkey.clone())
    }

    async fn balance_of_signer(&self) -> AgentResult<u64> {
        Ok(*self.lamports.read().await)
    }

    async fn transfer_from_signer(&self, recipient: &str, lamports: u64) -> AgentResult<String> {
        if let Some(error) = self.next_error.write().await.take() {
            return Err(error);
        }

        if *self.repeat_signature.read().await {
            if let Some(last) = self.transfers.read().await.last() {
                return Ok(last.signature.clone());
            }
        }

        let mut balance = self.lamports.write().await;
        if *balance < lamports {
            return Err(AgentError::ChainRejected(format!(
                "insufficient lamports: have {}, need {}",
                *balance, lamports
            )));
        }
        *balance -= lamports;

        let signature = self.mint_signature(recipient, lamports);
        self.transfers.write().await.push(FakeTransfer {
            recipient: recipient.to_string(),
            lamports,
            signature: signature.clone(),
        });
        Ok(signature)
    }
}
