//! Agent Configuration
//!
//! Configuration for the chain connection, payment gate, sessions,
//! facilitator and autonomy queue. Supports loading from environment
//! variables; see [`AgentConfig::from_env`] for the variable names.

use rust_decimal::Decimal;
use serde::{Deserialize, Serialize};
use std::env;

/// Solana commitment level
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum Commitment {
    /// Processed by the leader
    Processed,
    /// Voted on by a supermajority
    Confirmed,
    /// Rooted; will not be rolled back
    Finalized,
}

impl Default for Commitment {
    fn default() -> Self {
        Self::Confirmed
    }
}

impl Commitment {
    /// Parse from string (for environment variables)
    pub fn from_str(s: &str) -> Option<Self> {
        match s.to_lowercase().as_str() {
            "processed" => Some(Self::Processed),
            "confirmed" => Some(Self::Confirmed),
            "finalized" => Some(Self::Finalized),
            _ => None,
        }
    }

    pub fn as_str(&self) -> &'static str {
        match self {
            Commitment::Processed => "processed",
            Commitment::Confirmed => "confirmed",
            Commitment::Finalized => "finalized",
        }
    }

    fn rank(&self) -> u8 {
        match self {
            Commitment::Processed => 0,
            Commitment::Confirmed => 1,
            Commitment::Finalized => 2,
        }
    }

    /// Whether an observed confirmation status satisfies this level.
    pub fn satisfied_by(&self, observed: &str) -> bool {
        Commitment::from_str(observed)
            .map(|o| o.rank() >= self.rank())
            .unwrap_or(false)
    }
}

/// Solana RPC configuration
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct SolanaRpcConfig {
    /// RPC endpoint URL
    pub url: String,
    /// Commitment level for submission and confirmation
    pub commitment: Commitment,
    /// Request timeout in seconds
    #[serde(default = "default_rpc_timeout")]
    pub timeout_secs: u64,
    /// Submit-to-confirmation deadline in seconds
    #[serde(default = "default_confirm_deadline")]
    pub confirm_deadline_secs: u64,
    /// Confirmation poll interval in seconds
    #[serde(default = "default_confirm_poll")]
    pub confirm_poll_secs: u64,
}

fn default_rpc_timeout() -> u64 {
    30
}

fn default_confirm_deadline() -> u64 {
    30
}

fn default_confirm_poll() -> u64 {
    2
}

impl Default for SolanaRpcConfig {
    fn default() -> Self {
        Self {
            url: "https://api.devnet.solana.com".to_string(),
            commitment: Commitment::Confirmed,
            timeout_secs: 30,
            confirm_deadline_secs: 30,
            confirm_poll_secs: 2,
        }
    }
}

/// Agent configuration
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct AgentConfig {
    /// Solana RPC settings
    pub rpc: SolanaRpcConfig,
    /// Recipient public key for premium payments (base58)
    pub recipient_pubkey: Option<String>,
    /// Custodial signer secret (base58 64-byte keypair or hex 32-byte seed)
    pub signer_private_key: Option<String>,
    /// Session capability TTL in seconds
    #[serde(default = "default_session_expiry")]
    pub session_expiry_secs: u64,
    /// Session capability signature budget
    #[serde(default = "default_session_max_signatures")]
    pub session_max_signatures: u32,
    /// Pause threshold in whole units
    #[serde(default = "default_balance_threshold")]
    pub balance_threshold: Decimal,
    /// Balance poll interval in seconds (min 5)
    #[serde(default = "default_balance_poll_interval")]
    pub balance_poll_interval_secs: u64,
    /// Facilitator base URL
    #[serde(default = "default_facilitator_base_url")]
    pub facilitator_base_url: String,
    /// Shared secret for facilitator callback signatures
    pub facilitator_secret: Option<String>,
    /// Facilitator request deadline in seconds
    #[serde(default = "default_facilitator_timeout")]
    pub facilitator_timeout_secs: u64,
    /// Scheduler tick interval in seconds (min 5)
    #[serde(default = "default_autonomy_interval")]
    pub autonomy_interval_secs: u64,
    /// Minimum score a task needs to run
    #[serde(default = "default_min_run_score")]
    pub autonomy_min_run_score: f64,
    /// Backoff cap in seconds
    #[serde(default = "default_max_backoff")]
    pub autonomy_max_backoff_secs: u64,
    /// Admin bearer key for guarded endpoints
    pub admin_api_key: Option<String>,
    /// Allowed CORS origins; `*` means any
    #[serde(default)]
    pub allowed_origins: Vec<String>,
}

fn default_session_expiry() -> u64 {
    3600
}

fn default_session_max_signatures() -> u32 {
    3
}

fn default_balance_threshold() -> Decimal {
    // 0.05 units
    Decimal::new(5, 2)
}

fn default_balance_poll_interval() -> u64 {
    30
}

fn default_facilitator_base_url() -> String {
    "https://facilitator.devnet.tollgate.dev".to_string()
}

fn default_facilitator_timeout() -> u64 {
    10
}

fn default_autonomy_interval() -> u64 {
    20
}

fn default_min_run_score() -> f64 {
    0.5
}

fn default_max_backoff() -> u64 {
    900
}

/// Floor for the periodic loops.
pub const MIN_LOOP_INTERVAL_SECS: u64 = 5;

impl Default for AgentConfig {
    fn default() -> Self {
        Self {
            rpc: SolanaRpcConfig::default(),
            recipient_pubkey: None,
            signer_private_key: None,
            session_expiry_secs: default_session_expiry(),
            session_max_signatures: default_session_max_signatures(),
            balance_threshold: default_balance_threshold(),
            balance_poll_interval_secs: default_balance_poll_interval(),
            facilitator_base_url: default_facilitator_base_url(),
            facilitator_secret: None,
            facilitator_timeout_secs: default_facilitator_timeout(),
            autonomy_interval_secs: default_autonomy_interval(),
            autonomy_min_run_score: default_min_run_score(),
            autonomy_max_backoff_secs: default_max_backoff(),
            admin_api_key: None,
            allowed_origins: Vec::new(),
        }
    }
}

fn env_parse<T: std::str::FromStr>(name: &str) -> Option<T> {
    env::var(name).ok().and_then(|s| s.parse().ok())
}

impl AgentConfig {
    /// Load configuration from environment variables
    ///
    /// Environment variables:
    /// - SOLANA_RPC_URL: RPC endpoint URL
    /// - SOLANA_COMMITMENT: processed/confirmed/finalized
    /// - PAYMENT_RECIPIENT_PUBLIC_KEY: recipient address (base58)
    /// - SIGNER_PRIVATE_KEY: custodial signer secret
    /// - SESSION_EXPIRY_SECONDS: session TTL (default 3600)
    /// - SESSION_MAX_SIGNATURES: session budget (default 3)
    /// - BALANCE_THRESHOLD: pause threshold in whole units (default 0.05)
    /// - BALANCE_POLL_INTERVAL_SECONDS: poll interval (default 30, min 5)
    /// - FACILITATOR_BASE_URL / FACILITATOR_SECRET
    /// - AUTONOMY_QUEUE_INTERVAL_SECONDS: tick interval (default 20, min 5)
    /// - AUTONOMY_MIN_RUN_SCORE: score floor (default 0.5)
    /// - AUTONOMY_MAX_BACKOFF_SECONDS: backoff cap (default 900)
    /// - ADMIN_API_KEY: bearer key for guarded endpoints
    /// - ALLOWED_ORIGINS: comma-separated CORS origins
    pub fn from_env() -> Self {
        let defaults = Self::default();

        let rpc = SolanaRpcConfig {
            url: env::var("SOLANA_RPC_URL").unwrap_or(defaults.rpc.url),
            commitment: env::var("SOLANA_COMMITMENT")
                .ok()
                .and_then(|s| Commitment::from_str(&s))
                .unwrap_or_default(),
            timeout_secs: env_parse("SOLANA_RPC_TIMEOUT_SECONDS").unwrap_or(30),
            confirm_deadline_secs: env_parse("SOLANA_CONFIRM_DEADLINE_SECONDS").unwrap_or(30),
            confirm_poll_secs: default_confirm_poll(),
        };

        Self {
            rpc,
            recipient_pubkey: env::var("PAYMENT_RECIPIENT_PUBLIC_KEY").ok(),
            signer_private_key: env::var("SIGNER_PRIVATE_KEY").ok(),
            session_expiry_secs: env_parse("SESSION_EXPIRY_SECONDS")
                .unwrap_or(defaults.session_expiry_secs),
            session_max_signatures: env_parse("SESSION_MAX_SIGNATURES")
                .unwrap_or(defaults.session_max_signatures),
            balance_threshold: env::var("BALANCE_THRESHOLD")
                .ok()
                .and_then(|s| s.parse().ok())
                .unwrap_or(defaults.balance_threshold),
            balance_poll_interval_secs: env_parse::<u64>("BALANCE_POLL_INTERVAL_SECONDS")
                .unwrap_or(defaults.balance_poll_interval_secs)
                .max(MIN_LOOP_INTERVAL_SECS),
            facilitator_base_url: env::var("FACILITATOR_BASE_URL")
                .unwrap_or(defaults.facilitator_base_url),
            facilitator_secret: env::var("FACILITATOR_SECRET").ok(),
            facilitator_timeout_secs: env_parse("FACILITATOR_TIMEOUT_SECONDS")
                .unwrap_or(defaults.facilitator_timeout_secs),
            autonomy_interval_secs: env_parse::<u64>("AUTONOMY_QUEUE_INTERVAL_SECONDS")
                .unwrap_or(defaults.autonomy_interval_secs)
                .max(MIN_LOOP_INTERVAL_SECS),
            autonomy_min_run_score: env_parse("AUTONOMY_MIN_RUN_SCORE")
                .unwrap_or(defaults.autonomy_min_run_score),
            autonomy_max_backoff_secs: env_parse("AUTONOMY_MAX_BACKOFF_SECONDS")
                .unwrap_or(defaults.autonomy_max_backoff_secs),
            admin_api_key: env::var("ADMIN_API_KEY").ok(),
            allowed_origins: env::var("ALLOWED_ORIGINS")
                .map(|v| v.split(',').map(|s| s.trim().to_string()).collect())
                .unwrap_or_default(),
        }
    }

    /// Configuration for local development and tests: short loops, no
    /// admin key, facilitator pointed at localhost.
    pub fn development() -> Self {
        Self {
            rpc: SolanaRpcConfig {
                url: "http://127.0.0.1:8899".to_string(),
                commitment: Commitment::Confirmed,
                timeout_secs: 10,
                confirm_deadline_secs: 10,
                confirm_poll_secs: 1,
            },
            facilitator_base_url: "http://127.0.0.1:9040".to_string(),
            balance_poll_interval_secs: MIN_LOOP_INTERVAL_SECS,
            autonomy_interval_secs: MIN_LOOP_INTERVAL_SECS,
            ..Self::default()
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use rust_decimal_macros::dec;

    #[test]
    fn test_defaults() {
        let config = AgentConfig::default();
        assert_eq!(config.session_expiry_secs, 3600);
        assert_eq!(config.session_max_signatures, 3);
        assert_eq!(config.balance_threshold, dec!(0.05));
        assert_eq!(config.autonomy_interval_secs, 20);
        assert_eq!(config.autonomy_max_backoff_secs, 900);
    }

    #[test]
    fn test_commitment_ordering() {
        assert!(Commitment::Confirmed.satisfied_by("finalized"));
        assert!(Commitment::Confirmed.satisfied_by("confirmed"));
        assert!(!Commitment::Confirmed.satisfied_by("processed"));
        assert!(!Commitment::Confirmed.satisfied_by("bogus"));
    }

    #[test]
    fn test_development_preset() {
        let config = AgentConfig::development();
        assert_eq!(config.balance_poll_interval_secs, MIN_LOOP_INTERVAL_SECS);
        assert!(config.admin_api_key.is_none());
    }
}
