//! Closed catalog of premium endpoints.
//!
//! Each endpoint carries a fixed offering (price, currency, facilitator
//! path), a deterministic canonical payload, and scheduling defaults. The
//! agent never serves data outside this table.

use rust_decimal::Decimal;
use serde::{Deserialize, Serialize};

use crate::error::{AgentError, AgentResult};
use crate::types::task::AutonomyTask;

/// Premium endpoint tag
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum Endpoint {
    /// Market intelligence feed
    Market,
    /// Knowledge digest feed
    Knowledge,
}

impl Endpoint {
    pub fn as_str(&self) -> &'static str {
        match self {
            Endpoint::Market => "market",
            Endpoint::Knowledge => "knowledge",
        }
    }

    /// Parse an endpoint tag; unknown tags are rejected.
    pub fn parse(s: &str) -> AgentResult<Self> {
        match s.to_lowercase().as_str() {
            "market" => Ok(Endpoint::Market),
            "knowledge" => Ok(Endpoint::Knowledge),
            other => Err(AgentError::Configuration(format!(
                "unknown endpoint: {}",
                other
            ))),
        }
    }

    /// Every endpoint in the catalog.
    pub fn all() -> [Endpoint; 2] {
        [Endpoint::Market, Endpoint::Knowledge]
    }
}

impl std::fmt::Display for Endpoint {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        write!(f, "{}", self.as_str())
    }
}

/// Payment instructions for one endpoint
#[derive(Debug, Clone, Serialize)]
pub struct Offering {
    pub endpoint: Endpoint,
    /// Price in whole currency units
    pub amount: Decimal,
    /// Currency tag
    pub currency: &'static str,
    /// Full facilitator verification URL
    pub facilitator_url: String,
}

/// The offering for an endpoint, with the facilitator URL rooted at the
/// configured base.
pub fn offering(endpoint: Endpoint, facilitator_base: &str) -> Offering {
    let base = facilitator_base.trim_end_matches('/');
    let (amount, currency) = match endpoint {
        // 0.05 USDC
        Endpoint::Market => (Decimal::new(5, 2), "USDC"),
        // 0.03 CASH
        Endpoint::Knowledge => (Decimal::new(3, 2), "CASH"),
    };
    Offering {
        endpoint,
        amount,
        currency,
        facilitator_url: format!("{}/verify/{}", base, endpoint.as_str()),
    }
}

/// Canonical data payload unlocked by a fulfilled request. Deterministic
/// per endpoint; the core treats it as an opaque value.
pub fn payload(endpoint: Endpoint) -> serde_json::Value {
    match endpoint {
        Endpoint::Market => serde_json::json!({
            "prices": {
                "SOL": { "usd": 148.32, "change24h": -1.8 },
                "BTC": { "usd": 97210.55, "change24h": 0.6 },
                "ETH": { "usd": 3412.08, "change24h": 1.1 }
            },
            "arbitrageSignals": [
                { "pair": "SOL/USDC", "venueA": "orca", "venueB": "raydium", "spreadBps": 14 },
                { "pair": "ETH/USDC", "venueA": "jupiter", "venueB": "orca", "spreadBps": 6 }
            ],
            "sentiment": { "score": 0.62, "label": "bullish", "sampleSize": 4821 }
        }),
        Endpoint::Knowledge => serde_json::json!({
            "articles": [
                { "title": "Settlement latency across L1s", "relevance": 0.91 },
                { "title": "Stablecoin float migration, weekly", "relevance": 0.84 }
            ],
            "citations": 17,
            "confidence": 0.88
        }),
    }
}

/// Scheduling defaults for the autonomy queue, one task per endpoint.
pub fn seed_task(endpoint: Endpoint) -> AutonomyTask {
    match endpoint {
        Endpoint::Market => AutonomyTask::new(endpoint, 10.0, 0.05, 300, 30),
        Endpoint::Knowledge => AutonomyTask::new(endpoint, 6.0, 0.03, 600, 30),
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use rust_decimal_macros::dec;

    #[test]
    fn test_offerings_match_catalog() {
        let market = offering(Endpoint::Market, "https://facilitator.test/");
        assert_eq!(market.amount, dec!(0.05));
        assert_eq!(market.currency, "USDC");
        assert_eq!(
            market.facilitator_url,
            "https://facilitator.test/verify/market"
        );

        let knowledge = offering(Endpoint::Knowledge, "https://facilitator.test");
        assert_eq!(knowledge.amount, dec!(0.03));
        assert_eq!(knowledge.currency, "CASH");
    }

    #[test]
    fn test_payload_is_deterministic() {
        assert_eq!(payload(Endpoint::Market), payload(Endpoint::Market));
        let market = payload(Endpoint::Market);
        assert!(market.get("prices").is_some());
        assert!(market.get("arbitrageSignals").is_some());
        assert!(market.get("sentiment").is_some());
    }

    #[test]
    fn test_parse_rejects_unknown() {
        assert!(Endpoint::parse("market").is_ok());
        assert!(Endpoint::parse("KNOWLEDGE").is_ok());
        assert!(Endpoint::parse("weather").is_err());
    }

    #[test]
    fn test_seed_tasks_cover_catalog() {
        for endpoint in Endpoint::all() {
            let task = seed_task(endpoint);
            assert_eq!(task.endpoint, endpoint);
            assert!(task.cost > 0.0);
        }
    }
}
