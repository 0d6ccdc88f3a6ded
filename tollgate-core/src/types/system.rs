//! Singleton payment gate state.

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};

/// Why payments are paused
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "SCREAMING_SNAKE_CASE")]
pub enum PauseReason {
    /// Wallet balance fell below the configured threshold
    LowBalance,
}

impl std::fmt::Display for PauseReason {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            PauseReason::LowBalance => write!(f, "LOW_BALANCE"),
        }
    }
}

/// Singleton gate: pause reason is set iff paused.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct SystemState {
    /// Whether payment submission is blocked
    pub payments_paused: bool,
    /// Reason, present iff paused
    pub pause_reason: Option<PauseReason>,
    /// Last gate transition time
    pub updated_at: DateTime<Utc>,
}

impl Default for SystemState {
    fn default() -> Self {
        Self {
            payments_paused: false,
            pause_reason: None,
            updated_at: Utc::now(),
        }
    }
}

impl SystemState {
    /// Close the gate.
    pub fn pause(&mut self, reason: PauseReason) {
        self.payments_paused = true;
        self.pause_reason = Some(reason);
        self.updated_at = Utc::now();
    }

    /// Open the gate; clears the reason.
    pub fn resume(&mut self) {
        self.payments_paused = false;
        self.pause_reason = None;
        self.updated_at = Utc::now();
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_reason_set_iff_paused() {
        let mut state = SystemState::default();
        assert!(!state.payments_paused);
        assert!(state.pause_reason.is_none());

        state.pause(PauseReason::LowBalance);
        assert!(state.payments_paused);
        assert_eq!(state.pause_reason, Some(PauseReason::LowBalance));

        state.resume();
        assert!(!state.payments_paused);
        assert!(state.pause_reason.is_none());
    }

    #[test]
    fn test_reason_wire_format() {
        assert_eq!(PauseReason::LowBalance.to_string(), "LOW_BALANCE");
        let json = serde_json::to_string(&PauseReason::LowBalance).unwrap();
        assert_eq!(json, "\"LOW_BALANCE\"");
    }
}
