//! In-process event fan-out.
//!
//! The bus is a pure sink: components publish after commit and never
//! receive calls back from it. Fan-out rides a bounded broadcast channel;
//! a slow subscriber observes `Lagged` and skips ahead rather than
//! stalling publishers. Dropping a receiver unsubscribes it.

use chrono::{DateTime, Utc};
use serde::Serialize;
use tokio::sync::broadcast;

use crate::types::balance::{BalanceSnapshot, BalanceStatus};
use crate::types::ledger::LedgerEntry;
use crate::types::payment::PaymentStatus;
use crate::types::task::TaskStatus;

/// Default channel capacity before lagging subscribers drop events.
pub const DEFAULT_BUS_CAPACITY: usize = 256;

/// Event published on the bus
#[derive(Debug, Clone, Serialize)]
#[serde(tag = "type", rename_all = "kebab-case")]
pub enum AgentEvent {
    /// Emitted once when the runtime comes up
    Bootstrap { at: DateTime<Utc> },
    /// A ledger entry was committed
    LedgerEntry { entry: LedgerEntry },
    /// A balance snapshot was recorded
    BalanceSnapshot {
        balance: String,
        status: BalanceStatus,
        sampled_at: DateTime<Utc>,
    },
    /// An autonomy task changed state
    QueueUpdate {
        endpoint: String,
        status: TaskStatus,
        failure_count: u32,
        next_eligible_at: DateTime<Utc>,
    },
    /// A payment changed state
    PaymentStatus {
        payment_id: String,
        request_id: String,
        tx_hash: String,
        status: PaymentStatus,
        failure_code: Option<String>,
    },
}

impl AgentEvent {
    /// Wire tag, matching the serde representation.
    pub fn kind(&self) -> &'static str {
        match self {
            AgentEvent::Bootstrap { .. } => "bootstrap",
            AgentEvent::LedgerEntry { .. } => "ledger-entry",
            AgentEvent::BalanceSnapshot { .. } => "balance-snapshot",
            AgentEvent::QueueUpdate { .. } => "queue-update",
            AgentEvent::PaymentStatus { .. } => "payment-status",
        }
    }

    /// Balance event from a snapshot.
    pub fn from_snapshot(snapshot: &BalanceSnapshot) -> Self {
        AgentEvent::BalanceSnapshot {
            balance: snapshot.balance.to_string(),
            status: snapshot.status,
            sampled_at: snapshot.sampled_at,
        }
    }
}

/// Broadcast fan-out for agent events
#[derive(Debug, Clone)]
pub struct EventBus {
    tx: broadcast::Sender<AgentEvent>,
}

impl Default for EventBus {
    fn default() -> Self {
        Self::new(DEFAULT_BUS_CAPACITY)
    }
}

impl EventBus {
    /// Bus with a bounded backlog per subscriber.
    pub fn new(capacity: usize) -> Self {
        let (tx, _) = broadcast::channel(capacity.max(1));
        Self { tx }
    }

    /// Publish an event. Never blocks; returns the number of subscribers
    /// that will observe it (zero subscribers is not an error).
    pub fn publish(&self, event: AgentEvent) -> usize {
        match self.tx.send(event) {
            Ok(n) => n,
            Err(_) => 0,
        }
    }

    /// New subscription. Dropping the receiver unsubscribes.
    pub fn subscribe(&self) -> broadcast::Receiver<AgentEvent> {
        self.tx.subscribe()
    }

    /// Current subscriber count.
    pub fn subscriber_count(&self) -> usize {
        self.tx.receiver_count()
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[tokio::test]
    async fn test_publish_without_subscribers_is_ok() {
        let bus = EventBus::default();
        assert_eq!(bus.publish(AgentEvent::Bootstrap { at: Utc::now() }), 0);
    }

    #[tokio::test]
    async fn test_fan_out_to_all_subscribers() {
        let bus = EventBus::default();
        let mut rx1 = bus.subscribe();
        let mut rx2 = bus.subscribe();

        let delivered = bus.publish(AgentEvent::Bootstrap { at: Utc::now() });
        assert_eq!(delivered, 2);

        assert_eq!(rx1.recv().await.unwrap().kind(), "bootstrap");
        assert_eq!(rx2.recv().await.unwrap().kind(), "bootstrap");
    }

    #[tokio::test]
    async fn test_slow_subscriber_lags_instead_of_blocking() {
        let bus = EventBus::new(2);
        let mut rx = bus.subscribe();

        for _ in 0..5 {
            bus.publish(AgentEvent::Bootstrap { at: Utc::now() });
        }

        // Backlog overflowed: the receiver reports the lag, then resumes.
        match rx.recv().await {
            Err(broadcast::error::RecvError::Lagged(skipped)) => assert!(skipped >= 1),
            other => panic!("expected lag, got {:?}", other.map(|e| e.kind())),
        }
        assert!(rx.recv().await.is_ok());
    }

    #[tokio::test]
    async fn test_drop_unsubscribes() {
        let bus = EventBus::default();
        let rx = bus.subscribe();
        assert_eq!(bus.subscriber_count(), 1);
        drop(rx);
        assert_eq!(bus.subscriber_count(), 0);
    }
}
