//! Core entity types for the payment agent.

pub mod balance;
pub mod ledger;
pub mod payment;
pub mod request;
pub mod session;
pub mod system;
pub mod task;

pub use balance::{BalanceSnapshot, BalanceSource, BalanceStatus};
pub use ledger::{LedgerCategory, LedgerCursor, LedgerEntry, LedgerFilter, LedgerPage};
pub use payment::{Payment, PaymentStatus};
pub use request::{PremiumRequest, RequestStatus};
pub use session::{SessionCapability, SessionStatus};
pub use system::{PauseReason, SystemState};
pub use task::{AutonomyTask, TaskStatus};
