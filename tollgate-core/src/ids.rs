//! Identifier and hash generation.

use sha2::{Digest, Sha256};
use uuid::Uuid;

/// New premium request id
pub fn request_id() -> String {
    format!("req:{}", Uuid::new_v4())
}

/// New payment id
pub fn payment_id() -> String {
    format!("pay:{}", Uuid::new_v4())
}

/// New session capability id
pub fn session_id() -> String {
    format!("sess:{}", Uuid::new_v4())
}

/// New ledger entry id
pub fn ledger_id() -> String {
    format!("led:{}", Uuid::new_v4())
}

/// New balance snapshot id
pub fn snapshot_id() -> String {
    format!("bal:{}", Uuid::new_v4())
}

/// Synthetic transaction hash for payments that failed before a chain
/// signature existed. The `failed:` prefix keeps it distinguishable from a
/// real signature while still satisfying hash uniqueness.
pub fn synthetic_tx_hash() -> String {
    let mut hasher = Sha256::new();
    hasher.update(Uuid::new_v4().as_bytes());
    format!("failed:{}", hex::encode(hasher.finalize()))
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_ids_are_prefixed_and_unique() {
        assert!(request_id().starts_with("req:"));
        assert!(payment_id().starts_with("pay:"));
        assert_ne!(session_id(), session_id());
    }

    #[test]
    fn test_synthetic_hash_is_marked() {
        let hash = synthetic_tx_hash();
        assert!(hash.starts_with("failed:"));
        // sha256 hex after the marker
        assert_eq!(hash.len(), "failed:".len() + 64);
        assert_ne!(hash, synthetic_tx_hash());
    }
}
