//! Ledger service.
//!
//! One logical append-only log backed by the repository. `append` persists
//! first and only then publishes on the bus, so a subscriber never sees an
//! uncommitted entry; a persistence failure propagates to the caller.

use std::sync::Arc;

use base64::Engine;
use tracing::debug;

use tollgate_core::error::{AgentError, AgentResult};
use tollgate_core::events::{AgentEvent, EventBus};
use tollgate_core::types::{LedgerCursor, LedgerEntry, LedgerFilter};

use crate::repo::Repository;

/// Smallest allowed page size
pub const MIN_QUERY_LIMIT: usize = 1;
/// Largest allowed page size
pub const MAX_QUERY_LIMIT: usize = 500;
/// Default page size
pub const DEFAULT_QUERY_LIMIT: usize = 50;
/// Hard cap for bulk export
pub const MAX_EXPORT_LIMIT: usize = 5000;

/// Append-only ledger over the repository, publishing to the bus
#[derive(Clone)]
pub struct Ledger {
    repo: Arc<dyn Repository>,
    bus: EventBus,
}

/// One query page with its encoded continuation cursor
#[derive(Debug)]
pub struct QueryPage {
    pub entries: Vec<LedgerEntry>,
    pub next_cursor: Option<String>,
}

impl Ledger {
    pub fn new(repo: Arc<dyn Repository>, bus: EventBus) -> Self {
        Self { repo, bus }
    }

    /// Persist an entry, then fan it out. Persistence failures propagate;
    /// fan-out cannot fail.
    pub async fn append(&self, entry: LedgerEntry) -> AgentResult<LedgerEntry> {
        let seq = self.repo.append_ledger(&entry).await?;
        debug!(
            category = entry.category.as_str(),
            event = %entry.event,
            seq,
            "ledger entry committed"
        );
        self.bus.publish(AgentEvent::LedgerEntry {
            entry: entry.clone(),
        });
        Ok(entry)
    }

    /// Filtered page, newest-first. The limit is clamped to
    /// [`MIN_QUERY_LIMIT`, `MAX_QUERY_LIMIT`].
    pub async fn query(
        &self,
        filter: &LedgerFilter,
        limit: Option<usize>,
        cursor: Option<&str>,
    ) -> AgentResult<QueryPage> {
        let limit = limit
            .unwrap_or(DEFAULT_QUERY_LIMIT)
            .clamp(MIN_QUERY_LIMIT, MAX_QUERY_LIMIT);
        let cursor = cursor.map(decode_cursor).transpose()?;

        let page = self.repo.scan_ledger(filter, limit, cursor).await?;
        Ok(QueryPage {
            entries: page.entries,
            next_cursor: page.next_cursor.map(encode_cursor),
        })
    }

    /// Flat export, newest-first, capped at [`MAX_EXPORT_LIMIT`].
    pub async fn export(
        &self,
        filter: &LedgerFilter,
        limit: Option<usize>,
    ) -> AgentResult<Vec<LedgerEntry>> {
        let limit = limit.unwrap_or(MAX_EXPORT_LIMIT).clamp(1, MAX_EXPORT_LIMIT);
        let page = self.repo.scan_ledger(filter, limit, None).await?;
        Ok(page.entries)
    }
}

/// Opaque continuation token.
pub fn encode_cursor(cursor: LedgerCursor) -> String {
    let raw = format!("{}:{}", cursor.timestamp_ms, cursor.seq);
    base64::engine::general_purpose::URL_SAFE_NO_PAD.encode(raw)
}

/// Decode a continuation token produced by [`encode_cursor`].
pub fn decode_cursor(token: &str) -> AgentResult<LedgerCursor> {
    let invalid = || AgentError::Serialization(format!("invalid cursor: {}", token));
    let raw = base64::engine::general_purpose::URL_SAFE_NO_PAD
        .decode(token)
        .map_err(|_| invalid())?;
    let raw = String::from_utf8(raw).map_err(|_| invalid())?;
    let (timestamp_ms, seq) = raw.split_once(':').ok_or_else(invalid)?;
    Ok(LedgerCursor {
        timestamp_ms: timestamp_ms.parse().map_err(|_| invalid())?,
        seq: seq.parse().map_err(|_| invalid())?,
    })
}

/// Render entries as CSV for bulk export.
pub fn to_csv(entries: &[LedgerEntry]) -> String {
    let mut out =
        String::from("id,timestamp,category,event,request_id,payment_id,tx_hash,metadata\n");
    for entry in entries {
        let metadata = entry
            .metadata
            .as_ref()
            .map(|m| m.to_string())
            .unwrap_or_default();
        let row = [
            entry.id.as_str(),
            &entry.timestamp.to_rfc3339(),
            entry.category.as_str(),
            entry.event.as_str(),
            entry.request_id.as_deref().unwrap_or(""),
            entry.payment_id.as_deref().unwrap_or(""),
            entry.tx_hash.as_deref().unwrap_or(""),
            metadata.as_str(),
        ];
        let escaped: Vec<String> = row.iter().map(|field| escape_csv(field)).collect();
        out.push_str(&escaped.join(","));
        out.push('\n');
    }
    out
}

fn escape_csv(field: &str) -> String {
    if field.contains(',') || field.contains('"') || field.contains('\n') {
        format!("\"{}\"", field.replace('"', "\"\""))
    } else {
        field.to_string()
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use tollgate_core::types::LedgerCategory;

    use crate::memory::MemoryRepository;

    fn ledger() -> (Ledger, EventBus) {
        let bus = EventBus::default();
        let repo = Arc::new(MemoryRepository::new());
        (Ledger::new(repo, bus.clone()), bus)
    }

    #[tokio::test]
    async fn test_append_publishes_after_commit() {
        let (ledger, bus) = ledger();
        let mut rx = bus.subscribe();

        ledger
            .append(LedgerEntry::payment("confirmed").with_tx_hash("sig-1"))
            .await
            .unwrap();

        match rx.recv().await.unwrap() {
            AgentEvent::LedgerEntry { entry } => {
                assert_eq!(entry.event, "confirmed");
                assert_eq!(entry.tx_hash.as_deref(), Some("sig-1"));
            }
            other => panic!("unexpected event {:?}", other.kind()),
        }
    }

    #[tokio::test]
    async fn test_query_limit_clamped() {
        let (ledger, _bus) = ledger();
        for i in 0..3 {
            ledger
                .append(LedgerEntry::system(format!("event-{}", i)))
                .await
                .unwrap();
        }

        // A zero limit is raised to the minimum.
        let page = ledger
            .query(&LedgerFilter::default(), Some(0), None)
            .await
            .unwrap();
        assert_eq!(page.entries.len(), 1);
    }

    #[tokio::test]
    async fn test_cursor_roundtrip_through_query() {
        let (ledger, _bus) = ledger();
        for i in 0..4 {
            ledger
                .append(LedgerEntry::system(format!("event-{}", i)))
                .await
                .unwrap();
        }

        let first = ledger
            .query(&LedgerFilter::default(), Some(2), None)
            .await
            .unwrap();
        let token = first.next_cursor.expect("continuation");

        let second = ledger
            .query(&LedgerFilter::default(), Some(2), Some(token.as_str()))
            .await
            .unwrap();
        assert_eq!(second.entries.len(), 2);
        assert!(second.next_cursor.is_none());
        // No overlap between pages.
        assert!(first.entries.iter().all(|a| second
            .entries
            .iter()
            .all(|b| a.id != b.id)));
    }

    #[tokio::test]
    async fn test_bad_cursor_rejected() {
        let (ledger, _bus) = ledger();
        let err = ledger
            .query(&LedgerFilter::default(), None, Some("!!not-base64!!"))
            .await
            .unwrap_err();
        assert!(matches!(err, AgentError::Serialization(_)));
    }

    #[tokio::test]
    async fn test_csv_escapes_fields() {
        let entry = LedgerEntry::new(LedgerCategory::Payment, "failed")
            .with_metadata(serde_json::json!({"error": "boom, twice"}));
        let csv = to_csv(&[entry]);
        let mut lines = csv.lines();
        assert_eq!(
            lines.next().unwrap(),
            "id,timestamp,category,event,request_id,payment_id,tx_hash,metadata"
        );
        let row = lines.next().unwrap();
        assert!(row.contains("\"{\"\"error\"\":\"\"boom, twice\"\"}\""));
    }
}
