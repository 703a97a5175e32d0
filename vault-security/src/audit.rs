//! Merkle audit log writer collaborator (), used by C1,
//! C4, C5, and C7 to record audit events. Append-only by contract: the
//! trait offers no delete or update.

use async_trait::async_trait;
use chrono::{DateTime, Utc};
use parking_lot::Mutex;
use serde::Serialize;
use serde_json::Value;
use vault_core::VaultResult;

#[derive(Debug, Clone, Serialize)]
pub struct AuditEvent {
    pub event: String,
    pub timestamp: DateTime<Utc>,
    pub detail: Value,
}

#[async_trait]
pub trait MerkleAuditWriter: Send + Sync {
    async fn write(&self, event: AuditEvent) -> VaultResult<()>;
}

/// An in-memory reference writer. Keeps every event appended and
/// exposes a BLAKE3 chain hash over the log — a toy stand-in for a real
/// Merkle tree, sufficient for tests to confirm events were appended in
/// order and that the chain is tamper-evident.
#[derive(Debug, Default)]
pub struct InMemoryAuditWriter {
    events: Mutex<Vec<(AuditEvent, String)>>,
}

impl InMemoryAuditWriter {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn events(&self) -> Vec<AuditEvent> {
        self.events.lock().iter().map(|(e, _)| e.clone()).collect()
    }

    /// The chain hash after the most recent append, or `None` if empty.
    pub fn head_hash(&self) -> Option<String> {
        self.events.lock().last().map(|(_, hash)| hash.clone())
    }
}

#[async_trait]
impl MerkleAuditWriter for InMemoryAuditWriter {
    async fn write(&self, event: AuditEvent) -> VaultResult<()> {
        let mut events = self.events.lock();
        let prev_hash = events.last().map(|(_, h)| h.as_str()).unwrap_or("");

        let mut hasher = blake3::Hasher::new();
        hasher.update(prev_hash.as_bytes());
        hasher.update(event.event.as_bytes());
        hasher.update(event.timestamp.to_rfc3339().as_bytes());
        hasher.update(event.detail.to_string().as_bytes());
        let hash = hasher.finalize().to_hex().to_string();

        events.push((event, hash));
        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use serde_json::json;

    #[tokio::test]
    async fn appends_events_in_order() {
        let writer = InMemoryAuditWriter::new();
        writer
            .write(AuditEvent {
                event: "trust_evaluated".into(),
                timestamp: Utc::now(),
                detail: json!({"user_id": "u1"}),
            })
            .await
            .unwrap();
        writer
            .write(AuditEvent {
                event: "agent_scaled_up".into(),
                timestamp: Utc::now(),
                detail: json!({"pool": "neutral"}),
            })
            .await
            .unwrap();

        let events = writer.events();
        assert_eq!(events.len(), 2);
        assert_eq!(events[0].event, "trust_evaluated");
        assert_eq!(events[1].event, "agent_scaled_up");
    }

    #[tokio::test]
    async fn chain_hash_changes_with_each_append() {
        let writer = InMemoryAuditWriter::new();
        assert!(writer.head_hash().is_none());

        writer
            .write(AuditEvent {
                event: "a".into(),
                timestamp: Utc::now(),
                detail: json!({}),
            })
            .await
            .unwrap();
        let first = writer.head_hash().unwrap();

        writer
            .write(AuditEvent {
                event: "b".into(),
                timestamp: Utc::now(),
                detail: json!({}),
            })
            .await
            .unwrap();
        let second = writer.head_hash().unwrap();

        assert_ne!(first, second);
    }
}
