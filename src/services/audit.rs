//! Append-only booking audit log with a per-booking SHA-256 chain.
//!
//! Writes are best-effort: [`AuditLog::record`] never fails the caller, it
//! logs and returns `None` instead.

use chrono::SubsecRound;
use serde_json::{json, Map, Value};
use sha2::{Digest, Sha256};
use std::sync::Arc;
use tokio::sync::Mutex;
use tracing::{debug, error};
use uuid::Uuid;

use crate::models::{AuditAction, AuditRecord, RequestContext};
use crate::services::clock::Clock;
use crate::store::{AuditStore, StoreError, StoreResult};

/// Another instance may append between our read of the chain head and our
/// insert; the store rejects the fork and we re-read.
const APPEND_ATTEMPTS: usize = 5;

/// One audit entry before it is hashed and stored.
#[derive(Debug, Clone)]
pub struct AuditEntry<'a> {
    pub booking_id: Uuid,
    pub action: AuditAction,
    pub before: Option<&'a Value>,
    pub after: Option<&'a Value>,
    pub notes: Option<String>,
    pub context: &'a RequestContext,
}

#[derive(Debug, Clone, PartialEq, Eq, thiserror::Error)]
pub enum ChainBreak {
    #[error("audit record {record_id} at position {index} does not link to its predecessor")]
    BrokenLink { index: usize, record_id: Uuid },

    #[error("audit record {record_id} at position {index} was altered")]
    Tampered { index: usize, record_id: Uuid },
}

pub struct AuditLog {
    store: Arc<dyn AuditStore>,
    clock: Arc<dyn Clock>,
    // Serializes read-latest-then-append within this process.
    append_lock: Mutex<()>,
}

impl AuditLog {
    pub fn new(store: Arc<dyn AuditStore>, clock: Arc<dyn Clock>) -> Self {
        Self { store, clock, append_lock: Mutex::new(()) }
    }

    pub async fn record(&self, entry: AuditEntry<'_>) -> Option<AuditRecord> {
        let booking_id = entry.booking_id;
        let action = entry.action;
        match self.try_record(entry).await {
            Ok(record) => {
                debug!("Audit {} recorded for booking {}", action, booking_id);
                Some(record)
            }
            Err(e) => {
                error!("Failed to write {} audit for booking {}: {}", action, booking_id, e);
                None
            }
        }
    }

    async fn try_record(&self, entry: AuditEntry<'_>) -> StoreResult<AuditRecord> {
        let _guard = self.append_lock.lock().await;
        let mut attempt = 1;
        loop {
            let record = self.chained(&entry).await?;
            match self.store.append_audit(&record).await {
                Ok(()) => return Ok(record),
                Err(StoreError::Conflict(reason)) if attempt < APPEND_ATTEMPTS => {
                    debug!("Audit chain for booking {} moved, retrying: {}", entry.booking_id, reason);
                    attempt += 1;
                }
                Err(e) => return Err(e),
            }
        }
    }

    async fn chained(&self, entry: &AuditEntry<'_>) -> StoreResult<AuditRecord> {
        let prev_hash = self.store.latest_audit_hash(entry.booking_id).await?.unwrap_or_default();

        let mut record = AuditRecord {
            id: Uuid::new_v4(),
            booking_id: entry.booking_id,
            user_id: entry.context.user_id.clone(),
            action: entry.action,
            previous_state: entry.before.cloned(),
            new_state: entry.after.cloned(),
            changes: diff(entry.before, entry.after),
            notes: entry.notes.clone(),
            ip_address: entry.context.ip_address.clone(),
            user_agent: entry.context.user_agent.clone(),
            // Postgres keeps microseconds; the hash must survive a round trip.
            created_at: self.clock.now().trunc_subsecs(6),
            prev_hash,
            hash: String::new(),
        };
        record.hash = compute_hash(&record);
        Ok(record)
    }

    /// Oldest first.
    pub async fn trail(&self, booking_id: Uuid) -> StoreResult<Vec<AuditRecord>> {
        self.store.audit_trail(booking_id).await
    }
}

/// Field-level diff of two JSON objects. Changed or added keys become
/// `{old, new}` (a missing side is omitted); removed keys become `{old}`.
pub fn diff(before: Option<&Value>, after: Option<&Value>) -> Value {
    let empty = Map::new();
    let before_fields = before.and_then(Value::as_object).unwrap_or(&empty);
    let after_fields = after.and_then(Value::as_object).unwrap_or(&empty);

    let mut changes = Map::new();
    for (key, new) in after_fields {
        match before_fields.get(key) {
            Some(old) if old == new => {}
            Some(old) => {
                changes.insert(key.clone(), json!({ "old": old, "new": new }));
            }
            None => {
                changes.insert(key.clone(), json!({ "new": new }));
            }
        }
    }
    for (key, old) in before_fields {
        if !after_fields.contains_key(key) {
            changes.insert(key.clone(), json!({ "old": old }));
        }
    }
    Value::Object(changes)
}

/// `SHA-256(prev_hash || canonical JSON of the record without its hash)`.
pub fn compute_hash(record: &AuditRecord) -> String {
    // serde_json::Map is key-sorted, which makes this serialization canonical.
    let body = json!({
        "id": record.id,
        "booking_id": record.booking_id,
        "user_id": record.user_id,
        "action": record.action.as_str(),
        "previous_state": record.previous_state,
        "new_state": record.new_state,
        "changes": record.changes,
        "notes": record.notes,
        "ip_address": record.ip_address,
        "user_agent": record.user_agent,
        "created_at": record.created_at.to_rfc3339_opts(chrono::SecondsFormat::Micros, true),
    });

    let mut hasher = Sha256::new();
    hasher.update(record.prev_hash.as_bytes());
    hasher.update(body.to_string().as_bytes());
    format!("{:x}", hasher.finalize())
}

/// Checks a booking's trail (oldest first) for edited, inserted or removed rows.
pub fn verify_chain(records: &[AuditRecord]) -> Result<(), ChainBreak> {
    let mut expected_prev = String::new();
    for (index, record) in records.iter().enumerate() {
        if record.prev_hash != expected_prev {
            return Err(ChainBreak::BrokenLink { index, record_id: record.id });
        }
        if compute_hash(record) != record.hash {
            return Err(ChainBreak::Tampered { index, record_id: record.id });
        }
        expected_prev = record.hash.clone();
    }
    Ok(())
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::services::clock::SystemClock;
    use crate::store::MemoryStore;

    fn log(store: &MemoryStore) -> AuditLog {
        AuditLog::new(Arc::new(store.clone()), Arc::new(SystemClock))
    }

    #[test]
    fn diff_reports_changed_added_and_removed_keys() {
        let before = json!({ "status": "SOFT", "notes": "window seat", "same": 1 });
        let after = json!({ "status": "CONFIRMED", "confirmed_at": "2026-07-01T10:00:00Z", "same": 1 });

        let changes = diff(Some(&before), Some(&after));
        assert_eq!(changes["status"], json!({ "old": "SOFT", "new": "CONFIRMED" }));
        assert_eq!(changes["confirmed_at"], json!({ "new": "2026-07-01T10:00:00Z" }));
        assert_eq!(changes["notes"], json!({ "old": "window seat" }));
        assert!(changes.get("same").is_none());
    }

    #[test]
    fn diff_of_nothing_is_empty() {
        assert_eq!(diff(None, None), json!({}));
    }

    #[tokio::test]
    async fn records_form_a_verifiable_chain() {
        let store = MemoryStore::new();
        let audit = log(&store);
        let booking_id = Uuid::new_v4();
        let ctx = RequestContext::user("agent-7");
        let soft = json!({ "status": "SOFT" });
        let confirmed = json!({ "status": "CONFIRMED" });

        let first = audit
            .record(AuditEntry {
                booking_id,
                action: AuditAction::Create,
                before: None,
                after: Some(&soft),
                notes: None,
                context: &ctx,
            })
            .await
            .unwrap();
        let second = audit
            .record(AuditEntry {
                booking_id,
                action: AuditAction::Confirm,
                before: Some(&soft),
                after: Some(&confirmed),
                notes: None,
                context: &ctx,
            })
            .await
            .unwrap();

        assert_eq!(first.prev_hash, "");
        assert_eq!(second.prev_hash, first.hash);

        let mut trail = audit.trail(booking_id).await.unwrap();
        assert_eq!(verify_chain(&trail), Ok(()));

        trail[0].notes = Some("rewritten".into());
        assert!(matches!(verify_chain(&trail), Err(ChainBreak::Tampered { index: 0, .. })));

        let without_first = vec![second];
        assert!(matches!(verify_chain(&without_first), Err(ChainBreak::BrokenLink { index: 0, .. })));
    }

    #[tokio::test]
    async fn store_rejects_a_second_successor() {
        let store = MemoryStore::new();
        let audit = log(&store);
        let booking_id = Uuid::new_v4();
        let ctx = RequestContext::user("agent-7");
        let first = audit
            .record(AuditEntry {
                booking_id,
                action: AuditAction::View,
                before: None,
                after: None,
                notes: None,
                context: &ctx,
            })
            .await
            .unwrap();

        let mut fork = first.clone();
        fork.id = Uuid::new_v4();
        let err = store.append_audit(&fork).await.unwrap_err();
        assert!(matches!(err, StoreError::Conflict(_)));
        assert_eq!(audit.trail(booking_id).await.unwrap().len(), 1);
    }

    #[tokio::test(flavor = "multi_thread", worker_threads = 4)]
    async fn writers_with_separate_locks_keep_one_chain() {
        let store = MemoryStore::new();
        // Two logs over one store behave like two service instances.
        let logs = [Arc::new(log(&store)), Arc::new(log(&store))];
        let booking_id = Uuid::new_v4();

        let writers: Vec<_> = (0..4)
            .map(|i| {
                let audit = logs[i % 2].clone();
                tokio::spawn(async move {
                    let ctx = RequestContext::user(format!("agent-{}", i));
                    audit
                        .record(AuditEntry {
                            booking_id,
                            action: AuditAction::View,
                            before: None,
                            after: None,
                            notes: None,
                            context: &ctx,
                        })
                        .await
                })
            })
            .collect();
        for writer in writers {
            assert!(writer.await.unwrap().is_some());
        }

        let trail = logs[0].trail(booking_id).await.unwrap();
        assert_eq!(trail.len(), 4);
        assert_eq!(verify_chain(&trail), Ok(()));
    }

    #[tokio::test]
    async fn outage_is_swallowed() {
        let store = MemoryStore::new();
        store.set_audit_outage(true);
        let audit = log(&store);
        let ctx = RequestContext::system("test");

        let recorded = audit
            .record(AuditEntry {
                booking_id: Uuid::new_v4(),
                action: AuditAction::View,
                before: None,
                after: None,
                notes: None,
                context: &ctx,
            })
            .await;
        assert!(recorded.is_none());
    }
}
