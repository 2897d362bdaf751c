//! Transform log: the ordered record of applied transforms
//!
//! An append-only sequence of transform ids with an O(1) membership test.
//! The log is the authority for "have we already applied this?" during
//! replication - syncable sources consult it to deduplicate inbound
//! transforms. Within one source the log reflects the exact order transforms
//! were applied (append-only, totally ordered).
//!
//! Persists under `<source>-log` in the bucket. `truncate(id)` removes ids
//! up to and including `id`; `rollback(id)` removes ids after `id` and
//! notifies rollback listeners.

use crate::bucket::Bucket;
use crate::notifier::{ListenerKey, Notifier};
use orrery_core::{Error, Result};
use parking_lot::RwLock;
use std::collections::HashSet;
use std::sync::Arc;
use tracing::debug;

/// Payload of a rollback notification
#[derive(Debug, Clone, PartialEq)]
pub struct RollbackEvent {
    /// The id rolled back to; entries after it were removed
    pub transform_id: String,
    /// The removed ids, oldest first
    pub removed: Vec<String>,
}

struct LogState {
    entries: Vec<String>,
    membership: HashSet<String>,
}

/// Append-only ordered log of transform ids
pub struct TransformLog {
    name: String,
    bucket: Option<Arc<dyn Bucket>>,
    state: RwLock<LogState>,
    rollback_notifier: Notifier<RollbackEvent>,
}

impl TransformLog {
    /// Create a log, hydrating entries from the bucket
    pub fn new(name: impl Into<String>, bucket: Option<Arc<dyn Bucket>>) -> Result<Self> {
        let name = name.into();
        let mut entries: Vec<String> = Vec::new();
        if let Some(bucket) = &bucket {
            if let Some(value) = bucket.get_item(&name)? {
                entries = serde_json::from_value(value)?;
                debug!(log = %name, entries = entries.len(), "hydrated transform log");
            }
        }
        let membership = entries.iter().cloned().collect();
        Ok(Self {
            name,
            bucket,
            state: RwLock::new(LogState {
                entries,
                membership,
            }),
            rollback_notifier: Notifier::new(),
        })
    }

    /// The log's name (and bucket key)
    pub fn name(&self) -> &str {
        &self.name
    }

    /// Append transform ids in order
    pub fn append(&self, ids: &[String]) -> Result<()> {
        {
            let mut state = self.state.write();
            for id in ids {
                if state.membership.insert(id.clone()) {
                    state.entries.push(id.clone());
                }
            }
        }
        self.persist()
    }

    /// O(1) membership test
    pub fn contains(&self, id: &str) -> bool {
        self.state.read().membership.contains(id)
    }

    /// The most recently appended id
    pub fn head(&self) -> Option<String> {
        self.state.read().entries.last().cloned()
    }

    /// Number of logged ids
    pub fn len(&self) -> usize {
        self.state.read().entries.len()
    }

    /// Check whether the log is empty
    pub fn is_empty(&self) -> bool {
        self.state.read().entries.is_empty()
    }

    /// Snapshot of all logged ids, oldest first
    pub fn entries(&self) -> Vec<String> {
        self.state.read().entries.clone()
    }

    /// Ids logged strictly before `id`
    pub fn before(&self, id: &str) -> Result<Vec<String>> {
        let state = self.state.read();
        let position = self.position_of(&state, id)?;
        Ok(state.entries[..position].to_vec())
    }

    /// Ids logged strictly after `id`
    pub fn after(&self, id: &str) -> Result<Vec<String>> {
        let state = self.state.read();
        let position = self.position_of(&state, id)?;
        Ok(state.entries[position + 1..].to_vec())
    }

    /// Remove ids up to and including `id`
    pub fn truncate(&self, id: &str) -> Result<()> {
        {
            let mut state = self.state.write();
            let position = self.position_of(&state, id)?;
            let removed: Vec<String> = state.entries.drain(..=position).collect();
            for removed_id in &removed {
                state.membership.remove(removed_id);
            }
        }
        self.persist()
    }

    /// Remove ids after `id` and notify rollback listeners
    pub fn rollback(&self, id: &str) -> Result<()> {
        let removed = {
            let mut state = self.state.write();
            let position = self.position_of(&state, id)?;
            let removed: Vec<String> = state.entries.drain(position + 1..).collect();
            for removed_id in &removed {
                state.membership.remove(removed_id);
            }
            removed
        };
        self.persist()?;
        debug!(log = %self.name, to = id, removed = removed.len(), "rolled back transform log");
        self.rollback_notifier.emit(&RollbackEvent {
            transform_id: id.to_string(),
            removed,
        });
        Ok(())
    }

    /// Remove every logged id
    pub fn clear(&self) -> Result<()> {
        {
            let mut state = self.state.write();
            state.entries.clear();
            state.membership.clear();
        }
        self.persist()
    }

    /// Observe rollbacks
    pub fn on_rollback(&self, listener: impl FnMut(&RollbackEvent) + Send + 'static) -> ListenerKey {
        self.rollback_notifier.on(listener)
    }

    /// Remove a rollback listener
    pub fn off_rollback(&self, key: ListenerKey) {
        self.rollback_notifier.off(key);
    }

    fn position_of(&self, state: &LogState, id: &str) -> Result<usize> {
        state
            .entries
            .iter()
            .position(|entry| entry == id)
            .ok_or_else(|| {
                Error::operation_not_allowed(format!(
                    "transform {} is not contained in log {}",
                    id, self.name
                ))
            })
    }

    fn persist(&self) -> Result<()> {
        let Some(bucket) = &self.bucket else {
            return Ok(());
        };
        let entries = self.entries();
        bucket.set_item(&self.name, serde_json::to_value(entries)?)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::bucket::MemoryBucket;
    use parking_lot::Mutex;

    fn ids(values: &[&str]) -> Vec<String> {
        values.iter().map(|s| s.to_string()).collect()
    }

    #[test]
    fn test_append_and_contains() {
        let log = TransformLog::new("log", None).unwrap();
        log.append(&ids(&["t1", "t2"])).unwrap();

        assert!(log.contains("t1"));
        assert!(log.contains("t2"));
        assert!(!log.contains("t3"));
        assert_eq!(log.head().as_deref(), Some("t2"));
        assert_eq!(log.len(), 2);
    }

    #[test]
    fn test_append_deduplicates() {
        let log = TransformLog::new("log", None).unwrap();
        log.append(&ids(&["t1"])).unwrap();
        log.append(&ids(&["t1", "t2"])).unwrap();
        assert_eq!(log.entries(), ids(&["t1", "t2"]));
    }

    #[test]
    fn test_before_and_after() {
        let log = TransformLog::new("log", None).unwrap();
        log.append(&ids(&["t1", "t2", "t3"])).unwrap();

        assert_eq!(log.before("t2").unwrap(), ids(&["t1"]));
        assert_eq!(log.after("t2").unwrap(), ids(&["t3"]));
        assert!(log.before("missing").is_err());
    }

    #[test]
    fn test_truncate_removes_through_id() {
        let log = TransformLog::new("log", None).unwrap();
        log.append(&ids(&["t1", "t2", "t3"])).unwrap();
        log.truncate("t2").unwrap();

        assert_eq!(log.entries(), ids(&["t3"]));
        assert!(!log.contains("t1"));
        assert!(!log.contains("t2"));
    }

    #[test]
    fn test_rollback_removes_after_id_and_notifies() {
        let log = TransformLog::new("log", None).unwrap();
        log.append(&ids(&["t1", "t2", "t3"])).unwrap();

        let seen: std::sync::Arc<Mutex<Vec<RollbackEvent>>> =
            std::sync::Arc::new(Mutex::new(Vec::new()));
        let sink = seen.clone();
        log.on_rollback(move |event| sink.lock().push(event.clone()));

        log.rollback("t1").unwrap();
        assert_eq!(log.entries(), ids(&["t1"]));

        let events = seen.lock();
        assert_eq!(events.len(), 1);
        assert_eq!(events[0].transform_id, "t1");
        assert_eq!(events[0].removed, ids(&["t2", "t3"]));
    }

    #[test]
    fn test_membership_is_monotonic_until_rollback() {
        let log = TransformLog::new("log", None).unwrap();
        log.append(&ids(&["t1"])).unwrap();
        assert!(log.contains("t1"));
        log.append(&ids(&["t2"])).unwrap();
        assert!(log.contains("t1"));

        log.rollback("t1").unwrap();
        assert!(log.contains("t1"));
        assert!(!log.contains("t2"));
    }

    #[test]
    fn test_clear() {
        let log = TransformLog::new("log", None).unwrap();
        log.append(&ids(&["t1", "t2"])).unwrap();
        log.clear().unwrap();
        assert!(log.is_empty());
        assert!(!log.contains("t1"));
    }

    #[test]
    fn test_persistence_round_trip() {
        let bucket: Arc<dyn Bucket> = Arc::new(MemoryBucket::new());
        {
            let log = TransformLog::new("source-log", Some(bucket.clone())).unwrap();
            log.append(&ids(&["t1", "t2"])).unwrap();
        }

        let revived = TransformLog::new("source-log", Some(bucket)).unwrap();
        assert_eq!(revived.entries(), ids(&["t1", "t2"]));
        assert!(revived.contains("t1"));
    }
}
