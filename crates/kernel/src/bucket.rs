//! Bucket: pluggable key/value persistence
//!
//! A bucket stores opaque JSON-serializable values under string keys. The
//! kernel persists its durable state through this interface: the transform
//! log under `<source>-log`, pending request tasks under `<source>-requests`,
//! and pending sync tasks under `<source>-sync`.
//!
//! A bucket is assumed to serialize its own writes; callers must not assume
//! atomicity across keys.

use orrery_core::Result;
use parking_lot::RwLock;
use serde_json::Value;
use std::collections::HashMap;

/// Pluggable persistence provider
pub trait Bucket: Send + Sync {
    /// Read the value stored under `key`
    fn get_item(&self, key: &str) -> Result<Option<Value>>;

    /// Store `value` under `key`
    fn set_item(&self, key: &str, value: Value) -> Result<()>;

    /// Remove the value stored under `key`
    fn remove_item(&self, key: &str) -> Result<()>;

    /// Remove every stored value
    fn clear(&self) -> Result<()>;

    /// All keys with stored values
    fn keys(&self) -> Result<Vec<String>>;
}

/// In-memory bucket; the default when nothing durable is configured
#[derive(Default)]
pub struct MemoryBucket {
    items: RwLock<HashMap<String, Value>>,
}

impl MemoryBucket {
    /// Create an empty bucket
    pub fn new() -> Self {
        Self::default()
    }
}

impl Bucket for MemoryBucket {
    fn get_item(&self, key: &str) -> Result<Option<Value>> {
        Ok(self.items.read().get(key).cloned())
    }

    fn set_item(&self, key: &str, value: Value) -> Result<()> {
        self.items.write().insert(key.to_string(), value);
        Ok(())
    }

    fn remove_item(&self, key: &str) -> Result<()> {
        self.items.write().remove(key);
        Ok(())
    }

    fn clear(&self) -> Result<()> {
        self.items.write().clear();
        Ok(())
    }

    fn keys(&self) -> Result<Vec<String>> {
        Ok(self.items.read().keys().cloned().collect())
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use serde_json::json;

    #[test]
    fn test_set_get_remove() {
        let bucket = MemoryBucket::new();
        bucket.set_item("a", json!({"n": 1})).unwrap();
        assert_eq!(bucket.get_item("a").unwrap(), Some(json!({"n": 1})));

        bucket.remove_item("a").unwrap();
        assert_eq!(bucket.get_item("a").unwrap(), None);
    }

    #[test]
    fn test_keys_and_clear() {
        let bucket = MemoryBucket::new();
        bucket.set_item("a", json!(1)).unwrap();
        bucket.set_item("b", json!(2)).unwrap();

        let mut keys = bucket.keys().unwrap();
        keys.sort();
        assert_eq!(keys, vec!["a", "b"]);

        bucket.clear().unwrap();
        assert!(bucket.keys().unwrap().is_empty());
    }

    #[test]
    fn test_overwrite_replaces() {
        let bucket = MemoryBucket::new();
        bucket.set_item("a", json!(1)).unwrap();
        bucket.set_item("a", json!(2)).unwrap();
        assert_eq!(bucket.get_item("a").unwrap(), Some(json!(2)));
    }
}
