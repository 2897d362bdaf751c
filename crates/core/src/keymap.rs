//! KeyMap: reconciling local ids with remote secondary keys
//!
//! Records live in a two-id world: a stable local identity (`id`) and one or
//! more named remote keys (`keys`). The KeyMap holds the bidirectional
//! `(type, keyName, keyValue) <-> localId` index that lets sources translate
//! between the two deterministically.
//!
//! Insertion with a new remote key for an existing local id merges; a key
//! value observed to map to a different id replaces the previous mapping
//! (last-writer-wins), and the stale reverse entry is removed so each
//! `(type, keyName)` stays a partial bijection between key values and ids.
//!
//! The KeyMap never mints ids - fresh local ids come from the schema.

use crate::record::Record;
use indexmap::IndexMap;
use parking_lot::RwLock;
use std::collections::HashMap;

#[derive(Default)]
struct KeyMapState {
    /// (type, keyName) -> keyValue -> localId
    key_to_id: HashMap<(String, String), HashMap<String, String>>,
    /// (type, keyName) -> localId -> keyValue
    id_to_key: HashMap<(String, String), HashMap<String, String>>,
}

/// Bidirectional index between local ids and named remote keys
///
/// Shared as `Arc<KeyMap>` between sources and serializers.
#[derive(Default)]
pub struct KeyMap {
    state: RwLock<KeyMapState>,
}

impl KeyMap {
    /// Create an empty key map
    pub fn new() -> Self {
        Self::default()
    }

    /// Index every `(keyName, keyValue)` pair of the record to its id
    pub fn push_record(&self, record: &Record) {
        for (key_name, key_value) in &record.keys {
            self.insert(record.kind(), key_name, key_value, record.id());
        }
    }

    /// Set one bidirectional mapping, last-writer-wins
    pub fn insert(&self, kind: &str, key_name: &str, key_value: &str, id: &str) {
        let mut state = self.state.write();
        let slot = (kind.to_string(), key_name.to_string());

        // Drop the id's previous value so the reverse direction stays single-valued.
        if let Some(ids) = state.id_to_key.get(&slot) {
            if let Some(old_value) = ids.get(id).cloned() {
                if old_value != key_value {
                    if let Some(values) = state.key_to_id.get_mut(&slot) {
                        values.remove(&old_value);
                    }
                }
            }
        }

        // Drop the value's previous id (last-writer-wins).
        if let Some(values) = state.key_to_id.get(&slot) {
            if let Some(old_id) = values.get(key_value).cloned() {
                if old_id != id {
                    if let Some(ids) = state.id_to_key.get_mut(&slot) {
                        ids.remove(&old_id);
                    }
                }
            }
        }

        state
            .key_to_id
            .entry(slot.clone())
            .or_default()
            .insert(key_value.to_string(), id.to_string());
        state
            .id_to_key
            .entry(slot)
            .or_default()
            .insert(id.to_string(), key_value.to_string());
    }

    /// Resolve a local id from any of the given keys
    ///
    /// Keys are consulted in order; the first known mapping wins. Returns
    /// `None` when no key is known.
    pub fn id_from_keys(&self, kind: &str, keys: &IndexMap<String, String>) -> Option<String> {
        for (key_name, key_value) in keys {
            if let Some(id) = self.key_to_id(kind, key_name, key_value) {
                return Some(id);
            }
        }
        None
    }

    /// Resolve the key value recorded for an id
    pub fn id_to_key(&self, kind: &str, key_name: &str, id: &str) -> Option<String> {
        self.state
            .read()
            .id_to_key
            .get(&(kind.to_string(), key_name.to_string()))
            .and_then(|ids| ids.get(id))
            .cloned()
    }

    /// Resolve the id recorded for a key value
    pub fn key_to_id(&self, kind: &str, key_name: &str, key_value: &str) -> Option<String> {
        self.state
            .read()
            .key_to_id
            .get(&(kind.to_string(), key_name.to_string()))
            .and_then(|values| values.get(key_value))
            .cloned()
    }

    /// Clear both directions of the index
    pub fn reset(&self) {
        let mut state = self.state.write();
        state.key_to_id.clear();
        state.id_to_key.clear();
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn keyed_record(id: &str, remote_id: &str) -> Record {
        Record::new("planet", id).with_key("remoteId", remote_id)
    }

    #[test]
    fn test_push_record_indexes_both_directions() {
        let key_map = KeyMap::new();
        key_map.push_record(&keyed_record("earth", "p3"));

        assert_eq!(
            key_map.key_to_id("planet", "remoteId", "p3").as_deref(),
            Some("earth")
        );
        assert_eq!(
            key_map.id_to_key("planet", "remoteId", "earth").as_deref(),
            Some("p3")
        );
    }

    #[test]
    fn test_unknown_lookups_return_none() {
        let key_map = KeyMap::new();
        assert!(key_map.key_to_id("planet", "remoteId", "p9").is_none());
        assert!(key_map.id_to_key("planet", "remoteId", "pluto").is_none());
    }

    #[test]
    fn test_id_from_keys_consults_in_order() {
        let key_map = KeyMap::new();
        key_map.insert("planet", "remoteId", "p3", "earth");

        let mut keys = IndexMap::new();
        keys.insert("legacyId".to_string(), "unknown".to_string());
        keys.insert("remoteId".to_string(), "p3".to_string());
        assert_eq!(key_map.id_from_keys("planet", &keys).as_deref(), Some("earth"));

        let mut unknown = IndexMap::new();
        unknown.insert("remoteId".to_string(), "p9".to_string());
        assert!(key_map.id_from_keys("planet", &unknown).is_none());
    }

    #[test]
    fn test_merge_new_key_for_existing_id() {
        let key_map = KeyMap::new();
        key_map.insert("planet", "remoteId", "p3", "earth");
        key_map.insert("planet", "legacyId", "old-3", "earth");

        assert_eq!(
            key_map.key_to_id("planet", "remoteId", "p3").as_deref(),
            Some("earth")
        );
        assert_eq!(
            key_map.key_to_id("planet", "legacyId", "old-3").as_deref(),
            Some("earth")
        );
    }

    #[test]
    fn test_conflict_replaces_last_writer_wins() {
        let key_map = KeyMap::new();
        key_map.insert("planet", "remoteId", "p3", "earth");
        key_map.insert("planet", "remoteId", "p3", "gaia");

        assert_eq!(
            key_map.key_to_id("planet", "remoteId", "p3").as_deref(),
            Some("gaia")
        );
        // The displaced id no longer claims the key (partial bijection).
        assert!(key_map.id_to_key("planet", "remoteId", "earth").is_none());
    }

    #[test]
    fn test_rekey_drops_stale_forward_entry() {
        let key_map = KeyMap::new();
        key_map.insert("planet", "remoteId", "p3", "earth");
        key_map.insert("planet", "remoteId", "p3-v2", "earth");

        assert!(key_map.key_to_id("planet", "remoteId", "p3").is_none());
        assert_eq!(
            key_map.key_to_id("planet", "remoteId", "p3-v2").as_deref(),
            Some("earth")
        );
        assert_eq!(
            key_map.id_to_key("planet", "remoteId", "earth").as_deref(),
            Some("p3-v2")
        );
    }

    #[test]
    fn test_types_are_isolated() {
        let key_map = KeyMap::new();
        key_map.insert("planet", "remoteId", "3", "earth");
        key_map.insert("moon", "remoteId", "3", "luna");

        assert_eq!(
            key_map.key_to_id("planet", "remoteId", "3").as_deref(),
            Some("earth")
        );
        assert_eq!(
            key_map.key_to_id("moon", "remoteId", "3").as_deref(),
            Some("luna")
        );
    }

    #[test]
    fn test_reset_clears_everything() {
        let key_map = KeyMap::new();
        key_map.insert("planet", "remoteId", "p3", "earth");
        key_map.reset();
        assert!(key_map.key_to_id("planet", "remoteId", "p3").is_none());
        assert!(key_map.id_to_key("planet", "remoteId", "earth").is_none());
    }
}
