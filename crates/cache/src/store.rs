//! Normalized record store
//!
//! The store is a flat tree keyed `records[type][id] -> Record`. Pointers
//! between records are identity-valued, so cyclic record graphs are plain
//! data. Maps are insertion-ordered: enumeration order and sort tie-breaking
//! follow the order records were added.

use indexmap::IndexMap;
use orrery_core::{Record, RecordIdentity};

/// Flat map of records keyed by type and id
#[derive(Debug, Default, Clone)]
pub struct RecordStore {
    records: IndexMap<String, IndexMap<String, Record>>,
}

impl RecordStore {
    /// Create an empty store
    pub fn new() -> Self {
        Self::default()
    }

    /// Look up a record by identity
    pub fn get(&self, identity: &RecordIdentity) -> Option<&Record> {
        self.records.get(&identity.kind)?.get(&identity.id)
    }

    /// Check whether the store holds a record
    pub fn contains(&self, identity: &RecordIdentity) -> bool {
        self.get(identity).is_some()
    }

    /// Insert or replace a record
    ///
    /// A replaced record keeps its original insertion slot; a new record
    /// appends to its type's enumeration order.
    pub fn put(&mut self, record: Record) {
        self.records
            .entry(record.kind().to_string())
            .or_default()
            .insert(record.id().to_string(), record);
    }

    /// Remove a record, returning it if present
    ///
    /// Uses a shifting removal so the remaining enumeration order is
    /// preserved.
    pub fn remove(&mut self, identity: &RecordIdentity) -> Option<Record> {
        self.records
            .get_mut(&identity.kind)?
            .shift_remove(&identity.id)
    }

    /// Iterate all records of a type in insertion order
    pub fn of_type<'a>(&'a self, kind: &str) -> impl Iterator<Item = &'a Record> + 'a {
        self.records
            .get(kind)
            .into_iter()
            .flat_map(|by_id| by_id.values())
    }

    /// Count records of a type
    pub fn count_of_type(&self, kind: &str) -> usize {
        self.records.get(kind).map_or(0, IndexMap::len)
    }

    /// Iterate every record in the store
    pub fn iter(&self) -> impl Iterator<Item = &Record> {
        self.records.values().flat_map(|by_id| by_id.values())
    }

    /// Drop every record
    pub fn clear(&mut self) {
        self.records.clear();
    }

    /// Drop every record whose type fails the predicate
    pub fn retain_types(&mut self, mut keep: impl FnMut(&str) -> bool) {
        self.records.retain(|kind, _| keep(kind));
    }
}
