//! Derived inverse-relationship index
//!
//! For every identity the index records the set of `(record, relationship)`
//! pairs whose linkage points at it. The cache owns this structure and keeps
//! it in step with the store on every applied operation; the removed-record
//! cascade walks it to nullify or shrink the relationships of referrers.

use orrery_core::RecordIdentity;
use std::collections::{HashMap, HashSet};

/// One back-edge: `record.relationship` points at the indexed identity
#[derive(Debug, Clone, PartialEq, Eq, Hash)]
pub struct InverseLink {
    /// The record owning the forward edge
    pub record: RecordIdentity,
    /// The relationship carrying it
    pub relationship: String,
}

/// Back-edge index over the whole store
#[derive(Debug, Default, Clone)]
pub struct InverseIndex {
    links: HashMap<RecordIdentity, HashSet<InverseLink>>,
}

impl InverseIndex {
    /// Create an empty index
    pub fn new() -> Self {
        Self::default()
    }

    /// Record that `source.relationship` points at `target`
    pub fn add(&mut self, target: &RecordIdentity, source: &RecordIdentity, relationship: &str) {
        self.links
            .entry(target.clone())
            .or_default()
            .insert(InverseLink {
                record: source.clone(),
                relationship: relationship.to_string(),
            });
    }

    /// Forget that `source.relationship` points at `target`
    pub fn remove(&mut self, target: &RecordIdentity, source: &RecordIdentity, relationship: &str) {
        if let Some(set) = self.links.get_mut(target) {
            set.remove(&InverseLink {
                record: source.clone(),
                relationship: relationship.to_string(),
            });
            if set.is_empty() {
                self.links.remove(target);
            }
        }
    }

    /// All back-edges pointing at `target`
    pub fn links_to(&self, target: &RecordIdentity) -> Vec<InverseLink> {
        self.links
            .get(target)
            .map(|set| set.iter().cloned().collect())
            .unwrap_or_default()
    }

    /// Check whether anything points at `target`
    pub fn has_links_to(&self, target: &RecordIdentity) -> bool {
        self.links.get(target).is_some_and(|set| !set.is_empty())
    }

    /// Drop every back-edge
    pub fn clear(&mut self) {
        self.links.clear();
    }
}
