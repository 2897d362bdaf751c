//! RecordCache: the normalized in-memory record graph
//!
//! The cache is a cloneable facade over shared state, applying atomic
//! operation batches, maintaining the inverse-relationship index, answering
//! structured queries, and hosting live queries.
//!
//! ## Patch protocol
//!
//! `patch` applies a batch all-or-nothing. Every operation resolves its
//! target, computes its inverse from the pre-state, applies, and synthesizes
//! mirror operations for schema-declared inverse relationships. If any
//! operation fails, everything applied so far is undone via the collected
//! inverses and the error propagates; no notification fires for a failed
//! batch. On success, `patch` listeners observe every applied
//! `(operation, inverse)` pair in application order, and live queries are
//! notified per operation (non-debounced) or once per batch (debounced).

use crate::inverse::InverseIndex;
use crate::live::{LiveQuery, LiveQueryInner};
use crate::processors::{apply_operation, AppliedPair, ProcessorContext};
use crate::query_engine;
use crate::store::RecordStore;
use orrery_core::{
    build_query, KeyMap, Query, QueryData, QueryInput, QueryResult, Record, RecordIdentity,
    RecordOperation, Result, Schema,
};
use parking_lot::{Mutex, RwLock};
use std::sync::Arc;
use tracing::debug;

/// Handle for removing a patch listener
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub struct PatchListenerKey(u64);

type PatchListener = Box<dyn FnMut(&RecordOperation, &RecordOperation) + Send>;

pub(crate) struct CacheState {
    pub(crate) store: RecordStore,
    pub(crate) inverse: InverseIndex,
}

/// Settings recognized by [`RecordCache`]
pub struct CacheSettings {
    /// Schema consulted for declarations and mirror arities
    pub schema: Arc<Schema>,
    /// KeyMap fed with applied record keys
    pub key_map: Option<Arc<KeyMap>>,
    /// Create missing mirror targets as placeholder records (default false)
    pub allow_create_placeholders: bool,
    /// Coalesce live-query deliveries per patch batch (default true)
    pub debounce_live_queries: bool,
}

/// The in-memory record cache
#[derive(Clone)]
pub struct RecordCache {
    state: Arc<RwLock<CacheState>>,
    settings: Arc<CacheSettings>,
    patch_listeners: Arc<Mutex<Vec<(PatchListenerKey, PatchListener)>>>,
    live_queries: Arc<Mutex<Vec<Arc<LiveQueryInner>>>>,
    next_listener_key: Arc<Mutex<u64>>,
}

/// Result of one applied patch batch
#[derive(Debug, Clone, PartialEq)]
pub struct PatchResult {
    /// Primary record per caller-supplied operation, positionally aligned
    pub data: Vec<Option<Record>>,
    /// Inverse operations that undo the batch, in undo order
    pub inverse: Vec<RecordOperation>,
    /// Every applied operation (mirrors included), in application order
    pub applied: Vec<RecordOperation>,
}

impl RecordCache {
    /// Create a cache with default settings
    pub fn new(schema: Arc<Schema>) -> Self {
        Self::builder(schema).build()
    }

    /// Start a cache builder
    pub fn builder(schema: Arc<Schema>) -> RecordCacheBuilder {
        RecordCacheBuilder {
            schema,
            key_map: None,
            allow_create_placeholders: false,
            debounce_live_queries: true,
        }
    }

    /// The cache's schema
    pub fn schema(&self) -> &Arc<Schema> {
        &self.settings.schema
    }

    // ========================================================================
    // Patch
    // ========================================================================

    /// Apply a batch of operations atomically
    pub fn patch(&self, operations: Vec<RecordOperation>) -> Result<PatchResult> {
        let mut pairs: Vec<AppliedPair> = Vec::new();
        let mut data: Vec<Option<Record>> = Vec::with_capacity(operations.len());

        {
            let mut guard = self.state.write();
            let state = &mut *guard;
            let ctx = ProcessorContext {
                schema: &self.settings.schema,
                key_map: self.settings.key_map.as_deref(),
                allow_create_placeholders: self.settings.allow_create_placeholders,
            };

            for operation in &operations {
                match apply_operation(
                    &mut state.store,
                    &mut state.inverse,
                    &ctx,
                    operation,
                    &mut pairs,
                ) {
                    Ok(primary) => data.push(primary),
                    Err(error) => {
                        // All-or-nothing: undo everything applied so far.
                        debug!(op = operation.op(), %error, "patch failed; rolling back batch");
                        let mut scratch = Vec::new();
                        for (_, inverse) in pairs.iter().rev() {
                            let _ = apply_operation(
                                &mut state.store,
                                &mut state.inverse,
                                &ctx,
                                inverse,
                                &mut scratch,
                            );
                        }
                        return Err(error);
                    }
                }
            }
        }

        // Notifications fire only after the whole batch committed, with the
        // state lock released so listeners may re-enter the cache.
        {
            let mut listeners = self.patch_listeners.lock();
            for (operation, inverse) in &pairs {
                for (_, listener) in listeners.iter_mut() {
                    listener(operation, inverse);
                }
            }
        }
        let live: Vec<Arc<LiveQueryInner>> = self.live_queries.lock().clone();
        for live_query in &live {
            for _ in &pairs {
                live_query.on_patch();
            }
            live_query.flush();
        }

        let mut inverse: Vec<RecordOperation> = Vec::with_capacity(pairs.len());
        let mut applied: Vec<RecordOperation> = Vec::with_capacity(pairs.len());
        for (operation, _) in &pairs {
            applied.push(operation.clone());
        }
        for (_, inverse_op) in pairs.into_iter().rev() {
            inverse.push(inverse_op);
        }

        Ok(PatchResult {
            data,
            inverse,
            applied,
        })
    }

    /// Apply a single operation
    pub fn patch_op(&self, operation: RecordOperation) -> Result<PatchResult> {
        self.patch(vec![operation])
    }

    // ========================================================================
    // Query
    // ========================================================================

    /// Evaluate a query against the cache
    pub fn query(&self, input: impl Into<QueryInput>) -> Result<QueryData> {
        let query = build_query(input, None, None)?;
        self.query_built(&query)
    }

    /// Evaluate an already-normalized query
    pub fn query_built(&self, query: &Query) -> Result<QueryData> {
        let state = self.state.read();
        let mut results: Vec<QueryResult> = Vec::with_capacity(query.expressions.len());
        for expression in &query.expressions {
            results.push(query_engine::evaluate(&state.store, expression)?);
        }
        Ok(QueryData::from_results(results, query.is_single()))
    }

    // ========================================================================
    // Direct accessors
    // ========================================================================

    /// Look up one record
    pub fn record(&self, identity: &RecordIdentity) -> Option<Record> {
        self.state.read().store.get(identity).cloned()
    }

    /// Check whether a record is present
    pub fn includes_record(&self, identity: &RecordIdentity) -> bool {
        self.state.read().store.contains(identity)
    }

    /// Snapshot all records of a type, in insertion order
    pub fn records(&self, kind: &str) -> Vec<Record> {
        self.state.read().store.of_type(kind).cloned().collect()
    }

    /// Count records of a type
    pub fn record_count(&self, kind: &str) -> usize {
        self.state.read().store.count_of_type(kind)
    }

    /// Check whether anything links to the given identity
    pub fn has_inverse_links_to(&self, identity: &RecordIdentity) -> bool {
        self.state.read().inverse.has_links_to(identity)
    }

    // ========================================================================
    // Live queries
    // ========================================================================

    /// Subscribe a standing query to cache changes
    pub fn live_query(&self, input: impl Into<QueryInput>) -> Result<LiveQuery> {
        let query = build_query(input, None, None)?;
        let inner = Arc::new(LiveQueryInner::new(
            query,
            self.settings.debounce_live_queries,
            self.state.clone(),
        ));
        self.live_queries.lock().push(inner.clone());
        Ok(LiveQuery::new(inner, self.live_queries.clone()))
    }

    // ========================================================================
    // Patch listeners
    // ========================================================================

    /// Observe every applied `(operation, inverse)` pair
    pub fn on_patch(
        &self,
        listener: impl FnMut(&RecordOperation, &RecordOperation) + Send + 'static,
    ) -> PatchListenerKey {
        let key = {
            let mut next = self.next_listener_key.lock();
            *next += 1;
            PatchListenerKey(*next)
        };
        self.patch_listeners.lock().push((key, Box::new(listener)));
        key
    }

    /// Remove a patch listener
    pub fn off_patch(&self, key: PatchListenerKey) {
        self.patch_listeners.lock().retain(|(k, _)| *k != key);
    }

    // ========================================================================
    // Lifecycle
    // ========================================================================

    /// Drop every record and derived index entry
    pub fn reset(&self) {
        let mut state = self.state.write();
        state.store.clear();
        state.inverse.clear();
        debug!("cache reset");
    }

    /// Re-validate contents against the (upgraded) schema
    ///
    /// Records of types no longer declared are dropped and the inverse index
    /// is rebuilt from what remains.
    pub fn upgrade(&self) {
        let schema = &self.settings.schema;
        let mut state = self.state.write();
        state.store.retain_types(|kind| schema.has_model(kind));

        let mut rebuilt = InverseIndex::new();
        for record in state.store.iter() {
            for (rel_name, rel) in &record.relationships {
                for target in rel.data.identities() {
                    rebuilt.add(target, &record.identity, rel_name);
                }
            }
        }
        state.inverse = rebuilt;
        debug!(version = schema.version(), "cache upgraded to schema version");
    }
}

/// Builder for [`RecordCache`]
pub struct RecordCacheBuilder {
    schema: Arc<Schema>,
    key_map: Option<Arc<KeyMap>>,
    allow_create_placeholders: bool,
    debounce_live_queries: bool,
}

impl RecordCacheBuilder {
    /// Attach a key map
    pub fn key_map(mut self, key_map: Arc<KeyMap>) -> Self {
        self.key_map = Some(key_map);
        self
    }

    /// Allow mirror operations to create missing targets
    pub fn allow_create_placeholders(mut self, allow: bool) -> Self {
        self.allow_create_placeholders = allow;
        self
    }

    /// Control live-query debouncing
    pub fn debounce_live_queries(mut self, debounce: bool) -> Self {
        self.debounce_live_queries = debounce;
        self
    }

    /// Finish the cache
    pub fn build(self) -> RecordCache {
        RecordCache {
            state: Arc::new(RwLock::new(CacheState {
                store: RecordStore::new(),
                inverse: InverseIndex::new(),
            })),
            settings: Arc::new(CacheSettings {
                schema: self.schema,
                key_map: self.key_map,
                allow_create_placeholders: self.allow_create_placeholders,
                debounce_live_queries: self.debounce_live_queries,
            }),
            patch_listeners: Arc::new(Mutex::new(Vec::new())),
            live_queries: Arc::new(Mutex::new(Vec::new())),
            next_listener_key: Arc::new(Mutex::new(0)),
        }
    }
}
