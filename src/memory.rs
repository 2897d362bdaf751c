//! In-memory source
//!
//! `MemorySource` is the concrete source whose sink is the record cache. It
//! answers queries from the cache, applies transforms to it, and accepts
//! replicated transforms from peer sources - all through the uniform kernel
//! pipelines, so every applied transform lands in the log and reaches
//! `transform` listeners before the caller's result resolves.

use orrery_cache::{LiveQuery, RecordCache};
use orrery_core::{
    Error, KeyMap, Query, QueryInput, Record, RecordIdentity, RecordOperation, Result, Schema,
    Transform, UpdateData,
};
use orrery_kernel::{
    QueryHints, QueryPerformer, SourceBase, SourceKernel, SourceSettings, SyncHints, SyncPerformer,
    Task, TaskOutcome, TaskPerformer, UpdateHints, UpdatePerformer,
};
use std::sync::Arc;

/// Construction options for [`MemorySource`]
pub struct MemorySourceSettings {
    /// Kernel options: name, bucket, activation, queue overrides
    pub source: SourceSettings,
    /// Schema shared with the cache
    pub schema: Arc<Schema>,
    /// KeyMap fed by applied records
    pub key_map: Option<Arc<KeyMap>>,
    /// Create missing mirror targets as placeholders (default false)
    pub allow_create_placeholders: bool,
    /// Coalesce live-query deliveries per patch batch (default true)
    pub debounce_live_queries: bool,
}

impl MemorySourceSettings {
    /// Default settings over a schema
    pub fn new(schema: Arc<Schema>) -> Self {
        Self {
            source: SourceSettings::default(),
            schema,
            key_map: None,
            allow_create_placeholders: false,
            debounce_live_queries: true,
        }
    }
}

/// A source backed by the in-memory record cache
pub struct MemorySource {
    kernel: SourceKernel,
    cache: RecordCache,
}

impl MemorySource {
    /// Create a memory source with default settings
    pub fn new(schema: Arc<Schema>) -> Result<Arc<Self>> {
        Self::with_settings(MemorySourceSettings::new(schema))
    }

    /// Create a memory source from settings
    pub fn with_settings(settings: MemorySourceSettings) -> Result<Arc<Self>> {
        let mut cache_builder = RecordCache::builder(settings.schema.clone())
            .allow_create_placeholders(settings.allow_create_placeholders)
            .debounce_live_queries(settings.debounce_live_queries);
        if let Some(key_map) = &settings.key_map {
            cache_builder = cache_builder.key_map(key_map.clone());
        }
        let cache = cache_builder.build();

        let mut source_settings = settings.source;
        source_settings.schema = Some(settings.schema);
        source_settings.key_map = settings.key_map;
        let kernel = SourceKernel::new(source_settings)?;

        let source = Arc::new(Self { kernel, cache });

        // The queues replay persisted tasks through the source itself.
        let source_dyn: Arc<dyn TaskPerformer> = source.clone();
        let performer: std::sync::Weak<dyn TaskPerformer> = Arc::downgrade(&source_dyn);
        source.kernel.attach_performer(performer);

        // Schema upgrades re-validate the cache.
        let cache_for_upgrade = source.cache.clone();
        source.kernel.events().upgrade.on(move |_| {
            cache_for_upgrade.upgrade();
        });

        // Re-drain anything hydrated before the performer was attached.
        if source.kernel.activated() {
            source.kernel.request_queue().start();
            source.kernel.sync_queue().start();
        }

        Ok(source)
    }

    /// The backing record cache
    pub fn cache(&self) -> &RecordCache {
        &self.cache
    }

    /// Subscribe a standing query to the cache
    pub fn live_query(&self, input: impl Into<QueryInput>) -> Result<LiveQuery> {
        self.cache.live_query(input)
    }

    /// Look up one record in the cache
    pub fn record(&self, identity: &RecordIdentity) -> Option<Record> {
        self.cache.record(identity)
    }

    /// Clear the cache and the kernel's durable state
    pub fn reset(&self) -> Result<()> {
        self.cache.reset();
        self.kernel.reset()
    }
}

impl SourceBase for MemorySource {
    fn kernel(&self) -> &SourceKernel {
        &self.kernel
    }
}

impl QueryPerformer for MemorySource {
    fn perform_query(&self, query: &Query, hints: &mut QueryHints) -> Result<TaskOutcome> {
        // Hinted data short-circuits evaluation.
        if let Some(data) = hints.data.take() {
            let mut outcome = TaskOutcome::query(data);
            if let Some(details) = hints.details.take() {
                outcome = outcome.with_details(details);
            }
            return Ok(outcome);
        }
        let data = self.cache.query_built(query)?;
        let mut outcome = TaskOutcome::query(data);
        if let Some(details) = hints.details.take() {
            outcome = outcome.with_details(details);
        }
        Ok(outcome)
    }
}

impl UpdatePerformer for MemorySource {
    fn perform_update(
        &self,
        transform: &Transform,
        hints: &mut UpdateHints,
    ) -> Result<TaskOutcome> {
        let result = self.cache.patch(transform.operations.clone())?;
        let data = hints.data.take().unwrap_or_else(|| {
            UpdateData::from_results(result.data, transform.operations.len() == 1)
        });
        let mut outcome = TaskOutcome::update(data, vec![transform.clone()]);
        if let Some(details) = hints.details.take() {
            outcome = outcome.with_details(details);
        }
        Ok(outcome)
    }
}

impl SyncPerformer for MemorySource {
    /// Inbound transforms reconcile against the local cache: a replicated
    /// `addRecord` for a known identity degrades to `updateRecord`, and a
    /// replicated `updateRecord` for an unknown identity upgrades to
    /// `addRecord`. Local `update` calls stay strict; only replication
    /// absorbs the remote/local drift.
    fn perform_sync(&self, transform: &Transform, _hints: &mut SyncHints) -> Result<TaskOutcome> {
        let operations: Vec<RecordOperation> = transform
            .operations
            .iter()
            .cloned()
            .map(|op| self.reconcile(op))
            .collect();
        self.cache.patch(operations)?;
        Ok(TaskOutcome::transforms(vec![transform.clone()]))
    }
}

impl MemorySource {
    fn reconcile(&self, op: RecordOperation) -> RecordOperation {
        match op {
            RecordOperation::AddRecord { record }
                if self.cache.includes_record(&record.identity) =>
            {
                RecordOperation::UpdateRecord { record }
            }
            RecordOperation::UpdateRecord { record }
                if !self.cache.includes_record(&record.identity) =>
            {
                RecordOperation::AddRecord { record }
            }
            other => other,
        }
    }
}

impl TaskPerformer for MemorySource {
    /// Replay path: tasks hydrated from the bucket, drained behind fresh
    /// pushes, or re-run via `retry`. Requests are re-hydrated from the task
    /// payload with default hints, and applied transforms are recorded here
    /// because the pipeline's own bookkeeping is not in the loop.
    fn perform(&self, task: &Task) -> Result<TaskOutcome> {
        match task.kind.as_str() {
            "query" => {
                let query: Query = task.request()?;
                self.perform_query(&query, &mut QueryHints::default())
            }
            "update" => {
                let transform: Transform = task.request()?;
                if self.kernel.transform_log().contains(&transform.id) {
                    return Ok(TaskOutcome::none());
                }
                let outcome = self.perform_update(&transform, &mut UpdateHints::default())?;
                self.kernel.transformed(&outcome.transforms)?;
                Ok(outcome)
            }
            "sync" => {
                let transform: Transform = task.request()?;
                if self.kernel.transform_log().contains(&transform.id) {
                    return Ok(TaskOutcome::none());
                }
                let outcome = self.perform_sync(&transform, &mut SyncHints::default())?;
                self.kernel.transformed(&outcome.transforms)?;
                Ok(outcome)
            }
            other => Err(Error::operation_not_allowed(format!(
                "memory source cannot perform {} tasks",
                other
            ))),
        }
    }
}
