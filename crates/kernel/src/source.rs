//! Source kernel
//!
//! The kernel is the machinery every concrete source inherits: a durable
//! transform log, a request queue and a sync queue (each bucketed with the
//! source's bucket unless overridden), the event registries, and the
//! lifecycle switch. Concrete sources embed a kernel and layer the interface
//! contracts (queryable, updatable, syncable, pushable, pullable) on top.
//!
//! ## Lifecycle
//!
//! Construction hydrates the log and queues from the bucket. With
//! `auto_activate` (the default) the queues start immediately; otherwise they
//! stay paused until `activate()`. With `auto_upgrade` (the default) the
//! kernel subscribes to schema upgrades and relays them as `upgrade` events.
//!
//! ## Transforms
//!
//! `transformed` is the single funnel for applied transforms: each previously
//! unseen transform is appended to the log and emitted to `transform`
//! listeners - strictly before the mutating caller's result resolves, so
//! replication consumers always observe a transform before its originator
//! continues.

use crate::bucket::Bucket;
use crate::hints::{PullHints, PushHints, QueryHints, SyncHints, UpdateHints};
use crate::notifier::{InterceptNotifier, Notifier, TryNotifier};
use crate::task::TaskPerformer;
use crate::task_queue::{TaskQueue, TaskQueueSettings};
use crate::transform_log::TransformLog;
use orrery_core::schema::UpgradeListenerKey;
use orrery_core::{Error, KeyMap, Query, QueryData, Result, Schema, Transform, UpdateData};
use parking_lot::Mutex;
use std::sync::atomic::{AtomicBool, AtomicU64, Ordering};
use std::sync::{Arc, Weak};
use tracing::info;

static SOURCE_COUNTER: AtomicU64 = AtomicU64::new(0);

/// Construction options recognized by [`SourceKernel::new`]
#[derive(Default)]
pub struct SourceSettings {
    /// Source name; defaults to a generated `source-N`
    pub name: Option<String>,
    /// Persistence provider for the log and queues
    pub bucket: Option<Arc<dyn Bucket>>,
    /// Schema reference
    pub schema: Option<Arc<Schema>>,
    /// KeyMap reference
    pub key_map: Option<Arc<KeyMap>>,
    /// Start queues at construction (default true)
    pub auto_activate: Option<bool>,
    /// React to schema upgrades (default true)
    pub auto_upgrade: Option<bool>,
    /// Request queue overrides
    pub request_queue_settings: Option<TaskQueueSettings>,
    /// Sync queue overrides
    pub sync_queue_settings: Option<TaskQueueSettings>,
}

impl SourceSettings {
    /// Settings with a fixed name
    pub fn named(name: impl Into<String>) -> Self {
        Self {
            name: Some(name.into()),
            ..Default::default()
        }
    }

    /// Attach a schema, builder style
    pub fn with_schema(mut self, schema: Arc<Schema>) -> Self {
        self.schema = Some(schema);
        self
    }

    /// Attach a key map, builder style
    pub fn with_key_map(mut self, key_map: Arc<KeyMap>) -> Self {
        self.key_map = Some(key_map);
        self
    }

    /// Attach a bucket, builder style
    pub fn with_bucket(mut self, bucket: Arc<dyn Bucket>) -> Self {
        self.bucket = Some(bucket);
        self
    }

    /// Control auto-activation, builder style
    pub fn auto_activate(mut self, auto: bool) -> Self {
        self.auto_activate = Some(auto);
        self
    }
}

/// Event registries of one source
///
/// `beforeX` registries are fallible and share a mutable hints value; `X` /
/// `XFail` registries observe outcomes; `transform` is fallible because its
/// listeners (replication consumers) run strictly before the mutating
/// caller's completion.
#[derive(Default)]
pub struct SourceEvents {
    /// Before a query performs
    pub before_query: InterceptNotifier<Query, QueryHints>,
    /// After a query succeeded
    pub query: Notifier<(Query, QueryData)>,
    /// After a query failed
    pub query_fail: Notifier<(Query, Error)>,

    /// Before an update performs
    pub before_update: InterceptNotifier<Transform, UpdateHints>,
    /// After an update succeeded
    pub update: Notifier<(Transform, UpdateData)>,
    /// After an update failed
    pub update_fail: Notifier<(Transform, Error)>,

    /// Before a sync performs
    pub before_sync: InterceptNotifier<Transform, SyncHints>,
    /// After a sync succeeded
    pub sync: Notifier<Transform>,
    /// After a sync failed
    pub sync_fail: Notifier<(Transform, Error)>,

    /// Before a push performs
    pub before_push: InterceptNotifier<Transform, PushHints>,
    /// After a push succeeded, with the transforms applied remotely
    pub push: Notifier<(Transform, Vec<Transform>)>,
    /// After a push failed
    pub push_fail: Notifier<(Transform, Error)>,

    /// Before a pull performs
    pub before_pull: InterceptNotifier<Query, PullHints>,
    /// After a pull succeeded, with the fetched transforms
    pub pull: Notifier<(Query, Vec<Transform>)>,
    /// After a pull failed
    pub pull_fail: Notifier<(Query, Error)>,

    /// Per applied transform, before the mutating caller's completion
    pub transform: TryNotifier<Transform>,
    /// After the source reset its durable state
    pub reset: Notifier<()>,
    /// After the schema upgraded, with the new version
    pub upgrade: Notifier<u64>,
}

/// Lifecycle, queues, log, and events shared by every source
pub struct SourceKernel {
    name: String,
    schema: Option<Arc<Schema>>,
    key_map: Option<Arc<KeyMap>>,
    bucket: Option<Arc<dyn Bucket>>,
    transform_log: TransformLog,
    request_queue: TaskQueue,
    sync_queue: TaskQueue,
    events: Arc<SourceEvents>,
    activated: AtomicBool,
    upgrade_listener: Mutex<Option<UpgradeListenerKey>>,
}

impl SourceKernel {
    /// Build a kernel from settings, hydrating durable state from the bucket
    pub fn new(settings: SourceSettings) -> Result<Self> {
        let name = settings
            .name
            .unwrap_or_else(|| format!("source-{}", SOURCE_COUNTER.fetch_add(1, Ordering::SeqCst)));
        let bucket = settings.bucket;

        let transform_log = TransformLog::new(format!("{}-log", name), bucket.clone())?;

        let request_settings = settings.request_queue_settings.unwrap_or_default();
        let request_queue = TaskQueue::new(
            request_settings
                .name
                .unwrap_or_else(|| format!("{}-requests", name)),
            request_settings.bucket.or_else(|| bucket.clone()),
            request_settings.auto_process.unwrap_or(true),
        )?;

        let sync_settings = settings.sync_queue_settings.unwrap_or_default();
        let sync_queue = TaskQueue::new(
            sync_settings
                .name
                .unwrap_or_else(|| format!("{}-sync", name)),
            sync_settings.bucket.or_else(|| bucket.clone()),
            sync_settings.auto_process.unwrap_or(true),
        )?;

        let events = Arc::new(SourceEvents::default());

        let kernel = Self {
            name,
            schema: settings.schema,
            key_map: settings.key_map,
            bucket,
            transform_log,
            request_queue,
            sync_queue,
            events,
            activated: AtomicBool::new(false),
            upgrade_listener: Mutex::new(None),
        };

        if settings.auto_upgrade.unwrap_or(true) {
            if let Some(schema) = &kernel.schema {
                let events = kernel.events.clone();
                let key = schema.on_upgrade(move |version| {
                    events.upgrade.emit(&version);
                });
                *kernel.upgrade_listener.lock() = Some(key);
            }
        }

        if settings.auto_activate.unwrap_or(true) {
            kernel.activate();
        }

        Ok(kernel)
    }

    /// The source's name; prefixes its queue and log names
    pub fn name(&self) -> &str {
        &self.name
    }

    /// The schema, if attached
    pub fn schema(&self) -> Option<&Arc<Schema>> {
        self.schema.as_ref()
    }

    /// The key map, if attached
    pub fn key_map(&self) -> Option<&Arc<KeyMap>> {
        self.key_map.as_ref()
    }

    /// The bucket, if attached
    pub fn bucket(&self) -> Option<&Arc<dyn Bucket>> {
        self.bucket.as_ref()
    }

    /// The durable transform log (`<name>-log`)
    pub fn transform_log(&self) -> &TransformLog {
        &self.transform_log
    }

    /// The request queue (`<name>-requests`)
    pub fn request_queue(&self) -> &TaskQueue {
        &self.request_queue
    }

    /// The sync queue (`<name>-sync`)
    pub fn sync_queue(&self) -> &TaskQueue {
        &self.sync_queue
    }

    /// The event registries
    pub fn events(&self) -> &SourceEvents {
        &self.events
    }

    /// Attach the task performer backing both queues
    pub fn attach_performer(&self, performer: Weak<dyn TaskPerformer>) {
        self.request_queue.set_performer(performer.clone());
        self.sync_queue.set_performer(performer);
    }

    /// Resume the queues
    pub fn activate(&self) {
        self.activated.store(true, Ordering::SeqCst);
        self.request_queue.start();
        self.sync_queue.start();
        info!(source = %self.name, "source activated");
    }

    /// Pause the queues; in-flight work runs to completion first
    pub fn deactivate(&self) {
        self.request_queue.stop();
        self.sync_queue.stop();
        self.activated.store(false, Ordering::SeqCst);
        info!(source = %self.name, "source deactivated");
    }

    /// Check whether the source is active
    pub fn activated(&self) -> bool {
        self.activated.load(Ordering::SeqCst)
    }

    /// Record applied transforms: append to the log and notify listeners
    ///
    /// Transforms already contained in the log are skipped. `transform`
    /// listeners run serially per transform; a listener error propagates to
    /// the caller (the local application is not unwound).
    pub fn transformed(&self, transforms: &[Transform]) -> Result<()> {
        for transform in transforms {
            if self.transform_log.contains(&transform.id) {
                continue;
            }
            self.transform_log.append(std::slice::from_ref(&transform.id))?;
            self.events.transform.emit(transform)?;
        }
        Ok(())
    }

    /// Clear the log and both queues, then notify `reset` listeners
    pub fn reset(&self) -> Result<()> {
        self.transform_log.clear()?;
        self.request_queue.clear()?;
        self.sync_queue.clear()?;
        self.events.reset.emit(&());
        Ok(())
    }
}

impl Drop for SourceKernel {
    fn drop(&mut self) {
        if let (Some(schema), Some(key)) = (&self.schema, self.upgrade_listener.lock().take()) {
            schema.off_upgrade(key);
        }
    }
}

/// Access to the kernel embedded in a concrete source
///
/// The interface contracts (queryable, updatable, syncable, pushable,
/// pullable) are layered on this.
pub trait SourceBase {
    /// The embedded kernel
    fn kernel(&self) -> &SourceKernel;
}

#[cfg(test)]
mod tests {
    use super::*;
    use orrery_core::schema::ModelDef;
    use orrery_core::TransformBuilder;
    use std::sync::atomic::AtomicUsize;

    fn transform_of(id: &str) -> Transform {
        let t = TransformBuilder;
        Transform::with_id(
            id,
            vec![t.add_record(orrery_core::Record::new("planet", id))],
        )
    }

    #[test]
    fn test_generated_names_are_unique() {
        let a = SourceKernel::new(SourceSettings::default()).unwrap();
        let b = SourceKernel::new(SourceSettings::default()).unwrap();
        assert_ne!(a.name(), b.name());
    }

    #[test]
    fn test_component_names_derive_from_source_name() {
        let kernel = SourceKernel::new(SourceSettings::named("memory")).unwrap();
        assert_eq!(kernel.transform_log().name(), "memory-log");
        assert_eq!(kernel.request_queue().name(), "memory-requests");
        assert_eq!(kernel.sync_queue().name(), "memory-sync");
    }

    #[test]
    fn test_auto_activate_default() {
        let kernel = SourceKernel::new(SourceSettings::named("a")).unwrap();
        assert!(kernel.activated());
        assert!(kernel.request_queue().started());

        let paused =
            SourceKernel::new(SourceSettings::named("b").auto_activate(false)).unwrap();
        assert!(!paused.activated());
        assert!(!paused.request_queue().started());

        paused.activate();
        assert!(paused.activated());
    }

    #[test]
    fn test_transformed_appends_and_emits_once() {
        let kernel = SourceKernel::new(SourceSettings::named("memory")).unwrap();
        let observed = Arc::new(AtomicUsize::new(0));
        let counter = observed.clone();
        kernel.events().transform.on(move |_| {
            counter.fetch_add(1, Ordering::SeqCst);
            Ok(())
        });

        let transform = transform_of("t1");
        kernel.transformed(std::slice::from_ref(&transform)).unwrap();
        assert!(kernel.transform_log().contains("t1"));
        assert_eq!(observed.load(Ordering::SeqCst), 1);

        // Replaying the same transform is a no-op.
        kernel.transformed(std::slice::from_ref(&transform)).unwrap();
        assert_eq!(observed.load(Ordering::SeqCst), 1);
    }

    #[test]
    fn test_transform_listener_error_propagates_but_keeps_log() {
        let kernel = SourceKernel::new(SourceSettings::named("memory")).unwrap();
        kernel
            .events()
            .transform
            .on(|_| Err(Error::network("replica down")));

        let transform = transform_of("t1");
        let err = kernel.transformed(std::slice::from_ref(&transform)).unwrap_err();
        assert!(matches!(err, Error::Network { .. }));
        assert!(kernel.transform_log().contains("t1"));
    }

    #[test]
    fn test_auto_upgrade_relays_schema_upgrades() {
        let schema = Arc::new(Schema::builder().model("planet", ModelDef::new()).build());
        let kernel = SourceKernel::new(
            SourceSettings::named("memory").with_schema(schema.clone()),
        )
        .unwrap();

        let observed = Arc::new(AtomicUsize::new(0));
        let counter = observed.clone();
        kernel.events().upgrade.on(move |version| {
            counter.store(*version as usize, Ordering::SeqCst);
        });

        let mut models = indexmap::IndexMap::new();
        models.insert("planet".to_string(), ModelDef::new());
        schema.upgrade(models);
        assert_eq!(observed.load(Ordering::SeqCst), 2);
    }

    #[test]
    fn test_reset_clears_durable_state_and_notifies() {
        let kernel = SourceKernel::new(SourceSettings::named("memory")).unwrap();
        kernel
            .transformed(std::slice::from_ref(&transform_of("t1")))
            .unwrap();

        let observed = Arc::new(AtomicUsize::new(0));
        let counter = observed.clone();
        kernel.events().reset.on(move |_| {
            counter.fetch_add(1, Ordering::SeqCst);
        });

        kernel.reset().unwrap();
        assert!(kernel.transform_log().is_empty());
        assert_eq!(observed.load(Ordering::SeqCst), 1);
    }
}
