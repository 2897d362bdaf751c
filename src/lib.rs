//! # Orrery
//!
//! A client-side data-orchestration runtime: mutations ("transforms") and
//! reads ("queries") coordinated against heterogeneous sources - an
//! in-memory record cache, a remote JSON:API backend, pluggable local
//! persistence - behind a single, uniform, operation-based data model.
//!
//! ## Crates
//!
//! - [`orrery_core`]: records, the nine-operation set, transforms, queries,
//!   schema, KeyMap, errors.
//! - [`orrery_cache`]: the normalized record cache with inverse
//!   relationships, query evaluation, and live queries.
//! - [`orrery_kernel`]: the source kernel - buckets, task queues, transform
//!   log, pub/sub, and the interface contracts.
//! - `orrery-jsonapi`: the remote JSON:API adapter.
//!
//! This crate re-exports the working surface and provides the concrete
//! in-memory source.
//!
//! ## Example
//!
//! ```ignore
//! let schema = Arc::new(
//!     Schema::builder()
//!         .model("planet", ModelDef::new().with_attribute("name", AttributeDef::string()))
//!         .build(),
//! );
//! let memory = MemorySource::new(schema)?;
//!
//! let t = TransformBuilder;
//! memory.update(t.add_record(Record::new("planet", "earth").with_attribute("name", "Earth")))?;
//!
//! let q = QueryBuilder;
//! let planets = memory.query(q.find_records("planet").sort("name"))?;
//! ```

#![warn(missing_docs)]

mod memory;

pub use memory::{MemorySource, MemorySourceSettings};

pub use orrery_cache::{LiveQuery, LiveQueryUpdate, PatchResult, RecordCache};
pub use orrery_core::{
    build_query, build_transform, AttributeDef, Error, FullResponse, KeyDef, KeyMap, ModelDef,
    Query, QueryBuilder, QueryData, QueryExpression, QueryInput, QueryResult, Record,
    RecordIdentity, RecordOperation, RecordRelationship, RelationshipData, RelationshipDef,
    RelationshipKind, RequestOptions, Result, Schema, SchemaBuilder, Transform, TransformBuilder,
    TransformInput, UpdateData,
};
pub use orrery_kernel::{
    Bucket, MemoryBucket, Pullable, Pushable, Queryable, SourceBase, SourceKernel, SourceSettings,
    Syncable, Task, TaskQueue, TaskQueueSettings, TransformLog, Updatable,
};
