//! # orrery-kernel
//!
//! The source kernel: everything a concrete source inherits. Buckets for
//! durable state, persistent task queues with head-of-line parking, the
//! append-only transform log, the pub/sub registries, and the five interface
//! contracts layered on the kernel - queryable, updatable, syncable,
//! pushable, pullable.
//!
//! The runtime is single-threaded cooperative: pipelines are explicit
//! Before - Perform - After phases walked serially, and every ordering
//! guarantee (FIFO queues, transform events before caller completion) is
//! enforced by construction.

#![warn(missing_docs)]

pub mod bucket;
pub mod hints;
pub mod notifier;
pub mod pullable;
pub mod pushable;
pub mod queryable;
pub mod source;
pub mod syncable;
pub mod task;
pub mod task_queue;
pub mod transform_log;
pub mod updatable;

pub use bucket::{Bucket, MemoryBucket};
pub use hints::{PullHints, PushHints, QueryHints, SyncHints, UpdateHints};
pub use notifier::{InterceptNotifier, ListenerKey, Notifier, TryNotifier};
pub use pullable::{PullPerformer, Pullable};
pub use pushable::{PushPerformer, Pushable};
pub use queryable::{QueryPerformer, Queryable};
pub use source::{SourceBase, SourceEvents, SourceKernel, SourceSettings};
pub use syncable::{SyncPerformer, Syncable};
pub use task::{Task, TaskOutcome, TaskPerformer};
pub use task_queue::{TaskQueue, TaskQueueSettings};
pub use transform_log::{RollbackEvent, TransformLog};
pub use updatable::{Updatable, UpdatePerformer};
