//! # orrery-cache
//!
//! The in-memory record cache: a normalized record graph with atomic
//! operation batches, derived inverse relationships, structured query
//! evaluation, and live queries.
//!
//! The cache is source-agnostic - it knows nothing about queues, logs, or
//! transports. The in-memory source in the root crate wires it into the
//! uniform source pipeline.

#![warn(missing_docs)]

mod cache;
mod inverse;
mod live;
mod processors;
mod query_engine;
mod store;

pub use cache::{CacheSettings, PatchListenerKey, PatchResult, RecordCache, RecordCacheBuilder};
pub use inverse::{InverseIndex, InverseLink};
pub use live::{LiveQuery, LiveQueryUpdate, SubscriptionKey};
pub use store::RecordStore;
