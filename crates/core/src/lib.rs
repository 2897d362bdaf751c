//! # orrery-core
//!
//! The shared vocabulary of the Orrery runtime: records and identities, the
//! nine-member atomic operation set, transforms and queries with their fluent
//! builders, schema declarations, the KeyMap, response envelopes, and the
//! unified error taxonomy.
//!
//! Everything here is source-agnostic. Concrete behavior (applying operations
//! to a cache, pipelining requests through a source) lives in the dependent
//! crates; this crate only defines the shapes they exchange.

#![warn(missing_docs)]

pub mod error;
pub mod keymap;
pub mod operation;
pub mod options;
pub mod query;
pub mod record;
pub mod response;
pub mod schema;
pub mod transform;

pub use error::{Error, Result};
pub use keymap::KeyMap;
pub use operation::RecordOperation;
pub use options::RequestOptions;
pub use query::{build_query, Query, QueryBuilder, QueryExpression, QueryInput};
pub use record::{Record, RecordIdentity, RecordRelationship, RelationshipData};
pub use response::{FullResponse, QueryData, QueryResult, UpdateData};
pub use schema::{
    AttributeDef, KeyDef, ModelDef, RelationshipDef, RelationshipKind, Schema, SchemaBuilder,
};
pub use transform::{build_transform, Transform, TransformBuilder, TransformInput};
