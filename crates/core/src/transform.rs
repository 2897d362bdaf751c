//! Transforms: identified batches of operations
//!
//! A transform groups atomic operations for all-or-nothing application. The
//! `id` stamps the batch; once a source applies a transform, the id is
//! recorded in its transform log, which is the authority for "have we already
//! applied this?" during replication.
//!
//! `build_transform` normalizes every accepted input shape (one operation, a
//! list, an existing transform) into a canonical `Transform`. The
//! `TransformBuilder` offers a fluent surface for composing operations.

use crate::operation::RecordOperation;
use crate::options::RequestOptions;
use crate::record::{Record, RecordIdentity};
use crate::Result;
use serde::{Deserialize, Serialize};
use serde_json::Value;

/// An identified, ordered batch of operations
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Transform {
    /// Unique transform id
    pub id: String,
    /// Operations applied as a group
    pub operations: Vec<RecordOperation>,
    /// Per-request options
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub options: Option<RequestOptions>,
}

impl Transform {
    /// Create a transform with a fresh uuid id
    pub fn new(operations: Vec<RecordOperation>) -> Self {
        Self {
            id: uuid::Uuid::new_v4().to_string(),
            operations,
            options: None,
        }
    }

    /// Create a transform with a caller-chosen id
    pub fn with_id(id: impl Into<String>, operations: Vec<RecordOperation>) -> Self {
        Self {
            id: id.into(),
            operations,
            options: None,
        }
    }

    /// Attach options, builder style
    pub fn with_options(mut self, options: RequestOptions) -> Self {
        self.options = Some(options);
        self
    }
}

/// Input shapes accepted by [`build_transform`]
#[derive(Debug, Clone)]
pub enum TransformInput {
    /// A single operation
    Operation(RecordOperation),
    /// A batch of operations
    Operations(Vec<RecordOperation>),
    /// A fully-formed transform
    Transform(Transform),
}

impl From<RecordOperation> for TransformInput {
    fn from(op: RecordOperation) -> Self {
        TransformInput::Operation(op)
    }
}

impl From<Vec<RecordOperation>> for TransformInput {
    fn from(ops: Vec<RecordOperation>) -> Self {
        TransformInput::Operations(ops)
    }
}

impl From<Transform> for TransformInput {
    fn from(transform: Transform) -> Self {
        TransformInput::Transform(transform)
    }
}

/// Normalize any accepted input into a canonical transform
///
/// A fully-formed transform with an id is returned unchanged when no
/// overrides are given; otherwise options and id overrides are applied.
/// Operation inputs become a single-transform batch with a fresh (or
/// supplied) id. An empty batch is rejected as `TransformNotAllowed`.
pub fn build_transform(
    input: impl Into<TransformInput>,
    options: Option<RequestOptions>,
    id: Option<String>,
) -> Result<Transform> {
    let mut transform = match input.into() {
        TransformInput::Transform(transform) => {
            if options.is_none() && id.is_none() {
                return Ok(transform);
            }
            transform
        }
        TransformInput::Operation(op) => Transform::new(vec![op]),
        TransformInput::Operations(ops) => Transform::new(ops),
    };

    if transform.operations.is_empty() {
        return Err(crate::Error::transform_not_allowed(
            "a transform requires at least one operation",
        ));
    }

    if let Some(id) = id {
        transform.id = id;
    }
    if let Some(options) = options {
        transform.options = Some(options);
    }
    Ok(transform)
}

/// Fluent builder for composing operations
///
/// # Example
///
/// ```ignore
/// let t = TransformBuilder::default();
/// source.update(vec![
///     t.add_record(jupiter),
///     t.replace_attribute(earth_id, "name", "Earth"),
/// ])?;
/// ```
#[derive(Debug, Clone, Copy, Default)]
pub struct TransformBuilder;

impl TransformBuilder {
    /// An `addRecord` operation
    pub fn add_record(&self, record: Record) -> RecordOperation {
        RecordOperation::AddRecord { record }
    }

    /// An `updateRecord` operation
    pub fn update_record(&self, record: Record) -> RecordOperation {
        RecordOperation::UpdateRecord { record }
    }

    /// A `removeRecord` operation
    pub fn remove_record(&self, record: RecordIdentity) -> RecordOperation {
        RecordOperation::RemoveRecord { record }
    }

    /// A `replaceKey` operation
    pub fn replace_key(
        &self,
        record: RecordIdentity,
        key: impl Into<String>,
        value: impl Into<String>,
    ) -> RecordOperation {
        RecordOperation::ReplaceKey {
            record,
            key: key.into(),
            value: value.into(),
        }
    }

    /// A `replaceAttribute` operation
    pub fn replace_attribute(
        &self,
        record: RecordIdentity,
        attribute: impl Into<String>,
        value: impl Into<Value>,
    ) -> RecordOperation {
        RecordOperation::ReplaceAttribute {
            record,
            attribute: attribute.into(),
            value: value.into(),
        }
    }

    /// An `addToRelatedRecords` operation
    pub fn add_to_related_records(
        &self,
        record: RecordIdentity,
        relationship: impl Into<String>,
        related_record: RecordIdentity,
    ) -> RecordOperation {
        RecordOperation::AddToRelatedRecords {
            record,
            relationship: relationship.into(),
            related_record,
        }
    }

    /// A `removeFromRelatedRecords` operation
    pub fn remove_from_related_records(
        &self,
        record: RecordIdentity,
        relationship: impl Into<String>,
        related_record: RecordIdentity,
    ) -> RecordOperation {
        RecordOperation::RemoveFromRelatedRecords {
            record,
            relationship: relationship.into(),
            related_record,
        }
    }

    /// A `replaceRelatedRecords` operation
    pub fn replace_related_records(
        &self,
        record: RecordIdentity,
        relationship: impl Into<String>,
        related_records: Vec<RecordIdentity>,
    ) -> RecordOperation {
        RecordOperation::ReplaceRelatedRecords {
            record,
            relationship: relationship.into(),
            related_records,
        }
    }

    /// A `replaceRelatedRecord` operation
    pub fn replace_related_record(
        &self,
        record: RecordIdentity,
        relationship: impl Into<String>,
        related_record: Option<RecordIdentity>,
    ) -> RecordOperation {
        RecordOperation::ReplaceRelatedRecord {
            record,
            relationship: relationship.into(),
            related_record,
        }
    }
}
