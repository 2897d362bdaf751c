//! Atomic record operations
//!
//! The nine operations below form a closed tagged set - the only mutations
//! the runtime understands. Every operation is self-describing: the `op` tag
//! names the mutation and the remaining fields identify the target and carry
//! the payload. Implementations match on the tag and dispatch to a dedicated
//! processor; there is no dynamic method dispatch.
//!
//! Operations are grouped into transforms for atomic application; see
//! [`crate::transform::Transform`].

use crate::record::{Record, RecordIdentity};
use serde::{Deserialize, Serialize};
use serde_json::Value;

/// One atomic mutation against the record graph
///
/// Serialized with an `op` tag in camelCase, e.g.
/// `{"op": "replaceAttribute", "record": {...}, "attribute": "name", "value": "Earth"}`.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(tag = "op", rename_all = "camelCase")]
pub enum RecordOperation {
    /// Add a full record; fails if the identity already exists
    AddRecord {
        /// The record to add
        record: Record,
    },

    /// Replace the stored record wholesale with the given record
    UpdateRecord {
        /// The replacement record
        record: Record,
    },

    /// Remove a record and cascade its inverse relationships
    RemoveRecord {
        /// Identity of the record to remove
        record: RecordIdentity,
    },

    /// Replace the value of one named secondary key
    ReplaceKey {
        /// Identity of the target record
        record: RecordIdentity,
        /// Key name, e.g. `remoteId`
        key: String,
        /// New key value
        value: String,
    },

    /// Replace the value of one attribute
    ReplaceAttribute {
        /// Identity of the target record
        record: RecordIdentity,
        /// Attribute name
        attribute: String,
        /// New attribute value
        value: Value,
    },

    /// Append an identity to a to-many relationship
    #[serde(rename_all = "camelCase")]
    AddToRelatedRecords {
        /// Identity of the target record
        record: RecordIdentity,
        /// Relationship name
        relationship: String,
        /// Identity to append
        related_record: RecordIdentity,
    },

    /// Remove an identity from a to-many relationship
    #[serde(rename_all = "camelCase")]
    RemoveFromRelatedRecords {
        /// Identity of the target record
        record: RecordIdentity,
        /// Relationship name
        relationship: String,
        /// Identity to remove
        related_record: RecordIdentity,
    },

    /// Replace the full membership of a to-many relationship
    #[serde(rename_all = "camelCase")]
    ReplaceRelatedRecords {
        /// Identity of the target record
        record: RecordIdentity,
        /// Relationship name
        relationship: String,
        /// New ordered membership
        related_records: Vec<RecordIdentity>,
    },

    /// Replace the target of a to-one relationship (`None` clears it)
    #[serde(rename_all = "camelCase")]
    ReplaceRelatedRecord {
        /// Identity of the target record
        record: RecordIdentity,
        /// Relationship name
        relationship: String,
        /// New target, or `None` to clear
        related_record: Option<RecordIdentity>,
    },
}

impl RecordOperation {
    /// The identity of the record this operation targets
    pub fn record_identity(&self) -> &RecordIdentity {
        match self {
            RecordOperation::AddRecord { record } | RecordOperation::UpdateRecord { record } => {
                &record.identity
            }
            RecordOperation::RemoveRecord { record }
            | RecordOperation::ReplaceKey { record, .. }
            | RecordOperation::ReplaceAttribute { record, .. }
            | RecordOperation::AddToRelatedRecords { record, .. }
            | RecordOperation::RemoveFromRelatedRecords { record, .. }
            | RecordOperation::ReplaceRelatedRecords { record, .. }
            | RecordOperation::ReplaceRelatedRecord { record, .. } => record,
        }
    }

    /// The canonical tag for this operation
    pub fn op(&self) -> &'static str {
        match self {
            RecordOperation::AddRecord { .. } => "addRecord",
            RecordOperation::UpdateRecord { .. } => "updateRecord",
            RecordOperation::RemoveRecord { .. } => "removeRecord",
            RecordOperation::ReplaceKey { .. } => "replaceKey",
            RecordOperation::ReplaceAttribute { .. } => "replaceAttribute",
            RecordOperation::AddToRelatedRecords { .. } => "addToRelatedRecords",
            RecordOperation::RemoveFromRelatedRecords { .. } => "removeFromRelatedRecords",
            RecordOperation::ReplaceRelatedRecords { .. } => "replaceRelatedRecords",
            RecordOperation::ReplaceRelatedRecord { .. } => "replaceRelatedRecord",
        }
    }

    /// Check whether this operation touches a relationship
    pub fn is_relationship_op(&self) -> bool {
        matches!(
            self,
            RecordOperation::AddToRelatedRecords { .. }
                | RecordOperation::RemoveFromRelatedRecords { .. }
                | RecordOperation::ReplaceRelatedRecords { .. }
                | RecordOperation::ReplaceRelatedRecord { .. }
        )
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use serde_json::json;

    #[test]
    fn test_op_tags_are_camel_case() {
        let op = RecordOperation::AddToRelatedRecords {
            record: RecordIdentity::new("planet", "jupiter"),
            relationship: "moons".into(),
            related_record: RecordIdentity::new("moon", "io"),
        };
        let value = serde_json::to_value(&op).unwrap();
        assert_eq!(value["op"], "addToRelatedRecords");
        assert_eq!(value["relatedRecord"]["id"], "io");
    }

    #[test]
    fn test_remove_record_round_trip() {
        let op = RecordOperation::RemoveRecord {
            record: RecordIdentity::new("planet", "pluto"),
        };
        let value = serde_json::to_value(&op).unwrap();
        assert_eq!(value, json!({"op": "removeRecord", "record": {"type": "planet", "id": "pluto"}}));
        let back: RecordOperation = serde_json::from_value(value).unwrap();
        assert_eq!(back, op);
    }

    #[test]
    fn test_replace_related_record_null_clears() {
        let op = RecordOperation::ReplaceRelatedRecord {
            record: RecordIdentity::new("moon", "luna"),
            relationship: "planet".into(),
            related_record: None,
        };
        let value = serde_json::to_value(&op).unwrap();
        assert_eq!(value["relatedRecord"], json!(null));
        let back: RecordOperation = serde_json::from_value(value).unwrap();
        assert_eq!(back, op);
    }

    #[test]
    fn test_record_identity_accessor() {
        let identity = RecordIdentity::new("planet", "mars");
        let op = RecordOperation::ReplaceAttribute {
            record: identity.clone(),
            attribute: "name".into(),
            value: json!("Mars"),
        };
        assert_eq!(op.record_identity(), &identity);
        assert_eq!(op.op(), "replaceAttribute");
        assert!(!op.is_relationship_op());
    }
}
