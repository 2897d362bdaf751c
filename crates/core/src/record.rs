//! Record data model
//!
//! Records are the unit of data in Orrery. A record is identified by a
//! `(type, id)` pair and carries optional attributes, named secondary keys,
//! relationships, and free-form `meta`/`links` values.
//!
//! ## Identity
//!
//! `id` is the canonical local identifier, generated by the schema (UUID by
//! default). Remote identifiers live in `keys` and are reconciled through the
//! `KeyMap`. Pointers between records are always identity-valued, never
//! direct references - the cache keeps a flat map keyed by identity, so
//! cyclic record graphs are representable without ownership cycles.
//!
//! ## Relationships
//!
//! Every relationship value is either a single identity (to-one), an ordered
//! sequence of identities (to-many), or absent (to-one cleared). The
//! `RelationshipData` enum captures exactly those three shapes.

use indexmap::IndexMap;
use serde::{Deserialize, Serialize};
use serde_json::Value;
use std::fmt;

/// Stable `(type, id)` identity of a record
#[derive(Debug, Clone, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub struct RecordIdentity {
    /// Model type, e.g. `"planet"`
    #[serde(rename = "type")]
    pub kind: String,
    /// Canonical local identifier
    pub id: String,
}

impl RecordIdentity {
    /// Create an identity from a type and id
    pub fn new(kind: impl Into<String>, id: impl Into<String>) -> Self {
        Self {
            kind: kind.into(),
            id: id.into(),
        }
    }
}

impl fmt::Display for RecordIdentity {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}:{}", self.kind, self.id)
    }
}

/// The linkage of one relationship
///
/// Serialized as `null` (to-one absent), a single identity object (to-one),
/// or an array of identities (to-many).
#[derive(Debug, Clone, PartialEq, Default, Serialize, Deserialize)]
#[serde(untagged)]
pub enum RelationshipData {
    /// To-one relationship with a target
    One(RecordIdentity),
    /// To-many relationship (possibly empty)
    Many(Vec<RecordIdentity>),
    /// To-one relationship explicitly cleared
    #[default]
    None,
}

impl RelationshipData {
    /// Check whether this linkage contains the given identity
    pub fn includes(&self, identity: &RecordIdentity) -> bool {
        match self {
            RelationshipData::One(one) => one == identity,
            RelationshipData::Many(many) => many.contains(identity),
            RelationshipData::None => false,
        }
    }

    /// All identities referenced by this linkage, in order
    pub fn identities(&self) -> Vec<&RecordIdentity> {
        match self {
            RelationshipData::One(one) => vec![one],
            RelationshipData::Many(many) => many.iter().collect(),
            RelationshipData::None => Vec::new(),
        }
    }

    /// Get the to-one target, if any
    pub fn as_one(&self) -> Option<&RecordIdentity> {
        match self {
            RelationshipData::One(one) => Some(one),
            _ => None,
        }
    }

    /// Get the to-many targets, if this is a to-many linkage
    pub fn as_many(&self) -> Option<&[RecordIdentity]> {
        match self {
            RelationshipData::Many(many) => Some(many),
            _ => None,
        }
    }
}

/// A relationship value: linkage plus optional `links`/`meta`
#[derive(Debug, Clone, PartialEq, Default, Serialize, Deserialize)]
pub struct RecordRelationship {
    /// The linkage itself
    #[serde(default)]
    pub data: RelationshipData,
    /// Transport-level links, passed through opaquely
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub links: Option<Value>,
    /// Free-form metadata, passed through opaquely
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub meta: Option<Value>,
}

impl RecordRelationship {
    /// Create a relationship wrapping the given linkage
    pub fn new(data: RelationshipData) -> Self {
        Self {
            data,
            links: None,
            meta: None,
        }
    }

    /// Create a to-one relationship
    pub fn to_one(identity: RecordIdentity) -> Self {
        Self::new(RelationshipData::One(identity))
    }

    /// Create a to-many relationship
    pub fn to_many(identities: Vec<RecordIdentity>) -> Self {
        Self::new(RelationshipData::Many(identities))
    }
}

/// A record: identity plus attributes, keys, relationships, meta, and links
///
/// Field maps preserve insertion order so that derived work (e.g. mirror
/// operations for inverse relationships) is deterministic.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Record {
    /// The record's `(type, id)` identity
    #[serde(flatten)]
    pub identity: RecordIdentity,
    /// Attribute values by name
    #[serde(default, skip_serializing_if = "IndexMap::is_empty")]
    pub attributes: IndexMap<String, Value>,
    /// Named secondary keys, e.g. `remoteId`
    #[serde(default, skip_serializing_if = "IndexMap::is_empty")]
    pub keys: IndexMap<String, String>,
    /// Relationships by name
    #[serde(default, skip_serializing_if = "IndexMap::is_empty")]
    pub relationships: IndexMap<String, RecordRelationship>,
    /// Free-form metadata
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub meta: Option<Value>,
    /// Transport-level links
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub links: Option<Value>,
}

impl Record {
    /// Create an empty record with the given identity
    pub fn new(kind: impl Into<String>, id: impl Into<String>) -> Self {
        Self::from_identity(RecordIdentity::new(kind, id))
    }

    /// Create an empty record from an identity
    pub fn from_identity(identity: RecordIdentity) -> Self {
        Self {
            identity,
            attributes: IndexMap::new(),
            keys: IndexMap::new(),
            relationships: IndexMap::new(),
            meta: None,
            links: None,
        }
    }

    /// The record's model type
    pub fn kind(&self) -> &str {
        &self.identity.kind
    }

    /// The record's local id
    pub fn id(&self) -> &str {
        &self.identity.id
    }

    /// Get an attribute value by name
    pub fn attribute(&self, name: &str) -> Option<&Value> {
        self.attributes.get(name)
    }

    /// Get a secondary key value by name
    pub fn key(&self, name: &str) -> Option<&str> {
        self.keys.get(name).map(String::as_str)
    }

    /// Get a relationship's linkage by name
    pub fn relationship_data(&self, name: &str) -> Option<&RelationshipData> {
        self.relationships.get(name).map(|rel| &rel.data)
    }

    /// Set an attribute, builder style
    pub fn with_attribute(mut self, name: impl Into<String>, value: impl Into<Value>) -> Self {
        self.attributes.insert(name.into(), value.into());
        self
    }

    /// Set a secondary key, builder style
    pub fn with_key(mut self, name: impl Into<String>, value: impl Into<String>) -> Self {
        self.keys.insert(name.into(), value.into());
        self
    }

    /// Set a to-one relationship, builder style
    pub fn with_related_record(
        mut self,
        name: impl Into<String>,
        identity: RecordIdentity,
    ) -> Self {
        self.relationships
            .insert(name.into(), RecordRelationship::to_one(identity));
        self
    }

    /// Set a to-many relationship, builder style
    pub fn with_related_records(
        mut self,
        name: impl Into<String>,
        identities: Vec<RecordIdentity>,
    ) -> Self {
        self.relationships
            .insert(name.into(), RecordRelationship::to_many(identities));
        self
    }
}

impl From<RecordIdentity> for Record {
    fn from(identity: RecordIdentity) -> Self {
        Record::from_identity(identity)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use serde_json::json;

    #[test]
    fn test_identity_display() {
        let identity = RecordIdentity::new("moon", "io");
        assert_eq!(identity.to_string(), "moon:io");
    }

    #[test]
    fn test_identity_serde_uses_type_field() {
        let identity = RecordIdentity::new("planet", "earth");
        let json = serde_json::to_value(&identity).unwrap();
        assert_eq!(json, json!({"type": "planet", "id": "earth"}));
    }

    #[test]
    fn test_relationship_data_serde_shapes() {
        let one = RelationshipData::One(RecordIdentity::new("planet", "earth"));
        assert_eq!(
            serde_json::to_value(&one).unwrap(),
            json!({"type": "planet", "id": "earth"})
        );

        let many = RelationshipData::Many(vec![RecordIdentity::new("moon", "io")]);
        assert_eq!(
            serde_json::to_value(&many).unwrap(),
            json!([{"type": "moon", "id": "io"}])
        );

        let none = RelationshipData::None;
        assert_eq!(serde_json::to_value(&none).unwrap(), json!(null));

        let back: RelationshipData = serde_json::from_value(json!(null)).unwrap();
        assert_eq!(back, RelationshipData::None);
    }

    #[test]
    fn test_relationship_includes() {
        let io = RecordIdentity::new("moon", "io");
        let europa = RecordIdentity::new("moon", "europa");
        let many = RelationshipData::Many(vec![io.clone()]);
        assert!(many.includes(&io));
        assert!(!many.includes(&europa));
        assert!(!RelationshipData::None.includes(&io));
    }

    #[test]
    fn test_record_builder_surface() {
        let record = Record::new("planet", "earth")
            .with_attribute("name", "Earth")
            .with_key("remoteId", "p1")
            .with_related_records("moons", vec![RecordIdentity::new("moon", "luna")]);

        assert_eq!(record.kind(), "planet");
        assert_eq!(record.attribute("name"), Some(&json!("Earth")));
        assert_eq!(record.key("remoteId"), Some("p1"));
        assert!(record
            .relationship_data("moons")
            .unwrap()
            .includes(&RecordIdentity::new("moon", "luna")));
    }

    #[test]
    fn test_record_serde_round_trip() {
        let record = Record::new("planet", "jupiter")
            .with_attribute("name", "Jupiter")
            .with_related_record("star", RecordIdentity::new("star", "sol"));

        let json = serde_json::to_value(&record).unwrap();
        assert_eq!(json["type"], "planet");
        assert_eq!(json["id"], "jupiter");
        assert_eq!(json["attributes"]["name"], "Jupiter");

        let back: Record = serde_json::from_value(json).unwrap();
        assert_eq!(back, record);
    }

    #[test]
    fn test_empty_sections_are_omitted() {
        let record = Record::new("planet", "venus");
        let json = serde_json::to_value(&record).unwrap();
        assert!(json.get("attributes").is_none());
        assert!(json.get("keys").is_none());
        assert!(json.get("relationships").is_none());
    }
}
