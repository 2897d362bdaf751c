//! Resource serialization
//!
//! The serializer contract bridges records and JSON:API resource objects.
//! [`StandardSerializer`] is the schema/KeyMap-backed implementation: it
//! writes declared attributes and relationships, translates between local
//! ids and the remote key, and mints fresh local ids (through the schema)
//! for resources seen for the first time.

use orrery_core::{
    Error, KeyMap, Record, RecordIdentity, RecordRelationship, RelationshipData, Result, Schema,
};
use serde_json::{json, Map, Value};
use std::sync::Arc;

/// Converts between records and JSON:API resource objects
pub trait JsonApiSerializer: Send + Sync {
    /// Serialize a record into a resource object
    fn serialize(&self, record: &Record) -> Result<Value>;

    /// Deserialize a resource object into a record
    ///
    /// `primary` names the local identity the resource answers for (the
    /// record sent in a write): the resource's id is recorded as that
    /// identity's remote key instead of minting a fresh local id.
    fn deserialize(&self, resource: &Value, primary: Option<&RecordIdentity>) -> Result<Record>;

    /// Resolve the local identity for a remote-keyed resource identifier
    fn resolve_identity(&self, kind: &str, remote_id: &str) -> RecordIdentity;

    /// The remote id recorded for a local identity, if known
    fn remote_id(&self, identity: &RecordIdentity) -> Option<String>;
}

/// Schema/KeyMap-backed serializer
///
/// The remote key (default `remoteId`) names the secondary key that carries
/// the backend's identifier. Deserialization is stable: an unknown remote id
/// mints a local id once and records the mapping, so the same resource
/// always resolves to the same local identity.
pub struct StandardSerializer {
    schema: Arc<Schema>,
    key_map: Arc<KeyMap>,
    remote_key: String,
}

impl StandardSerializer {
    /// Create a serializer with the default `remoteId` key
    pub fn new(schema: Arc<Schema>, key_map: Arc<KeyMap>) -> Self {
        Self::with_remote_key(schema, key_map, "remoteId")
    }

    /// Create a serializer with a custom remote key name
    pub fn with_remote_key(
        schema: Arc<Schema>,
        key_map: Arc<KeyMap>,
        remote_key: impl Into<String>,
    ) -> Self {
        Self {
            schema,
            key_map,
            remote_key: remote_key.into(),
        }
    }

    /// The remote key name
    pub fn remote_key(&self) -> &str {
        &self.remote_key
    }

    fn identifier(&self, identity: &RecordIdentity) -> Value {
        // Serialize with the remote id when known; fall back to the local id
        // for records not yet pushed.
        let id = self
            .remote_id(identity)
            .unwrap_or_else(|| identity.id.clone());
        json!({"type": identity.kind, "id": id})
    }

    fn identity_from_identifier(&self, identifier: &Value) -> Result<RecordIdentity> {
        let kind = identifier
            .get("type")
            .and_then(Value::as_str)
            .ok_or_else(|| Error::serialization("resource identifier is missing a type"))?;
        let remote_id = identifier
            .get("id")
            .and_then(Value::as_str)
            .ok_or_else(|| Error::serialization("resource identifier is missing an id"))?;
        Ok(self.resolve_identity(kind, remote_id))
    }
}

impl JsonApiSerializer for StandardSerializer {
    fn serialize(&self, record: &Record) -> Result<Value> {
        let model = self.schema.model(record.kind())?;
        let mut resource = Map::new();
        resource.insert("type".to_string(), json!(record.kind()));

        if let Some(remote_id) = self.remote_id(&record.identity) {
            resource.insert("id".to_string(), json!(remote_id));
        }

        let mut attributes = Map::new();
        for name in model.attributes.keys() {
            if let Some(value) = record.attribute(name) {
                attributes.insert(name.clone(), value.clone());
            }
        }
        if !attributes.is_empty() {
            resource.insert("attributes".to_string(), Value::Object(attributes));
        }

        let mut relationships = Map::new();
        for name in model.relationships.keys() {
            let Some(data) = record.relationship_data(name) else {
                continue;
            };
            let linkage = match data {
                RelationshipData::None => Value::Null,
                RelationshipData::One(identity) => self.identifier(identity),
                RelationshipData::Many(identities) => Value::Array(
                    identities
                        .iter()
                        .map(|identity| self.identifier(identity))
                        .collect(),
                ),
            };
            relationships.insert(name.clone(), json!({ "data": linkage }));
        }
        if !relationships.is_empty() {
            resource.insert("relationships".to_string(), Value::Object(relationships));
        }

        Ok(Value::Object(resource))
    }

    fn deserialize(&self, resource: &Value, primary: Option<&RecordIdentity>) -> Result<Record> {
        let kind = resource
            .get("type")
            .and_then(Value::as_str)
            .ok_or_else(|| Error::serialization("resource is missing a type"))?;
        let model = self.schema.model(kind)?;
        let remote_id = resource
            .get("id")
            .and_then(Value::as_str)
            .ok_or_else(|| Error::serialization("resource is missing an id"))?;

        let identity = match primary {
            Some(primary) => {
                // A write response answers for the record that was sent; the
                // server-assigned id becomes that record's remote key.
                self.key_map
                    .insert(kind, &self.remote_key, remote_id, &primary.id);
                RecordIdentity::new(kind, primary.id.clone())
            }
            None => self.resolve_identity(kind, remote_id),
        };
        let mut record = Record::from_identity(identity);
        record
            .keys
            .insert(self.remote_key.clone(), remote_id.to_string());

        if let Some(attributes) = resource.get("attributes").and_then(Value::as_object) {
            for name in model.attributes.keys() {
                if let Some(value) = attributes.get(name) {
                    record.attributes.insert(name.clone(), value.clone());
                }
            }
        }

        if let Some(relationships) = resource.get("relationships").and_then(Value::as_object) {
            for name in model.relationships.keys() {
                let Some(linkage) = relationships.get(name).and_then(|rel| rel.get("data")) else {
                    continue;
                };
                let data = match linkage {
                    Value::Null => RelationshipData::None,
                    Value::Array(identifiers) => {
                        let mut identities = Vec::with_capacity(identifiers.len());
                        for identifier in identifiers {
                            identities.push(self.identity_from_identifier(identifier)?);
                        }
                        RelationshipData::Many(identities)
                    }
                    identifier => RelationshipData::One(self.identity_from_identifier(identifier)?),
                };
                record
                    .relationships
                    .insert(name.clone(), RecordRelationship::new(data));
            }
        }

        if let Some(meta) = resource.get("meta") {
            record.meta = Some(meta.clone());
        }

        Ok(record)
    }

    fn resolve_identity(&self, kind: &str, remote_id: &str) -> RecordIdentity {
        if let Some(id) = self.key_map.key_to_id(kind, &self.remote_key, remote_id) {
            return RecordIdentity::new(kind, id);
        }
        // First sighting: mint a local id and record the mapping so this
        // resource resolves to the same identity from now on.
        let id = self.schema.generate_id(kind);
        self.key_map.insert(kind, &self.remote_key, remote_id, &id);
        RecordIdentity::new(kind, id)
    }

    fn remote_id(&self, identity: &RecordIdentity) -> Option<String> {
        self.key_map
            .id_to_key(&identity.kind, &self.remote_key, &identity.id)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use orrery_core::schema::{AttributeDef, ModelDef, RelationshipDef};

    fn fixture() -> (Arc<Schema>, Arc<KeyMap>, StandardSerializer) {
        let schema = Arc::new(
            Schema::builder()
                .model(
                    "planet",
                    ModelDef::new()
                        .with_attribute("name", AttributeDef::string())
                        .with_key("remoteId")
                        .with_relationship(
                            "moons",
                            RelationshipDef::has_many("moon").with_inverse("planet"),
                        ),
                )
                .model(
                    "moon",
                    ModelDef::new()
                        .with_attribute("name", AttributeDef::string())
                        .with_key("remoteId")
                        .with_relationship(
                            "planet",
                            RelationshipDef::has_one("planet").with_inverse("moons"),
                        ),
                )
                .build(),
        );
        let key_map = Arc::new(KeyMap::new());
        let serializer = StandardSerializer::new(schema.clone(), key_map.clone());
        (schema, key_map, serializer)
    }

    #[test]
    fn test_serialize_known_record() {
        let (_, key_map, serializer) = fixture();
        key_map.insert("planet", "remoteId", "p3", "earth");
        key_map.insert("moon", "remoteId", "m1", "luna");

        let record = Record::new("planet", "earth")
            .with_attribute("name", "Earth")
            .with_related_records("moons", vec![RecordIdentity::new("moon", "luna")]);

        let resource = serializer.serialize(&record).unwrap();
        assert_eq!(resource["type"], "planet");
        assert_eq!(resource["id"], "p3");
        assert_eq!(resource["attributes"]["name"], "Earth");
        assert_eq!(
            resource["relationships"]["moons"]["data"][0],
            serde_json::json!({"type": "moon", "id": "m1"})
        );
    }

    #[test]
    fn test_serialize_unpushed_record_omits_id() {
        let (_, _, serializer) = fixture();
        let record = Record::new("planet", "earth").with_attribute("name", "Earth");
        let resource = serializer.serialize(&record).unwrap();
        assert!(resource.get("id").is_none());
    }

    #[test]
    fn test_deserialize_mints_stable_local_ids() {
        let (_, _, serializer) = fixture();
        let resource = serde_json::json!({
            "type": "planet",
            "id": "p3",
            "attributes": {"name": "Earth"},
        });

        let first = serializer.deserialize(&resource, None).unwrap();
        let second = serializer.deserialize(&resource, None).unwrap();
        assert_eq!(first.identity, second.identity);
        assert_eq!(first.key("remoteId"), Some("p3"));
        assert_eq!(first.attribute("name"), Some(&serde_json::json!("Earth")));
    }

    #[test]
    fn test_round_trip_with_known_keys() {
        let (_, key_map, serializer) = fixture();
        key_map.insert("planet", "remoteId", "p3", "earth");
        key_map.insert("moon", "remoteId", "m1", "luna");

        let record = Record::new("planet", "earth")
            .with_attribute("name", "Earth")
            .with_key("remoteId", "p3")
            .with_related_records("moons", vec![RecordIdentity::new("moon", "luna")]);

        let resource = serializer.serialize(&record).unwrap();
        let back = serializer.deserialize(&resource, None).unwrap();
        assert_eq!(back, record);
    }

    #[test]
    fn test_deserialize_resolves_relationships_through_key_map() {
        let (_, key_map, serializer) = fixture();
        key_map.insert("planet", "remoteId", "p4", "mars");

        let resource = serde_json::json!({
            "type": "moon",
            "id": "m2",
            "relationships": {"planet": {"data": {"type": "planet", "id": "p4"}}},
        });
        let record = serializer.deserialize(&resource, None).unwrap();
        assert_eq!(
            record.relationship_data("planet"),
            Some(&RelationshipData::One(RecordIdentity::new("planet", "mars")))
        );
    }

    #[test]
    fn test_undeclared_attributes_are_dropped() {
        let (_, _, serializer) = fixture();
        let resource = serde_json::json!({
            "type": "planet",
            "id": "p5",
            "attributes": {"name": "Venus", "undeclared": true},
        });
        let record = serializer.deserialize(&resource, None).unwrap();
        assert!(record.attribute("undeclared").is_none());
    }

    #[test]
    fn test_deserialize_with_primary_keeps_local_identity() {
        let (_, key_map, serializer) = fixture();
        let resource = serde_json::json!({
            "type": "planet",
            "id": "p9",
            "attributes": {"name": "Earth"},
        });

        let primary = RecordIdentity::new("planet", "earth");
        let record = serializer.deserialize(&resource, Some(&primary)).unwrap();

        assert_eq!(record.identity, primary);
        assert_eq!(record.key("remoteId"), Some("p9"));
        assert_eq!(
            key_map.key_to_id("planet", "remoteId", "p9").as_deref(),
            Some("earth")
        );
    }

    #[test]
    fn test_unknown_model_errors() {
        let (_, _, serializer) = fixture();
        let resource = serde_json::json!({"type": "asteroid", "id": "a1"});
        assert!(matches!(
            serializer.deserialize(&resource, None).unwrap_err(),
            Error::ModelNotDefined { .. }
        ));
    }
}
