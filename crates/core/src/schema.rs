//! Schema: model declarations
//!
//! A schema declares, per model type, its attributes (optionally typed), its
//! named secondary keys, and its relationships (to-one or to-many, with an
//! optional inverse relation name and target types). Declarations are
//! immutable per version; `upgrade` installs a new model set, bumps the
//! version, and notifies registered listeners so sources can react.
//!
//! The schema owns local-id generation. The generator is injectable for
//! determinism in tests and defaults to uuid v4. The KeyMap never mints ids.

use crate::error::{Error, Result};
use indexmap::IndexMap;
use parking_lot::{Mutex, RwLock};
use serde::{Deserialize, Serialize};
use serde_json::Value;
use std::sync::Arc;

/// Declaration of one attribute
#[derive(Debug, Clone, PartialEq, Default, Serialize, Deserialize)]
pub struct AttributeDef {
    /// Declared kind, e.g. `"string"` or `"number"`; free-form
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub kind: Option<String>,
    /// Free-form metadata
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub meta: Option<Value>,
}

impl AttributeDef {
    /// A string attribute
    pub fn string() -> Self {
        Self {
            kind: Some("string".into()),
            meta: None,
        }
    }

    /// A number attribute
    pub fn number() -> Self {
        Self {
            kind: Some("number".into()),
            meta: None,
        }
    }

    /// A boolean attribute
    pub fn boolean() -> Self {
        Self {
            kind: Some("boolean".into()),
            meta: None,
        }
    }
}

/// Declaration of one named secondary key
#[derive(Debug, Clone, PartialEq, Default, Serialize, Deserialize)]
pub struct KeyDef {
    /// Free-form metadata
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub meta: Option<Value>,
}

/// Arity of a relationship
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub enum RelationshipKind {
    /// To-one
    HasOne,
    /// To-many
    HasMany,
}

/// Declaration of one relationship
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct RelationshipDef {
    /// Arity
    pub kind: RelationshipKind,
    /// Target model types; empty means unconstrained
    #[serde(default, skip_serializing_if = "Vec::is_empty")]
    pub models: Vec<String>,
    /// Name of the inverse relationship on the target model, if bidirectional
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub inverse: Option<String>,
}

impl RelationshipDef {
    /// A to-one relationship targeting one model type
    pub fn has_one(model: impl Into<String>) -> Self {
        Self {
            kind: RelationshipKind::HasOne,
            models: vec![model.into()],
            inverse: None,
        }
    }

    /// A to-many relationship targeting one model type
    pub fn has_many(model: impl Into<String>) -> Self {
        Self {
            kind: RelationshipKind::HasMany,
            models: vec![model.into()],
            inverse: None,
        }
    }

    /// Declare the inverse relation name, builder style
    pub fn with_inverse(mut self, inverse: impl Into<String>) -> Self {
        self.inverse = Some(inverse.into());
        self
    }

    /// Check whether this relationship is to-many
    pub fn is_has_many(&self) -> bool {
        self.kind == RelationshipKind::HasMany
    }
}

/// Declaration of one model type
#[derive(Debug, Clone, PartialEq, Default, Serialize, Deserialize)]
pub struct ModelDef {
    /// Attributes by name
    #[serde(default, skip_serializing_if = "IndexMap::is_empty")]
    pub attributes: IndexMap<String, AttributeDef>,
    /// Secondary keys by name
    #[serde(default, skip_serializing_if = "IndexMap::is_empty")]
    pub keys: IndexMap<String, KeyDef>,
    /// Relationships by name
    #[serde(default, skip_serializing_if = "IndexMap::is_empty")]
    pub relationships: IndexMap<String, RelationshipDef>,
}

impl ModelDef {
    /// An empty model declaration
    pub fn new() -> Self {
        Self::default()
    }

    /// Declare an attribute, builder style
    pub fn with_attribute(mut self, name: impl Into<String>, def: AttributeDef) -> Self {
        self.attributes.insert(name.into(), def);
        self
    }

    /// Declare a secondary key, builder style
    pub fn with_key(mut self, name: impl Into<String>) -> Self {
        self.keys.insert(name.into(), KeyDef::default());
        self
    }

    /// Declare a relationship, builder style
    pub fn with_relationship(mut self, name: impl Into<String>, def: RelationshipDef) -> Self {
        self.relationships.insert(name.into(), def);
        self
    }
}

/// Injectable local-id generator
pub type IdGenerator = Box<dyn Fn(&str) -> String + Send + Sync>;

/// Handle for removing an upgrade listener
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub struct UpgradeListenerKey(u64);

struct SchemaState {
    version: u64,
    models: IndexMap<String, Arc<ModelDef>>,
}

type UpgradeListener = Box<dyn FnMut(u64) + Send>;

/// Immutable-per-version model declarations with id generation
///
/// Shared as `Arc<Schema>` between sources, caches, and serializers.
///
/// # Example
///
/// ```ignore
/// let schema = Schema::builder()
///     .model(
///         "planet",
///         ModelDef::new()
///             .with_attribute("name", AttributeDef::string())
///             .with_relationship("moons", RelationshipDef::has_many("moon").with_inverse("planet")),
///     )
///     .build();
/// let id = schema.generate_id("planet");
/// ```
pub struct Schema {
    state: RwLock<SchemaState>,
    id_generator: IdGenerator,
    upgrade_listeners: Mutex<Vec<(UpgradeListenerKey, UpgradeListener)>>,
    next_listener_key: Mutex<u64>,
}

impl std::fmt::Debug for Schema {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        let state = self.state.read();
        f.debug_struct("Schema")
            .field("version", &state.version)
            .field("models", &state.models.keys().collect::<Vec<_>>())
            .finish()
    }
}

impl Schema {
    /// Create a schema at version 1 with the given models
    pub fn new(models: IndexMap<String, ModelDef>) -> Self {
        Self {
            state: RwLock::new(SchemaState {
                version: 1,
                models: models
                    .into_iter()
                    .map(|(name, def)| (name, Arc::new(def)))
                    .collect(),
            }),
            id_generator: Box::new(|_| uuid::Uuid::new_v4().to_string()),
            upgrade_listeners: Mutex::new(Vec::new()),
            next_listener_key: Mutex::new(0),
        }
    }

    /// Start a schema builder
    pub fn builder() -> SchemaBuilder {
        SchemaBuilder::default()
    }

    /// Replace the id generator (determinism in tests)
    pub fn set_id_generator(&mut self, generator: IdGenerator) {
        self.id_generator = generator;
    }

    /// Current schema version (starts at 1, bumped by `upgrade`)
    pub fn version(&self) -> u64 {
        self.state.read().version
    }

    /// Names of all declared models, in declaration order
    pub fn model_names(&self) -> Vec<String> {
        self.state.read().models.keys().cloned().collect()
    }

    /// Check whether a model type is declared
    pub fn has_model(&self, kind: &str) -> bool {
        self.state.read().models.contains_key(kind)
    }

    /// Get a model declaration
    pub fn model(&self, kind: &str) -> Result<Arc<ModelDef>> {
        self.state
            .read()
            .models
            .get(kind)
            .cloned()
            .ok_or_else(|| Error::model_not_defined(kind))
    }

    /// Get an attribute declaration
    pub fn attribute_def(&self, kind: &str, attribute: &str) -> Result<AttributeDef> {
        let model = self.model(kind)?;
        model.attributes.get(attribute).cloned().ok_or_else(|| {
            Error::schema(format!("attribute {} not defined on {}", attribute, kind))
        })
    }

    /// Get a key declaration
    pub fn key_def(&self, kind: &str, key: &str) -> Result<KeyDef> {
        let model = self.model(kind)?;
        model
            .keys
            .get(key)
            .cloned()
            .ok_or_else(|| Error::schema(format!("key {} not defined on {}", key, kind)))
    }

    /// Get a relationship declaration
    pub fn relationship_def(&self, kind: &str, relationship: &str) -> Result<RelationshipDef> {
        let model = self.model(kind)?;
        model.relationships.get(relationship).cloned().ok_or_else(|| {
            Error::schema(format!(
                "relationship {} not defined on {}",
                relationship, kind
            ))
        })
    }

    /// Generate a fresh local id for the given model type
    pub fn generate_id(&self, kind: &str) -> String {
        (self.id_generator)(kind)
    }

    /// Install a new model set, bump the version, and notify listeners
    pub fn upgrade(&self, models: IndexMap<String, ModelDef>) {
        let version = {
            let mut state = self.state.write();
            state.models = models
                .into_iter()
                .map(|(name, def)| (name, Arc::new(def)))
                .collect();
            state.version += 1;
            state.version
        };
        let mut listeners = self.upgrade_listeners.lock();
        for (_, listener) in listeners.iter_mut() {
            listener(version);
        }
    }

    /// Register an upgrade listener; returns a key for removal
    pub fn on_upgrade(&self, listener: impl FnMut(u64) + Send + 'static) -> UpgradeListenerKey {
        let key = {
            let mut next = self.next_listener_key.lock();
            *next += 1;
            UpgradeListenerKey(*next)
        };
        self.upgrade_listeners.lock().push((key, Box::new(listener)));
        key
    }

    /// Remove an upgrade listener
    pub fn off_upgrade(&self, key: UpgradeListenerKey) {
        self.upgrade_listeners.lock().retain(|(k, _)| *k != key);
    }
}

/// Builder for [`Schema`]
#[derive(Default)]
pub struct SchemaBuilder {
    models: IndexMap<String, ModelDef>,
    id_generator: Option<IdGenerator>,
}

impl SchemaBuilder {
    /// Declare a model
    pub fn model(mut self, name: impl Into<String>, def: ModelDef) -> Self {
        self.models.insert(name.into(), def);
        self
    }

    /// Inject an id generator
    pub fn id_generator(mut self, generator: IdGenerator) -> Self {
        self.id_generator = Some(generator);
        self
    }

    /// Finish the schema
    pub fn build(self) -> Schema {
        let mut schema = Schema::new(self.models);
        if let Some(generator) = self.id_generator {
            schema.id_generator = generator;
        }
        schema
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::sync::atomic::{AtomicU64, Ordering};

    fn solar_schema() -> Schema {
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
                    .with_relationship(
                        "planet",
                        RelationshipDef::has_one("planet").with_inverse("moons"),
                    ),
            )
            .build()
    }

    #[test]
    fn test_model_lookup() {
        let schema = solar_schema();
        assert!(schema.has_model("planet"));
        assert!(!schema.has_model("asteroid"));
        assert!(matches!(
            schema.model("asteroid").unwrap_err(),
            Error::ModelNotDefined { .. }
        ));
    }

    #[test]
    fn test_relationship_def_lookup() {
        let schema = solar_schema();
        let moons = schema.relationship_def("planet", "moons").unwrap();
        assert!(moons.is_has_many());
        assert_eq!(moons.inverse.as_deref(), Some("planet"));
        assert_eq!(moons.models, vec!["moon".to_string()]);

        assert!(schema.relationship_def("planet", "rings").is_err());
    }

    #[test]
    fn test_attribute_and_key_defs() {
        let schema = solar_schema();
        assert_eq!(
            schema.attribute_def("planet", "name").unwrap().kind.as_deref(),
            Some("string")
        );
        assert!(schema.key_def("planet", "remoteId").is_ok());
        assert!(schema.key_def("moon", "remoteId").is_err());
    }

    #[test]
    fn test_injectable_id_generator() {
        static COUNTER: AtomicU64 = AtomicU64::new(0);
        let schema = Schema::builder()
            .model("planet", ModelDef::new())
            .id_generator(Box::new(|kind| {
                format!("{}-{}", kind, COUNTER.fetch_add(1, Ordering::SeqCst))
            }))
            .build();
        assert_eq!(schema.generate_id("planet"), "planet-0");
        assert_eq!(schema.generate_id("planet"), "planet-1");
    }

    #[test]
    fn test_default_generator_yields_unique_ids() {
        let schema = solar_schema();
        assert_ne!(schema.generate_id("planet"), schema.generate_id("planet"));
    }

    #[test]
    fn test_upgrade_bumps_version_and_notifies() {
        let schema = solar_schema();
        assert_eq!(schema.version(), 1);

        let observed = Arc::new(AtomicU64::new(0));
        let seen = observed.clone();
        let key = schema.on_upgrade(move |version| {
            seen.store(version, Ordering::SeqCst);
        });

        let mut models = IndexMap::new();
        models.insert("planet".to_string(), ModelDef::new());
        schema.upgrade(models);

        assert_eq!(schema.version(), 2);
        assert_eq!(observed.load(Ordering::SeqCst), 2);
        assert!(!schema.has_model("moon"));

        schema.off_upgrade(key);
        let mut models = IndexMap::new();
        models.insert("planet".to_string(), ModelDef::new());
        schema.upgrade(models);
        assert_eq!(observed.load(Ordering::SeqCst), 2);
    }
}
