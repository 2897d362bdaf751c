#![allow(dead_code)]

//! Shared fixtures for the integration suite

use orrery::{AttributeDef, ModelDef, Record, RecordIdentity, RelationshipDef, Schema};
use std::sync::Arc;

/// Install a test tracing subscriber once per process
pub fn init_tracing() {
    let _ = tracing_subscriber::fmt().with_test_writer().try_init();
}

/// The solar-system schema used across the suite
pub fn solar_schema() -> Arc<Schema> {
    init_tracing();
    Arc::new(
        Schema::builder()
            .model(
                "planet",
                ModelDef::new()
                    .with_attribute("name", AttributeDef::string())
                    .with_attribute("sequence", AttributeDef::number())
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
    )
}

/// A planet record with a name
pub fn planet(id: &str, name: &str) -> Record {
    Record::new("planet", id).with_attribute("name", name)
}

/// A planet record with a name and sequence
pub fn planet_seq(id: &str, name: &str, sequence: i64) -> Record {
    planet(id, name).with_attribute("sequence", sequence)
}

/// A moon record linked to a planet
pub fn moon_of(id: &str, name: &str, planet_id: &str) -> Record {
    Record::new("moon", id)
        .with_attribute("name", name)
        .with_related_record("planet", RecordIdentity::new("planet", planet_id))
}
