//! Remote JSON:API source: transport mapping and replication into memory

mod common;

use common::solar_schema;
use orrery::{
    Error, KeyMap, MemorySource, MemorySourceSettings, Pullable, Pushable, QueryBuilder, Queryable,
    RecordIdentity, SourceBase, SourceSettings, Syncable, TransformBuilder,
};
use orrery_core::query::expression::AttributeComparison;
use orrery_jsonapi::{
    Fetch, FetchRejection, FetchRequest, FetchResponse, FetchSettings, HttpMethod, JsonApiSource,
    JsonApiSourceSettings, RequestProcessor, StandardSerializer, UrlBuilder,
};
use parking_lot::Mutex;
use serde_json::{json, Value};
use std::sync::Arc;
use std::time::Duration;

type Responder = Box<dyn Fn(&FetchRequest) -> Result<FetchResponse, FetchRejection> + Send + Sync>;

struct StubFetch {
    requests: Mutex<Vec<FetchRequest>>,
    responder: Responder,
    delay: Option<Duration>,
}

impl StubFetch {
    fn new(responder: Responder) -> Arc<Self> {
        Arc::new(Self {
            requests: Mutex::new(Vec::new()),
            responder,
            delay: None,
        })
    }

    fn delayed(delay: Duration, responder: Responder) -> Arc<Self> {
        Arc::new(Self {
            requests: Mutex::new(Vec::new()),
            responder,
            delay: Some(delay),
        })
    }
}

impl Fetch for StubFetch {
    fn fetch(&self, request: &FetchRequest) -> Result<FetchResponse, FetchRejection> {
        self.requests.lock().push(request.clone());
        if let Some(delay) = self.delay {
            std::thread::sleep(delay);
        }
        (self.responder)(request)
    }
}

struct SharedFetch(Arc<StubFetch>);

impl Fetch for SharedFetch {
    fn fetch(&self, request: &FetchRequest) -> Result<FetchResponse, FetchRejection> {
        self.0.fetch(request)
    }
}

fn remote_source(
    fetch: Arc<StubFetch>,
    timeout: Option<Duration>,
) -> (Arc<JsonApiSource>, Arc<KeyMap>) {
    let schema = solar_schema();
    let key_map = Arc::new(KeyMap::new());
    let serializer = Arc::new(StandardSerializer::new(schema.clone(), key_map.clone()));
    let source = JsonApiSource::with_settings(JsonApiSourceSettings {
        source: SourceSettings::named("remote")
            .with_schema(schema)
            .with_key_map(key_map.clone()),
        url: UrlBuilder::new("http://example.com").with_resource_path("planet", "planets"),
        processor: RequestProcessor::new(
            Box::new(SharedFetch(fetch)),
            FetchSettings {
                timeout,
                headers: Vec::new(),
            },
        ),
        serializer,
    })
    .unwrap();
    (source, key_map)
}

fn planet_document() -> Value {
    json!({
        "data": [
            {"type": "planet", "id": "p1", "attributes": {"name": "Jupiter"}},
            {"type": "planet", "id": "p2", "attributes": {"name": "Earth"}},
        ]
    })
}

#[test]
fn timeout_rejects_with_literal_description() {
    let fetch = StubFetch::delayed(
        Duration::from_millis(20),
        Box::new(|_| Ok(FetchResponse::new(200, Some(json!({"data": null}))))),
    );
    let (remote, _) = remote_source(fetch, Some(Duration::from_millis(10)));

    let q = QueryBuilder;
    let err = remote
        .query(q.find_record(RecordIdentity::new("planet", "12345")))
        .unwrap_err();
    match err {
        Error::Network { description } => {
            assert_eq!(description, "No fetch response within 10ms.");
        }
        other => panic!("unexpected error {:?}", other),
    }
}

#[test]
fn not_modified_resolves_absent_data() {
    let fetch = StubFetch::new(Box::new(|_| Ok(FetchResponse::new(304, None))));
    let (remote, _) = remote_source(fetch.clone(), None);

    let q = QueryBuilder;
    let data = remote
        .query(q.find_record(RecordIdentity::new("planet", "12345")))
        .unwrap();
    assert!(data.first().unwrap().is_none());

    let requests = fetch.requests.lock();
    assert_eq!(requests.len(), 1);
    assert_eq!(requests[0].url, "http://example.com/planets/12345");
    assert_eq!(requests[0].method, HttpMethod::Get);
}

#[test]
fn find_records_builds_params_and_deserializes() {
    let fetch = StubFetch::new(Box::new(|_| {
        Ok(FetchResponse::new(200, Some(planet_document())))
    }));
    let (remote, key_map) = remote_source(fetch.clone(), None);

    let q = QueryBuilder;
    let data = remote
        .query(q.find_records("planet").sort("-name").page(0, Some(10)))
        .unwrap();

    let records = data.first().unwrap().as_records().unwrap();
    assert_eq!(records.len(), 2);
    assert_eq!(records[0].key("remoteId"), Some("p1"));
    // The key map learned the remote ids during deserialization.
    assert!(key_map.key_to_id("planet", "remoteId", "p2").is_some());

    let requests = fetch.requests.lock();
    assert_eq!(
        requests[0].url,
        "http://example.com/planets?sort=-name&page[offset]=0&page[limit]=10"
    );
}

#[test]
fn find_records_by_identity_applies_modifiers() {
    let fetch = StubFetch::new(Box::new(|request| {
        let (name, sequence) = if request.url.ends_with("/jupiter") {
            ("Jupiter", 5)
        } else if request.url.ends_with("/earth") {
            ("Earth", 3)
        } else {
            ("Venus", 2)
        };
        let id = request.url.rsplit('/').next().unwrap();
        Ok(FetchResponse::new(
            200,
            Some(json!({"data": {
                "type": "planet",
                "id": id,
                "attributes": {"name": name, "sequence": sequence},
            }})),
        ))
    }));
    let (remote, _) = remote_source(fetch.clone(), None);

    let q = QueryBuilder;
    let data = remote
        .query(
            q.find_records_by_identity(vec![
                RecordIdentity::new("planet", "jupiter"),
                RecordIdentity::new("planet", "earth"),
                RecordIdentity::new("planet", "venus"),
            ])
            .filter_attribute("sequence", AttributeComparison::Gte, 3)
            .sort("name"),
        )
        .unwrap();

    // Each identity resolves with its own GET...
    let urls: Vec<String> = fetch
        .requests
        .lock()
        .iter()
        .map(|request| request.url.clone())
        .collect();
    assert_eq!(
        urls,
        vec![
            "http://example.com/planets/jupiter",
            "http://example.com/planets/earth",
            "http://example.com/planets/venus",
        ]
    );

    // ...and filter/sort apply client-side over the resolved records.
    let names: Vec<&str> = data
        .first()
        .unwrap()
        .as_records()
        .unwrap()
        .iter()
        .filter_map(|record| record.attribute("name"))
        .filter_map(Value::as_str)
        .collect();
    assert_eq!(names, vec!["Earth", "Jupiter"]);
}

#[test]
fn related_record_404_maps_to_record_not_found() {
    let fetch = StubFetch::new(Box::new(|_| Ok(FetchResponse::new(404, None))));
    let (remote, _) = remote_source(fetch, None);

    let q = QueryBuilder;
    let err = remote
        .query(q.find_related_record(RecordIdentity::new("moon", "gone"), "planet"))
        .unwrap_err();
    assert!(matches!(err, Error::RecordNotFound { .. }));
}

#[test]
fn related_records_404_maps_to_record_not_found() {
    let fetch = StubFetch::new(Box::new(|_| Ok(FetchResponse::new(404, None))));
    let (remote, _) = remote_source(fetch, None);

    let q = QueryBuilder;
    let err = remote
        .query(q.find_related_records(RecordIdentity::new("planet", "gone"), "moons"))
        .unwrap_err();
    assert!(matches!(err, Error::RecordNotFound { .. }));
}

#[test]
fn unknown_collection_answers_empty() {
    let fetch = StubFetch::new(Box::new(|_| Ok(FetchResponse::new(404, None))));
    let (remote, _) = remote_source(fetch, None);

    let q = QueryBuilder;
    let data = remote.query(q.find_records("planet")).unwrap();
    assert!(data.first().unwrap().as_records().unwrap().is_empty());
}

#[test]
fn missing_record_maps_to_record_not_found() {
    let fetch = StubFetch::new(Box::new(|_| {
        Ok(FetchResponse::new(
            404,
            Some(json!({"errors": [{"detail": "no such planet"}]})),
        ))
    }));
    let (remote, _) = remote_source(fetch, None);

    let q = QueryBuilder;
    let err = remote
        .query(q.find_record(RecordIdentity::new("planet", "nope")))
        .unwrap_err();
    assert!(matches!(err, Error::RecordNotFound { .. }));
}

#[test]
fn server_errors_surface_with_status() {
    let fetch = StubFetch::new(Box::new(|_| Ok(FetchResponse::new(503, None))));
    let (remote, _) = remote_source(fetch, None);

    let q = QueryBuilder;
    let err = remote.query(q.find_records("planet")).unwrap_err();
    assert!(matches!(err, Error::Server { status: 503, .. }));
}

#[test]
fn remote_query_replicates_into_memory() {
    let schema = solar_schema();
    let fetch = StubFetch::new(Box::new(|_| {
        Ok(FetchResponse::new(200, Some(planet_document())))
    }));
    let (remote, key_map) = remote_source(fetch, None);

    let mut settings = MemorySourceSettings::new(schema);
    settings.key_map = Some(key_map);
    let memory = MemorySource::with_settings(settings).unwrap();

    // Remote transforms flow into the memory source.
    let replica = memory.clone();
    remote.kernel().events().transform.on(move |transform| {
        replica.sync(transform.clone())
    });

    let q = QueryBuilder;
    remote.query(q.find_records("planet")).unwrap();

    assert_eq!(memory.cache().record_count("planet"), 2);
    let q = QueryBuilder;
    let names: Vec<String> = memory
        .query(q.find_records("planet").sort("name"))
        .unwrap()
        .first()
        .unwrap()
        .as_records()
        .unwrap()
        .iter()
        .filter_map(|record| record.attribute("name"))
        .filter_map(Value::as_str)
        .map(str::to_string)
        .collect();
    assert_eq!(names, vec!["Earth", "Jupiter"]);
}

#[test]
fn push_posts_and_learns_assigned_keys() {
    let fetch = StubFetch::new(Box::new(|request| {
        assert_eq!(request.method, HttpMethod::Post);
        let sent = request.body.as_ref().unwrap();
        assert_eq!(sent["data"]["type"], "planet");
        assert_eq!(sent["data"]["attributes"]["name"], "Earth");
        assert!(request
            .headers
            .iter()
            .any(|(name, value)| name == "Content-Type" && value == "application/vnd.api+json"));
        Ok(FetchResponse::new(
            201,
            Some(json!({"data": {"type": "planet", "id": "p9", "attributes": {"name": "Earth"}}})),
        ))
    }));
    let (remote, key_map) = remote_source(fetch.clone(), None);

    let t = TransformBuilder;
    let earth = orrery::Record::new("planet", "earth").with_attribute("name", "Earth");
    let applied = remote.push(t.add_record(earth)).unwrap();

    assert_eq!(applied.len(), 1);
    assert_eq!(
        key_map.key_to_id("planet", "remoteId", "p9").as_deref(),
        Some("earth")
    );
    assert_eq!(
        fetch.requests.lock()[0].url,
        "http://example.com/planets"
    );
}

#[test]
fn relationship_edits_hit_relationship_urls() {
    let fetch = StubFetch::new(Box::new(|_| Ok(FetchResponse::new(204, None))));
    let (remote, key_map) = remote_source(fetch.clone(), None);
    key_map.insert("planet", "remoteId", "p3", "earth");
    key_map.insert("moon", "remoteId", "m1", "luna");

    let t = TransformBuilder;
    remote
        .push(t.add_to_related_records(
            RecordIdentity::new("planet", "earth"),
            "moons",
            RecordIdentity::new("moon", "luna"),
        ))
        .unwrap();

    let requests = fetch.requests.lock();
    assert_eq!(
        requests[0].url,
        "http://example.com/planets/p3/relationships/moons"
    );
    assert_eq!(
        requests[0].body.as_ref().unwrap()["data"],
        json!([{"type": "moon", "id": "m1"}])
    );
}

#[test]
fn pull_fetches_transforms_and_logs_them() {
    let fetch = StubFetch::new(Box::new(|_| {
        Ok(FetchResponse::new(200, Some(planet_document())))
    }));
    let (remote, _) = remote_source(fetch, None);

    let q = QueryBuilder;
    let transforms = remote.pull(q.find_records("planet")).unwrap();

    assert_eq!(transforms.len(), 1);
    assert_eq!(transforms[0].operations.len(), 2);
    assert_eq!(transforms[0].operations[0].op(), "updateRecord");
    assert!(remote
        .kernel()
        .transform_log()
        .contains(&transforms[0].id));
}

#[test]
fn network_rejection_carries_reason() {
    let fetch = StubFetch::new(Box::new(|_| {
        Err(FetchRejection::new("connection refused"))
    }));
    let (remote, _) = remote_source(fetch, None);

    let q = QueryBuilder;
    let err = remote.query(q.find_records("planet")).unwrap_err();
    match err {
        Error::Network { description } => assert_eq!(description, "connection refused"),
        other => panic!("unexpected error {:?}", other),
    }
}
