//! Live queries: debounced and immediate delivery, error surfacing

mod common;

use common::{planet, solar_schema};
use orrery::{
    Error, MemorySource, MemorySourceSettings, QueryBuilder, RecordIdentity, TransformBuilder,
    Updatable,
};
use parking_lot::Mutex;
use std::sync::Arc;

#[test]
fn debounced_batch_delivers_exactly_once() {
    let memory = MemorySource::new(solar_schema()).unwrap();
    let q = QueryBuilder;
    let live = memory.live_query(q.find_records("planet")).unwrap();

    let deliveries: Arc<Mutex<Vec<usize>>> = Arc::new(Mutex::new(Vec::new()));
    let sink = deliveries.clone();
    live.subscribe(move |update| {
        let count = update
            .query()
            .unwrap()
            .first()
            .and_then(|result| result.as_records().map(<[orrery::Record]>::len))
            .unwrap_or_default();
        sink.lock().push(count);
    });

    // Nothing is published eagerly on subscription.
    assert!(deliveries.lock().is_empty());

    let t = TransformBuilder;
    memory
        .update(vec![
            t.add_record(planet("earth", "Earth")),
            t.add_record(planet("venus", "Venus")),
            t.add_record(planet("mars", "Mars")),
        ])
        .unwrap();

    // One batch, one notification, answering all three planets.
    assert_eq!(&*deliveries.lock(), &[3]);
}

#[test]
fn non_debounced_delivers_per_operation() {
    let mut settings = MemorySourceSettings::new(solar_schema());
    settings.debounce_live_queries = false;
    let memory = MemorySource::with_settings(settings).unwrap();

    let q = QueryBuilder;
    let live = memory.live_query(q.find_records("planet")).unwrap();

    let deliveries = Arc::new(Mutex::new(0usize));
    let counter = deliveries.clone();
    live.subscribe(move |_| {
        *counter.lock() += 1;
    });

    let t = TransformBuilder;
    memory
        .update(vec![
            t.add_record(planet("earth", "Earth")),
            t.add_record(planet("venus", "Venus")),
        ])
        .unwrap();

    assert_eq!(*deliveries.lock(), 2);
}

#[test]
fn reevaluation_error_surfaces_without_terminating() {
    let memory = MemorySource::new(solar_schema()).unwrap();
    let t = TransformBuilder;
    memory.update(t.add_record(planet("earth", "Earth"))).unwrap();

    let q = QueryBuilder;
    let live = memory
        .live_query(q.find_record(RecordIdentity::new("planet", "earth")))
        .unwrap();

    let outcomes: Arc<Mutex<Vec<std::result::Result<(), String>>>> =
        Arc::new(Mutex::new(Vec::new()));
    let sink = outcomes.clone();
    live.subscribe(move |update| {
        sink.lock().push(
            update
                .query()
                .map(|_| ())
                .map_err(|error| error.description()),
        );
    });

    memory
        .update(t.remove_record(RecordIdentity::new("planet", "earth")))
        .unwrap();

    {
        let outcomes = outcomes.lock();
        assert_eq!(outcomes.len(), 1);
        let failure = outcomes[0].as_ref().unwrap_err();
        assert!(failure.contains("Record not found"));
    }

    // The live query keeps running after the error.
    memory.update(t.add_record(planet("earth", "Earth"))).unwrap();
    assert_eq!(outcomes.lock().len(), 2);
    assert!(outcomes.lock()[1].is_ok());
}

#[test]
fn unsubscribe_detaches_the_query() {
    let memory = MemorySource::new(solar_schema()).unwrap();
    let q = QueryBuilder;
    let live = memory.live_query(q.find_records("planet")).unwrap();

    let deliveries = Arc::new(Mutex::new(0usize));
    let counter = deliveries.clone();
    live.subscribe(move |_| {
        *counter.lock() += 1;
    });

    let t = TransformBuilder;
    memory.update(t.add_record(planet("earth", "Earth"))).unwrap();
    assert_eq!(*deliveries.lock(), 1);

    live.unsubscribe();
    memory.update(t.add_record(planet("venus", "Venus"))).unwrap();
    assert_eq!(*deliveries.lock(), 1);
}

#[test]
fn failed_batch_notifies_nothing() {
    let memory = MemorySource::new(solar_schema()).unwrap();
    let t = TransformBuilder;
    memory.update(t.add_record(planet("earth", "Earth"))).unwrap();

    let q = QueryBuilder;
    let live = memory.live_query(q.find_records("planet")).unwrap();
    let deliveries = Arc::new(Mutex::new(0usize));
    let counter = deliveries.clone();
    live.subscribe(move |_| {
        *counter.lock() += 1;
    });

    let err = memory
        .update(vec![
            t.add_record(planet("venus", "Venus")),
            t.add_record(planet("earth", "Earth")),
        ])
        .unwrap_err();
    assert!(matches!(err, Error::RecordAlreadyExists { .. }));
    assert_eq!(*deliveries.lock(), 0);
}
