//! Sequence ids assigned on the way into the store.

use super::{manual_config, Harness, ScriptedTransport};
use event_marshaller::{EventMarshaller, JsonMarshaller};
use event_model::{event_types, Event, SendPolicy};
use event_sequencer::SequenceGenerator;
use std::sync::Arc;
use tempfile::tempdir;

#[tokio::test]
async fn events_carry_increasing_sequence_ids() {
    let dir = tempdir().unwrap();
    let sequencer = Arc::new(SequenceGenerator::new(
        dir.path().join("event_sequence.json"),
        dir.path().join("event_sequence.lock"),
    ));

    let harness = Harness::new(ScriptedTransport::succeeding()).await;
    let scheduler = harness
        .builder(manual_config())
        .sequencer(sequencer)
        .start();

    for name in ["a", "b", "c"] {
        scheduler.track(Event::custom(name)).unwrap();
    }
    scheduler.flush().await.unwrap();

    let body = harness.transport.requests()[0].body.clone();
    let events = JsonMarshaller.unmarshall(&body).unwrap();
    let global: Vec<i64> = events.iter().map(|e| e.global_sequence_id).collect();
    let per_type: Vec<i64> = events.iter().map(|e| e.event_sequence_id).collect();
    assert_eq!(global, [1, 2, 3]);
    assert_eq!(per_type, [1, 2, 3]);
}

#[tokio::test]
async fn track_stored_reports_the_stamped_row() {
    let dir = tempdir().unwrap();
    let sequencer = Arc::new(SequenceGenerator::new(
        dir.path().join("event_sequence.json"),
        dir.path().join("event_sequence.lock"),
    ));

    let harness = Harness::new(ScriptedTransport::succeeding()).await;
    let scheduler = harness
        .builder(manual_config())
        .sequencer(sequencer)
        .start();

    let first = scheduler.track_stored(Event::custom("a")).await.unwrap();
    let second = scheduler.track_stored(Event::custom("b")).await.unwrap();
    assert!(first.is_success() && second.is_success());
    assert!(second.last_id > first.last_id);

    let pending = harness.store.query(SendPolicy::Batch, 10).await;
    let events: Vec<Event> = pending
        .rows
        .iter()
        .map(|row| JsonMarshaller.unmarshall_one(&row.payload).unwrap())
        .collect();
    let ids: Vec<(i64, i64)> = events
        .iter()
        .map(|e| (e.global_sequence_id, e.event_sequence_id))
        .collect();
    assert_eq!(ids, [(1, 1), (2, 2)]);
    assert_eq!(harness.transport.request_count(), 0);
}

#[tokio::test]
async fn track_stored_instant_event_is_sent() {
    let harness = Harness::new(ScriptedTransport::succeeding()).await;
    let scheduler = harness.start(manual_config());

    let stored = scheduler
        .track_stored(Event::new(event_types::VISIT, SendPolicy::Instant))
        .await
        .unwrap();
    assert!(stored.is_success());

    // the send runs after the reply, before the next queued command
    scheduler.sync().await.unwrap();
    assert_eq!(harness.transport.request_count(), 1);
    assert_eq!(harness.store.count(None).await, 0);
}
