//! Failed and cancelled sends.

use super::{manual_config, wait_until, Harness, ScriptedTransport};
use crate::{PolicyState, SchedulerError};
use event_model::{event_types, Event, SendPolicy};
use event_sequencer::ProcessLock;
use std::time::Duration;
use tempfile::tempdir;

#[tokio::test]
async fn failed_send_keeps_rows() {
    let harness = Harness::new(ScriptedTransport::failing()).await;
    let scheduler = harness.start(manual_config());

    scheduler
        .track(Event::new(event_types::VISIT, SendPolicy::Instant))
        .unwrap();
    scheduler.sync().await.unwrap();

    assert_eq!(harness.transport.request_count(), 1);
    assert_eq!(harness.store.count(Some(SendPolicy::Instant)).await, 1);
    assert_eq!(
        scheduler.policy_state(SendPolicy::Instant),
        PolicyState::Accumulating
    );
}

#[tokio::test]
async fn next_trigger_resends_retained_rows() {
    let harness = Harness::new(ScriptedTransport::succeeding()).await;
    harness.transport.script([false]);
    let scheduler = harness.start(manual_config());

    scheduler.track(Event::custom("a")).unwrap();
    let first = scheduler.flush().await.unwrap();
    assert!(first.failed);
    assert_eq!(harness.store.count(None).await, 1);

    let second = scheduler.flush().await.unwrap();
    assert!(!second.failed);
    assert_eq!(second.rows, 1);
    assert_eq!(harness.store.count(None).await, 0);
    assert_eq!(harness.transport.request_count(), 2);
}

#[tokio::test]
async fn failure_stops_the_pass() {
    let harness = Harness::new(ScriptedTransport::succeeding()).await;
    harness.transport.script([true, false]);
    let scheduler = harness.start(crate::SchedulerConfig {
        max_events_per_request: 1,
        ..manual_config()
    });

    for i in 0..4 {
        scheduler.track(Event::custom(format!("e{i}"))).unwrap();
    }
    let report = scheduler.flush().await.unwrap();

    assert_eq!(report.batches, 1);
    assert!(report.failed);
    assert_eq!(harness.transport.request_count(), 2);
    assert_eq!(harness.store.count(None).await, 3);
}

#[tokio::test]
async fn shutdown_abandons_in_flight_send() {
    let harness = Harness::new(ScriptedTransport::succeeding()).await;
    harness.transport.set_delay(Duration::from_secs(30));
    let scheduler = harness.start(manual_config());

    scheduler
        .track(Event::new(event_types::VISIT, SendPolicy::Instant))
        .unwrap();
    let transport = harness.transport.clone();
    assert!(wait_until(|| transport.request_count() == 1).await);

    scheduler.shutdown().await.unwrap();

    assert_eq!(harness.store.count(None).await, 1);
    assert!(!scheduler.is_running());
    assert!(matches!(
        scheduler.track(Event::custom("late")),
        Err(SchedulerError::Stopped)
    ));
}

#[tokio::test]
async fn response_due_after_shutdown_deletes_nothing() {
    let harness = Harness::new(ScriptedTransport::succeeding()).await;
    harness.transport.set_delay(Duration::from_millis(200));
    let scheduler = harness.start(manual_config());

    scheduler
        .track(Event::new(event_types::VISIT, SendPolicy::Instant))
        .unwrap();
    let transport = harness.transport.clone();
    assert!(wait_until(|| transport.request_count() == 1).await);

    scheduler.shutdown().await.unwrap();
    // past the point the scripted success would have arrived
    tokio::time::sleep(Duration::from_millis(400)).await;

    assert_eq!(harness.transport.request_count(), 1);
    assert_eq!(harness.store.count(None).await, 1);
}

#[tokio::test]
async fn queued_events_are_stored_on_shutdown() {
    let harness = Harness::new(ScriptedTransport::succeeding()).await;
    harness.transport.set_delay(Duration::from_secs(30));
    let scheduler = harness.start(manual_config());

    scheduler
        .track(Event::new(event_types::VISIT, SendPolicy::Instant))
        .unwrap();
    let transport = harness.transport.clone();
    assert!(wait_until(|| transport.request_count() == 1).await);

    // Queued behind the stalled send.
    scheduler.track(Event::custom("queued")).unwrap();
    scheduler.shutdown().await.unwrap();

    assert_eq!(harness.store.count(Some(SendPolicy::Batch)).await, 1);
    assert_eq!(harness.transport.request_count(), 1);
}

#[tokio::test]
async fn only_the_lock_holder_sends() {
    let dir = tempdir().unwrap();
    let lock_path = dir.path().join("sender.lock");
    let owner = ProcessLock::acquire(&lock_path).unwrap();
    assert!(owner.is_acquired());

    let harness = Harness::new(ScriptedTransport::succeeding()).await;
    let scheduler = harness
        .builder(manual_config())
        .process_lock(ProcessLock::acquire(&lock_path).unwrap())
        .start();

    scheduler
        .track(Event::new(event_types::VISIT, SendPolicy::Instant))
        .unwrap();
    let report = scheduler.flush().await.unwrap();

    assert_eq!(report.batches, 0);
    assert_eq!(harness.transport.request_count(), 0);
    assert_eq!(harness.store.count(None).await, 1);

    drop(owner);
    let report = scheduler.flush().await.unwrap();
    assert_eq!(report.rows, 1);
    assert_eq!(harness.store.count(None).await, 0);
}
