//! What makes the worker send.

use super::{manual_config, wait_until, Harness, ScriptedTransport};
use crate::{PolicyState, SchedulerConfig};
use event_model::{event_types, Event, SendPolicy};
use std::time::Duration;

fn visit() -> Event {
    Event::new(event_types::VISIT, SendPolicy::Instant)
}

#[tokio::test]
async fn instant_event_is_sent_right_away() {
    let harness = Harness::new(ScriptedTransport::succeeding()).await;
    let scheduler = harness.start(manual_config());

    scheduler.track(visit()).unwrap();
    scheduler.sync().await.unwrap();

    assert_eq!(harness.transport.request_count(), 1);
    assert_eq!(harness.store.count(None).await, 0);
    assert_eq!(scheduler.policy_state(SendPolicy::Instant), PolicyState::Idle);
}

#[tokio::test]
async fn batch_events_wait_for_bulk_size() {
    let harness = Harness::new(ScriptedTransport::succeeding()).await;
    let scheduler = harness.start(SchedulerConfig {
        events_bulk_size: 3,
        ..manual_config()
    });

    scheduler.track(Event::custom("a")).unwrap();
    scheduler.track(Event::custom("b")).unwrap();
    scheduler.sync().await.unwrap();

    assert_eq!(harness.transport.request_count(), 0);
    assert_eq!(harness.store.count(Some(SendPolicy::Batch)).await, 2);
    assert_eq!(
        scheduler.policy_state(SendPolicy::Batch),
        PolicyState::Accumulating
    );

    scheduler.track(Event::custom("c")).unwrap();
    scheduler.sync().await.unwrap();

    assert_eq!(harness.transport.request_count(), 1);
    assert_eq!(harness.store.count(None).await, 0);
    assert_eq!(scheduler.policy_state(SendPolicy::Batch), PolicyState::Idle);
}

#[tokio::test]
async fn zero_interval_sends_after_every_event() {
    let harness = Harness::new(ScriptedTransport::succeeding()).await;
    let scheduler = harness.start(SchedulerConfig {
        upload_interval: None,
        ..Default::default()
    });

    scheduler.track(Event::custom("a")).unwrap();
    scheduler.track(Event::custom("b")).unwrap();
    scheduler.sync().await.unwrap();

    assert_eq!(harness.transport.request_count(), 2);
    assert_eq!(harness.store.count(None).await, 0);
}

#[tokio::test]
async fn timer_sends_accumulated_events() {
    let harness = Harness::new(ScriptedTransport::succeeding()).await;
    let scheduler = harness.start(SchedulerConfig {
        upload_interval: Some(Duration::from_millis(50)),
        ..Default::default()
    });

    scheduler.track(Event::custom("a")).unwrap();
    let transport = harness.transport.clone();
    assert!(wait_until(|| transport.request_count() == 1).await);

    scheduler.sync().await.unwrap();
    assert_eq!(harness.store.count(None).await, 0);
}

#[tokio::test]
async fn background_sends_everything() {
    let harness = Harness::new(ScriptedTransport::succeeding()).await;
    let scheduler = harness.start(manual_config());

    scheduler.track(Event::custom("a")).unwrap();
    scheduler
        .track(Event::new(event_types::PAGE, SendPolicy::Batch))
        .unwrap();
    scheduler.app_entered_background().unwrap();
    scheduler.sync().await.unwrap();

    // TRACK and AUTOTRACK rows never share a request.
    assert_eq!(harness.transport.request_count(), 2);
    assert_eq!(harness.store.count(None).await, 0);
}

#[tokio::test]
async fn flush_splits_by_events_per_request() {
    let harness = Harness::new(ScriptedTransport::succeeding()).await;
    let scheduler = harness.start(SchedulerConfig {
        max_events_per_request: 2,
        ..manual_config()
    });

    for i in 0..5 {
        scheduler.track(Event::custom(format!("e{i}"))).unwrap();
    }
    let report = scheduler.flush().await.unwrap();

    assert_eq!(report.batches, 3);
    assert_eq!(report.rows, 5);
    assert!(!report.failed);
    assert_eq!(harness.store.count(None).await, 0);
}

#[tokio::test]
async fn low_memory_shrinks_requests() {
    let harness = Harness::new(ScriptedTransport::succeeding()).await;
    let scheduler = harness.start(SchedulerConfig {
        low_memory_events_per_request: 1,
        ..manual_config()
    });
    scheduler.set_low_memory(true);

    for i in 0..3 {
        scheduler.track(Event::custom(format!("e{i}"))).unwrap();
    }
    let report = scheduler.flush().await.unwrap();

    assert_eq!(report.batches, 3);
    assert_eq!(harness.transport.request_count(), 3);
}

#[tokio::test]
async fn requests_target_project_collect_path() {
    let harness = Harness::new(ScriptedTransport::succeeding()).await;
    let scheduler = harness.start(manual_config());

    scheduler.track(visit()).unwrap();
    scheduler.sync().await.unwrap();

    let request = &harness.transport.requests()[0];
    assert!(request
        .url()
        .starts_with("http://collector.test/v3/projects/proj/collect?stm="));
    assert_eq!(request.media_type, "application/json");
}

#[tokio::test]
async fn clear_drops_pending_rows() {
    let harness = Harness::new(ScriptedTransport::succeeding()).await;
    let scheduler = harness.start(manual_config());

    scheduler.track(Event::custom("a")).unwrap();
    scheduler.track(Event::custom("b")).unwrap();
    let result = scheduler.clear().await.unwrap();

    assert_eq!(result.sum(), 2);
    assert_eq!(harness.store.count(None).await, 0);
    assert_eq!(scheduler.policy_state(SendPolicy::Batch), PolicyState::Idle);
}
