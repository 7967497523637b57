//! `events.insert` routed through an intake that assigns sequence ids.

use super::{registry_with_store, Served};
use crate::{error_codes, EventIntake, IpcError, StoreService};
use async_trait::async_trait;
use component_registry::ComponentRegistry;
use event_database::EventStore;
use event_marshaller::{EventMarshaller, JsonMarshaller};
use event_model::{Event, EventDatabase, EventDbResult, SendPolicy};
use event_sequencer::SequenceGenerator;
use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::Arc;
use tempfile::TempDir;

/// Stamps ids, then stores through the registry, like the scheduler does.
struct SequencingIntake {
    _dir: TempDir,
    registry: Arc<ComponentRegistry>,
    sequencer: SequenceGenerator,
    stopped: AtomicBool,
}

impl SequencingIntake {
    fn new(registry: Arc<ComponentRegistry>) -> Arc<Self> {
        let dir = tempfile::tempdir().unwrap();
        let sequencer = SequenceGenerator::new(
            dir.path().join("event_sequence.json"),
            dir.path().join("event_sequence.lock"),
        );
        Arc::new(Self {
            _dir: dir,
            registry,
            sequencer,
            stopped: AtomicBool::new(false),
        })
    }
}

#[async_trait]
impl EventIntake for SequencingIntake {
    async fn ingest(&self, event: Event) -> Option<EventDbResult> {
        if self.stopped.load(Ordering::Acquire) {
            return None;
        }
        let id = self.sequencer.get_and_increment(&event.event_type).unwrap();
        let loader = self.registry.resolve::<EventDatabase, EventDbResult>()?;
        Some(
            loader
                .build_load_data(EventDatabase::insert(event.with_sequence_id(id)))
                .execute()
                .await,
        )
    }
}

#[tokio::test]
async fn inserts_get_distinct_increasing_ids() {
    let store = EventStore::open_in_memory().await.unwrap();
    let registry = registry_with_store(store.clone());
    let intake = SequencingIntake::new(registry.clone());
    let served = Served::serve(StoreService::with_intake(registry, intake)).await;
    let client = &served.client;

    for name in ["a", "b"] {
        let inserted = client.insert(&Event::custom(name)).await.unwrap();
        assert!(inserted.is_success());
    }

    let batch = client.query(SendPolicy::Batch, 10).await.unwrap();
    let events = JsonMarshaller
        .unmarshall(batch.data.as_deref().unwrap())
        .unwrap();
    let ids: Vec<(i64, i64)> = events
        .iter()
        .map(|e| (e.global_sequence_id, e.event_sequence_id))
        .collect();
    assert_eq!(ids, [(1, 1), (2, 2)]);

    served.stop().await;
}

#[tokio::test]
async fn stopped_intake_reports_unavailable() {
    let store = EventStore::open_in_memory().await.unwrap();
    let registry = registry_with_store(store.clone());
    let intake = SequencingIntake::new(registry.clone());
    intake.stopped.store(true, Ordering::Release);
    let served = Served::serve(StoreService::with_intake(registry, intake)).await;

    match served.client.insert(&Event::custom("late")).await {
        Err(IpcError::Remote { code, .. }) => assert_eq!(code, error_codes::STORE_UNAVAILABLE),
        other => panic!("expected unavailable, got {other:?}"),
    }
    assert_eq!(store.count(None).await, 0);

    // non-insert methods still reach the store directly
    assert!(served.client.clear().await.unwrap().is_success());

    served.stop().await;
}
