//! The tracker context: one running pipeline.

use crate::components::install_default_components;
use crate::lifecycle::{AppLifecycle, LifecycleListener, Listeners, Subscription};
use crate::{TrackerError, TrackerResult};
use batch_scheduler::{BatchScheduler, FlushReport, PolicyState, SchedulerConfig};
use component_registry::ComponentRegistry;
use event_database::{EventStore, PendingCount};
use event_model::{Event, EventDatabase, EventDbResult, SendPolicy};
use event_sender::EventHttpSender;
use event_sequencer::{ProcessLock, SequenceGenerator};
use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::Arc;
use tracker_config_and_utils::{Paths, TrackerConfig};
use tracing::{debug, info, warn};

/// Scheduler settings taken from the tracker configuration.
pub fn scheduler_config(config: &TrackerConfig) -> SchedulerConfig {
    SchedulerConfig {
        upload_interval: config.upload_interval(),
        events_bulk_size: config.events_bulk_size,
        max_events_per_request: config.max_events_per_request,
        low_memory_events_per_request: config.low_memory_events_per_request,
    }
}

/// A started pipeline and everything it owns.
///
/// Created by [`Tracker::start`] and torn down by [`Tracker::shutdown`];
/// nothing is process-global, so several trackers over different base
/// directories can run side by side.
pub struct Tracker {
    config: TrackerConfig,
    paths: Paths,
    registry: Arc<ComponentRegistry>,
    store: EventStore,
    scheduler: BatchScheduler,
    listeners: Arc<Listeners>,
    shut_down: AtomicBool,
}

impl Tracker {
    /// Open the store, run startup housekeeping and start the scheduler.
    ///
    /// Housekeeping moves rows out of a legacy database first, then drops
    /// rows older than the retention window.
    pub async fn start(config: TrackerConfig, paths: Paths) -> TrackerResult<Self> {
        config.validate()?;
        paths.ensure_dirs()?;

        let store = EventStore::open(&paths.database_file())
            .await?
            .with_validity_period_days(config.data_validity_period_days());

        let registry = Arc::new(ComponentRegistry::new());
        install_default_components(
            &registry,
            &config,
            store.clone(),
            &paths.legacy_database_file(),
        )?;

        housekeeping(&registry).await;

        let sequencer = Arc::new(SequenceGenerator::new(
            paths.sequence_file(),
            paths.sequence_lock_file(),
        ));
        let process_lock = ProcessLock::acquire(&paths.sender_lock_file())?;
        let sender = EventHttpSender::new(
            registry.clone(),
            config.data_collection_server_host.clone(),
            config.project_id.clone(),
        )
        .with_compression(config.compress);

        let scheduler = BatchScheduler::builder(scheduler_config(&config), registry.clone(), sender)
            .sequencer(sequencer)
            .process_lock(process_lock)
            .start();

        info!(
            project_id = %config.project_id,
            host = %config.data_collection_server_host,
            base_dir = %paths.base_dir().display(),
            "tracker started"
        );

        Ok(Self {
            config,
            paths,
            registry,
            store,
            scheduler,
            listeners: Arc::new(Listeners::default()),
            shut_down: AtomicBool::new(false),
        })
    }

    pub fn config(&self) -> &TrackerConfig {
        &self.config
    }

    pub fn paths(&self) -> &Paths {
        &self.paths
    }

    /// The component registry, for replacing or adding stages.
    pub fn registry(&self) -> &Arc<ComponentRegistry> {
        &self.registry
    }

    pub fn store(&self) -> &EventStore {
        &self.store
    }

    /// Queue an event for storage and delivery. Never blocks on the store.
    pub fn track(&self, event: Event) {
        if let Err(e) = self.scheduler.track(event) {
            warn!(error = %e, "event dropped");
        }
    }

    /// Queue an event and wait for its row, sequence id assigned.
    ///
    /// Used by callers in other processes that need the insert result;
    /// delivery still happens on the worker's own triggers.
    pub async fn track_stored(&self, event: Event) -> TrackerResult<EventDbResult> {
        Ok(self.scheduler.track_stored(event).await?)
    }

    /// React to a host lifecycle transition, then notify listeners.
    pub fn on_lifecycle(&self, event: AppLifecycle) {
        if self.is_shut_down() {
            return;
        }
        debug!(?event, "lifecycle transition");
        match event {
            AppLifecycle::Background => {
                if let Err(e) = self.scheduler.app_entered_background() {
                    warn!(error = %e, "background send not scheduled");
                }
            }
            AppLifecycle::LowMemory => self.scheduler.set_low_memory(true),
            AppLifecycle::MemoryRecovered => self.scheduler.set_low_memory(false),
            AppLifecycle::Foreground => {}
        }
        self.listeners.notify(event);
    }

    /// Register a lifecycle listener until the returned handle is dropped.
    pub fn subscribe(&self, listener: impl LifecycleListener + 'static) -> Subscription {
        self.listeners.subscribe(Arc::new(listener))
    }

    pub fn listener_count(&self) -> usize {
        self.listeners.len()
    }

    /// Delete every stored event, sent or not.
    pub async fn clear_collected_data(&self) -> TrackerResult<EventDbResult> {
        let result = self.scheduler.clear().await?;
        info!(removed = result.sum(), "collected data cleared");
        Ok(result)
    }

    /// Send everything pending now.
    pub async fn flush(&self) -> TrackerResult<FlushReport> {
        Ok(self.scheduler.flush().await?)
    }

    pub fn set_low_memory(&self, low_memory: bool) {
        self.scheduler.set_low_memory(low_memory);
    }

    pub fn policy_state(&self, policy: SendPolicy) -> PolicyState {
        self.scheduler.policy_state(policy)
    }

    /// Wait until every event queued so far is stored.
    pub async fn sync(&self) -> TrackerResult<()> {
        Ok(self.scheduler.sync().await?)
    }

    pub async fn pending_counts(&self) -> Vec<PendingCount> {
        self.store.pending_counts().await
    }

    pub fn is_shut_down(&self) -> bool {
        self.shut_down.load(Ordering::Acquire)
    }

    /// Stop the scheduler and release every listener.
    ///
    /// Queued events are stored before the worker exits; an in-flight send
    /// is abandoned and its rows stay for the next start.
    pub async fn shutdown(&self) -> TrackerResult<()> {
        if self.shut_down.swap(true, Ordering::AcqRel) {
            return Err(TrackerError::ShutDown);
        }
        self.listeners.clear();
        self.scheduler.shutdown().await?;
        info!("tracker stopped");
        Ok(())
    }
}

async fn housekeeping(registry: &ComponentRegistry) {
    let Some(storage) = registry.resolve::<EventDatabase, EventDbResult>() else {
        warn!("no storage stage, skipping housekeeping");
        return;
    };

    let migrated = storage
        .build_load_data(EventDatabase::migrate_legacy())
        .execute()
        .await;
    if !migrated.is_success() {
        warn!("legacy migration failed, retrying next start");
    } else if migrated.sum() > 0 {
        info!(rows = migrated.sum(), "legacy events migrated");
    }

    let overdue = storage
        .build_load_data(EventDatabase::outdated())
        .execute()
        .await;
    if overdue.sum() > 0 {
        info!(rows = overdue.sum(), "overdue events removed");
    }
}
