//! Registry integration: the `(EventDatabase, EventDbResult)` storage stage.

use crate::{EventStore, PayloadFormatter};
use async_trait::async_trait;
use component_registry::{
    ComponentModule, ComponentRegistry, DataFetcher, FnLoaderFactory, LoadData, ModelLoader,
};
use event_model::{EventDatabase, EventDbResult};
use std::path::PathBuf;
use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::Arc;
use tracing::{debug, warn};

/// Storage loader over one [`EventStore`].
pub struct EventDatabaseLoader {
    store: EventStore,
    formatter: Arc<dyn PayloadFormatter>,
    legacy_path: Option<PathBuf>,
}

impl EventDatabaseLoader {
    pub fn new(store: EventStore, formatter: Arc<dyn PayloadFormatter>) -> Self {
        Self {
            store,
            formatter,
            legacy_path: None,
        }
    }

    /// Legacy database consulted by [`EventDatabase::MigrateLegacy`].
    pub fn with_legacy_path(mut self, path: impl Into<PathBuf>) -> Self {
        self.legacy_path = Some(path.into());
        self
    }

    pub fn store(&self) -> &EventStore {
        &self.store
    }
}

impl ModelLoader<EventDatabase, EventDbResult> for EventDatabaseLoader {
    fn build_load_data(&self, model: EventDatabase) -> LoadData<EventDbResult> {
        LoadData::new(DatabaseFetcher {
            store: self.store.clone(),
            formatter: self.formatter.clone(),
            legacy_path: self.legacy_path.clone(),
            model: Some(model),
            cancelled: Arc::new(AtomicBool::new(false)),
        })
    }
}

/// Runs one storage operation.
///
/// Once cancelled, the fetcher performs no further writes; an operation
/// already handed to the executor thread still completes.
pub struct DatabaseFetcher {
    store: EventStore,
    formatter: Arc<dyn PayloadFormatter>,
    legacy_path: Option<PathBuf>,
    model: Option<EventDatabase>,
    cancelled: Arc<AtomicBool>,
}

impl DatabaseFetcher {
    fn is_cancelled(&self, operation: &'static str) -> bool {
        let cancelled = self.cancelled.load(Ordering::Acquire);
        if cancelled {
            debug!(operation, "storage operation cancelled");
        }
        cancelled
    }

    /// Attach the merged envelope of the returned rows.
    async fn with_envelope(&self, mut result: EventDbResult) -> EventDbResult {
        if !result.is_success() || result.rows.is_empty() {
            return result;
        }
        let records = result.rows.iter().map(|row| row.payload.clone()).collect();
        let merged = self.formatter.merge(records).await;
        if merged.count < result.rows.len() {
            warn!(
                rows = result.rows.len(),
                valid = merged.count,
                "malformed stored records left out of the envelope"
            );
        }
        result.data = Some(merged.data);
        result.media_type = Some(merged.media_type);
        result
    }
}

#[async_trait]
impl DataFetcher<EventDbResult> for DatabaseFetcher {
    async fn execute_data(&mut self) -> EventDbResult {
        let Some(model) = self.model.take() else {
            return EventDbResult::failed();
        };
        let operation = model.name();
        if self.is_cancelled(operation) {
            return EventDbResult::failed();
        }

        match model {
            EventDatabase::Insert(event) => {
                if let Err(e) = event.validate() {
                    warn!(error = %e, "invalid event dropped");
                    return EventDbResult::failed();
                }
                let category = event.category();
                let policy = event.send_policy;
                let Some(payload) = self.formatter.serialize(event).await else {
                    warn!(category = %category, "event could not be formatted, dropped");
                    return EventDbResult::failed();
                };
                if self.is_cancelled(operation) {
                    return EventDbResult::failed();
                }
                self.store.insert(category, policy, payload).await
            }
            EventDatabase::Query { policy, limit } => {
                let result = self.store.query(policy, limit).await;
                self.with_envelope(result).await
            }
            EventDatabase::QueryAndDelete { policy, limit } => {
                let result = self.store.query_and_delete(policy, limit).await;
                self.with_envelope(result).await
            }
            EventDatabase::Delete {
                last_id,
                policy,
                category,
            } => self.store.delete(last_id, policy, category).await,
            EventDatabase::RemoveOverdue => self.store.remove_overdue_events().await,
            EventDatabase::Clear => self.store.remove_all_events().await,
            EventDatabase::MigrateLegacy => match &self.legacy_path {
                Some(path) => {
                    self.store
                        .migrate_legacy_events(path, self.formatter.as_ref())
                        .await
                }
                None => EventDbResult::succeeded(0),
            },
        }
    }

    fn cancel(&self) {
        self.cancelled.store(true, Ordering::Release);
    }
}

/// Installs the storage stage.
pub struct DatabaseModule {
    loader: Arc<EventDatabaseLoader>,
}

impl DatabaseModule {
    pub fn new(loader: EventDatabaseLoader) -> Self {
        Self {
            loader: Arc::new(loader),
        }
    }
}

impl ComponentModule for DatabaseModule {
    fn register_components(&self, registry: &ComponentRegistry) {
        let loader: Arc<dyn ModelLoader<EventDatabase, EventDbResult>> = self.loader.clone();
        registry.register::<EventDatabase, EventDbResult, _>(FnLoaderFactory::new(loader));
    }
}
