//! Payload formatting seen from the store.
//!
//! The store persists whatever bytes the configured formatter produces for
//! one event, and asks the same formatter to merge a batch of records into
//! one envelope. Formatting always runs outside the executor thread.

use async_trait::async_trait;
use component_registry::ComponentRegistry;
use event_model::{Event, EventByteArray, EventFormatData};
use std::sync::{Arc, Weak};
use tracing::warn;

#[async_trait]
pub trait PayloadFormatter: Send + Sync {
    /// One record for `event`, or `None` if it cannot be serialized.
    async fn serialize(&self, event: Event) -> Option<Vec<u8>>;

    /// Merge stored records; malformed records are dropped.
    async fn merge(&self, records: Vec<Vec<u8>>) -> EventByteArray;
}

/// Formatter resolved from the registry on every call.
///
/// Holds the registry weakly: the registry owns the database loader that
/// owns this formatter.
#[derive(Clone)]
pub struct RegistryFormatter {
    registry: Weak<ComponentRegistry>,
}

impl RegistryFormatter {
    pub fn new(registry: &Arc<ComponentRegistry>) -> Self {
        Self {
            registry: Arc::downgrade(registry),
        }
    }

    async fn format(&self, model: EventFormatData) -> Option<EventByteArray> {
        let registry = self.registry.upgrade()?;
        let Some(loader) = registry.resolve::<EventFormatData, EventByteArray>() else {
            warn!("no formatter registered");
            return None;
        };
        Some(loader.build_load_data(model).execute().await)
    }
}

#[async_trait]
impl PayloadFormatter for RegistryFormatter {
    async fn serialize(&self, event: Event) -> Option<Vec<u8>> {
        let bytes = self.format(EventFormatData::serialize(event)).await?;
        (bytes.count > 0).then_some(bytes.data)
    }

    async fn merge(&self, records: Vec<Vec<u8>>) -> EventByteArray {
        self.format(EventFormatData::merge(records))
            .await
            .unwrap_or_default()
    }
}
