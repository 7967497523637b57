//! Registry integration: the `(EventFormatData, EventByteArray)` formatter.

use crate::{BinaryMarshaller, EventMarshaller, JsonMarshaller};
use async_trait::async_trait;
use component_registry::{
    ComponentModule, ComponentRegistry, DataFetcher, FnLoaderFactory, LoadData, ModelLoader,
};
use event_model::{EventByteArray, EventFormatData};
use std::sync::Arc;
use tracing::warn;

/// Formatter loader backed by one marshaller.
pub struct FormatLoader {
    marshaller: Arc<dyn EventMarshaller>,
}

impl FormatLoader {
    pub fn new(marshaller: Arc<dyn EventMarshaller>) -> Self {
        Self { marshaller }
    }
}

impl ModelLoader<EventFormatData, EventByteArray> for FormatLoader {
    fn build_load_data(&self, model: EventFormatData) -> LoadData<EventByteArray> {
        LoadData::new(FormatFetcher {
            marshaller: self.marshaller.clone(),
            model: Some(model),
        })
    }
}

struct FormatFetcher {
    marshaller: Arc<dyn EventMarshaller>,
    model: Option<EventFormatData>,
}

#[async_trait]
impl DataFetcher<EventByteArray> for FormatFetcher {
    /// A failed serialization yields an empty array with `count == 0`.
    async fn execute_data(&mut self) -> EventByteArray {
        let media_type = self.marshaller.media_type().to_string();
        match self.model.take() {
            Some(EventFormatData::Serialize(event)) => {
                match self.marshaller.marshall_one(&event) {
                    Ok(data) => EventByteArray {
                        data,
                        media_type,
                        count: 1,
                    },
                    Err(e) => {
                        warn!(event_type = %event.event_type, error = %e, "event serialization failed");
                        EventByteArray {
                            media_type,
                            ..Default::default()
                        }
                    }
                }
            }
            Some(EventFormatData::Merge(records)) => self.marshaller.merge(&records),
            None => EventByteArray {
                media_type,
                ..Default::default()
            },
        }
    }
}

fn register_marshaller(registry: &ComponentRegistry, marshaller: Arc<dyn EventMarshaller>) {
    let loader: Arc<dyn ModelLoader<EventFormatData, EventByteArray>> =
        Arc::new(FormatLoader::new(marshaller));
    registry.register::<EventFormatData, EventByteArray, _>(FnLoaderFactory::new(loader));
}

/// Installs the JSON formatter.
#[derive(Debug, Default)]
pub struct JsonMarshallerModule;

impl ComponentModule for JsonMarshallerModule {
    fn register_components(&self, registry: &ComponentRegistry) {
        register_marshaller(registry, Arc::new(JsonMarshaller));
    }
}

/// Installs the binary formatter.
#[derive(Debug, Default)]
pub struct BinaryMarshallerModule;

impl ComponentModule for BinaryMarshallerModule {
    fn register_components(&self, registry: &ComponentRegistry) {
        register_marshaller(registry, Arc::new(BinaryMarshaller));
    }
}
