//! Delivery of one batch to the collection endpoint.

use component_registry::ComponentRegistry;
use event_model::{
    now_millis, Event, EventByteArray, EventDbResult, EventEncoder, EventFormatData,
    EventResponse, EventUrl,
};
use std::sync::Arc;
use tracing::{debug, warn};

/// Builds collector requests and runs them through the registered
/// encoder and transport stages.
///
/// A missing transport means delivery is not configured; every send then
/// fails and stored rows stay put. A missing encoder sends bodies as is.
#[derive(Clone)]
pub struct EventHttpSender {
    registry: Arc<ComponentRegistry>,
    host: String,
    project_id: String,
    compress: bool,
}

impl EventHttpSender {
    pub fn new(
        registry: Arc<ComponentRegistry>,
        host: impl Into<String>,
        project_id: impl Into<String>,
    ) -> Self {
        Self {
            registry,
            host: host.into(),
            project_id: project_id.into(),
            compress: true,
        }
    }

    /// Skip the encoder stage even when one is registered.
    pub fn with_compression(mut self, compress: bool) -> Self {
        self.compress = compress;
        self
    }

    /// Request for one envelope, stamped with the current time.
    pub fn request_for(&self, data: Vec<u8>, media_type: &str) -> EventUrl {
        EventUrl::new(self.host.clone(), self.project_id.clone(), now_millis())
            .with_body(data, media_type)
    }

    /// Send one marshalled envelope.
    pub async fn send(&self, data: Vec<u8>, media_type: &str) -> EventResponse {
        let mut request = self.request_for(data, media_type);

        if self.compress {
            if let Some(encoder) = self.registry.resolve::<EventEncoder, EventEncoder>() {
                request = encoder
                    .build_load_data(EventEncoder::new(request))
                    .execute()
                    .await
                    .request;
            }
        }

        let Some(transport) = self.registry.resolve::<EventUrl, EventResponse>() else {
            warn!("no transport registered, events kept for later");
            return EventResponse::failed(None);
        };
        transport.build_load_data(request).execute().await
    }

    /// Send the envelope a storage query produced.
    pub async fn send_batch(&self, batch: &EventDbResult) -> EventResponse {
        let (Some(data), Some(media_type)) = (&batch.data, &batch.media_type) else {
            warn!(rows = batch.sum(), "batch has no envelope");
            return EventResponse::failed(None);
        };
        debug!(rows = batch.sum(), last_id = batch.last_id, "sending batch");
        self.send(data.clone(), media_type).await
    }

    /// Marshall `events` with the registered formatter and send them.
    pub async fn send_events(&self, events: &[Event]) -> EventResponse {
        let Some(formatter) = self.registry.resolve::<EventFormatData, EventByteArray>() else {
            warn!("no formatter registered");
            return EventResponse::failed(None);
        };

        let mut records = Vec::with_capacity(events.len());
        for event in events {
            let record = formatter
                .build_load_data(EventFormatData::serialize(event.clone()))
                .execute()
                .await;
            if record.count > 0 {
                records.push(record.data);
            }
        }
        if records.is_empty() {
            return EventResponse::failed(None);
        }

        let envelope = formatter
            .build_load_data(EventFormatData::merge(records))
            .execute()
            .await;
        self.send(envelope.data, &envelope.media_type).await
    }
}
