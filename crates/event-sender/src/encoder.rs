//! Gzip body encoding: the `(EventEncoder, EventEncoder)` stage.

use async_trait::async_trait;
use component_registry::{
    ComponentModule, ComponentRegistry, DataFetcher, FnLoaderFactory, LoadData, ModelLoader,
};
use event_model::EventEncoder;
use flate2::write::GzEncoder;
use flate2::Compression;
use std::io::Write;
use std::sync::Arc;
use tracing::{debug, warn};

/// Header naming the body codec.
pub const COMPRESS_CODEC_HEADER: &str = "X-Compress-Codec";
pub const GZIP_CODEC: &str = "gzip";

/// Gzip-compress `data`.
pub fn gzip(data: &[u8]) -> std::io::Result<Vec<u8>> {
    let mut encoder = GzEncoder::new(Vec::with_capacity(data.len() / 2), Compression::default());
    encoder.write_all(data)?;
    encoder.finish()
}

/// Compresses request bodies and tags them with the codec header.
#[derive(Debug, Default, Clone, Copy)]
pub struct GzipEncoder;

impl GzipEncoder {
    /// The request with a gzip body, or unchanged if compression fails.
    pub fn encode(&self, mut encoder: EventEncoder) -> EventEncoder {
        if encoder.request.body.is_empty() {
            return encoder;
        }
        let request = &mut encoder.request;
        match gzip(&request.body) {
            Ok(compressed) => {
                debug!(
                    raw = request.body.len(),
                    compressed = compressed.len(),
                    "body compressed"
                );
                request.body = compressed;
                request.add_header(COMPRESS_CODEC_HEADER, GZIP_CODEC);
            }
            Err(e) => warn!(error = %e, "gzip failed, sending uncompressed"),
        }
        encoder
    }
}

impl ModelLoader<EventEncoder, EventEncoder> for GzipEncoder {
    fn build_load_data(&self, model: EventEncoder) -> LoadData<EventEncoder> {
        LoadData::new(GzipFetcher { model: Some(model) })
    }
}

struct GzipFetcher {
    model: Option<EventEncoder>,
}

#[async_trait]
impl DataFetcher<EventEncoder> for GzipFetcher {
    async fn execute_data(&mut self) -> EventEncoder {
        let model = self
            .model
            .take()
            .unwrap_or_else(|| EventEncoder::new(event_model::EventUrl::new("", "", 0)));
        GzipEncoder.encode(model)
    }
}

/// Installs the gzip encoder.
#[derive(Debug, Default)]
pub struct GzipEncoderModule;

impl ComponentModule for GzipEncoderModule {
    fn register_components(&self, registry: &ComponentRegistry) {
        let loader: Arc<dyn ModelLoader<EventEncoder, EventEncoder>> = Arc::new(GzipEncoder);
        registry.register::<EventEncoder, EventEncoder, _>(FnLoaderFactory::new(loader));
    }
}
