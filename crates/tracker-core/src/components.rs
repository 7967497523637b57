//! Default component modules for a configured tracker.

use crate::TrackerResult;
use component_registry::ComponentRegistry;
use event_database::{DatabaseModule, EventDatabaseLoader, EventStore, RegistryFormatter};
use event_marshaller::{BinaryMarshallerModule, JsonMarshallerModule};
use event_sender::{GzipEncoderModule, HttpTransportModule, TransportConfig};
use std::path::Path;
use std::sync::Arc;
use tracker_config_and_utils::{MarshallerKind, TrackerConfig};
use tracing::debug;

/// Transport settings taken from the tracker configuration.
pub fn transport_config(config: &TrackerConfig) -> TransportConfig {
    TransportConfig {
        connect_timeout: config.connect_timeout(),
        read_timeout: config.read_timeout(),
        max_retries: config.max_retries,
        retry_delay: std::time::Duration::from_millis(config.retry_delay_ms),
        ..TransportConfig::default()
    }
}

/// Register formatting, storage, transport and encoding stages.
///
/// The storage stage is bound to `store` and migrates from
/// `legacy_path` when asked to.
pub fn install_default_components(
    registry: &Arc<ComponentRegistry>,
    config: &TrackerConfig,
    store: EventStore,
    legacy_path: &Path,
) -> TrackerResult<()> {
    match config.marshaller {
        MarshallerKind::Json => registry.install(&JsonMarshallerModule),
        MarshallerKind::Binary => registry.install(&BinaryMarshallerModule),
    }

    let formatter = Arc::new(RegistryFormatter::new(registry));
    let loader = EventDatabaseLoader::new(store, formatter).with_legacy_path(legacy_path);
    registry.install(&DatabaseModule::new(loader));

    registry.install(&HttpTransportModule::new(transport_config(config))?);
    registry.install(&GzipEncoderModule);

    debug!(components = ?registry.registered(), "default components installed");
    Ok(())
}

#[cfg(test)]
mod tests {
    use super::*;
    use event_model::{
        EventByteArray, EventDatabase, EventDbResult, EventEncoder, EventFormatData,
        EventResponse, EventUrl,
    };

    #[tokio::test]
    async fn test_all_stages_registered() {
        let dir = tempfile::tempdir().unwrap();
        let store = EventStore::open_in_memory().await.unwrap();
        let registry = Arc::new(ComponentRegistry::new());
        let config = TrackerConfig::default();

        install_default_components(&registry, &config, store, &dir.path().join("growing3.db"))
            .unwrap();

        assert!(registry.contains::<EventFormatData, EventByteArray>());
        assert!(registry.contains::<EventDatabase, EventDbResult>());
        assert!(registry.contains::<EventUrl, EventResponse>());
        assert!(registry.contains::<EventEncoder, EventEncoder>());
    }

    #[test]
    fn test_transport_config_from_tracker_config() {
        let config = TrackerConfig {
            connect_timeout_secs: 1,
            read_timeout_secs: 2,
            max_retries: 0,
            retry_delay_ms: 50,
            ..TrackerConfig::default()
        };
        let transport = transport_config(&config);
        assert_eq!(transport.connect_timeout.as_secs(), 1);
        assert_eq!(transport.read_timeout.as_secs(), 2);
        assert_eq!(transport.max_retries, 0);
        assert_eq!(transport.retry_delay.as_millis(), 50);
    }
}
