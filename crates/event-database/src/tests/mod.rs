//! Scenario tests for the event store.
//!
//! - `batches.rs`   - insert/query/delete semantics through the store
//! - `registry.rs`  - the storage stage resolved from the component registry
//! - `migration.rs` - legacy `growing3.db` migration


use crate::{DatabaseModule, EventDatabaseLoader, EventStore, RegistryFormatter};
use component_registry::ComponentRegistry;
use event_marshaller::JsonMarshallerModule;
use event_model::{EventDatabase, EventDbResult};
use std::path::PathBuf;
use std::sync::Arc;

/// Registry with the JSON formatter and a storage stage over `store`.
fn registry_for(store: EventStore, legacy_path: Option<PathBuf>) -> Arc<ComponentRegistry> {
    let registry = Arc::new(ComponentRegistry::new());
    registry.install(&JsonMarshallerModule);

    let formatter = Arc::new(RegistryFormatter::new(&registry));
    let mut loader = EventDatabaseLoader::new(store, formatter);
    if let Some(path) = legacy_path {
        loader = loader.with_legacy_path(path);
    }
    registry.install(&DatabaseModule::new(loader));
    registry
}

async fn run(registry: &ComponentRegistry, model: EventDatabase) -> EventDbResult {
    let loader = registry
        .resolve::<EventDatabase, EventDbResult>()
        .expect("storage stage registered");
    loader.build_load_data(model).execute().await
}
