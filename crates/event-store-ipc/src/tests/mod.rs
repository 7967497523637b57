//! Scenario tests for the store IPC surface.
//!
//! - `store_calls.rs` - `events.*` methods against a real store
//! - `errors.rs`      - bad params, missing storage, health
//! - `intake.rs`      - inserts handed to a sequencing intake

mod intake;

use crate::{register_store_handlers, IpcClient, IpcResult, IpcServer, StoreService};
use component_registry::ComponentRegistry;
use event_database::{DatabaseModule, EventDatabaseLoader, EventStore, RegistryFormatter};
use event_marshaller::JsonMarshallerModule;
use std::sync::Arc;
use std::time::Duration;
use tempfile::TempDir;
use tokio::task::JoinHandle;

/// A running server on a socket inside its own temp dir.
struct Served {
    _dir: TempDir,
    server: Arc<IpcServer>,
    task: JoinHandle<IpcResult<()>>,
    client: IpcClient,
}

impl Served {
    async fn start(registry: Arc<ComponentRegistry>) -> Self {
        Self::serve(StoreService::new(registry)).await
    }

    async fn serve(service: Arc<StoreService>) -> Self {
        let dir = tempfile::tempdir().unwrap();
        let socket = dir.path().join("run").join("events.sock");
        let server = Arc::new(IpcServer::new(&socket));
        register_store_handlers(&server, service).await;

        let runner = server.clone();
        let task = tokio::spawn(async move { runner.run().await });

        let client = IpcClient::new(&socket);
        for _ in 0..100 {
            if client.is_server_running().await {
                break;
            }
            tokio::time::sleep(Duration::from_millis(10)).await;
        }

        Self {
            _dir: dir,
            server,
            task,
            client,
        }
    }

    async fn stop(self) {
        self.server.shutdown();
        self.task.await.unwrap().unwrap();
    }
}

/// Registry with the JSON formatter and a storage stage over `store`.
fn registry_with_store(store: EventStore) -> Arc<ComponentRegistry> {
    let registry = Arc::new(ComponentRegistry::new());
    registry.install(&JsonMarshallerModule);
    let formatter = Arc::new(RegistryFormatter::new(&registry));
    registry.install(&DatabaseModule::new(EventDatabaseLoader::new(store, formatter)));
    registry
}
