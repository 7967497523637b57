//! Long-running pipeline with the store socket.

use anyhow::{bail, Context};
use async_trait::async_trait;
use event_model::{Event, EventDbResult};
use event_store_ipc::{register_store_handlers, EventIntake, IpcClient, IpcServer, StoreService};
use std::sync::Arc;
use tracker_config_and_utils::{Paths, TrackerConfig};
use tracker_core::Tracker;
use tracing::{error, info, warn};

/// Feeds `events.insert` into the tracker's scheduler.
pub struct TrackerIntake(pub Arc<Tracker>);

#[async_trait]
impl EventIntake for TrackerIntake {
    async fn ingest(&self, event: Event) -> Option<EventDbResult> {
        match self.0.track_stored(event).await {
            Ok(result) => Some(result),
            Err(e) => {
                warn!(error = %e, "IPC event not accepted");
                None
            }
        }
    }
}

/// Serve the tracker's store on `server`, inserts going through its scheduler.
pub async fn register_tracker_handlers(server: &IpcServer, tracker: &Arc<Tracker>) {
    let service = StoreService::with_intake(
        tracker.registry().clone(),
        Arc::new(TrackerIntake(tracker.clone())),
    );
    register_store_handlers(server, service).await;
}

/// Run the tracker until Ctrl-C or until the socket server stops.
pub async fn run_daemon(config: TrackerConfig, paths: Paths) -> anyhow::Result<()> {
    let socket_path = paths.socket_file();
    if socket_path.exists() {
        if IpcClient::new(&socket_path).is_server_running().await {
            bail!("trackerd is already running on {}", socket_path.display());
        }
        info!(path = %socket_path.display(), "Removing stale socket file");
        let _ = std::fs::remove_file(&socket_path);
    }

    let tracker = Arc::new(
        Tracker::start(config, paths)
            .await
            .context("failed to start tracker")?,
    );

    let server = Arc::new(IpcServer::new(&socket_path));
    register_tracker_handlers(&server, &tracker).await;

    let runner = server.clone();
    let mut server_task = tokio::spawn(async move { runner.run().await });

    tokio::select! {
        signal = tokio::signal::ctrl_c() => {
            if let Err(e) = signal {
                error!(error = %e, "Failed to listen for Ctrl-C");
            }
            info!("Interrupted, shutting down");
            server.shutdown();
            match (&mut server_task).await {
                Ok(Err(e)) => error!(error = %e, "IPC server error"),
                Err(e) => error!(error = %e, "IPC server task failed"),
                Ok(Ok(())) => {}
            }
        }
        result = &mut server_task => {
            match result {
                Ok(Ok(())) => info!("IPC server stopped"),
                Ok(Err(e)) => error!(error = %e, "IPC server error"),
                Err(e) => error!(error = %e, "IPC server task failed"),
            }
        }
    }

    tracker.shutdown().await?;
    info!("trackerd stopped");
    Ok(())
}
