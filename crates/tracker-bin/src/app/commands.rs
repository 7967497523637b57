//! One-shot commands.

use anyhow::{anyhow, Context};
use component_registry::ComponentRegistry;
use event_database::EventStore;
use event_model::{Event, EventDatabase, EventDbResult, SendPolicy};
use event_store_ipc::IpcClient;
use std::sync::Arc;
use tracker_config_and_utils::{Paths, TrackerConfig};
use tracker_core::{install_default_components, Tracker};

/// Parse a `key=value` attribute argument.
pub fn parse_attribute(raw: &str) -> Result<(String, String), String> {
    match raw.split_once('=') {
        Some((key, value)) if !key.trim().is_empty() => {
            Ok((key.trim().to_string(), value.to_string()))
        }
        _ => Err(format!("expected key=value, got `{raw}`")),
    }
}

pub fn build_event(
    event_type: &str,
    name: Option<String>,
    attributes: Vec<(String, String)>,
    instant: bool,
) -> Event {
    let policy = if instant {
        SendPolicy::Instant
    } else {
        SendPolicy::Batch
    };
    let mut event = Event::new(event_type.to_ascii_uppercase(), policy)
        .with_attributes(attributes.into_iter().collect());
    if let Some(name) = name {
        event = event.with_name(name);
    }
    event
}

fn client(paths: &Paths) -> IpcClient {
    IpcClient::new(paths.socket_file())
}

/// Record an event, through the daemon when one runs.
pub async fn track(config: TrackerConfig, paths: Paths, event: Event) -> anyhow::Result<()> {
    event.validate()?;

    let client = client(&paths);
    if client.is_server_running().await {
        let result = client.insert(&event).await?;
        if !result.is_success() {
            return Err(anyhow!("trackerd refused the event"));
        }
        println!("Stored event {} with trackerd", result.last_id);
        return Ok(());
    }

    let tracker = Tracker::start(config, paths).await?;
    tracker.track(event);
    let report = tracker.flush().await;
    tracker.shutdown().await?;
    let report = report?;
    println!(
        "Event recorded; sent {} rows in {} requests{}",
        report.rows,
        report.batches,
        if report.failed { " (delivery failed, rows kept)" } else { "" }
    );
    Ok(())
}

/// Send everything pending now.
pub async fn flush(config: TrackerConfig, paths: Paths) -> anyhow::Result<()> {
    if client(&paths).is_server_running().await {
        println!("trackerd is running and owns delivery; nothing flushed");
        return Ok(());
    }

    let tracker = Tracker::start(config, paths).await?;
    let report = tracker.flush().await;
    tracker.shutdown().await?;
    let report = report?;
    println!(
        "Sent {} rows in {} requests{}",
        report.rows,
        report.batches,
        if report.failed { "; stopped on a failed request" } else { "" }
    );
    Ok(())
}

pub async fn status(paths: &Paths) -> anyhow::Result<()> {
    let socket_path = paths.socket_file();
    if client(paths).is_server_running().await {
        println!("trackerd is running");
        println!("  Socket:   {}", socket_path.display());
    } else {
        println!("trackerd is not running");
    }

    let database = paths.database_file();
    if !database.exists() {
        println!("No event database at {}", database.display());
        return Ok(());
    }

    let store = EventStore::open(&database)
        .await
        .with_context(|| format!("failed to open {}", database.display()))?;
    let pending = store.pending_counts().await;
    println!("  Database: {}", database.display());
    if pending.is_empty() {
        println!("  No pending events");
    }
    for policy in SendPolicy::ALL {
        let rows: Vec<_> = pending.iter().filter(|p| p.policy == policy).collect();
        if rows.is_empty() {
            continue;
        }
        let total: usize = rows.iter().map(|p| p.count).sum();
        println!("  {:<8} {}", policy.as_str(), total);
        for row in rows {
            println!("    {:<10} {}", row.category.as_str(), row.count);
        }
    }
    store.close().await?;
    Ok(())
}

/// Delete every stored event.
pub async fn clear(paths: &Paths) -> anyhow::Result<()> {
    let client = client(paths);
    let result = if client.is_server_running().await {
        client.clear().await?
    } else {
        let store = EventStore::open(&paths.database_file()).await?;
        let result = store.remove_all_events().await;
        store.close().await?;
        result
    };

    if !result.is_success() {
        return Err(anyhow!("failed to clear the event store"));
    }
    println!("Removed {} events", result.sum());
    Ok(())
}

/// Migrate the legacy database next to the event store.
pub async fn migrate(config: TrackerConfig, paths: Paths) -> anyhow::Result<()> {
    let legacy_path = paths.legacy_database_file();
    if !legacy_path.exists() {
        println!("No legacy database at {}", legacy_path.display());
        return Ok(());
    }

    let store = EventStore::open(&paths.database_file()).await?;
    let registry = Arc::new(ComponentRegistry::new());
    install_default_components(&registry, &config, store.clone(), &legacy_path)?;

    let storage = registry
        .resolve::<EventDatabase, EventDbResult>()
        .ok_or_else(|| anyhow!("no storage stage registered"))?;
    let result = storage
        .build_load_data(EventDatabase::migrate_legacy())
        .execute()
        .await;
    drop(storage);
    drop(registry);
    store.close().await?;

    if !result.is_success() {
        return Err(anyhow!("legacy migration failed"));
    }
    println!("Migrated {} events", result.sum());
    if legacy_path.exists() {
        println!("Legacy database not drained yet; run migrate again");
    }
    Ok(())
}

pub fn show_config(config: &TrackerConfig, paths: &Paths) -> anyhow::Result<()> {
    println!("# {}", paths.config_file().display());
    println!("{}", serde_json::to_string_pretty(config)?);
    Ok(())
}

pub fn init_config(config: &TrackerConfig, paths: &Paths) -> anyhow::Result<()> {
    config.save(paths)?;
    println!("Wrote {}", paths.config_file().display());
    Ok(())
}
