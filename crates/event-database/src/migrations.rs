//! Database migrations.
//!
//! Migrations are run in order and tracked in the `migrations` table.

use crate::DatabaseResult;
use rusqlite::Connection;
use tracing::{debug, info};

/// Current schema version.
pub const CURRENT_VERSION: i32 = 3;

/// Run all pending migrations.
pub fn run_migrations(conn: &Connection) -> DatabaseResult<()> {
    conn.execute(
        "CREATE TABLE IF NOT EXISTS migrations (
            version INTEGER PRIMARY KEY,
            name TEXT NOT NULL,
            applied_at TEXT NOT NULL DEFAULT (datetime('now'))
        )",
        [],
    )?;

    let current_version: i32 = conn
        .query_row(
            "SELECT COALESCE(MAX(version), 0) FROM migrations",
            [],
            |row| row.get(0),
        )
        .unwrap_or(0);

    if current_version >= CURRENT_VERSION {
        debug!(current_version, "Schema up to date");
        return Ok(());
    }

    info!(current_version, target_version = CURRENT_VERSION, "Running migrations");

    if current_version < 1 {
        migrate_v1_events_table(conn)?;
    }
    if current_version < 2 {
        migrate_v2_retention_index(conn)?;
    }
    if current_version < 3 {
        migrate_v3_legacy_progress(conn)?;
    }

    info!("Migrations complete");
    Ok(())
}

fn record_migration(conn: &Connection, version: i32, name: &str) -> DatabaseResult<()> {
    conn.execute(
        "INSERT INTO migrations (version, name) VALUES (?1, ?2)",
        rusqlite::params![version, name],
    )?;
    debug!(version, name, "Migration applied");
    Ok(())
}

/// V1: pending events.
///
/// `event_type` holds the storage category, `inserted_at` epoch millis.
fn migrate_v1_events_table(conn: &Connection) -> DatabaseResult<()> {
    conn.execute_batch(
        "
        CREATE TABLE IF NOT EXISTS events (
            id INTEGER PRIMARY KEY AUTOINCREMENT,
            event_type TEXT NOT NULL,
            send_policy INTEGER NOT NULL,
            payload BLOB NOT NULL,
            inserted_at INTEGER NOT NULL
        );

        CREATE INDEX IF NOT EXISTS idx_events_policy_type
            ON events(send_policy, event_type, id);
        ",
    )?;
    record_migration(conn, 1, "events_table")
}

/// V2: index for the overdue sweep.
fn migrate_v2_retention_index(conn: &Connection) -> DatabaseResult<()> {
    conn.execute_batch(
        "CREATE INDEX IF NOT EXISTS idx_events_inserted_at ON events(inserted_at);",
    )?;
    record_migration(conn, 2, "retention_index")
}

/// V3: highest legacy `_id` already copied into `events`.
///
/// Written in the same transaction as the copied rows, so it survives
/// even when the legacy file's delete does not.
fn migrate_v3_legacy_progress(conn: &Connection) -> DatabaseResult<()> {
    conn.execute_batch(
        "
        CREATE TABLE IF NOT EXISTS legacy_progress (
            id INTEGER PRIMARY KEY CHECK (id = 1),
            last_id INTEGER NOT NULL
        );
        ",
    )?;
    record_migration(conn, 3, "legacy_progress")
}
