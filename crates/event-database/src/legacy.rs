//! The deprecated `growing3.db` event store.
//!
//! Legacy rows hold a JSON-encoded event in `_data`. They are moved into
//! the current `events` table by [`crate::EventStore::migrate_legacy_events`]
//! through an attached database. A transaction spanning a WAL main database
//! and an attached file is only atomic per file, so the main database also
//! records the highest legacy id copied (`legacy_progress`) next to the
//! copied rows. Reads skip everything at or below it; a legacy delete lost
//! in a crash never leads to a second copy.

use crate::{DatabaseError, DatabaseResult};
use event_model::{Event, SendPolicy};
use rusqlite::{params, Connection, OptionalExtension};
use std::path::Path;
use tracing::{debug, warn};

/// Rows moved per transaction.
pub const LEGACY_CHUNK_SIZE: usize = 100;

const LEGACY_SCHEMA: &str = "
    CREATE TABLE IF NOT EXISTS events (
        _id INTEGER PRIMARY KEY AUTOINCREMENT,
        _data BLOB NOT NULL,
        _event_type TEXT NOT NULL,
        _policy INTEGER NOT NULL,
        _created INTEGER NOT NULL
    );
";

/// A row read from the legacy table.
#[derive(Debug, Clone)]
pub struct LegacyRow {
    pub id: i64,
    pub data: Vec<u8>,
    pub policy: i64,
    pub created_ms: i64,
}

impl LegacyRow {
    /// Decode the stored event; the `_policy` column wins over the payload.
    pub fn decode(&self) -> Option<Event> {
        let mut event: Event = match serde_json::from_slice(&self.data) {
            Ok(event) => event,
            Err(e) => {
                warn!(legacy_id = self.id, error = %e, "undecodable legacy row skipped");
                return None;
            }
        };
        if let Ok(policy) = SendPolicy::from_code(self.policy) {
            event.send_policy = policy;
        }
        Some(event)
    }
}

/// A migrated row ready for the current table.
#[derive(Debug, Clone)]
pub struct MigratedRow {
    pub category: String,
    pub policy: i64,
    pub payload: Vec<u8>,
    pub inserted_at_ms: i64,
}

/// Direct access to a legacy database file.
///
/// Only used to seed or inspect legacy files; the pipeline never writes
/// to the legacy store.
pub struct LegacyEventStore {
    conn: Connection,
}

impl LegacyEventStore {
    /// Open or create a legacy database.
    pub fn open(path: &Path) -> DatabaseResult<Self> {
        let conn = Connection::open(path)?;
        conn.execute_batch(LEGACY_SCHEMA)?;
        Ok(Self { conn })
    }

    pub fn insert(&self, event: &Event, created_ms: i64) -> DatabaseResult<i64> {
        let data = serde_json::to_vec(event)?;
        self.conn.execute(
            "INSERT INTO events (_data, _event_type, _policy, _created) VALUES (?1, ?2, ?3, ?4)",
            params![data, event.event_type, event.send_policy.code(), created_ms],
        )?;
        Ok(self.conn.last_insert_rowid())
    }

    /// Insert a raw payload, bypassing JSON encoding.
    pub fn insert_raw(
        &self,
        data: &[u8],
        event_type: &str,
        policy: SendPolicy,
        created_ms: i64,
    ) -> DatabaseResult<i64> {
        self.conn.execute(
            "INSERT INTO events (_data, _event_type, _policy, _created) VALUES (?1, ?2, ?3, ?4)",
            params![data, event_type, policy.code(), created_ms],
        )?;
        Ok(self.conn.last_insert_rowid())
    }

    pub fn count(&self) -> DatabaseResult<usize> {
        let count: i64 = self
            .conn
            .query_row("SELECT COUNT(*) FROM events", [], |row| row.get(0))?;
        Ok(count as usize)
    }
}

fn attach(conn: &Connection, legacy_path: &str) -> DatabaseResult<()> {
    conn.execute("ATTACH DATABASE ?1 AS legacy", params![legacy_path])
        .map_err(|e| DatabaseError::Migration(format!("attach {legacy_path}: {e}")))?;
    Ok(())
}

fn detach(conn: &Connection) {
    if let Err(e) = conn.execute("DETACH DATABASE legacy", []) {
        warn!(error = %e, "failed to detach legacy database");
    }
}

/// Highest legacy id already copied into `events`, `0` before any.
pub fn progress(conn: &Connection) -> DatabaseResult<i64> {
    let last_id = conn
        .query_row(
            "SELECT last_id FROM main.legacy_progress WHERE id = 1",
            [],
            |row| row.get::<_, i64>(0),
        )
        .optional()?;
    Ok(last_id.unwrap_or(0))
}

/// Forget the checkpoint once the legacy file is gone, so a later legacy
/// file is read from its first row.
pub fn reset_progress(conn: &Connection) -> DatabaseResult<()> {
    conn.execute("DELETE FROM main.legacy_progress", [])?;
    Ok(())
}

/// Read the next chunk of legacy rows not yet copied, in id order.
pub fn read_chunk(
    conn: &Connection,
    legacy_path: &str,
    limit: usize,
) -> DatabaseResult<Vec<LegacyRow>> {
    let after = progress(conn)?;
    attach(conn, legacy_path)?;
    let rows = select_chunk(conn, after, limit);
    detach(conn);
    rows
}

fn select_chunk(conn: &Connection, after: i64, limit: usize) -> DatabaseResult<Vec<LegacyRow>> {
    let mut stmt = conn.prepare(
        "SELECT _id, _data, _policy, _created FROM legacy.events
         WHERE _id > ?1 ORDER BY _id ASC LIMIT ?2",
    )?;
    let rows = stmt
        .query_map(params![after, limit as i64], |row| {
            Ok(LegacyRow {
                id: row.get(0)?,
                data: row.get(1)?,
                policy: row.get(2)?,
                created_ms: row.get(3)?,
            })
        })?
        .collect::<Result<Vec<_>, _>>()?;
    Ok(rows)
}

/// Insert `rows` into `events`, advance the checkpoint to `last_legacy_id`
/// and delete legacy rows up to it.
///
/// The insert and the checkpoint commit together in the main database.
pub fn move_chunk(
    conn: &mut Connection,
    legacy_path: &str,
    rows: &[MigratedRow],
    last_legacy_id: i64,
) -> DatabaseResult<usize> {
    attach(conn, legacy_path)?;
    let moved = move_chunk_attached(conn, rows, last_legacy_id);
    detach(conn);
    moved
}

fn move_chunk_attached(
    conn: &mut Connection,
    rows: &[MigratedRow],
    last_legacy_id: i64,
) -> DatabaseResult<usize> {
    let tx = conn.transaction()?;
    {
        let mut insert = tx.prepare_cached(
            "INSERT INTO main.events (event_type, send_policy, payload, inserted_at)
             VALUES (?1, ?2, ?3, ?4)",
        )?;
        for row in rows {
            insert.execute(params![row.category, row.policy, row.payload, row.inserted_at_ms])?;
        }
    }
    tx.execute(
        "INSERT INTO main.legacy_progress (id, last_id) VALUES (1, ?1)
         ON CONFLICT(id) DO UPDATE SET last_id = MAX(last_id, excluded.last_id)",
        params![last_legacy_id],
    )?;
    let removed = tx.execute(
        "DELETE FROM legacy.events WHERE _id <= ?1",
        params![last_legacy_id],
    )?;
    tx.commit()?;
    debug!(inserted = rows.len(), removed, "legacy chunk moved");
    Ok(rows.len())
}

/// Remove a drained legacy database along with its sidecar files.
pub fn remove_legacy_files(path: &Path) -> DatabaseResult<()> {
    std::fs::remove_file(path)?;
    for suffix in ["-journal", "-wal", "-shm"] {
        let mut sidecar = path.as_os_str().to_owned();
        sidecar.push(suffix);
        let _ = std::fs::remove_file(sidecar);
    }
    Ok(())
}

#[cfg(test)]
mod tests {
    use super::*;
    use tempfile::tempdir;

    #[test]
    fn test_legacy_store_roundtrip() {
        let dir = tempdir().unwrap();
        let store = LegacyEventStore::open(&dir.path().join("growing3.db")).unwrap();

        let event = Event::custom("purchase").with_attribute("sku", "42");
        store.insert(&event, 1_000).unwrap();
        assert_eq!(store.count().unwrap(), 1);

        let conn = Connection::open_in_memory().unwrap();
        crate::migrations::run_migrations(&conn).unwrap();
        let path = dir.path().join("growing3.db");
        let rows = read_chunk(&conn, &path.to_string_lossy(), 10).unwrap();
        assert_eq!(rows.len(), 1);
        assert_eq!(rows[0].created_ms, 1_000);
        assert_eq!(rows[0].decode().unwrap(), event);
    }

    fn migrated(row: &LegacyRow) -> MigratedRow {
        MigratedRow {
            category: "TRACK".to_string(),
            policy: row.policy,
            payload: row.data.clone(),
            inserted_at_ms: row.created_ms,
        }
    }

    #[test]
    fn test_lost_legacy_delete_is_not_copied_again() {
        let dir = tempdir().unwrap();
        let legacy_path = dir.path().join("growing3.db");
        let legacy = legacy_path.to_string_lossy().to_string();
        {
            let store = LegacyEventStore::open(&legacy_path).unwrap();
            for name in ["a", "b", "c"] {
                store.insert(&Event::custom(name), 1).unwrap();
            }
        }

        let mut conn = Connection::open(dir.path().join("events.db")).unwrap();
        conn.execute_batch("PRAGMA journal_mode = WAL;").unwrap();
        crate::migrations::run_migrations(&conn).unwrap();

        let first = read_chunk(&conn, &legacy, 2).unwrap();
        let rows: Vec<_> = first.iter().map(migrated).collect();
        assert_eq!(move_chunk(&mut conn, &legacy, &rows, 2).unwrap(), 2);
        assert_eq!(progress(&conn).unwrap(), 2);

        // the legacy side of the chunk did not stick
        let restore = Connection::open(&legacy_path).unwrap();
        for row in &first {
            restore
                .execute(
                    "INSERT INTO events (_id, _data, _event_type, _policy, _created)
                     VALUES (?1, ?2, 'CUSTOM', ?3, ?4)",
                    params![row.id, row.data, row.policy, row.created_ms],
                )
                .unwrap();
        }
        drop(restore);

        let next = read_chunk(&conn, &legacy, 10).unwrap();
        let ids: Vec<i64> = next.iter().map(|row| row.id).collect();
        assert_eq!(ids, [3]);

        let copied: i64 = conn
            .query_row("SELECT COUNT(*) FROM events", [], |row| row.get(0))
            .unwrap();
        assert_eq!(copied, 2);

        reset_progress(&conn).unwrap();
        assert_eq!(progress(&conn).unwrap(), 0);
    }

    #[test]
    fn test_decode_prefers_policy_column() {
        let event = Event::custom("x");
        let row = LegacyRow {
            id: 1,
            data: serde_json::to_vec(&event).unwrap(),
            policy: SendPolicy::Instant.code(),
            created_ms: 0,
        };
        assert_eq!(row.decode().unwrap().send_policy, SendPolicy::Instant);
    }

    #[test]
    fn test_decode_garbage() {
        let row = LegacyRow {
            id: 1,
            data: b"not json".to_vec(),
            policy: 2,
            created_ms: 0,
        };
        assert!(row.decode().is_none());
    }
}
