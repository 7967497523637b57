//! The durable event store.
//!
//! All SQL runs on one dedicated SQLite thread owned by `tokio_rusqlite`;
//! callers park on a channel instead of blocking the runtime. Formatting
//! and file I/O stay outside [`EventStore::call`].
//!
//! Public operations never return errors. A storage fault is logged and
//! reported as a failed [`EventDbResult`] with `sum == 0`, so a corrupted
//! or full database cannot take the host process down.

use crate::legacy::{self, MigratedRow, LEGACY_CHUNK_SIZE};
use crate::queries::{self, PendingCount, EVENT_DATA_MAX_SIZE};
use crate::{migrations, DatabaseError, DatabaseResult, PayloadFormatter};
use event_model::{now_millis, EventCategory, EventDbResult, SendPolicy};
use std::path::Path;
use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::Arc;
use std::time::{Duration, Instant};
use tokio_rusqlite::Connection;
use tracing::{debug, error, info, warn};

/// Retention applied when none is configured.
pub const DEFAULT_VALIDITY_PERIOD_DAYS: u32 = 7;

/// Wall-clock budget of one legacy migration run.
pub const LEGACY_MIGRATION_BUDGET: Duration = Duration::from_secs(20);

const MILLIS_PER_DAY: i64 = 24 * 60 * 60 * 1000;

fn from_tokio_rusqlite(e: tokio_rusqlite::Error) -> DatabaseError {
    match e {
        tokio_rusqlite::Error::Rusqlite(e) => DatabaseError::Sqlite(e),
        tokio_rusqlite::Error::Close(_) => DatabaseError::Connection("Connection closed".to_string()),
        other => DatabaseError::Connection(other.to_string()),
    }
}

/// Cutoff for the overdue sweep: rows inserted at or before it are dropped.
pub fn overdue_cutoff(now_ms: i64, validity_period_days: u32) -> i64 {
    now_ms - i64::from(validity_period_days) * MILLIS_PER_DAY
}

/// SQLite-backed store of events awaiting delivery.
#[derive(Clone)]
pub struct EventStore {
    conn: Connection,
    path: String,
    ignore_operations: Arc<AtomicBool>,
    validity_period_days: u32,
}

impl EventStore {
    /// Open (or create) the store at `path` and run pending migrations.
    pub async fn open(path: &Path) -> DatabaseResult<Self> {
        if let Some(parent) = path.parent() {
            std::fs::create_dir_all(parent)?;
        }
        let path_str = path.to_string_lossy().to_string();
        info!(path = %path_str, "Opening event store");

        let conn = Connection::open(path)
            .await
            .map_err(|e| DatabaseError::Connection(e.to_string()))?;
        let store = Self::init(conn, path_str).await?;

        info!(path = %store.path, "Event store initialized with WAL mode");
        Ok(store)
    }

    /// Open an in-memory store.
    pub async fn open_in_memory() -> DatabaseResult<Self> {
        let conn = Connection::open_in_memory()
            .await
            .map_err(|e| DatabaseError::Connection(e.to_string()))?;
        Self::init(conn, ":memory:".to_string()).await
    }

    async fn init(conn: Connection, path: String) -> DatabaseResult<Self> {
        conn.call(|conn| {
            conn.execute_batch(
                "
                PRAGMA journal_mode = WAL;
                PRAGMA synchronous = NORMAL;
                PRAGMA temp_store = MEMORY;
                PRAGMA busy_timeout = 5000;
                ",
            )?;
            Ok(())
        })
        .await
        .map_err(from_tokio_rusqlite)?;

        let store = Self {
            conn,
            path,
            ignore_operations: Arc::new(AtomicBool::new(false)),
            validity_period_days: DEFAULT_VALIDITY_PERIOD_DAYS,
        };
        store.call(migrations::run_migrations).await?;
        Ok(store)
    }

    /// Retention window used by [`EventStore::remove_overdue_events`].
    pub fn with_validity_period_days(mut self, days: u32) -> Self {
        self.validity_period_days = days;
        self
    }

    pub fn validity_period_days(&self) -> u32 {
        self.validity_period_days
    }

    pub fn path(&self) -> &str {
        &self.path
    }

    /// Whether a full disk has switched the store off.
    pub fn is_ignoring_operations(&self) -> bool {
        self.ignore_operations.load(Ordering::Acquire)
    }

    /// Run SQL on the executor thread.
    ///
    /// Only SQL and row mapping belong inside `f`.
    pub async fn call<F, T>(&self, f: F) -> DatabaseResult<T>
    where
        F: FnOnce(&rusqlite::Connection) -> DatabaseResult<T> + Send + 'static,
        T: Send + 'static,
    {
        self.call_mut(move |conn| f(conn)).await
    }

    /// Like [`EventStore::call`], for closures that open a transaction.
    pub async fn call_mut<F, T>(&self, f: F) -> DatabaseResult<T>
    where
        F: FnOnce(&mut rusqlite::Connection) -> DatabaseResult<T> + Send + 'static,
        T: Send + 'static,
    {
        match self.conn.call(move |conn| Ok(f(conn))).await {
            Ok(inner) => inner,
            Err(e) => Err(from_tokio_rusqlite(e)),
        }
    }

    fn fault(&self, operation: &'static str, err: &DatabaseError) {
        if err.is_disk_full() {
            if !self.ignore_operations.swap(true, Ordering::AcqRel) {
                error!(operation, error = %err, "disk full, event store ignoring further operations");
            }
        } else {
            error!(operation, error = %err, "event store operation failed");
        }
    }

    fn ignoring(&self, operation: &'static str) -> bool {
        let ignoring = self.is_ignoring_operations();
        if ignoring {
            debug!(operation, "event store ignoring operation");
        }
        ignoring
    }

    /// Append one serialized event. `last_id` of the result is the new row id.
    pub async fn insert(
        &self,
        category: EventCategory,
        policy: SendPolicy,
        payload: Vec<u8>,
    ) -> EventDbResult {
        if self.ignoring("insert") {
            return EventDbResult::failed();
        }
        if payload.len() > EVENT_DATA_MAX_SIZE {
            warn!(
                size = payload.len(),
                max = EVENT_DATA_MAX_SIZE,
                "event too large, not stored"
            );
            return EventDbResult::failed();
        }

        let inserted_at = now_millis();
        match self
            .call(move |conn| queries::insert_event(conn, category, policy, &payload, inserted_at))
            .await
        {
            Ok(row_id) => EventDbResult {
                last_id: row_id,
                category: Some(category),
                ..EventDbResult::succeeded(1)
            },
            Err(e) => {
                self.fault("insert", &e);
                EventDbResult::failed()
            }
        }
    }

    /// Up to `limit` pending rows for `policy`; nothing is deleted.
    pub async fn query(&self, policy: SendPolicy, limit: usize) -> EventDbResult {
        if self.ignoring("query") {
            return EventDbResult::failed();
        }
        match self
            .call(move |conn| queries::query_batch(conn, policy, limit))
            .await
        {
            Ok(rows) => EventDbResult::with_rows(rows),
            Err(e) => {
                self.fault("query", &e);
                EventDbResult::failed()
            }
        }
    }

    /// Read and delete the same rows in one transaction.
    pub async fn query_and_delete(&self, policy: SendPolicy, limit: usize) -> EventDbResult {
        if self.ignoring("query_and_delete") {
            return EventDbResult::failed();
        }
        match self
            .call_mut(move |conn| queries::query_and_delete_batch(conn, policy, limit))
            .await
        {
            Ok(rows) => EventDbResult::with_rows(rows),
            Err(e) => {
                self.fault("query_and_delete", &e);
                EventDbResult::failed()
            }
        }
    }

    /// Delete rows with `id <= last_id` of `policy` and `category`.
    pub async fn delete(
        &self,
        last_id: i64,
        policy: SendPolicy,
        category: EventCategory,
    ) -> EventDbResult {
        if self.ignoring("delete") {
            return EventDbResult::failed();
        }
        match self
            .call(move |conn| queries::delete_through(conn, last_id, policy, category))
            .await
        {
            Ok(deleted) => {
                debug!(last_id, policy = %policy, category = %category, deleted, "rows deleted");
                EventDbResult {
                    last_id,
                    category: Some(category),
                    ..EventDbResult::succeeded(deleted)
                }
            }
            Err(e) => {
                self.fault("delete", &e);
                EventDbResult::failed()
            }
        }
    }

    /// Drop rows older than the retention window.
    pub async fn remove_overdue_events(&self) -> EventDbResult {
        if self.ignoring("remove_overdue") {
            return EventDbResult::failed();
        }
        let cutoff = overdue_cutoff(now_millis(), self.validity_period_days);
        match self
            .call(move |conn| queries::delete_inserted_before(conn, cutoff))
            .await
        {
            Ok(deleted) => {
                if deleted > 0 {
                    info!(deleted, days = self.validity_period_days, "overdue events removed");
                }
                EventDbResult::succeeded(deleted)
            }
            Err(e) => {
                self.fault("remove_overdue", &e);
                EventDbResult::failed()
            }
        }
    }

    /// Delete everything.
    pub async fn remove_all_events(&self) -> EventDbResult {
        if self.ignoring("clear") {
            return EventDbResult::failed();
        }
        match self.call(queries::delete_all).await {
            Ok(deleted) => {
                info!(deleted, "all events removed");
                EventDbResult::succeeded(deleted)
            }
            Err(e) => {
                self.fault("clear", &e);
                EventDbResult::failed()
            }
        }
    }

    /// Pending rows, optionally for one policy. `0` on failure.
    pub async fn count(&self, policy: Option<SendPolicy>) -> usize {
        match self
            .call(move |conn| queries::count_events(conn, policy))
            .await
        {
            Ok(count) => count,
            Err(e) => {
                self.fault("count", &e);
                0
            }
        }
    }

    /// Pending rows grouped by policy and category.
    pub async fn pending_counts(&self) -> Vec<PendingCount> {
        match self.call(queries::pending_counts).await {
            Ok(counts) => counts,
            Err(e) => {
                self.fault("pending_counts", &e);
                Vec::new()
            }
        }
    }

    /// Move every row of a legacy database into this store.
    ///
    /// Safe to call repeatedly: a missing legacy file migrates nothing.
    /// Each chunk's rows are written together with a checkpoint of the
    /// highest legacy id copied, and later reads start above it, so a row
    /// is never copied twice even if its legacy delete was lost. Rows that
    /// cannot be decoded or formatted are dropped with their chunk. The
    /// legacy file is removed once drained and the checkpoint cleared.
    /// `sum` is the number of rows written to this store.
    pub async fn migrate_legacy_events(
        &self,
        legacy_path: &Path,
        formatter: &dyn PayloadFormatter,
    ) -> EventDbResult {
        if !legacy_path.exists() {
            debug!(path = %legacy_path.display(), "no legacy database");
            if !self.is_ignoring_operations() {
                self.clear_legacy_progress().await;
            }
            return EventDbResult::succeeded(0);
        }
        if self.ignoring("migrate_legacy") {
            return EventDbResult::failed();
        }

        let legacy = legacy_path.to_string_lossy().to_string();
        let started = Instant::now();
        let mut migrated = 0usize;
        info!(path = %legacy, "migrating legacy events");

        loop {
            if started.elapsed() > LEGACY_MIGRATION_BUDGET {
                warn!(migrated, "legacy migration out of time, resuming next start");
                return EventDbResult::succeeded(migrated);
            }

            let path = legacy.clone();
            let chunk = match self
                .call(move |conn| legacy::read_chunk(conn, &path, LEGACY_CHUNK_SIZE))
                .await
            {
                Ok(chunk) => chunk,
                Err(e) => {
                    error!(error = %e, migrated, "legacy migration abandoned");
                    return EventDbResult::failed();
                }
            };
            let Some(last_legacy_id) = chunk.last().map(|row| row.id) else {
                break;
            };
            let drained = chunk.len() < LEGACY_CHUNK_SIZE;

            let mut rows = Vec::with_capacity(chunk.len());
            for legacy_row in &chunk {
                let Some(event) = legacy_row.decode() else {
                    continue;
                };
                let category = event.category();
                let policy = event.send_policy;
                match formatter.serialize(event).await {
                    Some(payload) if payload.len() <= EVENT_DATA_MAX_SIZE => rows.push(MigratedRow {
                        category: category.as_str().to_string(),
                        policy: policy.code(),
                        payload,
                        inserted_at_ms: legacy_row.created_ms,
                    }),
                    _ => warn!(legacy_id = legacy_row.id, "legacy event could not be formatted"),
                }
            }

            let path = legacy.clone();
            match self
                .call_mut(move |conn| legacy::move_chunk(conn, &path, &rows, last_legacy_id))
                .await
            {
                Ok(moved) => migrated += moved,
                Err(e) => {
                    self.fault("migrate_legacy", &e);
                    return EventDbResult::failed();
                }
            }

            if drained {
                break;
            }
        }

        match legacy::remove_legacy_files(legacy_path) {
            Ok(()) => self.clear_legacy_progress().await,
            Err(e) => warn!(error = %e, "failed to remove drained legacy database"),
        }
        info!(migrated, "legacy migration complete");
        EventDbResult::succeeded(migrated)
    }

    async fn clear_legacy_progress(&self) {
        if let Err(e) = self.call(legacy::reset_progress).await {
            warn!(error = %e, "failed to clear legacy checkpoint");
        }
    }

    /// Check the executor with a trivial query.
    pub async fn health_check(&self) -> DatabaseResult<()> {
        self.call(|conn| {
            conn.execute_batch("SELECT 1")?;
            Ok(())
        })
        .await
    }

    /// Close the connection and stop the executor thread.
    pub async fn close(self) -> DatabaseResult<()> {
        self.conn.close().await.map_err(from_tokio_rusqlite)
    }
}
