//! Standalone query functions over a `Connection`.
//!
//! Everything here runs on the store's executor thread; keep it to SQL and
//! row mapping.

use crate::{DatabaseError, DatabaseResult};
use event_model::{EventCategory, SendPolicy, StoredEventRow};
use rusqlite::{params, Connection, OptionalExtension};
use tracing::{debug, warn};

/// Largest payload a single row may hold, and the cap on one batch's
/// cumulative payload size.
pub const EVENT_DATA_MAX_SIZE: usize = 2 * 1000 * 1024;

/// Pending rows per policy and category.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct PendingCount {
    pub policy: SendPolicy,
    pub category: EventCategory,
    pub count: usize,
}

/// Append one row and return its id.
pub fn insert_event(
    conn: &Connection,
    category: EventCategory,
    policy: SendPolicy,
    payload: &[u8],
    inserted_at_ms: i64,
) -> DatabaseResult<i64> {
    conn.prepare_cached(
        "INSERT INTO events (event_type, send_policy, payload, inserted_at) VALUES (?1, ?2, ?3, ?4)",
    )?
    .execute(params![category.as_str(), policy.code(), payload, inserted_at_ms])?;
    Ok(conn.last_insert_rowid())
}

/// Select the next batch for `policy`.
///
/// The batch is made of rows sharing the category of the oldest pending
/// row, in id order, at most `limit` of them, and stops before the total
/// payload size would exceed [`EVENT_DATA_MAX_SIZE`]. Rows whose payload
/// alone exceeds the cap can never be delivered and are deleted here.
pub fn query_batch(
    conn: &Connection,
    policy: SendPolicy,
    limit: usize,
) -> DatabaseResult<Vec<StoredEventRow>> {
    if limit == 0 {
        return Ok(Vec::new());
    }

    let category: Option<String> = conn
        .prepare_cached(
            "SELECT event_type FROM events WHERE send_policy = ?1 ORDER BY id ASC LIMIT 1",
        )?
        .query_row(params![policy.code()], |row| row.get(0))
        .optional()?;
    let Some(category) = category else {
        return Ok(Vec::new());
    };

    let mut stmt = conn.prepare_cached(
        "SELECT id, event_type, send_policy, payload, inserted_at FROM events
         WHERE send_policy = ?1 AND event_type = ?2
         ORDER BY id ASC LIMIT ?3",
    )?;
    let candidates = stmt
        .query_map(params![policy.code(), category, limit as i64], |row| {
            Ok((
                row.get::<_, i64>(0)?,
                row.get::<_, String>(1)?,
                row.get::<_, i64>(2)?,
                row.get::<_, Vec<u8>>(3)?,
                row.get::<_, i64>(4)?,
            ))
        })?
        .collect::<Result<Vec<_>, _>>()?;

    let mut rows = Vec::with_capacity(candidates.len());
    let mut oversized = Vec::new();
    let mut total = 0usize;

    for (row_id, category, policy_code, payload, inserted_at_ms) in candidates {
        if payload.len() > EVENT_DATA_MAX_SIZE {
            oversized.push(row_id);
            continue;
        }
        if total + payload.len() > EVENT_DATA_MAX_SIZE {
            break;
        }
        total += payload.len();
        rows.push(StoredEventRow {
            row_id,
            category: category.parse::<EventCategory>().map_err(|e| {
                DatabaseError::InvalidData(format!("row {row_id}: {e}"))
            })?,
            send_policy: SendPolicy::from_code(policy_code)
                .map_err(|e| DatabaseError::InvalidData(format!("row {row_id}: {e}")))?,
            payload,
            inserted_at_ms,
        });
    }

    if !oversized.is_empty() {
        let mut delete = conn.prepare_cached("DELETE FROM events WHERE id = ?1")?;
        for row_id in &oversized {
            delete.execute(params![row_id])?;
        }
        warn!(count = oversized.len(), "deleted oversized event rows");
    }

    debug!(
        policy = %policy,
        category = %category,
        rows = rows.len(),
        bytes = total,
        "batch selected"
    );
    Ok(rows)
}

/// Select the next batch and delete exactly those rows, in one transaction.
pub fn query_and_delete_batch(
    conn: &mut Connection,
    policy: SendPolicy,
    limit: usize,
) -> DatabaseResult<Vec<StoredEventRow>> {
    let tx = conn.transaction()?;
    let rows = query_batch(&tx, policy, limit)?;
    {
        let mut delete = tx.prepare_cached("DELETE FROM events WHERE id = ?1")?;
        for row in &rows {
            delete.execute(params![row.row_id])?;
        }
    }
    tx.commit()?;
    Ok(rows)
}

/// Delete rows with `id <= last_id` of one policy and category.
pub fn delete_through(
    conn: &Connection,
    last_id: i64,
    policy: SendPolicy,
    category: EventCategory,
) -> DatabaseResult<usize> {
    let deleted = conn
        .prepare_cached(
            "DELETE FROM events WHERE id <= ?1 AND send_policy = ?2 AND event_type = ?3",
        )?
        .execute(params![last_id, policy.code(), category.as_str()])?;
    Ok(deleted)
}

/// Delete rows inserted at or before `cutoff_ms`.
pub fn delete_inserted_before(conn: &Connection, cutoff_ms: i64) -> DatabaseResult<usize> {
    let deleted = conn
        .prepare_cached("DELETE FROM events WHERE inserted_at <= ?1")?
        .execute(params![cutoff_ms])?;
    Ok(deleted)
}

/// Delete every row.
pub fn delete_all(conn: &Connection) -> DatabaseResult<usize> {
    Ok(conn.execute("DELETE FROM events", [])?)
}

/// Number of pending rows, optionally for one policy.
pub fn count_events(conn: &Connection, policy: Option<SendPolicy>) -> DatabaseResult<usize> {
    let count: i64 = match policy {
        Some(policy) => conn.query_row(
            "SELECT COUNT(*) FROM events WHERE send_policy = ?1",
            params![policy.code()],
            |row| row.get(0),
        )?,
        None => conn.query_row("SELECT COUNT(*) FROM events", [], |row| row.get(0))?,
    };
    Ok(count as usize)
}

/// Pending rows grouped by policy and category.
pub fn pending_counts(conn: &Connection) -> DatabaseResult<Vec<PendingCount>> {
    let mut stmt = conn.prepare(
        "SELECT send_policy, event_type, COUNT(*) FROM events
         GROUP BY send_policy, event_type ORDER BY send_policy, event_type",
    )?;
    let raw = stmt
        .query_map([], |row| {
            Ok((
                row.get::<_, i64>(0)?,
                row.get::<_, String>(1)?,
                row.get::<_, i64>(2)?,
            ))
        })?
        .collect::<Result<Vec<_>, _>>()?;

    raw.into_iter()
        .map(|(policy, category, count)| {
            Ok(PendingCount {
                policy: SendPolicy::from_code(policy)
                    .map_err(|e| DatabaseError::InvalidData(e.to_string()))?,
                category: category
                    .parse()
                    .map_err(|e: event_model::ModelError| DatabaseError::InvalidData(e.to_string()))?,
                count: count as usize,
            })
        })
        .collect()
}
