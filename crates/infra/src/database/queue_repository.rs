//! SQLite-backed implementation of the offline queue storage port.

use std::sync::Arc;

use async_trait::async_trait;
use chrono::{DateTime, TimeZone, Utc};
use policydesk_common::storage::SqliteConnection;
use policydesk_core::QueueStorage;
use policydesk_domain::{DeadLetter, PolicyDeskError, QueuedMutation, Record, Result, Table};
use rusqlite::{params, Connection, OptionalExtension, Row, ToSql};
use tokio::task;
use tracing::debug;
use uuid::Uuid;

use super::manager::{map_join_error, map_sql_error, DbManager};

/// Durable offline queue over the shared SQLite pool.
pub struct SqliteQueueStorage {
    db: Arc<DbManager>,
}

impl SqliteQueueStorage {
    pub fn new(db: Arc<DbManager>) -> Self {
        Self { db }
    }

    async fn with_connection<T, F>(&self, op: F) -> Result<T>
    where
        T: Send + 'static,
        F: FnOnce(&mut SqliteConnection) -> Result<T> + Send + 'static,
    {
        let db = Arc::clone(&self.db);
        task::spawn_blocking(move || -> Result<T> {
            let mut conn = db.get_connection()?;
            op(&mut conn)
        })
        .await
        .map_err(map_join_error)?
    }
}

#[async_trait]
impl QueueStorage for SqliteQueueStorage {
    async fn append(&self, mut entry: QueuedMutation) -> Result<QueuedMutation> {
        let row = EntryRow::from_entry(&entry)?;
        self.with_connection(move |conn| {
            conn.execute(QUEUE_APPEND_SQL, row.params_without_seq().as_slice()).map_err(map_sql_error)?;
            entry.seq = conn.last_insert_rowid();
            debug!(seq = entry.seq, table = %entry.table, "queue entry appended");
            Ok(entry)
        })
        .await
    }

    async fn take_all(&self) -> Result<Vec<QueuedMutation>> {
        self.with_connection(|conn| {
            let tx = conn.transaction().map_err(map_sql_error)?;
            let entries = {
                let mut stmt =
                    tx.prepare(&format!("{QUEUE_SELECT_SQL} ORDER BY seq")).map_err(map_sql_error)?;
                let rows = stmt.query_map([], EntryRow::read).map_err(map_sql_error)?;
                collect_entries(rows)?
            };
            tx.execute("DELETE FROM sync_queue", []).map_err(map_sql_error)?;
            tx.commit().map_err(map_sql_error)?;
            Ok(entries)
        })
        .await
    }

    async fn restore(&self, entry: QueuedMutation) -> Result<()> {
        let row = EntryRow::from_entry(&entry)?;
        let seq = entry.seq;
        self.with_connection(move |conn| {
            conn.execute(QUEUE_RESTORE_SQL, row.params_with_seq(&seq).as_slice()).map_err(map_sql_error)?;
            Ok(())
        })
        .await
    }

    async fn len(&self) -> Result<usize> {
        self.with_connection(|conn| count(conn, "SELECT COUNT(*) FROM sync_queue", None)).await
    }

    async fn pending_for_table(&self, table: Table) -> Result<usize> {
        self.with_connection(move |conn| {
            count(conn, "SELECT COUNT(*) FROM sync_queue WHERE table_name = ?1", Some(table.as_str()))
        })
        .await
    }

    async fn list(&self) -> Result<Vec<QueuedMutation>> {
        self.with_connection(|conn| {
            let mut stmt =
                conn.prepare(&format!("{QUEUE_SELECT_SQL} ORDER BY seq")).map_err(map_sql_error)?;
            let rows = stmt.query_map([], EntryRow::read).map_err(map_sql_error)?;
            collect_entries(rows)
        })
        .await
    }

    async fn dead_letter(&self, letter: DeadLetter) -> Result<()> {
        let row = EntryRow::from_entry(&letter.entry)?;
        let seq = letter.entry.seq;
        let reason = letter.reason;
        let dead_lettered_at = letter.dead_lettered_at.timestamp_millis();
        self.with_connection(move |conn| {
            conn.execute(
                DEAD_LETTER_INSERT_SQL,
                params![
                    row.entry_id,
                    seq,
                    row.table_name,
                    row.operation,
                    row.record_id,
                    row.payload,
                    row.enqueued_at,
                    row.attempts,
                    row.last_error,
                    row.last_attempt_at,
                    reason,
                    dead_lettered_at,
                ],
            )
            .map_err(map_sql_error)?;
            Ok(())
        })
        .await
    }

    async fn dead_letters(&self) -> Result<Vec<DeadLetter>> {
        self.with_connection(|conn| {
            let mut stmt = conn
                .prepare(&format!("{DEAD_LETTER_SELECT_SQL} ORDER BY dead_lettered_at, seq"))
                .map_err(map_sql_error)?;
            let rows = stmt.query_map([], read_dead_letter).map_err(map_sql_error)?;
            let mut letters = Vec::new();
            for row in rows {
                let (entry, reason, at) = row.map_err(map_sql_error)?;
                letters.push(DeadLetter {
                    entry: entry.into_entry()?,
                    reason,
                    dead_lettered_at: from_millis(at)?,
                });
            }
            Ok(letters)
        })
        .await
    }

    async fn requeue_dead_letter(
        &self,
        entry_id: Uuid,
        requeued_at: DateTime<Utc>,
    ) -> Result<Option<QueuedMutation>> {
        self.with_connection(move |conn| {
            let tx = conn.transaction().map_err(map_sql_error)?;
            let found = tx
                .query_row(
                    &format!("{DEAD_LETTER_SELECT_SQL} WHERE entry_id = ?1"),
                    params![entry_id.to_string()],
                    read_dead_letter,
                )
                .optional()
                .map_err(map_sql_error)?;
            let Some((row, _reason, _at)) = found else {
                return Ok(None);
            };

            let mut entry = row.into_entry()?;
            entry.reset_attempts(requeued_at);
            let live = EntryRow::from_entry(&entry)?;
            tx.execute("DELETE FROM sync_dead_letters WHERE entry_id = ?1", params![live.entry_id])
                .map_err(map_sql_error)?;
            tx.execute(QUEUE_APPEND_SQL, live.params_without_seq().as_slice())
                .map_err(map_sql_error)?;
            entry.seq = tx.last_insert_rowid();
            tx.commit().map_err(map_sql_error)?;
            debug!(seq = entry.seq, %entry_id, "dead letter moved back to queue");
            Ok(Some(entry))
        })
        .await
    }
}

/// Column values of one queue entry as stored.
struct EntryRow {
    seq: i64,
    entry_id: String,
    table_name: String,
    operation: String,
    record_id: String,
    payload: String,
    enqueued_at: i64,
    attempts: i64,
    last_error: Option<String>,
    last_attempt_at: Option<i64>,
}

impl EntryRow {
    fn from_entry(entry: &QueuedMutation) -> Result<Self> {
        Ok(Self {
            seq: entry.seq,
            entry_id: entry.entry_id.to_string(),
            table_name: entry.table.as_str().to_string(),
            operation: entry.operation.as_str().to_string(),
            record_id: entry.record_id.clone(),
            payload: serde_json::to_string(&entry.payload)?,
            enqueued_at: entry.enqueued_at.timestamp_millis(),
            attempts: i64::from(entry.attempts),
            last_error: entry.last_error.clone(),
            last_attempt_at: entry.last_attempt_at.map(|at| at.timestamp_millis()),
        })
    }

    fn params_without_seq(&self) -> [&dyn ToSql; 9] {
        [
            &self.entry_id,
            &self.table_name,
            &self.operation,
            &self.record_id,
            &self.payload,
            &self.enqueued_at,
            &self.attempts,
            &self.last_error,
            &self.last_attempt_at,
        ]
    }

    fn params_with_seq<'a>(&'a self, seq: &'a i64) -> [&'a dyn ToSql; 10] {
        [
            seq,
            &self.entry_id,
            &self.table_name,
            &self.operation,
            &self.record_id,
            &self.payload,
            &self.enqueued_at,
            &self.attempts,
            &self.last_error,
            &self.last_attempt_at,
        ]
    }

    fn read(row: &Row<'_>) -> rusqlite::Result<Self> {
        Ok(Self {
            seq: row.get(0)?,
            entry_id: row.get(1)?,
            table_name: row.get(2)?,
            operation: row.get(3)?,
            record_id: row.get(4)?,
            payload: row.get(5)?,
            enqueued_at: row.get(6)?,
            attempts: row.get(7)?,
            last_error: row.get(8)?,
            last_attempt_at: row.get(9)?,
        })
    }

    fn into_entry(self) -> Result<QueuedMutation> {
        let entry_id = Uuid::parse_str(&self.entry_id)
            .map_err(|err| PolicyDeskError::Database(format!("invalid queue entry id: {err}")))?;
        let table = self.table_name.parse::<Table>().map_err(corrupt)?;
        let operation = self.operation.parse().map_err(corrupt)?;
        let payload: Record = serde_json::from_str(&self.payload)
            .map_err(|err| PolicyDeskError::Database(format!("invalid queue payload: {err}")))?;

        Ok(QueuedMutation {
            entry_id,
            seq: self.seq,
            table,
            operation,
            record_id: self.record_id,
            payload,
            enqueued_at: from_millis(self.enqueued_at)?,
            attempts: u32::try_from(self.attempts).unwrap_or(u32::MAX),
            last_error: self.last_error,
            last_attempt_at: self.last_attempt_at.map(from_millis).transpose()?,
        })
    }
}

fn read_dead_letter(row: &Row<'_>) -> rusqlite::Result<(EntryRow, String, i64)> {
    Ok((EntryRow::read(row)?, row.get(10)?, row.get(11)?))
}

fn collect_entries(
    rows: impl Iterator<Item = rusqlite::Result<EntryRow>>,
) -> Result<Vec<QueuedMutation>> {
    rows.map(|row| row.map_err(map_sql_error)?.into_entry()).collect()
}

fn count(conn: &Connection, sql: &str, table: Option<&str>) -> Result<usize> {
    let count: i64 = match table {
        Some(table) => conn.query_row(sql, params![table], |row| row.get(0)),
        None => conn.query_row(sql, [], |row| row.get(0)),
    }
    .map_err(map_sql_error)?;
    Ok(usize::try_from(count).unwrap_or_default())
}

fn from_millis(millis: i64) -> Result<DateTime<Utc>> {
    Utc.timestamp_millis_opt(millis)
        .single()
        .ok_or_else(|| PolicyDeskError::Database(format!("invalid timestamp {millis}")))
}

fn corrupt(err: impl std::fmt::Display) -> PolicyDeskError {
    PolicyDeskError::Database(format!("corrupt queue row: {err}"))
}

const QUEUE_APPEND_SQL: &str = "INSERT INTO sync_queue (
        entry_id, table_name, operation, record_id, payload, enqueued_at, attempts,
        last_error, last_attempt_at
    ) VALUES (?1, ?2, ?3, ?4, ?5, ?6, ?7, ?8, ?9)";

const QUEUE_RESTORE_SQL: &str = "INSERT INTO sync_queue (
        seq, entry_id, table_name, operation, record_id, payload, enqueued_at, attempts,
        last_error, last_attempt_at
    ) VALUES (?1, ?2, ?3, ?4, ?5, ?6, ?7, ?8, ?9, ?10)";

const QUEUE_SELECT_SQL: &str = "SELECT
        seq, entry_id, table_name, operation, record_id, payload, enqueued_at, attempts,
        last_error, last_attempt_at
    FROM sync_queue";

const DEAD_LETTER_INSERT_SQL: &str = "INSERT OR REPLACE INTO sync_dead_letters (
        entry_id, seq, table_name, operation, record_id, payload, enqueued_at, attempts,
        last_error, last_attempt_at, reason, dead_lettered_at
    ) VALUES (?1, ?2, ?3, ?4, ?5, ?6, ?7, ?8, ?9, ?10, ?11, ?12)";

const DEAD_LETTER_SELECT_SQL: &str = "SELECT
        seq, entry_id, table_name, operation, record_id, payload, enqueued_at, attempts,
        last_error, last_attempt_at, reason, dead_lettered_at
    FROM sync_dead_letters";
