//! SQLite-backed implementation of the [`RecordStore`] port.
//!
//! Each entity table stores the full record as JSON plus generated columns for
//! the indexed fields (see `schema.sql`). Lookups by secondary field go
//! through those columns; everything else reads the JSON.

use std::sync::Arc;

use async_trait::async_trait;
use chrono::Utc;
use policydesk_common::storage::SqliteConnection;
use policydesk_core::store::validation::validate_index_field;
use policydesk_core::{RecordStore, TableSnapshot};
use policydesk_domain::mapping::remote_field;
use policydesk_domain::{record_id, PolicyDeskError, Record, Result, Table};
use rusqlite::types::Value as SqlValue;
use rusqlite::{params, Connection, OptionalExtension};
use serde_json::Value;
use tokio::task;
use tracing::debug;

use super::manager::{map_join_error, map_sql_error, DbManager};

/// Record store over the shared SQLite pool.
pub struct SqliteRecordStore {
    db: Arc<DbManager>,
}

impl SqliteRecordStore {
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
impl RecordStore for SqliteRecordStore {
    async fn insert(&self, table: Table, record: Record) -> Result<()> {
        let id = record_id(&record)?.to_string();
        let json = serde_json::to_string(&record)?;
        self.with_connection(move |conn| insert_row(conn, table, &id, &json)).await
    }

    async fn update(&self, table: Table, id: &str, changes: Record) -> Result<Record> {
        let id = id.to_string();
        self.with_connection(move |conn| {
            let tx = conn.transaction().map_err(map_sql_error)?;
            let mut record = load_record(&tx, table, &id)?
                .ok_or_else(|| PolicyDeskError::NotFound(format!("{table}/{id}")))?;
            record.extend(changes);
            let json = serde_json::to_string(&record)?;
            tx.execute(
                &format!("UPDATE {table} SET record = ?1, updated_at = ?2 WHERE id = ?3"),
                params![json, now_millis(), id],
            )
            .map_err(map_sql_error)?;
            tx.commit().map_err(map_sql_error)?;
            Ok(record)
        })
        .await
    }

    async fn delete(&self, table: Table, id: &str) -> Result<bool> {
        let id = id.to_string();
        self.with_connection(move |conn| {
            let removed = conn
                .execute(&format!("DELETE FROM {table} WHERE id = ?1"), params![id])
                .map_err(map_sql_error)?;
            Ok(removed > 0)
        })
        .await
    }

    async fn get(&self, table: Table, id: &str) -> Result<Option<Record>> {
        let id = id.to_string();
        self.with_connection(move |conn| load_record(conn, table, &id)).await
    }

    async fn all(&self, table: Table) -> Result<Vec<Record>> {
        self.with_connection(move |conn| {
            query_records(conn, &format!("SELECT record FROM {table} ORDER BY id"), &[])
        })
        .await
    }

    async fn find_by(&self, table: Table, field: &str, value: &Value) -> Result<Vec<Record>> {
        validate_index_field(table, field)?;
        let column = remote_field(table, field).ok_or_else(|| {
            PolicyDeskError::InvalidInput(format!("{table}.{field} has no column"))
        })?;

        let (sql, bound) = match to_sql_value(value)? {
            None => (format!("SELECT record FROM {table} WHERE \"{column}\" IS NULL ORDER BY id"), None),
            Some(bound) => {
                (format!("SELECT record FROM {table} WHERE \"{column}\" = ?1 ORDER BY id"), Some(bound))
            }
        };

        self.with_connection(move |conn| match bound {
            Some(bound) => query_records(conn, &sql, &[bound]),
            None => query_records(conn, &sql, &[]),
        })
        .await
    }

    async fn count(&self, table: Table) -> Result<usize> {
        self.with_connection(move |conn| {
            let count: i64 = conn
                .query_row(&format!("SELECT COUNT(*) FROM {table}"), [], |row| row.get(0))
                .map_err(map_sql_error)?;
            Ok(usize::try_from(count).unwrap_or_default())
        })
        .await
    }

    async fn replace_all(&self, snapshot: TableSnapshot) -> Result<()> {
        // Serialise everything up front so a bad row never opens a transaction.
        let mut prepared = Vec::with_capacity(snapshot.len());
        for (table, records) in snapshot {
            let rows = records
                .iter()
                .map(|record| Ok((record_id(record)?.to_string(), serde_json::to_string(record)?)))
                .collect::<Result<Vec<_>>>()?;
            prepared.push((table, rows));
        }

        self.with_connection(move |conn| {
            let tx = conn.transaction().map_err(map_sql_error)?;
            for (table, rows) in &prepared {
                tx.execute(&format!("DELETE FROM {table}"), []).map_err(map_sql_error)?;
                for (id, json) in rows {
                    insert_row(&tx, *table, id, json)?;
                }
                debug!(table = %table, rows = rows.len(), "table replaced");
            }
            tx.commit().map_err(map_sql_error)
        })
        .await
    }
}

fn insert_row(conn: &Connection, table: Table, id: &str, json: &str) -> Result<()> {
    conn.execute(
        &format!("INSERT INTO {table} (id, record, updated_at) VALUES (?1, ?2, ?3)"),
        params![id, json, now_millis()],
    )
    .map_err(|err| match map_sql_error(err) {
        PolicyDeskError::Conflict(_) => PolicyDeskError::Conflict(format!("{table}/{id} already exists")),
        other => other,
    })?;
    Ok(())
}

fn load_record(conn: &Connection, table: Table, id: &str) -> Result<Option<Record>> {
    let json: Option<String> = conn
        .query_row(&format!("SELECT record FROM {table} WHERE id = ?1"), params![id], |row| {
            row.get(0)
        })
        .optional()
        .map_err(map_sql_error)?;
    json.map(|json| parse_record(&json)).transpose()
}

fn query_records(conn: &Connection, sql: &str, bound: &[SqlValue]) -> Result<Vec<Record>> {
    let mut stmt = conn.prepare(sql).map_err(map_sql_error)?;
    let rows = stmt
        .query_map(rusqlite::params_from_iter(bound.iter()), |row| row.get::<_, String>(0))
        .map_err(map_sql_error)?;

    let mut records = Vec::new();
    for json in rows {
        records.push(parse_record(&json.map_err(map_sql_error)?)?);
    }
    Ok(records)
}

fn parse_record(json: &str) -> Result<Record> {
    match serde_json::from_str::<Value>(json) {
        Ok(Value::Object(record)) => Ok(record),
        Ok(_) => Err(PolicyDeskError::Database("stored record is not a JSON object".into())),
        Err(err) => Err(PolicyDeskError::Database(format!("stored record is not valid JSON: {err}"))),
    }
}

/// Bind a JSON scalar the way `json_extract` exposes it to SQL.
/// `None` means the lookup is for JSON null.
fn to_sql_value(value: &Value) -> Result<Option<SqlValue>> {
    match value {
        Value::Null => Ok(None),
        Value::Bool(flag) => Ok(Some(SqlValue::Integer(i64::from(*flag)))),
        Value::String(text) => Ok(Some(SqlValue::Text(text.clone()))),
        Value::Number(number) => number
            .as_i64()
            .map(SqlValue::Integer)
            .or_else(|| number.as_f64().map(SqlValue::Real))
            .map(Some)
            .ok_or_else(|| PolicyDeskError::InvalidInput(format!("unsupported number {number}"))),
        Value::Array(_) | Value::Object(_) => Err(PolicyDeskError::InvalidInput(
            "indexed lookups only accept scalar values".into(),
        )),
    }
}

fn now_millis() -> i64 {
    Utc::now().timestamp_millis()
}
