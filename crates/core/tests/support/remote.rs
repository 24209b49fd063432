//! In-memory remote store with switchable connectivity.

use std::collections::{BTreeMap, HashSet};
use std::time::Duration;

use async_trait::async_trait;
use parking_lot::Mutex;
use policydesk_core::sync::BackendPayload;
use policydesk_core::{RemoteError, RemoteStore};
use policydesk_domain::{QueueOperation, Record, Table};

/// One mutation the remote store accepted.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct RemoteCall {
    pub operation: QueueOperation,
    pub table: Table,
    pub id: String,
}

/// Behaves like the hosted backend: duplicate ids are rejected, missing rows
/// are not found, and every call fails while offline.
pub struct FlakyRemote {
    online: Mutex<bool>,
    failing_selects: Mutex<HashSet<Table>>,
    select_delay: Mutex<Option<Duration>>,
    tables: Mutex<BTreeMap<Table, BTreeMap<String, Record>>>,
    calls: Mutex<Vec<RemoteCall>>,
    selects: Mutex<usize>,
}

impl FlakyRemote {
    pub fn new() -> Self {
        Self {
            online: Mutex::new(true),
            failing_selects: Mutex::new(HashSet::new()),
            select_delay: Mutex::new(None),
            tables: Mutex::new(BTreeMap::new()),
            calls: Mutex::new(Vec::new()),
            selects: Mutex::new(0),
        }
    }

    pub fn set_online(&self, online: bool) {
        *self.online.lock() = online;
    }

    pub fn fail_select(&self, table: Table) {
        self.failing_selects.lock().insert(table);
    }

    pub fn set_select_delay(&self, delay: Duration) {
        *self.select_delay.lock() = Some(delay);
    }

    pub fn seed(&self, table: Table, rows: Vec<Record>) {
        let mut tables = self.tables.lock();
        let stored = tables.entry(table).or_default();
        for row in rows {
            let id = row.get("id").and_then(|v| v.as_str()).unwrap_or_default().to_string();
            stored.insert(id, row);
        }
    }

    pub fn rows(&self, table: Table) -> Vec<Record> {
        self.tables.lock().get(&table).map(|rows| rows.values().cloned().collect()).unwrap_or_default()
    }

    pub fn calls(&self) -> Vec<RemoteCall> {
        self.calls.lock().clone()
    }

    /// Number of `select_all` calls that started.
    pub fn selects(&self) -> usize {
        *self.selects.lock()
    }

    fn connected(&self) -> Result<(), RemoteError> {
        if *self.online.lock() {
            Ok(())
        } else {
            Err(RemoteError::Network("connection refused".into()))
        }
    }

    fn record_call(&self, operation: QueueOperation, table: Table, id: &str) {
        self.calls.lock().push(RemoteCall { operation, table, id: id.to_string() });
    }
}

#[async_trait]
impl RemoteStore for FlakyRemote {
    async fn insert(&self, table: Table, row: &Record) -> Result<Record, RemoteError> {
        self.connected()?;
        let id = row.get("id").and_then(|v| v.as_str()).unwrap_or_default().to_string();
        self.record_call(QueueOperation::Insert, table, &id);
        let mut tables = self.tables.lock();
        let rows = tables.entry(table).or_default();
        if rows.contains_key(&id) {
            return Err(RemoteError::Rejected {
                status: 409,
                payload: BackendPayload {
                    code: Some("23505".into()),
                    message: format!("duplicate key value violates unique constraint on {table}"),
                    ..BackendPayload::default()
                },
            });
        }
        rows.insert(id, row.clone());
        Ok(row.clone())
    }

    async fn update(&self, table: Table, id: &str, changes: &Record) -> Result<Record, RemoteError> {
        self.connected()?;
        self.record_call(QueueOperation::Update, table, id);
        let mut tables = self.tables.lock();
        let row = tables
            .get_mut(&table)
            .and_then(|rows| rows.get_mut(id))
            .ok_or_else(|| RemoteError::NotFound { table, id: id.to_string() })?;
        for (key, value) in changes {
            row.insert(key.clone(), value.clone());
        }
        Ok(row.clone())
    }

    async fn delete(&self, table: Table, id: &str) -> Result<(), RemoteError> {
        self.connected()?;
        self.record_call(QueueOperation::Delete, table, id);
        let removed = self.tables.lock().get_mut(&table).and_then(|rows| rows.remove(id));
        match removed {
            Some(_) => Ok(()),
            None => Err(RemoteError::NotFound { table, id: id.to_string() }),
        }
    }

    async fn select_all(&self, table: Table) -> Result<Vec<Record>, RemoteError> {
        self.connected()?;
        *self.selects.lock() += 1;
        let delay = *self.select_delay.lock();
        if let Some(delay) = delay {
            tokio::time::sleep(delay).await;
        }
        if self.failing_selects.lock().contains(&table) {
            return Err(RemoteError::Server {
                status: 503,
                payload: BackendPayload::message(format!("{table} unavailable")),
            });
        }
        Ok(self.rows(table))
    }

    async fn ping(&self) -> Result<(), RemoteError> {
        self.connected()
    }
}
