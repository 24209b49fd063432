//! Port interface for local record storage

use std::collections::BTreeMap;

use async_trait::async_trait;
use policydesk_domain::{Record, Result, Table};
use serde_json::Value;

/// Full contents for a set of tables, used by pull-refresh.
pub type TableSnapshot = BTreeMap<Table, Vec<Record>>;

/// Durable, indexed record storage keyed by `(table, id)`.
///
/// Records use local field names. Implementations never fire hooks; that is
/// the job of [`super::LocalStore`].
#[async_trait]
pub trait RecordStore: Send + Sync {
    /// Insert a new record. Fails with `Conflict` when the id exists.
    async fn insert(&self, table: Table, record: Record) -> Result<()>;

    /// Merge `changes` into an existing record and return the merged record.
    /// Fails with `NotFound` when the id does not exist.
    async fn update(&self, table: Table, id: &str, changes: Record) -> Result<Record>;

    /// Delete by id; returns whether a record existed.
    async fn delete(&self, table: Table, id: &str) -> Result<bool>;

    async fn get(&self, table: Table, id: &str) -> Result<Option<Record>>;

    /// Every record of a table, ordered by id.
    async fn all(&self, table: Table) -> Result<Vec<Record>>;

    /// Records whose indexed `field` equals `value`, ordered by id.
    async fn find_by(&self, table: Table, field: &str, value: &Value) -> Result<Vec<Record>>;

    async fn count(&self, table: Table) -> Result<usize>;

    /// Clear every table in `snapshot` and insert its rows, atomically.
    ///
    /// Either all listed tables end up with exactly the snapshot rows or
    /// nothing changes.
    async fn replace_all(&self, snapshot: TableSnapshot) -> Result<()>;
}
