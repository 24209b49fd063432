//! Port interfaces for sync operations

use async_trait::async_trait;
use chrono::{DateTime, Utc};
use policydesk_domain::{DeadLetter, QueuedMutation, Record, Result, Table};
use uuid::Uuid;

use super::errors::RemoteError;

/// Row-oriented remote backend.
///
/// Records use remote field names. Every call is a single round trip with no
/// internal retry.
#[async_trait]
pub trait RemoteStore: Send + Sync {
    /// Insert a row and return it as stored.
    async fn insert(&self, table: Table, row: &Record) -> std::result::Result<Record, RemoteError>;

    /// Update the given columns of row `id` and return it as stored.
    async fn update(
        &self,
        table: Table,
        id: &str,
        changes: &Record,
    ) -> std::result::Result<Record, RemoteError>;

    /// Delete row `id`. A missing row is `RemoteError::NotFound`.
    async fn delete(&self, table: Table, id: &str) -> std::result::Result<(), RemoteError>;

    /// Every row of a table.
    async fn select_all(&self, table: Table) -> std::result::Result<Vec<Record>, RemoteError>;

    /// Lightweight connectivity probe; not a business operation.
    async fn ping(&self) -> std::result::Result<(), RemoteError>;
}

/// Durable storage behind the offline queue.
#[async_trait]
pub trait QueueStorage: Send + Sync {
    /// Append at the tail and assign the next `seq`.
    async fn append(&self, entry: QueuedMutation) -> Result<QueuedMutation>;

    /// Remove and return every live entry in `seq` order, atomically.
    async fn take_all(&self) -> Result<Vec<QueuedMutation>>;

    /// Put an entry back, keeping its original `seq`.
    async fn restore(&self, entry: QueuedMutation) -> Result<()>;

    async fn len(&self) -> Result<usize>;

    /// Number of live entries targeting `table`.
    async fn pending_for_table(&self, table: Table) -> Result<usize>;

    /// Live entries in `seq` order, without removing them.
    async fn list(&self) -> Result<Vec<QueuedMutation>>;

    async fn dead_letter(&self, letter: DeadLetter) -> Result<()>;

    async fn dead_letters(&self) -> Result<Vec<DeadLetter>>;

    /// Move a dead letter to the tail of the live queue with its attempts
    /// reset, as one atomic step. `None` when no such dead letter exists; on
    /// error the dead letter stays where it was.
    async fn requeue_dead_letter(
        &self,
        entry_id: Uuid,
        requeued_at: DateTime<Utc>,
    ) -> Result<Option<QueuedMutation>>;
}
