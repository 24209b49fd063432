//! Value types for local mutation hooks and the offline queue.

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use uuid::Uuid;

use super::entity::Record;
use super::table::Table;
use crate::impl_domain_enum_conversions;

/// Kind of a local mutation, used to register replication hooks.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum MutationKind {
    Creating,
    Updating,
    Deleting,
}

impl_domain_enum_conversions!(MutationKind {
    Creating => "creating",
    Updating => "updating",
    Deleting => "deleting",
});

impl MutationKind {
    pub const ALL: [Self; 3] = [Self::Creating, Self::Updating, Self::Deleting];
}

/// Remote operation carried by a queued mutation.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum QueueOperation {
    Insert,
    Update,
    Delete,
}

impl_domain_enum_conversions!(QueueOperation {
    Insert => "insert",
    Update => "update",
    Delete => "delete",
});

/// A remote mutation waiting for connectivity.
///
/// `payload` already uses remote field names: the full row for `insert`, only
/// the changed fields for `update`, and `{"id": ...}` for `delete`.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct QueuedMutation {
    pub entry_id: Uuid,
    /// Queue position, assigned on first append and preserved on re-append.
    /// Zero until the queue storage assigns it.
    pub seq: i64,
    pub table: Table,
    pub operation: QueueOperation,
    pub record_id: String,
    pub payload: Record,
    pub enqueued_at: DateTime<Utc>,
    pub attempts: u32,
    pub last_error: Option<String>,
    pub last_attempt_at: Option<DateTime<Utc>>,
}

impl QueuedMutation {
    pub fn new(
        table: Table,
        operation: QueueOperation,
        record_id: impl Into<String>,
        payload: Record,
    ) -> Self {
        Self {
            entry_id: Uuid::now_v7(),
            seq: 0,
            table,
            operation,
            record_id: record_id.into(),
            payload,
            enqueued_at: Utc::now(),
            attempts: 0,
            last_error: None,
            last_attempt_at: None,
        }
    }

    /// Age of the entry relative to `now`.
    pub fn age(&self, now: DateTime<Utc>) -> chrono::Duration {
        now - self.enqueued_at
    }

    /// Clear retry bookkeeping and restart the age clock at `now`.
    pub fn reset_attempts(&mut self, now: DateTime<Utc>) {
        self.attempts = 0;
        self.last_error = None;
        self.last_attempt_at = None;
        self.enqueued_at = now;
    }
}

/// A queued mutation that was evicted from the live queue.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct DeadLetter {
    pub entry: QueuedMutation,
    pub reason: String,
    pub dead_lettered_at: DateTime<Utc>,
}

/// State of the sync orchestrator.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum SyncState {
    Idle,
    Syncing,
}

impl_domain_enum_conversions!(SyncState {
    Idle => "idle",
    Syncing => "syncing",
});
