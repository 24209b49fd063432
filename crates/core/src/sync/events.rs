//! Structured sync event channel.
//!
//! Remote failures never reach the caller of a local mutation. They are
//! published here instead so supervisors and tests can observe them.

use std::sync::atomic::{AtomicU64, Ordering};
use std::sync::Arc;

use policydesk_domain::constants::SYNC_EVENT_CHANNEL_CAPACITY;
use policydesk_domain::{QueueOperation, Table};
use serde::Serialize;
use tokio::sync::broadcast;
use uuid::Uuid;

use super::queue::DrainSkipReason;

#[derive(Debug, Clone, PartialEq, Eq)]
pub enum SyncEvent {
    /// A hook reached the remote store directly.
    Replicated { table: Table, operation: QueueOperation, record_id: String },
    /// A hook could not reach the remote store and queued the mutation.
    ReplicationDeferred {
        table: Table,
        operation: QueueOperation,
        record_id: String,
        reason: String,
    },
    /// A mutation could not be replicated or queued.
    ReplicationLost {
        table: Table,
        operation: QueueOperation,
        record_id: String,
        error: String,
    },
    DrainSkipped { reason: DrainSkipReason },
    EntryReplayed { entry_id: Uuid, table: Table, operation: QueueOperation },
    EntryRequeued { entry_id: Uuid, table: Table, operation: QueueOperation, attempts: u32 },
    EntryDeadLettered { entry_id: Uuid, table: Table, operation: QueueOperation, reason: String },
    SyncStarted,
    SyncCompleted { rows_pulled: usize },
    SyncFailed { error: String },
    SyncSkipped,
}

#[derive(Debug, Default)]
struct Counters {
    replicated: AtomicU64,
    deferred: AtomicU64,
    lost: AtomicU64,
    replayed: AtomicU64,
    requeued: AtomicU64,
    dead_lettered: AtomicU64,
    syncs_completed: AtomicU64,
    syncs_failed: AtomicU64,
    syncs_skipped: AtomicU64,
}

/// Totals since startup.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize)]
pub struct SyncStats {
    pub replicated: u64,
    pub deferred: u64,
    pub lost: u64,
    pub replayed: u64,
    pub requeued: u64,
    pub dead_lettered: u64,
    pub syncs_completed: u64,
    pub syncs_failed: u64,
    pub syncs_skipped: u64,
}

/// Broadcast publisher plus running counters. Cheap to clone.
#[derive(Debug, Clone)]
pub struct SyncEvents {
    sender: broadcast::Sender<SyncEvent>,
    counters: Arc<Counters>,
}

impl Default for SyncEvents {
    fn default() -> Self {
        Self::new(SYNC_EVENT_CHANNEL_CAPACITY)
    }
}

impl SyncEvents {
    pub fn new(capacity: usize) -> Self {
        let (sender, _) = broadcast::channel(capacity.max(1));
        Self { sender, counters: Arc::new(Counters::default()) }
    }

    pub fn subscribe(&self) -> broadcast::Receiver<SyncEvent> {
        self.sender.subscribe()
    }

    /// Record and broadcast an event. Having no subscribers is fine.
    pub fn publish(&self, event: SyncEvent) {
        let counter = match &event {
            SyncEvent::Replicated { .. } => Some(&self.counters.replicated),
            SyncEvent::ReplicationDeferred { .. } => Some(&self.counters.deferred),
            SyncEvent::ReplicationLost { .. } => Some(&self.counters.lost),
            SyncEvent::EntryReplayed { .. } => Some(&self.counters.replayed),
            SyncEvent::EntryRequeued { .. } => Some(&self.counters.requeued),
            SyncEvent::EntryDeadLettered { .. } => Some(&self.counters.dead_lettered),
            SyncEvent::SyncCompleted { .. } => Some(&self.counters.syncs_completed),
            SyncEvent::SyncFailed { .. } => Some(&self.counters.syncs_failed),
            SyncEvent::SyncSkipped => Some(&self.counters.syncs_skipped),
            SyncEvent::DrainSkipped { .. } | SyncEvent::SyncStarted => None,
        };
        if let Some(counter) = counter {
            counter.fetch_add(1, Ordering::Relaxed);
        }
        let _ = self.sender.send(event);
    }

    pub fn stats(&self) -> SyncStats {
        let c = &self.counters;
        SyncStats {
            replicated: c.replicated.load(Ordering::Relaxed),
            deferred: c.deferred.load(Ordering::Relaxed),
            lost: c.lost.load(Ordering::Relaxed),
            replayed: c.replayed.load(Ordering::Relaxed),
            requeued: c.requeued.load(Ordering::Relaxed),
            dead_lettered: c.dead_lettered.load(Ordering::Relaxed),
            syncs_completed: c.syncs_completed.load(Ordering::Relaxed),
            syncs_failed: c.syncs_failed.load(Ordering::Relaxed),
            syncs_skipped: c.syncs_skipped.load(Ordering::Relaxed),
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[tokio::test]
    async fn subscribers_receive_published_events() {
        let events = SyncEvents::default();
        let mut rx = events.subscribe();

        events.publish(SyncEvent::SyncSkipped);

        assert_eq!(rx.recv().await.unwrap(), SyncEvent::SyncSkipped);
        assert_eq!(events.stats().syncs_skipped, 1);
    }

    #[test]
    fn publishing_without_subscribers_still_counts() {
        let events = SyncEvents::new(4);
        events.publish(SyncEvent::ReplicationDeferred {
            table: Table::Customers,
            operation: QueueOperation::Insert,
            record_id: "c1".into(),
            reason: "offline".into(),
        });
        events.publish(SyncEvent::SyncStarted);

        let stats = events.stats();
        assert_eq!(stats.deferred, 1);
        assert_eq!(stats, SyncStats { deferred: 1, ..SyncStats::default() });
    }
}
