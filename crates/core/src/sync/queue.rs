//! Offline queue of remote mutations awaiting connectivity.
//!
//! Entries are replayed in `seq` order. Once an entry for a table fails during
//! a drain, later entries for that table are held back unattempted so an
//! `update` can never overtake its `insert`. Entries that keep failing are
//! moved to the dead-letter store once they exceed the attempt or age limit.

use std::collections::{HashMap, HashSet};
use std::sync::Arc;
use std::time::Duration;

use chrono::{DateTime, Utc};
use parking_lot::Mutex;
use policydesk_domain::constants::{
    DEFAULT_HOOK_TIMEOUT_MS, DEFAULT_QUEUE_MAX_AGE_HOURS, DEFAULT_QUEUE_MAX_ATTEMPTS,
    MAX_FAILURE_REASON_LENGTH,
};
use policydesk_domain::{
    DeadLetter, QueueConfig, QueueOperation, QueuedMutation, Result, Table,
};
use serde::Serialize;
use tokio::time::timeout;
use tracing::{debug, error, info, instrument, warn};
use uuid::Uuid;

use super::errors::RemoteError;
use super::events::{SyncEvent, SyncEvents};
use super::ports::{QueueStorage, RemoteStore};

/// Eviction limits for entries that never succeed.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct QueuePolicy {
    /// Failed replays before dead-lettering; 0 disables the limit.
    pub max_attempts: u32,
    /// Age after which a failing entry is dead-lettered.
    pub max_age: chrono::Duration,
}

impl Default for QueuePolicy {
    fn default() -> Self {
        Self::from(&QueueConfig {
            max_attempts: DEFAULT_QUEUE_MAX_ATTEMPTS,
            max_age_hours: DEFAULT_QUEUE_MAX_AGE_HOURS,
        })
    }
}

impl From<&QueueConfig> for QueuePolicy {
    fn from(config: &QueueConfig) -> Self {
        Self { max_attempts: config.max_attempts, max_age: config.max_age() }
    }
}

impl QueuePolicy {
    /// Why a just-failed entry should leave the live queue, if it should.
    pub fn eviction_reason(&self, entry: &QueuedMutation, now: DateTime<Utc>) -> Option<String> {
        let last_error = entry.last_error.as_deref().unwrap_or("unknown error");
        if self.max_attempts > 0 && entry.attempts >= self.max_attempts {
            Some(format!("gave up after {} attempts: {last_error}", entry.attempts))
        } else if entry.age(now) > self.max_age {
            Some(format!("expired after {} hours: {last_error}", self.max_age.num_hours()))
        } else {
            None
        }
    }
}

/// Why a drain returned without replaying anything.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
#[serde(rename_all = "snake_case")]
pub enum DrainSkipReason {
    AlreadyDraining,
    Empty,
    Offline,
}

/// Per-entry results of one completed drain.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize)]
pub struct DrainReport {
    /// Entries the remote store accepted (or had already applied).
    pub replayed: usize,
    /// Entries that failed and went back on the live queue.
    pub requeued: usize,
    /// Entries put back unattempted behind an earlier failure in their table.
    pub held_back: usize,
    /// Entries moved to the dead-letter store.
    pub dead_lettered: usize,
}

/// Result of [`OfflineQueue::drain`].
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
#[serde(tag = "status", content = "detail", rename_all = "snake_case")]
pub enum DrainOutcome {
    Skipped(DrainSkipReason),
    Completed(DrainReport),
}

/// Ordered buffer of remote mutations plus its replay loop.
pub struct OfflineQueue {
    storage: Arc<dyn QueueStorage>,
    remote: Arc<dyn RemoteStore>,
    policy: QueuePolicy,
    call_timeout: Duration,
    events: SyncEvents,
    in_flight: Mutex<HashMap<Table, usize>>,
    snapshot_lock: tokio::sync::Mutex<()>,
    drain_lock: tokio::sync::Mutex<()>,
}

impl OfflineQueue {
    /// Queue over `storage` replaying into `remote`, with the default
    /// eviction policy and call timeout.
    pub fn new(
        storage: Arc<dyn QueueStorage>,
        remote: Arc<dyn RemoteStore>,
        events: SyncEvents,
    ) -> Self {
        Self {
            storage,
            remote,
            policy: QueuePolicy::default(),
            call_timeout: Duration::from_millis(DEFAULT_HOOK_TIMEOUT_MS),
            events,
            in_flight: Mutex::new(HashMap::new()),
            snapshot_lock: tokio::sync::Mutex::new(()),
            drain_lock: tokio::sync::Mutex::new(()),
        }
    }

    /// Replace the eviction limits.
    pub fn with_policy(mut self, policy: QueuePolicy) -> Self {
        self.policy = policy;
        self
    }

    /// Bound for each replayed remote call and the connectivity probe.
    pub fn with_call_timeout(mut self, call_timeout: Duration) -> Self {
        self.call_timeout = call_timeout;
        self
    }

    /// Eviction limits in effect.
    pub fn policy(&self) -> QueuePolicy {
        self.policy
    }

    /// Append a mutation at the tail of the queue.
    pub async fn enqueue(&self, entry: QueuedMutation) -> Result<QueuedMutation> {
        let stored = self.storage.append(entry).await?;
        debug!(
            seq = stored.seq,
            table = %stored.table,
            operation = %stored.operation,
            record_id = %stored.record_id,
            "mutation queued"
        );
        Ok(stored)
    }

    /// Whether `table` has queued or in-flight entries that a new mutation
    /// must not overtake.
    ///
    /// Serialised with the drain's snapshot, so entries are always visible
    /// either in storage or as in flight.
    pub async fn is_blocked(&self, table: Table) -> Result<bool> {
        let _snapshot_guard = self.snapshot_lock.lock().await;
        if self.in_flight.lock().contains_key(&table) {
            return Ok(true);
        }
        Ok(self.storage.pending_for_table(table).await? > 0)
    }

    /// Number of live entries.
    pub async fn len(&self) -> Result<usize> {
        self.storage.len().await
    }

    /// Whether no live entries remain.
    pub async fn is_empty(&self) -> Result<bool> {
        Ok(self.len().await? == 0)
    }

    /// Live entries in replay order.
    pub async fn entries(&self) -> Result<Vec<QueuedMutation>> {
        self.storage.list().await
    }

    /// Entries evicted from the live queue, oldest first.
    pub async fn dead_letters(&self) -> Result<Vec<DeadLetter>> {
        self.storage.dead_letters().await
    }

    /// Move a dead letter back to the tail of the live queue with a fresh
    /// attempt budget. Returns false when no such dead letter exists.
    pub async fn requeue_dead_letter(&self, entry_id: Uuid) -> Result<bool> {
        let Some(entry) = self.storage.requeue_dead_letter(entry_id, Utc::now()).await? else {
            return Ok(false);
        };
        info!(%entry_id, seq = entry.seq, table = %entry.table, "dead letter requeued");
        Ok(true)
    }

    /// Replay queued mutations against the remote store.
    ///
    /// Skips when another drain is running, when the queue is empty, or when
    /// the connectivity probe fails. Remote failures are never returned; only
    /// local queue storage failures are.
    #[instrument(skip(self))]
    pub async fn drain(&self) -> Result<DrainOutcome> {
        let Ok(_drain_guard) = self.drain_lock.try_lock() else {
            return Ok(self.skip(DrainSkipReason::AlreadyDraining));
        };

        if self.storage.len().await? == 0 {
            return Ok(self.skip(DrainSkipReason::Empty));
        }

        if let Err(err) = self.probe().await {
            warn!(error = %err, "remote store unreachable, queue drain skipped");
            return Ok(self.skip(DrainSkipReason::Offline));
        }

        let (snapshot, in_flight) = {
            let _snapshot_guard = self.snapshot_lock.lock().await;
            let snapshot = self.storage.take_all().await?;
            let in_flight = InFlight::track(&self.in_flight, &snapshot);
            (snapshot, in_flight)
        };
        let mut failed_tables = HashSet::new();
        let mut report = DrainReport::default();
        let mut pending = snapshot.into_iter();

        while let Some(entry) = pending.next() {
            let table = entry.table;
            let step = self.process_entry(entry, &mut failed_tables, &mut report).await;
            in_flight.release(table);
            if let Err(err) = step {
                error!(error = %err, "queue storage failed during drain");
                self.restore_remaining(pending).await;
                return Err(err);
            }
        }

        info!(
            replayed = report.replayed,
            requeued = report.requeued,
            held_back = report.held_back,
            dead_lettered = report.dead_lettered,
            "queue drain finished"
        );
        Ok(DrainOutcome::Completed(report))
    }

    async fn process_entry(
        &self,
        mut entry: QueuedMutation,
        failed_tables: &mut HashSet<Table>,
        report: &mut DrainReport,
    ) -> Result<()> {
        if failed_tables.contains(&entry.table) {
            self.storage.restore(entry).await?;
            report.held_back += 1;
            return Ok(());
        }

        match self.replay(&entry).await {
            Ok(()) => {}
            Err(err) if is_already_applied(entry.operation, &err) => {
                debug!(entry_id = %entry.entry_id, error = %err, "mutation already applied remotely");
            }
            Err(err) => {
                failed_tables.insert(entry.table);
                let now = Utc::now();
                entry.attempts = entry.attempts.saturating_add(1);
                entry.last_error = Some(truncate_reason(&err.to_string()));
                entry.last_attempt_at = Some(now);
                return self.park_failed(entry, now, report).await;
            }
        }

        report.replayed += 1;
        self.events.publish(SyncEvent::EntryReplayed {
            entry_id: entry.entry_id,
            table: entry.table,
            operation: entry.operation,
        });
        Ok(())
    }

    async fn park_failed(
        &self,
        entry: QueuedMutation,
        now: DateTime<Utc>,
        report: &mut DrainReport,
    ) -> Result<()> {
        let (entry_id, table, operation) = (entry.entry_id, entry.table, entry.operation);

        if let Some(reason) = self.policy.eviction_reason(&entry, now) {
            warn!(%entry_id, %table, %operation, %reason, "queued mutation dead-lettered");
            self.storage
                .dead_letter(DeadLetter { entry, reason: reason.clone(), dead_lettered_at: now })
                .await?;
            report.dead_lettered += 1;
            self.events.publish(SyncEvent::EntryDeadLettered { entry_id, table, operation, reason });
        } else {
            let attempts = entry.attempts;
            debug!(%entry_id, %table, %operation, attempts, "queued mutation requeued");
            self.storage.restore(entry).await?;
            report.requeued += 1;
            self.events.publish(SyncEvent::EntryRequeued { entry_id, table, operation, attempts });
        }
        Ok(())
    }

    async fn replay(&self, entry: &QueuedMutation) -> std::result::Result<(), RemoteError> {
        let call = async {
            match entry.operation {
                QueueOperation::Insert => {
                    self.remote.insert(entry.table, &entry.payload).await.map(drop)
                }
                QueueOperation::Update => {
                    self.remote.update(entry.table, &entry.record_id, &entry.payload).await.map(drop)
                }
                QueueOperation::Delete => self.remote.delete(entry.table, &entry.record_id).await,
            }
        };
        timeout(self.call_timeout, call)
            .await
            .unwrap_or(Err(RemoteError::Timeout(self.call_timeout)))
    }

    async fn probe(&self) -> std::result::Result<(), RemoteError> {
        timeout(self.call_timeout, self.remote.ping())
            .await
            .unwrap_or(Err(RemoteError::Timeout(self.call_timeout)))
    }

    async fn restore_remaining(&self, remaining: impl Iterator<Item = QueuedMutation>) {
        for entry in remaining {
            let entry_id = entry.entry_id;
            if let Err(err) = self.storage.restore(entry).await {
                error!(%entry_id, error = %err, "queued mutation lost while restoring");
            }
        }
    }

    fn skip(&self, reason: DrainSkipReason) -> DrainOutcome {
        debug!(?reason, "queue drain skipped");
        self.events.publish(SyncEvent::DrainSkipped { reason });
        DrainOutcome::Skipped(reason)
    }
}

/// The remote store already reflects this mutation: a duplicate insert or a
/// delete of a row that is gone.
pub(crate) fn is_already_applied(operation: QueueOperation, err: &RemoteError) -> bool {
    match operation {
        QueueOperation::Insert => err.is_duplicate_key(),
        QueueOperation::Delete => err.is_not_found(),
        QueueOperation::Update => false,
    }
}

pub(crate) fn truncate_reason(reason: &str) -> String {
    if reason.len() <= MAX_FAILURE_REASON_LENGTH {
        return reason.to_string();
    }
    let mut end = MAX_FAILURE_REASON_LENGTH;
    while !reason.is_char_boundary(end) {
        end -= 1;
    }
    format!("{}...", &reason[..end])
}

/// Per-table count of snapshot entries not yet resolved by the running drain.
struct InFlight<'a> {
    counts: &'a Mutex<HashMap<Table, usize>>,
}

impl<'a> InFlight<'a> {
    fn track(counts: &'a Mutex<HashMap<Table, usize>>, entries: &[QueuedMutation]) -> Self {
        let mut map = counts.lock();
        for entry in entries {
            *map.entry(entry.table).or_default() += 1;
        }
        Self { counts }
    }

    fn release(&self, table: Table) {
        let mut map = self.counts.lock();
        if let Some(count) = map.get_mut(&table) {
            *count = count.saturating_sub(1);
            if *count == 0 {
                map.remove(&table);
            }
        }
    }
}

impl Drop for InFlight<'_> {
    fn drop(&mut self) {
        self.counts.lock().clear();
    }
}

#[cfg(test)]
mod tests {
    use async_trait::async_trait;
    use policydesk_domain::Record;
    use serde_json::json;
    use tokio::sync::Mutex as TokioMutex;

    use super::*;
    use crate::sync::errors::BackendPayload;
    use crate::sync::memory_queue::MemoryQueueStorage;

    /// Remote double: records calls and fails for tables listed in `failing`.
    #[derive(Default)]
    struct MockRemote {
        offline: bool,
        failing: Vec<Table>,
        duplicate_inserts: bool,
        calls: TokioMutex<Vec<(QueueOperation, Table, String)>>,
    }

    impl MockRemote {
        async fn check(
            &self,
            op: QueueOperation,
            table: Table,
            id: &str,
        ) -> std::result::Result<(), RemoteError> {
            self.calls.lock().await.push((op, table, id.to_string()));
            if self.failing.contains(&table) {
                return Err(RemoteError::Server {
                    status: 500,
                    payload: BackendPayload::message("boom"),
                });
            }
            if self.duplicate_inserts && op == QueueOperation::Insert {
                return Err(RemoteError::Rejected {
                    status: 409,
                    payload: BackendPayload::message("duplicate"),
                });
            }
            Ok(())
        }
    }

    #[async_trait]
    impl RemoteStore for MockRemote {
        async fn insert(
            &self,
            table: Table,
            row: &Record,
        ) -> std::result::Result<Record, RemoteError> {
            let id = row.get("id").and_then(|v| v.as_str()).unwrap_or_default().to_string();
            self.check(QueueOperation::Insert, table, &id).await.map(|()| row.clone())
        }

        async fn update(
            &self,
            table: Table,
            id: &str,
            changes: &Record,
        ) -> std::result::Result<Record, RemoteError> {
            self.check(QueueOperation::Update, table, id).await.map(|()| changes.clone())
        }

        async fn delete(&self, table: Table, id: &str) -> std::result::Result<(), RemoteError> {
            self.check(QueueOperation::Delete, table, id).await?;
            if id == "gone" {
                return Err(RemoteError::NotFound { table, id: id.to_string() });
            }
            Ok(())
        }

        async fn select_all(&self, _table: Table) -> std::result::Result<Vec<Record>, RemoteError> {
            Ok(Vec::new())
        }

        async fn ping(&self) -> std::result::Result<(), RemoteError> {
            if self.offline {
                Err(RemoteError::Network("connection refused".into()))
            } else {
                Ok(())
            }
        }
    }

    fn mutation(table: Table, op: QueueOperation, id: &str) -> QueuedMutation {
        QueuedMutation::new(table, op, id, json!({ "id": id }).as_object().cloned().unwrap())
    }

    fn queue_with(remote: MockRemote) -> (OfflineQueue, Arc<MockRemote>, Arc<MemoryQueueStorage>) {
        let remote = Arc::new(remote);
        let storage = Arc::new(MemoryQueueStorage::new());
        let queue = OfflineQueue::new(storage.clone(), remote.clone(), SyncEvents::default());
        (queue, remote, storage)
    }

    #[tokio::test]
    async fn empty_queue_skips_without_probing() {
        let (queue, remote, _) = queue_with(MockRemote { offline: true, ..Default::default() });
        let outcome = queue.drain().await.unwrap();
        assert_eq!(outcome, DrainOutcome::Skipped(DrainSkipReason::Empty));
        assert!(remote.calls.lock().await.is_empty());
    }

    #[tokio::test]
    async fn offline_probe_leaves_queue_untouched() {
        let (queue, remote, _) = queue_with(MockRemote { offline: true, ..Default::default() });
        queue.enqueue(mutation(Table::Customers, QueueOperation::Insert, "c1")).await.unwrap();

        let outcome = queue.drain().await.unwrap();

        assert_eq!(outcome, DrainOutcome::Skipped(DrainSkipReason::Offline));
        assert_eq!(queue.len().await.unwrap(), 1);
        assert!(remote.calls.lock().await.is_empty());
    }

    #[tokio::test]
    async fn failure_holds_back_later_entries_of_same_table() {
        let (queue, remote, _) =
            queue_with(MockRemote { failing: vec![Table::Vehicles], ..Default::default() });
        queue.enqueue(mutation(Table::Vehicles, QueueOperation::Insert, "v1")).await.unwrap();
        queue.enqueue(mutation(Table::Customers, QueueOperation::Insert, "c1")).await.unwrap();
        queue.enqueue(mutation(Table::Vehicles, QueueOperation::Update, "v1")).await.unwrap();

        let outcome = queue.drain().await.unwrap();

        assert_eq!(
            outcome,
            DrainOutcome::Completed(DrainReport {
                replayed: 1,
                requeued: 1,
                held_back: 1,
                dead_lettered: 0
            })
        );
        let calls = remote.calls.lock().await;
        assert_eq!(calls.len(), 2, "held-back update must not be attempted");

        let left = queue.entries().await.unwrap();
        let ops: Vec<_> = left.iter().map(|e| e.operation).collect();
        assert_eq!(ops, [QueueOperation::Insert, QueueOperation::Update]);
        assert_eq!(left[0].attempts, 1);
        assert!(left[0].last_error.as_deref().unwrap_or_default().contains("boom"));
        assert_eq!(left[1].attempts, 0);
        assert!(!queue.is_blocked(Table::Customers).await.unwrap());
        assert!(queue.is_blocked(Table::Vehicles).await.unwrap());
    }

    #[tokio::test]
    async fn duplicate_insert_and_missing_delete_count_as_replayed() {
        let (queue, _, _) =
            queue_with(MockRemote { duplicate_inserts: true, ..Default::default() });
        queue.enqueue(mutation(Table::Customers, QueueOperation::Insert, "c1")).await.unwrap();
        queue.enqueue(mutation(Table::Customers, QueueOperation::Delete, "gone")).await.unwrap();

        let outcome = queue.drain().await.unwrap();

        assert!(matches!(outcome, DrainOutcome::Completed(DrainReport { replayed: 2, .. })));
        assert!(queue.is_empty().await.unwrap());
    }

    #[tokio::test]
    async fn exhausted_entries_are_dead_lettered_and_can_be_requeued() {
        let (queue, _, _) =
            queue_with(MockRemote { failing: vec![Table::Policies], ..Default::default() });
        let queue = queue.with_policy(QueuePolicy {
            max_attempts: 2,
            max_age: chrono::Duration::hours(1),
        });
        let entry = queue
            .enqueue(mutation(Table::Policies, QueueOperation::Delete, "p1"))
            .await
            .unwrap();

        queue.drain().await.unwrap();
        assert_eq!(queue.len().await.unwrap(), 1);
        let outcome = queue.drain().await.unwrap();
        assert!(matches!(outcome, DrainOutcome::Completed(DrainReport { dead_lettered: 1, .. })));

        assert!(queue.is_empty().await.unwrap());
        let letters = queue.dead_letters().await.unwrap();
        assert_eq!(letters.len(), 1);
        assert!(letters[0].reason.contains("2 attempts"));

        assert!(queue.requeue_dead_letter(entry.entry_id).await.unwrap());
        assert!(!queue.requeue_dead_letter(entry.entry_id).await.unwrap());
        let requeued = queue.entries().await.unwrap();
        assert_eq!(requeued[0].attempts, 0);
        assert!(queue.dead_letters().await.unwrap().is_empty());
    }

    #[tokio::test]
    async fn failed_requeue_keeps_the_dead_letter() {
        let (queue, _, storage) = queue_with(MockRemote::default());
        let live = queue.enqueue(mutation(Table::Users, QueueOperation::Update, "u1")).await.unwrap();
        storage
            .dead_letter(DeadLetter { entry: live.clone(), reason: "gave up".into(), dead_lettered_at: Utc::now() })
            .await
            .unwrap();

        // The live copy makes the move back into the queue fail.
        assert!(queue.requeue_dead_letter(live.entry_id).await.is_err());
        assert_eq!(queue.dead_letters().await.unwrap().len(), 1);
        assert_eq!(queue.len().await.unwrap(), 1);
    }

    #[tokio::test]
    async fn stale_entries_expire() {
        let (queue, _, storage) =
            queue_with(MockRemote { failing: vec![Table::Users], ..Default::default() });
        let mut old = mutation(Table::Users, QueueOperation::Update, "u1");
        old.enqueued_at = Utc::now() - chrono::Duration::days(30);
        storage.append(old).await.unwrap();

        let outcome = queue.drain().await.unwrap();

        assert!(matches!(outcome, DrainOutcome::Completed(DrainReport { dead_lettered: 1, .. })));
        assert!(queue.dead_letters().await.unwrap()[0].reason.contains("expired"));
    }

    #[test]
    fn zero_max_attempts_disables_attempt_limit() {
        let policy = QueuePolicy { max_attempts: 0, max_age: chrono::Duration::hours(1) };
        let mut entry = mutation(Table::Users, QueueOperation::Update, "u1");
        entry.attempts = 1_000;
        assert!(policy.eviction_reason(&entry, Utc::now()).is_none());
    }

    #[test]
    fn truncate_reason_respects_char_boundaries() {
        let long = "ü".repeat(MAX_FAILURE_REASON_LENGTH);
        let truncated = truncate_reason(&long);
        assert!(truncated.ends_with("..."));
        assert!(truncated.len() <= MAX_FAILURE_REASON_LENGTH + 3);
        assert_eq!(truncate_reason("short"), "short");
    }
}
