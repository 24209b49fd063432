//! Single-flight sync passes: queue drain, then full pull-refresh.
//!
//! A pass flushes pending hook events, drains the offline queue, fetches every
//! remote table and overwrites the local store in one transaction. The pull
//! runs even when the drain was skipped or left entries queued; in that case
//! the refreshed local state can briefly miss writes that are still parked in
//! the queue until a later pass replays them.

use std::collections::BTreeMap;
use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::Arc;
use std::time::Duration;

use chrono::{DateTime, Utc};
use parking_lot::RwLock;
use policydesk_domain::constants::DEFAULT_SYNC_PASS_TIMEOUT_SECS;
use policydesk_domain::{mapping, PolicyDeskError, Record, SyncState, Table};
use serde::Serialize;
use tokio::time::timeout;
use tracing::{debug, info, instrument, warn};

use super::errors::{RemoteError, SyncError};
use super::events::{SyncEvent, SyncEvents};
use super::ports::RemoteStore;
use super::queue::{DrainOutcome, OfflineQueue};
use crate::store::validation::validate_record;
use crate::store::{LocalStore, TableSnapshot};

#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct SyncReport {
    pub started_at: DateTime<Utc>,
    pub finished_at: DateTime<Utc>,
    pub drain: DrainOutcome,
    /// Rows written to the local store per table.
    pub pulled: BTreeMap<Table, usize>,
}

impl SyncReport {
    pub fn rows_pulled(&self) -> usize {
        self.pulled.values().sum()
    }
}

#[derive(Debug, Clone, PartialEq, Serialize)]
#[serde(tag = "status", content = "report", rename_all = "snake_case")]
pub enum SyncOutcome {
    Completed(SyncReport),
    /// Another pass was already running; nothing was done.
    Skipped,
}

/// Result of seeding the remote store from local data.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize)]
pub struct PushReport {
    pub inserted: usize,
    /// Rows the remote store already had.
    pub already_present: usize,
}

/// Holds the syncing flag for the lifetime of a pass.
struct SyncGuard<'a> {
    flag: &'a AtomicBool,
}

impl<'a> SyncGuard<'a> {
    fn acquire(flag: &'a AtomicBool) -> Option<Self> {
        flag.compare_exchange(false, true, Ordering::AcqRel, Ordering::Acquire)
            .ok()
            .map(|_| Self { flag })
    }
}

impl Drop for SyncGuard<'_> {
    fn drop(&mut self) {
        self.flag.store(false, Ordering::Release);
    }
}

pub struct SyncOrchestrator {
    local: Arc<LocalStore>,
    remote: Arc<dyn RemoteStore>,
    queue: Arc<OfflineQueue>,
    events: SyncEvents,
    pass_timeout: Duration,
    syncing: AtomicBool,
    last_report: RwLock<Option<SyncReport>>,
}

impl SyncOrchestrator {
    pub fn new(
        local: Arc<LocalStore>,
        remote: Arc<dyn RemoteStore>,
        queue: Arc<OfflineQueue>,
        events: SyncEvents,
    ) -> Self {
        Self {
            local,
            remote,
            queue,
            events,
            pass_timeout: Duration::from_secs(DEFAULT_SYNC_PASS_TIMEOUT_SECS),
            syncing: AtomicBool::new(false),
            last_report: RwLock::new(None),
        }
    }

    /// Upper bound for a whole pass, drain and pull included.
    pub fn with_pass_timeout(mut self, pass_timeout: Duration) -> Self {
        self.pass_timeout = pass_timeout;
        self
    }

    pub fn state(&self) -> SyncState {
        if self.syncing.load(Ordering::Acquire) {
            SyncState::Syncing
        } else {
            SyncState::Idle
        }
    }

    pub fn is_syncing(&self) -> bool {
        self.state() == SyncState::Syncing
    }

    /// Report of the last pass that completed.
    pub fn last_report(&self) -> Option<SyncReport> {
        self.last_report.read().clone()
    }

    pub fn events(&self) -> &SyncEvents {
        &self.events
    }

    pub fn queue(&self) -> &Arc<OfflineQueue> {
        &self.queue
    }

    /// Run one sync pass, or return [`SyncOutcome::Skipped`] if one is
    /// already running.
    ///
    /// Remote failures during the drain stay in the queue. A failed fetch,
    /// an invalid remote row, a local store failure or the pass timeout fail
    /// the pass and leave the local store as it was.
    #[instrument(skip(self))]
    pub async fn sync(&self) -> Result<SyncOutcome, SyncError> {
        let Some(_guard) = SyncGuard::acquire(&self.syncing) else {
            debug!("sync already running, request ignored");
            self.events.publish(SyncEvent::SyncSkipped);
            return Ok(SyncOutcome::Skipped);
        };

        self.events.publish(SyncEvent::SyncStarted);
        let started_at = Utc::now();
        let result = timeout(self.pass_timeout, self.run_pass(started_at))
            .await
            .unwrap_or(Err(SyncError::Timeout(self.pass_timeout)));

        match &result {
            Ok(report) => {
                info!(
                    rows_pulled = report.rows_pulled(),
                    elapsed_ms = (report.finished_at - started_at).num_milliseconds(),
                    "sync pass completed"
                );
                self.events.publish(SyncEvent::SyncCompleted { rows_pulled: report.rows_pulled() });
                *self.last_report.write() = Some(report.clone());
            }
            Err(err) => {
                warn!(error = %err, "sync pass failed");
                self.events.publish(SyncEvent::SyncFailed { error: err.to_string() });
            }
        }

        result.map(SyncOutcome::Completed)
    }

    async fn run_pass(&self, started_at: DateTime<Utc>) -> Result<SyncReport, SyncError> {
        // Mutations raised before this pass must be queued or replicated first.
        self.local.flush_hooks().await;

        // Detached so a timed-out or cancelled pass still lets the drain put
        // unreplayed entries back.
        let queue = Arc::clone(&self.queue);
        let drain = tokio::spawn(async move { queue.drain().await })
            .await
            .map_err(|err| PolicyDeskError::Internal(format!("queue drain task failed: {err}")))??;
        let snapshot = self.pull().await?;
        let pulled = snapshot.iter().map(|(table, rows)| (*table, rows.len())).collect();
        self.local.replace_all(snapshot).await?;

        Ok(SyncReport { started_at, finished_at: Utc::now(), drain, pulled })
    }

    /// Fetch and translate every remote table. Nothing is written here.
    async fn pull(&self) -> Result<TableSnapshot, SyncError> {
        let remote = &self.remote;
        let (customers, vehicles, policies, users) = futures::try_join!(
            remote.select_all(Table::Customers),
            remote.select_all(Table::Vehicles),
            remote.select_all(Table::Policies),
            remote.select_all(Table::Users),
        )?;

        let mut snapshot = TableSnapshot::new();
        for (table, rows) in [
            (Table::Customers, customers),
            (Table::Vehicles, vehicles),
            (Table::Policies, policies),
            (Table::Users, users),
        ] {
            let local_rows = rows
                .iter()
                .map(|row| to_local_row(table, row))
                .collect::<Result<Vec<_>, _>>()?;
            debug!(%table, rows = local_rows.len(), "remote table fetched");
            snapshot.insert(table, local_rows);
        }
        Ok(snapshot)
    }

    /// Insert every local row into the remote store, parents first.
    ///
    /// Used once to seed an empty backend from an existing local database.
    /// Rows the remote store already has are counted, not overwritten.
    /// Returns `None` when a sync pass is running.
    #[instrument(skip(self))]
    pub async fn push_local_snapshot(&self) -> Result<Option<PushReport>, SyncError> {
        let Some(_guard) = SyncGuard::acquire(&self.syncing) else {
            debug!("sync running, snapshot push ignored");
            return Ok(None);
        };

        let report = timeout(self.pass_timeout, self.push_all())
            .await
            .unwrap_or(Err(SyncError::Timeout(self.pass_timeout)))?;
        info!(
            inserted = report.inserted,
            already_present = report.already_present,
            "local snapshot pushed"
        );
        Ok(Some(report))
    }

    async fn push_all(&self) -> Result<PushReport, SyncError> {
        let mut report = PushReport::default();
        for table in Table::ALL {
            for record in self.local.all(table).await? {
                let row = mapping::to_remote(table, &record)?;
                match self.remote.insert(table, &row).await {
                    Ok(_) => report.inserted += 1,
                    Err(err) if err.is_duplicate_key() => report.already_present += 1,
                    Err(err) => return Err(err.into()),
                }
            }
        }
        Ok(report)
    }
}

fn to_local_row(table: Table, row: &Record) -> Result<Record, RemoteError> {
    let local = mapping::to_local(table, row)
        .map_err(|err| RemoteError::Decode(format!("{table} row: {err}")))?;
    validate_record(table, &local)
        .map_err(|err| RemoteError::Decode(format!("{table} row: {err}")))?;
    Ok(local)
}

#[cfg(test)]
mod tests {
    use async_trait::async_trait;
    use serde_json::json;
    use tokio::sync::Notify;

    use super::*;
    use crate::store::MemoryRecordStore;
    use crate::sync::memory_queue::MemoryQueueStorage;
    use crate::sync::queue::DrainSkipReason;

    /// Serves fixed rows; `select_all` can be parked on a gate.
    #[derive(Default)]
    struct FixedRemote {
        customers: Vec<Record>,
        gate: Option<Arc<Notify>>,
        hang: bool,
    }

    #[async_trait]
    impl RemoteStore for FixedRemote {
        async fn insert(&self, _table: Table, row: &Record) -> Result<Record, RemoteError> {
            Ok(row.clone())
        }

        async fn update(
            &self,
            _table: Table,
            _id: &str,
            changes: &Record,
        ) -> Result<Record, RemoteError> {
            Ok(changes.clone())
        }

        async fn delete(&self, _table: Table, _id: &str) -> Result<(), RemoteError> {
            Ok(())
        }

        async fn select_all(&self, table: Table) -> Result<Vec<Record>, RemoteError> {
            if self.hang {
                std::future::pending::<()>().await;
            }
            if let Some(gate) = &self.gate {
                gate.notified().await;
            }
            Ok(if table == Table::Customers { self.customers.clone() } else { Vec::new() })
        }

        async fn ping(&self) -> Result<(), RemoteError> {
            Ok(())
        }
    }

    fn record(value: serde_json::Value) -> Record {
        value.as_object().cloned().unwrap()
    }

    fn orchestrator(remote: FixedRemote) -> (Arc<SyncOrchestrator>, Arc<LocalStore>) {
        let remote: Arc<dyn RemoteStore> = Arc::new(remote);
        let events = SyncEvents::default();
        let local = Arc::new(LocalStore::new(Arc::new(MemoryRecordStore::new())));
        let queue = Arc::new(OfflineQueue::new(
            Arc::new(MemoryQueueStorage::new()),
            remote.clone(),
            events.clone(),
        ));
        let orchestrator = SyncOrchestrator::new(local.clone(), remote, queue, events);
        (Arc::new(orchestrator), local)
    }

    #[tokio::test]
    async fn pass_overwrites_local_tables_with_translated_rows() {
        let (orchestrator, local) = orchestrator(FixedRemote {
            customers: vec![record(json!({ "id": "c1", "first_name": "Ada", "assigned_user_id": null }))],
            ..FixedRemote::default()
        });
        local
            .insert(Table::Customers, record(json!({ "id": "stale", "firstName": "Old" })))
            .await
            .unwrap();

        let outcome = orchestrator.sync().await.unwrap();

        let SyncOutcome::Completed(report) = outcome else { panic!("expected a completed pass") };
        assert_eq!(report.drain, DrainOutcome::Skipped(DrainSkipReason::Empty));
        assert_eq!(report.pulled.get(&Table::Customers), Some(&1));
        let rows = local.all(Table::Customers).await.unwrap();
        assert_eq!(rows, vec![record(json!({ "id": "c1", "firstName": "Ada", "assignedUserId": null }))]);
        assert_eq!(orchestrator.last_report(), Some(report));
        assert_eq!(orchestrator.state(), SyncState::Idle);
    }

    #[tokio::test]
    async fn concurrent_request_is_skipped() {
        let gate = Arc::new(Notify::new());
        let (orchestrator, _) =
            orchestrator(FixedRemote { gate: Some(gate.clone()), ..FixedRemote::default() });

        let running = tokio::spawn({
            let orchestrator = orchestrator.clone();
            async move { orchestrator.sync().await }
        });
        while !orchestrator.is_syncing() {
            tokio::task::yield_now().await;
        }

        assert_eq!(orchestrator.sync().await.unwrap(), SyncOutcome::Skipped);
        assert_eq!(orchestrator.push_local_snapshot().await.unwrap(), None);

        gate.notify_waiters();
        // Four fetches each wait on the gate; release them until the pass ends.
        while !running.is_finished() {
            gate.notify_waiters();
            tokio::task::yield_now().await;
        }
        assert!(matches!(running.await.unwrap().unwrap(), SyncOutcome::Completed(_)));
        assert_eq!(orchestrator.events().stats().syncs_skipped, 1);
    }

    #[tokio::test]
    async fn hung_remote_times_out_and_releases_flag() {
        let (orchestrator, _) = orchestrator(FixedRemote { hang: true, ..FixedRemote::default() });
        let orchestrator = Arc::try_unwrap(orchestrator)
            .ok()
            .unwrap()
            .with_pass_timeout(Duration::from_millis(50));

        let err = orchestrator.sync().await.unwrap_err();

        assert!(matches!(err, SyncError::Timeout(_)));
        assert_eq!(orchestrator.state(), SyncState::Idle);
        assert!(orchestrator.last_report().is_none());
    }

    #[tokio::test]
    async fn malformed_remote_row_fails_pass_without_touching_local() {
        let (orchestrator, local) = orchestrator(FixedRemote {
            customers: vec![record(json!({ "id": "c1", "favourite_colour": "red" }))],
            ..FixedRemote::default()
        });
        local.insert(Table::Customers, record(json!({ "id": "keep" }))).await.unwrap();

        let err = orchestrator.sync().await.unwrap_err();

        assert!(matches!(err, SyncError::Remote(RemoteError::Decode(_))));
        assert_eq!(local.count(Table::Customers).await.unwrap(), 1);
    }

    #[tokio::test]
    async fn push_counts_inserted_rows() {
        let (orchestrator, local) = orchestrator(FixedRemote::default());
        local.insert(Table::Customers, record(json!({ "id": "c1" }))).await.unwrap();
        local.insert(Table::Vehicles, record(json!({ "id": "v1", "customerId": "c1" }))).await.unwrap();

        let report = orchestrator.push_local_snapshot().await.unwrap();

        assert_eq!(report, Some(PushReport { inserted: 2, already_present: 0 }));
    }
}
