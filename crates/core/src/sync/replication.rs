//! Write-through replication of local mutations.
//!
//! Each committed local mutation is translated to remote field names and sent
//! to the remote store. If the call fails, or if earlier mutations for the
//! same table are still queued, the mutation is appended to the offline queue
//! instead. Nothing here ever fails the local write.

use std::sync::Arc;
use std::time::Duration;

use async_trait::async_trait;
use policydesk_domain::constants::DEFAULT_HOOK_TIMEOUT_MS;
use policydesk_domain::{mapping, QueueOperation, QueuedMutation, Record, Table};
use serde_json::{json, Value};
use tokio::time::timeout;
use tracing::{debug, error, warn};

use super::errors::RemoteError;
use super::events::{SyncEvent, SyncEvents};
use super::ports::RemoteStore;
use super::queue::{is_already_applied, truncate_reason, OfflineQueue};
use crate::store::{HookRegistry, MutationEvent, MutationHook};

/// A mutation ready for the remote store.
struct RemoteMutation {
    table: Table,
    operation: QueueOperation,
    record_id: String,
    payload: Record,
}

/// [`MutationHook`] that pushes local mutations to the remote store.
pub struct ReplicationHook {
    remote: Arc<dyn RemoteStore>,
    queue: Arc<OfflineQueue>,
    events: SyncEvents,
    call_timeout: Duration,
}

impl ReplicationHook {
    /// Hook sending to `remote` and deferring into `queue`.
    pub fn new(remote: Arc<dyn RemoteStore>, queue: Arc<OfflineQueue>, events: SyncEvents) -> Self {
        Self {
            remote,
            queue,
            events,
            call_timeout: Duration::from_millis(DEFAULT_HOOK_TIMEOUT_MS),
        }
    }

    /// Bound for each direct remote call.
    pub fn with_call_timeout(mut self, call_timeout: Duration) -> Self {
        self.call_timeout = call_timeout;
        self
    }

    /// Register this hook for every mutation kind on each of `tables`.
    pub fn install(self: Arc<Self>, registry: &HookRegistry, tables: &[Table]) {
        let hook: Arc<dyn MutationHook> = self;
        for table in tables {
            registry.register_all_kinds(*table, &hook);
        }
    }

    async fn send(&self, mutation: &RemoteMutation) -> Result<(), RemoteError> {
        let call = async {
            match mutation.operation {
                QueueOperation::Insert => {
                    self.remote.insert(mutation.table, &mutation.payload).await.map(drop)
                }
                QueueOperation::Update => self
                    .remote
                    .update(mutation.table, &mutation.record_id, &mutation.payload)
                    .await
                    .map(drop),
                QueueOperation::Delete => {
                    self.remote.delete(mutation.table, &mutation.record_id).await
                }
            }
        };
        timeout(self.call_timeout, call)
            .await
            .unwrap_or(Err(RemoteError::Timeout(self.call_timeout)))
    }

    async fn defer(&self, mutation: RemoteMutation, reason: String) {
        let RemoteMutation { table, operation, record_id, payload } = mutation;
        let mut entry = QueuedMutation::new(table, operation, record_id.clone(), payload);
        entry.last_error = Some(truncate_reason(&reason));

        match self.queue.enqueue(entry).await {
            Ok(_) => {
                self.events.publish(SyncEvent::ReplicationDeferred {
                    table,
                    operation,
                    record_id,
                    reason,
                });
            }
            Err(err) => {
                error!(%table, %operation, %record_id, error = %err, "failed to queue mutation");
                self.events.publish(SyncEvent::ReplicationLost {
                    table,
                    operation,
                    record_id,
                    error: err.to_string(),
                });
            }
        }
    }
}

#[async_trait]
impl MutationHook for ReplicationHook {
    async fn on_mutation(&self, event: &MutationEvent) {
        let mutation = match to_remote_mutation(event) {
            Ok(mutation) => mutation,
            Err(err) => {
                let record_id = event.record_id().unwrap_or_default().to_string();
                error!(table = %event.table(), %record_id, error = %err, "mutation not replicable");
                self.events.publish(SyncEvent::ReplicationLost {
                    table: event.table(),
                    operation: operation_for(event),
                    record_id,
                    error: err.to_string(),
                });
                return;
            }
        };

        // Queued work for this table must replay first.
        match self.queue.is_blocked(mutation.table).await {
            Ok(false) => {}
            Ok(true) => {
                debug!(table = %mutation.table, "earlier mutations pending, queueing");
                self.defer(mutation, "queued behind pending mutations".to_string()).await;
                return;
            }
            Err(err) => {
                warn!(table = %mutation.table, error = %err, "queue state unavailable, queueing");
                self.defer(mutation, err.to_string()).await;
                return;
            }
        }

        match self.send(&mutation).await {
            Ok(()) => {}
            Err(err) if is_already_applied(mutation.operation, &err) => {
                debug!(table = %mutation.table, record_id = %mutation.record_id, "already applied remotely");
            }
            Err(err) => {
                warn!(
                    table = %mutation.table,
                    operation = %mutation.operation,
                    record_id = %mutation.record_id,
                    error = %err,
                    "remote write failed, mutation queued"
                );
                self.defer(mutation, err.to_string()).await;
                return;
            }
        }

        self.events.publish(SyncEvent::Replicated {
            table: mutation.table,
            operation: mutation.operation,
            record_id: mutation.record_id,
        });
    }
}

fn operation_for(event: &MutationEvent) -> QueueOperation {
    match event {
        MutationEvent::Creating { .. } => QueueOperation::Insert,
        MutationEvent::Updating { .. } => QueueOperation::Update,
        MutationEvent::Deleting { .. } => QueueOperation::Delete,
    }
}

fn to_remote_mutation(event: &MutationEvent) -> policydesk_domain::Result<RemoteMutation> {
    let operation = operation_for(event);
    let mutation = match event {
        MutationEvent::Creating { table, record } => RemoteMutation {
            table: *table,
            operation,
            record_id: policydesk_domain::record_id(record)?.to_string(),
            payload: mapping::to_remote(*table, record)?,
        },
        MutationEvent::Updating { table, id, changes } => RemoteMutation {
            table: *table,
            operation,
            record_id: id.clone(),
            payload: mapping::to_remote(*table, changes)?,
        },
        MutationEvent::Deleting { table, id } => RemoteMutation {
            table: *table,
            operation,
            record_id: id.clone(),
            payload: id_payload(id),
        },
    };
    Ok(mutation)
}

fn id_payload(id: &str) -> Record {
    match json!({ "id": id }) {
        Value::Object(map) => map,
        _ => Record::new(),
    }
}

#[cfg(test)]
mod tests {
    use serde_json::json;
    use tokio::sync::Mutex as TokioMutex;

    use super::*;
    use crate::store::{LocalStore, MemoryRecordStore};
    use crate::sync::errors::BackendPayload;
    use crate::sync::memory_queue::MemoryQueueStorage;

    #[derive(Default)]
    struct ScriptedRemote {
        offline: TokioMutex<bool>,
        calls: TokioMutex<Vec<(QueueOperation, Table, Record)>>,
    }

    impl ScriptedRemote {
        async fn call(
            &self,
            op: QueueOperation,
            table: Table,
            payload: Record,
        ) -> Result<Record, RemoteError> {
            if *self.offline.lock().await {
                return Err(RemoteError::Network("offline".into()));
            }
            self.calls.lock().await.push((op, table, payload.clone()));
            Ok(payload)
        }
    }

    #[async_trait]
    impl RemoteStore for ScriptedRemote {
        async fn insert(&self, table: Table, row: &Record) -> Result<Record, RemoteError> {
            self.call(QueueOperation::Insert, table, row.clone()).await
        }

        async fn update(
            &self,
            table: Table,
            _id: &str,
            changes: &Record,
        ) -> Result<Record, RemoteError> {
            self.call(QueueOperation::Update, table, changes.clone()).await
        }

        async fn delete(&self, table: Table, id: &str) -> Result<(), RemoteError> {
            self.call(QueueOperation::Delete, table, id_payload(id)).await.map(drop)
        }

        async fn select_all(&self, _table: Table) -> Result<Vec<Record>, RemoteError> {
            Ok(Vec::new())
        }

        async fn ping(&self) -> Result<(), RemoteError> {
            if *self.offline.lock().await {
                Err(RemoteError::Server { status: 503, payload: BackendPayload::default() })
            } else {
                Ok(())
            }
        }
    }

    fn record(value: serde_json::Value) -> Record {
        value.as_object().cloned().unwrap()
    }

    fn wire() -> (LocalStore, Arc<ScriptedRemote>, Arc<OfflineQueue>, SyncEvents) {
        let remote = Arc::new(ScriptedRemote::default());
        let events = SyncEvents::default();
        let queue = Arc::new(OfflineQueue::new(
            Arc::new(MemoryQueueStorage::new()),
            remote.clone(),
            events.clone(),
        ));
        let local = LocalStore::new(Arc::new(MemoryRecordStore::new()));
        Arc::new(ReplicationHook::new(remote.clone(), queue.clone(), events.clone()))
            .install(local.hooks(), &Table::ALL);
        (local, remote, queue, events)
    }

    #[tokio::test]
    async fn online_writes_reach_remote_with_remote_names() {
        let (local, remote, queue, events) = wire();

        local
            .insert(
                Table::Vehicles,
                record(json!({ "id": "v1", "plate": "34ABC", "customerId": "c1" })),
            )
            .await
            .unwrap();
        local
            .update(Table::Vehicles, "v1", record(json!({ "chassisNumber": "X9" })))
            .await
            .unwrap();
        local.flush_hooks().await;

        let calls = remote.calls.lock().await;
        assert_eq!(calls[0].2.get("customer_id"), Some(&json!("c1")));
        assert_eq!(calls[1].2, record(json!({ "chassis_number": "X9" })));
        assert!(queue.is_empty().await.unwrap());
        assert_eq!(events.stats().replicated, 2);
    }

    #[tokio::test]
    async fn offline_writes_are_queued_and_later_writes_stay_behind_them() {
        let (local, remote, queue, events) = wire();
        *remote.offline.lock().await = true;

        local.insert(Table::Policies, record(json!({ "id": "p1", "price": 10.0 }))).await.unwrap();
        local.flush_hooks().await;
        *remote.offline.lock().await = false;
        local.update(Table::Policies, "p1", record(json!({ "price": 12.5 }))).await.unwrap();
        local.delete(Table::Policies, "p1").await.unwrap();
        local.flush_hooks().await;

        assert!(remote.calls.lock().await.is_empty());
        let ops: Vec<_> = queue.entries().await.unwrap().iter().map(|e| e.operation).collect();
        assert_eq!(ops, [QueueOperation::Insert, QueueOperation::Update, QueueOperation::Delete]);
        assert_eq!(queue.entries().await.unwrap()[2].payload, record(json!({ "id": "p1" })));
        assert_eq!(events.stats().deferred, 3);
    }

    #[tokio::test]
    async fn unmapped_fields_are_reported_not_replicated() {
        let event = MutationEvent::Updating {
            table: Table::Users,
            id: "u1".into(),
            changes: record(json!({ "nickname": "x" })),
        };
        let remote = Arc::new(ScriptedRemote::default());
        let events = SyncEvents::default();
        let queue = Arc::new(OfflineQueue::new(
            Arc::new(MemoryQueueStorage::new()),
            remote.clone(),
            events.clone(),
        ));
        let hook = ReplicationHook::new(remote.clone(), queue.clone(), events.clone());

        hook.on_mutation(&event).await;

        assert_eq!(events.stats().lost, 1);
        assert!(queue.is_empty().await.unwrap());
        assert!(remote.calls.lock().await.is_empty());
    }
}
