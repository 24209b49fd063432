//! Shared fixtures for `policydesk-core` integration tests.

#![allow(dead_code)]

pub mod remote;

use std::sync::Arc;
use std::time::Duration;

use policydesk_core::{
    LocalStore, MemoryQueueStorage, MemoryRecordStore, OfflineQueue, QueuePolicy, QueueStorage,
    ReplicationHook, SyncEvents, SyncOrchestrator,
};
use policydesk_domain::{Record, Table};
pub use remote::{FlakyRemote, RemoteCall};

/// Local store, queue, replication hook and orchestrator wired to one
/// in-memory remote.
pub struct Harness {
    pub remote: Arc<FlakyRemote>,
    pub local: Arc<LocalStore>,
    pub queue: Arc<OfflineQueue>,
    pub events: SyncEvents,
    pub orchestrator: Arc<SyncOrchestrator>,
}

impl Harness {
    pub fn new() -> Self {
        Self::with_policy(QueuePolicy::default())
    }

    pub fn with_policy(policy: QueuePolicy) -> Self {
        Self::build(Arc::new(MemoryQueueStorage::new()), policy)
    }

    /// Harness whose offline queue persists into `storage`.
    pub fn with_queue_storage(storage: Arc<dyn QueueStorage>) -> Self {
        Self::build(storage, QueuePolicy::default())
    }

    fn build(storage: Arc<dyn QueueStorage>, policy: QueuePolicy) -> Self {
        let remote = Arc::new(FlakyRemote::new());
        let events = SyncEvents::default();
        let queue = Arc::new(
            OfflineQueue::new(storage, remote.clone(), events.clone())
                .with_policy(policy)
                .with_call_timeout(Duration::from_secs(2)),
        );
        let local = Arc::new(LocalStore::new(Arc::new(MemoryRecordStore::new())));
        Arc::new(ReplicationHook::new(remote.clone(), queue.clone(), events.clone()))
            .install(local.hooks(), &Table::ALL);
        let orchestrator = Arc::new(
            SyncOrchestrator::new(local.clone(), remote.clone(), queue.clone(), events.clone())
                .with_pass_timeout(Duration::from_secs(5)),
        );
        Self { remote, local, queue, events, orchestrator }
    }
}

pub fn record(value: serde_json::Value) -> Record {
    value.as_object().cloned().expect("test record must be a JSON object")
}
