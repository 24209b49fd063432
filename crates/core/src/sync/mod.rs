//! Offline-tolerant replication to the remote store.
//!
//! - [`ReplicationHook`] pushes local mutations to the remote store and parks
//!   failures in the [`OfflineQueue`].
//! - [`OfflineQueue`] replays parked mutations in order once the remote store
//!   is reachable.
//! - [`SyncOrchestrator`] runs single-flight passes of queue drain followed by
//!   a full pull-refresh of the local store.

pub mod errors;
pub mod events;
pub mod memory_queue;
pub mod orchestrator;
pub mod ports;
pub mod queue;
pub mod replication;

pub use errors::{BackendPayload, RemoteError, RemoteErrorCategory, SyncError};
pub use events::{SyncEvent, SyncEvents, SyncStats};
pub use memory_queue::MemoryQueueStorage;
pub use orchestrator::{PushReport, SyncOrchestrator, SyncOutcome, SyncReport};
pub use ports::{QueueStorage, RemoteStore};
pub use queue::{DrainOutcome, DrainReport, DrainSkipReason, OfflineQueue, QueuePolicy};
pub use replication::ReplicationHook;
