//! # PolicyDesk Core
//!
//! Ports and business logic of the local-first data layer. No database,
//! HTTP or platform code lives here.
//!
//! - [`store`]: the local store facade, its hook registry and the
//!   `RecordStore` port.
//! - [`sync`]: write-through replication, the offline queue and the sync
//!   orchestrator, against the `RemoteStore` and `QueueStorage` ports.
//! - [`bookkeeping`]: customer, vehicle and policy operations with role
//!   scoping.
//! - [`analytics`]: questions over policy data through the `TextAnalyzer`
//!   port.

pub mod analytics;
pub mod bookkeeping;
pub mod store;
pub mod sync;

pub use analytics::{PolicyAnalytics, TextAnalyzer};
pub use bookkeeping::{BookkeepingService, CustomerSummary, Visibility};
pub use store::{
    HookRegistry, LocalStore, MemoryRecordStore, MutationEvent, MutationHook, RecordStore,
    Repository, TableSnapshot,
};
pub use sync::{
    DrainOutcome, DrainReport, DrainSkipReason, MemoryQueueStorage, OfflineQueue, PushReport,
    QueuePolicy, QueueStorage, RemoteError, RemoteStore, ReplicationHook, SyncError, SyncEvent,
    SyncEvents, SyncOrchestrator, SyncOutcome, SyncReport, SyncStats,
};
