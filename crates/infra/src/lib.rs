//! # PolicyDesk Infrastructure
//!
//! Infrastructure implementations of core ports.
//!
//! This crate contains:
//! - SQLite implementations of the record store and the offline queue
//!   storage, plus the schema and connection manager
//! - The PostgREST-style remote store client and its HTTP client
//! - Configuration loading
//! - The background sync scheduler
//!
//! ## Architecture
//! - Implements traits defined in `policydesk-core`
//! - Depends on `policydesk-common` for the SQLite pool
//! - Contains all "impure" code (disk, network, timers)

pub mod config;
pub mod database;
pub mod errors;
pub mod http;
pub mod scheduling;
pub mod sync;

// Re-export commonly used items
pub use database::{DbManager, SqliteQueueStorage, SqliteRecordStore};
pub use errors::InfraError;
pub use http::HttpClient;
pub use scheduling::{SchedulerError, SyncScheduler, SyncSchedulerConfig};
pub use sync::RestRemoteStore;
