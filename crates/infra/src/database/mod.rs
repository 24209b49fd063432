//! SQLite persistence: connection management, schema, the record store and
//! the offline queue storage.

pub mod manager;
pub mod queue_repository;
pub mod record_store;

pub use manager::{DbManager, SCHEMA_VERSION};
pub use queue_repository::SqliteQueueStorage;
pub use record_store::SqliteRecordStore;
