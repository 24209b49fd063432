//! Storage primitives for the embedded SQLite database
//!
//! This module provides the r2d2 connection pool, the pooled connection
//! wrapper, per-connection pragmas and pool metrics.

pub mod error;
pub mod metrics;
pub mod sqlite;
pub mod types;

// Re-export commonly used types
pub use error::{StorageError, StorageResult};
pub use metrics::StorageMetrics;
pub use sqlite::{apply_connection_pragmas, SqliteConnection, SqlitePool, SqlitePoolConfig};
pub use types::{HealthStatus, PoolMetrics};
