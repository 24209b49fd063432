//! Connection pool counters, reported through the pool health check.

use std::sync::atomic::{AtomicU64, Ordering};

use super::types::PoolMetrics;

/// Atomic counters updated on every acquisition attempt
#[derive(Debug, Default)]
pub struct StorageMetrics {
    connections_acquired: AtomicU64,
    connections_timeout: AtomicU64,
    connections_error: AtomicU64,
    total_connection_time_ms: AtomicU64,
}

impl StorageMetrics {
    pub fn new() -> Self {
        Self::default()
    }

    /// Record a successful connection acquisition
    pub fn record_connection_acquired(&self, duration_ms: u64) {
        self.connections_acquired.fetch_add(1, Ordering::Relaxed);
        self.total_connection_time_ms.fetch_add(duration_ms, Ordering::Relaxed);
    }

    pub fn record_connection_timeout(&self) {
        self.connections_timeout.fetch_add(1, Ordering::Relaxed);
    }

    pub fn record_connection_error(&self) {
        self.connections_error.fetch_add(1, Ordering::Relaxed);
    }

    /// Copy the counters into a plain snapshot.
    pub fn snapshot(&self) -> PoolMetrics {
        let acquired = self.connections_acquired.load(Ordering::Relaxed);
        let total_ms = self.total_connection_time_ms.load(Ordering::Relaxed);
        PoolMetrics {
            connections_acquired: acquired,
            connections_timeout: self.connections_timeout.load(Ordering::Relaxed),
            connections_error: self.connections_error.load(Ordering::Relaxed),
            avg_acquisition_time_ms: total_ms.checked_div(acquired).unwrap_or(0),
        }
    }
}
