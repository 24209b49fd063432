//! Application constants
//!
//! Centralized location for domain-level constants used throughout the
//! application.

// Renewal tracking
pub const UPCOMING_RENEWAL_WINDOW_DAYS: i64 = 30;
pub const RENEWAL_CRITICAL_DAYS: i64 = 7;
pub const RENEWAL_WARNING_DAYS: i64 = 15;

// Offline queue eviction
pub const DEFAULT_QUEUE_MAX_ATTEMPTS: u32 = 10;
pub const DEFAULT_QUEUE_MAX_AGE_HOURS: u64 = 168;
pub const MAX_FAILURE_REASON_LENGTH: usize = 512;

// Sync timing
pub const DEFAULT_SYNC_INTERVAL_SECS: u64 = 300;
pub const DEFAULT_SYNC_PASS_TIMEOUT_SECS: u64 = 120;
pub const DEFAULT_HOOK_TIMEOUT_MS: u64 = 10_000;
pub const DEFAULT_REMOTE_TIMEOUT_MS: u64 = 15_000;

// Event channel
pub const SYNC_EVENT_CHANNEL_CAPACITY: usize = 256;

// Remote backend
pub const DEFAULT_REMOTE_SCHEMA: &str = "public";
pub const REMOTE_REST_PATH: &str = "rest/v1";
