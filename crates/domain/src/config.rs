//! Configuration management

use std::time::Duration;

use serde::{Deserialize, Serialize};

use crate::constants::{
    DEFAULT_HOOK_TIMEOUT_MS, DEFAULT_QUEUE_MAX_AGE_HOURS, DEFAULT_QUEUE_MAX_ATTEMPTS,
    DEFAULT_REMOTE_SCHEMA, DEFAULT_REMOTE_TIMEOUT_MS, DEFAULT_SYNC_INTERVAL_SECS,
    DEFAULT_SYNC_PASS_TIMEOUT_SECS,
};

/// Application configuration
#[derive(Debug, Clone, Default, Serialize, Deserialize)]
pub struct Config {
    #[serde(default)]
    pub database: DatabaseConfig,
    #[serde(default)]
    pub remote: RemoteConfig,
    #[serde(default)]
    pub sync: SyncConfig,
    #[serde(default)]
    pub queue: QueueConfig,
}

/// Local database configuration
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct DatabaseConfig {
    pub path: String,
    pub pool_size: u32,
}

impl Default for DatabaseConfig {
    fn default() -> Self {
        Self { path: "policydesk.db".to_string(), pool_size: 4 }
    }
}

/// Remote backend configuration
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct RemoteConfig {
    pub base_url: String,
    #[serde(default, skip_serializing)]
    pub api_key: Option<String>,
    #[serde(default = "default_schema")]
    pub schema: String,
    #[serde(default = "default_remote_timeout_ms")]
    pub timeout_ms: u64,
}

impl RemoteConfig {
    pub fn timeout(&self) -> Duration {
        Duration::from_millis(self.timeout_ms)
    }
}

impl Default for RemoteConfig {
    fn default() -> Self {
        Self {
            base_url: "http://localhost:54321".to_string(),
            api_key: None,
            schema: default_schema(),
            timeout_ms: DEFAULT_REMOTE_TIMEOUT_MS,
        }
    }
}

/// Sync orchestration configuration
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct SyncConfig {
    pub enabled: bool,
    pub interval_seconds: u64,
    #[serde(default = "default_pass_timeout_seconds")]
    pub pass_timeout_seconds: u64,
    #[serde(default = "default_hook_timeout_ms")]
    pub hook_timeout_ms: u64,
}

impl SyncConfig {
    pub fn interval(&self) -> Duration {
        Duration::from_secs(self.interval_seconds)
    }

    pub fn pass_timeout(&self) -> Duration {
        Duration::from_secs(self.pass_timeout_seconds)
    }

    pub fn hook_timeout(&self) -> Duration {
        Duration::from_millis(self.hook_timeout_ms)
    }
}

impl Default for SyncConfig {
    fn default() -> Self {
        Self {
            enabled: true,
            interval_seconds: DEFAULT_SYNC_INTERVAL_SECS,
            pass_timeout_seconds: DEFAULT_SYNC_PASS_TIMEOUT_SECS,
            hook_timeout_ms: DEFAULT_HOOK_TIMEOUT_MS,
        }
    }
}

/// Offline queue eviction configuration
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct QueueConfig {
    pub max_attempts: u32,
    pub max_age_hours: u64,
}

impl QueueConfig {
    pub fn max_age(&self) -> chrono::Duration {
        let hours = i64::try_from(self.max_age_hours).unwrap_or(i64::MAX / 3_600);
        chrono::Duration::hours(hours)
    }
}

impl Default for QueueConfig {
    fn default() -> Self {
        Self { max_attempts: DEFAULT_QUEUE_MAX_ATTEMPTS, max_age_hours: DEFAULT_QUEUE_MAX_AGE_HOURS }
    }
}

fn default_schema() -> String {
    DEFAULT_REMOTE_SCHEMA.to_string()
}

const fn default_remote_timeout_ms() -> u64 {
    DEFAULT_REMOTE_TIMEOUT_MS
}

const fn default_pass_timeout_seconds() -> u64 {
    DEFAULT_SYNC_PASS_TIMEOUT_SECS
}

const fn default_hook_timeout_ms() -> u64 {
    DEFAULT_HOOK_TIMEOUT_MS
}
