//! Configuration loader
//!
//! Environment variables win; when the required ones are missing the loader
//! falls back to the first config file it can find.
//!
//! ## Environment Variables
//! Required:
//! - `POLICYDESK_DB_PATH`: local database file
//! - `POLICYDESK_REMOTE_URL`: remote backend base URL
//!
//! Optional (defaults from `policydesk_domain::constants`):
//! - `POLICYDESK_DB_POOL_SIZE`
//! - `POLICYDESK_REMOTE_API_KEY`
//! - `POLICYDESK_REMOTE_TIMEOUT_MS`
//! - `POLICYDESK_SYNC_ENABLED` (`1`/`true`/`yes`/`on`)
//! - `POLICYDESK_SYNC_INTERVAL` (seconds)
//! - `POLICYDESK_QUEUE_MAX_ATTEMPTS` (`0` disables the attempt limit)
//! - `POLICYDESK_QUEUE_MAX_AGE_HOURS`
//!
//! ## File Locations
//! `config.{json,toml}` then `policydesk.{json,toml}`, looked up in the
//! working directory, its two parents and next to the executable. The API key
//! is usually kept out of the file; `POLICYDESK_REMOTE_API_KEY` fills it in.

use std::path::{Path, PathBuf};
use std::str::FromStr;

use policydesk_domain::{Config, DatabaseConfig, PolicyDeskError, QueueConfig, RemoteConfig, Result, SyncConfig};

const ENV_DB_PATH: &str = "POLICYDESK_DB_PATH";
const ENV_DB_POOL_SIZE: &str = "POLICYDESK_DB_POOL_SIZE";
const ENV_REMOTE_URL: &str = "POLICYDESK_REMOTE_URL";
const ENV_REMOTE_API_KEY: &str = "POLICYDESK_REMOTE_API_KEY";
const ENV_REMOTE_TIMEOUT_MS: &str = "POLICYDESK_REMOTE_TIMEOUT_MS";
const ENV_SYNC_ENABLED: &str = "POLICYDESK_SYNC_ENABLED";
const ENV_SYNC_INTERVAL: &str = "POLICYDESK_SYNC_INTERVAL";
const ENV_QUEUE_MAX_ATTEMPTS: &str = "POLICYDESK_QUEUE_MAX_ATTEMPTS";
const ENV_QUEUE_MAX_AGE_HOURS: &str = "POLICYDESK_QUEUE_MAX_AGE_HOURS";

const FILE_STEMS: [&str; 2] = ["config", "policydesk"];
const FILE_EXTENSIONS: [&str; 2] = ["json", "toml"];

/// Load configuration, environment first, then file.
///
/// # Errors
/// Returns `PolicyDeskError::Config` when neither source yields a valid
/// configuration.
pub fn load() -> Result<Config> {
    let config = match load_from_env() {
        Ok(config) => {
            tracing::info!("configuration loaded from environment variables");
            config
        }
        Err(err) => {
            tracing::debug!(error = %err, "environment incomplete, trying config file");
            let mut config = load_from_file(None)?;
            if config.remote.api_key.is_none() {
                config.remote.api_key = non_empty_env(ENV_REMOTE_API_KEY);
            }
            config
        }
    };

    validate(&config)?;
    Ok(config)
}

/// Load configuration from `POLICYDESK_*` environment variables.
pub fn load_from_env() -> Result<Config> {
    let database = DatabaseConfig {
        path: env_var(ENV_DB_PATH)?,
        pool_size: env_parse(ENV_DB_POOL_SIZE)?.unwrap_or(DatabaseConfig::default().pool_size),
    };

    let remote_defaults = RemoteConfig::default();
    let remote = RemoteConfig {
        base_url: env_var(ENV_REMOTE_URL)?,
        api_key: non_empty_env(ENV_REMOTE_API_KEY),
        schema: remote_defaults.schema,
        timeout_ms: env_parse(ENV_REMOTE_TIMEOUT_MS)?.unwrap_or(remote_defaults.timeout_ms),
    };

    let sync_defaults = SyncConfig::default();
    let sync = SyncConfig {
        enabled: env_bool(ENV_SYNC_ENABLED, sync_defaults.enabled),
        interval_seconds: env_parse(ENV_SYNC_INTERVAL)?.unwrap_or(sync_defaults.interval_seconds),
        ..sync_defaults
    };

    let queue_defaults = QueueConfig::default();
    let queue = QueueConfig {
        max_attempts: env_parse(ENV_QUEUE_MAX_ATTEMPTS)?.unwrap_or(queue_defaults.max_attempts),
        max_age_hours: env_parse(ENV_QUEUE_MAX_AGE_HOURS)?.unwrap_or(queue_defaults.max_age_hours),
    };

    Ok(Config { database, remote, sync, queue })
}

/// Load configuration from a file, probing the standard locations when
/// `path` is `None`. The format follows the extension (`.json` / `.toml`).
pub fn load_from_file(path: Option<PathBuf>) -> Result<Config> {
    let config_path = match path {
        Some(p) if p.exists() => p,
        Some(p) => {
            return Err(PolicyDeskError::Config(format!("config file not found: {}", p.display())))
        }
        None => probe_config_paths().ok_or_else(|| {
            PolicyDeskError::Config("no config file found in any standard location".to_string())
        })?,
    };

    tracing::info!(path = %config_path.display(), "loading configuration from file");

    let contents = std::fs::read_to_string(&config_path)
        .map_err(|e| PolicyDeskError::Config(format!("failed to read config file: {e}")))?;

    parse_config(&contents, &config_path)
}

fn parse_config(contents: &str, path: &Path) -> Result<Config> {
    let extension = path.extension().and_then(|e| e.to_str()).unwrap_or("json");

    match extension {
        "toml" => toml::from_str(contents)
            .map_err(|e| PolicyDeskError::Config(format!("invalid TOML config: {e}"))),
        "json" => serde_json::from_str(contents)
            .map_err(|e| PolicyDeskError::Config(format!("invalid JSON config: {e}"))),
        other => Err(PolicyDeskError::Config(format!("unsupported config format: {other}"))),
    }
}

/// Reject values that would make the runtime misbehave rather than fail.
pub fn validate(config: &Config) -> Result<()> {
    if config.database.path.trim().is_empty() {
        return Err(PolicyDeskError::Config("database.path must not be empty".into()));
    }
    if config.database.pool_size == 0 {
        return Err(PolicyDeskError::Config("database.pool_size must be at least 1".into()));
    }
    if config.remote.base_url.trim().is_empty() {
        return Err(PolicyDeskError::Config("remote.base_url must not be empty".into()));
    }
    if config.remote.timeout_ms == 0 {
        return Err(PolicyDeskError::Config("remote.timeout_ms must be positive".into()));
    }
    if config.sync.enabled && config.sync.interval_seconds == 0 {
        return Err(PolicyDeskError::Config("sync.interval_seconds must be positive".into()));
    }
    Ok(())
}

/// First existing config file among the standard locations.
pub fn probe_config_paths() -> Option<PathBuf> {
    let mut roots = Vec::new();

    if let Ok(cwd) = std::env::current_dir() {
        roots.extend(cwd.ancestors().take(3).map(Path::to_path_buf));
    }

    if let Some(exe_dir) = std::env::current_exe().ok().and_then(|exe| exe.parent().map(Path::to_path_buf)) {
        roots.push(exe_dir);
    }

    roots
        .iter()
        .flat_map(|root| {
            FILE_STEMS.iter().flat_map(move |stem| {
                FILE_EXTENSIONS.iter().map(move |ext| root.join(format!("{stem}.{ext}")))
            })
        })
        .find(|path| path.exists())
}

fn env_var(key: &str) -> Result<String> {
    std::env::var(key)
        .map_err(|_| PolicyDeskError::Config(format!("missing required environment variable: {key}")))
}

fn non_empty_env(key: &str) -> Option<String> {
    std::env::var(key).ok().filter(|value| !value.trim().is_empty())
}

/// Parse an optional variable; set-but-invalid is an error.
fn env_parse<T>(key: &str) -> Result<Option<T>>
where
    T: FromStr,
    T::Err: std::fmt::Display,
{
    match non_empty_env(key) {
        None => Ok(None),
        Some(raw) => raw
            .trim()
            .parse::<T>()
            .map(Some)
            .map_err(|e| PolicyDeskError::Config(format!("invalid value for {key}: {e}"))),
    }
}

/// Accepts `1`/`0`, `true`/`false`, `yes`/`no`, `on`/`off` (case-insensitive).
fn env_bool(key: &str, default: bool) -> bool {
    std::env::var(key)
        .ok()
        .map(|s| matches!(s.trim().to_ascii_lowercase().as_str(), "1" | "true" | "yes" | "on"))
        .unwrap_or(default)
}
