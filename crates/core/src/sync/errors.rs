//! Remote and sync error types
//!
//! Every failed remote round trip is a [`RemoteError`] carrying the backend's
//! error body when there is one. A failed sync pass is a [`SyncError`].

use std::fmt;
use std::time::Duration;

use policydesk_domain::{PolicyDeskError, Table};
use serde::{Deserialize, Serialize};
use thiserror::Error;

/// Postgres unique-violation SQLSTATE, as reported by the backend.
const UNIQUE_VIOLATION_CODE: &str = "23505";

/// Error body returned by the remote backend.
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct BackendPayload {
    #[serde(default)]
    pub code: Option<String>,
    #[serde(default)]
    pub message: String,
    #[serde(default)]
    pub details: Option<String>,
    #[serde(default)]
    pub hint: Option<String>,
}

impl BackendPayload {
    pub fn message(message: impl Into<String>) -> Self {
        Self { message: message.into(), ..Self::default() }
    }
}

impl fmt::Display for BackendPayload {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match &self.code {
            Some(code) => write!(f, "[{code}] {}", self.message)?,
            None => f.write_str(&self.message)?,
        }
        if let Some(details) = &self.details {
            write!(f, " ({details})")?;
        }
        Ok(())
    }
}

/// Categories of remote errors
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum RemoteErrorCategory {
    /// 401/403
    Authentication,
    /// 429
    RateLimit,
    /// 5xx
    Server,
    /// Other 4xx, including not-found and constraint violations
    Client,
    /// Connection failures and timeouts
    Network,
    /// Unusable client configuration or undecodable response
    Config,
}

/// A failed remote round trip.
#[derive(Debug, Clone, Error)]
pub enum RemoteError {
    #[error("remote authentication failed ({status}): {payload}")]
    Auth { status: u16, payload: BackendPayload },

    #[error("remote rate limit exceeded: {payload}")]
    RateLimit { payload: BackendPayload },

    #[error("remote rejected request ({status}): {payload}")]
    Rejected { status: u16, payload: BackendPayload },

    #[error("remote row {table}/{id} not found")]
    NotFound { table: Table, id: String },

    #[error("remote server error ({status}): {payload}")]
    Server { status: u16, payload: BackendPayload },

    #[error("remote unreachable: {0}")]
    Network(String),

    #[error("remote call timed out after {0:?}")]
    Timeout(Duration),

    #[error("remote response could not be decoded: {0}")]
    Decode(String),

    #[error("remote client misconfigured: {0}")]
    Config(String),
}

impl RemoteError {
    pub fn category(&self) -> RemoteErrorCategory {
        match self {
            Self::Auth { .. } => RemoteErrorCategory::Authentication,
            Self::RateLimit { .. } => RemoteErrorCategory::RateLimit,
            Self::Server { .. } => RemoteErrorCategory::Server,
            Self::Rejected { .. } | Self::NotFound { .. } => RemoteErrorCategory::Client,
            Self::Network(_) | Self::Timeout(_) => RemoteErrorCategory::Network,
            Self::Decode(_) | Self::Config(_) => RemoteErrorCategory::Config,
        }
    }

    /// Whether the same call may succeed later without any change.
    pub fn is_transient(&self) -> bool {
        matches!(
            self.category(),
            RemoteErrorCategory::RateLimit
                | RemoteErrorCategory::Server
                | RemoteErrorCategory::Network
        )
    }

    /// The row already exists (unique violation on insert).
    pub fn is_duplicate_key(&self) -> bool {
        match self {
            Self::Rejected { status, payload } => {
                *status == 409 || payload.code.as_deref() == Some(UNIQUE_VIOLATION_CODE)
            }
            _ => false,
        }
    }

    pub fn is_not_found(&self) -> bool {
        matches!(self, Self::NotFound { .. })
    }

    /// Backend error body, when the backend sent one.
    pub fn payload(&self) -> Option<&BackendPayload> {
        match self {
            Self::Auth { payload, .. }
            | Self::RateLimit { payload }
            | Self::Rejected { payload, .. }
            | Self::Server { payload, .. } => Some(payload),
            _ => None,
        }
    }
}

impl From<RemoteError> for PolicyDeskError {
    fn from(err: RemoteError) -> Self {
        match err.category() {
            RemoteErrorCategory::Network => Self::Network(err.to_string()),
            RemoteErrorCategory::Config => Self::Config(err.to_string()),
            _ => Self::Remote(err.to_string()),
        }
    }
}

/// Failure of a sync pass.
#[derive(Debug, Error)]
pub enum SyncError {
    #[error("pull-refresh failed: {0}")]
    Remote(#[from] RemoteError),

    #[error("local store failed: {0}")]
    Local(#[from] PolicyDeskError),

    #[error("sync pass timed out after {0:?}")]
    Timeout(Duration),
}

impl From<SyncError> for PolicyDeskError {
    fn from(err: SyncError) -> Self {
        match err {
            SyncError::Remote(remote) => remote.into(),
            SyncError::Local(local) => local,
            SyncError::Timeout(after) => {
                Self::Network(format!("sync pass timed out after {after:?}"))
            }
        }
    }
}
