//! Scheduler error types

use std::time::Duration;

use policydesk_domain::PolicyDeskError;
use thiserror::Error;

use crate::errors::InfraError;

/// Scheduler lifecycle errors
#[derive(Debug, Error)]
pub enum SchedulerError {
    #[error("scheduler already running")]
    AlreadyRunning,

    #[error("scheduler not running")]
    NotRunning,

    /// The background task did not finish within the join bound.
    #[error("scheduler did not stop within {0:?}")]
    Timeout(Duration),

    #[error("scheduler task join failed: {0}")]
    TaskJoinFailed(String),
}

impl From<SchedulerError> for InfraError {
    fn from(err: SchedulerError) -> Self {
        let domain_err = match err {
            SchedulerError::AlreadyRunning | SchedulerError::NotRunning => {
                PolicyDeskError::InvalidInput(err.to_string())
            }
            _ => PolicyDeskError::Internal(err.to_string()),
        };
        InfraError(domain_err)
    }
}

impl From<SchedulerError> for PolicyDeskError {
    fn from(err: SchedulerError) -> Self {
        InfraError::from(err).into()
    }
}

impl From<tokio::task::JoinError> for SchedulerError {
    fn from(err: tokio::task::JoinError) -> Self {
        Self::TaskJoinFailed(err.to_string())
    }
}

pub type SchedulerResult<T> = Result<T, SchedulerError>;
