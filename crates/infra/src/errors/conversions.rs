//! Conversions from external infrastructure errors into domain and remote
//! errors.

use policydesk_core::RemoteError;
use policydesk_domain::PolicyDeskError;
use reqwest::Error as HttpError;
use rusqlite::Error as SqlError;

/// Error newtype that keeps conversions on the infrastructure side and can be
/// converted back into the domain error.
#[derive(Debug)]
pub struct InfraError(pub PolicyDeskError);

impl From<InfraError> for PolicyDeskError {
    fn from(value: InfraError) -> Self {
        value.0
    }
}

impl From<PolicyDeskError> for InfraError {
    fn from(value: PolicyDeskError) -> Self {
        InfraError(value)
    }
}

trait IntoPolicyDeskError {
    fn into_policydesk(self) -> PolicyDeskError;
}

/* -------------------------------------------------------------------------- */
/* rusqlite::Error → PolicyDeskError */
/* -------------------------------------------------------------------------- */

/// SQLITE_CONSTRAINT_PRIMARYKEY
const PRIMARY_KEY_VIOLATION: i32 = 1555;
/// SQLITE_CONSTRAINT_UNIQUE
const UNIQUE_VIOLATION: i32 = 2067;
/// SQLITE_CONSTRAINT_FOREIGNKEY
const FOREIGN_KEY_VIOLATION: i32 = 787;

impl IntoPolicyDeskError for SqlError {
    fn into_policydesk(self) -> PolicyDeskError {
        use rusqlite::ffi::ErrorCode;
        use rusqlite::Error as RE;

        match self {
            RE::SqliteFailure(err, maybe_message) => {
                let message = maybe_message.unwrap_or_default();
                match (err.code, err.extended_code) {
                    (ErrorCode::DatabaseBusy, _) => {
                        PolicyDeskError::Database("database is busy".into())
                    }
                    (ErrorCode::DatabaseLocked, _) => {
                        PolicyDeskError::Database("database is locked".into())
                    }
                    (ErrorCode::ConstraintViolation, PRIMARY_KEY_VIOLATION | UNIQUE_VIOLATION) => {
                        PolicyDeskError::Conflict(format!("unique constraint violation: {message}"))
                    }
                    (ErrorCode::ConstraintViolation, FOREIGN_KEY_VIOLATION) => {
                        PolicyDeskError::Database("foreign key constraint violation".into())
                    }
                    _ => PolicyDeskError::Database(format!(
                        "sqlite failure {:?} (code {}): {}",
                        err.code, err.extended_code, message
                    )),
                }
            }
            RE::QueryReturnedNoRows => {
                PolicyDeskError::NotFound("no rows returned by query".into())
            }
            RE::FromSqlConversionFailure(_, _, cause) => {
                PolicyDeskError::Database(format!("failed to convert sqlite value: {cause}"))
            }
            RE::InvalidColumnType(_, _, ty) => {
                PolicyDeskError::Database(format!("invalid column type: {ty}"))
            }
            RE::InvalidPath(path) => PolicyDeskError::Database(format!(
                "invalid database path: {}",
                path.to_string_lossy()
            )),
            other => PolicyDeskError::Database(other.to_string()),
        }
    }
}

impl From<SqlError> for InfraError {
    fn from(value: SqlError) -> Self {
        InfraError(value.into_policydesk())
    }
}

/* -------------------------------------------------------------------------- */
/* reqwest::Error → PolicyDeskError / RemoteError */
/* -------------------------------------------------------------------------- */

impl IntoPolicyDeskError for HttpError {
    fn into_policydesk(self) -> PolicyDeskError {
        if self.is_builder() {
            return PolicyDeskError::Config(format!("invalid HTTP client setup: {self}"));
        }
        http_to_remote(self).into()
    }
}

impl From<HttpError> for InfraError {
    fn from(value: HttpError) -> Self {
        InfraError(value.into_policydesk())
    }
}

/// Classify a transport-level reqwest failure as a remote error.
///
/// Responses with an error status are classified from the response body
/// instead, see `sync::rest_client`.
pub fn http_to_remote(err: HttpError) -> RemoteError {
    if err.is_timeout() {
        return RemoteError::Network(format!("request timed out: {err}"));
    }
    if err.is_connect() {
        return RemoteError::Network(format!("connection failed: {err}"));
    }
    if err.is_decode() {
        return RemoteError::Decode(err.to_string());
    }
    if err.is_builder() {
        return RemoteError::Config(err.to_string());
    }
    RemoteError::Network(err.to_string())
}

/* -------------------------------------------------------------------------- */
/* Tests */
/* -------------------------------------------------------------------------- */
