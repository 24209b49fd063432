//! Command execution helpers
//!
//! Keeps the command wrappers free of timing and logging boilerplate.

use std::future::Future;
use std::time::Instant;

use policydesk_domain::Result as DomainResult;

use crate::utils::logging::{error_label, log_command_execution};

/// Execute a command, timing it and logging the outcome.
///
/// # Example
///
/// ```rust,ignore
/// pub async fn list_customers(ctx: &AppContext, principal: &Principal) -> DomainResult<Vec<Customer>> {
///     execute_with_metrics("records::list_customers", || async {
///         ctx.bookkeeping.list_customers(principal).await
///     })
///     .await
/// }
/// ```
pub async fn execute_with_metrics<F, Fut, T>(command_name: &str, command_fn: F) -> DomainResult<T>
where
    F: FnOnce() -> Fut,
    Fut: Future<Output = DomainResult<T>>,
{
    let start = Instant::now();

    let result = command_fn().await;

    let error_type = result.as_ref().err().map(error_label);
    log_command_execution(command_name, start.elapsed(), result.is_ok(), error_type);

    result
}

/// Same as [`execute_with_metrics`], with the error flattened to its message
/// for callers that only display it.
pub async fn execute_with_string_error<F, Fut, T>(
    command_name: &str,
    command_fn: F,
) -> Result<T, String>
where
    F: FnOnce() -> Fut,
    Fut: Future<Output = DomainResult<T>>,
{
    execute_with_metrics(command_name, command_fn).await.map_err(|e| e.to_string())
}
