//! Health check command for status displays

use crate::context::AppContext;
use crate::utils::health::HealthStatus;

/// Get application health status
///
/// # Example Response
/// ```json
/// {
///   "is_healthy": true,
///   "score": 1.0,
///   "message": null,
///   "components": [
///     { "name": "database", "is_healthy": true, "message": "1/8 connections open, 42 acquired, 0 timeouts, 0 errors, avg wait 0ms" },
///     { "name": "remote_store", "is_healthy": true, "message": null },
///     { "name": "offline_queue", "is_healthy": true, "message": "0 pending, 0 dead-lettered" }
///   ],
///   "timestamp": 1698765432
/// }
/// ```
pub async fn get_app_health(context: &AppContext) -> HealthStatus {
    context.health_check().await
}
