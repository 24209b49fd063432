use std::io::IsTerminal;
use std::sync::Once;
use std::time::Duration;

use policydesk_domain::PolicyDeskError;
use tracing::{info, warn};
use tracing_subscriber::EnvFilter;

/// Log filter, falls back to `RUST_LOG` and then to `info`.
pub const LOG_ENV_VAR: &str = "POLICYDESK_LOG";
/// `json` switches the subscriber to JSON lines.
pub const LOG_FORMAT_ENV_VAR: &str = "POLICYDESK_LOG_FORMAT";

/// Install the global tracing subscriber. Safe to call more than once.
pub fn init_tracing() {
    static INIT: Once = Once::new();
    INIT.call_once(|| {
        let filter = std::env::var(LOG_ENV_VAR)
            .ok()
            .and_then(|directives| EnvFilter::try_new(directives).ok())
            .or_else(|| EnvFilter::try_from_default_env().ok())
            .unwrap_or_else(|| EnvFilter::new("info"));

        let json = std::env::var(LOG_FORMAT_ENV_VAR)
            .map(|format| format.eq_ignore_ascii_case("json"))
            .unwrap_or(false);

        let builder = tracing_subscriber::fmt()
            .with_env_filter(filter)
            .with_writer(std::io::stderr)
            .with_ansi(std::io::stderr().is_terminal());

        // try_init: tests may already have installed a subscriber.
        let _ = if json { builder.json().try_init() } else { builder.try_init() };
    });
}

/// Log the outcome of a command execution with structured fields.
///
/// Callers must avoid forwarding sensitive values in `command`.
#[inline]
pub fn log_command_execution(
    command: &str,
    elapsed: Duration,
    success: bool,
    error_type: Option<&str>,
) {
    let duration_ms = elapsed.as_millis() as u64;

    if success {
        info!(command, duration_ms, "command_execution_success");
    } else {
        warn!(command, duration_ms, error_type, "command_execution_failure");
    }
}

/// Stable label for an error, suitable for log fields.
#[inline]
pub fn error_label(error: &PolicyDeskError) -> &'static str {
    error.label()
}
