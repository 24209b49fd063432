//! PolicyDesk - local-first policy bookkeeping
//!
//! Main entry point. `policydesk` runs the background sync service until
//! Ctrl-C; `policydesk sync`, `status` and `health` run once and print JSON.

use anyhow::{bail, Context};
use policydesk_api::utils::logging::init_tracing;
use policydesk_api::{commands, AppContext};
use serde::Serialize;
use tracing::{info, warn};

#[tokio::main]
async fn main() -> anyhow::Result<()> {
    // .env first so POLICYDESK_LOG applies to the subscriber.
    let dotenv = dotenvy::dotenv();
    init_tracing();
    match dotenv {
        Ok(path) => info!(path = %path.display(), "loaded .env"),
        Err(err) => tracing::debug!(error = %err, "no .env file loaded"),
    }

    let config = policydesk_infra::config::load().context("failed to load configuration")?;
    let ctx = AppContext::new(config).await.context("failed to initialise application")?;

    let command = std::env::args().nth(1).unwrap_or_else(|| "run".to_string());
    let result = match command.as_str() {
        "run" => run_service(&ctx).await,
        "sync" => commands::sync_now(&ctx).await.map_err(anyhow::Error::from).and_then(|o| print_json(&o)),
        "status" => {
            commands::sync_status(&ctx).await.map_err(anyhow::Error::from).and_then(|s| print_json(&s))
        }
        "health" => print_json(&commands::get_app_health(&ctx).await),
        other => Err(anyhow::anyhow!("unknown command '{other}' (expected run, sync, status or health)")),
    };

    ctx.shutdown().await.context("shutdown failed")?;
    result
}

async fn run_service(ctx: &AppContext) -> anyhow::Result<()> {
    if !ctx.config.sync.enabled {
        bail!("sync is disabled; nothing to run (set POLICYDESK_SYNC_ENABLED=true)");
    }
    ctx.start_background().await?;
    info!("PolicyDesk sync service running; press Ctrl-C to stop");

    if let Err(err) = tokio::signal::ctrl_c().await {
        warn!(error = %err, "failed to listen for Ctrl-C; stopping");
    }
    info!("stopping");
    Ok(())
}

#[allow(clippy::print_stdout)]
fn print_json<T: Serialize>(value: &T) -> anyhow::Result<()> {
    println!("{}", serde_json::to_string_pretty(value)?);
    Ok(())
}
