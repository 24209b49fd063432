//! Sync and offline-queue commands.

use policydesk_core::{PushReport, SyncOutcome, SyncReport, SyncStats};
use policydesk_domain::{DeadLetter, QueuedMutation, Result as DomainResult, SyncState};
use serde::Serialize;
use uuid::Uuid;

use crate::context::AppContext;
use crate::utils::command_helpers::execute_with_metrics;

/// Snapshot of the sync layer for status displays.
#[derive(Debug, Clone, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct SyncStatus {
    pub state: SyncState,
    pub scheduler_running: bool,
    pub pending_mutations: usize,
    pub dead_letters: usize,
    pub last_report: Option<SyncReport>,
    pub stats: SyncStats,
}

/// Run a sync pass now and wait for it.
pub async fn sync_now(ctx: &AppContext) -> DomainResult<SyncOutcome> {
    execute_with_metrics("sync::sync_now", || async {
        ctx.orchestrator.sync().await.map_err(Into::into)
    })
    .await
}

/// Ask the background scheduler for a pass without waiting for it.
///
/// Returns `false` when periodic sync is disabled or stopped.
pub async fn request_sync(ctx: &AppContext) -> DomainResult<bool> {
    execute_with_metrics("sync::request_sync", || async { Ok(ctx.trigger_sync().await) }).await
}

pub async fn sync_status(ctx: &AppContext) -> DomainResult<SyncStatus> {
    execute_with_metrics("sync::sync_status", || async {
        Ok(SyncStatus {
            state: ctx.orchestrator.state(),
            scheduler_running: ctx.scheduler_running().await,
            pending_mutations: ctx.queue.len().await?,
            dead_letters: ctx.queue.dead_letters().await?.len(),
            last_report: ctx.orchestrator.last_report(),
            stats: ctx.events.stats(),
        })
    })
    .await
}

/// Live queue contents in replay order.
pub async fn pending_mutations(ctx: &AppContext) -> DomainResult<Vec<QueuedMutation>> {
    execute_with_metrics("sync::pending_mutations", || async { ctx.queue.entries().await }).await
}

pub async fn dead_letters(ctx: &AppContext) -> DomainResult<Vec<DeadLetter>> {
    execute_with_metrics("sync::dead_letters", || async { ctx.queue.dead_letters().await }).await
}

/// Move a dead-lettered mutation back onto the live queue.
pub async fn requeue_dead_letter(ctx: &AppContext, entry_id: Uuid) -> DomainResult<bool> {
    execute_with_metrics("sync::requeue_dead_letter", || async {
        ctx.queue.requeue_dead_letter(entry_id).await
    })
    .await
}

/// Seed an empty remote store from local data. `None` if a pass is running.
pub async fn push_local_snapshot(ctx: &AppContext) -> DomainResult<Option<PushReport>> {
    execute_with_metrics("sync::push_local_snapshot", || async {
        ctx.orchestrator.push_local_snapshot().await.map_err(Into::into)
    })
    .await
}
