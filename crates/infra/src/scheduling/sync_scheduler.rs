//! Periodic and on-demand sync passes.
//!
//! The scheduler owns one background task that calls
//! [`SyncOrchestrator::sync`] every `interval` and whenever [`trigger`] is
//! called (reconnect, user request). Triggers that arrive while a pass is
//! running collapse into a single follow-up pass. A pass that finds another
//! pass running is skipped by the orchestrator itself.
//!
//! [`trigger`]: SyncScheduler::trigger

use std::sync::Arc;
use std::time::{Duration, Instant};

use policydesk_core::{SyncOrchestrator, SyncOutcome};
use policydesk_domain::SyncConfig;
use tokio::sync::{Mutex, Notify};
use tokio::task::JoinHandle;
use tokio::time::MissedTickBehavior;
use tokio_util::sync::CancellationToken;
use tracing::{debug, info, instrument, warn};

use crate::scheduling::error::{SchedulerError, SchedulerResult};

type TaskHandle = Arc<Mutex<Option<JoinHandle<()>>>>;

/// Configuration for [`SyncScheduler`]
#[derive(Debug, Clone)]
pub struct SyncSchedulerConfig {
    pub interval: Duration,
    /// Run a pass as soon as the scheduler starts.
    pub run_on_start: bool,
    /// Upper bound for waiting on the background task in `stop`.
    pub join_timeout: Duration,
}

impl Default for SyncSchedulerConfig {
    fn default() -> Self {
        Self::from(&SyncConfig::default())
    }
}

impl From<&SyncConfig> for SyncSchedulerConfig {
    fn from(config: &SyncConfig) -> Self {
        Self {
            interval: config.interval().max(Duration::from_secs(1)),
            run_on_start: true,
            join_timeout: Duration::from_secs(5),
        }
    }
}

pub struct SyncScheduler {
    orchestrator: Arc<SyncOrchestrator>,
    config: SyncSchedulerConfig,
    wakeup: Arc<Notify>,
    cancellation_token: CancellationToken,
    task_handle: TaskHandle,
}

impl SyncScheduler {
    pub fn new(orchestrator: Arc<SyncOrchestrator>, config: SyncSchedulerConfig) -> Self {
        Self {
            orchestrator,
            config,
            wakeup: Arc::new(Notify::new()),
            cancellation_token: CancellationToken::new(),
            task_handle: Arc::new(Mutex::new(None)),
        }
    }

    /// Spawn the background loop.
    #[instrument(skip(self))]
    pub async fn start(&mut self) -> SchedulerResult<()> {
        if self.is_running() {
            return Err(SchedulerError::AlreadyRunning);
        }

        // Fresh token so the scheduler can be restarted after `stop`.
        self.cancellation_token = CancellationToken::new();

        let orchestrator = Arc::clone(&self.orchestrator);
        let wakeup = Arc::clone(&self.wakeup);
        let config = self.config.clone();
        let cancel = self.cancellation_token.clone();

        let handle = tokio::spawn(async move {
            Self::sync_loop(orchestrator, wakeup, config, cancel).await;
        });
        *self.task_handle.lock().await = Some(handle);

        info!(interval_secs = self.config.interval.as_secs(), "sync scheduler started");
        Ok(())
    }

    /// Cancel the loop and wait (bounded) for it to finish.
    ///
    /// A pass in progress is abandoned at its next await point; the
    /// orchestrator's guard resets its state and a queue drain already under
    /// way finishes on its own task.
    #[instrument(skip(self))]
    pub async fn stop(&mut self) -> SchedulerResult<()> {
        if !self.is_running() {
            return Err(SchedulerError::NotRunning);
        }

        self.cancellation_token.cancel();

        if let Some(handle) = self.task_handle.lock().await.take() {
            let join_timeout = self.config.join_timeout;
            tokio::time::timeout(join_timeout, handle)
                .await
                .map_err(|_| SchedulerError::Timeout(join_timeout))??;
        }

        info!("sync scheduler stopped");
        Ok(())
    }

    /// Request a pass now. Coalesces with other pending requests.
    pub fn trigger(&self) {
        debug!("sync pass requested");
        self.wakeup.notify_one();
    }

    pub fn is_running(&self) -> bool {
        self.task_handle
            .try_lock()
            .ok()
            .and_then(|guard| guard.as_ref().map(|h| !h.is_finished()))
            .unwrap_or(false)
    }

    async fn sync_loop(
        orchestrator: Arc<SyncOrchestrator>,
        wakeup: Arc<Notify>,
        config: SyncSchedulerConfig,
        cancel: CancellationToken,
    ) {
        let first_tick = if config.run_on_start {
            tokio::time::Instant::now()
        } else {
            tokio::time::Instant::now() + config.interval
        };
        let mut ticker = tokio::time::interval_at(first_tick, config.interval);
        ticker.set_missed_tick_behavior(MissedTickBehavior::Delay);

        loop {
            tokio::select! {
                () = cancel.cancelled() => {
                    debug!("sync loop cancelled");
                    break;
                }
                _ = ticker.tick() => {
                    Self::run_pass(&orchestrator, "interval", &cancel).await;
                }
                () = wakeup.notified() => {
                    Self::run_pass(&orchestrator, "trigger", &cancel).await;
                    ticker.reset();
                }
            }
        }
    }

    async fn run_pass(
        orchestrator: &SyncOrchestrator,
        cause: &'static str,
        cancel: &CancellationToken,
    ) {
        let started = Instant::now();
        let outcome = tokio::select! {
            () = cancel.cancelled() => {
                debug!(cause, "sync pass abandoned on shutdown");
                return;
            }
            outcome = orchestrator.sync() => outcome,
        };
        match outcome {
            Ok(SyncOutcome::Completed(report)) => info!(
                cause,
                rows_pulled = report.rows_pulled(),
                duration_ms = u64::try_from(started.elapsed().as_millis()).unwrap_or(u64::MAX),
                "scheduled sync completed"
            ),
            Ok(SyncOutcome::Skipped) => debug!(cause, "sync already running; pass skipped"),
            Err(err) => warn!(cause, error = %err, "scheduled sync failed"),
        }
    }
}

impl Drop for SyncScheduler {
    fn drop(&mut self) {
        if !self.cancellation_token.is_cancelled() && self.is_running() {
            warn!("SyncScheduler dropped while running; cancelling");
        }
        self.cancellation_token.cancel();
    }
}
