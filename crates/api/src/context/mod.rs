//! Application context - dependency injection container

use std::sync::Arc;
use std::time::Duration;

use policydesk_core::{
    BookkeepingService, LocalStore, OfflineQueue, QueuePolicy, RemoteStore, ReplicationHook,
    SyncEvents, SyncOrchestrator,
};
use policydesk_domain::{Config, PolicyDeskError, Result, Table};
use policydesk_infra::{
    DbManager, RestRemoteStore, SqliteQueueStorage, SqliteRecordStore, SyncScheduler,
    SyncSchedulerConfig,
};
use tokio::sync::Mutex;
use tracing::{debug, error, info, warn};

use crate::utils::health::{ComponentHealth, HealthStatus};

const SCHEDULER_START_TIMEOUT: Duration = Duration::from_secs(10);

/// Application context - holds all services and dependencies
pub struct AppContext {
    pub config: Config,
    pub db: Arc<DbManager>,
    pub local: Arc<LocalStore>,
    pub remote: Arc<dyn RemoteStore>,
    pub queue: Arc<OfflineQueue>,
    pub events: SyncEvents,
    pub orchestrator: Arc<SyncOrchestrator>,
    pub bookkeeping: Arc<BookkeepingService>,

    /// `None` when periodic sync is disabled in the configuration.
    sync_scheduler: Mutex<Option<SyncScheduler>>,
}

impl AppContext {
    /// Build the context against the configured remote store.
    pub async fn new(config: Config) -> Result<Self> {
        let remote: Arc<dyn RemoteStore> = Arc::new(RestRemoteStore::new(&config.remote)?);
        Self::with_remote(config, remote).await
    }

    /// Build the context with a caller-supplied remote store.
    ///
    /// Opens the database, wires the replication hook onto every table and
    /// prepares (but does not start) the sync scheduler.
    pub async fn with_remote(config: Config, remote: Arc<dyn RemoteStore>) -> Result<Self> {
        policydesk_infra::config::validate(&config)?;

        let db_config = config.database.clone();
        let db = tokio::task::spawn_blocking(move || DbManager::open(&db_config))
            .await
            .map_err(|err| PolicyDeskError::Internal(format!("database open task failed: {err}")))??;
        let db = Arc::new(db);

        let local = Arc::new(LocalStore::new(Arc::new(SqliteRecordStore::new(Arc::clone(&db)))));
        let events = SyncEvents::default();

        let queue = Arc::new(
            OfflineQueue::new(
                Arc::new(SqliteQueueStorage::new(Arc::clone(&db))),
                Arc::clone(&remote),
                events.clone(),
            )
            .with_policy(QueuePolicy::from(&config.queue))
            .with_call_timeout(config.sync.hook_timeout()),
        );

        let hook = ReplicationHook::new(Arc::clone(&remote), Arc::clone(&queue), events.clone())
            .with_call_timeout(config.sync.hook_timeout());
        Arc::new(hook).install(local.hooks(), &Table::ALL);

        let orchestrator = Arc::new(
            SyncOrchestrator::new(
                Arc::clone(&local),
                Arc::clone(&remote),
                Arc::clone(&queue),
                events.clone(),
            )
            .with_pass_timeout(config.sync.pass_timeout()),
        );

        let bookkeeping = Arc::new(BookkeepingService::new(Arc::clone(&local)));

        let sync_scheduler = config.sync.enabled.then(|| {
            SyncScheduler::new(Arc::clone(&orchestrator), SyncSchedulerConfig::from(&config.sync))
        });

        let pending = queue.len().await?;
        info!(
            db_path = %db.path().display(),
            pending_mutations = pending,
            sync_enabled = config.sync.enabled,
            "application context initialised"
        );

        Ok(Self {
            config,
            db,
            local,
            remote,
            queue,
            events,
            orchestrator,
            bookkeeping,
            sync_scheduler: Mutex::new(sync_scheduler),
        })
    }

    /// Start the periodic sync loop, if enabled.
    pub async fn start_background(&self) -> Result<()> {
        let mut guard = self.sync_scheduler.lock().await;
        let Some(scheduler) = guard.as_mut() else {
            debug!("sync disabled; no scheduler to start");
            return Ok(());
        };

        tokio::time::timeout(SCHEDULER_START_TIMEOUT, scheduler.start())
            .await
            .map_err(|_| {
                error!(timeout_secs = SCHEDULER_START_TIMEOUT.as_secs(), "SyncScheduler start timed out");
                PolicyDeskError::Internal("SyncScheduler start timed out".into())
            })?
            .map_err(|err| {
                error!(error = %err, "failed to start SyncScheduler");
                PolicyDeskError::from(err)
            })
    }

    /// Ask the scheduler for an immediate pass (e.g. after reconnecting).
    ///
    /// Returns `false` when no scheduler is running.
    pub async fn trigger_sync(&self) -> bool {
        match self.sync_scheduler.lock().await.as_ref() {
            Some(scheduler) if scheduler.is_running() => {
                scheduler.trigger();
                true
            }
            _ => false,
        }
    }

    pub async fn scheduler_running(&self) -> bool {
        self.sync_scheduler.lock().await.as_ref().is_some_and(SyncScheduler::is_running)
    }

    /// Stop the scheduler and wait for in-flight replication to settle.
    pub async fn shutdown(&self) -> Result<()> {
        if let Some(scheduler) = self.sync_scheduler.lock().await.as_mut() {
            if scheduler.is_running() {
                scheduler.stop().await?;
            }
        }

        self.local.flush_hooks().await;

        let pending = self.queue.len().await?;
        if pending > 0 {
            warn!(pending_mutations = pending, "shutting down with unsynced mutations queued");
        }
        info!("application context shut down");
        Ok(())
    }

    /// Component health: database pool, remote reachability and queue depth.
    pub async fn health_check(&self) -> HealthStatus {
        let mut status = HealthStatus::new()
            .add_component(self.check_database_health().await)
            .add_component(self.check_remote_health().await)
            .add_component(self.check_queue_health().await);

        status.calculate_score();
        status
    }

    async fn check_database_health(&self) -> ComponentHealth {
        let db = Arc::clone(&self.db);
        match tokio::task::spawn_blocking(move || db.health_check()).await {
            Ok(Ok(pool)) => ComponentHealth::healthy_with(
                "database",
                format!(
                    "{}/{} connections open, {} acquired, {} timeouts, {} errors, avg wait {}ms",
                    pool.active_connections,
                    pool.max_connections,
                    pool.metrics.connections_acquired,
                    pool.metrics.connections_timeout,
                    pool.metrics.connections_error,
                    pool.metrics.avg_acquisition_time_ms,
                ),
            ),
            Ok(Err(err)) => ComponentHealth::unhealthy("database", err.to_string()),
            Err(err) => ComponentHealth::unhealthy("database", format!("health task failed: {err}")),
        }
    }

    async fn check_remote_health(&self) -> ComponentHealth {
        match self.remote.ping().await {
            Ok(()) => ComponentHealth::healthy("remote_store"),
            Err(err) => ComponentHealth::unhealthy("remote_store", err.to_string()),
        }
    }

    async fn check_queue_health(&self) -> ComponentHealth {
        let (pending, dead) = match (self.queue.len().await, self.queue.dead_letters().await) {
            (Ok(pending), Ok(dead)) => (pending, dead.len()),
            (Err(err), _) | (_, Err(err)) => {
                return ComponentHealth::unhealthy("offline_queue", err.to_string())
            }
        };

        let message = format!("{pending} pending, {dead} dead-lettered");
        if dead > 0 {
            ComponentHealth::unhealthy("offline_queue", message)
        } else {
            ComponentHealth::healthy_with("offline_queue", message)
        }
    }
}
