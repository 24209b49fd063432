//! Local store facade: storage plus ordered hook dispatch.
//!
//! Every successful create/update/delete commits to the [`RecordStore`] first
//! and then hands a [`MutationEvent`] to a single dispatcher task. The caller
//! never waits for hooks, and hooks observe events in mutation order.

use std::panic::AssertUnwindSafe;
use std::sync::Arc;

use futures::FutureExt;
use policydesk_domain::{Record, Result, Table};
use serde_json::Value;
use tokio::sync::{mpsc, oneshot};
use tracing::{debug, error, instrument, warn};

use super::hooks::{HookRegistry, MutationEvent, MutationHook};
use super::ports::{RecordStore, TableSnapshot};
use super::validation::{validate_changes, validate_record};

enum Dispatch {
    Event { event: MutationEvent, hooks: Vec<Arc<dyn MutationHook>> },
    Flush(oneshot::Sender<()>),
}

/// The application's source of truth for rendering.
pub struct LocalStore {
    store: Arc<dyn RecordStore>,
    hooks: Arc<HookRegistry>,
    dispatch_tx: mpsc::UnboundedSender<Dispatch>,
}

impl LocalStore {
    /// Wrap `store` with an empty hook registry.
    ///
    /// Spawns the hook dispatcher, so this must run inside a Tokio runtime.
    pub fn new(store: Arc<dyn RecordStore>) -> Self {
        Self::with_registry(store, Arc::new(HookRegistry::new()))
    }

    /// Wrap `store` around an existing hook registry.
    pub fn with_registry(store: Arc<dyn RecordStore>, hooks: Arc<HookRegistry>) -> Self {
        let (dispatch_tx, dispatch_rx) = mpsc::unbounded_channel();
        tokio::spawn(run_dispatcher(dispatch_rx));
        Self { store, hooks, dispatch_tx }
    }

    /// Registry that mutation hooks are installed into.
    pub fn hooks(&self) -> &Arc<HookRegistry> {
        &self.hooks
    }

    /// Underlying table storage, bypassing hooks.
    pub fn records(&self) -> &Arc<dyn RecordStore> {
        &self.store
    }

    /// Insert a new record. Hooks see it as `Creating`.
    #[instrument(skip(self, record), fields(table = %table))]
    pub async fn insert(&self, table: Table, record: Record) -> Result<Record> {
        validate_record(table, &record)?;
        self.store.insert(table, record.clone()).await?;
        debug!("local insert committed");
        self.dispatch(MutationEvent::Creating { table, record: record.clone() });
        Ok(record)
    }

    /// Apply a partial update and return the merged record.
    #[instrument(skip(self, changes), fields(table = %table))]
    pub async fn update(&self, table: Table, id: &str, changes: Record) -> Result<Record> {
        validate_changes(table, &changes)?;
        let merged = self.store.update(table, id, changes.clone()).await?;
        debug!("local update committed");
        self.dispatch(MutationEvent::Updating { table, id: id.to_string(), changes });
        Ok(merged)
    }

    /// Delete by id. Deleting a missing id is not an error and raises no hook.
    #[instrument(skip(self), fields(table = %table))]
    pub async fn delete(&self, table: Table, id: &str) -> Result<bool> {
        let existed = self.store.delete(table, id).await?;
        if existed {
            debug!("local delete committed");
            self.dispatch(MutationEvent::Deleting { table, id: id.to_string() });
        }
        Ok(existed)
    }

    /// Point lookup by id.
    pub async fn get(&self, table: Table, id: &str) -> Result<Option<Record>> {
        self.store.get(table, id).await
    }

    /// Every record of `table`.
    pub async fn all(&self, table: Table) -> Result<Vec<Record>> {
        self.store.all(table).await
    }

    /// Records whose `field` equals `value`.
    pub async fn find_by(&self, table: Table, field: &str, value: &Value) -> Result<Vec<Record>> {
        self.store.find_by(table, field, value).await
    }

    /// Number of records in `table`.
    pub async fn count(&self, table: Table) -> Result<usize> {
        self.store.count(table).await
    }

    /// Overwrite tables from a remote snapshot. Raises no hooks.
    pub async fn replace_all(&self, snapshot: TableSnapshot) -> Result<()> {
        self.store.replace_all(snapshot).await
    }

    /// Wait until every event raised so far has been handled by its hooks.
    pub async fn flush_hooks(&self) {
        let (done_tx, done_rx) = oneshot::channel();
        if self.dispatch_tx.send(Dispatch::Flush(done_tx)).is_ok() {
            let _ = done_rx.await;
        }
    }

    fn dispatch(&self, event: MutationEvent) {
        let hooks = self.hooks.hooks_for(event.table(), event.kind());
        if hooks.is_empty() {
            return;
        }
        if self.dispatch_tx.send(Dispatch::Event { event, hooks }).is_err() {
            warn!("hook dispatcher has stopped; mutation event dropped");
        }
    }
}

async fn run_dispatcher(mut dispatch_rx: mpsc::UnboundedReceiver<Dispatch>) {
    while let Some(message) = dispatch_rx.recv().await {
        match message {
            Dispatch::Event { event, hooks } => {
                for hook in hooks {
                    let outcome = AssertUnwindSafe(hook.on_mutation(&event)).catch_unwind().await;
                    if outcome.is_err() {
                        error!(
                            table = %event.table(),
                            kind = %event.kind(),
                            "mutation hook panicked"
                        );
                    }
                }
            }
            Dispatch::Flush(done) => {
                let _ = done.send(());
            }
        }
    }
    debug!("hook dispatcher stopped");
}
