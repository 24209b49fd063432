//! Mutation hooks raised by the local store.
//!
//! Observers register per table and per mutation kind. The local store
//! dispatches events after the local write has committed; hooks cannot fail
//! the mutation that raised them.

use std::collections::HashMap;
use std::sync::Arc;

use async_trait::async_trait;
use parking_lot::RwLock;
use policydesk_domain::{MutationKind, Record, Table};

/// A committed local mutation.
#[derive(Debug, Clone, PartialEq)]
pub enum MutationEvent {
    /// Full record as inserted.
    Creating { table: Table, record: Record },
    /// Only the fields present in the update.
    Updating { table: Table, id: String, changes: Record },
    /// Id of the deleted record.
    Deleting { table: Table, id: String },
}

impl MutationEvent {
    pub fn table(&self) -> Table {
        match self {
            Self::Creating { table, .. }
            | Self::Updating { table, .. }
            | Self::Deleting { table, .. } => *table,
        }
    }

    pub fn kind(&self) -> MutationKind {
        match self {
            Self::Creating { .. } => MutationKind::Creating,
            Self::Updating { .. } => MutationKind::Updating,
            Self::Deleting { .. } => MutationKind::Deleting,
        }
    }

    /// Id of the mutated record, if the inserted record carries one.
    pub fn record_id(&self) -> Option<&str> {
        match self {
            Self::Creating { record, .. } => record.get("id").and_then(|v| v.as_str()),
            Self::Updating { id, .. } | Self::Deleting { id, .. } => Some(id),
        }
    }
}

/// Observer of local mutations.
#[async_trait]
pub trait MutationHook: Send + Sync {
    /// Handle one event. Failures must be handled inside the hook.
    async fn on_mutation(&self, event: &MutationEvent);
}

/// Hooks keyed by `(table, kind)`, in registration order.
#[derive(Default)]
pub struct HookRegistry {
    hooks: RwLock<HashMap<(Table, MutationKind), Vec<Arc<dyn MutationHook>>>>,
}

impl HookRegistry {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn register(&self, table: Table, kind: MutationKind, hook: Arc<dyn MutationHook>) {
        self.hooks.write().entry((table, kind)).or_default().push(hook);
    }

    /// Register one hook for creating, updating and deleting on `table`.
    pub fn register_all_kinds(&self, table: Table, hook: &Arc<dyn MutationHook>) {
        for kind in MutationKind::ALL {
            self.register(table, kind, Arc::clone(hook));
        }
    }

    /// Hooks currently registered for `(table, kind)`.
    pub fn hooks_for(&self, table: Table, kind: MutationKind) -> Vec<Arc<dyn MutationHook>> {
        self.hooks.read().get(&(table, kind)).cloned().unwrap_or_default()
    }

    pub fn len(&self) -> usize {
        self.hooks.read().values().map(Vec::len).sum()
    }

    pub fn is_empty(&self) -> bool {
        self.len() == 0
    }
}

impl std::fmt::Debug for HookRegistry {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("HookRegistry").field("hooks", &self.len()).finish()
    }
}
