//! In-memory [`QueueStorage`] for tests and ephemeral sessions.

use std::collections::BTreeMap;

use async_trait::async_trait;
use parking_lot::Mutex;
use chrono::{DateTime, Utc};
use policydesk_domain::{DeadLetter, PolicyDeskError, QueuedMutation, Result, Table};
use uuid::Uuid;

use super::ports::QueueStorage;

#[derive(Debug, Default)]
struct QueueState {
    last_seq: i64,
    live: BTreeMap<i64, QueuedMutation>,
    dead: Vec<DeadLetter>,
}

/// Queue storage that lives only as long as the process.
#[derive(Debug, Default)]
pub struct MemoryQueueStorage {
    state: Mutex<QueueState>,
}

impl MemoryQueueStorage {
    pub fn new() -> Self {
        Self::default()
    }
}

#[async_trait]
impl QueueStorage for MemoryQueueStorage {
    async fn append(&self, mut entry: QueuedMutation) -> Result<QueuedMutation> {
        let mut state = self.state.lock();
        state.last_seq += 1;
        entry.seq = state.last_seq;
        state.live.insert(entry.seq, entry.clone());
        Ok(entry)
    }

    async fn take_all(&self) -> Result<Vec<QueuedMutation>> {
        let mut state = self.state.lock();
        Ok(std::mem::take(&mut state.live).into_values().collect())
    }

    async fn restore(&self, entry: QueuedMutation) -> Result<()> {
        let mut state = self.state.lock();
        state.last_seq = state.last_seq.max(entry.seq);
        state.live.insert(entry.seq, entry);
        Ok(())
    }

    async fn len(&self) -> Result<usize> {
        Ok(self.state.lock().live.len())
    }

    async fn pending_for_table(&self, table: Table) -> Result<usize> {
        Ok(self.state.lock().live.values().filter(|entry| entry.table == table).count())
    }

    async fn list(&self) -> Result<Vec<QueuedMutation>> {
        Ok(self.state.lock().live.values().cloned().collect())
    }

    async fn dead_letter(&self, letter: DeadLetter) -> Result<()> {
        self.state.lock().dead.push(letter);
        Ok(())
    }

    async fn dead_letters(&self) -> Result<Vec<DeadLetter>> {
        Ok(self.state.lock().dead.clone())
    }

    async fn requeue_dead_letter(
        &self,
        entry_id: Uuid,
        requeued_at: DateTime<Utc>,
    ) -> Result<Option<QueuedMutation>> {
        let mut state = self.state.lock();
        let Some(position) =
            state.dead.iter().position(|letter| letter.entry.entry_id == entry_id)
        else {
            return Ok(None);
        };
        if state.live.values().any(|entry| entry.entry_id == entry_id) {
            return Err(PolicyDeskError::Database(format!(
                "queue entry {entry_id} is already live"
            )));
        }

        let mut entry = state.dead.remove(position).entry;
        entry.reset_attempts(requeued_at);
        state.last_seq += 1;
        entry.seq = state.last_seq;
        state.live.insert(entry.seq, entry.clone());
        Ok(Some(entry))
    }
}
