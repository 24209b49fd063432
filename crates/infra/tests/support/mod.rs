//! Shared fixtures for `policydesk-infra` integration tests.

#![allow(dead_code)]

use std::path::PathBuf;
use std::sync::Arc;

use policydesk_domain::Record;
use policydesk_infra::database::{DbManager, SqliteQueueStorage, SqliteRecordStore};
use tempfile::TempDir;

/// Migrated database in a temporary directory that lives as long as the
/// fixture.
pub struct TestDatabase {
    pub manager: Arc<DbManager>,
    pub path: PathBuf,
    _temp_dir: TempDir,
}

impl TestDatabase {
    pub fn new() -> Self {
        let temp_dir = TempDir::new().expect("temp dir should be created");
        let path = temp_dir.path().join("policydesk-test.db");
        let manager = Arc::new(Self::open(&path));
        Self { manager, path, _temp_dir: temp_dir }
    }

    /// Open a second manager on the same file, as a restarted app would.
    pub fn reopen(&self) -> Arc<DbManager> {
        Arc::new(Self::open(&self.path))
    }

    pub fn records(&self) -> Arc<SqliteRecordStore> {
        Arc::new(SqliteRecordStore::new(Arc::clone(&self.manager)))
    }

    pub fn queue_storage(&self) -> Arc<SqliteQueueStorage> {
        Arc::new(SqliteQueueStorage::new(Arc::clone(&self.manager)))
    }

    fn open(path: &std::path::Path) -> DbManager {
        let manager = DbManager::new(path, 4).expect("db manager should be created");
        manager.run_migrations().expect("schema should apply");
        manager
    }
}

impl Default for TestDatabase {
    fn default() -> Self {
        Self::new()
    }
}

pub fn record(value: serde_json::Value) -> Record {
    value.as_object().cloned().expect("test record must be a JSON object")
}
