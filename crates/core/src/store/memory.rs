//! In-memory [`RecordStore`], used by tests and ephemeral sessions.

use std::collections::BTreeMap;

use async_trait::async_trait;
use parking_lot::RwLock;
use policydesk_domain::{record_id, PolicyDeskError, Record, Result, Table};
use serde_json::Value;

use super::ports::{RecordStore, TableSnapshot};
use super::validation::validate_index_field;

type Rows = BTreeMap<String, Record>;

/// Record store held in process memory.
#[derive(Debug, Default)]
pub struct MemoryRecordStore {
    tables: RwLock<BTreeMap<Table, Rows>>,
}

impl MemoryRecordStore {
    pub fn new() -> Self {
        Self::default()
    }
}

#[async_trait]
impl RecordStore for MemoryRecordStore {
    async fn insert(&self, table: Table, record: Record) -> Result<()> {
        let id = record_id(&record)?.to_string();
        let mut tables = self.tables.write();
        let rows = tables.entry(table).or_default();
        if rows.contains_key(&id) {
            return Err(PolicyDeskError::Conflict(format!("{table}/{id} already exists")));
        }
        rows.insert(id, record);
        Ok(())
    }

    async fn update(&self, table: Table, id: &str, changes: Record) -> Result<Record> {
        let mut tables = self.tables.write();
        let existing = tables
            .get_mut(&table)
            .and_then(|rows| rows.get_mut(id))
            .ok_or_else(|| PolicyDeskError::NotFound(format!("{table}/{id}")))?;
        existing.extend(changes);
        Ok(existing.clone())
    }

    async fn delete(&self, table: Table, id: &str) -> Result<bool> {
        let mut tables = self.tables.write();
        Ok(tables.get_mut(&table).and_then(|rows| rows.remove(id)).is_some())
    }

    async fn get(&self, table: Table, id: &str) -> Result<Option<Record>> {
        Ok(self.tables.read().get(&table).and_then(|rows| rows.get(id)).cloned())
    }

    async fn all(&self, table: Table) -> Result<Vec<Record>> {
        Ok(self
            .tables
            .read()
            .get(&table)
            .map(|rows| rows.values().cloned().collect())
            .unwrap_or_default())
    }

    async fn find_by(&self, table: Table, field: &str, value: &Value) -> Result<Vec<Record>> {
        validate_index_field(table, field)?;
        Ok(self
            .tables
            .read()
            .get(&table)
            .map(|rows| {
                rows.values().filter(|record| record.get(field) == Some(value)).cloned().collect()
            })
            .unwrap_or_default())
    }

    async fn count(&self, table: Table) -> Result<usize> {
        Ok(self.tables.read().get(&table).map_or(0, BTreeMap::len))
    }

    async fn replace_all(&self, snapshot: TableSnapshot) -> Result<()> {
        // Build every table first so a bad row leaves the store untouched.
        let mut replacement = BTreeMap::new();
        for (table, records) in snapshot {
            let mut rows = Rows::new();
            for record in records {
                let id = record_id(&record)?.to_string();
                if rows.insert(id.clone(), record).is_some() {
                    return Err(PolicyDeskError::Conflict(format!(
                        "{table}/{id} appears twice in snapshot"
                    )));
                }
            }
            replacement.insert(table, rows);
        }

        let mut tables = self.tables.write();
        for (table, rows) in replacement {
            tables.insert(table, rows);
        }
        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use serde_json::json;
    use tokio_test::{assert_err, assert_ok};

    use super::*;

    fn record(value: serde_json::Value) -> Record {
        value.as_object().cloned().unwrap()
    }

    #[tokio::test]
    async fn insert_rejects_duplicate_ids() {
        let store = MemoryRecordStore::new();
        assert_ok!(store.insert(Table::Customers, record(json!({ "id": "c1" }))).await);
        let err = assert_err!(store.insert(Table::Customers, record(json!({ "id": "c1" }))).await);
        assert!(matches!(err, PolicyDeskError::Conflict(_)));
    }

    #[tokio::test]
    async fn update_merges_fields() {
        let store = MemoryRecordStore::new();
        store
            .insert(Table::Vehicles, record(json!({ "id": "v1", "plate": "A", "brand": "Fiat" })))
            .await
            .unwrap();

        let merged =
            store.update(Table::Vehicles, "v1", record(json!({ "plate": "B" }))).await.unwrap();

        assert_eq!(merged, record(json!({ "id": "v1", "plate": "B", "brand": "Fiat" })));
        assert!(matches!(
            store.update(Table::Vehicles, "v9", record(json!({ "plate": "C" }))).await,
            Err(PolicyDeskError::NotFound(_))
        ));
    }

    #[tokio::test]
    async fn find_by_matches_indexed_values() {
        let store = MemoryRecordStore::new();
        for (id, customer) in [("v1", "c1"), ("v2", "c2"), ("v3", "c1")] {
            store
                .insert(Table::Vehicles, record(json!({ "id": id, "customerId": customer })))
                .await
                .unwrap();
        }

        let found = store.find_by(Table::Vehicles, "customerId", &json!("c1")).await.unwrap();
        let ids: Vec<_> = found.iter().map(|r| r["id"].as_str().unwrap()).collect();
        assert_eq!(ids, ["v1", "v3"]);
        assert!(store.find_by(Table::Vehicles, "colour", &json!("red")).await.is_err());
    }

    #[tokio::test]
    async fn replace_all_is_all_or_nothing() {
        let store = MemoryRecordStore::new();
        store.insert(Table::Customers, record(json!({ "id": "old" }))).await.unwrap();

        let mut bad = TableSnapshot::new();
        bad.insert(Table::Customers, vec![record(json!({ "id": "new" }))]);
        bad.insert(Table::Vehicles, vec![record(json!({ "plate": "no id" }))]);
        assert!(store.replace_all(bad).await.is_err());
        assert!(store.get(Table::Customers, "old").await.unwrap().is_some());

        let mut good = TableSnapshot::new();
        good.insert(Table::Customers, vec![record(json!({ "id": "new" }))]);
        store.replace_all(good).await.unwrap();
        assert!(store.get(Table::Customers, "old").await.unwrap().is_none());
        assert_eq!(store.count(Table::Customers).await.unwrap(), 1);
    }
}
