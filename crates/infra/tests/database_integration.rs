//! SQLite record store and queue storage against the real schema.

mod support;

use std::sync::Arc;

use chrono::Utc;
use policydesk_core::{LocalStore, QueueStorage, RecordStore, TableSnapshot};
use policydesk_domain::{DeadLetter, PolicyDeskError, QueueOperation, QueuedMutation, Table};
use policydesk_infra::database::SqliteQueueStorage;
use serde_json::json;
use support::{record, TestDatabase};
use tokio_test::assert_ok;

#[tokio::test(flavor = "multi_thread")]
async fn records_are_indexed_by_secondary_fields() {
    let db = TestDatabase::new();
    let store = db.records();

    for (id, customer, plate) in [("v1", "c1", "34 AB 12"), ("v2", "c2", "06 CD 34"), ("v3", "c1", "35 EF 56")] {
        assert_ok!(
            store
                .insert(
                    Table::Vehicles,
                    record(json!({ "id": id, "customerId": customer, "plate": plate, "year": 2020 })),
                )
                .await
        );
    }

    let owned = store.find_by(Table::Vehicles, "customerId", &json!("c1")).await.unwrap();
    let ids: Vec<_> = owned.iter().map(|r| r["id"].as_str().unwrap()).collect();
    assert_eq!(ids, ["v1", "v3"]);

    let by_plate = store.find_by(Table::Vehicles, "plate", &json!("06 CD 34")).await.unwrap();
    assert_eq!(by_plate[0]["customerId"], "c2");

    let err = store.find_by(Table::Vehicles, "colour", &json!("red")).await.unwrap_err();
    assert!(matches!(err, PolicyDeskError::InvalidInput(_)));
}

#[tokio::test(flavor = "multi_thread")]
async fn update_merges_and_keeps_other_fields() {
    let db = TestDatabase::new();
    let store = db.records();
    store
        .insert(
            Table::Policies,
            record(json!({ "id": "p1", "price": 1200, "type": "Kasko", "policyNumber": "K-1" })),
        )
        .await
        .unwrap();

    let merged = store.update(Table::Policies, "p1", record(json!({ "price": 1500 }))).await.unwrap();
    assert_eq!(merged["price"], 1500);
    assert_eq!(merged["type"], "Kasko");

    let by_type = store.find_by(Table::Policies, "type", &json!("Kasko")).await.unwrap();
    assert_eq!(by_type[0]["price"], 1500);
}

#[tokio::test(flavor = "multi_thread")]
async fn replace_all_rolls_back_on_duplicate_rows() {
    let db = TestDatabase::new();
    let store = db.records();
    store.insert(Table::Customers, record(json!({ "id": "local" }))).await.unwrap();
    store.insert(Table::Users, record(json!({ "id": "u-local" }))).await.unwrap();

    let mut bad = TableSnapshot::new();
    bad.insert(Table::Customers, vec![record(json!({ "id": "r1" }))]);
    bad.insert(Table::Users, vec![record(json!({ "id": "u1" })), record(json!({ "id": "u1" }))]);
    assert!(store.replace_all(bad).await.is_err());

    assert!(store.get(Table::Customers, "local").await.unwrap().is_some());
    assert!(store.get(Table::Customers, "r1").await.unwrap().is_none());
    assert_eq!(store.count(Table::Users).await.unwrap(), 1);

    let mut good = TableSnapshot::new();
    good.insert(Table::Customers, vec![record(json!({ "id": "r1" })), record(json!({ "id": "r2" }))]);
    good.insert(Table::Users, Vec::new());
    store.replace_all(good).await.unwrap();

    assert_eq!(store.count(Table::Customers).await.unwrap(), 2);
    assert_eq!(store.count(Table::Users).await.unwrap(), 0);
}

#[tokio::test(flavor = "multi_thread")]
async fn local_store_over_sqlite_validates_before_writing() {
    let db = TestDatabase::new();
    let local = LocalStore::new(db.records());

    let err = local
        .insert(Table::Customers, record(json!({ "id": "c1", "favouriteColour": "red" })))
        .await
        .unwrap_err();
    assert!(matches!(err, PolicyDeskError::InvalidInput(_)));
    assert_eq!(local.count(Table::Customers).await.unwrap(), 0);

    local.insert(Table::Customers, record(json!({ "id": "c1", "firstName": "Ada" }))).await.unwrap();
    assert!(local.delete(Table::Customers, "c1").await.unwrap());
    assert!(!local.delete(Table::Customers, "c1").await.unwrap());
}

fn entry(table: Table, operation: QueueOperation, id: &str) -> QueuedMutation {
    QueuedMutation::new(table, operation, id, record(json!({ "id": id })))
}

#[tokio::test(flavor = "multi_thread")]
async fn queue_survives_a_restart() {
    let db = TestDatabase::new();
    let storage = db.queue_storage();
    storage.append(entry(Table::Customers, QueueOperation::Insert, "c1")).await.unwrap();
    storage.append(entry(Table::Vehicles, QueueOperation::Update, "v1")).await.unwrap();

    let reopened = SqliteQueueStorage::new(db.reopen());
    let entries = reopened.list().await.unwrap();
    assert_eq!(entries.len(), 2);
    assert_eq!(entries[0].record_id, "c1");
    assert_eq!(entries[1].operation, QueueOperation::Update);
    assert_eq!(entries[0].payload["id"], "c1");
    assert_eq!(reopened.pending_for_table(Table::Vehicles).await.unwrap(), 1);
}

#[tokio::test(flavor = "multi_thread")]
async fn dead_letters_round_trip_through_sqlite() {
    let db = TestDatabase::new();
    let storage: Arc<dyn QueueStorage> = db.queue_storage();

    let mut failed = storage.append(entry(Table::Policies, QueueOperation::Delete, "p1")).await.unwrap();
    failed.attempts = 10;
    failed.last_error = Some("remote server error (503)".into());
    failed.last_attempt_at = Some(Utc::now());
    storage.take_all().await.unwrap();

    storage
        .dead_letter(DeadLetter {
            entry: failed.clone(),
            reason: "gave up after 10 attempts".into(),
            dead_lettered_at: Utc::now(),
        })
        .await
        .unwrap();

    let letters = storage.dead_letters().await.unwrap();
    assert_eq!(letters.len(), 1);
    assert_eq!(letters[0].entry.entry_id, failed.entry_id);
    assert_eq!(letters[0].entry.attempts, 10);

    let requeued = storage
        .requeue_dead_letter(failed.entry_id, Utc::now())
        .await
        .unwrap()
        .expect("dead letter");
    assert_eq!(requeued.attempts, 0);
    assert!(requeued.last_error.is_none());
    assert!(storage.dead_letters().await.unwrap().is_empty());
    assert_eq!(storage.list().await.unwrap()[0].entry_id, failed.entry_id);
    assert!(storage.requeue_dead_letter(failed.entry_id, Utc::now()).await.unwrap().is_none());
}
