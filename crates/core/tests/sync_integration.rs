//! End-to-end behaviour of local writes, replication, queue replay and
//! pull-refresh against an in-memory remote.

mod support;

use std::time::Duration;

use chrono::NaiveDate;
use policydesk_core::{
    BookkeepingService, DrainOutcome, DrainReport, QueuePolicy, SyncError, SyncOutcome,
    TableSnapshot,
};
use policydesk_domain::{
    NewCustomer, NewPolicy, NewVehicle, PolicyType, Principal, QueueOperation, Role, Table,
};
use serde_json::json;
use support::{record, Harness, RemoteCall};

fn admin() -> Principal {
    Principal {
        id: "admin".into(),
        email: "admin@example.com".into(),
        role: Role::Admin,
        name: None,
        assigned_customer_id: None,
    }
}

#[tokio::test]
async fn local_writes_succeed_and_are_visible_while_remote_is_down() {
    let harness = Harness::new();
    harness.remote.set_online(false);
    let local = &harness.local;

    local.insert(Table::Customers, record(json!({ "id": "c1", "firstName": "Ada" }))).await.unwrap();
    local
        .insert(Table::Vehicles, record(json!({ "id": "v1", "customerId": "c1", "plate": "34A" })))
        .await
        .unwrap();
    local
        .insert(
            Table::Policies,
            record(json!({ "id": "p1", "customerId": "c1", "vehicleId": "v1", "price": 100.0 })),
        )
        .await
        .unwrap();
    local.update(Table::Vehicles, "v1", record(json!({ "plate": "34B" }))).await.unwrap();
    local.delete(Table::Policies, "p1").await.unwrap();

    assert_eq!(local.get(Table::Customers, "c1").await.unwrap().unwrap()["firstName"], "Ada");
    assert_eq!(local.get(Table::Vehicles, "v1").await.unwrap().unwrap()["plate"], "34B");
    assert!(local.get(Table::Policies, "p1").await.unwrap().is_none());
    let by_customer = local.find_by(Table::Vehicles, "customerId", &json!("c1")).await.unwrap();
    assert_eq!(by_customer.len(), 1);

    local.flush_hooks().await;
    assert_eq!(harness.queue.len().await.unwrap(), 5);
    assert!(harness.remote.calls().is_empty());
    assert_eq!(harness.events.stats().deferred, 5);
}

#[tokio::test]
async fn offline_customer_is_queued_with_remote_names_and_replayed() {
    let harness = Harness::new();
    harness.remote.set_online(false);

    harness
        .local
        .insert(
            Table::Customers,
            record(json!({
                "id": "c1",
                "firstName": "Ada",
                "lastName": "Lovelace",
                "identityNumber": "11111111110",
                "phone": "5551112233",
                "type": "individual"
            })),
        )
        .await
        .unwrap();
    harness.local.flush_hooks().await;

    assert!(harness.local.get(Table::Customers, "c1").await.unwrap().is_some());
    let queued = harness.queue.entries().await.unwrap();
    assert_eq!(queued.len(), 1);
    assert_eq!(queued[0].table, Table::Customers);
    assert_eq!(queued[0].operation, QueueOperation::Insert);
    assert_eq!(
        queued[0].payload,
        record(json!({
            "id": "c1",
            "first_name": "Ada",
            "last_name": "Lovelace",
            "identity_number": "11111111110",
            "phone": "5551112233",
            "type": "individual"
        }))
    );

    harness.remote.set_online(true);
    let outcome = harness.queue.drain().await.unwrap();

    assert!(matches!(outcome, DrainOutcome::Completed(DrainReport { replayed: 1, .. })));
    assert!(harness.queue.is_empty().await.unwrap());
    let rows = harness.remote.rows(Table::Customers);
    assert_eq!(rows.len(), 1);
    assert_eq!(rows[0]["first_name"], "Ada");
}

#[tokio::test]
async fn queued_insert_update_delete_replay_in_order() {
    let harness = Harness::new();
    harness.remote.set_online(false);

    harness.local.insert(Table::Customers, record(json!({ "id": "a", "phone": "1" }))).await.unwrap();
    harness.local.update(Table::Customers, "a", record(json!({ "phone": "2" }))).await.unwrap();
    harness.local.delete(Table::Customers, "a").await.unwrap();

    harness.remote.set_online(true);
    let outcome = harness.orchestrator.sync().await.unwrap();

    let SyncOutcome::Completed(report) = outcome else { panic!("pass was skipped") };
    assert_eq!(
        report.drain,
        DrainOutcome::Completed(DrainReport { replayed: 3, ..DrainReport::default() })
    );
    let expected: Vec<RemoteCall> = [QueueOperation::Insert, QueueOperation::Update, QueueOperation::Delete]
        .into_iter()
        .map(|operation| RemoteCall { operation, table: Table::Customers, id: "a".into() })
        .collect();
    assert_eq!(harness.remote.calls(), expected);
    assert!(harness.remote.rows(Table::Customers).is_empty());
    assert!(harness.queue.is_empty().await.unwrap());
}

#[tokio::test]
async fn back_to_back_sync_requests_run_one_pass() {
    let harness = Harness::new();
    harness.remote.set_select_delay(Duration::from_millis(100));
    let orchestrator = &harness.orchestrator;

    let (first, second) = tokio::join!(orchestrator.sync(), orchestrator.sync());

    let outcomes = [first.unwrap(), second.unwrap()];
    let completed = outcomes.iter().filter(|o| matches!(o, SyncOutcome::Completed(_))).count();
    let skipped = outcomes.iter().filter(|o| **o == SyncOutcome::Skipped).count();
    assert_eq!((completed, skipped), (1, 1));
    assert_eq!(harness.remote.selects(), Table::ALL.len());

    // The flag is released, so a later request runs.
    assert!(matches!(orchestrator.sync().await.unwrap(), SyncOutcome::Completed(_)));
}

#[tokio::test]
async fn failed_policies_fetch_leaves_every_local_table_intact() {
    let harness = Harness::new();
    let mut before = TableSnapshot::new();
    before.insert(Table::Customers, vec![record(json!({ "id": "c-old" }))]);
    before.insert(Table::Vehicles, vec![record(json!({ "id": "v-old", "customerId": "c-old" }))]);
    before.insert(
        Table::Policies,
        vec![record(json!({ "id": "p-old", "customerId": "c-old", "vehicleId": "v-old" }))],
    );
    harness.local.replace_all(before).await.unwrap();

    harness.remote.seed(Table::Customers, vec![record(json!({ "id": "c-new" }))]);
    harness
        .remote
        .seed(Table::Vehicles, vec![record(json!({ "id": "v-new", "customer_id": "c-new" }))]);
    harness.remote.fail_select(Table::Policies);

    let err = harness.orchestrator.sync().await.unwrap_err();

    assert!(matches!(err, SyncError::Remote(_)));
    for (table, id) in
        [(Table::Customers, "c-old"), (Table::Vehicles, "v-old"), (Table::Policies, "p-old")]
    {
        let rows = harness.local.all(table).await.unwrap();
        assert_eq!(rows.len(), 1, "{table} changed");
        assert_eq!(rows[0]["id"], id);
    }
    assert!(harness.orchestrator.last_report().is_none());
    assert_eq!(harness.events.stats().syncs_failed, 1);
}

#[tokio::test]
async fn deleting_vehicle_deletes_remote_policies_before_vehicle() {
    let harness = Harness::new();
    let service = BookkeepingService::new(harness.local.clone());
    let admin = admin();

    let customer = service
        .create_customer(
            &admin,
            NewCustomer {
                first_name: "Ada".into(),
                last_name: "Lovelace".into(),
                identity_number: "11111111110".into(),
                phone: "5551112233".into(),
                customer_type: Default::default(),
                assigned_user_id: None,
            },
        )
        .await
        .unwrap();
    let vehicle = service
        .create_vehicle(
            &admin,
            NewVehicle {
                plate: "06 AL 1815".into(),
                brand: "Ford".into(),
                model: "Focus".into(),
                year: "2017".into(),
                chassis_number: "WF0".into(),
                customer_id: customer.id.clone(),
                inspection_date: None,
            },
        )
        .await
        .unwrap();
    for number in ["K-1", "K-2"] {
        service
            .create_policy(
                &admin,
                NewPolicy {
                    customer_id: customer.id.clone(),
                    vehicle_id: vehicle.id.clone(),
                    start_date: NaiveDate::from_ymd_opt(2025, 1, 1).unwrap(),
                    end_date: NaiveDate::from_ymd_opt(2026, 1, 1).unwrap(),
                    price: 3_000.0,
                    policy_type: PolicyType::Comprehensive,
                    policy_number: number.into(),
                },
            )
            .await
            .unwrap();
    }

    service.delete_vehicle(&admin, &vehicle.id).await.unwrap();
    harness.local.flush_hooks().await;

    let deletes: Vec<_> = harness
        .remote
        .calls()
        .into_iter()
        .filter(|call| call.operation == QueueOperation::Delete)
        .map(|call| call.table)
        .collect();
    assert_eq!(deletes, [Table::Policies, Table::Policies, Table::Vehicles]);
    assert!(harness.remote.rows(Table::Policies).is_empty());
    assert!(harness.remote.rows(Table::Vehicles).is_empty());
    assert_eq!(harness.remote.rows(Table::Customers).len(), 1);
}

#[tokio::test]
async fn entries_that_keep_failing_are_dead_lettered() {
    let harness = Harness::with_policy(QueuePolicy {
        max_attempts: 2,
        max_age: chrono::Duration::hours(24),
    });
    // Present locally but never created remotely, so the update cannot apply.
    let mut seeded = TableSnapshot::new();
    seeded.insert(Table::Customers, vec![record(json!({ "id": "ghost", "phone": "1" }))]);
    harness.local.replace_all(seeded).await.unwrap();

    harness.local.update(Table::Customers, "ghost", record(json!({ "phone": "2" }))).await.unwrap();
    harness.local.flush_hooks().await;
    assert_eq!(harness.queue.len().await.unwrap(), 1);

    harness.orchestrator.sync().await.unwrap();
    assert_eq!(harness.queue.entries().await.unwrap()[0].attempts, 1);

    let outcome = harness.orchestrator.sync().await.unwrap();

    let SyncOutcome::Completed(report) = outcome else { panic!("pass was skipped") };
    assert!(matches!(report.drain, DrainOutcome::Completed(DrainReport { dead_lettered: 1, .. })));
    assert!(harness.queue.is_empty().await.unwrap());
    let letters = harness.queue.dead_letters().await.unwrap();
    assert_eq!(letters.len(), 1);
    assert_eq!(letters[0].entry.record_id, "ghost");
    assert_eq!(harness.events.stats().dead_lettered, 1);
}

#[tokio::test]
async fn reconnect_replays_queue_before_new_writes_reach_remote() {
    let harness = Harness::new();
    harness.remote.set_online(false);
    harness.local.insert(Table::Users, record(json!({ "id": "u1", "email": "a@b.c" }))).await.unwrap();
    harness.local.flush_hooks().await;

    harness.remote.set_online(true);
    // The table is blocked by the queued insert, so this update queues too.
    harness.local.update(Table::Users, "u1", record(json!({ "role": "employee" }))).await.unwrap();
    harness.local.flush_hooks().await;
    assert!(harness.remote.calls().is_empty());

    harness.orchestrator.sync().await.unwrap();

    let ops: Vec<_> = harness.remote.calls().into_iter().map(|c| c.operation).collect();
    assert_eq!(ops, [QueueOperation::Insert, QueueOperation::Update]);
    let users = harness.local.all(Table::Users).await.unwrap();
    assert_eq!(users[0]["role"], "employee");
}
