mod common;

use chrono::{TimeZone, Utc};
use sea_orm::{ColumnTrait, EntityTrait, PaginatorTrait, QueryFilter};
use serde_json::json;
use stockyard_api::{
    entities::{item, location, sync_op, transaction, LocationKind, SyncOpKind, SyncOutcome},
    services::sync::{since_watermark, OpResult, SyncOp, SyncStatus, PROJECT_LOCATION_MANAGED},
};
use uuid::Uuid;

use common::{admin, manager, staff, TestApp};

fn op(id: &str, kind: SyncOpKind, payload: serde_json::Value) -> SyncOp {
    SyncOp {
        id: id.to_string(),
        kind,
        payload,
    }
}

fn statuses(results: &[OpResult]) -> Vec<SyncStatus> {
    results.iter().map(|r| r.status).collect()
}

#[tokio::test]
async fn txn_create_applies_once_across_retries() {
    let app = TestApp::new().await;
    let division = app.seed_division("North").await;
    let item = app.seed_item("BOLT-10", 0).await;
    let main = app.seed_warehouse("MAIN", Some(division)).await;
    let user = staff(division);
    let sync = &app.state.services.sync;

    let batch = vec![op(
        "op-1",
        SyncOpKind::TxnCreate,
        json!({ "type": "RECEIVE", "itemId": item.id, "qty": 6, "dstLocationId": main.id }),
    )];

    let first = sync.push(&user, batch.clone()).await;
    assert!(first.ok);
    assert_eq!(statuses(&first.results), vec![SyncStatus::Applied]);

    let second = sync.push(&user, batch).await;
    assert_eq!(statuses(&second.results), vec![SyncStatus::Skipped]);

    assert_eq!(app.balance(item.id, main.id).await, 6);
    let recorded = transaction::Entity::find()
        .all(app.db())
        .await
        .expect("transactions");
    assert_eq!(recorded.len(), 1);
    // The op id doubles as the idempotency key when the payload has none
    assert_eq!(recorded[0].offline_op_id.as_deref(), Some("op-1"));
}

#[tokio::test]
async fn concurrent_pushes_of_one_op_apply_it_once() {
    let app = TestApp::new().await;
    let division = app.seed_division("North").await;
    let item = app.seed_item("BOLT-10", 0).await;
    let main = app.seed_warehouse("MAIN", Some(division)).await;
    let user = staff(division);

    let batch = vec![op(
        "op-race",
        SyncOpKind::TxnCreate,
        json!({ "type": "RECEIVE", "itemId": item.id, "qty": 4, "dstLocationId": main.id }),
    )];

    let (a, b) = tokio::join!(
        app.state.services.sync.push(&user, batch.clone()),
        app.state.services.sync.push(&user, batch),
    );

    let mut seen = vec![a.results[0].status, b.results[0].status];
    seen.sort_by_key(|s| s.as_str());
    assert_eq!(seen, vec![SyncStatus::Applied, SyncStatus::Skipped]);
    assert_eq!(app.balance(item.id, main.id).await, 4);
}

#[tokio::test]
async fn one_bad_op_does_not_block_the_batch() {
    let app = TestApp::new().await;
    let north = app.seed_division("North").await;
    let south = app.seed_division("South").await;
    let item = app.seed_item("BOLT-10", 0).await;
    let home = app.seed_warehouse("HOME", Some(north)).await;
    let away = app.seed_warehouse("AWAY", Some(south)).await;
    let user = staff(north);

    let response = app
        .state
        .services
        .sync
        .push(
            &user,
            vec![
                op(
                    "a",
                    SyncOpKind::TxnCreate,
                    json!({ "type": "RECEIVE", "itemId": item.id, "qty": 2, "dstLocationId": home.id }),
                ),
                op(
                    "b",
                    SyncOpKind::TxnCreate,
                    json!({ "type": "RECEIVE", "itemId": item.id, "qty": 9, "dstLocationId": away.id }),
                ),
                op(
                    "c",
                    SyncOpKind::TxnCreate,
                    json!({ "type": "RECEIVE", "itemId": item.id, "qty": 3, "dstLocationId": home.id }),
                ),
            ],
        )
        .await;

    let ids: Vec<&str> = response.results.iter().map(|r| r.id.as_str()).collect();
    assert_eq!(ids, vec!["a", "b", "c"]);
    assert_eq!(
        statuses(&response.results),
        vec![SyncStatus::Applied, SyncStatus::Rejected, SyncStatus::Applied]
    );
    assert_eq!(response.results[1].kind.as_deref(), Some("forbidden"));
    assert_eq!(app.balance(item.id, home.id).await, 5);
    assert_eq!(app.balance(item.id, away.id).await, 0);
}

#[tokio::test]
async fn rejections_are_remembered() {
    let app = TestApp::new().await;
    let division = app.seed_division("North").await;
    let main = app.seed_warehouse("MAIN", Some(division)).await;
    let user = staff(division);
    let sync = &app.state.services.sync;

    let batch = vec![op(
        "ghost",
        SyncOpKind::TxnCreate,
        json!({ "type": "RECEIVE", "itemId": Uuid::new_v4(), "qty": 1, "dstLocationId": main.id }),
    )];

    let first = sync.push(&user, batch.clone()).await;
    let replay = sync.push(&user, batch).await;

    for response in [&first, &replay] {
        let result = &response.results[0];
        assert_eq!(result.status, SyncStatus::Rejected);
        assert_eq!(result.kind.as_deref(), Some("not_found"));
        assert_eq!(result.reason.as_deref(), Some("item not found"));
    }

    let marker = sync_op::Entity::find_by_id("ghost".to_string())
        .one(app.db())
        .await
        .expect("marker lookup")
        .expect("marker written");
    assert_eq!(marker.outcome, SyncOutcome::Rejected);
    assert_eq!(marker.user_id, user.id);
}

#[tokio::test]
async fn blank_op_ids_are_rejected_without_a_marker() {
    let app = TestApp::new().await;
    let division = app.seed_division("North").await;

    let response = app
        .state
        .services
        .sync
        .push(
            &staff(division),
            vec![op(" ", SyncOpKind::ItemDelete, json!({}))],
        )
        .await;

    assert_eq!(response.results[0].status, SyncStatus::Rejected);
    assert_eq!(
        sync_op::Entity::find().count(app.db()).await.expect("count"),
        0
    );
}

#[tokio::test]
async fn item_upsert_creates_then_updates_by_id() {
    let app = TestApp::new().await;
    let division = app.seed_division("North").await;
    let user = staff(division);
    let sync = &app.state.services.sync;
    let client_id = Uuid::new_v4();

    let response = sync
        .push(
            &user,
            vec![
                op(
                    "i-1",
                    SyncOpKind::ItemUpsert,
                    json!({ "id": client_id, "sku": "GLOVE-M", "name": "Gloves", "reorderLevel": 12 }),
                ),
                op(
                    "i-2",
                    SyncOpKind::ItemUpsert,
                    json!({ "id": client_id, "sku": "GLOVE-MED", "name": "Gloves (M)", "barcode": "0123" }),
                ),
            ],
        )
        .await;
    assert_eq!(
        statuses(&response.results),
        vec![SyncStatus::Applied, SyncStatus::Applied]
    );

    let stored = item::Entity::find_by_id(client_id)
        .one(app.db())
        .await
        .expect("lookup")
        .expect("created with the client id");
    assert_eq!(stored.sku, "GLOVE-MED");
    assert_eq!(stored.name, "Gloves (M)");
    assert_eq!(stored.barcode.as_deref(), Some("0123"));
    assert_eq!(stored.reorder_level, 0);
}

#[tokio::test]
async fn item_upsert_falls_back_to_sku() {
    let app = TestApp::new().await;
    let division = app.seed_division("North").await;
    let existing = app.seed_item("HAMMER", 1).await;

    let response = app
        .state
        .services
        .sync
        .push(
            &staff(division),
            vec![op(
                "i-1",
                SyncOpKind::ItemUpsert,
                json!({ "id": "local-7", "sku": "HAMMER", "name": "Claw hammer", "reorderLevel": 4 }),
            )],
        )
        .await;
    assert_eq!(response.results[0].status, SyncStatus::Applied);

    let all = item::Entity::find().all(app.db()).await.expect("items");
    assert_eq!(all.len(), 1);
    assert_eq!(all[0].id, existing.id);
    assert_eq!(all[0].name, "Claw hammer");
    assert_eq!(all[0].reorder_level, 4);
}

#[tokio::test]
async fn item_delete_is_soft_and_upsert_revives() {
    let app = TestApp::new().await;
    let division = app.seed_division("North").await;
    let existing = app.seed_item("SAW", 0).await;
    let user = staff(division);
    let sync = &app.state.services.sync;

    sync.push(
        &user,
        vec![op("d-1", SyncOpKind::ItemDelete, json!({ "id": existing.id }))],
    )
    .await;
    let stored = item::Entity::find_by_id(existing.id)
        .one(app.db())
        .await
        .expect("lookup")
        .expect("row kept");
    assert!(stored.is_deleted);

    let response = sync
        .push(
            &user,
            vec![
                op("d-2", SyncOpKind::ItemDelete, json!({ "id": Uuid::new_v4() })),
                op(
                    "u-1",
                    SyncOpKind::ItemUpsert,
                    json!({ "sku": "SAW", "name": "Saw" }),
                ),
            ],
        )
        .await;
    assert_eq!(
        statuses(&response.results),
        vec![SyncStatus::Applied, SyncStatus::Applied]
    );
    let stored = item::Entity::find_by_id(existing.id)
        .one(app.db())
        .await
        .expect("lookup")
        .expect("row kept");
    assert!(!stored.is_deleted);
}

#[tokio::test]
async fn loc_upsert_uses_caller_division_and_keeps_it_on_update() {
    let app = TestApp::new().await;
    let north = app.seed_division("North").await;
    let south = app.seed_division("South").await;
    let user = manager(north);
    let sync = &app.state.services.sync;
    let client_id = Uuid::new_v4();

    sync.push(
        &user,
        vec![
            op(
                "l-1",
                SyncOpKind::LocUpsert,
                json!({ "id": client_id, "code": "YARD", "name": "Yard" }),
            ),
            op(
                "l-2",
                SyncOpKind::LocUpsert,
                json!({ "id": client_id, "code": "YARD", "name": "Back yard", "divisionId": south }),
            ),
        ],
    )
    .await;

    let stored = location::Entity::find_by_id(client_id)
        .one(app.db())
        .await
        .expect("lookup")
        .expect("created");
    assert_eq!(stored.name, "Back yard");
    assert_eq!(stored.kind, LocationKind::Warehouse);
    assert_eq!(stored.division_id, Some(north));
}

#[tokio::test]
async fn loc_upsert_checks_the_division_exists() {
    let app = TestApp::new().await;

    let response = app
        .state
        .services
        .sync
        .push(
            &admin(),
            vec![op(
                "l-1",
                SyncOpKind::LocUpsert,
                json!({ "code": "YARD", "name": "Yard", "divisionId": Uuid::new_v4() }),
            )],
        )
        .await;

    assert_eq!(response.results[0].status, SyncStatus::Rejected);
    assert_eq!(response.results[0].reason.as_deref(), Some("division not found"));
}

#[tokio::test]
async fn project_locations_cannot_be_edited_through_sync() {
    let app = TestApp::new().await;
    let division = app.seed_division("North").await;
    let project = app.seed_project("BRIDGE", division).await;
    let user = manager(division);

    let response = app
        .state
        .services
        .sync
        .push(
            &user,
            vec![
                op(
                    "l-1",
                    SyncOpKind::LocUpsert,
                    json!({ "id": project.location_id, "code": "RENAMED", "name": "Renamed" }),
                ),
                op(
                    "l-2",
                    SyncOpKind::LocDelete,
                    json!({ "id": project.location_id }),
                ),
            ],
        )
        .await;

    for result in &response.results {
        assert_eq!(result.status, SyncStatus::Rejected);
        assert_eq!(result.reason.as_deref(), Some(PROJECT_LOCATION_MANAGED));
    }
    let stored = location::Entity::find_by_id(project.location_id)
        .one(app.db())
        .await
        .expect("lookup")
        .expect("still there");
    assert!(!stored.is_deleted);
    assert_eq!(stored.code, "PROJECT-BRIDGE");
}

#[tokio::test]
async fn malformed_payload_is_rejected() {
    let app = TestApp::new().await;
    let division = app.seed_division("North").await;

    let response = app
        .state
        .services
        .sync
        .push(
            &staff(division),
            vec![op(
                "bad",
                SyncOpKind::TxnCreate,
                json!({ "type": "TELEPORT", "qty": 1 }),
            )],
        )
        .await;

    let result = &response.results[0];
    assert_eq!(result.status, SyncStatus::Rejected);
    assert_eq!(result.kind.as_deref(), Some("validation_error"));
    assert!(result
        .reason
        .as_deref()
        .is_some_and(|r| r.starts_with("invalid payload")));
}

/// Waits until every row written so far is stamped before the current millisecond
async fn next_millisecond() {
    let mark = Utc::now().timestamp_millis();
    while Utc::now().timestamp_millis() <= mark {
        tokio::time::sleep(std::time::Duration::from_micros(200)).await;
    }
}

#[tokio::test]
async fn pull_returns_changes_after_the_watermark() {
    let app = TestApp::new().await;
    let division = app.seed_division("North").await;
    let before = app.seed_item("OLD", 0).await;
    let main = app.seed_warehouse("MAIN", Some(division)).await;
    let sync = &app.state.services.sync;
    next_millisecond().await;

    let full = sync
        .pull(Utc.timestamp_millis_opt(0).unwrap())
        .await
        .expect("full pull");
    assert!(full.items.iter().any(|i| i.id == before.id));
    assert!(full.locations.iter().any(|l| l.id == main.id));

    let watermark = Utc.timestamp_millis_opt(full.now).unwrap();

    let after = app.seed_item("NEW", 0).await;
    sync.push(
        &staff(division),
        vec![op(
            "t-1",
            SyncOpKind::TxnCreate,
            json!({ "type": "RECEIVE", "itemId": after.id, "qty": 2, "dstLocationId": main.id }),
        )],
    )
    .await;
    next_millisecond().await;

    let delta = sync.pull(watermark).await.expect("incremental pull");
    let item_ids: Vec<Uuid> = delta.items.iter().map(|i| i.id).collect();
    assert_eq!(item_ids, vec![after.id]);
    assert!(delta.locations.is_empty());
    assert_eq!(delta.stocks.len(), 1);
    assert_eq!(delta.stocks[0].qty, 2);
    assert_eq!(delta.txns.len(), 1);
    assert!(delta.now > full.now);

    let applied = sync_op::Entity::find()
        .filter(sync_op::Column::Outcome.eq(SyncOutcome::Applied))
        .count(app.db())
        .await
        .expect("count");
    assert_eq!(applied, 1);
}

#[tokio::test]
async fn back_to_back_pulls_deliver_each_row_once() {
    let app = TestApp::new().await;
    let division = app.seed_division("North").await;
    let sync = &app.state.services.sync;
    let mut since = Utc.timestamp_millis_opt(0).unwrap();

    for round in 0..40 {
        let loc = app
            .seed_warehouse(&format!("W{round}"), Some(division))
            .await;

        let first = sync.pull(since).await.expect("pull");
        let second = sync
            .pull(Utc.timestamp_millis_opt(first.now).unwrap())
            .await
            .expect("pull");
        next_millisecond().await;
        let third = sync
            .pull(Utc.timestamp_millis_opt(second.now).unwrap())
            .await
            .expect("pull");

        let seen = [&first, &second, &third]
            .iter()
            .map(|p| p.locations.iter().filter(|l| l.id == loc.id).count())
            .sum::<usize>();
        assert_eq!(seen, 1, "round {round}");

        since = Utc.timestamp_millis_opt(third.now).unwrap();
    }
}

#[tokio::test]
async fn far_future_watermark_returns_nothing() {
    let app = TestApp::new().await;
    let division = app.seed_division("North").await;
    app.seed_item("OLD", 0).await;
    app.seed_warehouse("MAIN", Some(division)).await;
    next_millisecond().await;

    let delta = app
        .state
        .services
        .sync
        .pull(since_watermark(Some("1e20")))
        .await
        .expect("pull");
    assert!(delta.items.is_empty());
    assert!(delta.locations.is_empty());
}
