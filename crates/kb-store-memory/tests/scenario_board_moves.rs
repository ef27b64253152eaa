//! Scenario: concrete board moves against the in-memory store.
//!
//! Covers the worked examples (same-column later/earlier, cross-column),
//! no-op moves, the end-of-list sentinel, round trips and every error kind
//! that does not involve concurrency.

use std::sync::Arc;

use kb_reorder::{
    Collection, ItemId, Missing, MoveTarget, NewItem, ParentId, ReorderEngine, ReorderError,
};
use kb_store_memory::MemoryStore;

// ---------------------------------------------------------------------------
// Helpers
// ---------------------------------------------------------------------------

fn engine() -> (ReorderEngine, MemoryStore) {
    let store = MemoryStore::new(Collection::Tasks);
    let engine = ReorderEngine::new(Arc::new(store.clone()));
    (engine, store)
}

fn column(store: &MemoryStore) -> ParentId {
    let id = ParentId::new();
    store.add_parent(id).expect("add parent");
    id
}

async fn seed(engine: &ReorderEngine, parent: ParentId, names: &[&str]) -> Vec<ItemId> {
    let mut ids = Vec::new();
    for name in names {
        let placed = engine
            .append(parent, NewItem::new(*name))
            .await
            .expect("append");
        ids.push(placed.id);
    }
    ids
}

/// Bodies of `parent` in position order, asserting positions are 0..n.
async fn order(engine: &ReorderEngine, parent: ParentId) -> Vec<String> {
    let items = engine.list(parent).await.expect("list");
    for (i, item) in items.iter().enumerate() {
        assert_eq!(item.position, i as u32, "positions must be dense");
    }
    items.into_iter().map(|i| i.body).collect()
}

fn to(parent: ParentId, index: i64) -> MoveTarget {
    MoveTarget::new(parent, index).expect("valid target")
}

// ---------------------------------------------------------------------------
// Worked examples
// ---------------------------------------------------------------------------

#[tokio::test]
async fn first_task_moved_to_end_of_same_column() {
    let (engine, store) = engine();
    let c = column(&store);
    let ids = seed(&engine, c, &["A", "B", "C"]).await;

    let placed = engine.move_item(ids[0], to(c, 2)).await.unwrap();

    assert_eq!(placed.position, 2);
    assert_eq!(placed.parent, c);
    assert_eq!(order(&engine, c).await, ["B", "C", "A"]);
}

#[tokio::test]
async fn last_task_moved_to_front_of_same_column() {
    let (engine, store) = engine();
    let c = column(&store);
    let ids = seed(&engine, c, &["A", "B", "C"]).await;

    engine.move_item(ids[2], to(c, 0)).await.unwrap();

    assert_eq!(order(&engine, c).await, ["C", "A", "B"]);
}

#[tokio::test]
async fn task_moved_to_end_of_other_column() {
    let (engine, store) = engine();
    let c1 = column(&store);
    let c2 = column(&store);
    let ids = seed(&engine, c1, &["A", "B"]).await;
    seed(&engine, c2, &["C"]).await;

    let placed = engine.move_item(ids[0], to(c2, 1)).await.unwrap();

    assert_eq!((placed.parent, placed.position), (c2, 1));
    assert_eq!(order(&engine, c1).await, ["B"]);
    assert_eq!(order(&engine, c2).await, ["C", "A"]);
}

#[tokio::test]
async fn task_moved_into_middle_of_other_column() {
    let (engine, store) = engine();
    let c1 = column(&store);
    let c2 = column(&store);
    let ids = seed(&engine, c1, &["A", "B", "C"]).await;
    seed(&engine, c2, &["X", "Y"]).await;

    engine.move_item(ids[1], to(c2, 1)).await.unwrap();

    assert_eq!(order(&engine, c1).await, ["A", "C"]);
    assert_eq!(order(&engine, c2).await, ["X", "B", "Y"]);
}

#[tokio::test]
async fn task_moved_into_empty_column() {
    let (engine, store) = engine();
    let c1 = column(&store);
    let c2 = column(&store);
    let ids = seed(&engine, c1, &["A", "B"]).await;

    engine.move_item(ids[1], to(c2, 0)).await.unwrap();

    assert_eq!(order(&engine, c1).await, ["A"]);
    assert_eq!(order(&engine, c2).await, ["B"]);
}

// ---------------------------------------------------------------------------
// No-op, sentinel, round trip
// ---------------------------------------------------------------------------

#[tokio::test]
async fn move_to_current_slot_writes_nothing() {
    let (engine, store) = engine();
    let c = column(&store);
    let ids = seed(&engine, c, &["A", "B", "C"]).await;
    let version_before = store.parent_version(c).unwrap();

    let placed = engine.move_item(ids[1], to(c, 1)).await.unwrap();

    assert_eq!(placed.position, 1);
    assert_eq!(order(&engine, c).await, ["A", "B", "C"]);
    assert_eq!(
        store.parent_version(c).unwrap(),
        version_before,
        "a no-op move must not commit"
    );
}

#[tokio::test]
async fn same_column_count_index_means_end() {
    let (engine, store) = engine();
    let c = column(&store);
    let ids = seed(&engine, c, &["A", "B", "C"]).await;

    let placed = engine.move_item(ids[0], to(c, 3)).await.unwrap();

    assert_eq!(placed.position, 2);
    assert_eq!(order(&engine, c).await, ["B", "C", "A"]);
}

#[tokio::test]
async fn last_item_to_end_sentinel_is_a_noop() {
    let (engine, store) = engine();
    let c = column(&store);
    let ids = seed(&engine, c, &["A", "B"]).await;
    let version_before = store.parent_version(c).unwrap();

    let placed = engine.move_item(ids[1], to(c, 2)).await.unwrap();

    assert_eq!(placed.position, 1);
    assert_eq!(store.parent_version(c).unwrap(), version_before);
}

#[tokio::test]
async fn round_trip_through_other_column_restores_order() {
    let (engine, store) = engine();
    let p = column(&store);
    let q = column(&store);
    let ids = seed(&engine, p, &["A", "B", "C", "D"]).await;
    seed(&engine, q, &["X", "Y", "Z"]).await;

    engine.move_item(ids[2], to(q, 2)).await.unwrap();
    assert_eq!(order(&engine, p).await, ["A", "B", "D"]);
    assert_eq!(order(&engine, q).await, ["X", "Y", "C", "Z"]);

    engine.move_item(ids[2], to(p, 2)).await.unwrap();
    assert_eq!(order(&engine, p).await, ["A", "B", "C", "D"]);
    assert_eq!(order(&engine, q).await, ["X", "Y", "Z"]);
}

// ---------------------------------------------------------------------------
// Append / Remove
// ---------------------------------------------------------------------------

#[tokio::test]
async fn append_assigns_current_count() {
    let (engine, store) = engine();
    let c = column(&store);
    for expected in 0..4u32 {
        let placed = engine.append(c, NewItem::new("t")).await.unwrap();
        assert_eq!(placed.position, expected);
    }
}

#[tokio::test]
async fn remove_closes_the_gap() {
    let (engine, store) = engine();
    let c = column(&store);
    let ids = seed(&engine, c, &["A", "B", "C", "D"]).await;

    let vacated = engine.remove(ids[1]).await.unwrap();

    assert_eq!(vacated.position, 1);
    assert_eq!(order(&engine, c).await, ["A", "C", "D"]);
    assert!(store.get(ids[1]).unwrap().is_none());
}

#[tokio::test]
async fn append_after_remove_reuses_the_end_slot() {
    let (engine, store) = engine();
    let c = column(&store);
    let ids = seed(&engine, c, &["A", "B", "C"]).await;
    engine.remove(ids[0]).await.unwrap();

    let placed = engine.append(c, NewItem::new("D")).await.unwrap();

    assert_eq!(placed.position, 2);
    assert_eq!(order(&engine, c).await, ["B", "C", "D"]);
}

// ---------------------------------------------------------------------------
// Errors
// ---------------------------------------------------------------------------

#[tokio::test]
async fn move_past_end_of_other_column_is_invalid_and_changes_nothing() {
    let (engine, store) = engine();
    let c1 = column(&store);
    let c2 = column(&store);
    let ids = seed(&engine, c1, &["A", "B"]).await;
    seed(&engine, c2, &["C"]).await;

    let err = engine.move_item(ids[0], to(c2, 2)).await.unwrap_err();

    assert!(
        matches!(
            err,
            ReorderError::InvalidIndex {
                index: 2,
                max: Some(1)
            }
        ),
        "got {err}"
    );
    assert_eq!(order(&engine, c1).await, ["A", "B"]);
    assert_eq!(order(&engine, c2).await, ["C"]);
}

#[tokio::test]
async fn move_past_end_sentinel_of_same_column_is_invalid() {
    let (engine, store) = engine();
    let c = column(&store);
    let ids = seed(&engine, c, &["A", "B"]).await;

    let err = engine.move_item(ids[0], to(c, 3)).await.unwrap_err();

    assert!(matches!(err, ReorderError::InvalidIndex { index: 3, .. }));
    assert_eq!(order(&engine, c).await, ["A", "B"]);
}

#[tokio::test]
async fn unknown_item_is_not_found() {
    let (engine, store) = engine();
    let c = column(&store);
    let ghost = ItemId::new();

    let err = engine.move_item(ghost, to(c, 0)).await.unwrap_err();
    assert!(matches!(err, ReorderError::NotFound(Missing::Item(id)) if id == ghost));

    let err = engine.remove(ghost).await.unwrap_err();
    assert!(matches!(err, ReorderError::NotFound(Missing::Item(_))));
}

#[tokio::test]
async fn unknown_target_parent_is_not_found() {
    let (engine, store) = engine();
    let c = column(&store);
    let ids = seed(&engine, c, &["A"]).await;
    let nowhere = ParentId::new();

    let err = engine.move_item(ids[0], to(nowhere, 0)).await.unwrap_err();
    assert!(matches!(err, ReorderError::NotFound(Missing::Parent(p)) if p == nowhere));

    let err = engine.append(nowhere, NewItem::new("x")).await.unwrap_err();
    assert!(matches!(err, ReorderError::NotFound(Missing::Parent(_))));

    assert_eq!(order(&engine, c).await, ["A"]);
}

#[tokio::test]
async fn verify_reports_dense_parent() {
    let (engine, store) = engine();
    let c = column(&store);
    seed(&engine, c, &["A", "B", "C"]).await;

    let report = engine.verify(c).await.unwrap();
    assert!(report.is_dense());
    assert_eq!(report.count, 3);
}
