//! Scenario: cascade deletes on the in-memory backend never drop a write
//! they already acknowledged.
//!
//! Each test steps a delete by hand and interleaves a competing write at
//! the point where the delete has started but not finished.

use std::sync::Arc;

use kb_daemon::state::AppState;
use kb_reorder::{
    Collection, ItemId, Missing, NewItem, ParentId, PositionStore, ReorderError, UnitOfWork,
};

async fn board_with_column(st: &AppState) -> (ParentId, ItemId) {
    let board = st.backend.create_board("alice", "Sprint").await.unwrap();
    let column = NewItem::new("Todo");
    let id = column.id;
    st.backend.prepare_column(id).unwrap();
    st.columns.append(ParentId(board.id), column).await.unwrap();
    (ParentId(board.id), id)
}

fn is_missing_parent(r: &Result<impl std::fmt::Debug, ReorderError>) -> bool {
    matches!(r, Err(ReorderError::NotFound(Missing::Parent(_))))
}

#[tokio::test]
async fn task_write_racing_a_column_delete_is_refused_not_dropped() {
    let st = Arc::new(AppState::new());
    let (board, column) = board_with_column(&st).await;
    st.tasks
        .append(column.into(), NewItem::new("kept until delete"))
        .await
        .unwrap();

    // A task append already holding the column.
    let tasks = st.backend.store(Collection::Tasks);
    let mut in_flight = tasks.begin().await.unwrap();
    let snap = in_flight.lock_parent(column.into()).await.unwrap().unwrap();
    in_flight
        .insert(&NewItem::new("in flight"), snap.end_slot())
        .await
        .unwrap();

    // Delete step 1: the column stops taking tasks.
    assert!(st.backend.close_column(column).unwrap());

    let err = in_flight.commit().await.unwrap_err();
    assert!(err.is_conflict(), "expected conflict, got {err}");

    let late = st.tasks.append(column.into(), NewItem::new("late")).await;
    assert!(is_missing_parent(&late), "late append acked: {late:?}");

    // The column is still on its board until the remove commits.
    let listed = st.columns.list(board).await.unwrap();
    assert!(listed.iter().any(|c| c.id == column));

    // Delete steps 2 and 3.
    st.columns.remove(column).await.unwrap();
    st.backend.release_column(column).unwrap();

    assert!(st.columns.list(board).await.unwrap().is_empty());
    assert!(is_missing_parent(&st.tasks.list(column.into()).await));
}

#[tokio::test]
async fn only_the_closing_caller_owns_the_reopen() {
    let st = AppState::new();
    let (_, column) = board_with_column(&st).await;

    assert!(st.backend.close_column(column).unwrap());
    assert!(!st.backend.close_column(column).unwrap());

    st.backend.reopen_column(column).unwrap();
    let placed = st
        .tasks
        .append(column.into(), NewItem::new("after reopen"))
        .await
        .unwrap();
    assert_eq!(placed.position, 0);
}

#[tokio::test]
async fn writes_racing_a_board_delete_are_refused_not_dropped() {
    let st = AppState::new();
    let (board, column) = board_with_column(&st).await;

    // A column append and a task append, both holding their parent.
    let columns = st.backend.store(Collection::Columns);
    let mut column_write = columns.begin().await.unwrap();
    let snap = column_write.lock_parent(board).await.unwrap().unwrap();
    column_write
        .insert(&NewItem::new("Done"), snap.end_slot())
        .await
        .unwrap();

    let tasks = st.backend.store(Collection::Tasks);
    let mut task_write = tasks.begin().await.unwrap();
    let snap = task_write.lock_parent(column.into()).await.unwrap().unwrap();
    task_write
        .insert(&NewItem::new("in flight"), snap.end_slot())
        .await
        .unwrap();

    assert!(st.backend.delete_board(board.as_uuid()).await.unwrap());

    assert!(column_write.commit().await.unwrap_err().is_conflict());
    assert!(task_write.commit().await.unwrap_err().is_conflict());

    let late = st.columns.append(board, NewItem::new("late")).await;
    assert!(is_missing_parent(&late), "late column acked: {late:?}");
    assert!(is_missing_parent(&st.tasks.list(column.into()).await));
    assert!(st.backend.list_boards("alice").await.unwrap().is_empty());
}
