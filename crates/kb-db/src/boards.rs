//! Board lifecycle and body edits.
//!
//! None of these touch `position` or a parent key; ordering changes go
//! through the reorder engine. Deleting a board cascades to its columns and
//! their tasks via foreign keys, so no positions need closing.

use anyhow::{Context, Result};
use chrono::{DateTime, Utc};
use kb_reorder::{Collection, ItemId, ParentId, StoredItem};
use serde::{Deserialize, Serialize};
use sqlx::{PgPool, Row};
use uuid::Uuid;

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct BoardRow {
    pub id: Uuid,
    pub owner: String,
    pub title: String,
    pub created_at_utc: DateTime<Utc>,
}

#[derive(Debug, Clone)]
pub struct NewBoard {
    pub id: Uuid,
    pub owner: String,
    pub title: String,
}

fn board_from_row(row: &sqlx::postgres::PgRow) -> Result<BoardRow> {
    Ok(BoardRow {
        id: row.try_get("id")?,
        owner: row.try_get("owner")?,
        title: row.try_get("title")?,
        created_at_utc: row.try_get("created_at_utc")?,
    })
}

pub async fn insert_board(pool: &PgPool, board: &NewBoard) -> Result<BoardRow> {
    let row = sqlx::query(
        r#"
        insert into boards (id, owner, title)
        values ($1, $2, $3)
        returning id, owner, title, created_at_utc
        "#,
    )
    .bind(board.id)
    .bind(&board.owner)
    .bind(&board.title)
    .fetch_one(pool)
    .await
    .context("insert_board failed")?;

    board_from_row(&row)
}

pub async fn fetch_board(pool: &PgPool, id: Uuid) -> Result<Option<BoardRow>> {
    let row = sqlx::query(
        r#"
        select id, owner, title, created_at_utc
        from boards
        where id = $1
        "#,
    )
    .bind(id)
    .fetch_optional(pool)
    .await
    .context("fetch_board failed")?;

    row.as_ref().map(board_from_row).transpose()
}

/// Newest first.
pub async fn list_boards_by_owner(pool: &PgPool, owner: &str) -> Result<Vec<BoardRow>> {
    let rows = sqlx::query(
        r#"
        select id, owner, title, created_at_utc
        from boards
        where owner = $1
        order by created_at_utc desc, id
        "#,
    )
    .bind(owner)
    .fetch_all(pool)
    .await
    .context("list_boards_by_owner failed")?;

    rows.iter().map(board_from_row).collect()
}

pub async fn rename_board(pool: &PgPool, id: Uuid, title: &str) -> Result<Option<BoardRow>> {
    let row = sqlx::query(
        r#"
        update boards
        set title = $2
        where id = $1
        returning id, owner, title, created_at_utc
        "#,
    )
    .bind(id)
    .bind(title)
    .fetch_optional(pool)
    .await
    .context("rename_board failed")?;

    row.as_ref().map(board_from_row).transpose()
}

/// Returns `false` if the board did not exist.
pub async fn delete_board(pool: &PgPool, id: Uuid) -> Result<bool> {
    let res = sqlx::query("delete from boards where id = $1")
        .bind(id)
        .execute(pool)
        .await
        .context("delete_board failed")?;
    Ok(res.rows_affected() == 1)
}

pub async fn rename_column(pool: &PgPool, id: ItemId, title: &str) -> Result<Option<StoredItem>> {
    let row = sqlx::query(
        r#"
        update board_columns
        set title = $2
        where id = $1
        returning id, board_id as parent, position, title as body
        "#,
    )
    .bind(id.as_uuid())
    .bind(title)
    .fetch_optional(pool)
    .await
    .context("rename_column failed")?;

    row.as_ref().map(item_from_row).transpose()
}

pub async fn update_task_content(
    pool: &PgPool,
    id: ItemId,
    content: &str,
) -> Result<Option<StoredItem>> {
    let row = sqlx::query(
        r#"
        update tasks
        set content = $2
        where id = $1
        returning id, column_id as parent, position, content as body
        "#,
    )
    .bind(id.as_uuid())
    .bind(content)
    .fetch_optional(pool)
    .await
    .context("update_task_content failed")?;

    row.as_ref().map(item_from_row).transpose()
}

/// One column or task by id.
pub async fn fetch_item(
    pool: &PgPool,
    collection: Collection,
    id: ItemId,
) -> Result<Option<StoredItem>> {
    let sql = match collection {
        Collection::Columns => {
            "select id, board_id as parent, position, title as body from board_columns where id = $1"
        }
        Collection::Tasks => {
            "select id, column_id as parent, position, content as body from tasks where id = $1"
        }
    };
    let row = sqlx::query(sql)
        .bind(id.as_uuid())
        .fetch_optional(pool)
        .await
        .with_context(|| format!("fetch_item ({collection}) failed"))?;

    row.as_ref().map(item_from_row).transpose()
}

fn item_from_row(row: &sqlx::postgres::PgRow) -> Result<StoredItem> {
    let position: i32 = row.try_get("position")?;
    Ok(StoredItem {
        id: ItemId(row.try_get("id")?),
        parent: ParentId(row.try_get("parent")?),
        position: u32::try_from(position)
            .with_context(|| format!("negative position {position} in storage"))?,
        body: row.try_get("body")?,
    })
}
