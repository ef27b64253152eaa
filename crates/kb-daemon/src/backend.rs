//! Storage backend selection.
//!
//! Positions always go through a [`ReorderEngine`]; this module owns what
//! lies outside it: board rows, body edits, and keeping the task store's
//! parent registry in step with column creation and deletion. Postgres gets
//! the latter for free from foreign keys and parent row locks.
//!
//! In memory, a parent is closed before anything under it is dropped, so no
//! write can be acknowledged into a board or column that is going away.

use std::collections::BTreeMap;
use std::sync::Arc;

use anyhow::Result;
use chrono::Utc;
use kb_db::{BoardRow, NewBoard};
use kb_reorder::{Collection, ItemId, ParentId, PositionStore, StoredItem};
use kb_store_memory::MemoryStore;
use sqlx::PgPool;
use tokio::sync::RwLock;
use tracing::debug;
use uuid::Uuid;

#[derive(Clone)]
pub enum Backend {
    Memory(MemoryBackend),
    Postgres(PgPool),
}

/// Process-local boards plus one store per collection.
#[derive(Clone)]
pub struct MemoryBackend {
    boards: Arc<RwLock<BTreeMap<Uuid, BoardRow>>>,
    columns: MemoryStore,
    tasks: MemoryStore,
}

impl MemoryBackend {
    pub fn new() -> Self {
        Self {
            boards: Arc::new(RwLock::new(BTreeMap::new())),
            columns: MemoryStore::new(Collection::Columns),
            tasks: MemoryStore::new(Collection::Tasks),
        }
    }
}

impl Default for MemoryBackend {
    fn default() -> Self {
        Self::new()
    }
}

impl Backend {
    pub fn name(&self) -> &'static str {
        match self {
            Backend::Memory(_) => "memory",
            Backend::Postgres(_) => "postgres",
        }
    }

    /// The position store for `collection`.
    pub fn store(&self, collection: Collection) -> Arc<dyn PositionStore> {
        match (self, collection) {
            (Backend::Memory(m), Collection::Columns) => Arc::new(m.columns.clone()),
            (Backend::Memory(m), Collection::Tasks) => Arc::new(m.tasks.clone()),
            (Backend::Postgres(pool), c) => Arc::new(kb_db::PgPositionStore::new(pool.clone(), c)),
        }
    }

    // -----------------------------------------------------------------------
    // Boards
    // -----------------------------------------------------------------------

    pub async fn create_board(&self, owner: &str, title: &str) -> Result<BoardRow> {
        let board = NewBoard {
            id: Uuid::new_v4(),
            owner: owner.to_string(),
            title: title.to_string(),
        };
        match self {
            Backend::Memory(m) => {
                m.columns.add_parent(ParentId(board.id))?;
                let row = BoardRow {
                    id: board.id,
                    owner: board.owner,
                    title: board.title,
                    created_at_utc: Utc::now(),
                };
                m.boards.write().await.insert(row.id, row.clone());
                Ok(row)
            }
            Backend::Postgres(pool) => kb_db::insert_board(pool, &board).await,
        }
    }

    /// Newest first.
    pub async fn list_boards(&self, owner: &str) -> Result<Vec<BoardRow>> {
        match self {
            Backend::Memory(m) => {
                let boards = m.boards.read().await;
                let mut out: Vec<BoardRow> =
                    boards.values().filter(|b| b.owner == owner).cloned().collect();
                out.sort_by(|a, b| {
                    b.created_at_utc
                        .cmp(&a.created_at_utc)
                        .then_with(|| a.id.cmp(&b.id))
                });
                Ok(out)
            }
            Backend::Postgres(pool) => kb_db::list_boards_by_owner(pool, owner).await,
        }
    }

    pub async fn rename_board(&self, id: Uuid, title: &str) -> Result<Option<BoardRow>> {
        match self {
            Backend::Memory(m) => {
                let mut boards = m.boards.write().await;
                Ok(boards.get_mut(&id).map(|b| {
                    b.title = title.to_string();
                    b.clone()
                }))
            }
            Backend::Postgres(pool) => kb_db::rename_board(pool, id, title).await,
        }
    }

    /// Delete a board with its columns and their tasks. `false` if unknown.
    pub async fn delete_board(&self, id: Uuid) -> Result<bool> {
        match self {
            Backend::Memory(m) => {
                let mut boards = m.boards.write().await;
                if !boards.contains_key(&id) {
                    return Ok(false);
                }
                // Freeze the column set, then drop tasks, columns and the row
                // in that order.
                let columns = m.columns.close_parent(ParentId(id))?.unwrap_or_default();
                for column in &columns {
                    m.tasks.remove_parent(ParentId::from(*column))?;
                }
                m.columns.remove_parent(ParentId(id))?;
                boards.remove(&id);
                debug!(board = %id, columns = columns.len(), "board removed");
                Ok(true)
            }
            Backend::Postgres(pool) => kb_db::delete_board(pool, id).await,
        }
    }

    // -----------------------------------------------------------------------
    // Column parent registry
    // -----------------------------------------------------------------------

    /// Make `column` a valid task parent before it is appended to a board.
    pub fn prepare_column(&self, column: ItemId) -> Result<()> {
        if let Backend::Memory(m) = self {
            m.tasks.add_parent(column.into())?;
        }
        Ok(())
    }

    /// Refuse new tasks under `column` ahead of its removal. Returns `true`
    /// if this call closed it; only that caller should reopen it.
    pub fn close_column(&self, column: ItemId) -> Result<bool> {
        match self {
            Backend::Memory(m) => Ok(m.tasks.close_parent(column.into())?.is_some()),
            Backend::Postgres(_) => Ok(false),
        }
    }

    /// Accept tasks under `column` again after its removal failed.
    pub fn reopen_column(&self, column: ItemId) -> Result<()> {
        if let Backend::Memory(m) = self {
            m.tasks.reopen_parent(column.into())?;
        }
        Ok(())
    }

    /// Drop the task parent of a column that was removed (or never placed).
    pub fn release_column(&self, column: ItemId) -> Result<()> {
        if let Backend::Memory(m) = self {
            m.tasks.remove_parent(column.into())?;
        }
        Ok(())
    }

    // -----------------------------------------------------------------------
    // Body edits
    // -----------------------------------------------------------------------

    pub async fn rename_column(&self, id: ItemId, title: &str) -> Result<Option<StoredItem>> {
        match self {
            Backend::Memory(m) => update_body(&m.columns, id, title),
            Backend::Postgres(pool) => kb_db::rename_column(pool, id, title).await,
        }
    }

    pub async fn update_task(&self, id: ItemId, content: &str) -> Result<Option<StoredItem>> {
        match self {
            Backend::Memory(m) => update_body(&m.tasks, id, content),
            Backend::Postgres(pool) => kb_db::update_task_content(pool, id, content).await,
        }
    }
}

fn update_body(store: &MemoryStore, id: ItemId, body: &str) -> Result<Option<StoredItem>> {
    if !store.update_body(id, body)? {
        return Ok(None);
    }
    Ok(store.get(id)?)
}
