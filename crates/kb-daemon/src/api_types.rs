//! Request and response types for all kb-daemon HTTP endpoints.
//!
//! These types are `Serialize + Deserialize` so they can be JSON-encoded
//! by Axum and decoded by tests. No business logic lives here.

use kb_reorder::{ItemId, ParentId, StoredItem};
use serde::{Deserialize, Serialize};
use uuid::Uuid;

// ---------------------------------------------------------------------------
// /v1/health
// ---------------------------------------------------------------------------

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct HealthResponse {
    pub ok: bool,
    pub service: &'static str,
    pub version: &'static str,
    /// "memory" | "postgres"
    pub backend: &'static str,
    pub uptime_secs: u64,
}

// ---------------------------------------------------------------------------
// Errors
// ---------------------------------------------------------------------------

/// Body of every non-2xx response.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct ErrorResponse {
    /// Stable machine code: NOT_FOUND | INVALID_INDEX | INVALID_BODY |
    /// CONCURRENCY_CONFLICT | STORAGE | INTERNAL
    pub code: String,
    pub error: String,
}

// ---------------------------------------------------------------------------
// Boards
// ---------------------------------------------------------------------------

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct CreateBoardRequest {
    pub owner: String,
    pub title: String,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct OwnerQuery {
    pub owner: String,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct TitleRequest {
    pub title: String,
}

/// `GET /v1/boards/{id}/columns`: the board's columns in order, each with
/// its tasks in order.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct BoardTreeResponse {
    pub board_id: Uuid,
    pub columns: Vec<ColumnView>,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct ColumnView {
    pub id: ItemId,
    pub position: u32,
    pub title: String,
    pub tasks: Vec<TaskView>,
}

// ---------------------------------------------------------------------------
// Columns / tasks
// ---------------------------------------------------------------------------

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct ContentRequest {
    pub content: String,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct ColumnResponse {
    pub id: ItemId,
    pub board_id: ParentId,
    pub position: u32,
    pub title: String,
}

impl From<StoredItem> for ColumnResponse {
    fn from(i: StoredItem) -> Self {
        Self {
            id: i.id,
            board_id: i.parent,
            position: i.position,
            title: i.body,
        }
    }
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct TaskView {
    pub id: ItemId,
    pub column_id: ParentId,
    pub position: u32,
    pub content: String,
}

impl From<StoredItem> for TaskView {
    fn from(i: StoredItem) -> Self {
        Self {
            id: i.id,
            column_id: i.parent,
            position: i.position,
            content: i.body,
        }
    }
}

/// `POST /v1/{columns|tasks}/{id}/move`.
///
/// `target_index` is signed on the wire so a negative value reaches
/// validation and comes back as 422 instead of a decode error.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct MoveRequest {
    pub target_parent: ParentId,
    pub target_index: i64,
}
