//! Axum router and all HTTP handlers for kb-daemon.
//!
//! `build_router` is the single entry point; `main.rs` calls it and attaches
//! middleware layers. Every position change goes through the state's
//! reorder engines; handlers only validate input, translate errors and
//! publish board events.

use std::{convert::Infallible, sync::Arc};

use axum::{
    extract::{Path, Query, State},
    http::{HeaderMap, HeaderValue, StatusCode},
    response::{
        sse::{Event, KeepAlive, Sse},
        IntoResponse, Response,
    },
    routing::{get, patch, post},
    Json, Router,
};
use futures_util::{Stream, StreamExt};
use kb_reorder::{
    Collection, ItemId, Missing, MoveTarget, NewItem, ParentId, PlacedItem, ReorderError,
};
use tokio::sync::broadcast;
use tokio_stream::wrappers::BroadcastStream;
use tracing::{error, info, warn};
use uuid::Uuid;

use crate::{
    api_types::{
        BoardTreeResponse, ColumnResponse, ColumnView, ContentRequest, CreateBoardRequest,
        ErrorResponse, HealthResponse, MoveRequest, OwnerQuery, TaskView, TitleRequest,
    },
    state::{uptime_secs, AppState, BoardEvent},
};

// ---------------------------------------------------------------------------
// Router
// ---------------------------------------------------------------------------

/// Build the complete application router wired to the given shared state.
///
/// Middleware layers (CORS, tracing) are **not** applied here; `main.rs`
/// attaches them after this call so tests can use the bare router.
pub fn build_router(state: Arc<AppState>) -> Router {
    Router::new()
        .route("/v1/health", get(health))
        .route("/v1/stream", get(stream))
        .route("/v1/boards", post(create_board).get(list_boards))
        .route("/v1/boards/:id", patch(rename_board).delete(delete_board))
        .route("/v1/boards/:id/columns", get(board_tree).post(add_column))
        .route("/v1/columns/:id", patch(rename_column).delete(delete_column))
        .route("/v1/columns/:id/move", post(move_column))
        .route("/v1/columns/:id/tasks", post(add_task))
        .route("/v1/tasks/:id", patch(edit_task).delete(delete_task))
        .route("/v1/tasks/:id/move", post(move_task))
        .with_state(state)
}

// ---------------------------------------------------------------------------
// Errors
// ---------------------------------------------------------------------------

/// Handler error; every variant renders as an [`ErrorResponse`].
#[derive(Debug)]
pub(crate) enum ApiError {
    Reorder(ReorderError),
    NotFound(String),
    InvalidBody(String),
    Internal(anyhow::Error),
}

impl From<ReorderError> for ApiError {
    fn from(e: ReorderError) -> Self {
        ApiError::Reorder(e)
    }
}

impl From<anyhow::Error> for ApiError {
    fn from(e: anyhow::Error) -> Self {
        ApiError::Internal(e)
    }
}

impl ApiError {
    fn parts(&self) -> (StatusCode, &'static str, String) {
        match self {
            ApiError::Reorder(e) => {
                let (status, code) = match e {
                    ReorderError::NotFound(_) => (StatusCode::NOT_FOUND, "NOT_FOUND"),
                    ReorderError::InvalidIndex { .. } => {
                        (StatusCode::UNPROCESSABLE_ENTITY, "INVALID_INDEX")
                    }
                    ReorderError::ConcurrencyConflict { .. } => {
                        (StatusCode::CONFLICT, "CONCURRENCY_CONFLICT")
                    }
                    ReorderError::Storage(_) => (StatusCode::INTERNAL_SERVER_ERROR, "STORAGE"),
                };
                (status, code, e.to_string())
            }
            ApiError::NotFound(msg) => (StatusCode::NOT_FOUND, "NOT_FOUND", msg.clone()),
            ApiError::InvalidBody(msg) => {
                (StatusCode::UNPROCESSABLE_ENTITY, "INVALID_BODY", msg.clone())
            }
            ApiError::Internal(e) => (
                StatusCode::INTERNAL_SERVER_ERROR,
                "INTERNAL",
                format!("{e:#}"),
            ),
        }
    }
}

impl IntoResponse for ApiError {
    fn into_response(self) -> Response {
        let (status, code, msg) = self.parts();
        if status.is_server_error() {
            error!(code, error = %msg, "request failed");
        } else {
            warn!(code, status = status.as_u16(), error = %msg, "request rejected");
        }
        (
            status,
            Json(ErrorResponse {
                code: code.to_string(),
                error: msg,
            }),
        )
            .into_response()
    }
}

/// Trimmed, non-empty body text.
fn non_empty(field: &str, raw: &str) -> Result<String, ApiError> {
    let t = raw.trim();
    if t.is_empty() {
        return Err(ApiError::InvalidBody(format!("{field} must not be empty")));
    }
    Ok(t.to_string())
}

// ---------------------------------------------------------------------------
// GET /v1/health
// ---------------------------------------------------------------------------

pub(crate) async fn health(State(st): State<Arc<AppState>>) -> impl IntoResponse {
    (
        StatusCode::OK,
        Json(HealthResponse {
            ok: true,
            service: st.build.service,
            version: st.build.version,
            backend: st.backend.name(),
            uptime_secs: uptime_secs(),
        }),
    )
}

// ---------------------------------------------------------------------------
// Boards
// ---------------------------------------------------------------------------

pub(crate) async fn create_board(
    State(st): State<Arc<AppState>>,
    Json(req): Json<CreateBoardRequest>,
) -> Result<Response, ApiError> {
    let owner = non_empty("owner", &req.owner)?;
    let title = non_empty("title", &req.title)?;
    let board = st.backend.create_board(&owner, &title).await?;
    info!(board = %board.id, %owner, "board created");
    Ok((StatusCode::CREATED, Json(board)).into_response())
}

pub(crate) async fn list_boards(
    State(st): State<Arc<AppState>>,
    Query(q): Query<OwnerQuery>,
) -> Result<Response, ApiError> {
    let boards = st.backend.list_boards(&q.owner).await?;
    Ok(Json(boards).into_response())
}

pub(crate) async fn rename_board(
    State(st): State<Arc<AppState>>,
    Path(id): Path<Uuid>,
    Json(req): Json<TitleRequest>,
) -> Result<Response, ApiError> {
    let title = non_empty("title", &req.title)?;
    match st.backend.rename_board(id, &title).await? {
        Some(board) => Ok(Json(board).into_response()),
        None => Err(ApiError::NotFound(format!("board {id} not found"))),
    }
}

pub(crate) async fn delete_board(
    State(st): State<Arc<AppState>>,
    Path(id): Path<Uuid>,
) -> Result<Response, ApiError> {
    if !st.backend.delete_board(id).await? {
        return Err(ApiError::NotFound(format!("board {id} not found")));
    }
    info!(board = %id, "board deleted");
    st.publish(BoardEvent::LogLine {
        level: "INFO".to_string(),
        msg: format!("board {id} deleted"),
    });
    Ok(StatusCode::NO_CONTENT.into_response())
}

/// Columns of a board in order, each with its tasks in order.
pub(crate) async fn board_tree(
    State(st): State<Arc<AppState>>,
    Path(id): Path<Uuid>,
) -> Result<Response, ApiError> {
    let columns = st.columns.list(ParentId(id)).await?;
    let mut out = Vec::with_capacity(columns.len());
    for column in columns {
        let tasks = match st.tasks.list(column.id.into()).await {
            Ok(tasks) => tasks,
            // Deleted between the two reads.
            Err(ReorderError::NotFound(Missing::Parent(_))) => continue,
            Err(e) => return Err(e.into()),
        };
        out.push(ColumnView {
            id: column.id,
            position: column.position,
            title: column.body,
            tasks: tasks.into_iter().map(TaskView::from).collect(),
        });
    }
    Ok(Json(BoardTreeResponse {
        board_id: id,
        columns: out,
    })
    .into_response())
}

// ---------------------------------------------------------------------------
// Columns
// ---------------------------------------------------------------------------

pub(crate) async fn add_column(
    State(st): State<Arc<AppState>>,
    Path(board): Path<Uuid>,
    Json(req): Json<TitleRequest>,
) -> Result<Response, ApiError> {
    let title = non_empty("title", &req.title)?;
    let item = NewItem::new(title.clone());
    let id = item.id;

    st.backend.prepare_column(id)?;
    let placed = match st.columns.append(ParentId(board), item).await {
        Ok(p) => p,
        Err(e) => {
            if let Err(release) = st.backend.release_column(id) {
                warn!(column = %id, error = %release, "failed to release unplaced column");
            }
            return Err(e.into());
        }
    };

    st.publish(BoardEvent::Placed {
        collection: Collection::Columns,
        item: placed,
    });
    Ok((
        StatusCode::CREATED,
        Json(ColumnResponse {
            id,
            board_id: placed.parent,
            position: placed.position,
            title,
        }),
    )
        .into_response())
}

pub(crate) async fn rename_column(
    State(st): State<Arc<AppState>>,
    Path(id): Path<Uuid>,
    Json(req): Json<TitleRequest>,
) -> Result<Response, ApiError> {
    let title = non_empty("title", &req.title)?;
    match st.backend.rename_column(ItemId(id), &title).await? {
        Some(column) => Ok(Json(ColumnResponse::from(column)).into_response()),
        None => Err(ReorderError::item_not_found(ItemId(id)).into()),
    }
}

pub(crate) async fn delete_column(
    State(st): State<Arc<AppState>>,
    Path(id): Path<Uuid>,
) -> Result<Response, ApiError> {
    let column = ItemId(id);
    let closed = st.backend.close_column(column)?;
    let vacated = match st.columns.remove(column).await {
        Ok(v) => v,
        Err(e) => {
            if closed {
                if let Err(reopen) = st.backend.reopen_column(column) {
                    warn!(%column, error = %reopen, "failed to reopen column");
                }
            }
            return Err(e.into());
        }
    };
    st.backend.release_column(column)?;
    st.publish(BoardEvent::Removed {
        collection: Collection::Columns,
        item: vacated,
    });
    Ok(StatusCode::NO_CONTENT.into_response())
}

pub(crate) async fn move_column(
    State(st): State<Arc<AppState>>,
    Path(id): Path<Uuid>,
    Json(req): Json<MoveRequest>,
) -> Result<Response, ApiError> {
    let placed = move_in(&st, Collection::Columns, ItemId(id), req).await?;
    Ok(Json(placed).into_response())
}

// ---------------------------------------------------------------------------
// Tasks
// ---------------------------------------------------------------------------

pub(crate) async fn add_task(
    State(st): State<Arc<AppState>>,
    Path(column): Path<Uuid>,
    Json(req): Json<ContentRequest>,
) -> Result<Response, ApiError> {
    let content = non_empty("content", &req.content)?;
    let placed = st
        .tasks
        .append(ParentId(column), NewItem::new(content.clone()))
        .await?;
    st.publish(BoardEvent::Placed {
        collection: Collection::Tasks,
        item: placed,
    });
    Ok((
        StatusCode::CREATED,
        Json(TaskView {
            id: placed.id,
            column_id: placed.parent,
            position: placed.position,
            content,
        }),
    )
        .into_response())
}

pub(crate) async fn edit_task(
    State(st): State<Arc<AppState>>,
    Path(id): Path<Uuid>,
    Json(req): Json<ContentRequest>,
) -> Result<Response, ApiError> {
    let content = non_empty("content", &req.content)?;
    match st.backend.update_task(ItemId(id), &content).await? {
        Some(task) => Ok(Json(TaskView::from(task)).into_response()),
        None => Err(ReorderError::item_not_found(ItemId(id)).into()),
    }
}

pub(crate) async fn delete_task(
    State(st): State<Arc<AppState>>,
    Path(id): Path<Uuid>,
) -> Result<Response, ApiError> {
    let vacated = st.tasks.remove(ItemId(id)).await?;
    st.publish(BoardEvent::Removed {
        collection: Collection::Tasks,
        item: vacated,
    });
    Ok(StatusCode::NO_CONTENT.into_response())
}

pub(crate) async fn move_task(
    State(st): State<Arc<AppState>>,
    Path(id): Path<Uuid>,
    Json(req): Json<MoveRequest>,
) -> Result<Response, ApiError> {
    let placed = move_in(&st, Collection::Tasks, ItemId(id), req).await?;
    Ok(Json(placed).into_response())
}

async fn move_in(
    st: &AppState,
    collection: Collection,
    id: ItemId,
    req: MoveRequest,
) -> Result<PlacedItem, ApiError> {
    let target = MoveTarget::new(req.target_parent, req.target_index)?;
    let placed = st.engine(collection).move_item(id, target).await?;
    st.publish(BoardEvent::Placed {
        collection,
        item: placed,
    });
    Ok(placed)
}

// ---------------------------------------------------------------------------
// GET /v1/stream  (SSE)
// ---------------------------------------------------------------------------

pub(crate) async fn stream(State(st): State<Arc<AppState>>) -> Response {
    let mut headers = HeaderMap::new();
    headers.insert("Cache-Control", HeaderValue::from_static("no-cache"));
    headers.insert("Connection", HeaderValue::from_static("keep-alive"));

    let rx = st.bus.subscribe();
    let events = broadcast_to_sse(rx);

    (headers, Sse::new(events).keep_alive(KeepAlive::new())).into_response()
}

fn broadcast_to_sse(
    rx: broadcast::Receiver<BoardEvent>,
) -> impl Stream<Item = Result<Event, Infallible>> {
    BroadcastStream::new(rx).filter_map(|msg| async move {
        match msg {
            Ok(m) => {
                let data = serde_json::to_string(&m).ok()?;
                Some(Ok(Event::default().event(m.event_name()).data(data)))
            }
            Err(_) => None, // lagged / closed
        }
    })
}
