//! Shared runtime state for kb-daemon.
//!
//! All types here are `Clone`-able (via `Arc` or copy). Handlers receive
//! `State<Arc<AppState>>` from Axum; this module owns nothing async itself.

use std::time::Duration;

use kb_reorder::{Collection, PlacedItem, ReorderEngine, RetryPolicy};
use serde::{Deserialize, Serialize};
use sqlx::PgPool;
use tokio::sync::broadcast;

use crate::backend::{Backend, MemoryBackend};

// ---------------------------------------------------------------------------
// BoardEvent (SSE event bus payload)
// ---------------------------------------------------------------------------

/// Messages broadcast over the internal event bus and surfaced as SSE events.
#[derive(Clone, Debug, Serialize, Deserialize)]
#[serde(tag = "type", rename_all = "snake_case")]
pub enum BoardEvent {
    Heartbeat {
        ts_millis: i64,
    },
    /// An item was appended or moved; `item` is its committed slot.
    Placed {
        collection: Collection,
        item: PlacedItem,
    },
    /// An item was removed; `item` is the slot it vacated.
    Removed {
        collection: Collection,
        item: PlacedItem,
    },
    LogLine {
        level: String,
        msg: String,
    },
}

impl BoardEvent {
    pub fn event_name(&self) -> &'static str {
        match self {
            BoardEvent::Heartbeat { .. } => "heartbeat",
            BoardEvent::Placed { .. } => "placed",
            BoardEvent::Removed { .. } => "removed",
            BoardEvent::LogLine { .. } => "log",
        }
    }
}

// ---------------------------------------------------------------------------
// BuildInfo
// ---------------------------------------------------------------------------

/// Static build metadata included in health responses.
#[derive(Clone, Debug, Serialize, Deserialize)]
pub struct BuildInfo {
    pub service: &'static str,
    pub version: &'static str,
}

// ---------------------------------------------------------------------------
// AppState
// ---------------------------------------------------------------------------

/// Cloneable handle shared across all Axum handlers.
#[derive(Clone)]
pub struct AppState {
    /// Broadcast bus for SSE.
    pub bus: broadcast::Sender<BoardEvent>,
    /// Static build metadata.
    pub build: BuildInfo,
    pub backend: Backend,
    /// Columns within boards.
    pub columns: ReorderEngine,
    /// Tasks within columns.
    pub tasks: ReorderEngine,
}

impl Default for AppState {
    fn default() -> Self {
        Self::new()
    }
}

impl AppState {
    /// In-memory backend with the default retry policy.
    pub fn new() -> Self {
        Self::with_backend(Backend::Memory(MemoryBackend::new()), RetryPolicy::default())
    }

    pub fn postgres(pool: PgPool, retry: RetryPolicy) -> Self {
        Self::with_backend(Backend::Postgres(pool), retry)
    }

    pub fn with_backend(backend: Backend, retry: RetryPolicy) -> Self {
        let (bus, _rx) = broadcast::channel::<BoardEvent>(1024);
        let columns = ReorderEngine::new(backend.store(Collection::Columns)).with_retry(retry);
        let tasks = ReorderEngine::new(backend.store(Collection::Tasks)).with_retry(retry);
        Self {
            bus,
            build: BuildInfo {
                service: "kb-daemon",
                version: env!("CARGO_PKG_VERSION"),
            },
            backend,
            columns,
            tasks,
        }
    }

    /// Engine owning `collection`.
    pub fn engine(&self, collection: Collection) -> &ReorderEngine {
        match collection {
            Collection::Columns => &self.columns,
            Collection::Tasks => &self.tasks,
        }
    }

    /// Best-effort publish; no subscribers is fine.
    pub fn publish(&self, ev: BoardEvent) {
        let _ = self.bus.send(ev);
    }
}

// ---------------------------------------------------------------------------
// Helpers
// ---------------------------------------------------------------------------

/// Monotonically increasing uptime since first call (process lifetime).
pub fn uptime_secs() -> u64 {
    static START: std::sync::OnceLock<std::time::Instant> = std::sync::OnceLock::new();
    START
        .get_or_init(std::time::Instant::now)
        .elapsed()
        .as_secs()
}

/// Spawn a background task that emits a heartbeat SSE every `interval`.
pub fn spawn_heartbeat(bus: broadcast::Sender<BoardEvent>, interval: Duration) {
    tokio::spawn(async move {
        let mut ticker = tokio::time::interval(interval);
        loop {
            ticker.tick().await;
            let ts = chrono::Utc::now().timestamp_millis();
            let _ = bus.send(BoardEvent::Heartbeat { ts_millis: ts });
        }
    });
}
