//! Error types for the reorder engine and its storage backends.

use crate::types::{ItemId, ParentId};

// ---------------------------------------------------------------------------
// Missing
// ---------------------------------------------------------------------------

/// What failed to resolve.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Missing {
    Item(ItemId),
    Parent(ParentId),
}

// ---------------------------------------------------------------------------
// StoreError
// ---------------------------------------------------------------------------

/// Failures raised by a [`PositionStore`](crate::PositionStore) or one of its
/// units of work.
#[derive(Debug)]
pub enum StoreError {
    /// The snapshot a unit of work read is stale, or the backend aborted the
    /// transaction to keep it serializable. Transient; the engine retries.
    Conflict { detail: String },
    /// A commit-time guard found a parent whose positions are not dense.
    /// The unit of work was not applied.
    Invariant { detail: String },
    /// Backend unavailable or misbehaving. Fatal to the request only.
    Backend(anyhow::Error),
}

impl StoreError {
    pub fn conflict(detail: impl Into<String>) -> Self {
        StoreError::Conflict {
            detail: detail.into(),
        }
    }

    pub fn invariant(detail: impl Into<String>) -> Self {
        StoreError::Invariant {
            detail: detail.into(),
        }
    }

    pub fn backend(err: impl Into<anyhow::Error>) -> Self {
        StoreError::Backend(err.into())
    }

    pub fn is_conflict(&self) -> bool {
        matches!(self, StoreError::Conflict { .. })
    }
}

impl std::fmt::Display for StoreError {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            StoreError::Conflict { detail } => write!(f, "concurrent update conflict: {detail}"),
            StoreError::Invariant { detail } => {
                write!(f, "dense position invariant violated: {detail}")
            }
            StoreError::Backend(e) => write!(f, "storage backend failure: {e:#}"),
        }
    }
}

impl std::error::Error for StoreError {
    fn source(&self) -> Option<&(dyn std::error::Error + 'static)> {
        match self {
            StoreError::Backend(e) => Some(&**e),
            _ => None,
        }
    }
}

// ---------------------------------------------------------------------------
// ReorderError
// ---------------------------------------------------------------------------

/// Errors surfaced to callers of [`ReorderEngine`](crate::ReorderEngine).
///
/// No variant implies a partial mutation: every operation either commits in
/// full or leaves storage untouched.
#[derive(Debug)]
pub enum ReorderError {
    /// The item or parent key does not resolve.
    NotFound(Missing),
    /// `index` lies outside `[0, max]`. `max` is `None` when the index was
    /// rejected before any parent was read (negative or not representable).
    InvalidIndex { index: i64, max: Option<u32> },
    /// Every attempt hit a concurrent update; the caller may retry later.
    ConcurrencyConflict { attempts: u32 },
    /// Storage failed for a reason other than a conflict.
    Storage(StoreError),
}

impl ReorderError {
    pub fn item_not_found(id: ItemId) -> Self {
        ReorderError::NotFound(Missing::Item(id))
    }

    pub fn parent_not_found(id: ParentId) -> Self {
        ReorderError::NotFound(Missing::Parent(id))
    }

    /// True when the engine should retry the whole unit of work.
    pub fn is_transient(&self) -> bool {
        matches!(self, ReorderError::Storage(e) if e.is_conflict())
    }
}

impl From<StoreError> for ReorderError {
    fn from(e: StoreError) -> Self {
        ReorderError::Storage(e)
    }
}

impl std::fmt::Display for ReorderError {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            ReorderError::NotFound(Missing::Item(id)) => write!(f, "item not found: {id}"),
            ReorderError::NotFound(Missing::Parent(id)) => write!(f, "parent not found: {id}"),
            ReorderError::InvalidIndex { index, max: Some(max) } => {
                write!(f, "target index {index} outside valid range 0..={max}")
            }
            ReorderError::InvalidIndex { index, max: None } => {
                write!(f, "target index {index} must be a non-negative 32-bit integer")
            }
            ReorderError::ConcurrencyConflict { attempts } => write!(
                f,
                "concurrent update conflict persisted after {attempts} attempt(s); retry later"
            ),
            ReorderError::Storage(e) => write!(f, "{e}"),
        }
    }
}

impl std::error::Error for ReorderError {
    fn source(&self) -> Option<&(dyn std::error::Error + 'static)> {
        match self {
            ReorderError::Storage(e) => Some(e),
            _ => None,
        }
    }
}

// ---------------------------------------------------------------------------
// Tests
// ---------------------------------------------------------------------------
