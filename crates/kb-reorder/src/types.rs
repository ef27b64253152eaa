//! Identifiers and value types shared by the engine and every store backend.

use std::fmt;

use serde::{Deserialize, Serialize};
use uuid::Uuid;

use crate::error::ReorderError;

// ---------------------------------------------------------------------------
// Identifiers
// ---------------------------------------------------------------------------

/// Opaque identifier of a positioned item (a column or a task).
#[derive(Clone, Copy, Debug, PartialEq, Eq, PartialOrd, Ord, Hash, Serialize, Deserialize)]
#[serde(transparent)]
pub struct ItemId(pub Uuid);

impl ItemId {
    pub fn new() -> Self {
        Self(Uuid::new_v4())
    }

    pub fn as_uuid(&self) -> Uuid {
        self.0
    }
}

impl Default for ItemId {
    fn default() -> Self {
        Self::new()
    }
}

impl fmt::Display for ItemId {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}", self.0)
    }
}

/// Opaque identifier of a parent container (a board or a column).
///
/// Ordering is only used to acquire parent locks in a stable order.
#[derive(Clone, Copy, Debug, PartialEq, Eq, PartialOrd, Ord, Hash, Serialize, Deserialize)]
#[serde(transparent)]
pub struct ParentId(pub Uuid);

impl ParentId {
    pub fn new() -> Self {
        Self(Uuid::new_v4())
    }

    pub fn as_uuid(&self) -> Uuid {
        self.0
    }
}

impl Default for ParentId {
    fn default() -> Self {
        Self::new()
    }
}

impl fmt::Display for ParentId {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}", self.0)
    }
}

/// A column is an item of its board and the parent of its tasks.
impl From<ItemId> for ParentId {
    fn from(id: ItemId) -> Self {
        Self(id.0)
    }
}

// ---------------------------------------------------------------------------
// Collection
// ---------------------------------------------------------------------------

/// The (item kind, parent kind) pairing an engine instance runs over.
#[derive(Clone, Copy, Debug, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum Collection {
    /// Columns ordered within a board.
    Columns,
    /// Tasks ordered within a column.
    Tasks,
}

impl Collection {
    pub fn as_str(&self) -> &'static str {
        match self {
            Collection::Columns => "columns",
            Collection::Tasks => "tasks",
        }
    }

    pub fn item_noun(&self) -> &'static str {
        match self {
            Collection::Columns => "column",
            Collection::Tasks => "task",
        }
    }

    pub fn parent_noun(&self) -> &'static str {
        match self {
            Collection::Columns => "board",
            Collection::Tasks => "column",
        }
    }
}

impl fmt::Display for Collection {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

// ---------------------------------------------------------------------------
// Slots and snapshots
// ---------------------------------------------------------------------------

/// Where an item sits: its parent and its zero-based position.
#[derive(Clone, Copy, Debug, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub struct Slot {
    pub parent: ParentId,
    pub position: u32,
}

impl Slot {
    pub fn new(parent: ParentId, position: u32) -> Self {
        Self { parent, position }
    }
}

/// A parent's item count, read once under the parent lock.
///
/// The count travels through validation and planning unchanged; nothing
/// re-queries it mid-operation.
#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub struct ParentSnapshot {
    pub parent: ParentId,
    pub count: u32,
}

impl ParentSnapshot {
    /// The slot an appended item occupies.
    pub fn end_slot(&self) -> Slot {
        Slot::new(self.parent, self.count)
    }
}

// ---------------------------------------------------------------------------
// Items
// ---------------------------------------------------------------------------

/// An item about to be appended. `body` is the column title or task content;
/// the engine stores it and never reads it.
#[derive(Clone, Debug, PartialEq, Eq)]
pub struct NewItem {
    pub id: ItemId,
    pub body: String,
}

impl NewItem {
    pub fn new(body: impl Into<String>) -> Self {
        Self {
            id: ItemId::new(),
            body: body.into(),
        }
    }
}

/// The committed placement of an item; this is the move response body.
#[derive(Clone, Copy, Debug, PartialEq, Eq, Serialize, Deserialize)]
pub struct PlacedItem {
    pub id: ItemId,
    pub parent: ParentId,
    pub position: u32,
}

impl PlacedItem {
    pub fn at(id: ItemId, slot: Slot) -> Self {
        Self {
            id,
            parent: slot.parent,
            position: slot.position,
        }
    }
}

/// A full row as returned by listings.
#[derive(Clone, Debug, PartialEq, Eq, Serialize, Deserialize)]
pub struct StoredItem {
    pub id: ItemId,
    pub parent: ParentId,
    pub position: u32,
    pub body: String,
}

// ---------------------------------------------------------------------------
// MoveTarget
// ---------------------------------------------------------------------------

/// Destination of a move as requested by a caller.
///
/// Construction rejects negative and out-of-range indices, so a `MoveTarget`
/// never reaches the atomic section with an index that cannot be valid for
/// any parent.
#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub struct MoveTarget {
    pub parent: ParentId,
    pub index: u32,
}

impl MoveTarget {
    pub fn new(parent: ParentId, index: i64) -> Result<Self, ReorderError> {
        let index = u32::try_from(index)
            .map_err(|_| ReorderError::InvalidIndex { index, max: None })?;
        Ok(Self { parent, index })
    }
}

// ---------------------------------------------------------------------------
// Tests
// ---------------------------------------------------------------------------
