//! Storage contract consumed by the engine.
//!
//! A [`PositionStore`] hands out [`UnitOfWork`]s. A unit of work is the
//! atomicity boundary: everything it reads is a consistent view of the
//! parents it touched, and nothing it writes is visible to anyone until
//! [`UnitOfWork::commit`] succeeds. Dropping a unit of work without
//! committing discards it.
//!
//! Implementations must be object-safe so the engine can hold an
//! `Arc<dyn PositionStore>` without knowing the backend.

use async_trait::async_trait;

use crate::error::StoreError;
use crate::plan::RangeShift;
use crate::types::{Collection, ItemId, NewItem, ParentId, ParentSnapshot, Slot, StoredItem};

#[async_trait]
pub trait UnitOfWork: Send {
    /// Current `(parent, position)` of `item`, or `None` if it does not exist.
    async fn locate(&mut self, item: ItemId) -> Result<Option<Slot>, StoreError>;

    /// Take exclusive ownership of `parent` for the rest of this unit of work
    /// and read its item count. `None` if the parent does not exist.
    ///
    /// Callers lock parents in ascending [`ParentId`] order.
    async fn lock_parent(&mut self, parent: ParentId)
        -> Result<Option<ParentSnapshot>, StoreError>;

    /// Apply a range shift; returns how many items moved.
    async fn shift(&mut self, shift: &RangeShift) -> Result<u64, StoreError>;

    /// Write the item's parent and position.
    async fn place(&mut self, item: ItemId, slot: Slot) -> Result<(), StoreError>;

    /// Insert a new item at `slot`.
    async fn insert(&mut self, item: &NewItem, slot: Slot) -> Result<(), StoreError>;

    /// Delete an item row.
    async fn delete(&mut self, item: ItemId) -> Result<(), StoreError>;

    /// Make every write of this unit visible atomically. A stale snapshot
    /// fails with [`StoreError::Conflict`] and applies nothing.
    async fn commit(&mut self) -> Result<(), StoreError>;
}

#[async_trait]
pub trait PositionStore: Send + Sync {
    /// Which collection this store holds.
    fn collection(&self) -> Collection;

    /// Open a new unit of work.
    async fn begin(&self) -> Result<Box<dyn UnitOfWork>, StoreError>;

    /// Items of `parent` ordered by position; `None` if the parent does not
    /// exist. Read-only, outside any unit of work.
    async fn list(&self, parent: ParentId) -> Result<Option<Vec<StoredItem>>, StoreError>;
}
