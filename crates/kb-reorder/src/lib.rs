//! kb-reorder
//!
//! Ordered-collection reordering engine for the task board.
//!
//! Items (columns, tasks) belong to exactly one parent (board, column) and
//! carry a `position`. For every parent with `n` items the positions are
//! exactly `{0, …, n-1}`. The engine is the only writer of `position` and
//! `parent`; it offers three mutations that keep that invariant:
//!
//! - [`ReorderEngine::append`]: insert at `count(parent)`.
//! - [`ReorderEngine::remove`]: delete and close the gap.
//! - [`ReorderEngine::move_item`]: contiguous range shift within one parent,
//!   or close-gap / open-slot across two parents.
//!
//! Every mutation runs inside a [`UnitOfWork`] obtained from a
//! [`PositionStore`]. Backends live in other crates (`kb-store-memory`,
//! `kb-db`).

mod dense;
mod engine;
mod error;
mod plan;
mod store;
mod types;

pub use dense::{check_dense, DenseReport, DenseViolation};
pub use engine::{ReorderEngine, RetryPolicy};
pub use error::{Missing, ReorderError, StoreError};
pub use plan::{plan_move, plan_remove, resolve_index, MovePlan, RangeShift};
pub use store::{PositionStore, UnitOfWork};
pub use types::{
    Collection, ItemId, MoveTarget, NewItem, ParentId, ParentSnapshot, PlacedItem, Slot,
    StoredItem,
};
