//! The reorder engine: Append / Remove / Move as explicit units of work.
//!
//! Each attempt follows the same shape:
//!
//! 1. locate the item (if any) to learn which parents are involved;
//! 2. lock those parents in ascending key order and snapshot their counts;
//! 3. re-locate the item under the locks; a changed parent means the first
//!    read was stale and the attempt is abandoned as a conflict;
//! 4. validate and plan against the snapshot, apply the shifts, commit.
//!
//! Conflicts are retried with exponential backoff up to
//! [`RetryPolicy::max_retries`] times, then surfaced as
//! [`ReorderError::ConcurrencyConflict`].

use std::future::Future;
use std::sync::Arc;
use std::time::Duration;

use tracing::{debug, info, warn};

use crate::dense::{check_dense, DenseReport};
use crate::error::{ReorderError, StoreError};
use crate::plan::{plan_move, plan_remove, resolve_index};
use crate::store::{PositionStore, UnitOfWork};
use crate::types::{
    Collection, ItemId, MoveTarget, NewItem, ParentId, ParentSnapshot, PlacedItem, Slot,
    StoredItem,
};

// ---------------------------------------------------------------------------
// RetryPolicy
// ---------------------------------------------------------------------------

/// Bounded retry for transient conflicts.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct RetryPolicy {
    /// Retries after the first attempt. `0` disables retrying.
    pub max_retries: u32,
    /// Delay before the first retry; doubles on each further retry.
    pub backoff: Duration,
}

impl Default for RetryPolicy {
    fn default() -> Self {
        Self {
            max_retries: 5,
            backoff: Duration::from_millis(5),
        }
    }
}

impl RetryPolicy {
    pub fn new(max_retries: u32, backoff: Duration) -> Self {
        Self {
            max_retries,
            backoff,
        }
    }

    /// Delay before retry number `retry` (0-based). Capped at 64x the base.
    pub fn delay(&self, retry: u32) -> Duration {
        self.backoff.saturating_mul(1u32 << retry.min(6))
    }
}

// ---------------------------------------------------------------------------
// ReorderEngine
// ---------------------------------------------------------------------------

/// Owns the position and parent fields of one collection.
///
/// Cheap to clone; clones share the store.
#[derive(Clone)]
pub struct ReorderEngine {
    store: Arc<dyn PositionStore>,
    retry: RetryPolicy,
}

impl ReorderEngine {
    pub fn new(store: Arc<dyn PositionStore>) -> Self {
        Self {
            store,
            retry: RetryPolicy::default(),
        }
    }

    pub fn with_retry(mut self, retry: RetryPolicy) -> Self {
        self.retry = retry;
        self
    }

    pub fn collection(&self) -> Collection {
        self.store.collection()
    }

    pub fn retry_policy(&self) -> RetryPolicy {
        self.retry
    }

    /// Append `item` at the end of `parent`.
    pub async fn append(&self, parent: ParentId, item: NewItem) -> Result<PlacedItem, ReorderError> {
        let item = &item;
        self.retrying("append", move || self.try_append(parent, item))
            .await
    }

    /// Remove `item`, closing the gap it leaves. Returns the vacated slot.
    pub async fn remove(&self, item: ItemId) -> Result<PlacedItem, ReorderError> {
        self.retrying("remove", move || self.try_remove(item)).await
    }

    /// Move `item` to `target`, shifting siblings in the source and target
    /// parents so both stay dense. Returns the committed placement.
    pub async fn move_item(
        &self,
        item: ItemId,
        target: MoveTarget,
    ) -> Result<PlacedItem, ReorderError> {
        self.retrying("move", move || self.try_move(item, target))
            .await
    }

    /// Items of `parent` in position order.
    pub async fn list(&self, parent: ParentId) -> Result<Vec<StoredItem>, ReorderError> {
        self.store
            .list(parent)
            .await?
            .ok_or_else(|| ReorderError::parent_not_found(parent))
    }

    /// Check the dense invariant for `parent`.
    pub async fn verify(&self, parent: ParentId) -> Result<DenseReport, ReorderError> {
        let items = self.list(parent).await?;
        let violation = check_dense(items.iter().map(|i| i.position)).err();
        if let Some(v) = violation {
            warn!(collection = %self.collection(), %parent, violation = %v, "dense check failed");
        }
        Ok(DenseReport {
            parent,
            count: items.len() as u32,
            violation,
        })
    }

    // -----------------------------------------------------------------------
    // Attempts
    // -----------------------------------------------------------------------

    async fn try_append(&self, parent: ParentId, item: &NewItem) -> Result<PlacedItem, ReorderError> {
        let mut uow = self.store.begin().await?;
        let snapshot = uow
            .lock_parent(parent)
            .await?
            .ok_or_else(|| ReorderError::parent_not_found(parent))?;

        let slot = snapshot.end_slot();
        uow.insert(item, slot).await?;
        uow.commit().await?;

        info!(
            collection = %self.collection(),
            item = %item.id,
            %parent,
            position = slot.position,
            "append committed"
        );
        Ok(PlacedItem::at(item.id, slot))
    }

    async fn try_remove(&self, item: ItemId) -> Result<PlacedItem, ReorderError> {
        let mut uow = self.store.begin().await?;
        let seen = locate_existing(uow.as_mut(), item).await?;
        lock_source(uow.as_mut(), seen.parent).await?;
        let current = relocate(uow.as_mut(), item, seen).await?;

        let moved = uow.shift(&plan_remove(current)).await?;
        uow.delete(item).await?;
        uow.commit().await?;

        info!(
            collection = %self.collection(),
            %item,
            parent = %current.parent,
            position = current.position,
            shifted = moved,
            "remove committed"
        );
        Ok(PlacedItem::at(item, current))
    }

    async fn try_move(&self, item: ItemId, target: MoveTarget) -> Result<PlacedItem, ReorderError> {
        let mut uow = self.store.begin().await?;
        let seen = locate_existing(uow.as_mut(), item).await?;
        let target_snapshot = lock_pair(uow.as_mut(), seen.parent, target.parent).await?;
        let current = relocate(uow.as_mut(), item, seen).await?;

        let position = resolve_index(current, target_snapshot, target.index)?;
        let destination = Slot::new(target.parent, position);
        let plan = plan_move(current, destination);

        let Some(place) = plan.place else {
            debug!(collection = %self.collection(), %item, "move is a no-op");
            return Ok(PlacedItem::at(item, current));
        };

        let mut shifted = 0u64;
        for shift in &plan.shifts {
            shifted += uow.shift(shift).await?;
        }
        uow.place(item, place).await?;
        uow.commit().await?;

        info!(
            collection = %self.collection(),
            %item,
            from_parent = %current.parent,
            from_position = current.position,
            to_parent = %place.parent,
            to_position = place.position,
            shifted,
            "move committed"
        );
        Ok(PlacedItem::at(item, place))
    }

    // -----------------------------------------------------------------------
    // Retry loop
    // -----------------------------------------------------------------------

    async fn retrying<T, F, Fut>(&self, op: &'static str, mut attempt: F) -> Result<T, ReorderError>
    where
        F: FnMut() -> Fut,
        Fut: Future<Output = Result<T, ReorderError>>,
    {
        let mut retries = 0u32;
        loop {
            match attempt().await {
                Err(e) if e.is_transient() => {
                    if retries >= self.retry.max_retries {
                        warn!(
                            collection = %self.collection(),
                            op,
                            attempts = retries + 1,
                            error = %e,
                            "conflict retries exhausted"
                        );
                        return Err(ReorderError::ConcurrencyConflict {
                            attempts: retries + 1,
                        });
                    }
                    let delay = self.retry.delay(retries);
                    debug!(
                        collection = %self.collection(),
                        op,
                        retry = retries + 1,
                        delay_ms = delay.as_millis() as u64,
                        error = %e,
                        "conflict; retrying"
                    );
                    tokio::time::sleep(delay).await;
                    retries += 1;
                }
                other => return other,
            }
        }
    }
}

// ---------------------------------------------------------------------------
// Helpers
// ---------------------------------------------------------------------------

async fn locate_existing(uow: &mut dyn UnitOfWork, item: ItemId) -> Result<Slot, ReorderError> {
    uow.locate(item)
        .await?
        .ok_or_else(|| ReorderError::item_not_found(item))
}

/// The source parent of an existing item vanished between the first read
/// and the lock: a concurrent delete. Retrying re-resolves the item.
async fn lock_source(uow: &mut dyn UnitOfWork, parent: ParentId) -> Result<ParentSnapshot, ReorderError> {
    uow.lock_parent(parent).await?.ok_or_else(|| {
        StoreError::conflict(format!("source parent {parent} disappeared before lock")).into()
    })
}

/// Lock source and target in ascending key order. Returns the target snapshot.
async fn lock_pair(
    uow: &mut dyn UnitOfWork,
    source: ParentId,
    target: ParentId,
) -> Result<ParentSnapshot, ReorderError> {
    if source == target {
        return lock_source(uow, source).await;
    }

    let lock_target = |snap: Option<ParentSnapshot>| {
        snap.ok_or_else(|| ReorderError::parent_not_found(target))
    };

    if source < target {
        lock_source(uow, source).await?;
        lock_target(uow.lock_parent(target).await?)
    } else {
        let snap = lock_target(uow.lock_parent(target).await?)?;
        lock_source(uow, source).await?;
        Ok(snap)
    }
}

/// Re-read the item under the parent locks. If it left `seen.parent` in the
/// meantime the locks taken are the wrong ones.
async fn relocate(uow: &mut dyn UnitOfWork, item: ItemId, seen: Slot) -> Result<Slot, ReorderError> {
    let current = uow.locate(item).await?.ok_or_else(|| {
        ReorderError::from(StoreError::conflict(format!(
            "item {item} deleted concurrently"
        )))
    })?;
    if current.parent != seen.parent {
        return Err(StoreError::conflict(format!(
            "item {item} moved from {} to {} before lock",
            seen.parent, current.parent
        ))
        .into());
    }
    Ok(current)
}

// ---------------------------------------------------------------------------
// Tests
// ---------------------------------------------------------------------------

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn retry_delay_doubles_and_caps() {
        let p = RetryPolicy::new(10, Duration::from_millis(5));
        assert_eq!(p.delay(0), Duration::from_millis(5));
        assert_eq!(p.delay(1), Duration::from_millis(10));
        assert_eq!(p.delay(3), Duration::from_millis(40));
        assert_eq!(p.delay(6), Duration::from_millis(320));
        assert_eq!(p.delay(20), Duration::from_millis(320));
    }

    #[test]
    fn default_policy_retries_five_times() {
        assert_eq!(RetryPolicy::default().max_retries, 5);
    }
}
