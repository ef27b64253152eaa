//! In-memory position store with optimistic concurrency.
//!
//! Design:
//! - Every parent carries a version number, bumped by each commit that
//!   touches one of its items.
//! - A unit of work reads through to the shared state and remembers the
//!   version of every parent it observed. Writes go to a private overlay.
//! - `commit` takes the state lock once, rejects the unit with
//!   `StoreError::Conflict` if any observed version moved, re-checks the
//!   dense invariant of every touched parent against state + overlay, and
//!   only then applies the overlay and bumps versions.
//! - A parent can be closed ahead of its removal. A closed parent still
//!   lists its items but refuses new units of work, and closing bumps its
//!   version so units already holding it fail at commit.
//!
//! Used by the daemon when no database is configured and by tests.

use std::collections::{BTreeMap, BTreeSet, HashMap};
use std::sync::{Arc, Mutex, MutexGuard};

use async_trait::async_trait;
use kb_reorder::{
    check_dense, Collection, ItemId, NewItem, ParentId, ParentSnapshot, PositionStore,
    RangeShift, Slot, StoreError, StoredItem, UnitOfWork,
};
use tracing::debug;

// ---------------------------------------------------------------------------
// Shared state
// ---------------------------------------------------------------------------

#[derive(Debug, Default)]
struct MemState {
    parents: HashMap<ParentId, ParentRec>,
    items: HashMap<ItemId, ItemRec>,
}

#[derive(Debug, Default)]
struct ParentRec {
    version: u64,
    closed: bool,
    members: BTreeSet<ItemId>,
}

#[derive(Debug, Clone)]
struct ItemRec {
    parent: ParentId,
    position: u32,
    body: String,
}

impl ItemRec {
    fn slot(&self) -> Slot {
        Slot::new(self.parent, self.position)
    }
}

fn lock_state(shared: &Mutex<MemState>) -> Result<MutexGuard<'_, MemState>, StoreError> {
    shared
        .lock()
        .map_err(|_| StoreError::backend(anyhow::anyhow!("memory store mutex poisoned")))
}

// ---------------------------------------------------------------------------
// MemoryStore
// ---------------------------------------------------------------------------

/// One collection held in process memory. Clones share state.
#[derive(Clone, Debug)]
pub struct MemoryStore {
    collection: Collection,
    shared: Arc<Mutex<MemState>>,
}

impl MemoryStore {
    pub fn new(collection: Collection) -> Self {
        Self {
            collection,
            shared: Arc::new(Mutex::new(MemState::default())),
        }
    }

    /// Register a parent. Returns `false` if it already existed.
    pub fn add_parent(&self, parent: ParentId) -> Result<bool, StoreError> {
        let mut st = lock_state(&self.shared)?;
        if st.parents.contains_key(&parent) {
            return Ok(false);
        }
        st.parents.insert(parent, ParentRec::default());
        Ok(true)
    }

    /// Stop accepting writes under `parent`. Returns its members if this
    /// call closed it; `None` if it is unknown or was already closed.
    pub fn close_parent(&self, parent: ParentId) -> Result<Option<Vec<ItemId>>, StoreError> {
        let mut st = lock_state(&self.shared)?;
        let Some(rec) = st.parents.get_mut(&parent) else {
            return Ok(None);
        };
        if rec.closed {
            return Ok(None);
        }
        rec.closed = true;
        rec.version += 1;
        debug!(collection = %self.collection, %parent, "parent closed");
        Ok(Some(rec.members.iter().copied().collect()))
    }

    /// Undo [`close_parent`](Self::close_parent). Returns `false` if the
    /// parent is unknown or was open.
    pub fn reopen_parent(&self, parent: ParentId) -> Result<bool, StoreError> {
        let mut st = lock_state(&self.shared)?;
        match st.parents.get_mut(&parent) {
            Some(rec) if rec.closed => {
                rec.closed = false;
                debug!(collection = %self.collection, %parent, "parent reopened");
                Ok(true)
            }
            _ => Ok(false),
        }
    }

    /// Drop a parent together with all of its items (cascade). Returns the
    /// removed item ids, or `None` if the parent did not exist.
    pub fn remove_parent(&self, parent: ParentId) -> Result<Option<Vec<ItemId>>, StoreError> {
        let mut st = lock_state(&self.shared)?;
        let Some(rec) = st.parents.remove(&parent) else {
            return Ok(None);
        };
        for id in &rec.members {
            st.items.remove(id);
        }
        debug!(collection = %self.collection, %parent, dropped = rec.members.len(), "parent removed");
        Ok(Some(rec.members.into_iter().collect()))
    }

    /// Replace an item's body. Positions are untouched, so no version bump.
    pub fn update_body(&self, item: ItemId, body: &str) -> Result<bool, StoreError> {
        let mut st = lock_state(&self.shared)?;
        match st.items.get_mut(&item) {
            Some(rec) => {
                rec.body = body.to_string();
                Ok(true)
            }
            None => Ok(false),
        }
    }

    /// Snapshot of one item.
    pub fn get(&self, item: ItemId) -> Result<Option<StoredItem>, StoreError> {
        let st = lock_state(&self.shared)?;
        Ok(st.items.get(&item).map(|rec| StoredItem {
            id: item,
            parent: rec.parent,
            position: rec.position,
            body: rec.body.clone(),
        }))
    }

    /// Current version of a parent.
    pub fn parent_version(&self, parent: ParentId) -> Result<Option<u64>, StoreError> {
        let st = lock_state(&self.shared)?;
        Ok(st.parents.get(&parent).map(|p| p.version))
    }
}

#[async_trait]
impl PositionStore for MemoryStore {
    fn collection(&self) -> Collection {
        self.collection
    }

    async fn begin(&self) -> Result<Box<dyn UnitOfWork>, StoreError> {
        Ok(Box::new(MemoryUnitOfWork {
            collection: self.collection,
            shared: Arc::clone(&self.shared),
            observed: BTreeMap::new(),
            overlay: BTreeMap::new(),
        }))
    }

    async fn list(&self, parent: ParentId) -> Result<Option<Vec<StoredItem>>, StoreError> {
        let st = lock_state(&self.shared)?;
        let Some(rec) = st.parents.get(&parent) else {
            return Ok(None);
        };
        let mut out: Vec<StoredItem> = rec
            .members
            .iter()
            .filter_map(|id| {
                st.items.get(id).map(|item| StoredItem {
                    id: *id,
                    parent,
                    position: item.position,
                    body: item.body.clone(),
                })
            })
            .collect();
        out.sort_by_key(|i| i.position);
        Ok(Some(out))
    }
}

// ---------------------------------------------------------------------------
// MemoryUnitOfWork
// ---------------------------------------------------------------------------

struct MemoryUnitOfWork {
    collection: Collection,
    shared: Arc<Mutex<MemState>>,
    /// Parent versions as first observed by this unit.
    observed: BTreeMap<ParentId, u64>,
    /// Pending writes. `None` marks a delete.
    overlay: BTreeMap<ItemId, Option<ItemRec>>,
}

impl MemoryUnitOfWork {
    fn observe(observed: &mut BTreeMap<ParentId, u64>, st: &MemState, parent: ParentId) {
        if let Some(rec) = st.parents.get(&parent) {
            observed.entry(parent).or_insert(rec.version);
        }
    }

    /// The item as this unit sees it: overlay first, then shared state.
    fn current(&self, st: &MemState, item: ItemId) -> Option<ItemRec> {
        match self.overlay.get(&item) {
            Some(pending) => pending.clone(),
            None => st.items.get(&item).cloned(),
        }
    }

    /// `(item, position)` for every member of `parent` as this unit sees it.
    fn members(&self, st: &MemState, parent: ParentId) -> Vec<(ItemId, u32)> {
        let mut out = Vec::new();
        if let Some(rec) = st.parents.get(&parent) {
            for id in rec.members.iter().filter(|id| !self.overlay.contains_key(id)) {
                if let Some(item) = st.items.get(id) {
                    out.push((*id, item.position));
                }
            }
        }
        for (id, pending) in &self.overlay {
            if let Some(item) = pending {
                if item.parent == parent {
                    out.push((*id, item.position));
                }
            }
        }
        out
    }

    /// Parents whose membership or positions this unit changes.
    fn touched(&self, st: &MemState) -> BTreeSet<ParentId> {
        let mut out = BTreeSet::new();
        for (id, pending) in &self.overlay {
            if let Some(old) = st.items.get(id) {
                out.insert(old.parent);
            }
            if let Some(new) = pending {
                out.insert(new.parent);
            }
        }
        out
    }
}

#[async_trait]
impl UnitOfWork for MemoryUnitOfWork {
    async fn locate(&mut self, item: ItemId) -> Result<Option<Slot>, StoreError> {
        let st = lock_state(&self.shared)?;
        let found = self.current(&st, item);
        if let Some(rec) = &found {
            Self::observe(&mut self.observed, &st, rec.parent);
        }
        Ok(found.map(|rec| rec.slot()))
    }

    async fn lock_parent(
        &mut self,
        parent: ParentId,
    ) -> Result<Option<ParentSnapshot>, StoreError> {
        let st = lock_state(&self.shared)?;
        match st.parents.get(&parent) {
            Some(rec) if !rec.closed => {}
            _ => return Ok(None),
        }
        Self::observe(&mut self.observed, &st, parent);
        let count = self.members(&st, parent).len() as u32;
        Ok(Some(ParentSnapshot { parent, count }))
    }

    async fn shift(&mut self, shift: &RangeShift) -> Result<u64, StoreError> {
        let st = lock_state(&self.shared)?;
        Self::observe(&mut self.observed, &st, shift.parent);

        let covered: Vec<ItemId> = self
            .members(&st, shift.parent)
            .into_iter()
            .filter(|(_, pos)| shift.covers(*pos))
            .map(|(id, _)| id)
            .collect();

        let mut updates = Vec::with_capacity(covered.len());
        for id in covered {
            let Some(mut rec) = self.current(&st, id) else {
                continue;
            };
            rec.position = shift.apply(rec.position).ok_or_else(|| {
                StoreError::invariant(format!(
                    "shift {:+} would move {id} out of range from {}",
                    shift.delta, rec.position
                ))
            })?;
            updates.push((id, rec));
        }
        drop(st);

        let n = updates.len() as u64;
        for (id, rec) in updates {
            self.overlay.insert(id, Some(rec));
        }
        Ok(n)
    }

    async fn place(&mut self, item: ItemId, slot: Slot) -> Result<(), StoreError> {
        let st = lock_state(&self.shared)?;
        let mut rec = self.current(&st, item).ok_or_else(|| {
            StoreError::backend(anyhow::anyhow!("place: unknown item {item}"))
        })?;
        Self::observe(&mut self.observed, &st, slot.parent);
        drop(st);

        rec.parent = slot.parent;
        rec.position = slot.position;
        self.overlay.insert(item, Some(rec));
        Ok(())
    }

    async fn insert(&mut self, item: &NewItem, slot: Slot) -> Result<(), StoreError> {
        let st = lock_state(&self.shared)?;
        if self.current(&st, item.id).is_some() {
            return Err(StoreError::backend(anyhow::anyhow!(
                "insert: item {} already exists",
                item.id
            )));
        }
        Self::observe(&mut self.observed, &st, slot.parent);
        drop(st);

        self.overlay.insert(
            item.id,
            Some(ItemRec {
                parent: slot.parent,
                position: slot.position,
                body: item.body.clone(),
            }),
        );
        Ok(())
    }

    async fn delete(&mut self, item: ItemId) -> Result<(), StoreError> {
        self.overlay.insert(item, None);
        Ok(())
    }

    async fn commit(&mut self) -> Result<(), StoreError> {
        let shared = Arc::clone(&self.shared);
        let mut st = lock_state(&shared)?;

        for (parent, seen) in &self.observed {
            match st.parents.get(parent) {
                Some(rec) if rec.version == *seen => {}
                Some(rec) => {
                    return Err(StoreError::conflict(format!(
                        "parent {parent} at version {} (read {seen})",
                        rec.version
                    )))
                }
                None => {
                    return Err(StoreError::conflict(format!(
                        "parent {parent} removed concurrently"
                    )))
                }
            }
        }

        let touched = self.touched(&st);
        for parent in &touched {
            match st.parents.get(parent) {
                None => {
                    return Err(StoreError::conflict(format!("parent {parent} does not exist")))
                }
                Some(rec) if rec.closed => {
                    return Err(StoreError::conflict(format!("parent {parent} is closed")))
                }
                Some(_) => {}
            }
            let positions = self.members(&st, *parent).into_iter().map(|(_, p)| p);
            if let Err(v) = check_dense(positions) {
                return Err(StoreError::invariant(format!(
                    "{} in {parent}: {v}",
                    self.collection
                )));
            }
        }

        for (id, pending) in std::mem::take(&mut self.overlay) {
            if let Some(old) = st.items.remove(&id) {
                if let Some(p) = st.parents.get_mut(&old.parent) {
                    p.members.remove(&id);
                }
            }
            if let Some(new) = pending {
                if let Some(p) = st.parents.get_mut(&new.parent) {
                    p.members.insert(id);
                }
                st.items.insert(id, new);
            }
        }
        for parent in &touched {
            if let Some(p) = st.parents.get_mut(parent) {
                p.version += 1;
            }
        }
        self.observed.clear();
        Ok(())
    }
}

// ---------------------------------------------------------------------------
// Tests
// ---------------------------------------------------------------------------
