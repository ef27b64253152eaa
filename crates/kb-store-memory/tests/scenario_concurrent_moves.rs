//! Scenario: concurrent writers and conflict retry.
//!
//! Part one runs many moves, appends and removes in parallel on a
//! multi-thread runtime and checks that every parent is still dense and no
//! item was lost or duplicated. Part two wraps the memory store so that
//! commits fail with a conflict a fixed number of times, to pin down the
//! retry budget and the error surfaced when it is exhausted.

use std::collections::BTreeSet;
use std::sync::atomic::{AtomicU32, Ordering};
use std::sync::Arc;
use std::time::Duration;

use async_trait::async_trait;
use kb_reorder::{
    Collection, ItemId, MoveTarget, NewItem, ParentId, ParentSnapshot, PositionStore,
    RangeShift, ReorderEngine, ReorderError, RetryPolicy, Slot, StoreError, StoredItem,
    UnitOfWork,
};
use kb_store_memory::MemoryStore;

// ---------------------------------------------------------------------------
// Parallel writers
// ---------------------------------------------------------------------------

#[tokio::test(flavor = "multi_thread", worker_threads = 4)]
async fn parallel_moves_keep_every_parent_dense() {
    let store = MemoryStore::new(Collection::Tasks);
    let engine = ReorderEngine::new(Arc::new(store.clone()))
        .with_retry(RetryPolicy::new(200, Duration::from_millis(1)));

    let parents: Vec<ParentId> = (0..3).map(|_| ParentId::new()).collect();
    for p in &parents {
        store.add_parent(*p).unwrap();
    }
    let mut items = Vec::new();
    for (i, p) in parents.iter().enumerate() {
        for j in 0..6 {
            let placed = engine
                .append(*p, NewItem::new(format!("{i}-{j}")))
                .await
                .unwrap();
            items.push(placed.id);
        }
    }

    let mut handles = Vec::new();
    for w in 0..16usize {
        let engine = engine.clone();
        let parents = parents.clone();
        let items = items.clone();
        handles.push(tokio::spawn(async move {
            for k in 0..25usize {
                let item = items[(w * 7 + k * 3) % items.len()];
                let parent = parents[(w + k) % parents.len()];
                let index = ((w + k) % 4) as i64;
                match engine
                    .move_item(item, MoveTarget::new(parent, index).unwrap())
                    .await
                {
                    Ok(_) | Err(ReorderError::InvalidIndex { .. }) => {}
                    Err(e) => panic!("worker {w} step {k}: {e}"),
                }
            }
        }));
    }
    for h in handles {
        h.await.unwrap();
    }

    let mut seen = BTreeSet::new();
    for p in &parents {
        let report = engine.verify(*p).await.unwrap();
        assert!(report.is_dense(), "{p}: {:?}", report.violation);
        for item in engine.list(*p).await.unwrap() {
            assert!(seen.insert(item.id), "item {} listed twice", item.id);
        }
    }
    let expected: BTreeSet<ItemId> = items.into_iter().collect();
    assert_eq!(seen, expected, "moves must neither lose nor duplicate items");
}

#[tokio::test(flavor = "multi_thread", worker_threads = 4)]
async fn parallel_appends_and_removes_stay_dense() {
    let store = MemoryStore::new(Collection::Columns);
    let engine = ReorderEngine::new(Arc::new(store.clone()))
        .with_retry(RetryPolicy::new(200, Duration::from_millis(1)));
    let board = ParentId::new();
    store.add_parent(board).unwrap();

    let mut handles = Vec::new();
    for w in 0..8usize {
        let engine = engine.clone();
        handles.push(tokio::spawn(async move {
            let mut mine = Vec::new();
            for k in 0..20usize {
                let placed = engine
                    .append(board, NewItem::new(format!("w{w}-{k}")))
                    .await
                    .unwrap();
                mine.push(placed.id);
                if k % 3 == 2 {
                    let victim = mine.remove(0);
                    engine.remove(victim).await.unwrap();
                }
            }
            mine
        }));
    }
    let mut survivors = BTreeSet::new();
    for h in handles {
        survivors.extend(h.await.unwrap());
    }

    let listed = engine.list(board).await.unwrap();
    assert_eq!(listed.len(), survivors.len());
    for (i, item) in listed.iter().enumerate() {
        assert_eq!(item.position, i as u32);
        assert!(survivors.contains(&item.id));
    }
}

// ---------------------------------------------------------------------------
// Conflict injection
// ---------------------------------------------------------------------------

/// Delegates to a [`MemoryStore`] but fails the first `failures` commits
/// with a conflict.
struct FlakyStore {
    inner: MemoryStore,
    remaining: Arc<AtomicU32>,
    commits_attempted: Arc<AtomicU32>,
}

impl FlakyStore {
    fn new(inner: MemoryStore, failures: u32) -> Self {
        Self {
            inner,
            remaining: Arc::new(AtomicU32::new(failures)),
            commits_attempted: Arc::new(AtomicU32::new(0)),
        }
    }
}

#[async_trait]
impl PositionStore for FlakyStore {
    fn collection(&self) -> Collection {
        self.inner.collection()
    }

    async fn begin(&self) -> Result<Box<dyn UnitOfWork>, StoreError> {
        Ok(Box::new(FlakyUnit {
            inner: self.inner.begin().await?,
            remaining: Arc::clone(&self.remaining),
            commits_attempted: Arc::clone(&self.commits_attempted),
        }))
    }

    async fn list(&self, parent: ParentId) -> Result<Option<Vec<StoredItem>>, StoreError> {
        self.inner.list(parent).await
    }
}

struct FlakyUnit {
    inner: Box<dyn UnitOfWork>,
    remaining: Arc<AtomicU32>,
    commits_attempted: Arc<AtomicU32>,
}

#[async_trait]
impl UnitOfWork for FlakyUnit {
    async fn locate(&mut self, item: ItemId) -> Result<Option<Slot>, StoreError> {
        self.inner.locate(item).await
    }

    async fn lock_parent(
        &mut self,
        parent: ParentId,
    ) -> Result<Option<ParentSnapshot>, StoreError> {
        self.inner.lock_parent(parent).await
    }

    async fn shift(&mut self, shift: &RangeShift) -> Result<u64, StoreError> {
        self.inner.shift(shift).await
    }

    async fn place(&mut self, item: ItemId, slot: Slot) -> Result<(), StoreError> {
        self.inner.place(item, slot).await
    }

    async fn insert(&mut self, item: &NewItem, slot: Slot) -> Result<(), StoreError> {
        self.inner.insert(item, slot).await
    }

    async fn delete(&mut self, item: ItemId) -> Result<(), StoreError> {
        self.inner.delete(item).await
    }

    async fn commit(&mut self) -> Result<(), StoreError> {
        self.commits_attempted.fetch_add(1, Ordering::SeqCst);
        let injected = self
            .remaining
            .fetch_update(Ordering::SeqCst, Ordering::SeqCst, |n| n.checked_sub(1))
            .is_ok();
        if injected {
            return Err(StoreError::conflict("injected"));
        }
        self.inner.commit().await
    }
}

async fn seeded(failures: u32, retries: u32) -> (ReorderEngine, FlakyStore, ParentId, Vec<ItemId>) {
    let mem = MemoryStore::new(Collection::Tasks);
    let parent = ParentId::new();
    mem.add_parent(parent).unwrap();
    let plain = ReorderEngine::new(Arc::new(mem.clone()));
    let mut ids = Vec::new();
    for name in ["A", "B", "C"] {
        ids.push(plain.append(parent, NewItem::new(name)).await.unwrap().id);
    }

    let flaky = FlakyStore::new(mem, failures);
    let handle = FlakyStore {
        inner: flaky.inner.clone(),
        remaining: Arc::clone(&flaky.remaining),
        commits_attempted: Arc::clone(&flaky.commits_attempted),
    };
    let engine = ReorderEngine::new(Arc::new(flaky))
        .with_retry(RetryPolicy::new(retries, Duration::from_millis(1)));
    (engine, handle, parent, ids)
}

async fn bodies(engine: &ReorderEngine, parent: ParentId) -> Vec<String> {
    engine
        .list(parent)
        .await
        .unwrap()
        .into_iter()
        .map(|i| i.body)
        .collect()
}

#[tokio::test]
async fn move_succeeds_after_transient_conflicts() {
    let (engine, handle, parent, ids) = seeded(3, 5).await;

    let placed = engine
        .move_item(ids[0], MoveTarget::new(parent, 2).unwrap())
        .await
        .unwrap();

    assert_eq!(placed.position, 2);
    assert_eq!(handle.commits_attempted.load(Ordering::SeqCst), 4);
    assert_eq!(bodies(&engine, parent).await, ["B", "C", "A"]);
}

#[tokio::test]
async fn exhausted_retries_surface_concurrency_conflict_and_change_nothing() {
    let (engine, handle, parent, ids) = seeded(100, 2).await;

    let err = engine
        .move_item(ids[0], MoveTarget::new(parent, 2).unwrap())
        .await
        .unwrap_err();

    assert!(
        matches!(err, ReorderError::ConcurrencyConflict { attempts: 3 }),
        "got {err}"
    );
    assert_eq!(handle.commits_attempted.load(Ordering::SeqCst), 3);
    assert_eq!(bodies(&engine, parent).await, ["A", "B", "C"]);
}

#[tokio::test]
async fn zero_retry_policy_fails_on_first_conflict() {
    let (engine, handle, parent, _) = seeded(1, 0).await;

    let err = engine
        .append(parent, NewItem::new("D"))
        .await
        .unwrap_err();

    assert!(matches!(err, ReorderError::ConcurrencyConflict { attempts: 1 }));
    assert_eq!(handle.commits_attempted.load(Ordering::SeqCst), 1);
    assert_eq!(bodies(&engine, parent).await.len(), 3);
}

#[tokio::test]
async fn remove_retries_through_conflicts() {
    let (engine, _handle, parent, ids) = seeded(2, 5).await;

    engine.remove(ids[1]).await.unwrap();

    assert_eq!(bodies(&engine, parent).await, ["A", "C"]);
}
