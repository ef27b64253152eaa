//! Postgres-backed [`PositionStore`].
//!
//! A unit of work is one transaction. `lock_parent` takes the parent row with
//! `SELECT ... FOR UPDATE`, so every writer touching a parent queues behind
//! the current holder; the engine's ascending lock order keeps two-parent
//! moves deadlock-free. Positions are shifted with a single range `UPDATE`
//! per shift, relying on the deferred `UNIQUE(parent, position)` constraint
//! being checked at `COMMIT`.
//!
//! SQLSTATE mapping:
//! - `40001` serialization failure, `40P01` deadlock, `55P03` lock timeout
//!   -> `StoreError::Conflict` (engine retries)
//! - `23505` unique violation (the deferred dense guard) -> `StoreError::Invariant`
//! - anything else -> `StoreError::Backend`

use async_trait::async_trait;
use kb_reorder::{
    Collection, ItemId, NewItem, ParentId, ParentSnapshot, PositionStore, RangeShift, Slot,
    StoreError, StoredItem, UnitOfWork,
};
use sqlx::{PgPool, Postgres, Row, Transaction};
use tracing::debug;
use uuid::Uuid;

/// Upper bound on waiting for a parent row lock before reporting a conflict.
const LOCK_TIMEOUT: &str = "2s";

// ---------------------------------------------------------------------------
// Table mapping
// ---------------------------------------------------------------------------

/// Static SQL identifiers for one collection.
#[derive(Debug, Clone, Copy)]
struct Tables {
    items: &'static str,
    parent_col: &'static str,
    parents: &'static str,
    body_col: &'static str,
}

fn tables(collection: Collection) -> Tables {
    match collection {
        Collection::Columns => Tables {
            items: "board_columns",
            parent_col: "board_id",
            parents: "boards",
            body_col: "title",
        },
        Collection::Tasks => Tables {
            items: "tasks",
            parent_col: "column_id",
            parents: "board_columns",
            body_col: "content",
        },
    }
}

fn map_sqlx(context: &'static str, e: sqlx::Error) -> StoreError {
    if let sqlx::Error::Database(db) = &e {
        match db.code().as_deref() {
            Some("40001") | Some("40P01") | Some("55P03") => {
                return StoreError::conflict(format!("{context}: {}", db.message()));
            }
            Some("23505") => {
                return StoreError::invariant(format!("{context}: {}", db.message()));
            }
            _ => {}
        }
    }
    StoreError::backend(anyhow::Error::new(e).context(context))
}

fn to_db_position(position: u32) -> Result<i32, StoreError> {
    i32::try_from(position)
        .map_err(|_| StoreError::backend(anyhow::anyhow!("position {position} exceeds integer")))
}

fn from_db_position(position: i32) -> Result<u32, StoreError> {
    u32::try_from(position)
        .map_err(|_| StoreError::invariant(format!("negative position {position} in storage")))
}

fn count_to_u32(n: i64) -> Result<u32, StoreError> {
    u32::try_from(n).map_err(|_| StoreError::backend(anyhow::anyhow!("item count {n} out of range")))
}

// ---------------------------------------------------------------------------
// PgPositionStore
// ---------------------------------------------------------------------------

#[derive(Clone, Debug)]
pub struct PgPositionStore {
    pool: PgPool,
    collection: Collection,
}

impl PgPositionStore {
    pub fn new(pool: PgPool, collection: Collection) -> Self {
        Self { pool, collection }
    }
}

#[async_trait]
impl PositionStore for PgPositionStore {
    fn collection(&self) -> Collection {
        self.collection
    }

    async fn begin(&self) -> Result<Box<dyn UnitOfWork>, StoreError> {
        let mut tx = self
            .pool
            .begin()
            .await
            .map_err(|e| map_sqlx("begin transaction", e))?;
        sqlx::query(&format!("set local lock_timeout = '{LOCK_TIMEOUT}'"))
            .execute(&mut *tx)
            .await
            .map_err(|e| map_sqlx("set lock_timeout", e))?;
        Ok(Box::new(PgUnitOfWork {
            collection: self.collection,
            t: tables(self.collection),
            tx: Some(tx),
        }))
    }

    async fn list(&self, parent: ParentId) -> Result<Option<Vec<StoredItem>>, StoreError> {
        let t = tables(self.collection);

        let (exists,): (bool,) = sqlx::query_as(&format!(
            "select exists (select 1 from {} where id = $1)",
            t.parents
        ))
        .bind(parent.as_uuid())
        .fetch_one(&self.pool)
        .await
        .map_err(|e| map_sqlx("list: parent exists", e))?;
        if !exists {
            return Ok(None);
        }

        let rows = sqlx::query(&format!(
            "select id, position, {body} as body from {items} where {pc} = $1 order by position",
            body = t.body_col,
            items = t.items,
            pc = t.parent_col,
        ))
        .bind(parent.as_uuid())
        .fetch_all(&self.pool)
        .await
        .map_err(|e| map_sqlx("list: items", e))?;

        let mut out = Vec::with_capacity(rows.len());
        for row in rows {
            let id: Uuid = row.try_get("id").map_err(|e| map_sqlx("list: id", e))?;
            let position: i32 = row
                .try_get("position")
                .map_err(|e| map_sqlx("list: position", e))?;
            let body: String = row.try_get("body").map_err(|e| map_sqlx("list: body", e))?;
            out.push(StoredItem {
                id: ItemId(id),
                parent,
                position: from_db_position(position)?,
                body,
            });
        }
        Ok(Some(out))
    }
}

// ---------------------------------------------------------------------------
// PgUnitOfWork
// ---------------------------------------------------------------------------

struct PgUnitOfWork {
    collection: Collection,
    t: Tables,
    /// `None` once committed.
    tx: Option<Transaction<'static, Postgres>>,
}

impl PgUnitOfWork {
    fn tx(&mut self) -> Result<&mut Transaction<'static, Postgres>, StoreError> {
        self.tx
            .as_mut()
            .ok_or_else(|| StoreError::backend(anyhow::anyhow!("unit of work already committed")))
    }
}

#[async_trait]
impl UnitOfWork for PgUnitOfWork {
    async fn locate(&mut self, item: ItemId) -> Result<Option<Slot>, StoreError> {
        let sql = format!(
            "select {pc}, position from {items} where id = $1",
            pc = self.t.parent_col,
            items = self.t.items,
        );
        let tx = self.tx()?;
        let row: Option<(Uuid, i32)> = sqlx::query_as(&sql)
            .bind(item.as_uuid())
            .fetch_optional(&mut **tx)
            .await
            .map_err(|e| map_sqlx("locate", e))?;
        match row {
            Some((parent, position)) => Ok(Some(Slot::new(
                ParentId(parent),
                from_db_position(position)?,
            ))),
            None => Ok(None),
        }
    }

    async fn lock_parent(
        &mut self,
        parent: ParentId,
    ) -> Result<Option<ParentSnapshot>, StoreError> {
        let lock_sql = format!("select id from {} where id = $1 for update", self.t.parents);
        let count_sql = format!(
            "select count(*)::bigint from {} where {} = $1",
            self.t.items, self.t.parent_col
        );
        let tx = self.tx()?;

        let locked: Option<(Uuid,)> = sqlx::query_as(&lock_sql)
            .bind(parent.as_uuid())
            .fetch_optional(&mut **tx)
            .await
            .map_err(|e| map_sqlx("lock parent", e))?;
        if locked.is_none() {
            return Ok(None);
        }

        let (n,): (i64,) = sqlx::query_as(&count_sql)
            .bind(parent.as_uuid())
            .fetch_one(&mut **tx)
            .await
            .map_err(|e| map_sqlx("count items", e))?;
        Ok(Some(ParentSnapshot {
            parent,
            count: count_to_u32(n)?,
        }))
    }

    async fn shift(&mut self, shift: &RangeShift) -> Result<u64, StoreError> {
        let sql = format!(
            "update {items} set position = position + $2 \
             where {pc} = $1 and position >= $3 and ($4::integer is null or position <= $4)",
            items = self.t.items,
            pc = self.t.parent_col,
        );
        let from = to_db_position(shift.from)?;
        let to = shift.to.map(to_db_position).transpose()?;
        let tx = self.tx()?;
        let res = sqlx::query(&sql)
            .bind(shift.parent.as_uuid())
            .bind(shift.delta)
            .bind(from)
            .bind(to)
            .execute(&mut **tx)
            .await
            .map_err(|e| map_sqlx("shift", e))?;
        Ok(res.rows_affected())
    }

    async fn place(&mut self, item: ItemId, slot: Slot) -> Result<(), StoreError> {
        let sql = format!(
            "update {items} set {pc} = $2, position = $3 where id = $1",
            items = self.t.items,
            pc = self.t.parent_col,
        );
        let position = to_db_position(slot.position)?;
        let tx = self.tx()?;
        let res = sqlx::query(&sql)
            .bind(item.as_uuid())
            .bind(slot.parent.as_uuid())
            .bind(position)
            .execute(&mut **tx)
            .await
            .map_err(|e| map_sqlx("place", e))?;
        if res.rows_affected() != 1 {
            return Err(StoreError::conflict(format!("place: item {item} vanished")));
        }
        Ok(())
    }

    async fn insert(&mut self, item: &NewItem, slot: Slot) -> Result<(), StoreError> {
        let sql = format!(
            "insert into {items} (id, {pc}, {body}, position) values ($1, $2, $3, $4)",
            items = self.t.items,
            pc = self.t.parent_col,
            body = self.t.body_col,
        );
        let position = to_db_position(slot.position)?;
        let tx = self.tx()?;
        sqlx::query(&sql)
            .bind(item.id.as_uuid())
            .bind(slot.parent.as_uuid())
            .bind(&item.body)
            .bind(position)
            .execute(&mut **tx)
            .await
            .map_err(|e| map_sqlx("insert", e))?;
        Ok(())
    }

    async fn delete(&mut self, item: ItemId) -> Result<(), StoreError> {
        let sql = format!("delete from {} where id = $1", self.t.items);
        let tx = self.tx()?;
        sqlx::query(&sql)
            .bind(item.as_uuid())
            .execute(&mut **tx)
            .await
            .map_err(|e| map_sqlx("delete", e))?;
        Ok(())
    }

    async fn commit(&mut self) -> Result<(), StoreError> {
        let tx = self
            .tx
            .take()
            .ok_or_else(|| StoreError::backend(anyhow::anyhow!("unit of work already committed")))?;
        tx.commit().await.map_err(|e| map_sqlx("commit", e))?;
        debug!(collection = %self.collection, "transaction committed");
        Ok(())
    }
}
