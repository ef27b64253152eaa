//! Command handler modules for kb-cli.
//!
//! Shared utilities used by multiple command paths live here.
//! Command-specific logic lives in the submodules.

pub mod board;
pub mod items;

use std::sync::Arc;

use anyhow::{Context, Result};
use kb_config::{BoardConfig, ConfigConsumer, UnusedKeyPolicy};
use kb_reorder::{Collection, MoveTarget, ParentId, ReorderEngine};
use sqlx::PgPool;
use tracing::warn;
use uuid::Uuid;

// ---------------------------------------------------------------------------
// Ctx
// ---------------------------------------------------------------------------

/// Connected pool plus one engine per collection, built from layered config.
pub struct Ctx {
    pub pool: PgPool,
    pub columns: ReorderEngine,
    pub tasks: ReorderEngine,
}

impl Ctx {
    /// Load config from `KB_CONFIG`, resolve the database url and connect.
    pub async fn connect() -> Result<Self> {
        let loaded = kb_config::load_from_env()?;
        let unused = kb_config::report_unused_keys(
            ConfigConsumer::Cli,
            &loaded.config_json,
            UnusedKeyPolicy::Warn,
        )?;
        for key in &unused.unused_leaf_pointers {
            warn!(key = %key, "config key not read by the cli");
        }
        let cfg = BoardConfig::from_config_json(&loaded.config_json)?;

        let db = kb_config::resolve_database_url(&cfg);
        let pool = kb_db::connect(db.require()?, cfg.db_max_connections).await?;

        let engine = |collection| {
            ReorderEngine::new(Arc::new(kb_db::PgPositionStore::new(pool.clone(), collection)))
                .with_retry(cfg.retry_policy())
        };
        Ok(Self {
            columns: engine(Collection::Columns),
            tasks: engine(Collection::Tasks),
            pool,
        })
    }

    pub fn engine(&self, collection: Collection) -> &ReorderEngine {
        match collection {
            Collection::Columns => &self.columns,
            Collection::Tasks => &self.tasks,
        }
    }
}

// ---------------------------------------------------------------------------
// Shared helpers
// ---------------------------------------------------------------------------

/// Parse a `--id`-style argument; `what` names it in the error.
pub fn parse_uuid(what: &str, raw: &str) -> Result<Uuid> {
    Uuid::parse_str(raw.trim()).with_context(|| format!("invalid {what} '{raw}': expected a UUID"))
}

/// Build a move target before touching the database so a negative index
/// fails without a connection.
pub fn move_target(what: &str, parent: &str, index: i64) -> Result<MoveTarget> {
    let parent = ParentId(parse_uuid(what, parent)?);
    Ok(MoveTarget::new(parent, index)?)
}
