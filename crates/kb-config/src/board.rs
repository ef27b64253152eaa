//! Typed view over the merged config tree.

use std::net::SocketAddr;
use std::time::Duration;

use anyhow::{bail, Context, Result};
use kb_reorder::RetryPolicy;
use serde_json::Value;

pub const DEFAULT_MAX_CONFLICT_RETRIES: u32 = 5;
pub const DEFAULT_RETRY_BACKOFF_MS: u64 = 5;
pub const DEFAULT_MAX_CONNECTIONS: u32 = 10;
pub const DEFAULT_DAEMON_ADDR: &str = "127.0.0.1:8898";
pub const DEFAULT_DB_URL_ENV: &str = "KB_DATABASE_URL";

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct BoardConfig {
    pub max_conflict_retries: u32,
    pub retry_backoff_ms: u64,
    /// Name of the env var holding the Postgres URL.
    pub db_url_env: String,
    pub db_max_connections: u32,
    pub daemon_addr: SocketAddr,
}

impl Default for BoardConfig {
    fn default() -> Self {
        Self {
            max_conflict_retries: DEFAULT_MAX_CONFLICT_RETRIES,
            retry_backoff_ms: DEFAULT_RETRY_BACKOFF_MS,
            db_url_env: DEFAULT_DB_URL_ENV.to_string(),
            db_max_connections: DEFAULT_MAX_CONNECTIONS,
            daemon_addr: SocketAddr::from(([127, 0, 0, 1], 8898)),
        }
    }
}

impl BoardConfig {
    /// Read the typed fields; absent keys take their defaults, present keys
    /// of the wrong shape are errors.
    pub fn from_config_json(v: &Value) -> Result<Self> {
        let d = Self::default();

        let max_conflict_retries = match read_u64(v, "/reorder/max_conflict_retries")? {
            Some(n) => u32::try_from(n)
                .context("CONFIG_INVALID /reorder/max_conflict_retries exceeds u32")?,
            None => d.max_conflict_retries,
        };
        let retry_backoff_ms =
            read_u64(v, "/reorder/retry_backoff_ms")?.unwrap_or(d.retry_backoff_ms);

        let db_max_connections = match read_u64(v, "/db/max_connections")? {
            Some(0) => bail!("CONFIG_INVALID /db/max_connections must be at least 1"),
            Some(n) => {
                u32::try_from(n).context("CONFIG_INVALID /db/max_connections exceeds u32")?
            }
            None => d.db_max_connections,
        };

        let db_url_env = match read_str(v, "/db/url_env")? {
            Some(s) if s.trim().is_empty() => bail!("CONFIG_INVALID /db/url_env is empty"),
            Some(s) => s.trim().to_string(),
            None => d.db_url_env,
        };

        let daemon_addr = match read_str(v, "/daemon/addr")? {
            Some(s) => s
                .parse::<SocketAddr>()
                .with_context(|| format!("CONFIG_INVALID /daemon/addr '{s}'"))?,
            None => d.daemon_addr,
        };

        Ok(Self {
            max_conflict_retries,
            retry_backoff_ms,
            db_url_env,
            db_max_connections,
            daemon_addr,
        })
    }

    pub fn retry_policy(&self) -> RetryPolicy {
        RetryPolicy::new(
            self.max_conflict_retries,
            Duration::from_millis(self.retry_backoff_ms),
        )
    }
}

fn read_u64(v: &Value, ptr: &str) -> Result<Option<u64>> {
    match v.pointer(ptr) {
        None | Some(Value::Null) => Ok(None),
        Some(x) => match x.as_u64() {
            Some(n) => Ok(Some(n)),
            None => bail!("CONFIG_INVALID {ptr} must be a non-negative integer, got {x}"),
        },
    }
}

fn read_str<'a>(v: &'a Value, ptr: &str) -> Result<Option<&'a str>> {
    match v.pointer(ptr) {
        None | Some(Value::Null) => Ok(None),
        Some(Value::String(s)) => Ok(Some(s.as_str())),
        Some(x) => bail!("CONFIG_INVALID {ptr} must be a string, got {x}"),
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use serde_json::json;

    #[test]
    fn empty_tree_yields_defaults() {
        let cfg = BoardConfig::from_config_json(&json!({})).unwrap();
        assert_eq!(cfg, BoardConfig::default());
        assert_eq!(cfg.daemon_addr.to_string(), DEFAULT_DAEMON_ADDR);
    }

    #[test]
    fn retry_policy_mirrors_fields() {
        let cfg = BoardConfig::from_config_json(&json!({
            "reorder": {"max_conflict_retries": 2, "retry_backoff_ms": 20}
        }))
        .unwrap();
        let p = cfg.retry_policy();
        assert_eq!(p.max_retries, 2);
        assert_eq!(p.backoff, Duration::from_millis(20));
    }

    #[test]
    fn wrong_types_are_rejected() {
        assert!(BoardConfig::from_config_json(&json!({"reorder": {"max_conflict_retries": -1}}))
            .is_err());
        assert!(BoardConfig::from_config_json(&json!({"daemon": {"addr": 8898}})).is_err());
        assert!(BoardConfig::from_config_json(&json!({"daemon": {"addr": "nope"}})).is_err());
        assert!(BoardConfig::from_config_json(&json!({"db": {"max_connections": 0}})).is_err());
    }
}
