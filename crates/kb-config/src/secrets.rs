//! Database credential resolution.
//!
//! Config holds only the NAME of the env var carrying the Postgres URL
//! (`db.url_env`, default `KB_DATABASE_URL`). Binaries resolve it once at
//! startup and pass the result along. Errors mention the NAME, never the
//! value, and `Debug` redacts the URL.

use anyhow::{bail, Result};

use crate::board::BoardConfig;

#[derive(Clone)]
pub struct ResolvedDatabase {
    /// The env var that was consulted.
    pub env_var: String,
    /// `None` when the var is unset or blank.
    pub url: Option<String>,
}

impl std::fmt::Debug for ResolvedDatabase {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("ResolvedDatabase")
            .field("env_var", &self.env_var)
            .field("url", &self.url.as_ref().map(|_| "<REDACTED>"))
            .finish()
    }
}

impl ResolvedDatabase {
    pub fn is_configured(&self) -> bool {
        self.url.is_some()
    }

    /// The URL, or an error naming the missing env var.
    pub fn require(&self) -> Result<&str> {
        match &self.url {
            Some(url) => Ok(url.as_str()),
            None => bail!(
                "SECRETS_MISSING: required env var '{}' (database url) is not set or empty",
                self.env_var
            ),
        }
    }
}

/// Read the env var named by `cfg.db_url_env`.
pub fn resolve_database_url(cfg: &BoardConfig) -> ResolvedDatabase {
    let url = match std::env::var(&cfg.db_url_env) {
        Ok(v) if !v.trim().is_empty() => Some(v.trim().to_string()),
        _ => None,
    };
    ResolvedDatabase {
        env_var: cfg.db_url_env.clone(),
        url,
    }
}
