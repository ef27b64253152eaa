//! Config consumption registry: which JSON-pointer prefixes each binary reads.
//!
//! A leaf under any listed prefix counts as consumed. Only list what the
//! consumer actually reads today.

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ConfigConsumer {
    /// `kb-daemon`
    Daemon,
    /// `kb` CLI
    Cli,
}

impl ConfigConsumer {
    pub fn as_str(&self) -> &'static str {
        match self {
            ConfigConsumer::Daemon => "DAEMON",
            ConfigConsumer::Cli => "CLI",
        }
    }
}

pub fn consumed_pointers_for(consumer: ConfigConsumer) -> &'static [&'static str] {
    match consumer {
        // BoardConfig::from_config_json reads /reorder, /db and /daemon.
        ConfigConsumer::Daemon => DAEMON,
        // The CLI never binds a listener.
        ConfigConsumer::Cli => CLI,
    }
}

static DAEMON: &[&str] = &[
    "/reorder/max_conflict_retries",
    "/reorder/retry_backoff_ms",
    "/db/url_env",
    "/db/max_connections",
    "/daemon/addr",
];

static CLI: &[&str] = &[
    "/reorder/max_conflict_retries",
    "/reorder/retry_backoff_ms",
    "/db/url_env",
    "/db/max_connections",
];
