//! Scenario: typed board config from layered YAML.

use std::time::Duration;

use kb_config::{load_layered_yaml_from_strings, BoardConfig};

#[test]
fn layered_yaml_flows_into_typed_config() {
    let base = r#"
reorder:
  max_conflict_retries: 5
  retry_backoff_ms: 5
db:
  max_connections: 10
"#;
    let local = r#"
reorder:
  retry_backoff_ms: 12
daemon:
  addr: "0.0.0.0:9100"
"#;
    let loaded = load_layered_yaml_from_strings(&[base, local]).unwrap();
    let cfg = BoardConfig::from_config_json(&loaded.config_json).unwrap();

    assert_eq!(cfg.max_conflict_retries, 5);
    assert_eq!(cfg.retry_backoff_ms, 12);
    assert_eq!(cfg.db_max_connections, 10);
    assert_eq!(cfg.db_url_env, "KB_DATABASE_URL");
    assert_eq!(cfg.daemon_addr.port(), 9100);
    assert_eq!(cfg.retry_policy().backoff, Duration::from_millis(12));
}

#[test]
fn repo_base_yaml_loads_cleanly() {
    let raw = include_str!("../../../config/base.yaml");
    let loaded = load_layered_yaml_from_strings(&[raw]).unwrap();
    let cfg = BoardConfig::from_config_json(&loaded.config_json).unwrap();
    assert_eq!(cfg, BoardConfig::default());
}
