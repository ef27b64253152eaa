use kb_config::{
    load_layered_yaml_from_strings, report_unused_keys, ConfigConsumer, UnusedKeyPolicy,
};

/// Scenario: unused config keys per consumer.
///
/// 1) Unused keys are reported in WARN mode without error.
/// 2) FAIL mode errors with CONFIG_UNUSED_KEYS.
/// 3) `daemon.addr` is consumed by the daemon but not by the CLI.
/// 4) Unused pointers come back sorted.

const FULL_YAML: &str = r#"
reorder:
  max_conflict_retries: 5
  retry_backoff_ms: 5
db:
  url_env: "KB_DATABASE_URL"
  max_connections: 10
daemon:
  addr: "127.0.0.1:8898"
"#;

#[test]
fn daemon_consumes_every_documented_key() {
    let loaded = load_layered_yaml_from_strings(&[FULL_YAML]).unwrap();
    let report =
        report_unused_keys(ConfigConsumer::Daemon, &loaded.config_json, UnusedKeyPolicy::Fail)
            .expect("documented keys must all be consumed");
    assert!(report.is_clean());
    assert_eq!(report.consumer, "DAEMON");
}

#[test]
fn cli_does_not_read_daemon_addr() {
    let loaded = load_layered_yaml_from_strings(&[FULL_YAML]).unwrap();
    let report =
        report_unused_keys(ConfigConsumer::Cli, &loaded.config_json, UnusedKeyPolicy::Warn)
            .unwrap();
    assert_eq!(report.unused_leaf_pointers, vec!["/daemon/addr".to_string()]);
}

#[test]
fn warn_mode_reports_unused_keys_without_error() {
    let yaml = r#"
reorder:
  max_conflict_retries: 3
  fractional_ranks: true
legacy:
  swimlanes: 4
"#;
    let loaded = load_layered_yaml_from_strings(&[yaml]).unwrap();
    let report =
        report_unused_keys(ConfigConsumer::Daemon, &loaded.config_json, UnusedKeyPolicy::Warn)
            .expect("warn mode must not error");

    assert!(!report.is_clean());
    assert_eq!(
        report.unused_leaf_pointers,
        vec![
            "/legacy/swimlanes".to_string(),
            "/reorder/fractional_ranks".to_string(),
        ]
    );
}

#[test]
fn fail_mode_errors_on_unused_keys() {
    let yaml = r#"
legacy:
  swimlanes: 4
"#;
    let loaded = load_layered_yaml_from_strings(&[yaml]).unwrap();
    let result =
        report_unused_keys(ConfigConsumer::Cli, &loaded.config_json, UnusedKeyPolicy::Fail);

    let msg = format!("{:?}", result.unwrap_err());
    assert!(msg.contains("CONFIG_UNUSED_KEYS"));
    assert!(msg.contains("consumer=CLI"));
}
