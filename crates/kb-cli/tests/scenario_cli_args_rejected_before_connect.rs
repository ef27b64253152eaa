use assert_cmd::prelude::*;
use predicates::prelude::*;
use std::process::Command;
use uuid::Uuid;

/// Argument errors must surface without a database: the env var is removed so
/// any attempt to connect would fail with a different message.
fn kb() -> Command {
    let mut cmd = Command::cargo_bin("kb").expect("kb binary");
    cmd.env_remove(kb_db::ENV_DB_URL).env_remove("KB_CONFIG");
    cmd
}

#[test]
fn help_lists_every_command_group() {
    kb().arg("--help")
        .assert()
        .success()
        .stdout(
            predicate::str::contains("db")
                .and(predicate::str::contains("config-hash"))
                .and(predicate::str::contains("board"))
                .and(predicate::str::contains("column"))
                .and(predicate::str::contains("task"))
                .and(predicate::str::contains("verify")),
        );
}

#[test]
fn negative_task_index_fails_before_connecting() {
    kb().args([
        "task",
        "move",
        "--id",
        &Uuid::new_v4().to_string(),
        "--column",
        &Uuid::new_v4().to_string(),
        "--index=-1",
    ])
    .assert()
    .failure()
    .stderr(predicate::str::contains("must be a non-negative"));
}

#[test]
fn negative_column_index_fails_before_connecting() {
    kb().args([
        "column",
        "move",
        "--id",
        &Uuid::new_v4().to_string(),
        "--board",
        &Uuid::new_v4().to_string(),
        "--index",
        "-3",
    ])
    .assert()
    .failure()
    .stderr(predicate::str::contains("target index -3"));
}

#[test]
fn malformed_board_id_is_rejected() {
    kb().args(["verify", "--board", "not-a-uuid"])
        .assert()
        .failure()
        .stderr(predicate::str::contains("invalid board id 'not-a-uuid'"));
}

#[test]
fn board_commands_require_database_url() {
    kb().args(["board", "list", "--owner", "alice"])
        .assert()
        .failure()
        .stderr(predicate::str::contains("SECRETS_MISSING"));
}
