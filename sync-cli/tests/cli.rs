//! Binary-level tests for convo-sync.

use assert_cmd::Command;
use predicates::prelude::*;
use std::path::Path;
use tempfile::tempdir;

const FEED: &str = r#"{"events":[{"kind":"conversation","identifier":"c1","operation":{"op":"added","snapshot":{"kind":"conversation","identifier":"c1","created_at":1700000000000}}},{"kind":"message","identifier":"m1","operation":{"op":"added","snapshot":{"kind":"message","identifier":"m1","conversation":"c1","index":0}}}]}
{"events":[{"kind":"message","identifier":"m1","operation":{"op":"updated","changes":[{"field":"is_sent","value":true}]}}]}
"#;

fn convo_sync(data_dir: &Path) -> Command {
    let mut cmd = Command::cargo_bin("convo-sync").unwrap();
    cmd.arg("--data-dir").arg(data_dir).env_remove("RUST_LOG");
    cmd
}

#[test]
fn help_lists_commands() {
    Command::cargo_bin("convo-sync")
        .unwrap()
        .arg("--help")
        .assert()
        .success()
        .stdout(predicate::str::contains("replay"))
        .stdout(predicate::str::contains("status"));
}

#[test]
fn init_then_status() {
    let dir = tempdir().unwrap();

    convo_sync(dir.path())
        .arg("init")
        .assert()
        .success()
        .stdout(predicate::str::contains("Initialized"));
    assert!(dir.path().join("config.toml").exists());

    convo_sync(dir.path())
        .arg("status")
        .assert()
        .success()
        .stdout(predicate::str::contains("Conversations: 0"))
        .stdout(predicate::str::contains("compatible"));
}

#[test]
fn init_twice_fails() {
    let dir = tempdir().unwrap();
    convo_sync(dir.path()).arg("init").assert().success();

    convo_sync(dir.path())
        .arg("init")
        .assert()
        .failure()
        .stderr(predicate::str::contains("Already initialized"));
}

#[test]
fn status_before_init() {
    let dir = tempdir().unwrap();

    convo_sync(dir.path())
        .arg("status")
        .assert()
        .success()
        .stdout(predicate::str::contains("NOT INITIALIZED"));
}

#[test]
fn replay_prints_notifications_and_summary() {
    let dir = tempdir().unwrap();
    let feed = dir.path().join("feed.jsonl");
    std::fs::write(&feed, FEED).unwrap();

    convo_sync(dir.path())
        .arg("replay")
        .arg(&feed)
        .assert()
        .success()
        .stdout(predicate::str::contains("created   conversation c1"))
        .stdout(predicate::str::contains("created   message m1"))
        .stdout(predicate::str::contains("updated   message m1 [isSent]"))
        .stdout(predicate::str::contains(
            "Replayed 2 batches: 2 created, 1 updated, 0 deleted, 0 malformed",
        ));

    convo_sync(dir.path())
        .arg("status")
        .assert()
        .success()
        .stdout(predicate::str::contains("Conversations: 1"))
        .stdout(predicate::str::contains("Messages:      1"));
}

#[test]
fn suspended_replay_queues_then_applies() {
    let dir = tempdir().unwrap();
    let feed = dir.path().join("feed.jsonl");
    std::fs::write(&feed, FEED).unwrap();

    convo_sync(dir.path())
        .arg("replay")
        .arg(&feed)
        .arg("--suspended")
        .assert()
        .success()
        .stdout(predicate::str::contains("queued    2 batches"))
        .stdout(predicate::str::contains("Replayed 2 batches"));
}

#[test]
fn replay_rejects_bad_feed() {
    let dir = tempdir().unwrap();
    let feed = dir.path().join("feed.jsonl");
    std::fs::write(&feed, "{\"events\": []}\nnot json\n").unwrap();

    convo_sync(dir.path())
        .arg("replay")
        .arg(&feed)
        .assert()
        .failure()
        .stderr(predicate::str::contains("line 2"));
}

#[test]
fn explicit_config_path() {
    let dir = tempdir().unwrap();
    let config = dir.path().join("custom.toml");
    std::fs::write(
        &config,
        "[store]\ndatabase = \"elsewhere.db\"\n\n[logging]\nlog_level = \"warn\"\n",
    )
    .unwrap();

    let feed = dir.path().join("feed.jsonl");
    std::fs::write(&feed, FEED).unwrap();

    convo_sync(dir.path())
        .arg("--config")
        .arg(&config)
        .arg("replay")
        .arg(&feed)
        .assert()
        .success();

    assert!(dir.path().join("elsewhere.db").exists());
}
