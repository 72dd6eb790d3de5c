//! CLI smoke tests.
//!
//! Exercises the bly binary end to end: key minting/decoding round-trips
//! and a tracked interaction against a throwaway SQLite database.

use assert_cmd::Command;
use predicates::prelude::*;

fn bly_cmd() -> Command {
    Command::cargo_bin("bly").expect("bly binary should be built")
}

#[test]
fn help_lists_subcommands() {
    bly_cmd()
        .arg("--help")
        .assert()
        .success()
        .stdout(predicate::str::contains("decode"))
        .stdout(predicate::str::contains("mint"))
        .stdout(predicate::str::contains("bounds"))
        .stdout(predicate::str::contains("track"));
}

#[test]
fn mint_then_decode_round_trips() {
    let output = bly_cmd()
        .args(["mint", "--session", "--timestamp", "1700000000000"])
        .output()
        .expect("bly mint should execute");
    assert!(output.status.success());
    let session_id = String::from_utf8_lossy(&output.stdout).trim().to_string();

    bly_cmd()
        .args(["decode", &session_id])
        .assert()
        .success()
        .stdout(predicate::str::contains("1700000000000"));
}

#[test]
fn mint_count_emits_one_key_per_line() {
    let output = bly_cmd()
        .args(["mint", "--count", "5", "--timestamp", "42"])
        .output()
        .expect("bly mint should execute");
    assert!(output.status.success());
    let stdout = String::from_utf8_lossy(&output.stdout);
    assert_eq!(stdout.lines().count(), 5);
}

#[test]
fn bounds_bracket_the_millisecond() {
    let output = bly_cmd()
        .args(["bounds", "1700000000000"])
        .output()
        .expect("bly bounds should execute");
    assert!(output.status.success());
    let stdout = String::from_utf8_lossy(&output.stdout);
    let lower = stdout
        .lines()
        .find_map(|l| l.strip_prefix("lower "))
        .expect("lower bound line");
    let upper = stdout
        .lines()
        .find_map(|l| l.strip_prefix("upper "))
        .expect("upper bound line");
    assert!(lower < upper);
}

#[test]
fn decode_rejects_garbage() {
    bly_cmd().args(["decode", "!!not-a-key!!"]).assert().failure();
}

#[test]
fn track_reuses_the_session_inside_the_window() {
    let dir = tempfile::TempDir::new().unwrap();
    let db = dir.path().join("telemetry.db").to_string_lossy().into_owned();

    let args = [
        "track", "--db", db.as_str(), "--page", "p1", "--sender", "s1", "--timestamp", "1000",
        "--window-ms", "60000",
    ];
    let first = bly_cmd().args(args).output().expect("bly track should execute");
    assert!(first.status.success(), "stderr: {}", String::from_utf8_lossy(&first.stderr));
    let first: serde_json::Value =
        serde_json::from_slice(&first.stdout).expect("track emits JSON");

    let args = [
        "track", "--db", db.as_str(), "--page", "p1", "--sender", "s1", "--timestamp", "2000",
        "--window-ms", "60000",
    ];
    let second = bly_cmd().args(args).output().expect("bly track should execute");
    assert!(second.status.success());
    let second: serde_json::Value = serde_json::from_slice(&second.stdout).unwrap();

    assert_eq!(first["sessionId"], second["sessionId"]);
    assert_eq!(first["conversationId"], serde_json::json!("p1|s1"));
    assert_eq!(first["sessionStartedAt"], serde_json::json!(1000));
}
