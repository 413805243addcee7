//! CLI tests for the sms-relay binary

use assert_cmd::Command;
use predicates::prelude::*;
use std::fs;
use tempfile::TempDir;

fn relay() -> Command {
    let mut cmd = Command::cargo_bin("sms-relay").unwrap();
    cmd.env_clear().env("RUST_LOG", "error");
    cmd
}

#[test]
fn test_parse_sms_file() {
    let temp = TempDir::new().unwrap();
    let file = temp.path().join("1.txt");
    fs::write(&file, "From: 10086\nContent: Your code is 1234").unwrap();

    relay()
        .env("MY_PHONE_NUMBER", "+8613800000000")
        .arg("parse")
        .arg(&file)
        .assert()
        .success()
        .stdout(predicate::str::starts_with("Your code is 1234\n"))
        .stdout(predicate::str::contains("From: 10086"))
        .stdout(predicate::str::contains("Line: +8613800000000"))
        .stdout(predicate::str::contains("channels: [chat=on, push=on, webhook=on]"));

    // parse never consumes the file
    assert!(file.exists());
}

#[test]
fn test_parse_call_file() {
    let temp = TempDir::new().unwrap();
    let file = temp.path().join("1.req");
    fs::write(&file, "TYPE:UP|NUM:12345|TIME:2024-01-01 10:00:00").unwrap();

    relay()
        .arg("parse")
        .arg(&file)
        .assert()
        .success()
        .stdout(predicate::str::contains("Call ended"))
        .stdout(predicate::str::contains("Ended: 2024-01-01 10:00:00"))
        .stdout(predicate::str::contains("channels: [chat=off, push=on, webhook=off]"));
}

#[test]
fn test_parse_unknown_call_type() {
    let temp = TempDir::new().unwrap();
    let file = temp.path().join("1.req");
    fs::write(&file, "TYPE:RING|NUM:12345").unwrap();

    relay()
        .arg("parse")
        .arg(&file)
        .assert()
        .success()
        .stdout(predicate::str::contains("nothing would be sent"));
}

#[test]
fn test_parse_rejects_other_extensions() {
    let temp = TempDir::new().unwrap();
    let file = temp.path().join("1.log");
    fs::write(&file, "whatever").unwrap();

    relay().arg("parse").arg(&file).assert().failure();
}

#[test]
fn test_config_redacts_secrets() {
    relay()
        .env("TG_TOKEN", "123456:super-secret")
        .env("SMS_NOTIFY_SWITCH", "1,0,1")
        .arg("config")
        .assert()
        .success()
        .stdout(predicate::str::contains("telegram_token: [set]"))
        .stdout(predicate::str::contains("sms_switches: [chat=on, push=off, webhook=on]"))
        .stdout(predicate::str::contains("super-secret").not());
}
