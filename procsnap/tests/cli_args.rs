//! CLI smoke tests for the procsnap collector binary.
use assert_cmd::prelude::*;
use std::process::Command;

#[test]
fn help_mentions_short_and_long_port_flags() {
    let out = Command::cargo_bin("procsnap")
        .expect("binary exists")
        .arg("--help")
        .output()
        .expect("run procsnap --help");
    assert!(out.status.success());
    let text = format!(
        "{}{}",
        String::from_utf8_lossy(&out.stdout),
        String::from_utf8_lossy(&out.stderr)
    );
    assert!(text.contains("Usage:"), "{text}");
    assert!(
        text.contains("--port") && text.contains("-p") && text.contains("PROCSNAP_DB"),
        "help text missing expected flags\n{text}"
    );
}

#[test]
fn help_wins_over_other_flags() {
    // Must not try to bind or open a database.
    let out = Command::cargo_bin("procsnap")
        .expect("binary exists")
        .args(["--port", "1", "-h"])
        .env("PROCSNAP_DB", "/nonexistent/dir/procsnap.db")
        .output()
        .expect("run procsnap");
    assert!(out.status.success());
    assert!(String::from_utf8_lossy(&out.stdout).contains("Usage:"));
}
