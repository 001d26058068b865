//! Binary smoke tests for procsnap_agent.
use assert_cmd::prelude::*;
use std::process::Command;
use std::time::{Duration, Instant};

fn closed_port() -> u16 {
    let l = std::net::TcpListener::bind("127.0.0.1:0").expect("bind");
    l.local_addr().expect("addr").port()
}

#[test]
fn single_run_with_unreachable_collector_exits_cleanly() {
    let url = format!("http://127.0.0.1:{}/api/process-data/", closed_port());
    let start = Instant::now();
    let out = Command::cargo_bin("procsnap_agent")
        .expect("binary exists")
        .env("PROCSNAP_BACKEND", &url)
        .env("PROCSNAP_INTERVAL", "0")
        .env("PROCSNAP_CPU_SAMPLE_DELAY", "0.05")
        .env("RUST_LOG", "info")
        .output()
        .expect("run agent");

    let text = format!(
        "{}{}",
        String::from_utf8_lossy(&out.stdout),
        String::from_utf8_lossy(&out.stderr)
    );
    assert!(out.status.success(), "agent failed:\n{text}");
    assert!(text.contains("error sending data"), "{text}");
    assert!(text.contains("single run complete"), "{text}");
    assert!(start.elapsed() < Duration::from_secs(30));
}
