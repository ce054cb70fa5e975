//! Heartbeat + status file liveness (spec.md §4.1/§4.2, §8 "ticks never
//! regress `ts`").

use crate::support::{read_json, wait_for, Harness};
use std::time::Duration;

#[test]
fn heartbeat_and_status_files_appear_and_tick_forward() {
    let harness = Harness::new();
    let mut daemon = harness.spawn();

    let appeared = wait_for(Duration::from_secs(5), || {
        harness.heartbeat_path().exists() && harness.daemon_status_path().exists()
    });
    assert!(appeared, "heartbeat/status files never appeared");

    let first_tick: u64 =
        std::fs::read_to_string(harness.heartbeat_path()).expect("read heartbeat").trim().parse().expect("epoch ms");
    let status = read_json(&harness.daemon_status_path());
    assert_eq!(status["state"], "idle", "daemon should be idle with no requests queued");

    let ticked_forward = wait_for(Duration::from_secs(5), || {
        std::fs::read_to_string(harness.heartbeat_path())
            .ok()
            .and_then(|s| s.trim().parse::<u64>().ok())
            .is_some_and(|t| t > first_tick)
    });
    assert!(ticked_forward, "heartbeat file should keep advancing on its own timer");

    crate::support::stop(&mut daemon);
}

#[test]
fn status_file_returns_to_idle_once_a_request_has_been_answered() {
    let harness = Harness::new();
    harness.write_request("req-heartbeat", "Say OK.");
    let mut daemon = harness.spawn();

    let settled = wait_for(Duration::from_secs(10), || harness.response_dir().join("req-heartbeat.json").exists());
    assert!(settled, "request was never answered");

    // `Idle` is re-broadcast the moment the Worker returns (spec.md §4.1),
    // so the status file should settle back to it shortly after.
    let back_to_idle = wait_for(Duration::from_secs(5), || {
        read_json(&harness.daemon_status_path())["state"] == "idle"
    });
    assert!(back_to_idle, "daemon status never returned to idle after answering the request");

    crate::support::stop(&mut daemon);
}
