//! Request/response spool round-trip (spec.md §4.1, §6, §8).
//!
//! `agentd` ships without a concrete `LlmClient` wired in (one is an
//! external collaborator per spec.md §1); the default binary answers every
//! request with a structured error envelope rather than hanging. That's
//! still enough surface to prove the daemon side of the contract: the
//! request file disappears, a well-formed response file appears in its
//! place, and the response is only ever visible after being renamed into
//! place atomically (never as partial content).

use crate::support::{read_json, wait_for, Harness};
use std::time::Duration;

#[test]
fn a_request_file_produces_a_well_formed_response_and_the_request_file_is_removed() {
    let harness = Harness::new();
    harness.write_request("req-1", "Say OK.");
    let mut daemon = harness.spawn();

    let response_path = harness.response_dir().join("req-1.json");
    let arrived = wait_for(Duration::from_secs(10), || response_path.exists());
    assert!(arrived, "no response file appeared for req-1");

    let response = read_json(&response_path);
    assert!(response["status"].is_string(), "response has no status field: {response}");
    assert!(!harness.request_dir().join("req-1.json").exists(), "request file was not removed");

    crate::support::stop(&mut daemon);
}

#[test]
fn multiple_queued_requests_are_all_eventually_answered() {
    let harness = Harness::new();
    // Write the numerically-later id first so a naive directory-iteration
    // order couldn't accidentally make this pass.
    harness.write_request("0002", "second");
    harness.write_request("0001", "first");
    let mut daemon = harness.spawn();

    let both_done = wait_for(Duration::from_secs(10), || {
        harness.response_dir().join("0001.json").exists() && harness.response_dir().join("0002.json").exists()
    });
    assert!(both_done, "both responses should eventually appear");

    crate::support::stop(&mut daemon);
}
