//! Malformed request handling (spec.md §4.1 "Validation / malformed
//! request"): a file that doesn't parse as either envelope shape is
//! quarantined so polling doesn't retry it forever, and an error response
//! is still published for it (spec.md §4.1 "Malformed request JSON ->
//! error response published").

use crate::support::{wait_for, Harness};
use std::fs;
use std::time::Duration;

#[test]
fn a_malformed_request_file_is_quarantined_and_answered_with_an_error_response() {
    let harness = Harness::new();
    fs::create_dir_all(harness.request_dir()).unwrap();
    fs::write(harness.request_dir().join("bad.json"), b"not json at all").unwrap();
    let mut daemon = harness.spawn();

    let answered = wait_for(Duration::from_secs(5), || harness.response_dir().join("bad.json").exists());
    assert!(answered, "a malformed request should still get a published error response");

    let quarantined = wait_for(Duration::from_secs(5), || harness.request_dir().join("bad.malformed").exists());
    assert!(quarantined, "malformed request should have been renamed to .malformed");
    assert!(!harness.request_dir().join("bad.json").exists());

    let body = fs::read_to_string(harness.response_dir().join("bad.json")).unwrap();
    let response: serde_json::Value = serde_json::from_str(&body).unwrap();
    assert_eq!(response["status"], "error");
    assert!(response["error"].as_str().unwrap().contains("malformed request"));

    crate::support::stop(&mut daemon);
}
