//! Cancellation semantics (spec.md §4.1, §8): "For all requests with a
//! cancel file observed before or during dispatch, no response file is
//! written."

use crate::support::Harness;
use std::time::Duration;

#[test]
fn a_request_cancelled_before_dispatch_never_gets_a_response() {
    let harness = Harness::new();
    harness.write_request("req-cancel", "Say OK.");
    harness.write_cancel("req-cancel");
    let mut daemon = harness.spawn();

    // Give the daemon several poll cycles to have picked this up if it
    // were going to process it, then assert the negative held throughout.
    std::thread::sleep(Duration::from_millis(300));

    assert!(!harness.response_dir().join("req-cancel.json").exists(), "a cancelled request must not get a response");
    assert!(!harness.request_dir().join("req-cancel.json").exists(), "the request file should have been discarded");
    assert!(
        !harness.request_dir().join("req-cancel.cancel").exists(),
        "the cancel marker should have been discarded alongside the request"
    );

    crate::support::stop(&mut daemon);
}
