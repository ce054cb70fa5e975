//! Graceful shutdown (spec.md §4.1, §6 "Process exit codes: 0 on clean
//! shutdown").

use crate::support::Harness;
use std::time::Duration;

#[cfg(unix)]
#[test]
fn sigterm_with_no_in_flight_request_exits_cleanly() {
    let harness = Harness::new();
    let mut daemon = harness.spawn();

    // Let it complete at least one poll/heartbeat cycle before asking it
    // to stop, so the shutdown path exercises a running event loop rather
    // than racing process startup.
    std::thread::sleep(Duration::from_millis(100));

    let status = crate::support::stop(&mut daemon);
    assert!(status.success(), "agentd should exit 0 on a clean SIGTERM shutdown, got {status:?}");
}
