// SPDX-License-Identifier: MIT

//! Small time-formatting helpers shared by the daemon's human-facing output
//! and log lines.

use chrono::Utc;

/// Format a millisecond duration as `"<n>ms"`, `"<n>s"`, or `"<n>m<n>s"`.
pub fn format_elapsed_ms(ms: u64) -> String {
    if ms < 1000 {
        return format!("{ms}ms");
    }
    format_elapsed(std::time::Duration::from_millis(ms))
}

/// Format a `Duration` as a compact human-readable elapsed time.
pub fn format_elapsed(d: std::time::Duration) -> String {
    let total_secs = d.as_secs();
    if total_secs < 60 {
        return format!("{total_secs}s");
    }
    let minutes = total_secs / 60;
    let seconds = total_secs % 60;
    if minutes < 60 {
        return format!("{minutes}m{seconds}s");
    }
    let hours = minutes / 60;
    let minutes = minutes % 60;
    format!("{hours}h{minutes}m")
}

/// Current UTC time formatted as RFC3339, used for breadcrumb/archive timestamps.
pub fn format_utc_now() -> String {
    Utc::now().to_rfc3339()
}

#[cfg(test)]
#[path = "time_fmt_tests.rs"]
mod tests;
