// SPDX-License-Identifier: MIT

//! Idempotent-tool retry with linear backoff, and the text-based
//! transient/non-retryable failure classification used while executing a
//! tool call.

use std::time::Duration;

/// Whether a tool failure message looks transient (timeout, 5xx, network)
/// and therefore eligible for idempotent retry.
pub fn is_transient(message: &str) -> bool {
    let lower = message.to_ascii_lowercase();
    ["timeout", "timed out", "connection reset", "connection refused", "temporarily unavailable", "econnreset"]
        .iter()
        .any(|needle| lower.contains(needle))
        || has_5xx_marker(&lower)
}

fn has_5xx_marker(lower: &str) -> bool {
    lower.split(|c: char| !c.is_ascii_digit()).any(|token| {
        token.len() == 3 && token.starts_with('5') && token.chars().all(|c| c.is_ascii_digit())
    })
}

/// Linear backoff for the `attempt`th retry (1-indexed), capped at 2s as
/// the runtime's usual `idempotentRetryBackoffMs` ceiling.
pub fn backoff(attempt: u32, backoff_ms: u64) -> Duration {
    Duration::from_millis((backoff_ms * u64::from(attempt)).min(2_000))
}

/// Retry configuration for idempotent tool calls.
#[derive(Debug, Clone, Copy)]
pub struct RetryConfig {
    pub idempotent_retry_attempts: u32,
    pub idempotent_retry_backoff_ms: u64,
}

impl Default for RetryConfig {
    fn default() -> Self {
        Self { idempotent_retry_attempts: 2, idempotent_retry_backoff_ms: 500 }
    }
}

#[cfg(test)]
#[path = "retry_tests.rs"]
mod tests;
