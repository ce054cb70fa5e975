// SPDX-License-Identifier: MIT

//! Error classification from an `LlmError`'s message text, case-insensitive
//! throughout. The message is the only signal: `agent_core::LlmError`
//! deliberately carries no structured error code of its own.

use regex::Regex;
use std::sync::LazyLock;

/// How a failed completion call should be handled.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ErrorClass {
    /// Rebuild context at a deeper trim level and retry the same model once,
    /// without advancing the chain.
    ContextOverflow,
    /// Cooldown this model and move to the next candidate in the chain.
    Retryable,
    /// Run-fatal: propagate immediately.
    NonClassified,
}

const CONTEXT_OVERFLOW_MARKERS: [&str; 3] =
    ["maximum context length", "context length exceeded", "too many tokens"];

/// Markers that earn the short, 60s rate-limit cooldown.
const RATE_LIMIT_MARKERS: [&str; 3] = ["429", "rate-limit", "rate limit"];

/// Markers that earn the long, 300s server-error/timeout cooldown.
const SERVER_ERROR_MARKERS: [&str; 9] = [
    "server error",
    "bad gateway",
    "unavailable",
    "timeout",
    "timed out",
    "deadline",
    "model not available",
    "no endpoints",
    "provider error",
];

#[allow(clippy::expect_used)]
static FIVE_XX_PATTERN: LazyLock<Regex> =
    LazyLock::new(|| Regex::new(r"\b5\d\d\b").expect("constant regex pattern is valid"));

/// Classify `message` per spec.md §4.9.
pub fn classify(message: &str) -> ErrorClass {
    let lower = message.to_ascii_lowercase();

    if CONTEXT_OVERFLOW_MARKERS.iter().any(|marker| lower.contains(marker)) {
        return ErrorClass::ContextOverflow;
    }

    if is_rate_limit(&lower) || is_server_error(&lower) {
        return ErrorClass::Retryable;
    }

    ErrorClass::NonClassified
}

fn is_rate_limit(lower: &str) -> bool {
    RATE_LIMIT_MARKERS.iter().any(|marker| lower.contains(marker))
}

fn is_server_error(lower: &str) -> bool {
    SERVER_ERROR_MARKERS.iter().any(|marker| lower.contains(marker)) || FIVE_XX_PATTERN.is_match(lower)
}

/// The 60s/300s cooldown duration a [`ErrorClass::Retryable`] failure earns,
/// re-deriving which sub-bucket `message` fell into (rate-limit vs.
/// 5xx/timeout) since [`ErrorClass`] itself only distinguishes
/// context-overflow/retryable/non-classified.
pub fn retryable_cooldown_ms(message: &str) -> u64 {
    let lower = message.to_ascii_lowercase();
    if is_rate_limit(&lower) {
        60_000
    } else {
        300_000
    }
}

#[cfg(test)]
#[path = "classify_tests.rs"]
mod tests;
