// SPDX-License-Identifier: MIT

//! Livelock detection for the tool-round loop.
//!
//! Two independent trackers: a *round* tracker comparing each round's
//! signature against only the immediately preceding round, and a *call*
//! tracker counting occurrences of each individual call signature across
//! the whole run. Structurally grounded on
//! `austinjan-km/km-tools::llm::loop_detector`'s recent-state-plus-counter
//! shape (a small sliding window, a `check`-style method returning an
//! optional detection, an explicit `reset`); the triggering logic itself is
//! original to this runtime (round-signature-vs-previous-round and a flat
//! per-call counter, not km-tools' sliding-window exact-duplicate/
//! oscillation scan — the two systems solve different problems).

use crate::signature::{call_signature, round_signature};
use agent_core::ToolCall;
use std::collections::HashMap;

/// Why the loop was stopped early.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum Breaker {
    /// The same round signature repeated `threshold` times in a row.
    RepeatedRoundSignature { threshold: u32 },
    /// A single call signature recurred `threshold` times across the run.
    RepeatedCallSignature { threshold: u32, name: String },
    /// Too many non-retryable tool failures in one run.
    NonRetryableFailures { threshold: u32 },
}

impl Breaker {
    /// Rendered in the `repeated_call_signature(N): Name` shape a host
    /// might match on
    /// (`repeated_call_signature(3): Glob`).
    pub fn reason(&self) -> String {
        match self {
            Breaker::RepeatedRoundSignature { threshold } => {
                format!("repeated_round_signature({threshold})")
            }
            Breaker::RepeatedCallSignature { threshold, name } => {
                format!("repeated_call_signature({threshold}): {name}")
            }
            Breaker::NonRetryableFailures { threshold } => {
                format!("non_retryable_failures({threshold})")
            }
        }
    }
}

/// Configurable thresholds with the runtime's usual defaults.
#[derive(Debug, Clone, Copy)]
pub struct LoopDetectorConfig {
    pub repeated_round_threshold: u32,
    pub repeated_signature_threshold: u32,
    pub non_retryable_failure_threshold: u32,
}

impl Default for LoopDetectorConfig {
    fn default() -> Self {
        Self {
            repeated_round_threshold: 3,
            repeated_signature_threshold: 3,
            non_retryable_failure_threshold: 3,
        }
    }
}

/// Run-scoped livelock state: the round-signature streak, the per-call
/// occurrence counter, and the non-retryable failure tally.
#[derive(Debug, Default)]
pub struct LoopDetector {
    config_repeated_round_threshold: u32,
    config_repeated_signature_threshold: u32,
    config_non_retryable_failure_threshold: u32,
    previous_round_signature: Option<String>,
    repeated_round_count: u32,
    call_signature_counts: HashMap<String, u32>,
    non_retryable_failures: u32,
}

impl LoopDetector {
    pub fn new(config: LoopDetectorConfig) -> Self {
        Self {
            config_repeated_round_threshold: config.repeated_round_threshold,
            config_repeated_signature_threshold: config.repeated_signature_threshold,
            config_non_retryable_failure_threshold: config.non_retryable_failure_threshold,
            previous_round_signature: None,
            repeated_round_count: 0,
            call_signature_counts: HashMap::new(),
            non_retryable_failures: 0,
        }
    }

    /// Step 4a: update the round streak and report a breaker if the streak
    /// just reached threshold.
    pub fn observe_round(&mut self, pending_calls: &[ToolCall]) -> Option<Breaker> {
        let signature = round_signature(pending_calls);
        if self.previous_round_signature.as_deref() == Some(signature.as_str()) {
            self.repeated_round_count += 1;
        } else {
            self.repeated_round_count = 1;
        }
        self.previous_round_signature = Some(signature);

        if self.repeated_round_count >= self.config_repeated_round_threshold {
            Some(Breaker::RepeatedRoundSignature { threshold: self.config_repeated_round_threshold })
        } else {
            None
        }
    }

    /// Step 4b: record one call's signature and report a breaker if its
    /// occurrence count just reached threshold.
    pub fn observe_call(&mut self, call: &ToolCall) -> Option<Breaker> {
        let signature = call_signature(call);
        let count = self.call_signature_counts.entry(signature).or_insert(0);
        *count += 1;
        if *count >= self.config_repeated_signature_threshold {
            Some(Breaker::RepeatedCallSignature {
                threshold: self.config_repeated_signature_threshold,
                name: call.name.clone(),
            })
        } else {
            None
        }
    }

    /// Called on every non-retryable tool failure; returns a breaker once
    /// the tally reaches threshold.
    pub fn observe_non_retryable_failure(&mut self) -> Option<Breaker> {
        self.non_retryable_failures += 1;
        if self.non_retryable_failures >= self.config_non_retryable_failure_threshold {
            Some(Breaker::NonRetryableFailures { threshold: self.config_non_retryable_failure_threshold })
        } else {
            None
        }
    }

    pub fn non_retryable_failures(&self) -> u32 {
        self.non_retryable_failures
    }

    pub fn reset(&mut self) {
        self.previous_round_signature = None;
        self.repeated_round_count = 0;
        self.call_signature_counts.clear();
        self.non_retryable_failures = 0;
    }
}

#[cfg(test)]
#[path = "loop_detector_tests.rs"]
mod tests;
