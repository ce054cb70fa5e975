// SPDX-License-Identifier: MIT

//! Token estimation: `tokens(text) = ceil(utf8_bytes(text) * tokens_per_char)`,
//! plus per-message and per-request overhead, with a 1.3x safety margin
//! applied once to the final sum.
//!
//! Grounded on the cheap chars-based estimator in
//! `other_examples/.../parecode::budget::estimate_tokens` (`chars / 4 + 10`
//! per message), generalized to the byte-count-based, configurable-ratio
//! formula this budgeter uses instead of a fixed `/4` divisor.

use agent_core::{Message, TokenEstimateConfig};

/// Safety margin applied to the final estimate, compensating for
/// byte-count underestimation against the model's real tokenizer.
pub const SAFETY_MARGIN: f64 = 1.3;

/// Estimate tokens for a single string, before per-message/per-request
/// overhead.
pub fn estimate_text(text: &str, config: &TokenEstimateConfig) -> u64 {
    (text.len() as f64 * config.tokens_per_char).ceil() as u64
}

/// Estimate tokens for one message, including its per-message overhead.
pub fn estimate_message(message: &Message, config: &TokenEstimateConfig) -> u64 {
    let mut tokens = estimate_text(&message.content, config) + config.tokens_per_message;
    for url in &message.image_urls {
        tokens += estimate_text(url, config);
    }
    tokens
}

/// Estimate tokens for a set of messages, without per-request overhead or
/// the safety margin — callers assembling a full request should use
/// [`estimate_request`] instead.
pub fn estimate_messages(messages: &[Message], config: &TokenEstimateConfig) -> u64 {
    messages.iter().map(|m| estimate_message(m, config)).sum()
}

/// Estimate the full token cost of one LLM call: instructions + messages +
/// per-request overhead, with the 1.3x safety margin applied once to the
/// total.
pub fn estimate_request(instructions: &str, messages: &[Message], config: &TokenEstimateConfig) -> u64 {
    let raw = estimate_text(instructions, config) + estimate_messages(messages, config) + config.tokens_per_request;
    apply_safety_margin(raw)
}

/// Apply the safety margin to an already-computed raw estimate.
pub fn apply_safety_margin(raw_tokens: u64) -> u64 {
    (raw_tokens as f64 * SAFETY_MARGIN).ceil() as u64
}

#[cfg(test)]
#[path = "estimate_tests.rs"]
mod tests;
