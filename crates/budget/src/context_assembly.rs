// SPDX-License-Identifier: MIT

//! Context-message assembly: select how much of the recent history fits,
//! soft-clamp oversized individual messages, and drop the oldest messages
//! one at a time if the assembled prompt still doesn't fit.

use crate::estimate::{estimate_request, estimate_text};
use agent_core::{Message, TokenEstimateConfig};

const TRUNCATION_SUFFIX: &str = "\n\n[Context truncated for length]";

/// `resolvedAdjusted = min(adjustedRecentTokens, floor(remainingContext * tokenRatio))`.
pub fn resolved_adjusted_tokens(adjusted_recent_tokens: u64, remaining_context: u64, token_ratio: f64) -> u64 {
    let ratio_bound = (remaining_context as f64 * token_ratio).floor() as u64;
    adjusted_recent_tokens.min(ratio_bound)
}

/// Select the newest-first suffix of `history` whose estimated token cost
/// fits within `resolved_adjusted_tokens`, keeping chronological order.
pub fn select_recent_window(
    history: &[Message],
    resolved_adjusted_tokens: u64,
    config: &TokenEstimateConfig,
) -> Vec<Message> {
    let mut kept: Vec<&Message> = Vec::new();
    let mut running_tokens = 0u64;

    for message in history.iter().rev() {
        let cost = estimate_text(&message.content, config) + config.tokens_per_message;
        if !kept.is_empty() && running_tokens + cost > resolved_adjusted_tokens {
            break;
        }
        running_tokens += cost;
        kept.push(message);
    }

    kept.into_iter().rev().cloned().collect()
}

/// Soft-clamp any message whose byte length exceeds the per-message budget
/// (`maxContextMessageTokens / tokens_per_char` bytes), truncating to that
/// byte budget and appending the truncation suffix.
pub fn soft_clamp_messages(
    messages: &mut [Message],
    max_context_message_tokens: u64,
    tokens_per_char: f64,
) {
    if tokens_per_char <= 0.0 {
        return;
    }
    let max_bytes = (max_context_message_tokens as f64 / tokens_per_char) as usize;
    for message in messages.iter_mut() {
        if message.content.len() > max_bytes {
            let truncated = utf8_safe_truncate(&message.content, max_bytes.saturating_sub(TRUNCATION_SUFFIX.len()));
            message.content = format!("{truncated}{TRUNCATION_SUFFIX}");
        }
    }
}

fn utf8_safe_truncate(s: &str, max_bytes: usize) -> &str {
    if s.len() <= max_bytes {
        return s;
    }
    let mut end = max_bytes;
    while end > 0 && !s.is_char_boundary(end) {
        end -= 1;
    }
    &s[..end]
}

/// If the estimated prompt (instructions + messages, 1.3x safety margin
/// applied per spec.md §8's invariant) still exceeds `0.75 * context_length`
/// and more than two messages remain, drop the oldest messages one at a
/// time until it fits (or only two remain).
pub fn drop_oldest_until_fits(
    instructions: &str,
    messages: &mut Vec<Message>,
    context_length: u64,
    config: &TokenEstimateConfig,
) {
    let budget = (context_length as f64 * 0.75) as u64;
    while messages.len() > 2 {
        let estimate = estimate_request(instructions, messages, config);
        if estimate <= budget {
            break;
        }
        messages.remove(0);
    }
}

#[cfg(test)]
#[path = "context_assembly_tests.rs"]
mod tests;
