// SPDX-License-Identifier: MIT

//! Canonicalizing tool calls into comparable signatures, for the livelock
//! breakers in [`crate::loop_detector`].

use agent_core::ToolCall;
use std::collections::BTreeMap;

/// `name` plus a stable, whitespace- and key-order-insensitive rendering of
/// `arguments` — two calls that differ only in JSON key order or incidental
/// whitespace hash to the same signature.
pub fn call_signature(call: &ToolCall) -> String {
    format!("{}:{}", call.name, canonicalize_arguments(&call.arguments))
}

/// A round's signature is the *multiset* of its calls' signatures, sorted so
/// that the same set of calls in a different order still compares equal.
pub fn round_signature(calls: &[ToolCall]) -> String {
    let mut sigs: Vec<String> = calls.iter().map(call_signature).collect();
    sigs.sort();
    sigs.join("|")
}

/// Recursively sorts object keys and renders via `serde_json`'s compact
/// form, so structurally identical arguments always produce the same
/// string regardless of how the model ordered its JSON.
fn canonicalize_arguments(value: &serde_json::Value) -> String {
    serde_json::to_string(&sort_keys(value)).unwrap_or_default()
}

fn sort_keys(value: &serde_json::Value) -> serde_json::Value {
    match value {
        serde_json::Value::Object(map) => {
            let sorted: BTreeMap<String, serde_json::Value> =
                map.iter().map(|(k, v)| (k.clone(), sort_keys(v))).collect();
            serde_json::json!(sorted)
        }
        serde_json::Value::Array(items) => serde_json::Value::Array(items.iter().map(sort_keys).collect()),
        other => other.clone(),
    }
}

#[cfg(test)]
#[path = "signature_tests.rs"]
mod tests;
