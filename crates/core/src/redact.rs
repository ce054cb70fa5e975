// SPDX-License-Identifier: MIT

//! Redacts secret-shaped values out of tool-call arguments before they're
//! persisted in a [`crate::model::ToolCallRecord`] (spec.md §3: "args
//! (redacted)"). Keys are matched case-insensitively against a fixed list of
//! names that conventionally carry credentials; matching values are replaced
//! in place rather than the whole object being dropped, so the rest of the
//! arguments stay useful for debugging.

use serde_json::Value;

const REDACTED: &str = "[REDACTED]";

const SECRET_KEY_MARKERS: &[&str] =
    &["password", "passwd", "secret", "token", "api_key", "apikey", "authorization", "auth", "credential", "private_key"];

fn looks_like_secret_key(key: &str) -> bool {
    let lower = key.to_ascii_lowercase();
    SECRET_KEY_MARKERS.iter().any(|marker| lower.contains(marker))
}

/// Recursively walks a JSON value, replacing the value of any object key
/// that looks secret-shaped with a fixed placeholder.
pub fn redact_args(value: &Value) -> Value {
    match value {
        Value::Object(map) => Value::Object(
            map.iter()
                .map(|(k, v)| {
                    if looks_like_secret_key(k) {
                        (k.clone(), Value::String(REDACTED.to_string()))
                    } else {
                        (k.clone(), redact_args(v))
                    }
                })
                .collect(),
        ),
        Value::Array(items) => Value::Array(items.iter().map(redact_args).collect()),
        other => other.clone(),
    }
}

#[cfg(test)]
#[path = "redact_tests.rs"]
mod tests;
