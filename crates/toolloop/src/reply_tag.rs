// SPDX-License-Identifier: MIT

//! Parsing and stripping the `[[reply_to_current]]` / `[[reply_to:<digits>]]`
//! sentinels a model may append to its final text.

use regex::Regex;
use std::sync::LazyLock;

#[allow(clippy::expect_used)]
static REPLY_TAG_PATTERN: LazyLock<Regex> =
    LazyLock::new(|| Regex::new(r"\[\[reply_to(?:_current|:(\d+))\]\]").expect("constant regex pattern is valid"));

/// What the final text's reply tag, if any, resolved to.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum ReplyTarget {
    Current,
    Id(String),
}

/// Strips the first reply tag found in `text` and returns the remaining
/// text alongside the parsed target, if one was present.
pub fn strip_reply_tag(text: &str) -> (String, Option<ReplyTarget>) {
    let Some(captures) = REPLY_TAG_PATTERN.captures(text) else {
        return (text.to_string(), None);
    };
    let Some(whole) = captures.get(0) else {
        return (text.to_string(), None);
    };
    let target = match captures.get(1) {
        Some(digits) => ReplyTarget::Id(digits.as_str().to_string()),
        None => ReplyTarget::Current,
    };
    let mut stripped = String::with_capacity(text.len());
    stripped.push_str(&text[..whole.start()]);
    stripped.push_str(&text[whole.end()..]);
    (stripped.trim().to_string(), Some(target))
}

#[cfg(test)]
#[path = "reply_tag_tests.rs"]
mod tests;
