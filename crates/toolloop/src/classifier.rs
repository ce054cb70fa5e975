// SPDX-License-Identifier: MIT

//! Mandatory-Tool Classifier: decide whether a prompt needs
//! real tool execution, whether in-context-memory markers should disable
//! the tool schema for this turn, and the prompt-length-driven output
//! token cap.

use regex::Regex;
use std::sync::LazyLock;

/// Reason a prompt was classified as requiring tool execution.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ToolRequirement {
    RequiredToolExecution,
}

impl ToolRequirement {
    pub fn as_str(self) -> &'static str {
        match self {
            ToolRequirement::RequiredToolExecution => "required_tool_execution",
        }
    }
}

/// Keyword groups that point at file creation, web actions, or system
/// state — the three example categories named below. Kept as a flat
/// list rather than three separate regexes: the classifier only needs a
/// yes/no answer plus the single named reason, not which category matched.
#[allow(clippy::expect_used)]
static REQUIRES_TOOL_PATTERN: LazyLock<Regex> = LazyLock::new(|| {
    Regex::new(
        r"(?i)\b(create|write|read|delete|list|glob|fetch|download|curl|http|search the web|browse|run|execute|install|check (disk|memory|cpu|process)|current (time|date)|environment variable)\b",
    )
    .expect("constant regex pattern is valid")
});

/// Prompt markers that mean "the answer is in conversation memory, not a
/// tool call" — disables the tool schema for this turn. Deliberately
/// exact: no paraphrase patterns beyond these three.
#[allow(clippy::expect_used)]
static DISABLE_TOOLS_PATTERN: LazyLock<Regex> = LazyLock::new(|| {
    Regex::new(r"(?i)(\[scenario:memory\]|earlier in this chat|what did you just)").expect("constant regex pattern is valid")
});

#[allow(clippy::expect_used)]
static BULLET_COUNT_PATTERN: LazyLock<Regex> = LazyLock::new(|| {
    Regex::new(r"(?i)\b(\d+)\s+bullets?\b").expect("constant regex pattern is valid")
});

#[allow(clippy::expect_used)]
static ONE_WORD_PATTERN: LazyLock<Regex> = LazyLock::new(|| {
    Regex::new(r"(?i)\bone[- ]word\b").expect("constant regex pattern is valid")
});

#[allow(clippy::expect_used)]
static ONE_SENTENCE_PATTERN: LazyLock<Regex> = LazyLock::new(|| {
    Regex::new(r"(?i)\bone[- ]sentence\b").expect("constant regex pattern is valid")
});

#[allow(clippy::expect_used)]
static CONCISE_PATTERN: LazyLock<Regex> = LazyLock::new(|| {
    Regex::new(r"(?i)\b(concise|brief|short)\b").expect("constant regex pattern is valid")
});

/// Whether the tool schema should be disabled for this turn.
pub fn disables_tools(prompt: &str) -> bool {
    DISABLE_TOOLS_PATTERN.is_match(prompt)
}

/// Classify whether `prompt` requires real tool execution.
pub fn classify(prompt: &str) -> Option<ToolRequirement> {
    if disables_tools(prompt) {
        return None;
    }
    REQUIRES_TOOL_PATTERN.is_match(prompt).then_some(ToolRequirement::RequiredToolExecution)
}

/// The prompt-length-driven output cap, combined with any explicit
/// `max_output_tokens` via `min`.
pub fn output_token_cap(prompt: &str, explicit_max_output: Option<u32>) -> u32 {
    let prompt_cap = if ONE_WORD_PATTERN.is_match(prompt) {
        48
    } else if ONE_SENTENCE_PATTERN.is_match(prompt) {
        180
    } else if let Some(captures) = BULLET_COUNT_PATTERN.captures(prompt) {
        let n: u32 = captures[1].parse().unwrap_or(1);
        (140 + 90 * n).clamp(180, 900)
    } else if CONCISE_PATTERN.is_match(prompt) {
        260
    } else {
        u32::MAX
    };

    match explicit_max_output {
        Some(explicit) => explicit.min(prompt_cap),
        None => prompt_cap,
    }
}

#[cfg(test)]
#[path = "classifier_tests.rs"]
mod tests;
