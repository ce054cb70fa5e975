// SPDX-License-Identifier: MIT

//! The deterministic fallback a run falls back to when a prompt was
//! classified as requiring tool execution but two nudges still produced no
//! tool calls. What concrete tool calls to make ("create file X with N
//! lines then read it back" → `Write` then `Read`) is application-specific
//! tool knowledge, which this crate does not own — individual tool
//! implementations are out of scope here. `DeterministicFallback` is the
//! seam a host wires a concrete prompt-pattern matcher into.

use crate::executor::{ExecutorError, ToolRegistry};
use agent_core::ToolCall;
use async_trait::async_trait;
use regex::Regex;
use std::sync::LazyLock;

/// One deterministic tool call and the result it produced.
pub type FallbackStep = (ToolCall, Result<String, ExecutorError>);

#[async_trait]
pub trait DeterministicFallback: Send + Sync {
    /// Attempt to satisfy `prompt` via a hard-coded tool sequence instead of
    /// another model call. `None` means no pattern matched.
    async fn try_fallback(&self, prompt: &str) -> Option<Vec<FallbackStep>>;
}

/// The default: no deterministic fallback patterns configured.
pub struct NoDeterministicFallback;

#[async_trait]
impl DeterministicFallback for NoDeterministicFallback {
    async fn try_fallback(&self, _prompt: &str) -> Option<Vec<FallbackStep>> {
        None
    }
}

#[allow(clippy::expect_used)]
static CREATE_AND_READ_PATTERN: LazyLock<Regex> = LazyLock::new(|| {
    Regex::new(
        r"(?i)create\s+(?P<path>\S+)\s+with\s+(?P<n>\d+)\s+lines?\s*:\s*(?P<items>.+?)(?:,?\s*then read it back)?\.?\s*$",
    )
    .expect("constant regex pattern is valid")
});

#[allow(clippy::expect_used)]
static LIST_NEWEST_PATTERN: LazyLock<Regex> = LazyLock::new(|| {
    Regex::new(r"(?i)list\s*(?:&|and)?\s*read\s+(?:the\s+)?newest\s+(?:file\s+)?in\s+(?P<dir>\S+)").expect("constant regex pattern is valid")
});

/// Hard-coded prompt-pattern matcher, run only after the mandatory-tool
/// nudge has already been tried twice and produced no tool calls. Named
/// after the runtime's two concrete fallback examples
/// ("create file X with N lines then read it back" and "list & read newest
/// in DIR"); dispatches through the same [`ToolRegistry`] the main loop
/// uses, under the conventional tool names `Write`/`Read`/`Glob` a host
/// wires up (the individual tool implementations themselves stay out of
/// this crate's scope).
pub struct PatternFallback<'a> {
    registry: &'a ToolRegistry,
}

impl<'a> PatternFallback<'a> {
    pub fn new(registry: &'a ToolRegistry) -> Self {
        Self { registry }
    }

    async fn create_and_read_back(&self, prompt: &str) -> Option<Vec<FallbackStep>> {
        let captures = CREATE_AND_READ_PATTERN.captures(prompt)?;
        let path = captures.name("path")?.as_str().to_string();
        let items_raw = captures.name("items")?.as_str();

        let lines: Vec<String> = items_raw
            .split([',', ' '])
            .map(str::trim)
            .filter(|s| !s.is_empty())
            .map(str::to_string)
            .collect();
        let content = lines.join("\n");

        let mut steps = Vec::new();

        let write_call = ToolCall {
            id: "fallback-write-1".to_string(),
            name: "Write".to_string(),
            arguments: serde_json::json!({"path": path, "content": content}),
        };
        let write_result = self
            .registry
            .execute("Write", write_call.arguments.clone())
            .await;
        steps.push((write_call, write_result));

        let read_call = ToolCall {
            id: "fallback-read-1".to_string(),
            name: "Read".to_string(),
            arguments: serde_json::json!({"path": path}),
        };
        let read_result = self.registry.execute("Read", read_call.arguments.clone()).await;
        steps.push((read_call, read_result));

        Some(steps)
    }

    async fn list_and_read_newest(&self, prompt: &str) -> Option<Vec<FallbackStep>> {
        let captures = LIST_NEWEST_PATTERN.captures(prompt)?;
        let dir = captures.name("dir")?.as_str().to_string();

        let glob_call = ToolCall {
            id: "fallback-glob-1".to_string(),
            name: "Glob".to_string(),
            arguments: serde_json::json!({"pattern": format!("{dir}/*")}),
        };
        let glob_result = self.registry.execute("Glob", glob_call.arguments.clone()).await;

        let newest_path = match &glob_result {
            Ok(output) => newest_candidate(output),
            Err(_) => None,
        };
        let mut steps = vec![(glob_call, glob_result)];

        if let Some(newest_path) = newest_path {
            let read_call = ToolCall {
                id: "fallback-read-1".to_string(),
                name: "Read".to_string(),
                arguments: serde_json::json!({"path": newest_path}),
            };
            let read_result = self.registry.execute("Read", read_call.arguments.clone()).await;
            steps.push((read_call, read_result));
        }

        Some(steps)
    }
}

/// Picks a "newest" candidate out of a newline-separated `Glob` result.
///
/// Stat-based mtime sorting is tool-specific and out of scope here; this
/// assumes paths carry a sortable (e.g. timestamp-prefixed) name, matching
/// the common convention of the filesystem tools this fallback targets, and
/// falls back to the lexicographically greatest line otherwise.
fn newest_candidate(glob_output: &str) -> Option<String> {
    glob_output.lines().map(str::trim).filter(|l| !l.is_empty()).max().map(str::to_string)
}

#[async_trait]
impl DeterministicFallback for PatternFallback<'_> {
    async fn try_fallback(&self, prompt: &str) -> Option<Vec<FallbackStep>> {
        if let Some(steps) = self.create_and_read_back(prompt).await {
            return Some(steps);
        }
        self.list_and_read_newest(prompt).await
    }
}

#[cfg(test)]
#[path = "deterministic_fallback_tests.rs"]
mod tests;
