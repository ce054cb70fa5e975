// SPDX-License-Identifier: MIT

//! Data model shared by every runtime component: sessions, the request/
//! response envelope, tool-call accounting, and the process-wide model
//! cooldown and daemon-status records.

use crate::define_id;
use serde::{Deserialize, Serialize};
use std::collections::HashMap;

define_id! {
    /// Opaque session identifier; the unit of conversation isolation.
    pub struct SessionId("sess");
}

/// Role of a message in a session's append-only history.
///
/// Distinct from [`crate::llm::Role`]: history only ever stores the two
/// roles a session actually persists (`Session.history[]`); the
/// richer LLM-facing role set (system/tool) only exists transiently while a
/// run is in flight.
#[derive(Debug, Clone, Copy, Serialize, Deserialize, PartialEq, Eq)]
#[serde(rename_all = "snake_case")]
pub enum HistoryRole {
    User,
    Assistant,
}

/// One line of a session's `history.jsonl` file.
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq)]
pub struct HistoryMessage {
    pub seq: u64,
    pub role: HistoryRole,
    pub content: String,
    /// Epoch milliseconds.
    pub timestamp: u64,
}

/// A session's durable `state.json`: rolling summary, deduped facts, and the
/// high-water mark of what has already been folded into the summary.
#[derive(Debug, Clone, Default, Serialize, Deserialize, PartialEq)]
pub struct SessionState {
    #[serde(default)]
    pub summary: String,
    #[serde(default)]
    pub facts: Vec<String>,
    #[serde(default)]
    pub last_summary_seq: u64,
}

/// Maximum number of facts retained in [`SessionState::facts`]
/// ("Fact cap rationale").
pub const MAX_FACTS: usize = 30;

impl SessionState {
    /// Merge `new_facts` in, deduping case-insensitively against the
    /// existing list and capping at [`MAX_FACTS`], keeping the most recent
    /// entries (new facts are appended to the tail; oldest are dropped from
    /// the head when over cap).
    pub fn merge_facts(&mut self, new_facts: impl IntoIterator<Item = String>) {
        for fact in new_facts {
            let already_present = self
                .facts
                .iter()
                .any(|existing| existing.eq_ignore_ascii_case(&fact));
            if !already_present {
                self.facts.push(fact);
            }
        }
        if self.facts.len() > MAX_FACTS {
            let excess = self.facts.len() - MAX_FACTS;
            self.facts.drain(0..excess);
        }
    }
}

/// Reasoning effort requested for a run.
#[derive(Debug, Clone, Copy, Default, Serialize, Deserialize, PartialEq, Eq)]
#[serde(rename_all = "lowercase")]
pub enum ReasoningEffort {
    Off,
    #[default]
    Low,
    Medium,
    High,
}

/// Per-tool and per-run policy gating which tools may execute and how often.
#[derive(Debug, Clone, Default, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct ToolPolicy {
    #[serde(default)]
    pub allow: Vec<String>,
    #[serde(default)]
    pub deny: Vec<String>,
    #[serde(default)]
    pub max_per_run: HashMap<String, u32>,
    #[serde(default = "default_max_per_run")]
    pub default_max_per_run: u32,
}

fn default_max_per_run() -> u32 {
    12
}

/// Model capability declaration, supplied by the host ("Model
/// capability injection" — never inferred from the model name itself).
#[derive(Debug, Clone, Copy, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct ModelCapabilities {
    pub context_length: u64,
}

/// Token-estimation coefficients.
#[derive(Debug, Clone, Copy, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct TokenEstimateConfig {
    pub tokens_per_char: f64,
    pub tokens_per_message: u64,
    pub tokens_per_request: u64,
}

impl Default for TokenEstimateConfig {
    fn default() -> Self {
        Self { tokens_per_char: 0.25, tokens_per_message: 4, tokens_per_request: 3 }
    }
}

/// A unit of work read from the request spool.
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct Request {
    pub id: String,
    pub prompt: String,
    #[serde(default)]
    pub session_id: Option<SessionId>,
    #[serde(default)]
    pub attachments: Vec<Attachment>,
    #[serde(default)]
    pub model_override: Option<String>,
    #[serde(default)]
    pub model_fallbacks: Vec<String>,
    pub model_capabilities: ModelCapabilities,
    #[serde(default)]
    pub model_max_output_tokens: Option<u32>,
    #[serde(default)]
    pub model_temperature: Option<f32>,
    #[serde(default)]
    pub reasoning_effort: ReasoningEffort,
    #[serde(default = "default_max_tool_steps")]
    pub max_tool_steps: u32,
    #[serde(default)]
    pub tool_policy: ToolPolicy,
    #[serde(default)]
    pub memory_recall: Vec<String>,
    #[serde(default)]
    pub user_profile: Option<String>,
    #[serde(default)]
    pub behavior_config: HashMap<String, serde_json::Value>,
    #[serde(default)]
    pub stream_dir: Option<String>,
    #[serde(default)]
    pub is_scheduled_task: bool,
    #[serde(default)]
    pub task_id: Option<String>,
    #[serde(default)]
    pub timezone: Option<String>,
    #[serde(default)]
    pub host_platform: Option<String>,
    #[serde(default)]
    pub token_estimate: TokenEstimateConfig,
    #[serde(default)]
    pub disable_tools: bool,
    #[serde(default)]
    pub disable_memory_extraction: bool,
}

fn default_max_tool_steps() -> u32 {
    24
}

/// An attachment referenced by a request; images count toward the 5MB/20MB
/// caps on attachment size.
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct Attachment {
    pub kind: AttachmentKind,
    /// Data URI or filesystem path, depending on `kind`.
    pub url: String,
    #[serde(default)]
    pub bytes: Option<u64>,
}

#[derive(Debug, Clone, Copy, Serialize, Deserialize, PartialEq, Eq)]
#[serde(rename_all = "snake_case")]
pub enum AttachmentKind {
    Image,
    File,
}

/// Response status.
#[derive(Debug, Clone, Copy, Serialize, Deserialize, PartialEq, Eq)]
#[serde(rename_all = "lowercase")]
pub enum ResponseStatus {
    Success,
    Error,
}

/// Per-phase latency breakdown.
#[derive(Debug, Clone, Default, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct Timings {
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub planner_ms: Option<u64>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub response_validation_ms: Option<u64>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub memory_extraction_ms: Option<u64>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub tool_ms: Option<u64>,
}

/// Record of one tool invocation, redacted before persisting.
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct ToolCallRecord {
    pub name: String,
    /// Arguments with secret-shaped values redacted before storage.
    pub args: serde_json::Value,
    pub ok: bool,
    pub duration_ms: u64,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub error: Option<String>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub output_bytes: Option<u64>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub output_truncated: Option<bool>,
}

/// Mirrors [`ToolCallRecord`] for inner output accounting.
pub type ToolResultRecord = ToolCallRecord;

/// Result published to the response spool.
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct Response {
    pub status: ResponseStatus,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub result: Option<String>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub error: Option<String>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub new_session_id: Option<SessionId>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub model: Option<String>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub memory_summary: Option<String>,
    #[serde(default)]
    pub memory_facts: Vec<String>,
    #[serde(default)]
    pub tokens_prompt: u64,
    #[serde(default)]
    pub tokens_completion: u64,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub tool_calls: Option<Vec<ToolCallRecord>>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub tool_retry_attempts: Option<u32>,
    #[serde(default)]
    pub tool_loop_breaker_triggered: bool,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub tool_loop_breaker_reason: Option<String>,
    pub latency_ms: u64,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub reply_to_id: Option<String>,
    #[serde(default)]
    pub timings: Timings,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub prompt_pack_versions: Option<HashMap<String, String>>,
}

impl Response {
    pub fn error(message: impl Into<String>) -> Self {
        Self {
            status: ResponseStatus::Error,
            result: None,
            error: Some(message.into()),
            new_session_id: None,
            model: None,
            memory_summary: None,
            memory_facts: Vec::new(),
            tokens_prompt: 0,
            tokens_completion: 0,
            tool_calls: None,
            tool_retry_attempts: None,
            tool_loop_breaker_triggered: false,
            tool_loop_breaker_reason: None,
            latency_ms: 0,
            reply_to_id: None,
            timings: Timings::default(),
            prompt_pack_versions: None,
        }
    }
}

/// Process-wide model cooldown entry.
#[derive(Debug, Clone, Copy)]
pub struct ModelCooldownEntry {
    pub cooldown_until_epoch_ms: u64,
}

/// Externally observable daemon state.
#[derive(Debug, Clone, Copy, Serialize, Deserialize, PartialEq, Eq)]
#[serde(rename_all = "lowercase")]
pub enum DaemonStatusState {
    Idle,
    Processing,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct DaemonStatus {
    pub state: DaemonStatusState,
    pub ts: u64,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub request_id: Option<String>,
    pub started_at: u64,
    pub pid: u32,
}

/// Messages sent to the heartbeat reporter task.
#[derive(Debug, Clone)]
pub enum HeartbeatMessage {
    Processing { request_id: String },
    Idle,
    Shutdown,
}

#[cfg(test)]
#[path = "model_tests.rs"]
mod tests;
