// SPDX-License-Identifier: MIT

//! The seam between the tool-execution loop and a concrete remote LLM HTTP
//! client.
//!
//! The remote LLM protocol itself is out of scope for this crate:
//! `LlmClient` is the trait the tool loop and model
//! router call through, and a real binary wires a concrete HTTP-backed
//! implementation into it. Grounded on the provider abstraction in
//! `austinjan-km/km-tools::llm::provider::LLMProvider`, trimmed to the
//! request/response shape the tool-execution loop needs
//! (no streaming handle type — streaming is modeled as an output sink
//! callback instead, since the loop must inspect the full text before
//! deciding whether to continue).

use async_trait::async_trait;
use serde::{Deserialize, Serialize};
use std::collections::HashMap;

/// Message role in a conversation sent to the model.
#[derive(Debug, Clone, Copy, Serialize, Deserialize, PartialEq, Eq)]
#[serde(rename_all = "snake_case")]
pub enum Role {
    System,
    User,
    Assistant,
    Tool,
}

/// One turn of the conversation passed to the model on every call.
///
/// Tool-execution loop invariant: every follow-up call
/// carries the *entire* conversation built so far, not just the last
/// function call / function result pair.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct Message {
    pub role: Role,
    pub content: String,
    /// Present on `Role::Tool` messages: which call this result answers.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub tool_call_id: Option<String>,
    /// Present on assistant messages that requested tool calls.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub tool_calls: Option<Vec<ToolCall>>,
    /// Optional image parts (data URIs), appended to the final user message
    /// per the "Image parts" convention.
    #[serde(default, skip_serializing_if = "Vec::is_empty")]
    pub image_urls: Vec<String>,
}

impl Message {
    pub fn system(content: impl Into<String>) -> Self {
        Self {
            role: Role::System,
            content: content.into(),
            tool_call_id: None,
            tool_calls: None,
            image_urls: Vec::new(),
        }
    }

    pub fn user(content: impl Into<String>) -> Self {
        Self {
            role: Role::User,
            content: content.into(),
            tool_call_id: None,
            tool_calls: None,
            image_urls: Vec::new(),
        }
    }

    pub fn assistant(content: impl Into<String>) -> Self {
        Self {
            role: Role::Assistant,
            content: content.into(),
            tool_call_id: None,
            tool_calls: None,
            image_urls: Vec::new(),
        }
    }

    pub fn tool_result(tool_call_id: impl Into<String>, content: impl Into<String>) -> Self {
        Self {
            role: Role::Tool,
            content: content.into(),
            tool_call_id: Some(tool_call_id.into()),
            tool_calls: None,
            image_urls: Vec::new(),
        }
    }

    /// Approximate serialized byte length, used by the budgeter's soft-clamp.
    pub fn byte_len(&self) -> usize {
        self.content.len()
    }
}

/// A tool call requested by the model.
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq)]
pub struct ToolCall {
    pub id: String,
    pub name: String,
    pub arguments: serde_json::Value,
}

/// Result of executing a tool call, fed back to the model as a `Role::Tool`
/// message.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct ToolResult {
    pub tool_call_id: String,
    pub content: String,
    pub is_error: bool,
}

/// Schema-only tool descriptor handed to the model.
///
/// Deliberately carries no executor: this crate requires stripping any
/// `execute` hook before handing tool descriptors to the SDK/model, so the
/// model cannot auto-run a tool — the application-level tool-execution loop
/// owns dispatch.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct ToolSchema {
    pub name: String,
    pub description: String,
    pub parameters: serde_json::Value,
}

/// A streamed text delta, written to the optional stream directory
/// ("Stream output").
#[derive(Debug, Clone)]
pub enum StreamChunk {
    Text(String),
    Done,
}

/// Why the model stopped generating.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum FinishReason {
    Stop,
    Length,
    ToolCalls,
    ContentFilter,
}

/// Token accounting returned alongside a completion.
#[derive(Debug, Clone, Copy, Default, Serialize, Deserialize)]
pub struct TokenUsage {
    pub prompt_tokens: u64,
    pub completion_tokens: u64,
}

/// One call's worth of model input.
#[derive(Debug, Clone)]
pub struct CompletionRequest {
    pub model: String,
    pub instructions: String,
    pub messages: Vec<Message>,
    pub tools: Vec<ToolSchema>,
    pub max_output_tokens: Option<u32>,
    pub temperature: Option<f32>,
    pub extra: HashMap<String, serde_json::Value>,
}

/// The model's response to a single completion call.
#[derive(Debug, Clone)]
pub struct CompletionResponse {
    pub text: String,
    pub tool_calls: Vec<ToolCall>,
    pub finish_reason: FinishReason,
    pub usage: TokenUsage,
}

/// Errors surfaced by a concrete `LlmClient` implementation.
///
/// Classified downstream by `agent-router::classify` purely from `message()`
/// text — this type intentionally carries no structured
/// error code of its own so that classification stays centralized in one
/// place.
#[derive(Debug, thiserror::Error)]
pub enum LlmError {
    #[error("{0}")]
    Provider(String),
    #[error("request timed out after {0:?}")]
    Timeout(std::time::Duration),
    #[error("request cancelled")]
    Cancelled,
}

impl LlmError {
    /// The text classifiers in `agent-router` match against.
    pub fn message(&self) -> String {
        self.to_string()
    }
}

/// The seam a concrete HTTP-backed provider implements.
///
/// The tool-execution loop and model router depend only on this trait —
/// never a concrete HTTP client — matching this crate's exclusion of "the
/// remote LLM HTTP protocol itself" from this core's scope.
#[async_trait]
pub trait LlmClient: Send + Sync {
    /// Run one completion call. `on_chunk`, if provided, receives streamed
    /// text deltas as they arrive; the final `CompletionResponse.text` is
    /// still the authoritative full text regardless of streaming.
    async fn complete(
        &self,
        request: CompletionRequest,
        on_chunk: Option<&(dyn Fn(StreamChunk) + Send + Sync)>,
    ) -> Result<CompletionResponse, LlmError>;
}

#[cfg(test)]
#[path = "llm_tests.rs"]
mod tests;
