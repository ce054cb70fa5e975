// SPDX-License-Identifier: MIT

//! Fixtures shared by this crate's own tests and by downstream crates'
//! tests (enabled via the `test-support` feature so `agent-memory`,
//! `agent-budget`, `agent-toolloop`, `agent-router` and `agent-daemon` can
//! depend on `agent-core` with `features = ["test-support"]` in
//! `dev-dependencies` instead of re-deriving fakes of their own).

use crate::llm::{
    CompletionRequest, CompletionResponse, FinishReason, LlmClient, LlmError, StreamChunk,
    TokenUsage,
};
use crate::model::{ModelCapabilities, Request, TokenEstimateConfig, ToolPolicy};
use async_trait::async_trait;
use parking_lot::Mutex;
use std::collections::VecDeque;

/// An `LlmClient` that replays a fixed queue of scripted responses or
/// errors, recording every request it received for assertions.
///
/// Grounded on the queued-response fake pattern used to drive the tool loop
/// deterministically in tests without a network dependency.
pub struct FakeLlmClient {
    responses: Mutex<VecDeque<FakeCompletion>>,
    received: Mutex<Vec<CompletionRequest>>,
}

pub enum FakeCompletion {
    Ok(CompletionResponse),
    Err(LlmError),
}

impl FakeLlmClient {
    pub fn new(responses: Vec<FakeCompletion>) -> Self {
        Self { responses: Mutex::new(responses.into()), received: Mutex::new(Vec::new()) }
    }

    /// Convenience for scripting plain-text, tool-call-free replies.
    pub fn with_text_replies(texts: impl IntoIterator<Item = &'static str>) -> Self {
        Self::new(
            texts
                .into_iter()
                .map(|t| {
                    FakeCompletion::Ok(CompletionResponse {
                        text: t.to_string(),
                        tool_calls: Vec::new(),
                        finish_reason: FinishReason::Stop,
                        usage: TokenUsage::default(),
                    })
                })
                .collect(),
        )
    }

    /// Requests received so far, in call order.
    pub fn received(&self) -> Vec<CompletionRequest> {
        self.received.lock().clone()
    }

    pub fn call_count(&self) -> usize {
        self.received.lock().len()
    }
}

#[async_trait]
impl LlmClient for FakeLlmClient {
    async fn complete(
        &self,
        request: CompletionRequest,
        _on_chunk: Option<&(dyn Fn(StreamChunk) + Send + Sync)>,
    ) -> Result<CompletionResponse, LlmError> {
        self.received.lock().push(request);
        match self.responses.lock().pop_front() {
            Some(FakeCompletion::Ok(resp)) => Ok(resp),
            Some(FakeCompletion::Err(err)) => Err(err),
            None => Err(LlmError::Provider("FakeLlmClient: response queue exhausted".into())),
        }
    }
}

/// Build a minimal valid [`Request`] for tests, overriding only what a test
/// cares about.
pub fn sample_request(prompt: &str) -> Request {
    Request {
        id: "req-test".to_string(),
        prompt: prompt.to_string(),
        session_id: None,
        attachments: Vec::new(),
        model_override: None,
        model_fallbacks: Vec::new(),
        model_capabilities: ModelCapabilities { context_length: 128_000 },
        model_max_output_tokens: None,
        model_temperature: None,
        reasoning_effort: Default::default(),
        max_tool_steps: 24,
        tool_policy: ToolPolicy::default(),
        memory_recall: Vec::new(),
        user_profile: None,
        behavior_config: Default::default(),
        stream_dir: None,
        is_scheduled_task: false,
        task_id: None,
        timezone: None,
        host_platform: None,
        token_estimate: TokenEstimateConfig::default(),
        disable_tools: false,
        disable_memory_extraction: false,
    }
}

#[cfg(test)]
#[path = "test_support_tests.rs"]
mod tests;
