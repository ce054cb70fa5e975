// SPDX-License-Identifier: MIT

//! The "Summary Model" the compaction pipeline calls through: a thin
//! wrapper over `agent_core::LlmClient` that sends a minimal summarization
//! prompt and parses the `{summary, facts[]}` JSON result.

use crate::error::MemoryError;
use agent_core::{CompletionRequest, HistoryMessage, LlmClient};
use async_trait::async_trait;
use serde::Deserialize;
use std::sync::Arc;

/// One summarization call's result.
#[derive(Debug, Clone, Deserialize)]
pub struct SummaryResult {
    pub summary: String,
    #[serde(default)]
    pub facts: Vec<String>,
}

/// Abstracts the summarization call so the compaction pipeline's tests can
/// substitute a deterministic fake.
#[async_trait]
pub trait SummaryModel: Send + Sync {
    /// Summarize `messages`, given the prior `{summary, facts}` as context
    /// and, for multi-part compactions, the summaries produced by earlier
    /// parts of this same compaction run.
    async fn summarize(
        &self,
        prior_summary: &str,
        prior_facts: &[String],
        prior_part_summaries: &[String],
        messages: &[HistoryMessage],
    ) -> Result<SummaryResult, MemoryError>;
}

/// Real implementation backed by an `LlmClient`.
pub struct LlmSummaryModel {
    client: Arc<dyn LlmClient>,
    model: String,
    max_output_tokens: Option<u32>,
}

impl LlmSummaryModel {
    pub fn new(client: Arc<dyn LlmClient>, model: impl Into<String>, max_output_tokens: Option<u32>) -> Self {
        Self { client, model: model.into(), max_output_tokens }
    }
}

#[async_trait]
impl SummaryModel for LlmSummaryModel {
    async fn summarize(
        &self,
        prior_summary: &str,
        prior_facts: &[String],
        prior_part_summaries: &[String],
        messages: &[HistoryMessage],
    ) -> Result<SummaryResult, MemoryError> {
        let instructions = build_instructions(prior_summary, prior_facts, prior_part_summaries);
        let transcript = render_transcript(messages);

        let request = CompletionRequest {
            model: self.model.clone(),
            instructions,
            messages: vec![agent_core::Message::user(transcript)],
            tools: Vec::new(),
            max_output_tokens: self.max_output_tokens,
            temperature: Some(0.0),
            extra: Default::default(),
        };

        let response = self
            .client
            .complete(request, None)
            .await
            .map_err(|e| MemoryError::SummaryModel(e.message()))?;

        parse_summary_json(&response.text)
    }
}

fn build_instructions(prior_summary: &str, prior_facts: &[String], prior_part_summaries: &[String]) -> String {
    let mut s = String::from(
        "Summarize the conversation excerpt that follows. Respond with a single JSON \
         object `{\"summary\": string, \"facts\": string[]}` and nothing else. \
         Fold the existing summary and facts in rather than discarding them.\n\n",
    );
    s.push_str("Existing summary: ");
    s.push_str(if prior_summary.is_empty() { "(none yet)" } else { prior_summary });
    s.push('\n');
    s.push_str("Existing facts: ");
    s.push_str(&prior_facts.join("; "));
    s.push('\n');
    if !prior_part_summaries.is_empty() {
        s.push_str("Summaries of earlier parts of this same compaction: ");
        s.push_str(&prior_part_summaries.join(" "));
        s.push('\n');
    }
    s
}

fn render_transcript(messages: &[HistoryMessage]) -> String {
    messages
        .iter()
        .map(|m| format!("{:?}: {}", m.role, m.content))
        .collect::<Vec<_>>()
        .join("\n")
}

fn parse_summary_json(text: &str) -> Result<SummaryResult, MemoryError> {
    let trimmed = extract_json_object(text).unwrap_or(text);
    serde_json::from_str(trimmed).map_err(|e| MemoryError::SummaryModelJson(e.to_string()))
}

/// Summary models sometimes wrap the JSON in prose or a fenced code block;
/// pull out the first balanced `{...}` span.
fn extract_json_object(text: &str) -> Option<&str> {
    let start = text.find('{')?;
    let end = text.rfind('}')?;
    if end < start {
        return None;
    }
    Some(&text[start..=end])
}

#[cfg(test)]
#[path = "summary_model_tests.rs"]
mod tests;
