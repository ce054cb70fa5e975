use super::*;
use crate::deterministic_fallback::{NoDeterministicFallback, PatternFallback};
use crate::executor::{ExecutorError, Idempotency, ToolExecutor, ToolRegistry};
use agent_core::test_support::FakeCompletion;
use agent_core::{FinishReason, TokenUsage};
use async_trait::async_trait;
use serde_json::{json, Value};
use std::sync::Arc;

fn text_response(text: &str) -> FakeCompletion {
    FakeCompletion::Ok(CompletionResponse {
        text: text.to_string(),
        tool_calls: Vec::new(),
        finish_reason: FinishReason::Stop,
        usage: TokenUsage { prompt_tokens: 10, completion_tokens: 2 },
    })
}

fn tool_call_response(calls: Vec<ToolCall>) -> FakeCompletion {
    FakeCompletion::Ok(CompletionResponse {
        text: String::new(),
        tool_calls: calls,
        finish_reason: FinishReason::ToolCalls,
        usage: TokenUsage { prompt_tokens: 10, completion_tokens: 2 },
    })
}

fn call(name: &str, args: Value) -> ToolCall {
    ToolCall { id: format!("call-{name}"), name: name.to_string(), arguments: args }
}

fn inputs(prompt: &str, requires_tools: bool) -> ToolLoopInputs {
    ToolLoopInputs {
        model: "M1".to_string(),
        instructions: "be helpful".to_string(),
        conversation: vec![Message::user(prompt)],
        tools: Vec::new(),
        max_output_tokens: None,
        temperature: None,
        requires_tool_execution: requires_tools,
        prompt: prompt.to_string(),
    }
}

struct EchoTool;

#[async_trait]
impl ToolExecutor for EchoTool {
    async fn execute(&self, arguments: Value) -> Result<String, ExecutorError> {
        Ok(arguments.to_string())
    }
}

fn echo_registry() -> ToolRegistry {
    let mut registry = ToolRegistry::new();
    registry.register("Glob", Arc::new(EchoTool), Idempotency::Idempotent);
    registry.register("Write", Arc::new(EchoTool), Idempotency::NotIdempotent);
    registry.register("Read", Arc::new(EchoTool), Idempotency::Idempotent);
    registry
}

#[tokio::test]
async fn simple_echo_returns_model_text_with_no_tool_calls() {
    let llm = agent_core::test_support::FakeLlmClient::new(vec![text_response("OK")]);
    let registry = ToolRegistry::new();
    let fallback = NoDeterministicFallback;
    let outcome = run(&llm, &registry, &fallback, inputs("Say OK.", false), &ToolLoopConfig::default(), None).await;

    assert_eq!(outcome.text, "OK");
    assert!(outcome.tool_calls.is_empty());
    assert!(!outcome.breaker_triggered);
    assert_eq!(outcome.prompt_tokens, 10);
    assert_eq!(outcome.completion_tokens, 2);
}

#[tokio::test]
async fn tool_call_round_trips_through_the_registry() {
    let llm = agent_core::test_support::FakeLlmClient::new(vec![
        tool_call_response(vec![call("Glob", json!({"pattern": "*.log"}))]),
        text_response("found 2 files"),
    ]);
    let registry = echo_registry();
    let fallback = NoDeterministicFallback;
    let outcome = run(&llm, &registry, &fallback, inputs("list log files", false), &ToolLoopConfig::default(), None).await;

    assert_eq!(outcome.text, "found 2 files");
    assert_eq!(outcome.tool_calls.len(), 1);
    assert_eq!(outcome.tool_calls[0].name, "Glob");
    assert!(outcome.tool_calls[0].ok);
}

#[tokio::test]
async fn successful_tool_output_is_threaded_into_the_follow_up_conversation() {
    let llm = agent_core::test_support::FakeLlmClient::new(vec![
        tool_call_response(vec![call("Glob", json!({"pattern": "*.log"}))]),
        text_response("found 2 files"),
    ]);
    let registry = echo_registry();
    let fallback = NoDeterministicFallback;
    let _ = run(&llm, &registry, &fallback, inputs("list log files", false), &ToolLoopConfig::default(), None).await;

    let follow_up = &llm.received()[1];
    let tool_result = follow_up.messages.iter().find(|m| m.role == Role::Tool).expect("tool result message present");
    assert_eq!(tool_result.content, json!({"pattern": "*.log"}).to_string());
}

#[tokio::test]
async fn mandatory_tool_prompt_falls_back_to_deterministic_pattern_after_two_nudges() {
    let llm = agent_core::test_support::FakeLlmClient::new(vec![
        text_response("Sure, here's some info."),
        text_response("I can help with that."),
        text_response("Let me think about it."),
    ]);
    let registry = echo_registry();
    let fallback = PatternFallback::new(&registry);
    let prompt = "Create /workspace/group/foo.txt with 3 lines: A B C, then read it back.";
    let outcome = run(&llm, &registry, &fallback, inputs(prompt, true), &ToolLoopConfig::default(), None).await;

    let names: Vec<&str> = outcome.tool_calls.iter().map(|r| r.name.as_str()).collect();
    assert_eq!(names, vec!["Write", "Read"]);
    assert!(outcome.tool_calls.iter().all(|r| r.ok));
    assert_eq!(llm.call_count(), 3);
}

/// Three rounds of `[Glob(same args), Write(different path each round)]`:
/// the round signature changes every time (the `Write` arg differs) so the
/// round-streak breaker never fires, but `Glob`'s own call signature repeats
/// three times and trips the per-call breaker on the third round.
fn three_rounds_of_glob_plus_varying_write() -> Vec<FakeCompletion> {
    let glob = call("Glob", json!({"pattern": "**/*.log"}));
    vec![
        tool_call_response(vec![glob.clone(), call("Write", json!({"path": "/tmp/x1"}))]),
        tool_call_response(vec![glob.clone(), call("Write", json!({"path": "/tmp/x2"}))]),
        tool_call_response(vec![glob.clone(), call("Write", json!({"path": "/tmp/x3"}))]),
        text_response("Here is what I found despite the repetition."),
    ]
}

/// spec.md §8 scenario 3, literally: the same single `Glob` call with
/// identical arguments, nothing else, repeated for 3 consecutive rounds.
/// Here the round signature and the call signature reach their thresholds
/// on the same round, and the call-level reason must win.
#[tokio::test]
async fn single_repeated_call_prefers_call_signature_breaker_over_round_signature() {
    let glob = call("Glob", json!({"pattern": "**/*.log"}));
    let llm = agent_core::test_support::FakeLlmClient::new(vec![
        tool_call_response(vec![glob.clone()]),
        tool_call_response(vec![glob.clone()]),
        tool_call_response(vec![glob.clone()]),
        text_response("Here is what I found despite the repetition."),
    ]);
    let registry = echo_registry();
    let fallback = NoDeterministicFallback;
    let outcome = run(&llm, &registry, &fallback, inputs("keep globbing", false), &ToolLoopConfig::default(), None).await;

    assert!(outcome.breaker_triggered);
    assert_eq!(outcome.breaker_reason.as_deref(), Some("repeated_call_signature(3): Glob"));
    assert!(!outcome.text.trim().is_empty());
}

#[tokio::test]
async fn repeated_call_signature_trips_the_breaker_and_forces_synthesis() {
    let llm = agent_core::test_support::FakeLlmClient::new(three_rounds_of_glob_plus_varying_write());
    let registry = echo_registry();
    let fallback = NoDeterministicFallback;
    let outcome = run(&llm, &registry, &fallback, inputs("keep globbing", false), &ToolLoopConfig::default(), None).await;

    assert!(outcome.breaker_triggered);
    assert!(outcome.breaker_reason.unwrap().starts_with("repeated_call_signature(3): Glob"));
    assert!(!outcome.text.trim().is_empty());
}

#[tokio::test]
async fn breaker_without_synthesis_success_still_returns_canned_fallback_text() {
    let mut responses = three_rounds_of_glob_plus_varying_write();
    *responses.last_mut().unwrap() = text_response("");
    let llm = agent_core::test_support::FakeLlmClient::new(responses);
    let registry = echo_registry();
    let fallback = NoDeterministicFallback;
    let outcome = run(&llm, &registry, &fallback, inputs("keep globbing", false), &ToolLoopConfig::default(), None).await;

    assert!(outcome.breaker_triggered);
    assert!(!outcome.text.trim().is_empty());
    assert!(outcome.text.contains("Glob"));
}

struct BigTool;

#[async_trait]
impl ToolExecutor for BigTool {
    async fn execute(&self, _arguments: Value) -> Result<String, ExecutorError> {
        Ok("x".repeat(200))
    }
}

#[tokio::test]
async fn oversized_tool_output_is_truncated_and_flagged() {
    let llm = agent_core::test_support::FakeLlmClient::new(vec![
        tool_call_response(vec![call("Glob", json!({}))]),
        text_response("done"),
    ]);
    let mut registry = ToolRegistry::new();
    registry.register("Glob", Arc::new(BigTool), Idempotency::Idempotent);
    let fallback = NoDeterministicFallback;
    let mut config = ToolLoopConfig::default();
    config.output_limit_bytes = 50;

    let outcome = run(&llm, &registry, &fallback, inputs("list things", false), &config, None).await;

    assert!(outcome.tool_calls[0].ok);
    assert_eq!(outcome.tool_calls[0].output_truncated, Some(true));
    assert_eq!(outcome.tool_calls[0].output_bytes, Some(200));

    let follow_up = &llm.received()[1];
    let tool_result = follow_up.messages.iter().find(|m| m.role == Role::Tool).expect("tool result message present");
    assert!(tool_result.content.ends_with("[OUTPUT TRUNCATED]"));
    assert!(tool_result.content.len() < 200);
}

#[tokio::test]
async fn reply_tag_is_stripped_from_final_text() {
    let llm = agent_core::test_support::FakeLlmClient::new(vec![text_response("All set. [[reply_to_current]]")]);
    let registry = ToolRegistry::new();
    let fallback = NoDeterministicFallback;
    let outcome = run(&llm, &registry, &fallback, inputs("do it", false), &ToolLoopConfig::default(), None).await;

    assert_eq!(outcome.text, "All set.");
    assert_eq!(outcome.reply_to, Some(ReplyTarget::Current));
}

#[tokio::test]
async fn denied_tool_is_rejected_without_invoking_the_executor() {
    let llm = agent_core::test_support::FakeLlmClient::new(vec![
        tool_call_response(vec![call("Write", json!({"path": "/etc/passwd"}))]),
        text_response("Can't do that."),
    ]);
    let registry = echo_registry();
    let fallback = NoDeterministicFallback;
    let mut config = ToolLoopConfig::default();
    config.tool_policy.deny = vec!["Write".to_string()];

    let outcome = run(&llm, &registry, &fallback, inputs("write a file", false), &config, None).await;

    assert_eq!(outcome.tool_calls.len(), 1);
    assert!(!outcome.tool_calls[0].ok);
    assert!(outcome.tool_calls[0].error.as_deref().unwrap_or_default().contains("denied"));
}

#[tokio::test]
async fn llm_error_on_initial_call_produces_fallback_text_without_panicking() {
    let llm = agent_core::test_support::FakeLlmClient::new(vec![FakeCompletion::Err(LlmError::Provider(
        "maximum context length exceeded".to_string(),
    ))]);
    let registry = ToolRegistry::new();
    let fallback = NoDeterministicFallback;
    let outcome = run(&llm, &registry, &fallback, inputs("hello", false), &ToolLoopConfig::default(), None).await;

    assert!(!outcome.text.is_empty());
    assert!(outcome.tool_calls.is_empty());
}
