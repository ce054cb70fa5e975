// SPDX-License-Identifier: MIT

//! The tool-execution loop itself: rebuilds the full conversation on every
//! follow-up call (the upstream SDK's built-in loop sends only the last
//! function call/result pair, which starves reasoning models that produce
//! short tool-result turns), interleaving tool rounds with livelock
//! breakers, policy gating, idempotent retry, soft-trim, and forced
//! synthesis.

use crate::deterministic_fallback::DeterministicFallback;
use crate::executor::ToolRegistry;
use crate::loop_detector::{Breaker, LoopDetector, LoopDetectorConfig};
use crate::policy;
use crate::reply_tag::{strip_reply_tag, ReplyTarget};
use crate::retry::{backoff, is_transient, RetryConfig};
use crate::stream::StreamWriter;
use agent_budget::estimate_messages;
use agent_core::{
    CompletionRequest, CompletionResponse, LlmClient, LlmError, Message, Role, StreamChunk, TokenEstimateConfig,
    ToolCall, ToolCallRecord, ToolPolicy, ToolSchema,
};
use parking_lot::Mutex;
use std::collections::HashMap;
use std::time::Instant;

const CONTEXT_OVERFLOW_MARKERS: [&str; 3] =
    ["maximum context length", "context length exceeded", "too many tokens"];

/// Every tunable this loop needs, gathered in one place rather than passed
/// as a dozen loose arguments.
#[derive(Debug, Clone)]
pub struct ToolLoopConfig {
    pub max_tool_steps: u32,
    pub tool_policy: ToolPolicy,
    pub loop_detector: LoopDetectorConfig,
    pub retry: RetryConfig,
    pub context_length: u64,
    pub token_estimate: TokenEstimateConfig,
    pub tool_soft_trim_max_chars: usize,
    pub tool_soft_trim_head_chars: usize,
    pub tool_soft_trim_tail_chars: usize,
    pub force_synthesis_after_tools: bool,
    pub max_nudges: u32,
    pub output_limit_bytes: usize,
}

const OUTPUT_TRUNCATED_SUFFIX: &str = "\n[OUTPUT TRUNCATED]";

impl Default for ToolLoopConfig {
    fn default() -> Self {
        Self {
            max_tool_steps: 24,
            tool_policy: ToolPolicy::default(),
            loop_detector: LoopDetectorConfig::default(),
            retry: RetryConfig::default(),
            context_length: 128_000,
            token_estimate: TokenEstimateConfig::default(),
            tool_soft_trim_max_chars: 4_000,
            tool_soft_trim_head_chars: 800,
            tool_soft_trim_tail_chars: 400,
            force_synthesis_after_tools: true,
            max_nudges: 2,
            output_limit_bytes: 50_000,
        }
    }
}

/// What one run is asked to do.
pub struct ToolLoopInputs {
    pub model: String,
    pub instructions: String,
    pub conversation: Vec<Message>,
    pub tools: Vec<ToolSchema>,
    pub max_output_tokens: Option<u32>,
    pub temperature: Option<f32>,
    pub requires_tool_execution: bool,
    pub prompt: String,
}

/// Everything a run produced, ready to fold back into the response
/// envelope and session history.
#[derive(Debug, Clone)]
pub struct ToolLoopOutcome {
    pub text: String,
    pub reply_to: Option<ReplyTarget>,
    pub tool_calls: Vec<ToolCallRecord>,
    pub tool_retry_attempts: u32,
    pub breaker_triggered: bool,
    pub breaker_reason: Option<String>,
    pub conversation: Vec<Message>,
    pub prompt_tokens: u64,
    pub completion_tokens: u64,
}

/// Runs one full tool-execution loop against `llm`, dispatching tool calls
/// through `registry`. `fallback` is consulted only if the prompt was
/// classified as requiring tools and two nudges still produce nothing.
#[allow(clippy::too_many_arguments)]
pub async fn run(
    llm: &dyn LlmClient,
    registry: &ToolRegistry,
    fallback: &dyn DeterministicFallback,
    inputs: ToolLoopInputs,
    config: &ToolLoopConfig,
    stream: Option<&Mutex<StreamWriter>>,
) -> ToolLoopOutcome {
    let initial = call_model(
        llm,
        &inputs.model,
        &inputs.instructions,
        &inputs.conversation,
        &inputs.tools,
        inputs.max_output_tokens,
        inputs.temperature,
        stream,
    )
    .await;
    run_with_initial(llm, registry, fallback, inputs, config, stream, initial).await
}

/// Like [`run`], but takes the first turn's completion as already in hand.
///
/// The model router (`agent-router`) owns picking *which* model answers the
/// first turn — it walks the primary/fallback chain, skips cooled-down
/// candidates, and runs emergency context-overflow recovery before this
/// function ever sees a result. Everything after that first turn (tool
/// rounds, livelock breakers, forced synthesis) is purely this loop's
/// concern and does not re-consult the router.
#[allow(clippy::too_many_arguments)]
pub async fn run_with_initial(
    llm: &dyn LlmClient,
    registry: &ToolRegistry,
    fallback: &dyn DeterministicFallback,
    inputs: ToolLoopInputs,
    config: &ToolLoopConfig,
    stream: Option<&Mutex<StreamWriter>>,
    initial: Result<CompletionResponse, LlmError>,
) -> ToolLoopOutcome {
    let mut conversation = inputs.conversation;
    let mut detector = LoopDetector::new(config.loop_detector);
    let mut tool_call_records: Vec<ToolCallRecord> = Vec::new();
    let mut tool_retry_attempts: u32 = 0;
    let mut per_tool_counts: HashMap<String, u32> = HashMap::new();
    let mut breaker: Option<Breaker> = None;
    let mut step: u32 = 0;
    let mut prompt_tokens_total: u64 = 0;
    let mut completion_tokens_total: u64 = 0;
    let mut any_tool_executed = false;

    let mut response = match initial {
        Ok(response) => response,
        Err(err) => {
            if let Some(stream) = stream {
                let _ = stream.lock().finish_error(&err.message());
            }
            return ToolLoopOutcome {
                text: fallback_text_for_error(&err),
                reply_to: None,
                tool_calls: Vec::new(),
                tool_retry_attempts: 0,
                breaker_triggered: false,
                breaker_reason: None,
                conversation,
                prompt_tokens: 0,
                completion_tokens: 0,
            };
        }
    };
    prompt_tokens_total += response.usage.prompt_tokens;
    completion_tokens_total += response.usage.completion_tokens;

    let mut text = response.text.clone();
    let mut pending_calls = response.tool_calls.clone();

    // Mandatory-tool nudge: two attempts, then a hard-coded fallback.
    if inputs.requires_tool_execution && pending_calls.is_empty() && !any_tool_executed {
        let mut nudges_sent = 0;
        while pending_calls.is_empty() && nudges_sent < config.max_nudges {
            nudges_sent += 1;
            conversation.push(Message::assistant(text.clone()));
            conversation.push(Message::user(
                "This request requires calling a tool to produce a real answer. Please call the appropriate tool now.",
            ));
            match call_model(
                llm,
                &inputs.model,
                &inputs.instructions,
                &conversation,
                &inputs.tools,
                inputs.max_output_tokens,
                inputs.temperature,
                stream,
            )
            .await
            {
                Ok(next) => {
                    prompt_tokens_total += next.usage.prompt_tokens;
                    completion_tokens_total += next.usage.completion_tokens;
                    text = next.text.clone();
                    pending_calls = next.tool_calls.clone();
                    response = next;
                }
                Err(err) => {
                    return finish_with_error(&err, conversation, stream, prompt_tokens_total, completion_tokens_total);
                }
            }
        }

        if pending_calls.is_empty() {
            if let Some(steps) = fallback.try_fallback(&inputs.prompt).await {
                for (call, result) in steps {
                    any_tool_executed = true;
                    let (ok, output) = match result {
                        Ok(output) => (true, output),
                        Err(err) => (false, err.to_string()),
                    };
                    tool_call_records.push(ToolCallRecord {
                        name: call.name.clone(),
                        args: agent_core::redact_args(&call.arguments),
                        ok,
                        duration_ms: 0,
                        error: (!ok).then(|| output.clone()),
                        output_bytes: Some(output.len() as u64),
                        output_truncated: Some(false),
                    });
                    conversation.push(Message::tool_result(call.id.clone(), output));
                }
            }
        }
    }

    // Tool-round loop.
    while !pending_calls.is_empty() && step < config.max_tool_steps {
        step += 1;

        // Per-call signatures are checked before the round signature: a
        // round repeating the exact same single call (spec.md §8 scenario
        // 3) trips both trackers on the same round, and the more specific
        // `repeated_call_signature` reason must win over the generic
        // `repeated_round_signature` one. `observe_round` still runs every
        // round (it must, to keep the streak counter correct for rounds
        // where no individual call repeats often enough on its own) but its
        // result is only used as a breaker when no call-level breaker fired.
        conversation.push(Message {
            role: Role::Assistant,
            content: text.clone(),
            tool_call_id: None,
            tool_calls: Some(pending_calls.clone()),
            image_urls: Vec::new(),
        });

        for call in &pending_calls {
            if let Some(hit) = detector.observe_call(call) {
                breaker = Some(hit);
                break;
            }

            let calls_so_far = *per_tool_counts.get(&call.name).unwrap_or(&0);
            let (record, output, non_retryable_hit) =
                execute_one_call(registry, call, calls_so_far, config, &mut detector, &mut tool_retry_attempts).await;
            any_tool_executed = true;
            *per_tool_counts.entry(call.name.clone()).or_insert(0) += 1;
            let content = if record.ok {
                output
            } else {
                record.error.clone().unwrap_or_else(|| "(no output captured)".to_string())
            };
            conversation.push(Message::tool_result(call.id.clone(), content));
            tool_call_records.push(record);

            if let Some(hit) = non_retryable_hit {
                breaker = Some(hit);
                break;
            }
        }

        let round_hit = detector.observe_round(&pending_calls);
        if breaker.is_none() {
            breaker = round_hit;
        }

        if breaker.is_some() {
            break;
        }

        soft_trim_older_tool_results(&mut conversation, config);
        drop_initial_context_if_over_budget(&mut conversation, config, 0.45);

        match call_model(
            llm,
            &inputs.model,
            &inputs.instructions,
            &conversation,
            &inputs.tools,
            inputs.max_output_tokens,
            inputs.temperature,
            stream,
        )
        .await
        {
            Ok(next) => {
                prompt_tokens_total += next.usage.prompt_tokens;
                completion_tokens_total += next.usage.completion_tokens;
                text = next.text.clone();
                pending_calls = next.tool_calls.clone();
                response = next;
            }
            Err(err) if is_context_overflow(&err.message()) => {
                hard_clear_tool_results(&mut conversation);
                drop_initial_context_if_over_budget(&mut conversation, config, 0.45);
                match call_model(
                    llm,
                    &inputs.model,
                    &inputs.instructions,
                    &conversation,
                    &inputs.tools,
                    inputs.max_output_tokens,
                    inputs.temperature,
                    stream,
                )
                .await
                {
                    Ok(next) => {
                        prompt_tokens_total += next.usage.prompt_tokens;
                        completion_tokens_total += next.usage.completion_tokens;
                        text = next.text.clone();
                        pending_calls = next.tool_calls.clone();
                        response = next;
                    }
                    Err(err) => {
                        return finish_with_error(&err, conversation, stream, prompt_tokens_total, completion_tokens_total);
                    }
                }
            }
            Err(err) => {
                return finish_with_error(&err, conversation, stream, prompt_tokens_total, completion_tokens_total);
            }
        }
    }

    let _ = response;

    // Forced synthesis.
    if config.force_synthesis_after_tools
        && (breaker.is_some() || !pending_calls.is_empty() || text.trim().is_empty())
        && any_tool_executed
    {
        conversation.push(Message::user(
            "Using only the tool outputs already gathered, write the final answer now. Do not call any more tools.",
        ));
        if let Ok(next) = call_model(
            llm,
            &inputs.model,
            &inputs.instructions,
            &conversation,
            &[],
            inputs.max_output_tokens,
            inputs.temperature,
            stream,
        )
        .await
        {
            prompt_tokens_total += next.usage.prompt_tokens;
            completion_tokens_total += next.usage.completion_tokens;
            if !next.text.trim().is_empty() {
                text = next.text;
            }
        }
    }

    if text.trim().is_empty() {
        text = canned_fallback_text(breaker.as_ref(), &tool_call_records);
    }

    if let Some(stream) = stream {
        let _ = stream.lock().finish_done();
    }

    let (stripped_text, reply_to) = strip_reply_tag(&text);

    ToolLoopOutcome {
        text: stripped_text,
        reply_to,
        tool_calls: tool_call_records,
        tool_retry_attempts,
        breaker_triggered: breaker.is_some(),
        breaker_reason: breaker.as_ref().map(Breaker::reason),
        conversation,
        prompt_tokens: prompt_tokens_total,
        completion_tokens: completion_tokens_total,
    }
}

fn finish_with_error(
    err: &LlmError,
    conversation: Vec<Message>,
    stream: Option<&Mutex<StreamWriter>>,
    prompt_tokens: u64,
    completion_tokens: u64,
) -> ToolLoopOutcome {
    if let Some(stream) = stream {
        let _ = stream.lock().finish_error(&err.message());
    }
    ToolLoopOutcome {
        text: fallback_text_for_error(err),
        reply_to: None,
        tool_calls: Vec::new(),
        tool_retry_attempts: 0,
        breaker_triggered: false,
        breaker_reason: None,
        conversation,
        prompt_tokens,
        completion_tokens,
    }
}

fn fallback_text_for_error(err: &LlmError) -> String {
    format!("I couldn't complete this request: {}.", err.message())
}

#[allow(clippy::too_many_arguments)]
async fn call_model(
    llm: &dyn LlmClient,
    model: &str,
    instructions: &str,
    conversation: &[Message],
    tools: &[ToolSchema],
    max_output_tokens: Option<u32>,
    temperature: Option<f32>,
    stream: Option<&Mutex<StreamWriter>>,
) -> Result<CompletionResponse, LlmError> {
    let request = CompletionRequest {
        model: model.to_string(),
        instructions: instructions.to_string(),
        messages: conversation.to_vec(),
        tools: tools.to_vec(),
        max_output_tokens,
        temperature,
        extra: HashMap::new(),
    };
    let on_chunk = move |chunk: StreamChunk| {
        if let (Some(stream), StreamChunk::Text(text)) = (stream, &chunk) {
            let _ = stream.lock().write_chunk(text);
        }
    };
    llm.complete(request, Some(&on_chunk)).await
}

async fn execute_one_call(
    registry: &ToolRegistry,
    call: &ToolCall,
    calls_so_far: u32,
    config: &ToolLoopConfig,
    detector: &mut LoopDetector,
    tool_retry_attempts: &mut u32,
) -> (ToolCallRecord, String, Option<Breaker>) {
    let started = Instant::now();

    if let Err(violation) = policy::check(&config.tool_policy, &call.name, calls_so_far) {
        return (
            ToolCallRecord {
                name: call.name.clone(),
                args: agent_core::redact_args(&call.arguments),
                ok: false,
                duration_ms: started.elapsed().as_millis() as u64,
                error: Some(violation.to_string()),
                output_bytes: None,
                output_truncated: None,
            },
            String::new(),
            None,
        );
    }

    let arguments = normalize_arguments(&call.arguments);
    let idempotent = registry.is_idempotent(&call.name);
    let mut attempt: u32 = 0;

    loop {
        attempt += 1;
        match registry.execute(&call.name, arguments.clone()).await {
            Ok(output) => {
                let original_len = output.len() as u64;
                let (output, truncated) = truncate_tool_output(output, config.output_limit_bytes);
                return (
                    ToolCallRecord {
                        name: call.name.clone(),
                        args: agent_core::redact_args(&call.arguments),
                        ok: true,
                        duration_ms: started.elapsed().as_millis() as u64,
                        error: None,
                        output_bytes: Some(original_len),
                        output_truncated: Some(truncated),
                    },
                    output,
                    None,
                );
            }
            Err(err) => {
                let message = err.to_string();
                let retryable = idempotent && is_transient(&message) && attempt <= config.retry.idempotent_retry_attempts;
                if retryable {
                    *tool_retry_attempts += 1;
                    tokio::time::sleep(backoff(attempt, config.retry.idempotent_retry_backoff_ms)).await;
                    continue;
                }
                let breaker = (!is_transient(&message)).then(|| detector.observe_non_retryable_failure()).flatten();
                return (
                    ToolCallRecord {
                        name: call.name.clone(),
                        args: agent_core::redact_args(&call.arguments),
                        ok: false,
                        duration_ms: started.elapsed().as_millis() as u64,
                        error: Some(message),
                        output_bytes: None,
                        output_truncated: None,
                    },
                    String::new(),
                    breaker,
                );
            }
        }
    }
}

/// Tool-result bounds (spec.md §6): any output whose serialized form
/// exceeds `limit_bytes` is truncated to a UTF-8-safe byte boundary with a
/// trailing marker, and the caller is told so via the returned flag.
fn truncate_tool_output(output: String, limit_bytes: usize) -> (String, bool) {
    if output.len() <= limit_bytes {
        return (output, false);
    }
    let mut cut = limit_bytes;
    while cut > 0 && !output.is_char_boundary(cut) {
        cut -= 1;
    }
    let mut truncated = output[..cut].to_string();
    truncated.push_str(OUTPUT_TRUNCATED_SUFFIX);
    (truncated, true)
}

fn normalize_arguments(arguments: &serde_json::Value) -> serde_json::Value {
    if let serde_json::Value::String(raw) = arguments {
        if let Ok(parsed) = serde_json::from_str(raw) {
            return parsed;
        }
    }
    arguments.clone()
}

/// Replaces the body of any tool-result message older than the current
/// round whose content exceeds `tool_soft_trim_max_chars` with its head and
/// tail, separated by an ellipsis marker.
fn soft_trim_older_tool_results(conversation: &mut [Message], config: &ToolLoopConfig) {
    let last_index = conversation.len().saturating_sub(1);
    for (index, message) in conversation.iter_mut().enumerate() {
        if message.role != Role::Tool || index == last_index {
            continue;
        }
        if message.content.len() > config.tool_soft_trim_max_chars {
            let head: String = message.content.chars().take(config.tool_soft_trim_head_chars).collect();
            let tail: String = message
                .content
                .chars()
                .rev()
                .take(config.tool_soft_trim_tail_chars)
                .collect::<Vec<_>>()
                .into_iter()
                .rev()
                .collect();
            message.content = format!("{head}\n...\n{tail}");
        }
    }
}

/// Drops whole leading turns (never splitting an assistant tool-call
/// message from its tool-result messages) until the conversation's
/// estimated size — with the spec's 1.3x safety margin applied, per
/// spec.md §8's `tokens_estimate(final_prompt) * 1.3 <= ...` invariant — is
/// back under `ratio * context_length`, or only two messages remain.
fn drop_initial_context_if_over_budget(conversation: &mut Vec<Message>, config: &ToolLoopConfig, ratio: f64) {
    let limit = (config.context_length as f64 * ratio) as u64;
    while conversation.len() > 2
        && agent_budget::apply_safety_margin(estimate_messages(conversation, &config.token_estimate)) > limit
    {
        let drop_count = leading_turn_len(conversation);
        if drop_count == 0 || conversation.len() <= drop_count {
            break;
        }
        conversation.drain(0..drop_count);
    }
}

/// Length of the first "turn" in `conversation`: one message, or — if it is
/// an assistant message carrying `tool_calls` — that message plus every
/// immediately following `Role::Tool` result.
fn leading_turn_len(conversation: &[Message]) -> usize {
    let Some(first) = conversation.first() else { return 0 };
    if first.role != Role::Assistant || first.tool_calls.is_none() {
        return 1;
    }
    let mut len = 1;
    while conversation.get(len).is_some_and(|m| m.role == Role::Tool) {
        len += 1;
    }
    len
}

fn hard_clear_tool_results(conversation: &mut [Message]) {
    let last_index = conversation.len().saturating_sub(1);
    for (index, message) in conversation.iter_mut().enumerate() {
        if message.role == Role::Tool && index != last_index {
            message.content = "[Old tool result cleared to reduce context size.]".to_string();
        }
    }
}

fn is_context_overflow(message: &str) -> bool {
    let lower = message.to_ascii_lowercase();
    CONTEXT_OVERFLOW_MARKERS.iter().any(|marker| lower.contains(marker))
}

fn canned_fallback_text(breaker: Option<&Breaker>, tool_calls: &[ToolCallRecord]) -> String {
    let reason = breaker.map(Breaker::reason).unwrap_or_else(|| "no usable model output".to_string());
    let executed: Vec<&str> = tool_calls.iter().map(|record| record.name.as_str()).collect();
    if executed.is_empty() {
        format!("I wasn't able to produce a final answer ({reason}).")
    } else {
        format!("I wasn't able to produce a final answer ({reason}). Tools run: {}.", executed.join(", "))
    }
}

#[cfg(test)]
#[path = "run_loop_tests.rs"]
mod tests;
