// SPDX-License-Identifier: MIT

//! The Worker (spec.md §4.1/§4.3/§4.9): the per-request pipeline that turns
//! one spooled [`Request`] into a published [`Response`], composing every
//! other crate in the workspace — budgeting, memory, the model router, and
//! the tool-execution loop — exactly in the order spec.md §2's data-flow
//! diagram lays out.
//!
//! At most one Worker runs at a time (spec.md §5 "Shared-resource
//! policy"), so [`agent_router::CooldownTable`] and the process-wide
//! [`SessionLocks`] registry need no finer-grained locking than a plain
//! mutex; the registry exists only to keep this Worker's run on a session
//! from racing the fire-and-forget memory-extraction task
//! ([`crate::memory_extraction`]) that may still be touching the same
//! session's state file.

use crate::config::Config;
use crate::error::DaemonError;
use agent_budget::{
    build_within_budget, drop_oldest_until_fits, estimate_messages, estimate_text, resolved_adjusted_tokens,
    select_recent_window, soft_clamp_messages, Budgets, BudgetInputs, MemorySection, SystemPromptInputs,
};
use agent_core::{
    Attachment, AttachmentKind, Clock, CompletionRequest, HistoryMessage, HistoryRole, LlmClient, Message,
    Request, Response, TokenEstimateConfig,
};
use agent_memory::{
    append_history, compact, create_session_context, should_compact, SessionContext, SessionLocks, SummaryModel,
    TokenEstimator,
};
use agent_router::{dispatch, recover, resolve_chain, CooldownTable, DispatchResult};
use agent_toolloop::{
    classify, disables_tools, output_token_cap, run_with_initial, DeterministicFallback, LoopDetectorConfig,
    ReplyTarget, RetryConfig, StreamWriter, ToolLoopConfig, ToolLoopInputs, ToolRegistry,
};
use agent_core::ToolSchema;
use parking_lot::Mutex;
use std::path::PathBuf;
use std::sync::Arc;

const IDENTITY: &str =
    "You are an autonomous agent running inside a sandboxed container, acting on one user's behalf. \
     Use the available tools to take real actions rather than guessing at their results; reply directly \
     when no tool is needed.";

const MAX_IMAGE_BYTES: u64 = 5 * 1024 * 1024;
const MAX_TOTAL_ATTACHMENT_BYTES: u64 = 20 * 1024 * 1024;

/// Everything a Worker needs to process requests, assembled once at
/// startup and shared (read-only, or internally synchronized) across every
/// run.
pub struct WorkerDeps {
    pub llm: Arc<dyn LlmClient>,
    pub clock: Arc<dyn Clock>,
    pub cooldowns: Arc<CooldownTable>,
    pub registry: Arc<ToolRegistry>,
    pub fallback: Arc<dyn DeterministicFallback>,
    pub summary_model: Arc<dyn SummaryModel>,
    pub session_locks: Arc<SessionLocks>,
    pub config: Arc<Config>,
    pub tool_schemas: Vec<ToolSchema>,
}

struct HistoryTokenEstimator(TokenEstimateConfig);

impl TokenEstimator for HistoryTokenEstimator {
    fn estimate(&self, messages: &[HistoryMessage]) -> u64 {
        estimate_messages(&history_to_messages(messages), &self.0)
    }
}

fn history_to_messages(history: &[HistoryMessage]) -> Vec<Message> {
    history
        .iter()
        .map(|m| match m.role {
            HistoryRole::User => Message::user(m.content.clone()),
            HistoryRole::Assistant => Message::assistant(m.content.clone()),
        })
        .collect()
}

/// Process one request end to end, always returning a [`Response`]
/// (internal failures become `Response::error(..)` rather than propagating,
/// so one bad request never takes the daemon down).
pub async fn process_request(deps: &WorkerDeps, request: Request) -> Response {
    let start = deps.clock.now();
    let _session_guard = request.session_id.as_ref().map(|id| deps.session_locks.acquire(id.as_str()));

    let mut response = match run_pipeline(deps, &request).await {
        Ok(response) => response,
        Err(err) => {
            tracing::warn!(request_id = %request.id, error = %err, "request failed");
            Response::error(err.to_string())
        }
    };
    response.latency_ms = deps.clock.now().saturating_duration_since(start).as_millis() as u64;
    response
}

async fn run_pipeline(deps: &WorkerDeps, request: &Request) -> Result<Response, DaemonError> {
    let token_estimate = request.token_estimate;
    let (mut ctx, is_new) = create_session_context(&deps.config.session_root(), request.session_id)?;

    let budgets = Budgets::derive(BudgetInputs {
        context_length: Some(request.model_capabilities.context_length),
        explicit_max_output_tokens: request.model_max_output_tokens,
        is_scheduled_task: request.is_scheduled_task,
        configured_recent_context_tokens: Some(deps.config.recent_context_tokens),
    });

    maybe_compact(deps, &mut ctx, &budgets, &token_estimate).await;

    let prompt_inputs = build_prompt_inputs(request, &ctx);
    let (instructions, _trim_level) =
        build_within_budget(&prompt_inputs, budgets.system_prompt_budget_tokens, &token_estimate);

    let history_messages = history_to_messages(ctx.history());
    let instructions_tokens = estimate_text(&instructions, &token_estimate);
    let remaining_context =
        budgets.context_length.saturating_sub(instructions_tokens).saturating_sub(budgets.output_reserve);
    let resolved_adjusted = resolved_adjusted_tokens(budgets.recent_context_tokens, remaining_context, 1.0);

    let mut conversation = select_recent_window(&history_messages, resolved_adjusted, &token_estimate);
    soft_clamp_messages(&mut conversation, budgets.max_context_message_tokens, token_estimate.tokens_per_char);

    let mut user_message = Message::user(request.prompt.clone());
    attach_images(&mut user_message, &request.attachments);
    conversation.push(user_message);

    drop_oldest_until_fits(&instructions, &mut conversation, budgets.context_length, &token_estimate);

    append_history(&mut ctx, HistoryRole::User, request.prompt.clone())?;

    let tools_disabled = request.disable_tools || disables_tools(&request.prompt);
    let requires_tool_execution = !tools_disabled && classify(&request.prompt).is_some();
    let tools = if tools_disabled { Vec::new() } else { deps.tool_schemas.clone() };

    let capped = output_token_cap(&request.prompt, request.model_max_output_tokens);
    let max_output_tokens = if capped == u32::MAX { None } else { Some(capped) };
    let temperature = request.model_temperature.or(deps.config.temperature);

    let chain = resolve_chain(request.model_override.as_deref().unwrap_or(&deps.config.default_model), &request.model_fallbacks);
    let first_model = chain.first().cloned().unwrap_or_else(|| deps.config.default_model.clone());

    let completion_request = CompletionRequest {
        model: first_model,
        instructions,
        messages: conversation,
        tools: tools.clone(),
        max_output_tokens,
        temperature,
        extra: Default::default(),
    };

    let (model, initial, instructions, conversation) =
        dispatch_with_recovery(deps, &chain, completion_request, &ctx).await?;

    let stream_writer = request.stream_dir.as_ref().map(|dir| Mutex::new(StreamWriter::new(PathBuf::from(dir))));

    let tool_loop_config = ToolLoopConfig {
        max_tool_steps: request.max_tool_steps,
        tool_policy: request.tool_policy.clone(),
        loop_detector: LoopDetectorConfig {
            repeated_round_threshold: deps.config.repeated_round_threshold,
            repeated_signature_threshold: deps.config.repeated_signature_threshold,
            non_retryable_failure_threshold: deps.config.non_retryable_failure_threshold,
        },
        retry: RetryConfig {
            idempotent_retry_attempts: deps.config.idempotent_retry_attempts,
            idempotent_retry_backoff_ms: deps.config.idempotent_retry_backoff_ms,
        },
        context_length: budgets.context_length,
        token_estimate,
        tool_soft_trim_max_chars: deps.config.context.context_pruning.soft_trim_max_chars,
        tool_soft_trim_head_chars: deps.config.context.context_pruning.soft_trim_head_chars,
        tool_soft_trim_tail_chars: deps.config.context.context_pruning.soft_trim_tail_chars,
        force_synthesis_after_tools: deps.config.force_synthesis_after_tools,
        output_limit_bytes: deps.config.output_limit_bytes,
        ..ToolLoopConfig::default()
    };

    let inputs = ToolLoopInputs {
        model: model.clone(),
        instructions,
        conversation,
        tools,
        max_output_tokens,
        temperature,
        requires_tool_execution,
        prompt: request.prompt.clone(),
    };

    let outcome = run_with_initial(
        deps.llm.as_ref(),
        deps.registry.as_ref(),
        deps.fallback.as_ref(),
        inputs,
        &tool_loop_config,
        stream_writer.as_ref(),
        Ok(initial),
    )
    .await;

    append_history(&mut ctx, HistoryRole::Assistant, outcome.text.clone())?;

    crate::memory_extraction::maybe_spawn(deps, ctx.id, request);

    let response = Response {
        status: agent_core::ResponseStatus::Success,
        result: Some(outcome.text),
        error: None,
        new_session_id: is_new.then_some(ctx.id),
        model: Some(model),
        memory_summary: Some(ctx.state().summary.clone()),
        memory_facts: ctx.state().facts.clone(),
        tokens_prompt: outcome.prompt_tokens,
        tokens_completion: outcome.completion_tokens,
        tool_calls: (!outcome.tool_calls.is_empty()).then_some(outcome.tool_calls),
        tool_retry_attempts: (outcome.tool_retry_attempts > 0).then_some(outcome.tool_retry_attempts),
        tool_loop_breaker_triggered: outcome.breaker_triggered,
        tool_loop_breaker_reason: outcome.breaker_reason,
        latency_ms: 0,
        reply_to_id: outcome.reply_to.map(reply_target_to_id),
        timings: Default::default(),
        prompt_pack_versions: None,
    };

    Ok(response)
}

fn reply_target_to_id(target: ReplyTarget) -> String {
    match target {
        ReplyTarget::Current => "current".to_string(),
        ReplyTarget::Id(id) => id,
    }
}

#[allow(clippy::type_complexity)]
async fn dispatch_with_recovery(
    deps: &WorkerDeps,
    chain: &[String],
    request: CompletionRequest,
    ctx: &SessionContext,
) -> Result<(String, agent_core::CompletionResponse, String, Vec<Message>), DaemonError> {
    let identity = request.instructions.clone();
    let messages = request.messages.clone();

    let outcome = dispatch(deps.llm.as_ref(), deps.clock.as_ref(), deps.cooldowns.as_ref(), chain, request).await;

    match outcome.result {
        DispatchResult::Success { model, response } => Ok((model, response, identity, messages)),
        DispatchResult::ContextOverflow { model, .. } => {
            let plan = recover(deps.summary_model.as_ref(), &identity, &ctx.state().summary, &ctx.state().facts, &messages)
                .await?;
            let retry_request = CompletionRequest {
                model: model.clone(),
                instructions: plan.instructions.clone(),
                messages: plan.kept_messages.clone(),
                tools: Vec::new(),
                max_output_tokens: None,
                temperature: None,
                extra: Default::default(),
            };
            let response = deps.llm.complete(retry_request, None).await?;
            deps.cooldowns.clear(&model);
            Ok((model, response, plan.instructions, plan.kept_messages))
        }
        DispatchResult::Exhausted { error } => Err(DaemonError::Llm(error)),
    }
}

async fn maybe_compact(deps: &WorkerDeps, ctx: &mut SessionContext, budgets: &Budgets, token_estimate: &TokenEstimateConfig) {
    let estimator = HistoryTokenEstimator(*token_estimate);
    let total = estimator.estimate(ctx.history());
    if !should_compact(total, budgets.compaction_trigger_tokens) {
        return;
    }

    let group_dir = deps.config.session_root().join(ctx.id.as_str());
    match compact(ctx, &estimator, deps.summary_model.as_ref(), budgets.recent_context_tokens, &group_dir).await {
        Ok(outcome) => {
            if outcome.compacted {
                tracing::info!(session_id = %ctx.id, "compacted session history");
                if deps.config.memory.archive_sync {
                    publish_archive_items(deps, ctx);
                }
            }
        }
        Err(err) => {
            tracing::warn!(session_id = %ctx.id, error = %err, "compaction failed; continuing without it");
        }
    }
}

/// Optionally publishes the new summary/facts as archive items for an
/// external long-term memory sink to pick up. The runtime has no built-in
/// vector search or embeddings (spec.md Non-goals) — this only drops a
/// JSON-lines record for a host-side indexer, mirroring how
/// `memory_extraction`'s own failures are reported on a side channel
/// rather than inline in the response.
fn publish_archive_items(deps: &WorkerDeps, ctx: &SessionContext) {
    let dir = deps.config.archive_sink_dir();
    let item = serde_json::json!({
        "sessionId": ctx.id.as_str(),
        "scope": "group",
        "type": "summary",
        "summary": ctx.state().summary,
        "facts": ctx.state().facts,
        "ts": deps.clock.epoch_ms(),
    });
    let Ok(line) = serde_json::to_string(&item) else { return };
    let path = dir.join(format!("{}.jsonl", ctx.id.as_str()));
    if let Err(err) = agent_core::append_line(&path, &line) {
        tracing::warn!(error = %err, "failed to append archive sink record");
    }
}

fn build_prompt_inputs(request: &Request, ctx: &SessionContext) -> SystemPromptInputs {
    let memory = MemorySection {
        summary: ctx.state().summary.clone(),
        facts: ctx.state().facts.clone(),
        user_profile: request.user_profile.clone(),
        recall_pointer: (!request.memory_recall.is_empty()).then(|| request.memory_recall.join(", ")),
        stats: None,
    };

    SystemPromptInputs {
        identity: IDENTITY.to_string(),
        platform_note: request.host_platform.clone().map(|p| format!("Host platform: {p}.")),
        scheduled_task_note: request.is_scheduled_task.then(|| {
            "This turn is a scheduled task invocation with no human waiting on the reply; \
             do not ask clarifying questions, take your best reasonable action instead."
                .to_string()
        }),
        timezone_note: request.timezone.clone().map(|tz| format!("The user's timezone is {tz}.")),
        tool_step_budget_reminder: Some(format!(
            "You have at most {} tool-call steps this turn; use them efficiently.",
            request.max_tool_steps
        )),
        memory: Some(memory),
        ..Default::default()
    }
}

fn attach_images(message: &mut Message, attachments: &[Attachment]) {
    let mut total_bytes = 0u64;
    for attachment in attachments {
        if attachment.kind != AttachmentKind::Image {
            continue;
        }
        let size = attachment.bytes.unwrap_or(0);
        if size > MAX_IMAGE_BYTES {
            tracing::warn!(bytes = size, "dropping image attachment exceeding per-image size cap");
            continue;
        }
        if total_bytes + size > MAX_TOTAL_ATTACHMENT_BYTES {
            tracing::warn!("dropping remaining image attachments: total attachment size cap exceeded");
            break;
        }
        total_bytes += size;
        message.image_urls.push(attachment.url.clone());
    }
}

#[cfg(test)]
#[path = "worker_tests.rs"]
mod tests;
