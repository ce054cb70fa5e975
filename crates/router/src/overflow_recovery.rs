// SPDX-License-Identifier: MIT

//! Emergency context-overflow recovery (spec.md §4.9): split the current
//! context into an older portion to compact and a recent portion to keep
//! verbatim, summarize the older portion, and rebuild instructions at the
//! deepest trim level so the retry has real headroom.
//!
//! This does not advance the model chain — the same context would fail on
//! any model — so the caller retries the same candidate once with the
//! rebuilt request.

use agent_budget::{build, MemorySection, SystemPromptInputs, MAX_TRIM_LEVEL};
use agent_core::{HistoryMessage, HistoryRole, Message, Role};
use agent_memory::{MemoryError, SummaryModel};

/// Soft minimum of messages kept verbatim in the retry, mirroring the
/// compaction pipeline's own recent-window floor.
pub const MIN_KEPT_MESSAGES: usize = 4;

pub struct RecoveryPlan {
    /// Rebuilt instructions string (trim level [`MAX_TRIM_LEVEL`]) with the
    /// new summary folded in.
    pub instructions: String,
    /// The most recent messages, kept verbatim for the retry.
    pub kept_messages: Vec<Message>,
}

/// Builds and executes one recovery plan: summarizes everything but the
/// last `MIN_KEPT_MESSAGES` (or fewer if the conversation is too short to
/// split), then rebuilds `identity`'s instructions at the deepest trim
/// level around that new summary.
///
/// Only `Role::User`/`Role::Assistant` turns participate in the split —
/// the system prompt is rebuilt separately, and any tool-call scaffolding
/// in `conversation` is dropped rather than summarized (it carries no
/// useful signal once the turn that produced it is gone).
pub async fn recover(
    summary_model: &dyn SummaryModel,
    identity: &str,
    prior_summary: &str,
    prior_facts: &[String],
    conversation: &[Message],
) -> Result<RecoveryPlan, MemoryError> {
    let turns: Vec<&Message> = conversation.iter().filter(|m| matches!(m.role, Role::User | Role::Assistant)).collect();

    let split_at = turns.len().saturating_sub(MIN_KEPT_MESSAGES);
    let to_compact = &turns[..split_at];
    let to_keep = &turns[split_at..];

    let history: Vec<HistoryMessage> = to_compact
        .iter()
        .enumerate()
        .map(|(i, m)| HistoryMessage {
            seq: i as u64,
            role: match m.role {
                Role::User => HistoryRole::User,
                _ => HistoryRole::Assistant,
            },
            content: m.content.clone(),
            timestamp: 0,
        })
        .collect();

    let new_summary = if history.is_empty() {
        prior_summary.to_string()
    } else {
        let result = summary_model.summarize(prior_summary, prior_facts, &[], &history).await?;
        result.summary
    };

    let inputs = SystemPromptInputs {
        identity: identity.to_string(),
        memory: Some(MemorySection { summary: new_summary, facts: prior_facts.to_vec(), ..Default::default() }),
        ..Default::default()
    };
    let instructions = build(&inputs, MAX_TRIM_LEVEL);

    Ok(RecoveryPlan { instructions, kept_messages: to_keep.iter().map(|m| (*m).clone()).collect() })
}

#[cfg(test)]
#[path = "overflow_recovery_tests.rs"]
mod tests;
