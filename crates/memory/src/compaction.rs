// SPDX-License-Identifier: MIT

//! Compaction Pipeline: summarizes the older portion of a session's history
//! when it would blow the context budget, folding the result into durable
//! state and rewriting history down to a recent window.

use crate::error::MemoryError;
use crate::session::{self, SessionContext};
use crate::summary_model::SummaryModel;
use agent_core::HistoryMessage;
use std::path::Path;

/// Token-estimation hook the pipeline needs, kept generic over
/// `agent-budget`'s concrete estimator to avoid a crate cycle (mirrors
/// `session::should_compact`'s threshold-only interface).
pub trait TokenEstimator: Send + Sync {
    fn estimate(&self, messages: &[HistoryMessage]) -> u64;
}

/// Split older messages into at most 3 parts once they exceed 40k estimated
/// tokens, splitting by message-count share (a proxy
/// for token share, since every part is re-estimated before being sent to
/// the summary model anyway).
const OLDER_TOKEN_SPLIT_THRESHOLD: u64 = 40_000;
const MAX_COMPACTION_PARTS: usize = 3;

/// Soft minimum kept in the recent window ("soft minimum of 6
/// messages where possible").
const RECENT_WINDOW_SOFT_MIN: usize = 6;

pub struct CompactionOutcome {
    pub compacted: bool,
    pub archive_path: Option<std::path::PathBuf>,
}

/// Run one compaction pass over `ctx`.
///
/// `adjusted_recent_tokens` bounds how many of the most recent messages are
/// kept verbatim; `group_dir` is where the pre-compaction history is
/// archived. On summarization failure the error is logged by the caller (via
/// the returned `Err`) and history is left untouched —
/// callers must not call `write_history` themselves in that case.
pub async fn compact(
    ctx: &mut SessionContext,
    estimator: &dyn TokenEstimator,
    summary_model: &dyn SummaryModel,
    adjusted_recent_tokens: u64,
    group_dir: &Path,
) -> Result<CompactionOutcome, MemoryError> {
    let history = ctx.history().to_vec();
    let archive_path = session::archive_conversation(&history, &ctx.state().summary, group_dir)?;

    let (older, recent) = split_recent_window(&history, estimator, adjusted_recent_tokens);

    if older.is_empty() {
        return Ok(CompactionOutcome { compacted: false, archive_path: Some(archive_path) });
    }

    let parts = split_into_parts(&older, estimator);

    let mut part_summaries: Vec<String> = Vec::new();
    let mut merged_facts: Vec<String> = Vec::new();
    let prior_summary = ctx.state().summary.clone();
    let prior_facts = ctx.state().facts.clone();

    for part in &parts {
        let result = summary_model
            .summarize(&prior_summary, &prior_facts, &part_summaries, part)
            .await?;
        part_summaries.push(result.summary);
        merged_facts.extend(result.facts);
    }

    let new_summary = part_summaries.join(" ");
    let last_compacted_seq = older.last().map(|m| m.seq).unwrap_or(0);

    ctx.update_state(|state| {
        state.summary = new_summary;
        state.merge_facts(merged_facts);
    });
    ctx.advance_summary_seq(last_compacted_seq);
    session::save_memory_state(ctx)?;

    session::write_history(ctx, recent)?;

    Ok(CompactionOutcome { compacted: true, archive_path: Some(archive_path) })
}

/// Split `history` into `(older, recent)` where `recent` fits within
/// `adjusted_recent_tokens`, honoring a soft minimum of
/// [`RECENT_WINDOW_SOFT_MIN`] messages where possible.
fn split_recent_window(
    history: &[HistoryMessage],
    estimator: &dyn TokenEstimator,
    adjusted_recent_tokens: u64,
) -> (Vec<HistoryMessage>, Vec<HistoryMessage>) {
    if history.len() <= RECENT_WINDOW_SOFT_MIN {
        return (Vec::new(), history.to_vec());
    }

    let mut split_at = history.len();
    for candidate in (0..=history.len()).rev() {
        let recent_slice = &history[candidate..];
        if recent_slice.len() < RECENT_WINDOW_SOFT_MIN {
            break;
        }
        if estimator.estimate(recent_slice) <= adjusted_recent_tokens {
            split_at = candidate;
        } else {
            break;
        }
    }

    let older = history[..split_at].to_vec();
    let recent = history[split_at..].to_vec();
    (older, recent)
}

/// `min(3, ceil(olderTokens / 40_000))` parts, split by message-count share.
fn split_into_parts(older: &[HistoryMessage], estimator: &dyn TokenEstimator) -> Vec<Vec<HistoryMessage>> {
    let older_tokens = estimator.estimate(older);
    if older_tokens <= OLDER_TOKEN_SPLIT_THRESHOLD {
        return vec![older.to_vec()];
    }

    let part_count =
        (older_tokens.div_ceil(OLDER_TOKEN_SPLIT_THRESHOLD) as usize).min(MAX_COMPACTION_PARTS).max(1);
    let chunk_size = older.len().div_ceil(part_count).max(1);
    older.chunks(chunk_size).map(<[HistoryMessage]>::to_vec).collect()
}

#[cfg(test)]
#[path = "compaction_tests.rs"]
mod tests;
