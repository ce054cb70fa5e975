// SPDX-License-Identifier: MIT

//! Fire-and-forget Memory Extraction (spec.md §4.4/§5): after a response
//! has already been published, optionally re-summarizes the session's most
//! recent messages in the background to keep `state.json` fresh without
//! making the caller wait on an extra model call.
//!
//! Deliberately not awaited by the Worker — spec.md §5 calls this path
//! "cancellation-unsafe and intentionally not awaited", since the daemon
//! may shut down mid-extraction. Failures never surface to the caller;
//! they are written to [`Config::memory_extraction_status_path`] for the
//! host to observe instead, mirroring how compaction failures are only
//! logged rather than propagated.

use crate::worker::WorkerDeps;
use agent_core::{Request, SessionId};
use agent_memory::create_session_context;

/// Spawns the background extraction task if the request and config both
/// allow it. Never blocks the caller.
pub fn maybe_spawn(deps: &WorkerDeps, session_id: SessionId, request: &Request) {
    if request.disable_memory_extraction || !deps.config.memory.extraction.enabled {
        return;
    }
    if request.is_scheduled_task && !deps.config.memory.extract_scheduled {
        return;
    }

    let summary_model = deps.summary_model.clone();
    let session_locks = deps.session_locks.clone();
    let clock = deps.clock.clone();
    let session_root = deps.config.session_root();
    let status_path = deps.config.memory_extraction_status_path();
    let max_messages = deps.config.memory.extraction.max_messages;

    tokio::spawn(async move {
        let result = run(&summary_model, &session_locks, &session_root, session_id, max_messages).await;
        if let Err(message) = result {
            tracing::warn!(session_id = %session_id, error = %message, "memory extraction failed");
            write_status(&status_path, session_id, &message, clock.epoch_ms());
        }
    });
}

async fn run(
    summary_model: &dyn agent_memory::SummaryModel,
    session_locks: &agent_memory::SessionLocks,
    session_root: &std::path::Path,
    session_id: SessionId,
    max_messages: usize,
) -> Result<(), String> {
    // Re-acquire the session lock rather than reuse the Worker's own guard:
    // by the time this task actually runs, the Worker that spawned it has
    // already returned and released its guard, and another run on the same
    // session may have started in the meantime.
    let _guard = session_locks.acquire(session_id.as_str());

    let (mut ctx, _) =
        create_session_context(session_root, Some(session_id)).map_err(|e| e.to_string())?;

    let recent: Vec<_> = ctx.history().iter().rev().take(max_messages).rev().cloned().collect();
    if recent.is_empty() {
        return Ok(());
    }

    let prior_summary = ctx.state().summary.clone();
    let prior_facts = ctx.state().facts.clone();

    let result = summary_model
        .summarize(&prior_summary, &prior_facts, &[], &recent)
        .await
        .map_err(|e| e.to_string())?;

    let last_seq = recent.iter().map(|m| m.seq).max().unwrap_or(ctx.state().last_summary_seq);
    if last_seq <= ctx.state().last_summary_seq {
        return Ok(());
    }

    ctx.update_state(|state| {
        if !result.summary.trim().is_empty() {
            state.summary = result.summary;
        }
        state.merge_facts(result.facts);
    });
    ctx.advance_summary_seq(last_seq);
    agent_memory::save_memory_state(&ctx).map_err(|e| e.to_string())
}

fn write_status(path: &std::path::Path, session_id: SessionId, error: &str, ts: u64) {
    let body = serde_json::json!({
        "sessionId": session_id.as_str(),
        "error": error,
        "ts": ts,
    });
    if let Ok(bytes) = serde_json::to_vec_pretty(&body) {
        let _ = agent_core::atomic_write(path, &bytes);
    }
}

#[cfg(test)]
#[path = "memory_extraction_tests.rs"]
mod tests;
