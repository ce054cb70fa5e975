// SPDX-License-Identifier: MIT

//! Session Memory Store: append-only per-session history plus a durable
//! state snapshot, grounded on the atomic write idiom in
//! `agent_core::fsutil` (itself carried over from
//! `alfredjeanlab-oddjobs::engine::breadcrumb`).

use crate::error::MemoryError;
use agent_core::{HistoryMessage, HistoryRole, SessionId, SessionState};
use chrono::Utc;
use parking_lot::Mutex;
use std::collections::HashMap;
use std::path::{Path, PathBuf};
use std::sync::Arc;

fn io_err(path: &Path, source: std::io::Error) -> MemoryError {
    MemoryError::Io { path: path.display().to_string(), source }
}

/// A session's on-disk home: `<root>/<sessionId>/{history.jsonl,state.json}`.
pub struct SessionContext {
    pub id: SessionId,
    dir: PathBuf,
    history: Vec<HistoryMessage>,
    state: SessionState,
}

impl SessionContext {
    fn history_path(&self) -> PathBuf {
        self.dir.join("history.jsonl")
    }

    fn state_path(&self) -> PathBuf {
        self.dir.join("state.json")
    }

    pub fn state(&self) -> &SessionState {
        &self.state
    }

    pub fn history(&self) -> &[HistoryMessage] {
        &self.history
    }
}

/// `createSessionContext(root, sessionId?)`: returns the context plus whether
/// it is a brand-new session (no id supplied by the caller).
pub fn create_session_context(
    root: &Path,
    session_id: Option<SessionId>,
) -> Result<(SessionContext, bool), MemoryError> {
    let is_new = session_id.is_none();
    let id = session_id.unwrap_or_else(SessionId::new);
    let dir = root.join(id.as_str());

    let history_path = dir.join("history.jsonl");
    let state_path = dir.join("state.json");

    let history = if history_path.exists() { read_history(&history_path)? } else { Vec::new() };
    let state = if state_path.exists() { read_state(&state_path)? } else { SessionState::default() };

    Ok((SessionContext { id, dir, history, state }, is_new))
}

fn read_history(path: &Path) -> Result<Vec<HistoryMessage>, MemoryError> {
    let content = std::fs::read_to_string(path).map_err(|e| io_err(path, e))?;
    let mut out = Vec::new();
    for line in content.lines() {
        if line.trim().is_empty() {
            continue;
        }
        let msg: HistoryMessage = serde_json::from_str(line).map_err(|e| MemoryError::HistoryCorrupt {
            path: path.display().to_string(),
            source: e,
        })?;
        out.push(msg);
    }
    Ok(out)
}

fn read_state(path: &Path) -> Result<SessionState, MemoryError> {
    let content = std::fs::read_to_string(path).map_err(|e| io_err(path, e))?;
    serde_json::from_str(&content)
        .map_err(|e| MemoryError::StateCorrupt { path: path.display().to_string(), source: e })
}

/// `appendHistory(ctx, role, content)`: assigns `seq = maxSeq + 1`, appends
/// in memory, and writes the single new line to disk.
pub fn append_history(
    ctx: &mut SessionContext,
    role: HistoryRole,
    content: impl Into<String>,
) -> Result<HistoryMessage, MemoryError> {
    let seq = ctx.history.last().map(|m| m.seq + 1).unwrap_or(1);
    let msg = HistoryMessage { seq, role, content: content.into(), timestamp: now_ms() };
    let line = serde_json::to_string(&msg).map_err(|e| MemoryError::HistoryCorrupt {
        path: ctx.history_path().display().to_string(),
        source: e,
    })?;
    agent_core::append_line(&ctx.history_path(), &line).map_err(|e| io_err(&ctx.history_path(), e))?;
    ctx.history.push(msg.clone());
    Ok(msg)
}

/// `loadHistory(ctx)`: the ordered in-memory sequence (already loaded at
/// context creation and kept current by `append_history`/`write_history`).
pub fn load_history(ctx: &SessionContext) -> &[HistoryMessage] {
    &ctx.history
}

/// `writeHistory(ctx, messages)`: atomically rewrites the whole history
/// file. Only the compaction pipeline calls this.
pub fn write_history(
    ctx: &mut SessionContext,
    messages: Vec<HistoryMessage>,
) -> Result<(), MemoryError> {
    let mut buf = String::new();
    for msg in &messages {
        let line = serde_json::to_string(msg).map_err(|e| MemoryError::HistoryCorrupt {
            path: ctx.history_path().display().to_string(),
            source: e,
        })?;
        buf.push_str(&line);
        buf.push('\n');
    }
    agent_core::atomic_write(&ctx.history_path(), buf.as_bytes())
        .map_err(|e| io_err(&ctx.history_path(), e))?;
    ctx.history = messages;
    Ok(())
}

/// `saveMemoryState(ctx)`: atomically persists `{summary, facts,
/// lastSummarySeq}`. `lastSummarySeq` is only ever advanced forward by the
/// caller (enforced by `SessionContext::advance_summary_seq`), never here.
pub fn save_memory_state(ctx: &SessionContext) -> Result<(), MemoryError> {
    let json = serde_json::to_string_pretty(&ctx.state).map_err(|e| MemoryError::StateCorrupt {
        path: ctx.state_path().display().to_string(),
        source: e,
    })?;
    agent_core::atomic_write(&ctx.state_path(), json.as_bytes()).map_err(|e| io_err(&ctx.state_path(), e))
}

impl SessionContext {
    /// Mutate the in-memory state (summary/facts). Callers must call
    /// [`save_memory_state`] afterward to persist.
    pub fn update_state(&mut self, f: impl FnOnce(&mut SessionState)) {
        f(&mut self.state);
    }

    /// Advance `lastSummarySeq`, refusing to move it backward.
    pub fn advance_summary_seq(&mut self, seq: u64) {
        if seq > self.state.last_summary_seq {
            self.state.last_summary_seq = seq;
        }
    }
}

/// `limitHistoryTurns(history, n)`: truncate to the last `n` user+assistant
/// turn pairs (i.e. the last `2*n` messages, rounded down to a pair
/// boundary when the history starts mid-pair).
pub fn limit_history_turns(history: &[HistoryMessage], n: usize) -> Vec<HistoryMessage> {
    let max_messages = n.saturating_mul(2);
    if history.len() <= max_messages {
        return history.to_vec();
    }
    history[history.len() - max_messages..].to_vec()
}

/// `shouldCompact(totalTokens, config)`: true when `totalTokens` exceeds the
/// caller-supplied compaction trigger (the token-budgeting crate owns how
/// that threshold is derived; this crate only owns the comparison, to avoid
/// a dependency cycle between `agent-memory` and `agent-budget`).
pub fn should_compact(total_tokens: u64, compaction_trigger_tokens: u64) -> bool {
    total_tokens > compaction_trigger_tokens
}

/// `archiveConversation(history, summary, dir)`: writes a timestamped copy
/// to `<dir>/archives/<timestamp>.jsonl`. Never deletes; archival is
/// additive only.
pub fn archive_conversation(
    history: &[HistoryMessage],
    summary: &str,
    dir: &Path,
) -> Result<PathBuf, MemoryError> {
    let archive_dir = dir.join("archives");
    let timestamp = Utc::now().format("%Y%m%dT%H%M%S%.3fZ");
    let path = archive_dir.join(format!("{timestamp}.jsonl"));

    let mut buf = String::new();
    buf.push_str(&serde_json::to_string(&serde_json::json!({"summary": summary})).map_err(
        |e| MemoryError::HistoryCorrupt { path: path.display().to_string(), source: e },
    )?);
    buf.push('\n');
    for msg in history {
        let line = serde_json::to_string(msg)
            .map_err(|e| MemoryError::HistoryCorrupt { path: path.display().to_string(), source: e })?;
        buf.push_str(&line);
        buf.push('\n');
    }

    agent_core::atomic_write(&path, buf.as_bytes()).map_err(|e| io_err(&path, e))?;
    Ok(path)
}

fn now_ms() -> u64 {
    use std::time::{SystemTime, UNIX_EPOCH};
    SystemTime::now().duration_since(UNIX_EPOCH).map(|d| d.as_millis() as u64).unwrap_or(0)
}

/// Scoped per-session writer registry: guarantees at most one
/// `SessionContext` is checked out for a given session id at a time, with
/// guaranteed release on every exit path (including panics, via the guard's
/// `Drop`). Matches the "scoped acquisition ... with guaranteed
/// release on every exit path" and §5's "no two runs on the same session
/// execute concurrently."
#[derive(Default)]
pub struct SessionLocks {
    inner: Arc<Mutex<HashMap<String, Arc<Mutex<()>>>>>,
}

impl SessionLocks {
    pub fn new() -> Self {
        Self::default()
    }

    /// Acquire the lock for `session_id`, blocking until any other run on
    /// the same session releases it.
    pub fn acquire(&self, session_id: &str) -> SessionLockGuard {
        let per_session = {
            let mut map = self.inner.lock();
            map.entry(session_id.to_string()).or_insert_with(|| Arc::new(Mutex::new(()))).clone()
        };
        let guard = per_session.lock_arc();
        SessionLockGuard { _guard: guard }
    }
}

pub struct SessionLockGuard {
    _guard: lock_api::ArcMutexGuard<parking_lot::RawMutex, ()>,
}

#[cfg(test)]
#[path = "session_tests.rs"]
mod tests;
