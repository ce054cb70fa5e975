// SPDX-License-Identifier: MIT

//! Heartbeat Reporter (spec.md §4.1/§4.2): writes two files a host
//! supervisor polls to tell a live-but-busy daemon from a hung one — a
//! bare epoch-millisecond `heartbeat` file, ticked on a fixed interval
//! regardless of activity, and a structured `daemon_status.json` rewritten
//! immediately on every state transition. Both use the same
//! write-temp-then-rename idiom as every other durable file in this
//! runtime (`agent_core::atomic_write`).
//!
//! Restart supervision (exponential backoff, crash-loop disablement) is
//! not this module's concern — it lives in [`crate::daemon`], which treats
//! this reporter's task the same way it treats a Worker: isolated, and
//! restarted under a policy rather than trusted to never die.

use agent_core::{atomic_write, Clock, DaemonStatus, DaemonStatusState, HeartbeatMessage};
use std::path::PathBuf;
use std::sync::Arc;
use std::time::Duration;
use tokio::sync::mpsc;
use tokio::task::JoinHandle;

/// Handle a Worker uses to report its activity; cheap to clone, safe to
/// hold across awaits.
#[derive(Clone)]
pub struct HeartbeatHandle {
    sender: mpsc::UnboundedSender<HeartbeatMessage>,
}

impl HeartbeatHandle {
    /// Best-effort: if the reporter task has already exited (e.g. during
    /// shutdown), the message is silently dropped rather than treated as
    /// an error — nothing downstream depends on heartbeat delivery.
    pub fn notify(&self, message: HeartbeatMessage) {
        let _ = self.sender.send(message);
    }
}

/// Spawns the reporter task. Returns a handle to send state transitions
/// and the task's `JoinHandle` for the caller's own supervision.
pub fn spawn(
    heartbeat_path: PathBuf,
    status_path: PathBuf,
    tick_interval: Duration,
    clock: Arc<dyn Clock>,
    pid: u32,
) -> (HeartbeatHandle, JoinHandle<()>) {
    let (sender, receiver) = mpsc::unbounded_channel();
    let started_at = clock.epoch_ms();

    let handle = tokio::spawn(run(heartbeat_path, status_path, tick_interval, clock, pid, started_at, receiver));

    (HeartbeatHandle { sender }, handle)
}

async fn run(
    heartbeat_path: PathBuf,
    status_path: PathBuf,
    tick_interval: Duration,
    clock: Arc<dyn Clock>,
    pid: u32,
    started_at: u64,
    mut receiver: mpsc::UnboundedReceiver<HeartbeatMessage>,
) {
    let mut state = DaemonStatusState::Idle;
    let mut request_id = None;
    let mut ticker = tokio::time::interval(tick_interval);
    ticker.set_missed_tick_behavior(tokio::time::MissedTickBehavior::Delay);

    write_files(&heartbeat_path, &status_path, state, request_id.clone(), started_at, pid, clock.epoch_ms());

    loop {
        tokio::select! {
            _ = ticker.tick() => {
                write_files(&heartbeat_path, &status_path, state, request_id.clone(), started_at, pid, clock.epoch_ms());
            }
            received = receiver.recv() => {
                match received {
                    Some(HeartbeatMessage::Processing { request_id: rid }) => {
                        state = DaemonStatusState::Processing;
                        request_id = Some(rid);
                    }
                    Some(HeartbeatMessage::Idle) => {
                        state = DaemonStatusState::Idle;
                        request_id = None;
                    }
                    Some(HeartbeatMessage::Shutdown) | None => {
                        state = DaemonStatusState::Idle;
                        request_id = None;
                        write_files(&heartbeat_path, &status_path, state, request_id, started_at, pid, clock.epoch_ms());
                        return;
                    }
                }
                write_files(&heartbeat_path, &status_path, state, request_id.clone(), started_at, pid, clock.epoch_ms());
            }
        }
    }
}

fn write_files(
    heartbeat_path: &std::path::Path,
    status_path: &std::path::Path,
    state: DaemonStatusState,
    request_id: Option<String>,
    started_at: u64,
    pid: u32,
    now: u64,
) {
    if let Err(err) = atomic_write(heartbeat_path, now.to_string().as_bytes()) {
        tracing::warn!(error = %err, "failed to write heartbeat file");
    }

    let status = DaemonStatus { state, ts: now, request_id, started_at, pid };
    match serde_json::to_vec_pretty(&status) {
        Ok(body) => {
            if let Err(err) = atomic_write(status_path, &body) {
                tracing::warn!(error = %err, "failed to write daemon status file");
            }
        }
        Err(err) => tracing::warn!(error = %err, "failed to serialize daemon status"),
    }
}

#[cfg(test)]
#[path = "heartbeat_tests.rs"]
mod tests;
