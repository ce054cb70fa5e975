// SPDX-License-Identifier: MIT

//! The Request Daemon (spec.md §4.1): the top-level poll loop that reads
//! the request spool, runs one Worker per request inside its own isolated
//! tokio task, and supervises the heartbeat reporter — all the way down
//! to graceful shutdown on a cancellation signal. The `tokio::select!`
//! race between the work loop and a cancellation future is the same shape
//! as `alfredjeanlab-oddjobs::cli::output`'s `ctrl_c()` follow loops; here
//! the cancellation source is `crate::main`'s signal handler instead of a
//! CLI's own ctrl-c.

use crate::config::Config;
use crate::heartbeat::{self, HeartbeatHandle};
use crate::spool::{self, PickedRequest};
use crate::worker::{self, WorkerDeps};
use agent_core::{HeartbeatMessage, Response};
use std::path::Path;
use std::sync::Arc;
use std::time::{Duration, Instant};
use tokio_util::sync::CancellationToken;

/// Shutdown is given this long to let an in-flight request finish before
/// it is aborted and a synthetic error response is published in its place.
const GRACEFUL_SHUTDOWN_DEADLINE: Duration = Duration::from_secs(30);

/// Heartbeat reporter crash-loop protection: backoff doubles from 1s up to
/// a 10s ceiling, and restarts are disabled once more than 5 happen inside
/// a rolling 60s window.
const HEARTBEAT_RESTART_WINDOW: Duration = Duration::from_secs(60);
const HEARTBEAT_RESTART_LIMIT: usize = 5;
const HEARTBEAT_INITIAL_BACKOFF: Duration = Duration::from_secs(1);
const HEARTBEAT_MAX_BACKOFF: Duration = Duration::from_secs(10);

/// Runs the daemon until `shutdown` is cancelled, then drains gracefully.
pub async fn run_forever(deps: Arc<WorkerDeps>, config: Arc<Config>, shutdown: CancellationToken) {
    let pid = std::process::id();
    let (mut heartbeat, mut heartbeat_task) = heartbeat::spawn(
        config.heartbeat_path(),
        config.daemon_status_path(),
        Duration::from_millis(config.daemon_heartbeat_interval_ms),
        deps.clock.clone(),
        pid,
    );

    let mut restart_times: Vec<Instant> = Vec::new();
    let mut backoff = HEARTBEAT_INITIAL_BACKOFF;
    let mut heartbeat_disabled = false;

    loop {
        tokio::select! {
            _ = shutdown.cancelled() => {
                heartbeat.notify(HeartbeatMessage::Shutdown);
                let _ = tokio::time::timeout(Duration::from_secs(5), heartbeat_task).await;
                break;
            }
            _ = tokio::time::sleep(Duration::from_millis(config.daemon_poll_ms)) => {
                if let Err(err) = poll_and_dispatch(&deps, &config, &heartbeat, &shutdown).await {
                    tracing::error!(error = %err, "request spool poll cycle failed");
                }
            }
            result = &mut heartbeat_task, if !heartbeat_disabled => {
                tracing::error!(?result, "heartbeat reporter task exited unexpectedly; restarting");
                let now = Instant::now();
                restart_times.retain(|t| now.duration_since(*t) < HEARTBEAT_RESTART_WINDOW);
                restart_times.push(now);

                if restart_times.len() > HEARTBEAT_RESTART_LIMIT {
                    tracing::error!("heartbeat reporter crash-looping; disabling further restarts");
                    heartbeat_disabled = true;
                } else {
                    tokio::time::sleep(backoff).await;
                    backoff = (backoff * 2).min(HEARTBEAT_MAX_BACKOFF);
                    let (new_handle, new_task) = heartbeat::spawn(
                        config.heartbeat_path(),
                        config.daemon_status_path(),
                        Duration::from_millis(config.daemon_heartbeat_interval_ms),
                        deps.clock.clone(),
                        pid,
                    );
                    heartbeat = new_handle;
                    heartbeat_task = new_task;
                }
            }
        }
    }
}

async fn poll_and_dispatch(
    deps: &Arc<WorkerDeps>,
    config: &Config,
    heartbeat: &HeartbeatHandle,
    shutdown: &CancellationToken,
) -> std::io::Result<()> {
    let picked = spool::poll_once(&config.request_dir())?;
    for item in picked {
        if shutdown.is_cancelled() {
            break;
        }
        match item {
            spool::PollItem::Ready(request) => process_one(deps, config, heartbeat, shutdown, request).await,
            spool::PollItem::Malformed(malformed) => {
                let request_id = malformed.id.clone();
                match spool::handle_malformed(&config.response_dir(), &malformed) {
                    Ok(()) => {
                        tracing::warn!(request_id = %request_id, "malformed request quarantined and answered with an error response")
                    }
                    Err(err) => {
                        tracing::error!(request_id = %request_id, error = %err, "failed to publish malformed-request response")
                    }
                }
            }
        }
    }
    Ok(())
}

async fn process_one(
    deps: &Arc<WorkerDeps>,
    config: &Config,
    heartbeat: &HeartbeatHandle,
    shutdown: &CancellationToken,
    picked: PickedRequest,
) {
    let request_id = picked.request.id.clone();
    let file_stem = picked.file_stem.clone();
    heartbeat.notify(HeartbeatMessage::Processing { request_id: request_id.clone() });

    let task_deps = deps.clone();
    let task_request = picked.request.clone();
    let mut task = tokio::spawn(async move { worker::process_request(&task_deps, task_request).await });

    let request_dir = config.request_dir();
    let cancel_poll_interval = Duration::from_millis((config.daemon_poll_ms / 2).max(100));

    enum Outcome {
        Response(Response),
        Cancelled,
    }

    let outcome = tokio::select! {
        result = &mut task => Outcome::Response(finish_task_result(result)),
        () = watch_cancel(&request_dir, &file_stem, cancel_poll_interval) => {
            task.abort();
            tracing::info!(request_id = %request_id, "request cancelled mid-run");
            Outcome::Cancelled
        }
        () = shutdown.cancelled() => {
            match tokio::time::timeout(GRACEFUL_SHUTDOWN_DEADLINE, &mut task).await {
                Ok(result) => Outcome::Response(finish_task_result(result)),
                Err(_) => {
                    task.abort();
                    tracing::warn!(request_id = %request_id, "request aborted: shutdown deadline exceeded");
                    Outcome::Response(Response::error("Daemon shutting down"))
                }
            }
        }
    };

    heartbeat.notify(HeartbeatMessage::Idle);

    match outcome {
        Outcome::Response(response) => {
            if let Err(err) = spool::publish_response(
                &config.response_dir(),
                &request_dir,
                &file_stem,
                &picked.request_path,
                &response,
            ) {
                tracing::error!(request_id = %request_id, error = %err, "failed to publish response");
            }
        }
        // spec.md §4.1/§8: a cancellation observed mid-run discards both
        // files and publishes no response at all.
        Outcome::Cancelled => {
            let _ = std::fs::remove_file(&picked.request_path);
            spool::remove_cancel_marker(&request_dir, &file_stem);
        }
    }
}

fn finish_task_result(result: Result<Response, tokio::task::JoinError>) -> Response {
    match result {
        Ok(response) => response,
        Err(join_err) => {
            tracing::error!(error = %join_err, "worker task panicked");
            Response::error(format!("internal worker failure: {join_err}"))
        }
    }
}

/// Polls until `<requestId>.cancel` appears in `request_dir`, then returns.
/// Never returns on its own otherwise — callers race it against the
/// request's own completion.
async fn watch_cancel(request_dir: &Path, request_id: &str, interval: Duration) {
    loop {
        tokio::time::sleep(interval).await;
        if spool::is_cancelled(request_dir, request_id) {
            return;
        }
    }
}

#[cfg(test)]
#[path = "daemon_tests.rs"]
mod tests;
