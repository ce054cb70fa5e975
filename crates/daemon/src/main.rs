// SPDX-License-Identifier: MIT

//! `agentd`: the request daemon binary. Wires a concrete [`agent_core::LlmClient`],
//! loads [`Config`], installs tracing and signal handling, then hands off to
//! [`agent_daemon::run_forever`].

use agent_core::{CompletionRequest, CompletionResponse, LlmError, StreamChunk, SystemClock};
use agent_daemon::config::Config;
use agent_daemon::worker::WorkerDeps;
use agent_memory::{LlmSummaryModel, SessionLocks};
use agent_router::CooldownTable;
use agent_toolloop::{NoDeterministicFallback, ToolRegistry};
use async_trait::async_trait;
use std::env;
use std::path::PathBuf;
use std::sync::Arc;
use tokio_util::sync::CancellationToken;

/// The HTTP-backed model provider is out of scope for this workspace (see
/// `agent_core::llm`'s own doc comment); this is the placeholder wired in
/// by default so `agentd` starts and answers every request with a clear
/// configuration error instead of silently hanging. A real deployment
/// swaps this for a concrete `LlmClient` behind the same trait object.
struct UnconfiguredLlmClient;

#[async_trait]
impl agent_core::LlmClient for UnconfiguredLlmClient {
    async fn complete(
        &self,
        _request: CompletionRequest,
        _on_chunk: Option<&(dyn Fn(StreamChunk) + Send + Sync)>,
    ) -> Result<CompletionResponse, LlmError> {
        Err(LlmError::Provider(
            "no LlmClient configured: agentd was started with the default placeholder provider".to_string(),
        ))
    }
}

fn init_tracing() {
    use tracing_subscriber::EnvFilter;
    tracing_subscriber::fmt()
        .with_env_filter(EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new("info")))
        .with_target(false)
        .init();
}

fn config_path_from_args() -> Option<PathBuf> {
    env::args().nth(1).map(PathBuf::from).or_else(|| env::var("AGENTD_CONFIG").ok().map(PathBuf::from))
}

/// Resolves once either `tokio::signal::ctrl_c()` fires or, on unix, a
/// SIGTERM is received — the same `select!`-over-a-pinned-future idiom
/// `alfredjeanlab-oddjobs::cli::output`'s log-follow loops use for ctrl-c.
async fn wait_for_shutdown_signal() {
    let ctrl_c = tokio::signal::ctrl_c();
    tokio::pin!(ctrl_c);

    #[cfg(unix)]
    {
        let mut term = match tokio::signal::unix::signal(tokio::signal::unix::SignalKind::terminate()) {
            Ok(term) => term,
            Err(err) => {
                tracing::warn!(error = %err, "failed to install SIGTERM handler; ctrl-c only");
                let _ = &mut ctrl_c.await;
                return;
            }
        };
        tokio::select! {
            _ = &mut ctrl_c => {}
            _ = term.recv() => {}
        }
    }

    #[cfg(not(unix))]
    {
        let _ = ctrl_c.await;
    }
}

#[tokio::main]
async fn main() {
    init_tracing();

    let config = Arc::new(Config::load(config_path_from_args().as_deref()));
    tracing::info!(state_dir = %config.state_dir.display(), "agentd starting");

    let clock = Arc::new(SystemClock);
    let llm: Arc<dyn agent_core::LlmClient> = Arc::new(UnconfiguredLlmClient);
    let summary_model = Arc::new(LlmSummaryModel::new(
        llm.clone(),
        config.default_model.clone(),
        config.summary_max_output_tokens,
    ));

    let deps = Arc::new(WorkerDeps {
        llm,
        clock,
        cooldowns: Arc::new(CooldownTable::new()),
        registry: Arc::new(ToolRegistry::new()),
        fallback: Arc::new(NoDeterministicFallback),
        summary_model,
        session_locks: Arc::new(SessionLocks::new()),
        config: config.clone(),
        tool_schemas: Vec::new(),
    });

    let shutdown = CancellationToken::new();
    let shutdown_watcher = shutdown.clone();
    let signal_task = tokio::spawn(async move {
        wait_for_shutdown_signal().await;
        tracing::info!("shutdown signal received; draining in-flight request");
        shutdown_watcher.cancel();
    });

    agent_daemon::run_forever(deps, config, shutdown).await;
    signal_task.abort();

    tracing::info!("agentd stopped");
}
