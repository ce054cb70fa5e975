use super::*;
use agent_core::test_support::sample_request;
use agent_core::{FakeClock, Response};
use tokio_util::sync::CancellationToken;

fn ready_items(items: Vec<spool::PollItem>) -> Vec<PickedRequest> {
    items
        .into_iter()
        .map(|item| match item {
            spool::PollItem::Ready(picked) => picked,
            spool::PollItem::Malformed(m) => panic!("expected a ready item, got malformed: {}", m.error),
        })
        .collect()
}

fn write_request_file(dir: &std::path::Path, id: &str, prompt: &str) {
    std::fs::create_dir_all(dir).unwrap();
    let request = sample_request(prompt);
    std::fs::write(dir.join(format!("{id}.json")), serde_json::to_vec_pretty(&request).unwrap()).unwrap();
}

fn fake_heartbeat() -> HeartbeatHandle {
    let (handle, _task) = crate::heartbeat::spawn(
        std::env::temp_dir().join(format!("agentd-test-heartbeat-{}", nanoid::nanoid!())),
        std::env::temp_dir().join(format!("agentd-test-status-{}", nanoid::nanoid!())),
        Duration::from_secs(3_600),
        Arc::new(FakeClock::new()),
        1,
    );
    handle
}

/// Never resolves: used to force `process_one`'s cancellation/shutdown
/// branches to win the race against the worker's own completion.
struct HangingLlmClient;

#[async_trait::async_trait]
impl agent_core::LlmClient for HangingLlmClient {
    async fn complete(
        &self,
        _request: agent_core::CompletionRequest,
        _on_chunk: Option<&(dyn Fn(agent_core::StreamChunk) + Send + Sync)>,
    ) -> Result<agent_core::CompletionResponse, agent_core::LlmError> {
        std::future::pending::<()>().await;
        Ok(agent_core::CompletionResponse {
            text: String::new(),
            tool_calls: Vec::new(),
            finish_reason: agent_core::FinishReason::Stop,
            usage: Default::default(),
        })
    }
}

#[test]
fn finish_task_result_turns_a_join_error_into_an_error_response() {
    let response = finish_task_result(Ok(Response::error("boom")));
    assert_eq!(response.error.as_deref(), Some("boom"));
}

#[tokio::test]
async fn watch_cancel_does_not_resolve_before_the_marker_exists() {
    let dir = tempfile::tempdir().expect("tempdir");
    let request_dir = dir.path();

    let result =
        tokio::time::timeout(Duration::from_millis(30), watch_cancel(request_dir, "req-1", Duration::from_millis(10)))
            .await;
    assert!(result.is_err(), "watch_cancel resolved with no cancel marker present");
}

#[tokio::test]
async fn watch_cancel_resolves_once_the_marker_appears() {
    let dir = tempfile::tempdir().expect("tempdir");
    let request_dir = dir.path();
    std::fs::write(spool::cancel_path(request_dir, "req-1"), b"").unwrap();

    tokio::time::timeout(Duration::from_secs(1), watch_cancel(request_dir, "req-1", Duration::from_millis(10)))
        .await
        .expect("watch_cancel resolves once the marker exists");
}

#[tokio::test]
async fn process_one_publishes_no_response_when_cancelled_mid_run() {
    let root = tempfile::tempdir().expect("tempdir");
    let config = Arc::new(Config { state_dir: root.path().to_path_buf(), daemon_poll_ms: 20, ..Config::default() });
    std::fs::create_dir_all(config.request_dir()).unwrap();
    std::fs::create_dir_all(config.response_dir()).unwrap();

    write_request_file(&config.request_dir(), "req-1", "hello");
    let picked = ready_items(spool::poll_once(&config.request_dir()).unwrap());
    assert_eq!(picked.len(), 1);

    let deps = Arc::new(test_worker_deps(config.clone(), Arc::new(HangingLlmClient)));
    let heartbeat = fake_heartbeat();
    let shutdown = CancellationToken::new();

    std::fs::write(spool::cancel_path(&config.request_dir(), "req-1"), b"").unwrap();

    tokio::time::timeout(
        Duration::from_secs(5),
        process_one(&deps, &config, &heartbeat, &shutdown, picked.into_iter().next().unwrap()),
    )
    .await
    .expect("process_one resolves promptly once cancelled");

    // spec.md §4.1/§8: a cancellation observed mid-run publishes no
    // response at all and removes both the request and cancel files.
    assert!(!config.response_dir().join("req-1.json").exists());
    assert!(!config.request_dir().join("req-1.json").exists());
    assert!(!spool::cancel_path(&config.request_dir(), "req-1").exists());
}

#[tokio::test]
async fn process_one_waits_out_the_shutdown_grace_deadline_before_aborting() {
    let root = tempfile::tempdir().expect("tempdir");
    let config = Arc::new(Config { state_dir: root.path().to_path_buf(), daemon_poll_ms: 20, ..Config::default() });
    std::fs::create_dir_all(config.request_dir()).unwrap();
    std::fs::create_dir_all(config.response_dir()).unwrap();

    write_request_file(&config.request_dir(), "req-2", "hello");
    let picked = ready_items(spool::poll_once(&config.request_dir()).unwrap());

    let deps = Arc::new(test_worker_deps(config.clone(), Arc::new(HangingLlmClient)));
    let heartbeat = fake_heartbeat();
    let shutdown = CancellationToken::new();
    shutdown.cancel();

    // The real GRACEFUL_SHUTDOWN_DEADLINE is 30s; this only asserts the
    // branch is taken and eventually publishes an error response, not the
    // exact deadline, so bound the test's own wait generously instead of
    // waiting out the full deadline.
    let result = tokio::time::timeout(
        Duration::from_secs(1),
        process_one(&deps, &config, &heartbeat, &shutdown, picked.into_iter().next().unwrap()),
    )
    .await;
    assert!(result.is_err(), "process_one should still be waiting out the 30s shutdown deadline after 1s");
}

fn test_worker_deps(config: Arc<Config>, llm: Arc<dyn agent_core::LlmClient>) -> WorkerDeps {
    WorkerDeps {
        llm,
        clock: Arc::new(FakeClock::new()),
        cooldowns: Arc::new(agent_router::CooldownTable::new()),
        registry: Arc::new(agent_toolloop::ToolRegistry::new()),
        fallback: Arc::new(agent_toolloop::NoDeterministicFallback),
        summary_model: Arc::new(test_summary_model()),
        session_locks: Arc::new(agent_memory::SessionLocks::new()),
        config,
        tool_schemas: Vec::new(),
    }
}

fn test_summary_model() -> impl agent_memory::SummaryModel {
    struct Stub;
    #[async_trait::async_trait]
    impl agent_memory::SummaryModel for Stub {
        async fn summarize(
            &self,
            _prior_summary: &str,
            _prior_facts: &[String],
            _prior_part_summaries: &[String],
            _messages: &[agent_core::HistoryMessage],
        ) -> Result<agent_memory::SummaryResult, agent_memory::MemoryError> {
            Ok(agent_memory::SummaryResult { summary: String::new(), facts: Vec::new() })
        }
    }
    Stub
}
