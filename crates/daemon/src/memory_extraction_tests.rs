use super::*;
use agent_memory::{append_history, create_session_context, SessionLocks};
use async_trait::async_trait;
use std::sync::Mutex as StdMutex;

struct StubSummaryModel {
    calls: StdMutex<u32>,
}

impl StubSummaryModel {
    fn new() -> Self {
        Self { calls: StdMutex::new(0) }
    }
}

#[async_trait]
impl agent_memory::SummaryModel for StubSummaryModel {
    async fn summarize(
        &self,
        _prior_summary: &str,
        _prior_facts: &[String],
        _prior_part_summaries: &[String],
        _messages: &[agent_core::HistoryMessage],
    ) -> Result<agent_memory::SummaryResult, agent_memory::MemoryError> {
        *self.calls.lock().unwrap() += 1;
        Ok(agent_memory::SummaryResult { summary: "extracted summary".to_string(), facts: vec!["fact-a".to_string()] })
    }
}

fn seed_session(root: &std::path::Path) -> agent_core::SessionId {
    let (mut ctx, _) = create_session_context(root, None).expect("create session");
    append_history(&mut ctx, agent_core::HistoryRole::User, "hello").expect("append");
    append_history(&mut ctx, agent_core::HistoryRole::Assistant, "hi there").expect("append");
    ctx.id
}

#[tokio::test]
async fn run_updates_summary_and_facts_and_advances_the_summary_seq() {
    let root = tempfile::tempdir().expect("tempdir");
    let session_id = seed_session(root.path());
    let summary_model = StubSummaryModel::new();
    let locks = SessionLocks::new();

    run(&summary_model, &locks, root.path(), session_id, 20).await.expect("run");

    assert_eq!(*summary_model.calls.lock().unwrap(), 1);
    let (ctx, _) = create_session_context(root.path(), Some(session_id)).expect("reload session");
    assert_eq!(ctx.state().summary, "extracted summary");
    assert_eq!(ctx.state().facts, vec!["fact-a".to_string()]);
    assert!(ctx.state().last_summary_seq > 0);
}

#[tokio::test]
async fn run_is_a_no_op_for_an_empty_history() {
    let root = tempfile::tempdir().expect("tempdir");
    let (ctx, _) = create_session_context(root.path(), None).expect("create session");
    let session_id = ctx.id;
    let summary_model = StubSummaryModel::new();
    let locks = SessionLocks::new();

    run(&summary_model, &locks, root.path(), session_id, 20).await.expect("run");

    assert_eq!(*summary_model.calls.lock().unwrap(), 0);
    let (reloaded, _) = create_session_context(root.path(), Some(session_id)).expect("reload session");
    assert!(reloaded.history().is_empty());
}

#[tokio::test]
async fn write_status_persists_a_json_record_with_the_session_id_and_error() {
    let dir = tempfile::tempdir().expect("tempdir");
    let path = dir.path().join("memory_extraction_status.json");
    let session_id = agent_core::SessionId::new();

    write_status(&path, session_id, "model unavailable", 12_345);

    let body: serde_json::Value = serde_json::from_str(&std::fs::read_to_string(&path).unwrap()).unwrap();
    assert_eq!(body["sessionId"], session_id.as_str());
    assert_eq!(body["error"], "model unavailable");
    assert_eq!(body["ts"], 12_345);
}
