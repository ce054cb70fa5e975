use super::*;
use crate::session::{append_history, create_session_context};
use crate::summary_model::SummaryResult;
use agent_core::HistoryRole;
use async_trait::async_trait;
use tempfile::tempdir;

struct CharCountEstimator;

impl TokenEstimator for CharCountEstimator {
    fn estimate(&self, messages: &[HistoryMessage]) -> u64 {
        messages.iter().map(|m| m.content.len() as u64).sum()
    }
}

struct StubSummaryModel {
    calls: std::sync::Mutex<Vec<usize>>,
}

impl StubSummaryModel {
    fn new() -> Self {
        Self { calls: std::sync::Mutex::new(Vec::new()) }
    }
}

#[async_trait]
impl SummaryModel for StubSummaryModel {
    async fn summarize(
        &self,
        _prior_summary: &str,
        _prior_facts: &[String],
        part_summaries_so_far: &[String],
        messages: &[HistoryMessage],
    ) -> Result<SummaryResult, crate::error::MemoryError> {
        self.calls.lock().unwrap().push(messages.len());
        Ok(SummaryResult {
            summary: format!("part{}", part_summaries_so_far.len() + 1),
            facts: vec![format!("fact-from-part-{}", part_summaries_so_far.len() + 1)],
        })
    }
}

fn seed_history(ctx: &mut crate::session::SessionContext, n: u64) {
    for i in 0..n {
        let role = if i % 2 == 0 { HistoryRole::User } else { HistoryRole::Assistant };
        append_history(ctx, role, format!("message {i}")).unwrap();
    }
}

#[tokio::test]
async fn compact_archives_history_and_rewrites_to_recent_window() {
    let root = tempdir().unwrap();
    let (mut ctx, _) = create_session_context(root.path(), None).unwrap();
    seed_history(&mut ctx, 20);

    let estimator = CharCountEstimator;
    let summary_model = StubSummaryModel::new();

    let outcome = compact(&mut ctx, &estimator, &summary_model, 50, root.path()).await.unwrap();

    assert!(outcome.compacted);
    assert!(outcome.archive_path.unwrap().exists());
    assert!(ctx.history().len() < 20);
    assert!(!ctx.state().summary.is_empty());
    assert!(ctx.state().last_summary_seq > 0);
}

#[tokio::test]
async fn compact_is_no_op_when_history_fits_in_recent_window() {
    let root = tempdir().unwrap();
    let (mut ctx, _) = create_session_context(root.path(), None).unwrap();
    seed_history(&mut ctx, 4);

    let estimator = CharCountEstimator;
    let summary_model = StubSummaryModel::new();

    let outcome = compact(&mut ctx, &estimator, &summary_model, 1_000_000, root.path()).await.unwrap();

    assert!(!outcome.compacted);
    assert_eq!(ctx.history().len(), 4);
}

#[tokio::test]
async fn compact_merges_facts_case_insensitively_and_advances_seq() {
    let root = tempdir().unwrap();
    let (mut ctx, _) = create_session_context(root.path(), None).unwrap();
    seed_history(&mut ctx, 20);
    ctx.update_state(|s| s.facts.push("fact-from-part-1".to_string()));

    let estimator = CharCountEstimator;
    let summary_model = StubSummaryModel::new();

    compact(&mut ctx, &estimator, &summary_model, 50, root.path()).await.unwrap();

    let lowercase_count =
        ctx.state().facts.iter().filter(|f| f.eq_ignore_ascii_case("fact-from-part-1")).count();
    assert_eq!(lowercase_count, 1);
}

#[test]
fn split_into_parts_caps_at_three_for_very_long_history() {
    let estimator = CharCountEstimator;
    let older: Vec<HistoryMessage> = (0..300)
        .map(|i| HistoryMessage {
            seq: i,
            role: HistoryRole::User,
            content: "x".repeat(1000),
            timestamp: 0,
        })
        .collect();
    let parts = split_into_parts(&older, &estimator);
    assert!(parts.len() <= 3);
    assert_eq!(parts.iter().map(Vec::len).sum::<usize>(), older.len());
}
