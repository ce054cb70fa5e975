use super::*;
use serde_json::json;

fn glob_call() -> ToolCall {
    ToolCall { id: "1".into(), name: "Glob".into(), arguments: json!({"pattern": "**/*.log"}) }
}

#[test]
fn observe_round_triggers_after_three_identical_rounds() {
    let mut detector = LoopDetector::new(LoopDetectorConfig::default());
    assert!(detector.observe_round(&[glob_call()]).is_none());
    assert!(detector.observe_round(&[glob_call()]).is_none());
    let breaker = detector.observe_round(&[glob_call()]);
    assert_eq!(breaker, Some(Breaker::RepeatedRoundSignature { threshold: 3 }));
}

#[test]
fn observe_round_resets_streak_when_signature_changes() {
    let mut detector = LoopDetector::new(LoopDetectorConfig::default());
    let other = ToolCall { id: "2".into(), name: "Read".into(), arguments: json!({"path": "a"}) };
    detector.observe_round(&[glob_call()]);
    detector.observe_round(&[other]);
    assert!(detector.observe_round(&[glob_call()]).is_none());
}

#[test]
fn observe_call_triggers_on_third_identical_call() {
    let mut detector = LoopDetector::new(LoopDetectorConfig::default());
    assert!(detector.observe_call(&glob_call()).is_none());
    assert!(detector.observe_call(&glob_call()).is_none());
    let breaker = detector.observe_call(&glob_call());
    assert_eq!(breaker, Some(Breaker::RepeatedCallSignature { threshold: 3, name: "Glob".into() }));
}

#[test]
fn breaker_reason_matches_spec_format() {
    let breaker = Breaker::RepeatedCallSignature { threshold: 3, name: "Glob".into() };
    assert_eq!(breaker.reason(), "repeated_call_signature(3): Glob");
}

#[test]
fn non_retryable_failures_trigger_at_threshold() {
    let mut detector = LoopDetector::new(LoopDetectorConfig::default());
    assert!(detector.observe_non_retryable_failure().is_none());
    assert!(detector.observe_non_retryable_failure().is_none());
    assert_eq!(
        detector.observe_non_retryable_failure(),
        Some(Breaker::NonRetryableFailures { threshold: 3 })
    );
}

#[test]
fn reset_clears_all_trackers() {
    let mut detector = LoopDetector::new(LoopDetectorConfig::default());
    detector.observe_round(&[glob_call()]);
    detector.observe_call(&glob_call());
    detector.observe_non_retryable_failure();
    detector.reset();
    assert_eq!(detector.non_retryable_failures(), 0);
    assert!(detector.observe_round(&[glob_call()]).is_none());
}
