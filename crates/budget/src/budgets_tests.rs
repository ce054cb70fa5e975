use super::*;

#[test]
fn derive_uses_default_context_length_when_unset() {
    let b = Budgets::derive(BudgetInputs::default());
    assert_eq!(b.context_length, DEFAULT_CONTEXT_LENGTH);
}

#[test]
fn derive_output_reserve_defaults_to_quarter_of_context() {
    let b = Budgets::derive(BudgetInputs { context_length: Some(100_000), ..Default::default() });
    assert_eq!(b.output_reserve, 25_000);
}

#[test]
fn derive_output_reserve_honors_explicit_override() {
    let b = Budgets::derive(BudgetInputs {
        context_length: Some(100_000),
        explicit_max_output_tokens: Some(4_000),
        ..Default::default()
    });
    assert_eq!(b.output_reserve, 4_000);
}

#[yare::parameterized(
    ample = { 100_000, 75_000 },
    tiny  = { 500, 1000 },
)]
fn derive_compaction_trigger_is_context_minus_reserve_floored_at_1000(context_length: u64, expected: u64) {
    let b = Budgets::derive(BudgetInputs { context_length: Some(context_length), ..Default::default() });
    assert_eq!(b.compaction_trigger_tokens, expected);
}

#[test]
fn derive_system_prompt_share_differs_for_scheduled_tasks() {
    let interactive =
        Budgets::derive(BudgetInputs { context_length: Some(20_000), ..Default::default() });
    let scheduled = Budgets::derive(BudgetInputs {
        context_length: Some(20_000),
        is_scheduled_task: true,
        ..Default::default()
    });
    assert_eq!(interactive.system_prompt_budget_tokens, 2400);
    assert_eq!(scheduled.system_prompt_budget_tokens, 2000);
}

#[test]
fn derive_system_prompt_budget_clamps_at_ceiling_for_large_contexts() {
    let b = Budgets::derive(BudgetInputs { context_length: Some(100_000), ..Default::default() });
    assert_eq!(b.system_prompt_budget_tokens, 6000);
}

#[test]
fn derive_system_prompt_budget_respects_floor_for_small_contexts() {
    let b = Budgets::derive(BudgetInputs { context_length: Some(1_000), ..Default::default() });
    assert_eq!(b.system_prompt_budget_tokens, 1200);
}

#[yare::parameterized(
    large_context_caps_at_24k = { 200_000, 24_000 },
    small_context_uses_35_percent = { 40_000, 14_000 },
)]
fn derive_recent_context_tokens_auto(context_length: u64, expected: u64) {
    let b = Budgets::derive(BudgetInputs { context_length: Some(context_length), ..Default::default() });
    assert_eq!(b.recent_context_tokens, expected);
}

#[test]
fn derive_recent_context_tokens_honors_explicit_nonzero_config() {
    let b = Budgets::derive(BudgetInputs {
        context_length: Some(200_000),
        configured_recent_context_tokens: Some(5_000),
        ..Default::default()
    });
    assert_eq!(b.recent_context_tokens, 5_000);
}
