// SPDX-License-Identifier: MIT

//! Derived budgets: every tunable the context budgeter names, computed once
//! per run from the model's declared `context_length` and the request's
//! overrides.

/// Default context length used when the host's capability declaration is
/// missing an explicit value ("fallback to config default").
pub const DEFAULT_CONTEXT_LENGTH: u64 = 128_000;

/// Derived budgets for one run.
#[derive(Debug, Clone, Copy)]
pub struct Budgets {
    pub context_length: u64,
    pub output_reserve: u64,
    pub compaction_trigger_tokens: u64,
    pub max_context_message_tokens: u64,
    pub system_prompt_budget_tokens: u64,
    pub recent_context_tokens: u64,
}

/// Inputs needed to derive a [`Budgets`].
#[derive(Debug, Clone, Copy, Default)]
pub struct BudgetInputs {
    pub context_length: Option<u64>,
    pub explicit_max_output_tokens: Option<u32>,
    pub is_scheduled_task: bool,
    /// Configured `recentContextTokens`; `0` (or `None`) means "auto".
    pub configured_recent_context_tokens: Option<u64>,
}

impl Budgets {
    pub fn derive(inputs: BudgetInputs) -> Self {
        let context_length = inputs.context_length.unwrap_or(DEFAULT_CONTEXT_LENGTH).max(1);

        let output_reserve = inputs
            .explicit_max_output_tokens
            .map(u64::from)
            .unwrap_or_else(|| (context_length as f64 * 0.25).floor() as u64);

        let compaction_trigger_tokens = context_length.saturating_sub(output_reserve).max(1000);

        let max_context_message_tokens = ((context_length as f64 * 0.03).floor() as u64).max(1000);

        let system_prompt_share = if inputs.is_scheduled_task { 0.10 } else { 0.12 };
        let system_prompt_budget_tokens =
            ((context_length as f64 * system_prompt_share) as u64).clamp(1200, 6000);

        let recent_context_tokens = match inputs.configured_recent_context_tokens {
            Some(0) | None => (24_000u64).min((context_length as f64 * 0.35).floor() as u64),
            Some(explicit) => explicit,
        };

        Self {
            context_length,
            output_reserve,
            compaction_trigger_tokens,
            max_context_message_tokens,
            system_prompt_budget_tokens,
            recent_context_tokens,
        }
    }
}

#[cfg(test)]
#[path = "budgets_tests.rs"]
mod tests;
