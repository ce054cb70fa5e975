// SPDX-License-Identifier: MIT

//! Chain resolution and the dispatch loop that walks it, consulting the
//! process-wide [`CooldownTable`] and classifying failures as it goes.

use crate::classify::{classify, ErrorClass};
use crate::cooldown::CooldownTable;
use agent_core::{Clock, CompletionRequest, CompletionResponse, LlmClient, LlmError};

/// `[primary, ...fallbacks].slice(0, 3)` (spec.md §4.9).
pub const MAX_CHAIN_LEN: usize = 3;

pub fn resolve_chain(primary: &str, fallbacks: &[String]) -> Vec<String> {
    std::iter::once(primary.to_string()).chain(fallbacks.iter().cloned()).take(MAX_CHAIN_LEN).collect()
}

/// One candidate's outcome, recorded for diagnostics regardless of what the
/// overall dispatch decided.
#[derive(Debug, Clone)]
pub struct DispatchAttempt {
    pub model: String,
    pub skipped_cooling: bool,
    pub error: Option<String>,
    pub class: Option<ErrorClass>,
}

/// What the dispatch loop ultimately decided.
pub enum DispatchResult {
    /// `model` answered successfully.
    Success { model: String, response: CompletionResponse },
    /// `model` hit a context-overflow failure. The chain is not advanced:
    /// the caller is expected to run emergency compaction recovery and
    /// retry this same model once.
    ContextOverflow { model: String, error: LlmError },
    /// Every candidate failed, or a non-classified error was hit. `error`
    /// is the most recent failure.
    Exhausted { error: LlmError },
}

pub struct DispatchOutcome {
    pub result: DispatchResult,
    pub attempts: Vec<DispatchAttempt>,
}

/// Walks `chain` in order, sending `request` (with `model` overridden per
/// candidate) through `llm`. Cooling candidates are skipped unless they are
/// the last one left in the chain.
pub async fn dispatch(
    llm: &dyn LlmClient,
    clock: &dyn Clock,
    cooldowns: &CooldownTable,
    chain: &[String],
    request: CompletionRequest,
) -> DispatchOutcome {
    let mut attempts = Vec::new();

    for (index, model) in chain.iter().enumerate() {
        let is_last = index == chain.len() - 1;

        if !is_last && cooldowns.is_cooling(model, clock) {
            attempts.push(DispatchAttempt { model: model.clone(), skipped_cooling: true, error: None, class: None });
            continue;
        }

        let mut candidate_request = request.clone();
        candidate_request.model = model.clone();

        match llm.complete(candidate_request, None).await {
            Ok(response) => {
                cooldowns.clear(model);
                attempts.push(DispatchAttempt { model: model.clone(), skipped_cooling: false, error: None, class: None });
                return DispatchOutcome { result: DispatchResult::Success { model: model.clone(), response }, attempts };
            }
            Err(err) => {
                let message = err.message();
                let class = classify(&message);
                attempts.push(DispatchAttempt {
                    model: model.clone(),
                    skipped_cooling: false,
                    error: Some(message.clone()),
                    class: Some(class),
                });

                match class {
                    ErrorClass::ContextOverflow => {
                        return DispatchOutcome {
                            result: DispatchResult::ContextOverflow { model: model.clone(), error: err },
                            attempts,
                        };
                    }
                    ErrorClass::Retryable => {
                        cooldowns.record_failure(model, class, &message, clock);
                        if is_last {
                            return DispatchOutcome { result: DispatchResult::Exhausted { error: err }, attempts };
                        }
                        continue;
                    }
                    ErrorClass::NonClassified => {
                        return DispatchOutcome { result: DispatchResult::Exhausted { error: err }, attempts };
                    }
                }
            }
        }
    }

    // `chain` was empty.
    DispatchOutcome {
        result: DispatchResult::Exhausted { error: LlmError::Provider("no model candidates in chain".to_string()) },
        attempts,
    }
}

#[cfg(test)]
#[path = "chain_tests.rs"]
mod tests;
