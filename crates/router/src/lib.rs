// SPDX-License-Identifier: MIT

#![cfg_attr(test, allow(clippy::panic))]
#![cfg_attr(test, allow(clippy::unwrap_used))]
#![cfg_attr(test, allow(clippy::expect_used))]

//! agent-router: error classification, the process-wide model cooldown
//! table, primary/fallback chain resolution and dispatch, and emergency
//! context-overflow recovery.

mod chain;
mod classify;
mod cooldown;
mod overflow_recovery;

pub use chain::{dispatch, resolve_chain, DispatchAttempt, DispatchOutcome, DispatchResult, MAX_CHAIN_LEN};
pub use classify::{classify, retryable_cooldown_ms, ErrorClass};
pub use cooldown::CooldownTable;
pub use overflow_recovery::{recover, RecoveryPlan, MIN_KEPT_MESSAGES};
