// SPDX-License-Identifier: MIT

//! The process-wide model cooldown table. Read/mutated only from the
//! Worker — safe without finer-grained locking because at most one Worker
//! runs at a time (spec.md §5 "Shared-resource policy").

use crate::classify::{retryable_cooldown_ms, ErrorClass};
use agent_core::{Clock, ModelCooldownEntry};
use parking_lot::Mutex;
use std::collections::HashMap;

/// `model -> cooldown_until_epoch_ms`, inserted on a classified failure and
/// removed on expiry or a successful call after expiry.
#[derive(Default)]
pub struct CooldownTable {
    entries: Mutex<HashMap<String, ModelCooldownEntry>>,
}

impl CooldownTable {
    pub fn new() -> Self {
        Self::default()
    }

    /// Sets (or refreshes) `model`'s cooldown given the error `message` that
    /// just failed, classified as `class`. A no-op for
    /// [`ErrorClass::NonClassified`] and [`ErrorClass::ContextOverflow`] —
    /// neither advances the chain, so neither cools a model down.
    pub fn record_failure(&self, model: &str, class: ErrorClass, message: &str, clock: &dyn Clock) {
        if class != ErrorClass::Retryable {
            return;
        }
        let until = clock.epoch_ms() + retryable_cooldown_ms(message);
        self.entries.lock().insert(model.to_string(), ModelCooldownEntry { cooldown_until_epoch_ms: until });
    }

    /// Whether `model` is currently cooling down.
    pub fn is_cooling(&self, model: &str, clock: &dyn Clock) -> bool {
        match self.entries.lock().get(model) {
            Some(entry) => entry.cooldown_until_epoch_ms > clock.epoch_ms(),
            None => false,
        }
    }

    /// Clears `model`'s cooldown entry, e.g. after a successful call.
    pub fn clear(&self, model: &str) {
        self.entries.lock().remove(model);
    }

    /// A snapshot of all entries, for status reporting.
    pub fn snapshot(&self) -> HashMap<String, ModelCooldownEntry> {
        self.entries.lock().clone()
    }
}

#[cfg(test)]
#[path = "cooldown_tests.rs"]
mod tests;
