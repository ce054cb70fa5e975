// SPDX-License-Identifier: MIT

//! The tool-policy gate run before every executor call ("deny wins over
//! allow").

use agent_core::ToolPolicy;

/// Why a call was rejected before the executor ever ran.
#[derive(Debug, Clone, PartialEq, Eq, thiserror::Error)]
pub enum PolicyViolation {
    #[error("tool \"{0}\" is denied by policy")]
    Denied(String),
    #[error("tool \"{0}\" is not in the allow list")]
    NotAllowed(String),
    #[error("tool \"{0}\" exceeded its per-run quota of {1}")]
    QuotaExceeded(String, u32),
}

/// Checks `name` against `policy`, given how many times it has already run
/// this run (`calls_so_far`). Deny wins over allow; an allow list that is
/// present and doesn't name the tool denies it too.
pub fn check(policy: &ToolPolicy, name: &str, calls_so_far: u32) -> Result<(), PolicyViolation> {
    let lower = name.to_ascii_lowercase();

    if policy.deny.iter().any(|denied| denied.eq_ignore_ascii_case(&lower)) {
        return Err(PolicyViolation::Denied(name.to_string()));
    }

    if !policy.allow.is_empty() && !policy.allow.iter().any(|allowed| allowed.eq_ignore_ascii_case(&lower)) {
        return Err(PolicyViolation::NotAllowed(name.to_string()));
    }

    let quota = policy.max_per_run.iter().find(|(k, _)| k.eq_ignore_ascii_case(&lower)).map(|(_, v)| *v)
        .unwrap_or(policy.default_max_per_run);
    if calls_so_far >= quota {
        return Err(PolicyViolation::QuotaExceeded(name.to_string(), quota));
    }

    Ok(())
}

#[cfg(test)]
#[path = "policy_tests.rs"]
mod tests;
