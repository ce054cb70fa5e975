// SPDX-License-Identifier: MIT

//! The runtime's single declarative configuration object (spec.md §6
//! "Environment & config"), grounded on
//! `alfredjeanlab-oddjobs::daemon::lifecycle::Config::load`'s fixed-paths-
//! under-`$XDG_STATE_HOME` convention, generalized from that daemon's
//! socket/WAL/snapshot paths to this one's request/response spool and
//! session-store paths.

use agent_core::{ReasoningEffort, TokenEstimateConfig, ToolPolicy};
use std::path::{Path, PathBuf};

/// Every tunable spec.md §6 enumerates, gathered in one struct so a host
/// loads it once from a TOML file (or accepts the defaults) rather than
/// threading two dozen loose values through every call site.
#[derive(Debug, Clone)]
pub struct Config {
    pub state_dir: PathBuf,
    pub default_model: String,

    pub max_context_tokens: Option<u64>,
    pub recent_context_tokens: u64,
    pub max_context_message_tokens: Option<u64>,
    pub summary_update_every_messages: u32,
    pub memory_max_results: u32,
    pub memory_max_tokens: u64,
    pub max_output_tokens: Option<u32>,
    pub summary_max_output_tokens: Option<u32>,
    pub temperature: Option<f32>,
    pub max_tool_steps: u32,
    pub idempotent_retry_attempts: u32,
    pub idempotent_retry_backoff_ms: u64,
    pub repeated_signature_threshold: u32,
    pub repeated_round_threshold: u32,
    pub non_retryable_failure_threshold: u32,
    pub force_synthesis_after_tools: bool,
    pub daemon_poll_ms: u64,
    pub daemon_heartbeat_interval_ms: u64,
    pub openrouter: OpenRouterConfig,
    pub token_estimate: TokenEstimateConfig,
    pub tool_policy: ToolPolicy,
    pub prompt_packs: PromptPacksConfig,
    pub memory: MemoryConfig,
    pub context: ContextConfig,
    pub reasoning_effort: ReasoningEffort,
    pub output_limit_bytes: usize,
}

#[derive(Debug, Clone)]
pub struct OpenRouterConfig {
    pub timeout_ms: u64,
    pub retry: bool,
}

#[derive(Debug, Clone)]
pub struct PromptPacksConfig {
    pub enabled: bool,
    pub max_chars: usize,
    pub max_demos: usize,
    pub canary_rate: f64,
}

#[derive(Debug, Clone)]
pub struct MemoryConfig {
    pub extraction: MemoryExtractionConfig,
    pub archive_sync: bool,
    pub extract_scheduled: bool,
}

#[derive(Debug, Clone)]
pub struct MemoryExtractionConfig {
    pub enabled: bool,
    pub max_messages: usize,
    pub max_output_tokens: Option<u32>,
}

#[derive(Debug, Clone)]
pub struct ContextConfig {
    pub max_history_turns: usize,
    pub context_pruning: ContextPruningConfig,
}

#[derive(Debug, Clone)]
pub struct ContextPruningConfig {
    pub soft_trim_max_chars: usize,
    pub soft_trim_head_chars: usize,
    pub soft_trim_tail_chars: usize,
}

impl Default for Config {
    fn default() -> Self {
        Self {
            state_dir: default_state_dir(),
            default_model: "gpt-4o-mini".to_string(),
            max_context_tokens: None,
            recent_context_tokens: 0,
            max_context_message_tokens: None,
            summary_update_every_messages: 20,
            memory_max_results: 8,
            memory_max_tokens: 2_000,
            max_output_tokens: None,
            summary_max_output_tokens: Some(600),
            temperature: None,
            max_tool_steps: 24,
            idempotent_retry_attempts: 2,
            idempotent_retry_backoff_ms: 500,
            repeated_signature_threshold: 3,
            repeated_round_threshold: 3,
            non_retryable_failure_threshold: 3,
            force_synthesis_after_tools: true,
            daemon_poll_ms: 250,
            daemon_heartbeat_interval_ms: 5_000,
            openrouter: OpenRouterConfig { timeout_ms: 60_000, retry: true },
            token_estimate: TokenEstimateConfig::default(),
            tool_policy: ToolPolicy::default(),
            prompt_packs: PromptPacksConfig { enabled: true, max_chars: 4_000, max_demos: 3, canary_rate: 0.0 },
            memory: MemoryConfig {
                extraction: MemoryExtractionConfig { enabled: true, max_messages: 20, max_output_tokens: Some(300) },
                archive_sync: false,
                extract_scheduled: false,
            },
            context: ContextConfig {
                max_history_turns: 200,
                context_pruning: ContextPruningConfig {
                    soft_trim_max_chars: 4_000,
                    soft_trim_head_chars: 800,
                    soft_trim_tail_chars: 400,
                },
            },
            reasoning_effort: ReasoningEffort::default(),
            output_limit_bytes: 50_000,
        }
    }
}

impl Config {
    /// Derives the fixed subdirectories every component needs from
    /// `state_dir`: `agent_requests/`, `agent_responses/`, the two
    /// heartbeat status files, and the session store root.
    pub fn request_dir(&self) -> PathBuf {
        self.state_dir.join("agent_requests")
    }

    pub fn response_dir(&self) -> PathBuf {
        self.state_dir.join("agent_responses")
    }

    pub fn heartbeat_path(&self) -> PathBuf {
        self.state_dir.join("heartbeat")
    }

    pub fn daemon_status_path(&self) -> PathBuf {
        self.state_dir.join("daemon_status.json")
    }

    pub fn memory_extraction_status_path(&self) -> PathBuf {
        self.state_dir.join("memory_extraction_status.json")
    }

    pub fn session_root(&self) -> PathBuf {
        self.state_dir.join("sessions")
    }

    pub fn archive_sink_dir(&self) -> PathBuf {
        self.state_dir.join("archive_sink")
    }

    /// Load configuration layered over the defaults: an optional TOML file
    /// at `path` overrides only the keys it sets. Mirrors the teacher's
    /// `Config::load` convention of fixed paths under one state directory,
    /// generalized to also accept a config file for the tunables spec.md
    /// §6 enumerates (the teacher's daemon has no such tunable file — it
    /// hardcodes behavior — so this part is new, following the shape of a
    /// plain `toml::from_str` deserialize into an overrides struct that
    /// gets merged field-by-field).
    pub fn load(path: Option<&Path>) -> Self {
        let mut config = Self::default();
        let Some(path) = path else { return config };
        let Ok(content) = std::fs::read_to_string(path) else { return config };
        let Ok(overrides) = toml::from_str::<ConfigOverrides>(&content) else { return config };
        overrides.apply(&mut config);
        config
    }
}

fn default_state_dir() -> PathBuf {
    dirs::state_dir()
        .or_else(dirs::data_local_dir)
        .unwrap_or_else(std::env::temp_dir)
        .join("agent-runtime")
}

/// Sparse, all-optional mirror of [`Config`]'s scalar fields, for
/// `toml::from_str`-based overrides. Nested tables are intentionally left
/// for a follow-up once a concrete deployment needs to override them from
/// a file rather than code.
#[derive(Debug, Default, serde::Deserialize)]
struct ConfigOverrides {
    state_dir: Option<PathBuf>,
    default_model: Option<String>,
    max_context_tokens: Option<u64>,
    recent_context_tokens: Option<u64>,
    max_output_tokens: Option<u32>,
    temperature: Option<f32>,
    max_tool_steps: Option<u32>,
    daemon_poll_ms: Option<u64>,
    daemon_heartbeat_interval_ms: Option<u64>,
}

impl ConfigOverrides {
    fn apply(self, config: &mut Config) {
        if let Some(v) = self.state_dir {
            config.state_dir = v;
        }
        if let Some(v) = self.default_model {
            config.default_model = v;
        }
        if let Some(v) = self.max_context_tokens {
            config.max_context_tokens = Some(v);
        }
        if let Some(v) = self.recent_context_tokens {
            config.recent_context_tokens = v;
        }
        if let Some(v) = self.max_output_tokens {
            config.max_output_tokens = Some(v);
        }
        if let Some(v) = self.temperature {
            config.temperature = Some(v);
        }
        if let Some(v) = self.max_tool_steps {
            config.max_tool_steps = v;
        }
        if let Some(v) = self.daemon_poll_ms {
            config.daemon_poll_ms = v;
        }
        if let Some(v) = self.daemon_heartbeat_interval_ms {
            config.daemon_heartbeat_interval_ms = v;
        }
    }
}

#[cfg(test)]
#[path = "config_tests.rs"]
mod tests;
