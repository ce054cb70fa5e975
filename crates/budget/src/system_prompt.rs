// SPDX-License-Identifier: MIT

//! System-Prompt Builder: assembles the Markdown-sectioned instructions
//! string sent as `CompletionRequest::instructions`, progressively
//! trimming sections when the estimate exceeds the system-prompt budget
//! derived from the run's token budgets.

use crate::estimate::{apply_safety_margin, estimate_text};
use agent_core::TokenEstimateConfig;

/// A monotone 0-4 knob controlling which sections are dropped or
/// shortened.
pub type TrimLevel = u8;

pub const MAX_TRIM_LEVEL: TrimLevel = 4;

/// Everything the builder might include, supplied by the caller; absent
/// (`None`/empty) fields simply produce no section.
#[derive(Debug, Clone, Default)]
pub struct SystemPromptInputs {
    pub identity: String,
    pub platform_note: Option<String>,
    pub scheduled_task_note: Option<String>,
    pub response_guidelines: Option<String>,
    pub tool_guidance: Option<String>,
    pub tool_call_style: Option<String>,
    pub group_notes: Vec<String>,
    pub global_notes: Vec<String>,
    pub skill_catalog: Vec<String>,
    pub timezone_note: Option<String>,
    pub prompt_packs: Vec<PromptPack>,
    pub available_groups: Vec<String>,
    pub tool_reliability_table: Option<String>,
    pub behavior_overrides: Vec<String>,
    pub memory: Option<MemorySection>,
    pub tool_step_budget_reminder: Option<String>,
}

#[derive(Debug, Clone)]
pub struct PromptPack {
    pub name: String,
    pub body: String,
}

#[derive(Debug, Clone, Default)]
pub struct MemorySection {
    pub summary: String,
    pub facts: Vec<String>,
    pub user_profile: Option<String>,
    pub recall_pointer: Option<String>,
    pub stats: Option<String>,
}

const CLOSING_CONCISION_RULE: &str =
    "Be concise: answer the request directly without restating these instructions.";

/// Build the system prompt at a specific trim level.
pub fn build(inputs: &SystemPromptInputs, trim_level: TrimLevel) -> String {
    let mut sections: Vec<String> = Vec::new();

    sections.push(inputs.identity.clone());
    push_opt(&mut sections, &inputs.platform_note);
    push_opt(&mut sections, &inputs.scheduled_task_note);
    push_opt(&mut sections, &inputs.response_guidelines);
    push_opt(&mut sections, &inputs.tool_guidance);
    push_opt(&mut sections, &inputs.tool_call_style);

    let note_limit = if trim_level >= 4 { Some(1000) } else { None };
    for note in &inputs.group_notes {
        sections.push(clamp_chars(note, note_limit));
    }
    for note in &inputs.global_notes {
        sections.push(clamp_chars(note, note_limit));
    }

    if !inputs.skill_catalog.is_empty() {
        sections.push(format!("## Skills\n{}", inputs.skill_catalog.join("\n")));
    }

    push_opt(&mut sections, &inputs.timezone_note);

    if trim_level < 1 {
        for pack in &inputs.prompt_packs {
            sections.push(format!("## {}\n{}", pack.name, pack.body));
        }
    }

    if !inputs.available_groups.is_empty() {
        sections.push(format!("## Available groups\n{}", inputs.available_groups.join(", ")));
    }

    if trim_level < 2 {
        push_opt(&mut sections, &inputs.tool_reliability_table);
    }

    if !inputs.behavior_overrides.is_empty() {
        sections.push(format!("## Behavior overrides\n{}", inputs.behavior_overrides.join("\n")));
    }

    if let Some(memory) = &inputs.memory {
        sections.push(build_memory_section(memory, trim_level));
    }

    push_opt(&mut sections, &inputs.tool_step_budget_reminder);

    sections.push(CLOSING_CONCISION_RULE.to_string());

    sections.into_iter().filter(|s| !s.is_empty()).collect::<Vec<_>>().join("\n\n")
}

fn build_memory_section(memory: &MemorySection, trim_level: TrimLevel) -> String {
    let mut out = String::from("## Memory\n");

    if trim_level >= 3 {
        out.push_str(&clamp_chars(&memory.summary, Some(500)));
        out.push('\n');
        for fact in memory.facts.iter().take(5) {
            out.push_str("- ");
            out.push_str(fact);
            out.push('\n');
        }
    } else {
        out.push_str(&memory.summary);
        out.push('\n');
        for fact in &memory.facts {
            out.push_str("- ");
            out.push_str(fact);
            out.push('\n');
        }
    }

    if let Some(profile) = &memory.user_profile {
        out.push_str("Profile: ");
        out.push_str(profile);
        out.push('\n');
    }
    if let Some(pointer) = &memory.recall_pointer {
        out.push_str("Recall: ");
        out.push_str(pointer);
        out.push('\n');
    }
    if let Some(stats) = &memory.stats {
        out.push_str("Stats: ");
        out.push_str(stats);
    }

    out
}

fn push_opt(sections: &mut Vec<String>, value: &Option<String>) {
    if let Some(v) = value {
        sections.push(v.clone());
    }
}

fn clamp_chars(text: &str, limit: Option<usize>) -> String {
    match limit {
        Some(max) if text.chars().count() > max => text.chars().take(max).collect(),
        _ => text.to_string(),
    }
}

/// Build at level 0, incrementing the trim level and rebuilding while the
/// estimate (1.3x safety margin applied, per spec.md §8's invariant) exceeds
/// `system_prompt_budget_tokens`, up to [`MAX_TRIM_LEVEL`]. If still over
/// budget at level 4 it is used as-is ("Trim-level escalation").
pub fn build_within_budget(
    inputs: &SystemPromptInputs,
    system_prompt_budget_tokens: u64,
    token_estimate: &TokenEstimateConfig,
) -> (String, TrimLevel) {
    let mut level = 0;
    loop {
        let text = build(inputs, level);
        let tokens = apply_safety_margin(estimate_text(&text, token_estimate));
        if tokens <= system_prompt_budget_tokens || level >= MAX_TRIM_LEVEL {
            return (text, level);
        }
        level += 1;
    }
}

/// Minimal mode for background sub-tasks (summary, memory-extraction):
/// identity + scheduled-task note + "Be concise and helpful" only.
pub fn build_minimal(identity: &str, scheduled_task_note: Option<&str>) -> String {
    let mut sections = vec![identity.to_string()];
    if let Some(note) = scheduled_task_note {
        sections.push(note.to_string());
    }
    sections.push("Be concise and helpful.".to_string());
    sections.join("\n\n")
}

#[cfg(test)]
#[path = "system_prompt_tests.rs"]
mod tests;
