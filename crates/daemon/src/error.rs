// SPDX-License-Identifier: MIT

use thiserror::Error;

#[derive(Debug, Error)]
pub enum DaemonError {
    #[error("io error at {path}: {source}")]
    Io { path: String, #[source] source: std::io::Error },
    #[error("malformed request envelope in {path}: {source}")]
    RequestCorrupt { path: String, #[source] source: serde_json::Error },
    #[error(transparent)]
    Memory(#[from] agent_memory::MemoryError),
    #[error("model call failed: {0}")]
    Llm(#[from] agent_core::LlmError),
}
