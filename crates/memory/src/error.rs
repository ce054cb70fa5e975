// SPDX-License-Identifier: MIT

use thiserror::Error;

#[derive(Debug, Error)]
pub enum MemoryError {
    #[error("io error at {path}: {source}")]
    Io { path: String, #[source] source: std::io::Error },
    #[error("malformed history line in {path}: {source}")]
    HistoryCorrupt { path: String, #[source] source: serde_json::Error },
    #[error("malformed state file {path}: {source}")]
    StateCorrupt { path: String, #[source] source: serde_json::Error },
    #[error("summary model call failed: {0}")]
    SummaryModel(String),
    #[error("summary model returned unparsable JSON: {0}")]
    SummaryModelJson(String),
}
