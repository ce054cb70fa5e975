// SPDX-License-Identifier: MIT

//! The tool-dispatch seam: individual tool implementations (filesystem
//! operations, HTTP fetchers, and the like) are out of scope here — this
//! crate only owns the loop that calls through this trait.

use async_trait::async_trait;
use serde_json::Value;
use std::collections::HashMap;
use std::sync::Arc;
use thiserror::Error;

#[derive(Debug, Error)]
pub enum ExecutorError {
    #[error("tool \"{0}\" is not registered")]
    Unknown(String),
    #[error("{0}")]
    Failed(String),
}

/// One named tool implementation.
#[async_trait]
pub trait ToolExecutor: Send + Sync {
    async fn execute(&self, arguments: Value) -> Result<String, ExecutorError>;
}

/// Whether a registered tool is safe to retry automatically on a transient
/// failure — only read-only / idempotent tools qualify.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Idempotency {
    Idempotent,
    NotIdempotent,
}

struct RegisteredTool {
    executor: Arc<dyn ToolExecutor>,
    idempotency: Idempotency,
}

/// Name → implementation map the run loop dispatches through.
#[derive(Default, Clone)]
pub struct ToolRegistry {
    tools: HashMap<String, Arc<RegisteredTool>>,
}

impl ToolRegistry {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn register(&mut self, name: impl Into<String>, executor: Arc<dyn ToolExecutor>, idempotency: Idempotency) {
        self.tools.insert(name.into(), Arc::new(RegisteredTool { executor, idempotency }));
    }

    pub fn is_idempotent(&self, name: &str) -> bool {
        self.tools.get(name).is_some_and(|tool| tool.idempotency == Idempotency::Idempotent)
    }

    pub async fn execute(&self, name: &str, arguments: Value) -> Result<String, ExecutorError> {
        let tool = self.tools.get(name).ok_or_else(|| ExecutorError::Unknown(name.to_string()))?;
        tool.executor.execute(arguments).await
    }
}

#[cfg(test)]
#[path = "executor_tests.rs"]
mod tests;
