// SPDX-License-Identifier: MIT

// Allow panic!/unwrap/expect in test code
#![cfg_attr(test, allow(clippy::panic))]
#![cfg_attr(test, allow(clippy::unwrap_used))]
#![cfg_attr(test, allow(clippy::expect_used))]

//! agent-core: shared data model for the agent runtime.
//!
//! Every other crate in the workspace depends on this one for IDs, the
//! request/response/session record types, the clock abstraction, and the
//! `LlmClient` seam the tool-execution loop calls through.

pub mod clock;
pub mod fsutil;
pub mod id;
pub mod llm;
pub mod model;
pub mod redact;
pub mod time_fmt;

#[cfg(any(test, feature = "test-support"))]
pub mod test_support;

pub use clock::{Clock, FakeClock, SystemClock};
pub use fsutil::{append_line, atomic_write};
pub use id::{short, IdGen, UuidIdGen};
pub use llm::{
    CompletionRequest, CompletionResponse, FinishReason, LlmClient, LlmError, Message, Role,
    StreamChunk, TokenUsage, ToolCall, ToolResult, ToolSchema,
};
pub use model::{
    Attachment, AttachmentKind, DaemonStatus, DaemonStatusState, HeartbeatMessage, HistoryMessage,
    HistoryRole, ModelCapabilities, ModelCooldownEntry, ReasoningEffort, Request, Response,
    ResponseStatus, SessionId, SessionState, Timings, TokenEstimateConfig, ToolCallRecord,
    ToolPolicy, ToolResultRecord, MAX_FACTS,
};
pub use redact::redact_args;
