//! Heartbeat reconstruction from per-agent transcript files.
//!
//! Consumes append-only JSONL transcripts of conversation/tool events and
//! rebuilds discrete user-triggered work sessions ("heartbeats") with their
//! steps, token usage, costs, and failures.

pub mod classify;
pub mod describe;
pub mod finalize;
pub mod parser;
pub mod types;

pub use classify::{is_error_result, step_has_error};
pub use describe::{browser_label, describe_call};
pub use finalize::finalize_run;
pub use parser::{entries_from_values, parse_transcript, read_transcript_file};
pub use types::{
    ContentPart, MessageContent, Role, Run, Step, ToolCall, ToolResult, TranscriptEntry,
    TranscriptMessage, Usage, UsageCost, WasteFlag, WasteFlagKind,
};

#[cfg(test)]
mod tests;
