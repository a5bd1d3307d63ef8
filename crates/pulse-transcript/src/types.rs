use std::collections::{BTreeMap, VecDeque};

use chrono::{DateTime, Utc};
use pulse_core::{parse_timestamp, truncate_chars};
use serde::{Deserialize, Serialize};
use serde_json::Value;

/// Maximum characters kept for trigger/summary/step text extracts.
pub const TEXT_EXTRACT_CHARS: usize = 140;
/// Maximum characters kept for a tool-result preview.
pub const RESULT_PREVIEW_CHARS: usize = 500;

#[derive(Debug, Clone, Copy, PartialEq, Eq, Deserialize)]
#[serde(rename_all = "camelCase")]
/// Enumerates supported transcript `Role` values.
pub enum Role {
    User,
    Assistant,
    ToolResult,
    #[serde(other)]
    Other,
}

#[derive(Debug, Clone, Deserialize)]
#[serde(untagged)]
/// Message content is either plain text or a sequence of typed parts.
pub enum MessageContent {
    Text(String),
    Parts(Vec<ContentPart>),
}

#[derive(Debug, Clone, Deserialize)]
#[serde(tag = "type", rename_all = "camelCase")]
/// Enumerates supported `ContentPart` values.
pub enum ContentPart {
    #[serde(rename_all = "camelCase")]
    Text {
        #[serde(default)]
        text: String,
    },
    #[serde(rename_all = "camelCase")]
    ToolCall {
        #[serde(default)]
        id: String,
        #[serde(default)]
        name: String,
        #[serde(default)]
        arguments: Value,
    },
    #[serde(rename_all = "camelCase")]
    ToolResult {
        #[serde(default)]
        tool_name: Option<String>,
        #[serde(default)]
        tool_call_id: Option<String>,
        #[serde(default)]
        content: Option<Box<MessageContent>>,
        #[serde(default)]
        is_error: bool,
    },
    // Unknown part kinds are tolerated so one odd part never rejects the
    // whole entry.
    #[serde(other)]
    Unknown,
}

#[derive(Debug, Clone, Default, Deserialize)]
#[serde(rename_all = "camelCase")]
/// Per-category cost breakdown reported by the provider.
pub struct UsageCost {
    #[serde(default)]
    pub total: f64,
    #[serde(default)]
    pub input: f64,
    #[serde(default)]
    pub output: f64,
    #[serde(default)]
    pub cache_read: f64,
    #[serde(default)]
    pub cache_write: f64,
}

#[derive(Debug, Clone, Default, Deserialize)]
#[serde(rename_all = "camelCase")]
/// Token usage attached to an assistant turn.
///
/// `output` and `total_tokens` stay optional: an explicit zero marks a
/// failed API turn, while an absent field is merely an incomplete record.
pub struct Usage {
    #[serde(default)]
    pub output: Option<u64>,
    #[serde(default)]
    pub cache_read: u64,
    #[serde(default)]
    pub cache_write: u64,
    #[serde(default)]
    pub total_tokens: Option<u64>,
    #[serde(default)]
    pub cost: Option<UsageCost>,
}

#[derive(Debug, Clone, Deserialize)]
#[serde(rename_all = "camelCase")]
/// One message payload inside a transcript entry.
pub struct TranscriptMessage {
    pub role: Option<Role>,
    #[serde(default)]
    pub content: Option<MessageContent>,
    #[serde(default)]
    pub usage: Option<Usage>,
    #[serde(default)]
    pub model: Option<String>,
    #[serde(default)]
    pub timestamp: Option<String>,
    #[serde(default)]
    pub tool_name: Option<String>,
    #[serde(default)]
    pub tool_call_id: Option<String>,
    #[serde(default)]
    pub is_error: bool,
}

#[derive(Debug, Clone, Deserialize)]
#[serde(rename_all = "camelCase")]
/// One line of a per-agent transcript file.
pub struct TranscriptEntry {
    #[serde(default)]
    pub timestamp: Option<String>,
    #[serde(default)]
    pub message: Option<TranscriptMessage>,
}

impl TranscriptEntry {
    /// Entry timestamp, falling back to the message timestamp.
    pub fn time(&self) -> Option<DateTime<Utc>> {
        self.timestamp
            .as_deref()
            .and_then(parse_timestamp)
            .or_else(|| {
                self.message
                    .as_ref()
                    .and_then(|message| message.timestamp.as_deref())
                    .and_then(parse_timestamp)
            })
    }
}

impl TranscriptMessage {
    /// Concatenated text parts, truncated to the extract limit.
    pub fn extract_text(&self) -> String {
        match &self.content {
            Some(MessageContent::Text(text)) => truncate_chars(text, TEXT_EXTRACT_CHARS),
            Some(MessageContent::Parts(parts)) => {
                let joined: String = parts
                    .iter()
                    .filter_map(|part| match part {
                        ContentPart::Text { text } => Some(text.as_str()),
                        _ => None,
                    })
                    .collect();
                truncate_chars(&joined, TEXT_EXTRACT_CHARS)
            }
            None => String::new(),
        }
    }

    /// Tool-call parts of an assistant turn.
    pub fn tool_calls(&self) -> Vec<ToolCall> {
        let Some(MessageContent::Parts(parts)) = &self.content else {
            return Vec::new();
        };
        parts
            .iter()
            .filter_map(|part| match part {
                ContentPart::ToolCall {
                    id,
                    name,
                    arguments,
                } => Some(ToolCall {
                    id: id.clone(),
                    name: name.clone(),
                    arguments: arguments.clone(),
                }),
                _ => None,
            })
            .collect()
    }

    /// True when the message carries no content at all (empty assistant
    /// responses are counted as upstream API errors).
    pub fn is_content_empty(&self) -> bool {
        match &self.content {
            None => true,
            Some(MessageContent::Text(text)) => text.is_empty(),
            Some(MessageContent::Parts(parts)) => parts.is_empty(),
        }
    }

    /// When a user envelope batches only tool-result wrappers, returns those
    /// parts; any other user message is a genuine trigger.
    pub fn tool_result_batch(&self) -> Option<Vec<&ContentPart>> {
        let Some(MessageContent::Parts(parts)) = &self.content else {
            return None;
        };
        if parts.is_empty() {
            return None;
        }
        if parts
            .iter()
            .all(|part| matches!(part, ContentPart::ToolResult { .. }))
        {
            Some(parts.iter().collect())
        } else {
            None
        }
    }
}

#[derive(Debug, Clone, PartialEq, Serialize)]
#[serde(rename_all = "camelCase")]
/// A tool invocation issued by an assistant turn.
pub struct ToolCall {
    pub id: String,
    pub name: String,
    pub arguments: Value,
}

#[derive(Debug, Clone, PartialEq, Serialize)]
#[serde(rename_all = "camelCase")]
/// The recorded outcome of a tool invocation.
pub struct ToolResult {
    pub name: String,
    pub call_id: String,
    pub size: usize,
    pub preview: String,
    pub is_error: bool,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
#[serde(rename_all = "camelCase")]
/// Enumerates supported `WasteFlagKind` values.
pub enum WasteFlagKind {
    Runaway,
    Cache,
    LargeResult,
    BloatedCtx,
}

#[derive(Debug, Clone, PartialEq, Serialize)]
#[serde(rename_all = "camelCase")]
/// A heuristic warning that a run likely wasted cost or tokens.
pub struct WasteFlag {
    #[serde(rename = "type")]
    pub kind: WasteFlagKind,
    pub msg: String,
}

#[derive(Debug, Clone, Serialize)]
#[serde(rename_all = "camelCase")]
/// One assistant turn that produced token usage inside a run.
pub struct Step {
    pub time: Option<DateTime<Utc>>,
    pub output: u64,
    pub cache_read: u64,
    pub cache_write: u64,
    pub total_tokens: u64,
    pub cost: f64,
    pub cost_input: f64,
    pub cost_output: f64,
    pub cost_cache_read: f64,
    pub cost_cache_write: f64,
    pub tool_calls: Vec<ToolCall>,
    pub tool_results: Vec<ToolResult>,
    pub result_total_size: usize,
    pub text: String,
    pub model: String,
    pub duration_ms: Option<i64>,
}

impl Step {
    /// Pairs tool results to calls: matched by call id first, the rest
    /// assigned to remaining calls oldest-first (a first-fit queue, not a
    /// strict one-to-one join). Leftover results are returned unpaired.
    pub fn paired_results(&self) -> Vec<(Option<&ToolCall>, Option<&ToolResult>)> {
        let mut by_call_id: BTreeMap<&str, &ToolResult> = BTreeMap::new();
        let mut unmatched: VecDeque<&ToolResult> = VecDeque::new();
        for result in &self.tool_results {
            let matches_call = !result.call_id.is_empty()
                && self.tool_calls.iter().any(|call| call.id == result.call_id);
            // A second result on the same call id queues up instead of
            // displacing the first.
            if matches_call && !by_call_id.contains_key(result.call_id.as_str()) {
                by_call_id.insert(result.call_id.as_str(), result);
            } else {
                unmatched.push_back(result);
            }
        }

        let mut pairs = Vec::new();
        for call in &self.tool_calls {
            let result = by_call_id
                .remove(call.id.as_str())
                .or_else(|| unmatched.pop_front());
            pairs.push((Some(call), result));
        }
        for result in unmatched {
            pairs.push((None, Some(result)));
        }
        pairs
    }
}

#[derive(Debug, Clone, Serialize)]
#[serde(rename_all = "camelCase")]
/// One user-triggered unit of agent work ("heartbeat").
pub struct Run {
    pub start_time: Option<DateTime<Utc>>,
    pub end_time: Option<DateTime<Utc>>,
    pub duration_ms: Option<i64>,
    pub trigger: String,
    pub steps: Vec<Step>,
    pub total_cost: f64,
    pub total_output: u64,
    pub final_context: u64,
    pub summary: String,
    pub api_errors: u64,
    pub error_count: u64,
    pub browser_breakdown: BTreeMap<String, u64>,
    /// cache_read / (cache_read + approximated input), in [0, 1].
    pub cache_hit_rate: f64,
    pub waste_flags: Vec<WasteFlag>,
}

impl Run {
    pub fn new(start_time: Option<DateTime<Utc>>, trigger: String) -> Self {
        Self {
            start_time,
            end_time: None,
            duration_ms: None,
            trigger,
            steps: Vec::new(),
            total_cost: 0.0,
            total_output: 0,
            final_context: 0,
            summary: String::new(),
            api_errors: 0,
            error_count: 0,
            browser_breakdown: BTreeMap::new(),
            cache_hit_rate: 0.0,
            waste_flags: Vec::new(),
        }
    }
}
