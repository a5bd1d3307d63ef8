use std::path::Path;

use anyhow::Result;
use chrono::{DateTime, Utc};
use pulse_core::{read_jsonl_values, truncate_chars};
use serde_json::Value;
use tracing::debug;

use crate::finalize::finalize_run;
use crate::types::{
    ContentPart, MessageContent, Role, Run, Step, ToolResult, TranscriptEntry,
    TranscriptMessage, RESULT_PREVIEW_CHARS,
};

/// Deserializes raw JSONL values into transcript entries, skipping records
/// that do not fit the entry shape.
pub fn entries_from_values(values: Vec<Value>) -> Vec<TranscriptEntry> {
    values
        .into_iter()
        .filter_map(|value| serde_json::from_value::<TranscriptEntry>(value).ok())
        .collect()
}

/// Reads one transcript file into entries. A missing file yields no entries.
pub fn read_transcript_file(path: &Path) -> Result<Vec<TranscriptEntry>> {
    Ok(entries_from_values(read_jsonl_values(path)?))
}

/// Reconstructs heartbeats from one agent's ordered transcript.
///
/// Processing is strictly sequential: a genuine user message opens a run and
/// closes the previous one, assistant turns with usage become steps, and tool
/// results attach to the most recent step. Emission order is chronological;
/// presentation layers reverse it for newest-first views.
pub fn parse_transcript(entries: &[TranscriptEntry]) -> Vec<Run> {
    let mut runs = Vec::new();
    let mut current: Option<Run> = None;

    for entry in entries {
        let Some(message) = entry.message.as_ref() else {
            continue;
        };
        let Some(role) = message.role else {
            continue;
        };
        let time = entry.time();

        match role {
            Role::ToolResult => {
                match current.as_mut().and_then(|run| run.steps.last_mut()) {
                    Some(step) => attach_tool_result(step, message),
                    // Orphan result with no open step: dropped, not a fault.
                    None => debug!("dropping orphan tool result"),
                }
            }
            Role::User => {
                if let Some(batch) = message.tool_result_batch() {
                    // Result batch, not a trigger: some transports wrap
                    // several tool results in one outer user envelope.
                    if let Some(step) = current.as_mut().and_then(|run| run.steps.last_mut()) {
                        for part in batch {
                            attach_batched_result(step, part);
                        }
                    }
                    continue;
                }

                if let Some(run) = current.take() {
                    if !run.steps.is_empty() {
                        runs.push(finalize_run(run));
                    }
                }
                current = Some(Run::new(time, message.extract_text()));
            }
            Role::Assistant => {
                if let Some(run) = current.as_mut() {
                    observe_assistant(run, message, time);
                }
            }
            Role::Other => {}
        }
    }

    if let Some(run) = current.take() {
        // A trigger that only ever produced API errors is still visible.
        if !run.steps.is_empty() || run.api_errors > 0 {
            runs.push(finalize_run(run));
        }
    }
    runs
}

fn observe_assistant(run: &mut Run, message: &TranscriptMessage, time: Option<DateTime<Utc>>) {
    let Some(usage) = message.usage.as_ref() else {
        return;
    };

    let output = usage.output.unwrap_or(0);
    let total_tokens = usage.total_tokens.unwrap_or(0);
    if total_tokens > 0 || output > 0 {
        let text = message.extract_text();
        let tool_calls = message.tool_calls();
        let cost = usage.cost.clone().unwrap_or_default();

        run.total_cost += cost.total;
        run.total_output += output;
        run.final_context = run.final_context.max(total_tokens);
        run.end_time = time;
        if !text.is_empty() && tool_calls.is_empty() {
            // Last prose-only turn wins as the run's summary.
            run.summary = text.clone();
        }

        run.steps.push(Step {
            time,
            output,
            cache_read: usage.cache_read,
            cache_write: usage.cache_write,
            total_tokens,
            cost: cost.total,
            cost_input: cost.input,
            cost_output: cost.output,
            cost_cache_read: cost.cache_read,
            cost_cache_write: cost.cache_write,
            tool_calls,
            tool_results: Vec::new(),
            result_total_size: 0,
            text,
            model: message.model.clone().unwrap_or_default(),
            duration_ms: None,
        });
    } else if usage.total_tokens == Some(0)
        && usage.output == Some(0)
        && message.is_content_empty()
    {
        // Empty response with explicitly zeroed usage: upstream API error
        // (rate limit, overload, or transient failure). No step is created.
        // A usage object missing those fields is just an incomplete record.
        run.api_errors += 1;
        run.end_time = time;
    }
}

fn attach_tool_result(step: &mut Step, message: &TranscriptMessage) {
    let text = full_text(message.content.as_ref());
    push_result(
        step,
        message.tool_name.as_deref(),
        message.tool_call_id.as_deref(),
        text,
        message.is_error,
    );
}

fn attach_batched_result(step: &mut Step, part: &ContentPart) {
    let ContentPart::ToolResult {
        tool_name,
        tool_call_id,
        content,
        is_error,
    } = part
    else {
        return;
    };
    let text = full_text(content.as_deref());
    push_result(
        step,
        tool_name.as_deref(),
        tool_call_id.as_deref(),
        text,
        *is_error,
    );
}

fn push_result(
    step: &mut Step,
    name: Option<&str>,
    call_id: Option<&str>,
    text: String,
    is_error: bool,
) {
    let size = text.chars().count();
    step.tool_results.push(ToolResult {
        name: name.unwrap_or("?").to_string(),
        call_id: call_id.unwrap_or_default().to_string(),
        size,
        preview: truncate_chars(&text, RESULT_PREVIEW_CHARS),
        is_error,
    });
    step.result_total_size += size;
}

/// Untruncated text of a content payload (result sizes count full length).
fn full_text(content: Option<&MessageContent>) -> String {
    match content {
        Some(MessageContent::Text(text)) => text.clone(),
        Some(MessageContent::Parts(parts)) => parts
            .iter()
            .filter_map(|part| match part {
                ContentPart::Text { text } => Some(text.as_str()),
                _ => None,
            })
            .collect(),
        None => String::new(),
    }
}
