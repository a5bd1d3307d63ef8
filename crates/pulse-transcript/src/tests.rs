use std::io::Write;

use serde_json::{json, Value};

use super::*;

fn entries(values: Vec<Value>) -> Vec<TranscriptEntry> {
    entries_from_values(values)
}

fn user(time: &str, text: &str) -> Value {
    json!({
        "timestamp": time,
        "message": { "role": "user", "content": text }
    })
}

fn assistant(time: &str, total_tokens: u64, output: u64, content: Value) -> Value {
    json!({
        "timestamp": time,
        "message": {
            "role": "assistant",
            "content": content,
            "usage": {
                "output": output,
                "cacheRead": 0,
                "cacheWrite": 0,
                "totalTokens": total_tokens,
                "cost": { "total": 0.01, "input": 0.004, "output": 0.006 }
            }
        }
    })
}

fn tool_result(time: &str, text: &str, is_error: bool) -> Value {
    json!({
        "timestamp": time,
        "message": {
            "role": "toolResult",
            "toolName": "write",
            "toolCallId": "call-1",
            "isError": is_error,
            "content": text
        }
    })
}

fn write_call(text: &str) -> Value {
    json!([
        { "type": "text", "text": text },
        { "type": "toolCall", "id": "call-1", "name": "write", "arguments": { "file_path": "src/fix.rs" } }
    ])
}

#[test]
fn single_run_with_api_error_scenario() {
    let runs = parse_transcript(&entries(vec![
        user("2026-02-11T08:00:00Z", "fix bug"),
        assistant("2026-02-11T08:00:05Z", 500, 50, write_call("patching")),
        tool_result("2026-02-11T08:00:06Z", "ok", false),
        assistant("2026-02-11T08:00:09Z", 0, 0, json!([])),
    ]));

    assert_eq!(runs.len(), 1);
    let run = &runs[0];
    assert_eq!(run.steps.len(), 1);
    assert_eq!(run.api_errors, 1);
    // One API error, zero tool errors ("ok" does not classify).
    assert_eq!(run.error_count, 1);
    assert!(run.waste_flags.is_empty());
    assert_eq!(run.trigger, "fix bug");
    assert_eq!(run.steps[0].tool_results.len(), 1);
    assert_eq!(run.steps[0].result_total_size, 2);
}

#[test]
fn runaway_run_with_hot_cache_flags_runaway_only() {
    let mut values = vec![user("2026-02-11T09:00:00Z", "crawl the site")];
    for index in 0..35 {
        values.push(json!({
            "timestamp": format!("2026-02-11T09:00:{:02}Z", index + 1),
            "message": {
                "role": "assistant",
                "content": [{ "type": "text", "text": "step" }],
                "usage": {
                    "output": 10,
                    "cacheRead": 900,
                    "cacheWrite": 0,
                    "totalTokens": 1010,
                    "cost": { "total": 0.001 }
                }
            }
        }));
    }

    let runs = parse_transcript(&entries(values));
    assert_eq!(runs.len(), 1);
    let kinds: Vec<_> = runs[0].waste_flags.iter().map(|flag| flag.kind).collect();
    assert_eq!(kinds, vec![WasteFlagKind::Runaway]);
    // 900 cache / (900 + 100 input) per step.
    assert!((runs[0].cache_hit_rate - 0.9).abs() < 1e-9);
}

#[test]
fn emitted_runs_always_have_steps_or_api_errors() {
    // Trigger with no assistant activity at all: nothing is emitted.
    let runs = parse_transcript(&entries(vec![
        user("2026-02-11T08:00:00Z", "hello"),
        user("2026-02-11T08:01:00Z", "hello again"),
    ]));
    assert!(runs.is_empty());

    // Trigger that only produced API errors is emitted at end of stream.
    let runs = parse_transcript(&entries(vec![
        user("2026-02-11T08:00:00Z", "please run"),
        assistant("2026-02-11T08:00:02Z", 0, 0, json!([])),
        assistant("2026-02-11T08:00:04Z", 0, 0, json!([])),
    ]));
    assert_eq!(runs.len(), 1);
    assert!(runs[0].steps.is_empty());
    assert_eq!(runs[0].api_errors, 2);
    assert_eq!(runs[0].error_count, 2);
    for run in &runs {
        assert!(!run.steps.is_empty() || run.api_errors > 0);
    }
}

#[test]
fn start_time_never_exceeds_end_time() {
    let runs = parse_transcript(&entries(vec![
        user("2026-02-11T08:00:00Z", "task"),
        assistant("2026-02-11T08:00:10Z", 100, 10, json!([{ "type": "text", "text": "done" }])),
    ]));
    let run = &runs[0];
    assert!(run.start_time.unwrap() <= run.end_time.unwrap());
    assert_eq!(run.duration_ms, Some(10_000));
}

#[test]
fn step_durations_backfill_from_successor_and_run_end() {
    let runs = parse_transcript(&entries(vec![
        user("2026-02-11T08:00:00Z", "task"),
        assistant("2026-02-11T08:00:05Z", 100, 10, write_call("first")),
        assistant("2026-02-11T08:00:11Z", 200, 10, json!([{ "type": "text", "text": "done" }])),
    ]));
    let steps = &runs[0].steps;
    assert_eq!(steps[0].duration_ms, Some(6_000));
    // Last step closes against the run end time (its own timestamp).
    assert_eq!(steps[1].duration_ms, Some(0));
}

#[test]
fn cache_hit_rate_stays_in_unit_interval_and_zeroes_without_reads() {
    let runs = parse_transcript(&entries(vec![
        user("2026-02-11T08:00:00Z", "task"),
        json!({
            "timestamp": "2026-02-11T08:00:01Z",
            "message": {
                "role": "assistant",
                "content": [{ "type": "text", "text": "all output" }],
                // output == totalTokens: approximated input is zero.
                "usage": { "output": 50, "totalTokens": 50 }
            }
        }),
    ]));
    assert_eq!(runs[0].cache_hit_rate, 0.0);
    assert!(runs[0].cache_hit_rate >= 0.0 && runs[0].cache_hit_rate <= 1.0);
}

#[test]
fn large_result_and_bloated_context_fire_once_each() {
    let mut values = vec![user("2026-02-11T08:00:00Z", "snapshot everything")];
    for index in 0..3 {
        values.push(json!({
            "timestamp": format!("2026-02-11T08:00:{:02}Z", index + 1),
            "message": {
                "role": "assistant",
                "content": write_call("snap"),
                "usage": { "output": 10, "totalTokens": 60_000 }
            }
        }));
        values.push(tool_result(
            &format!("2026-02-11T08:00:{:02}Z", index + 1),
            &"x".repeat(11_000),
            false,
        ));
    }

    let runs = parse_transcript(&entries(values));
    let flags = &runs[0].waste_flags;
    let large = flags
        .iter()
        .filter(|flag| flag.kind == WasteFlagKind::LargeResult)
        .count();
    let bloated = flags
        .iter()
        .filter(|flag| flag.kind == WasteFlagKind::BloatedCtx)
        .count();
    assert_eq!(large, 1);
    assert_eq!(bloated, 1);
}

#[test]
fn batched_user_tool_results_attach_instead_of_triggering() {
    let runs = parse_transcript(&entries(vec![
        user("2026-02-11T08:00:00Z", "task"),
        assistant("2026-02-11T08:00:01Z", 100, 10, write_call("working")),
        json!({
            "timestamp": "2026-02-11T08:00:02Z",
            "message": {
                "role": "user",
                "content": [
                    {
                        "type": "toolResult",
                        "toolName": "write",
                        "toolCallId": "call-1",
                        "isError": false,
                        "content": [{ "type": "text", "text": "written 42 bytes" }]
                    },
                    {
                        "type": "toolResult",
                        "toolName": "read",
                        "toolCallId": "call-2",
                        "isError": true,
                        "content": "ENOENT"
                    }
                ]
            }
        }),
    ]));

    assert_eq!(runs.len(), 1);
    let step = &runs[0].steps[0];
    assert_eq!(step.tool_results.len(), 2);
    assert_eq!(step.result_total_size, "written 42 bytes".len() + "ENOENT".len());
    assert_eq!(runs[0].error_count, 1);
}

#[test]
fn orphans_and_pre_trigger_noise_are_dropped() {
    let runs = parse_transcript(&entries(vec![
        tool_result("2026-02-11T07:59:59Z", "stale", false),
        assistant("2026-02-11T07:59:59Z", 500, 10, json!([{ "type": "text", "text": "noise" }])),
        user("2026-02-11T08:00:00Z", "real work"),
        assistant("2026-02-11T08:00:01Z", 100, 10, json!([{ "type": "text", "text": "ok" }])),
    ]));
    assert_eq!(runs.len(), 1);
    assert_eq!(runs[0].steps.len(), 1);
    assert_eq!(runs[0].trigger, "real work");
}

#[test]
fn trigger_and_summary_are_truncated_prose() {
    let long = "a".repeat(400);
    let runs = parse_transcript(&entries(vec![
        user("2026-02-11T08:00:00Z", &long),
        assistant("2026-02-11T08:00:01Z", 100, 10, write_call("tooling")),
        assistant("2026-02-11T08:00:02Z", 120, 10, json!([{ "type": "text", "text": "first summary" }])),
        assistant("2026-02-11T08:00:03Z", 130, 10, json!([{ "type": "text", "text": "final summary" }])),
    ]));
    let run = &runs[0];
    assert_eq!(run.trigger.chars().count(), 140);
    // Last prose-only turn wins.
    assert_eq!(run.summary, "final summary");
    assert_eq!(run.final_context, 130);
}

#[test]
fn second_trigger_closes_previous_run() {
    let runs = parse_transcript(&entries(vec![
        user("2026-02-11T08:00:00Z", "first"),
        assistant("2026-02-11T08:00:01Z", 100, 10, json!([{ "type": "text", "text": "one" }])),
        user("2026-02-11T08:05:00Z", "second"),
        assistant("2026-02-11T08:05:01Z", 100, 10, json!([{ "type": "text", "text": "two" }])),
    ]));
    assert_eq!(runs.len(), 2);
    assert_eq!(runs[0].trigger, "first");
    assert_eq!(runs[1].trigger, "second");
}

#[test]
fn paired_results_use_call_id_then_first_fit() {
    let runs = parse_transcript(&entries(vec![
        user("2026-02-11T08:00:00Z", "task"),
        json!({
            "timestamp": "2026-02-11T08:00:01Z",
            "message": {
                "role": "assistant",
                "content": [
                    { "type": "toolCall", "id": "a", "name": "read", "arguments": {} },
                    { "type": "toolCall", "id": "b", "name": "grep", "arguments": {} }
                ],
                "usage": { "output": 10, "totalTokens": 100 }
            }
        }),
        // Result without a matching id lands on the oldest unmatched call.
        json!({
            "timestamp": "2026-02-11T08:00:02Z",
            "message": { "role": "toolResult", "toolName": "read", "content": "anon" }
        }),
        json!({
            "timestamp": "2026-02-11T08:00:03Z",
            "message": { "role": "toolResult", "toolName": "grep", "toolCallId": "b", "content": "hit" }
        }),
    ]));

    let step = &runs[0].steps[0];
    let pairs = step.paired_results();
    assert_eq!(pairs.len(), 2);
    assert_eq!(pairs[0].0.unwrap().id, "a");
    assert_eq!(pairs[0].1.unwrap().preview, "anon");
    assert_eq!(pairs[1].0.unwrap().id, "b");
    assert_eq!(pairs[1].1.unwrap().preview, "hit");
}

#[test]
fn read_transcript_file_tolerates_malformed_lines() {
    let tempdir = tempfile::tempdir().expect("tempdir");
    let path = tempdir.path().join("session.jsonl");
    {
        let mut file = std::fs::File::create(&path).expect("create");
        writeln!(file, "{}", user("2026-02-11T08:00:00Z", "task")).expect("write");
        writeln!(file, "%% corrupted line %%").expect("write");
        writeln!(
            file,
            "{}",
            assistant("2026-02-11T08:00:01Z", 100, 10, json!([{ "type": "text", "text": "ok" }]))
        )
        .expect("write");
    }

    let entries = read_transcript_file(&path).expect("read");
    let runs = parse_transcript(&entries);
    assert_eq!(runs.len(), 1);
    assert_eq!(runs[0].steps.len(), 1);

    let missing = read_transcript_file(&tempdir.path().join("absent.jsonl")).expect("read");
    assert!(missing.is_empty());
}

#[test]
fn unknown_content_parts_and_roles_are_ignored() {
    let runs = parse_transcript(&entries(vec![
        json!({
            "timestamp": "2026-02-11T08:00:00Z",
            "message": { "role": "system", "content": "boot banner" }
        }),
        user("2026-02-11T08:00:01Z", "task"),
        json!({
            "timestamp": "2026-02-11T08:00:02Z",
            "message": {
                "role": "assistant",
                "content": [
                    { "type": "thinking", "thinking": "hmm" },
                    { "type": "text", "text": "visible" }
                ],
                "usage": { "output": 5, "totalTokens": 50 }
            }
        }),
    ]));
    assert_eq!(runs.len(), 1);
    assert_eq!(runs[0].steps[0].text, "visible");
}

#[test]
fn duplicate_call_ids_keep_both_results_in_pairs() {
    let runs = parse_transcript(&entries(vec![
        user("2026-02-11T08:00:00Z", "task"),
        json!({
            "timestamp": "2026-02-11T08:00:01Z",
            "message": {
                "role": "assistant",
                "content": [
                    { "type": "toolCall", "id": "a", "name": "bash", "arguments": {} }
                ],
                "usage": { "output": 10, "totalTokens": 100 }
            }
        }),
        json!({
            "timestamp": "2026-02-11T08:00:02Z",
            "message": { "role": "toolResult", "toolName": "bash", "toolCallId": "a", "content": "first" }
        }),
        json!({
            "timestamp": "2026-02-11T08:00:03Z",
            "message": { "role": "toolResult", "toolName": "bash", "toolCallId": "a", "content": "second" }
        }),
    ]));

    let step = &runs[0].steps[0];
    let pairs = step.paired_results();
    // The call takes the first result; the duplicate stays visible unpaired.
    assert_eq!(pairs.len(), 2);
    assert_eq!(pairs[0].0.unwrap().id, "a");
    assert_eq!(pairs[0].1.unwrap().preview, "first");
    assert!(pairs[1].0.is_none());
    assert_eq!(pairs[1].1.unwrap().preview, "second");
}

#[test]
fn bare_usage_object_is_not_an_api_error() {
    let runs = parse_transcript(&entries(vec![
        user("2026-02-11T08:00:00Z", "task"),
        assistant("2026-02-11T08:00:01Z", 100, 10, json!([{ "type": "text", "text": "ok" }])),
        // Empty content with a usage object that never reports token counts;
        // an incomplete record, not a failed turn.
        json!({
            "timestamp": "2026-02-11T08:00:02Z",
            "message": { "role": "assistant", "content": [], "usage": {} }
        }),
        // Explicit zeros are a failed turn.
        assistant("2026-02-11T08:00:03Z", 0, 0, json!([])),
    ]));

    assert_eq!(runs.len(), 1);
    assert_eq!(runs[0].api_errors, 1);
    assert_eq!(runs[0].error_count, 1);
    assert_eq!(runs[0].steps.len(), 1);
}
