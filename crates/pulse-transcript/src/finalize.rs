use std::collections::BTreeMap;

use pulse_core::fmt_size;

use crate::classify::is_error_result;
use crate::describe::browser_label;
use crate::types::{Run, WasteFlag, WasteFlagKind};

/// Steps above this count suggest a runaway loop.
const RUNAWAY_STEP_LIMIT: usize = 30;
/// Cache-hit threshold below which a run of meaningful length gets flagged.
const COLD_CACHE_THRESHOLD: f64 = 0.5;
const COLD_CACHE_MIN_STEPS: usize = 5;
/// One tool result larger than this is usually an unscoped snapshot.
const LARGE_RESULT_CHARS: usize = 10_000;
const BLOATED_CONTEXT_TOKENS: u64 = 50_000;

/// Computes a run's derived fields: durations, error count, browser action
/// breakdown, cache hit rate, and waste flags. Idempotent given identical
/// input; the only step mutation is duration backfill.
pub fn finalize_run(mut run: Run) -> Run {
    if let (Some(start), Some(end)) = (run.start_time, run.end_time) {
        run.duration_ms = Some((end - start).num_milliseconds());
    }

    for index in 0..run.steps.len() {
        let next_time = run.steps.get(index + 1).and_then(|next| next.time);
        let step = &mut run.steps[index];
        if let (Some(time), Some(next)) = (step.time, next_time) {
            step.duration_ms = Some((next - time).num_milliseconds());
        }
    }
    if let Some(end) = run.end_time {
        if let Some(last) = run.steps.last_mut() {
            if last.duration_ms.is_none() {
                if let Some(time) = last.time {
                    last.duration_ms = Some((end - time).num_milliseconds());
                }
            }
        }
    }

    let tool_errors: u64 = run
        .steps
        .iter()
        .flat_map(|step| step.tool_results.iter())
        .filter(|result| is_error_result(result))
        .count() as u64;
    run.error_count = tool_errors + run.api_errors;

    let mut breakdown: BTreeMap<String, u64> = BTreeMap::new();
    for step in &run.steps {
        for call in &step.tool_calls {
            if call.name == "browser" {
                *breakdown.entry(browser_label(&call.arguments)).or_default() += 1;
            }
        }
    }
    run.browser_breakdown = breakdown;

    // Cache hit rate. Exact input counts are not recorded, so input is
    // approximated from usage totals (total - output - cacheRead - cacheWrite).
    let mut total_cache_read: u64 = 0;
    let mut total_input: u64 = 0;
    for step in &run.steps {
        total_cache_read += step.cache_read;
        total_input += step
            .total_tokens
            .saturating_sub(step.output)
            .saturating_sub(step.cache_read)
            .saturating_sub(step.cache_write);
    }
    run.cache_hit_rate = if total_cache_read + total_input > 0 {
        total_cache_read as f64 / (total_cache_read + total_input) as f64
    } else {
        0.0
    };

    run.waste_flags = waste_flags(&run);
    run
}

/// Independently evaluated heuristics, each firing at most once per run.
fn waste_flags(run: &Run) -> Vec<WasteFlag> {
    let mut flags = Vec::new();

    if run.steps.len() > RUNAWAY_STEP_LIMIT {
        flags.push(WasteFlag {
            kind: WasteFlagKind::Runaway,
            msg: format!("{} steps (likely runaway loop)", run.steps.len()),
        });
    }

    if run.cache_hit_rate < COLD_CACHE_THRESHOLD && run.steps.len() > COLD_CACHE_MIN_STEPS {
        flags.push(WasteFlag {
            kind: WasteFlagKind::Cache,
            msg: format!(
                "{}% cache hit (cold start or drift)",
                (run.cache_hit_rate * 100.0).round() as i64
            ),
        });
    }

    if let Some(step) = run
        .steps
        .iter()
        .find(|step| step.result_total_size > LARGE_RESULT_CHARS)
    {
        flags.push(WasteFlag {
            kind: WasteFlagKind::LargeResult,
            msg: format!(
                "Step with {} result (unscoped snapshot?)",
                fmt_size(step.result_total_size)
            ),
        });
    }

    if let Some(step) = run
        .steps
        .iter()
        .find(|step| step.total_tokens > BLOATED_CONTEXT_TOKENS)
    {
        flags.push(WasteFlag {
            kind: WasteFlagKind::BloatedCtx,
            msg: format!("Step with {} context (bloated)", step.total_tokens),
        });
    }

    flags
}
