//! Flat export rows for Pulse heartbeat data.
//!
//! Consumers outside the dashboard (spreadsheets, ad-hoc scripts) want one
//! record per heartbeat rather than the nested per-agent model, so this
//! module flattens, filters, and renders runs to JSON rows or CSV.

use chrono::{DateTime, Duration, Local, Utc};
use serde::Serialize;

use crate::aggregate::DashboardData;

#[derive(Debug, Clone, Serialize)]
#[serde(rename_all = "camelCase")]
/// One heartbeat flattened for export.
pub struct HeartbeatRow {
    pub agent: String,
    pub agent_name: String,
    pub date: String,
    pub time: String,
    pub cost: f64,
    pub steps: usize,
    pub errors: u64,
    pub cache_hit_pct: u64,
    pub context: u64,
    pub duration_ms: Option<i64>,
}

#[derive(Debug, Clone, Default)]
/// Row selection for exports. All criteria combine with AND.
pub struct RowFilter {
    pub agent: Option<String>,
    pub days: Option<i64>,
    pub errors_only: bool,
    pub min_cost: f64,
    pub limit: Option<usize>,
}

/// Flattens every agent's heartbeats into export rows, newest first.
pub fn flatten_rows(data: &DashboardData, filter: &RowFilter) -> Vec<HeartbeatRow> {
    flatten_rows_at(data, filter, Utc::now())
}

/// Flattening with an injectable "now" for the days cutoff.
pub fn flatten_rows_at(
    data: &DashboardData,
    filter: &RowFilter,
    now: DateTime<Utc>,
) -> Vec<HeartbeatRow> {
    let cutoff = filter.days.map(|days| now - Duration::days(days));
    let mut rows = Vec::new();

    for agent in &data.agents {
        if let Some(wanted) = &filter.agent {
            if &agent.id != wanted {
                continue;
            }
        }
        for run in &agent.heartbeats {
            let Some(start) = run.start_time else {
                continue;
            };
            if let Some(cutoff) = cutoff {
                if start < cutoff {
                    continue;
                }
            }
            // error_count includes API errors, which never show up as a
            // failed tool result on any step.
            if filter.errors_only && run.error_count == 0 {
                continue;
            }
            if run.total_cost < filter.min_cost {
                continue;
            }
            let local = start.with_timezone(&Local);
            rows.push(HeartbeatRow {
                agent: agent.id.clone(),
                agent_name: agent.name.clone(),
                date: local.format("%Y-%m-%d").to_string(),
                time: local.format("%H:%M:%S").to_string(),
                cost: run.total_cost,
                steps: run.steps.len(),
                errors: run.error_count,
                cache_hit_pct: (run.cache_hit_rate * 100.0).round() as u64,
                context: run.final_context,
                duration_ms: run.duration_ms,
            });
        }
    }

    rows.sort_by(|a, b| (&b.date, &b.time).cmp(&(&a.date, &a.time)));
    if let Some(limit) = filter.limit {
        rows.truncate(limit);
    }
    rows
}

/// Renders rows as CSV with a fixed header. Fields are numeric or
/// date-shaped except the agent id, which is quoted when it needs escaping.
pub fn rows_to_csv(rows: &[HeartbeatRow]) -> String {
    let mut out = String::from("agent,date,time,cost,steps,errors,cacheHitPct,context,durationMs\n");
    for row in rows {
        out.push_str(&format!(
            "{},{},{},{:.4},{},{},{},{},{}\n",
            csv_field(&row.agent),
            row.date,
            row.time,
            row.cost,
            row.steps,
            row.errors,
            row.cache_hit_pct,
            row.context,
            row.duration_ms.map(|ms| ms.to_string()).unwrap_or_default(),
        ));
    }
    out
}

fn csv_field(value: &str) -> String {
    if value.contains(',') || value.contains('"') || value.contains('\n') {
        format!("\"{}\"", value.replace('"', "\"\""))
    } else {
        value.to_string()
    }
}
