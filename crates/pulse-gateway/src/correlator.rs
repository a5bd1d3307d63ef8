use std::collections::BTreeMap;
use std::path::{Path, PathBuf};
use std::sync::Mutex;

use chrono::{DateTime, Local, NaiveDate, Utc};
use once_cell::sync::Lazy;
use pulse_core::{current_unix_timestamp_ms, is_expired_unix_ms, parse_timestamp, read_jsonl_values};
use regex::Regex;
use serde::Serialize;
use serde_json::Value;
use tracing::warn;

/// Correlation results are cached this long to bound I/O under polling.
pub const GATEWAY_CACHE_TTL_MS: u64 = 10_000;

static LANE_DEQUEUE: Lazy<Regex> = Lazy::new(|| {
    Regex::new(r"lane dequeue: lane=session:agent:([^:]+):").expect("regex: lane dequeue")
});
static LANE_DONE: Lazy<Regex> = Lazy::new(|| {
    Regex::new(r"lane task done: lane=session:agent:([^:]+):").expect("regex: lane done")
});
static RUN_ERROR: Lazy<Regex> = Lazy::new(|| {
    Regex::new(r"embedded run agent end: runId=([a-f0-9-]+) isError=true")
        .expect("regex: run error")
});
static RUN_DONE: Lazy<Regex> = Lazy::new(|| {
    Regex::new(r"embedded run done: runId=([a-f0-9-]+) sessionId=([a-f0-9-]+) durationMs=(\d+)")
        .expect("regex: run done")
});
static BROWSER_ERROR: Lazy<Regex> = Lazy::new(|| {
    Regex::new(r"res ✗ browser\.request (\d+)ms errorCode=(\w+) errorMessage=(.+?)(?:\s+conn=|$)")
        .expect("regex: browser error")
});

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
#[serde(rename_all = "lowercase")]
/// Enumerates supported `GatewayErrorKind` values.
pub enum GatewayErrorKind {
    Api,
    Browser,
    System,
}

#[derive(Debug, Clone, PartialEq, Serialize)]
#[serde(rename_all = "camelCase")]
/// One attributed (or unattributed) error observed in the gateway log.
pub struct GatewayErrorRecord {
    pub time: Option<DateTime<Utc>>,
    #[serde(rename = "type")]
    pub kind: GatewayErrorKind,
    pub agent_id: Option<String>,
    pub msg: String,
    pub detail: String,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub retry_count: Option<u64>,
}

/// Accumulating error state for one runId while scanning the log.
#[derive(Debug, Default)]
struct RunErrorState {
    count: u64,
    first_time: Option<DateTime<Utc>>,
    last_time: Option<DateTime<Utc>>,
    agent_id: Option<String>,
    session_id: Option<String>,
    duration_ms: Option<u64>,
}

#[derive(Debug, Clone)]
struct CachedErrors {
    computed_at_unix_ms: u64,
    records: Vec<GatewayErrorRecord>,
}

#[derive(Debug)]
/// Public struct `GatewayLogCorrelator` used across Pulse components.
pub struct GatewayLogCorrelator {
    log_dir: PathBuf,
    agents_dir: PathBuf,
    ttl_ms: u64,
    cache: Mutex<Option<CachedErrors>>,
}

impl GatewayLogCorrelator {
    pub fn new(log_dir: impl Into<PathBuf>, agents_dir: impl Into<PathBuf>) -> Self {
        Self {
            log_dir: log_dir.into(),
            agents_dir: agents_dir.into(),
            ttl_ms: GATEWAY_CACHE_TTL_MS,
            cache: Mutex::new(None),
        }
    }

    /// Correlates the current day's gateway log, serving the cached result
    /// when it is still inside the TTL window.
    ///
    /// A missing or unreadable log file yields an empty list; callers treat
    /// "no data" and "no errors" identically.
    pub fn correlate(&self) -> Vec<GatewayErrorRecord> {
        self.correlate_for(Local::now().date_naive(), current_unix_timestamp_ms())
    }

    /// Cache-aware correlation with injectable date and clock.
    pub fn correlate_for(&self, date: NaiveDate, now_unix_ms: u64) -> Vec<GatewayErrorRecord> {
        let mut cache = match self.cache.lock() {
            Ok(guard) => guard,
            Err(poisoned) => poisoned.into_inner(),
        };
        if let Some(cached) = cache.as_ref() {
            if !is_expired_unix_ms(cached.computed_at_unix_ms, self.ttl_ms, now_unix_ms) {
                return cached.records.clone();
            }
        }

        let records = self.scan_log(&self.log_path_for(date));
        *cache = Some(CachedErrors {
            computed_at_unix_ms: now_unix_ms,
            records: records.clone(),
        });
        records
    }

    /// Path of the gateway log for one calendar date.
    pub fn log_path_for(&self, date: NaiveDate) -> PathBuf {
        self.log_dir
            .join(format!("pulse-{}.log", date.format("%Y-%m-%d")))
    }

    fn scan_log(&self, log_path: &Path) -> Vec<GatewayErrorRecord> {
        let lines = match read_jsonl_values(log_path) {
            Ok(lines) => lines,
            Err(error) => {
                warn!("gateway log unreadable, treating as empty: {error:#}");
                return Vec::new();
            }
        };

        // Lane window: agentId -> most recent activation time. Entries leave
        // on the matching deactivation. Single-active-lane attribution is a
        // documented best-effort heuristic; it is unsound under genuinely
        // concurrent multi-agent activity.
        let mut lanes: BTreeMap<String, DateTime<Utc>> = BTreeMap::new();
        let mut run_errors: BTreeMap<String, RunErrorState> = BTreeMap::new();
        let mut records = Vec::new();

        for line in lines {
            let Some(msg) = line_message(&line) else {
                continue;
            };
            let time = line_time(&line);

            if let Some(captures) = LANE_DEQUEUE.captures(msg) {
                if let Some(time) = time {
                    lanes.insert(captures[1].to_string(), time);
                }
                continue;
            }
            if let Some(captures) = LANE_DONE.captures(msg) {
                lanes.remove(&captures[1]);
                continue;
            }

            if let Some(captures) = RUN_ERROR.captures(msg) {
                let run_id = captures[1].to_string();
                let state = run_errors.entry(run_id).or_insert_with(|| RunErrorState {
                    first_time: time,
                    agent_id: attribute_to_lane(&lanes, time),
                    ..RunErrorState::default()
                });
                state.count += 1;
                state.last_time = time;
                continue;
            }

            if let Some(captures) = RUN_DONE.captures(msg) {
                if let Some(state) = run_errors.get_mut(&captures[1]) {
                    state.session_id = Some(captures[2].to_string());
                    state.duration_ms = captures[3].parse().ok();
                    if state.agent_id.is_none() {
                        state.agent_id = self.agent_for_session(&captures[2]);
                    }
                }
                continue;
            }

            if let Some(captures) = BROWSER_ERROR.captures(msg) {
                let duration_ms: u64 = captures[1].parse().unwrap_or(0);
                let code = &captures[2];
                let message: String = captures[3].trim().chars().take(150).collect();
                records.push(GatewayErrorRecord {
                    time,
                    kind: GatewayErrorKind::Browser,
                    agent_id: None,
                    msg: format!("Browser CDP: {code}: {message}"),
                    detail: format!("{duration_ms}ms timeout"),
                    retry_count: None,
                });
            }
        }

        for (run_id, state) in run_errors {
            if state.count == 0 {
                continue;
            }
            records.push(GatewayErrorRecord {
                time: state.first_time,
                kind: GatewayErrorKind::Api,
                agent_id: state.agent_id,
                msg: classify_retries(state.count, state.duration_ms),
                detail: format!(
                    "runId: {}… ({} error{})",
                    run_id.chars().take(8).collect::<String>(),
                    state.count,
                    if state.count > 1 { "s" } else { "" }
                ),
                retry_count: Some(state.count),
            });
        }

        // Newest first; records without a timestamp sort last.
        records.sort_by(|a, b| b.time.cmp(&a.time));
        records
    }

    /// Fallback sessionId -> agent resolution: the agent owning a transcript
    /// file named after the session.
    fn agent_for_session(&self, session_id: &str) -> Option<String> {
        let entries = std::fs::read_dir(&self.agents_dir).ok()?;
        for entry in entries.flatten() {
            let candidate = entry
                .path()
                .join("sessions")
                .join(format!("{session_id}.jsonl"));
            if candidate.exists() {
                return Some(entry.file_name().to_string_lossy().to_string());
            }
        }
        None
    }
}

/// Picks the agent whose lane activation is the latest not exceeding the
/// error time. A strictly greater activation replaces the running best, so
/// equal timestamps keep the first candidate in scan order.
fn attribute_to_lane(
    lanes: &BTreeMap<String, DateTime<Utc>>,
    error_time: Option<DateTime<Utc>>,
) -> Option<String> {
    let error_time = error_time?;
    let mut best: Option<(&str, DateTime<Utc>)> = None;
    for (agent_id, activated_at) in lanes {
        if *activated_at > error_time {
            continue;
        }
        match best {
            Some((_, best_time)) if *activated_at <= best_time => {}
            _ => best = Some((agent_id, *activated_at)),
        }
    }
    best.map(|(agent_id, _)| agent_id.to_string())
}

fn classify_retries(count: u64, duration_ms: Option<u64>) -> String {
    let mut msg = if count >= 3 {
        format!("API: {count} consecutive failures (likely rate limit or overloaded)")
    } else if count == 2 {
        "API: 2 retries (transient error)".to_string()
    } else {
        "API: single error (transient)".to_string()
    };
    if let Some(duration_ms) = duration_ms {
        msg.push_str(&format!(
            ", session {}s",
            (duration_ms as f64 / 1000.0).round() as u64
        ));
    }
    msg
}

/// Gateway log lines store the message under positional key "1" or "0".
fn line_message(line: &Value) -> Option<&str> {
    line.get("1")
        .and_then(Value::as_str)
        .or_else(|| line.get("0").and_then(Value::as_str))
}

/// Timestamp from `_meta.date`, falling back to a top-level `time` field.
fn line_time(line: &Value) -> Option<DateTime<Utc>> {
    line.get("_meta")
        .and_then(|meta| meta.get("date"))
        .and_then(Value::as_str)
        .or_else(|| line.get("time").and_then(Value::as_str))
        .and_then(parse_timestamp)
}
