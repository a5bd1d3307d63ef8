use std::collections::{BTreeMap, HashMap};
use std::fs;
use std::path::{Path, PathBuf};

use anyhow::{Context, Result};
use chrono::{DateTime, Days, Local, NaiveDate, Utc};
use pulse_core::read_json_opt;
use pulse_gateway::{GatewayErrorRecord, GatewayLogCorrelator};
use pulse_transcript::{parse_transcript, read_transcript_file, step_has_error, Run};
use serde::{Deserialize, Serialize};
use tracing::debug;

use crate::config::{load_agent_identities, load_budget, BudgetConfig};

const DEFAULT_CONTEXT_TOKENS: u64 = 200_000;
const TREND_DAYS: u64 = 7;

#[derive(Debug, Clone, Serialize)]
#[serde(rename_all = "camelCase")]
/// Per-agent rollup: identity, session metadata, and reconstructed runs.
pub struct AgentSummary {
    pub id: String,
    pub name: String,
    pub emoji: String,
    pub model: String,
    pub context_tokens: u64,
    pub total_tokens: u64,
    pub total_cost: f64,
    pub total_errors: u64,
    pub last_time: u64,
    pub heartbeats: Vec<Run>,
    pub avg_cache_hit: f64,
}

#[derive(Debug, Clone, Serialize)]
#[serde(rename_all = "camelCase")]
/// One day of spend in the recent-days summary.
pub struct DailyCost {
    pub label: String,
    pub cost: f64,
    pub heartbeats: u64,
    pub date: String,
}

#[derive(Debug, Clone, Serialize)]
#[serde(rename_all = "camelCase")]
/// Budget thresholds plus derived spend status.
pub struct BudgetStatus {
    pub daily: f64,
    pub monthly: f64,
    pub today_cost: f64,
    pub avg7: f64,
    pub projected_monthly: f64,
    pub daily_pct: u64,
    pub monthly_pct: u64,
    pub status: String,
}

#[derive(Debug, Clone, Serialize)]
#[serde(rename_all = "camelCase")]
/// One day of the cost trend, oldest first.
pub struct TrendPoint {
    pub date: String,
    pub label: String,
    pub total: f64,
    pub by_agent: BTreeMap<String, f64>,
}

#[derive(Debug, Clone, Serialize)]
#[serde(rename_all = "camelCase")]
/// Totals across all agents.
pub struct OverallStats {
    pub total_agents: usize,
    pub total_cost: f64,
    pub total_heartbeats: usize,
    pub total_errors: u64,
    pub avg_cost_per_heartbeat: f64,
}

#[derive(Debug, Clone, Serialize)]
#[serde(rename_all = "camelCase")]
/// The full response model consumed by the presentation layer.
pub struct DashboardData {
    pub agents: Vec<AgentSummary>,
    pub daily_summary: Vec<DailyCost>,
    pub budget: BudgetStatus,
    pub trend: Vec<TrendPoint>,
    pub gateway_errors: Vec<GatewayErrorRecord>,
}

impl DashboardData {
    pub fn stats(&self) -> OverallStats {
        let total_cost: f64 = self.agents.iter().map(|agent| agent.total_cost).sum();
        let total_heartbeats: usize = self.agents.iter().map(|agent| agent.heartbeats.len()).sum();
        let total_errors: u64 = self.agents.iter().map(|agent| agent.total_errors).sum();
        OverallStats {
            total_agents: self.agents.len(),
            total_cost,
            total_heartbeats,
            total_errors,
            avg_cost_per_heartbeat: if total_heartbeats > 0 {
                total_cost / total_heartbeats as f64
            } else {
                0.0
            },
        }
    }
}

#[derive(Debug, Default, Deserialize)]
#[serde(rename_all = "camelCase")]
/// Registered session metadata from an agent's `sessions.json`.
struct SessionRegistryEntry {
    #[serde(default)]
    session_file: Option<String>,
    #[serde(default)]
    model: Option<String>,
    #[serde(default)]
    context_tokens: Option<u64>,
    #[serde(default)]
    total_tokens: Option<u64>,
    #[serde(default)]
    updated_at: Option<u64>,
}

#[derive(Debug, Default)]
struct DailyRollup {
    costs: HashMap<String, f64>,
    heartbeats: HashMap<String, u64>,
    by_agent: HashMap<String, BTreeMap<String, f64>>,
}

#[derive(Debug)]
/// Public struct `Aggregator` used across Pulse components.
pub struct Aggregator {
    root: PathBuf,
    correlator: GatewayLogCorrelator,
}

impl Aggregator {
    pub fn new(root: impl Into<PathBuf>, log_dir: impl Into<PathBuf>) -> Self {
        let root = root.into();
        let agents_dir = root.join("agents");
        Self {
            root,
            correlator: GatewayLogCorrelator::new(log_dir, agents_dir),
        }
    }

    /// Recomputes the whole model from raw files. No derived state survives
    /// between calls apart from the correlator's short-TTL cache.
    pub fn load_all(&self) -> Result<DashboardData> {
        self.load_all_for(Local::now().date_naive())
    }

    /// Full recompute with an injectable notion of "today".
    pub fn load_all_for(&self, today: NaiveDate) -> Result<DashboardData> {
        let mut agents = Vec::new();
        let mut rollup = DailyRollup::default();

        for identity in load_agent_identities(&self.root) {
            let sessions_dir = self
                .root
                .join("agents")
                .join(&identity.id)
                .join("sessions");
            agents.push(self.load_agent(&identity, &sessions_dir, &mut rollup)?);
        }

        agents.sort_by(|a, b| b.last_time.cmp(&a.last_time));

        let daily_summary = daily_summary(&rollup, today);
        let budget = budget_status(load_budget(&self.root), &rollup, today);
        let trend = trend_points(&rollup, today);
        let gateway_errors = self.correlator.correlate();

        Ok(DashboardData {
            agents,
            daily_summary,
            budget,
            trend,
            gateway_errors,
        })
    }

    fn load_agent(
        &self,
        identity: &crate::config::AgentIdentity,
        sessions_dir: &Path,
        rollup: &mut DailyRollup,
    ) -> Result<AgentSummary> {
        // Keyed iteration order keeps the derived metadata stable between
        // polls when several sessions disagree on model/context size.
        let registry: BTreeMap<String, SessionRegistryEntry> =
            read_json_opt(&sessions_dir.join("sessions.json")).unwrap_or_default();

        let mut model = String::new();
        let mut context_tokens = DEFAULT_CONTEXT_TOKENS;
        let mut total_tokens: u64 = 0;
        let mut last_time: u64 = 0;
        for entry in registry.values() {
            if entry.session_file.is_none() {
                continue;
            }
            match &entry.model {
                Some(value) if !value.is_empty() => model = value.clone(),
                _ => {}
            }
            if let Some(value) = entry.context_tokens {
                context_tokens = value;
            }
            total_tokens = total_tokens.max(entry.total_tokens.unwrap_or(0));
            last_time = last_time.max(entry.updated_at.unwrap_or(0));
        }

        let mut heartbeats = Vec::new();
        let mut total_cost = 0.0;
        let mut total_errors: u64 = 0;
        for transcript in transcript_files(sessions_dir) {
            let entries = read_transcript_file(&transcript).with_context(|| {
                format!("failed to read transcript {}", transcript.display())
            })?;
            for run in parse_transcript(&entries) {
                total_cost += run.total_cost;
                total_errors += run.error_count;
                if let Some(start) = run.start_time {
                    let key = local_date_key(start);
                    *rollup.costs.entry(key.clone()).or_default() += run.total_cost;
                    *rollup.heartbeats.entry(key.clone()).or_default() += 1;
                    *rollup
                        .by_agent
                        .entry(key)
                        .or_default()
                        .entry(identity.id.clone())
                        .or_default() += run.total_cost;
                }
                heartbeats.push(run);
            }
        }
        debug!(agent = %identity.id, runs = heartbeats.len(), "parsed agent transcripts");

        // Newest first for presentation.
        heartbeats.sort_by(|a, b| b.start_time.cmp(&a.start_time));
        let avg_cache_hit = if heartbeats.is_empty() {
            0.0
        } else {
            heartbeats.iter().map(|run| run.cache_hit_rate).sum::<f64>() / heartbeats.len() as f64
        };

        Ok(AgentSummary {
            id: identity.id.clone(),
            name: identity.name.clone(),
            emoji: identity.emoji.clone(),
            model,
            context_tokens,
            total_tokens,
            total_cost,
            total_errors,
            last_time,
            heartbeats,
            avg_cache_hit,
        })
    }
}

/// All append-only transcript files for one agent, registered or not.
fn transcript_files(sessions_dir: &Path) -> Vec<PathBuf> {
    let Ok(entries) = fs::read_dir(sessions_dir) else {
        return Vec::new();
    };
    let mut files: Vec<PathBuf> = entries
        .flatten()
        .map(|entry| entry.path())
        .filter(|path| path.extension().is_some_and(|ext| ext == "jsonl"))
        .collect();
    files.sort();
    files
}

/// Calendar-day rollup key in the local timezone.
pub fn local_date_key(time: DateTime<Utc>) -> String {
    time.with_timezone(&Local).format("%Y-%m-%d").to_string()
}

fn daily_summary(rollup: &DailyRollup, today: NaiveDate) -> Vec<DailyCost> {
    let mut summary = Vec::new();
    for offset in 0..TREND_DAYS {
        let Some(day) = today.checked_sub_days(Days::new(offset)) else {
            continue;
        };
        let key = day.format("%Y-%m-%d").to_string();
        let cost = rollup.costs.get(&key).copied().unwrap_or(0.0);
        let heartbeats = rollup.heartbeats.get(&key).copied().unwrap_or(0);
        let label = match offset {
            0 => "Today".to_string(),
            1 => "Yesterday".to_string(),
            _ => day.format("%a").to_string(),
        };
        if cost > 0.0 || offset < 2 {
            summary.push(DailyCost {
                label,
                cost,
                heartbeats,
                date: key,
            });
        }
    }
    summary
}

fn budget_status(config: BudgetConfig, rollup: &DailyRollup, today: NaiveDate) -> BudgetStatus {
    let today_key = today.format("%Y-%m-%d").to_string();
    let today_cost = rollup.costs.get(&today_key).copied().unwrap_or(0.0);

    let mut last7 = 0.0;
    for offset in 0..TREND_DAYS {
        if let Some(day) = today.checked_sub_days(Days::new(offset)) {
            let key = day.format("%Y-%m-%d").to_string();
            last7 += rollup.costs.get(&key).copied().unwrap_or(0.0);
        }
    }
    let avg7 = last7 / TREND_DAYS as f64;
    let projected_monthly = avg7 * 30.0;

    let status = if config.daily > 0.0 && today_cost > config.daily * 0.9 {
        "over"
    } else if config.daily > 0.0 && today_cost > config.daily * 0.7 {
        "warning"
    } else {
        "ok"
    };

    BudgetStatus {
        daily: config.daily,
        monthly: config.monthly,
        today_cost,
        avg7,
        projected_monthly,
        daily_pct: pct(today_cost, config.daily),
        monthly_pct: pct(projected_monthly, config.monthly),
        status: status.to_string(),
    }
}

fn pct(value: f64, limit: f64) -> u64 {
    if limit > 0.0 {
        (value / limit * 100.0).round() as u64
    } else {
        0
    }
}

fn trend_points(rollup: &DailyRollup, today: NaiveDate) -> Vec<TrendPoint> {
    let mut points = Vec::new();
    for offset in (0..TREND_DAYS).rev() {
        let Some(day) = today.checked_sub_days(Days::new(offset)) else {
            continue;
        };
        let key = day.format("%Y-%m-%d").to_string();
        let label = match offset {
            0 => "Today".to_string(),
            1 => "Yest".to_string(),
            _ => day.format("%a").to_string(),
        };
        points.push(TrendPoint {
            total: rollup.costs.get(&key).copied().unwrap_or(0.0),
            by_agent: rollup.by_agent.get(&key).cloned().unwrap_or_default(),
            date: key,
            label,
        });
    }
    points
}

/// Copy of a run with steps reduced to those carrying a failed tool result.
/// Aggregate fields (costs, counts, flags) are left as computed for the full
/// run.
pub fn filter_run_to_error_steps(run: &Run) -> Run {
    let mut filtered = run.clone();
    filtered.steps = run
        .steps
        .iter()
        .filter(|step| step_has_error(step))
        .cloned()
        .collect();
    filtered
}
