//! HTTP surface for Pulse: serves the aggregated telemetry model as JSON.
//!
//! Every request recomputes from the raw transcript and gateway files via
//! `pulse_dashboard::Aggregator`; nothing derived is persisted server-side.

use std::net::SocketAddr;
use std::path::PathBuf;
use std::sync::Arc;

use anyhow::{Context, Result};
use axum::extract::{Path, Query, State};
use axum::http::header::CONTENT_TYPE;
use axum::http::StatusCode;
use axum::response::{IntoResponse, Response};
use axum::routing::get;
use axum::{Json, Router};
use pulse_dashboard::{
    filter_run_to_error_steps, rows_to_csv, Aggregator, DashboardData, RowFilter,
};
use serde::Deserialize;
use serde_json::json;
use tokio::net::TcpListener;
use tracing::error;

const API_DATA_ENDPOINT: &str = "/api/data";
const API_AGENTS_ENDPOINT: &str = "/api/agents";
const API_AGENT_ENDPOINT: &str = "/api/agent/{id}";
const API_HEARTBEATS_ENDPOINT: &str = "/api/heartbeats";
const API_BUDGET_ENDPOINT: &str = "/api/budget";
const API_STATS_ENDPOINT: &str = "/api/stats";
const API_EXPORT_ENDPOINT: &str = "/api/export";

#[derive(Debug, Clone)]
/// Public struct `ServerConfig` used across Pulse components.
pub struct ServerConfig {
    pub bind: String,
    pub root: PathBuf,
    pub log_dir: PathBuf,
}

/// Shared handler state: the aggregator owns the data root and the gateway
/// correlator (with its short-lived parse cache).
pub struct ServerState {
    aggregator: Aggregator,
}

impl ServerState {
    pub fn from_config(config: &ServerConfig) -> Self {
        Self {
            aggregator: Aggregator::new(config.root.clone(), config.log_dir.clone()),
        }
    }
}

pub async fn run_server(config: ServerConfig) -> Result<()> {
    let bind_addr: SocketAddr = config
        .bind
        .parse()
        .with_context(|| format!("invalid --bind '{}': expected host:port", config.bind))?;
    let state = Arc::new(ServerState::from_config(&config));

    let listener = TcpListener::bind(bind_addr)
        .await
        .with_context(|| format!("failed to bind pulse server on {bind_addr}"))?;
    let local_addr = listener
        .local_addr()
        .context("failed to resolve pulse server listen address")?;

    println!(
        "pulse server listening: addr={} root={} log_dir={}",
        local_addr,
        config.root.display(),
        config.log_dir.display()
    );

    let app = build_router(state);
    axum::serve(listener, app)
        .with_graceful_shutdown(async {
            let _ = tokio::signal::ctrl_c().await;
        })
        .await
        .context("pulse server exited unexpectedly")?;
    Ok(())
}

pub fn build_router(state: Arc<ServerState>) -> Router {
    Router::new()
        .route(API_DATA_ENDPOINT, get(handle_data))
        .route(API_AGENTS_ENDPOINT, get(handle_agents))
        .route(API_AGENT_ENDPOINT, get(handle_agent))
        .route(API_HEARTBEATS_ENDPOINT, get(handle_heartbeats))
        .route(API_BUDGET_ENDPOINT, get(handle_budget))
        .route(API_STATS_ENDPOINT, get(handle_stats))
        .route(API_EXPORT_ENDPOINT, get(handle_export))
        .with_state(state)
}

#[derive(Debug, Default, Deserialize)]
#[serde(rename_all = "camelCase")]
/// Query parameters shared by the row-shaped endpoints.
struct RowQuery {
    agent: Option<String>,
    days: Option<i64>,
    #[serde(default)]
    errors_only: bool,
    min_cost: Option<f64>,
    limit: Option<usize>,
    format: Option<String>,
}

impl RowQuery {
    fn filter(&self) -> RowFilter {
        RowFilter {
            agent: self.agent.clone(),
            days: self.days,
            errors_only: self.errors_only,
            min_cost: self.min_cost.unwrap_or(0.0),
            limit: self.limit,
        }
    }
}

fn load(state: &ServerState) -> Result<DashboardData, Response> {
    state.aggregator.load_all().map_err(|err| {
        error!(error = %err, "failed to load telemetry data");
        (
            StatusCode::INTERNAL_SERVER_ERROR,
            Json(json!({ "error": { "message": err.to_string() } })),
        )
            .into_response()
    })
}

async fn handle_data(State(state): State<Arc<ServerState>>) -> Response {
    match load(&state) {
        Ok(data) => Json(data).into_response(),
        Err(response) => response,
    }
}

async fn handle_agents(State(state): State<Arc<ServerState>>) -> Response {
    let data = match load(&state) {
        Ok(data) => data,
        Err(response) => return response,
    };
    // Identity and totals only; full runs live under /api/agent/{id}.
    let agents: Vec<serde_json::Value> = data
        .agents
        .iter()
        .map(|agent| {
            json!({
                "id": agent.id,
                "name": agent.name,
                "emoji": agent.emoji,
                "model": agent.model,
                "totalCost": agent.total_cost,
                "totalErrors": agent.total_errors,
                "heartbeats": agent.heartbeats.len(),
                "lastTime": agent.last_time,
                "avgCacheHit": agent.avg_cache_hit,
            })
        })
        .collect();
    Json(agents).into_response()
}

async fn handle_agent(
    State(state): State<Arc<ServerState>>,
    Path(id): Path<String>,
    Query(query): Query<RowQuery>,
) -> Response {
    let data = match load(&state) {
        Ok(data) => data,
        Err(response) => return response,
    };
    let Some(agent) = data.agents.iter().find(|agent| agent.id == id) else {
        return (
            StatusCode::NOT_FOUND,
            Json(json!({ "error": { "message": format!("unknown agent '{id}'") } })),
        )
            .into_response();
    };
    if query.errors_only {
        let mut trimmed = agent.clone();
        trimmed.heartbeats = agent
            .heartbeats
            .iter()
            .map(filter_run_to_error_steps)
            .filter(|run| !run.steps.is_empty())
            .collect();
        return Json(trimmed).into_response();
    }
    Json(agent).into_response()
}

async fn handle_heartbeats(
    State(state): State<Arc<ServerState>>,
    Query(query): Query<RowQuery>,
) -> Response {
    let data = match load(&state) {
        Ok(data) => data,
        Err(response) => return response,
    };
    Json(pulse_dashboard::flatten_rows(&data, &query.filter())).into_response()
}

async fn handle_budget(State(state): State<Arc<ServerState>>) -> Response {
    match load(&state) {
        Ok(data) => Json(data.budget).into_response(),
        Err(response) => response,
    }
}

async fn handle_stats(State(state): State<Arc<ServerState>>) -> Response {
    match load(&state) {
        Ok(data) => Json(data.stats()).into_response(),
        Err(response) => response,
    }
}

async fn handle_export(
    State(state): State<Arc<ServerState>>,
    Query(query): Query<RowQuery>,
) -> Response {
    let data = match load(&state) {
        Ok(data) => data,
        Err(response) => return response,
    };
    let rows = pulse_dashboard::flatten_rows(&data, &query.filter());
    match query.format.as_deref() {
        Some("csv") => ([(CONTENT_TYPE, "text/csv")], rows_to_csv(&rows)).into_response(),
        _ => Json(rows).into_response(),
    }
}
