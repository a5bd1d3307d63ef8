//! Aggregation layer: fans the heartbeat parser across all agents, merges
//! gateway error correlation, and computes rollups for status surfaces.
//!
//! All parsing semantics live in `pulse-transcript` and `pulse-gateway`;
//! this crate only fans out, merges, and summarizes.

pub mod aggregate;
pub mod config;
pub mod export;

pub use aggregate::{
    filter_run_to_error_steps, AgentSummary, Aggregator, BudgetStatus, DailyCost, DashboardData,
    OverallStats, TrendPoint,
};
pub use config::{load_agent_identities, load_budget, AgentIdentity, BudgetConfig};
pub use export::{flatten_rows, rows_to_csv, HeartbeatRow, RowFilter};
