use std::path::Path;

use pulse_core::read_json_opt;
use serde::{Deserialize, Serialize};

/// Config file at the data root naming agents and their identities.
const AGENTS_CONFIG_FILE: &str = "pulse.json";
/// Budget thresholds file at the data root.
const BUDGET_CONFIG_FILE: &str = "budget.json";

const DEFAULT_DAILY_BUDGET: f64 = 5.0;
const DEFAULT_MONTHLY_BUDGET: f64 = 100.0;
const DEFAULT_AGENT_EMOJI: &str = "🤖";
const FALLBACK_AGENT_ID: &str = "main";
const FALLBACK_AGENT_EMOJI: &str = "⚡";

#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
#[serde(rename_all = "camelCase")]
/// Display identity for one configured agent.
pub struct AgentIdentity {
    pub id: String,
    pub name: String,
    pub emoji: String,
}

#[derive(Debug, Clone, Copy, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
/// Spend thresholds used for budget status and projections.
pub struct BudgetConfig {
    pub daily: f64,
    pub monthly: f64,
}

impl Default for BudgetConfig {
    fn default() -> Self {
        Self {
            daily: DEFAULT_DAILY_BUDGET,
            monthly: DEFAULT_MONTHLY_BUDGET,
        }
    }
}

#[derive(Debug, Deserialize)]
struct RootConfig {
    #[serde(default)]
    agents: AgentsSection,
}

#[derive(Debug, Default, Deserialize)]
struct AgentsSection {
    #[serde(default)]
    list: Vec<AgentConfigEntry>,
}

#[derive(Debug, Deserialize)]
struct AgentConfigEntry {
    id: String,
    #[serde(default)]
    identity: Option<IdentitySection>,
}

#[derive(Debug, Deserialize)]
struct IdentitySection {
    #[serde(default)]
    name: Option<String>,
    #[serde(default)]
    emoji: Option<String>,
}

/// Loads the agent identity list, always including the built-in fallback
/// identity when the config is absent or omits it.
pub fn load_agent_identities(root: &Path) -> Vec<AgentIdentity> {
    let mut identities: Vec<AgentIdentity> = Vec::new();
    if let Some(config) = read_json_opt::<RootConfig>(&root.join(AGENTS_CONFIG_FILE)) {
        for entry in config.agents.list {
            let identity = entry.identity.unwrap_or(IdentitySection {
                name: None,
                emoji: None,
            });
            identities.push(AgentIdentity {
                name: identity.name.unwrap_or_else(|| entry.id.clone()),
                emoji: identity
                    .emoji
                    .unwrap_or_else(|| DEFAULT_AGENT_EMOJI.to_string()),
                id: entry.id,
            });
        }
    }
    if !identities.iter().any(|agent| agent.id == FALLBACK_AGENT_ID) {
        identities.push(AgentIdentity {
            id: FALLBACK_AGENT_ID.to_string(),
            name: FALLBACK_AGENT_ID.to_string(),
            emoji: FALLBACK_AGENT_EMOJI.to_string(),
        });
    }
    identities
}

/// Loads budget thresholds, defaulting to fixed constants if absent.
pub fn load_budget(root: &Path) -> BudgetConfig {
    read_json_opt(&root.join(BUDGET_CONFIG_FILE)).unwrap_or_default()
}
