use std::fmt;

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use serde_json::{Map, Value};

/// The closed set of built-in tools.
#[derive(
    Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize,
)]
#[serde(rename_all = "snake_case")]
pub enum ToolName {
    Calculator,
    WebSearch,
    AmapWeather,
}

impl ToolName {
    pub const ALL: [ToolName; 3] = [
        ToolName::Calculator,
        ToolName::WebSearch,
        ToolName::AmapWeather,
    ];

    pub fn as_str(&self) -> &'static str {
        match self {
            ToolName::Calculator => "calculator",
            ToolName::WebSearch => "web_search",
            ToolName::AmapWeather => "amap_weather",
        }
    }

    pub fn parse(raw: &str) -> Option<ToolName> {
        match raw {
            "calculator" => Some(ToolName::Calculator),
            "web_search" => Some(ToolName::WebSearch),
            "amap_weather" => Some(ToolName::AmapWeather),
            _ => None,
        }
    }
}

impl fmt::Display for ToolName {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

/// The subset of a registry descriptor selected for one agent.
/// `parameters` is normalized against the tool's schema before storage.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct ToolConfig {
    pub name: ToolName,
    pub description: String,
    #[serde(default)]
    pub parameters: Map<String, Value>,
}

/// A persisted agent. Immutable after creation: evolving an agent means
/// creating a new one.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct AgentDefinition {
    pub agent_id: String,
    pub name: String,
    pub description: String,
    pub prompt: String,
    pub tools: Vec<ToolConfig>,
    pub created_at: DateTime<Utc>,
    #[serde(default)]
    pub is_composite: bool,
    #[serde(default)]
    pub sub_agents: Vec<SubAgentSummary>,
}

impl AgentDefinition {
    /// List-view projection: drops the prompt and the tool parameter details.
    pub fn summary(&self) -> AgentSummary {
        AgentSummary {
            agent_id: self.agent_id.clone(),
            name: self.name.clone(),
            description: self.description.clone(),
            tools: self.tools.iter().map(|tool| tool.name).collect(),
            created_at: self.created_at,
            is_composite: self.is_composite,
        }
    }
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct AgentSummary {
    pub agent_id: String,
    pub name: String,
    pub description: String,
    pub tools: Vec<ToolName>,
    pub created_at: DateTime<Utc>,
    #[serde(default)]
    pub is_composite: bool,
}

/// A lightweight sub-agent reference inside a composite agent.
/// `agent_id` stays empty unless the sub-agent is materialized on its own.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct SubAgentSummary {
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub agent_id: Option<String>,
    pub name: String,
    pub description: String,
    pub tools: Vec<ToolName>,
}
