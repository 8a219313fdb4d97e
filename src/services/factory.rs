//! Generates concrete agents from high-level user requirements.

use std::sync::Arc;

use chrono::Utc;
use once_cell::sync::Lazy;
use regex::Regex;
use serde_json::{Map, Value, json};
use tracing::warn;
use uuid::Uuid;

use crate::error::{ModelError, StoreError};
use crate::llm::{CompletionRequest, ModelClient, extract_json};
use crate::models::{AgentDefinition, SubAgentSummary, ToolConfig, ToolName};
use crate::storage::AgentStore;
use crate::tools::{ToolDescriptor, ToolRegistry, normalize_parameters};

/// Digits joined by an operator, e.g. "1200+365".
static DIGIT_EXPRESSION: Lazy<Regex> =
    Lazy::new(|| Regex::new(r"\d\s*[-+*/]\s*\d").expect("invalid digit expression regex"));

const CALCULATOR_CUES: &[&str] = &[
    "计算", "算", "求和", "求", "数学", "数字", "calculat", "math", "arithmetic",
];
const SEARCH_CUES: &[&str] = &[
    "搜索", "检索", "查询", "新闻", "资讯", "头条", "search", "news", "research",
];
const WEATHER_CUES: &[&str] = &["天气", "气温", "温度", "weather", "forecast"];

const TOOL_SELECTION_PROMPT: &str = r#"You are an expert AI system architect. Given a user requirement and a list of available tools, select the minimal set of tools needed.
Guidelines:
- Arithmetic/numeric expressions -> prefer calculator.
- Weather queries (城市天气/天气/forecast/live weather) -> choose amap_weather (parameters: mode=live or forecast).
- News/search/research queries (新闻/资讯/头条/搜索/查询/检索) -> choose web_search.
- Only choose web_search if fresh web information is required or explicitly implied.
Example: "创建一个天气查询的agent，支持城市实时和未来天气预报" -> {"tools": [{"name": "amap_weather", "description": "查询城市实时与预报天气", "parameters": {"mode": "forecast"}}]}
Example: "创建一个搜索新闻的agent，聚焦最新资讯和头条" -> {"tools": [{"name": "web_search", "description": "检索最新新闻和资讯", "parameters": {"auto_search": true}}]}
Return strict JSON with field `tools`: a list of objects {name, description, parameters?}. If no tool is needed, return an empty list."#;

const METADATA_PROMPT: &str = "你是资深AI系统设计师，请基于用户需求与可用工具，生成该agent的元数据。\n\
严格输出JSON，字段：\n\
- name: 简洁中文名（≤12字）\n\
- description: 清晰中文描述（≤50字），突出能力与适用范围\n\
- prompt: 作为system prompt，包含persona、工作流程、可用工具（名称与使用原则）\n\
不要输出多余文字或代码块标记。";

const DECOMPOSE_PROMPT: &str = "You are a planning assistant. Split the user requirement into between 2 and 4 focused sub-requirements, each independently actionable on its own. Return strict JSON with a single field `sub_requirements`: a list of strings. No extra text.";

struct AgentMetadata {
    name: String,
    description: String,
    prompt: String,
}

pub struct AgentFactory {
    model: Option<Arc<dyn ModelClient>>,
    registry: Arc<ToolRegistry>,
    store: Arc<AgentStore>,
}

impl AgentFactory {
    pub fn new(
        model: Option<Arc<dyn ModelClient>>,
        registry: Arc<ToolRegistry>,
        store: Arc<AgentStore>,
    ) -> Self {
        Self {
            model,
            registry,
            store,
        }
    }

    /// Build and persist an agent for the given requirement. Model outages
    /// degrade every step to a deterministic fallback; only a failed
    /// snapshot write makes this fail.
    pub async fn create(
        &self,
        user_requirement: &str,
        is_composite: bool,
    ) -> Result<AgentDefinition, StoreError> {
        let tools = self.select_tools(user_requirement).await;
        let metadata = self.generate_metadata(user_requirement, &tools).await;
        let sub_agents = if is_composite {
            self.decompose(user_requirement).await
        } else {
            Vec::new()
        };

        let agent = AgentDefinition {
            agent_id: Uuid::new_v4().to_string(),
            name: metadata.name,
            description: metadata.description,
            prompt: metadata.prompt,
            tools,
            created_at: Utc::now(),
            is_composite,
            sub_agents,
        };
        self.store.create(agent.clone()).await?;
        Ok(agent)
    }

    async fn select_tools(&self, requirement: &str) -> Vec<ToolConfig> {
        let available = self.registry.available();
        if available.is_empty() {
            return Vec::new();
        }

        if let Some(model) = &self.model {
            match select_tools_via_model(model.as_ref(), requirement, &available).await {
                Ok(configs) => return configs,
                Err(err) => {
                    warn!(error = %err, "tool selection via model failed, using keyword fallback")
                }
            }
        }
        keyword_fallback(requirement, &available)
    }

    async fn generate_metadata(&self, requirement: &str, tools: &[ToolConfig]) -> AgentMetadata {
        if let Some(model) = &self.model {
            match metadata_via_model(model.as_ref(), requirement, tools).await {
                Ok(metadata) => return metadata,
                Err(err) => {
                    warn!(error = %err, "metadata synthesis via model failed, using template fallback")
                }
            }
        }
        fallback_metadata(requirement, tools)
    }

    /// Split a composite requirement into sub-agent summaries. Each part maps
    /// through the same selection and metadata steps as a flat agent.
    async fn decompose(&self, requirement: &str) -> Vec<SubAgentSummary> {
        let mut parts = Vec::new();
        if let Some(model) = &self.model {
            match decompose_via_model(model.as_ref(), requirement).await {
                Ok(found) => parts = found,
                Err(err) => {
                    warn!(error = %err, "composite decomposition via model failed, using delimiter fallback")
                }
            }
        }
        if parts.len() < 2 {
            parts = fallback_split(requirement);
        }
        if parts.len() < 2 {
            return Vec::new();
        }

        let mut sub_agents = Vec::new();
        for part in parts {
            let tools = self.select_tools(&part).await;
            let metadata = self.generate_metadata(&part, &tools).await;
            sub_agents.push(SubAgentSummary {
                agent_id: None,
                name: metadata.name,
                description: metadata.description,
                tools: tools.iter().map(|tool| tool.name).collect(),
            });
        }
        sub_agents
    }
}

async fn select_tools_via_model(
    model: &dyn ModelClient,
    requirement: &str,
    available: &[ToolDescriptor],
) -> Result<Vec<ToolConfig>, ModelError> {
    let catalogue = serde_json::to_string(available)
        .map_err(|err| ModelError::Parse(err.to_string()))?;
    let user = format!(
        "User requirement: {requirement}\nAvailable tools: {catalogue}\nOutput strict JSON with only the `tools` field."
    );
    let content = model
        .complete(CompletionRequest::new(TOOL_SELECTION_PROMPT, user))
        .await?;
    let payload = extract_json(&content)?;

    let selected = payload["tools"].as_array().cloned().unwrap_or_default();
    let mut configs: Vec<ToolConfig> = Vec::new();
    for item in selected {
        // Unknown or unavailable suggestions are dropped, never fatal.
        let Some(name) = item["name"].as_str().and_then(ToolName::parse) else {
            continue;
        };
        let Some(descriptor) = available.iter().find(|descriptor| descriptor.name == name) else {
            continue;
        };
        if configs.iter().any(|config| config.name == name) {
            continue;
        }
        let description = match item["description"].as_str() {
            Some(text) if !text.trim().is_empty() => text.to_string(),
            _ => descriptor.description.clone(),
        };
        let parameters = item["parameters"].as_object().cloned().unwrap_or_default();
        configs.push(ToolConfig {
            name,
            description,
            parameters: normalize_parameters(name, &parameters),
        });
    }
    Ok(configs)
}

fn keyword_fallback(requirement: &str, available: &[ToolDescriptor]) -> Vec<ToolConfig> {
    let lowered = requirement.to_lowercase();
    let mut selected = Vec::new();
    for descriptor in available {
        let cues: &[&str] = match descriptor.name {
            ToolName::Calculator => CALCULATOR_CUES,
            ToolName::WebSearch => SEARCH_CUES,
            ToolName::AmapWeather => WEATHER_CUES,
        };
        let matched = cues.iter().any(|cue| lowered.contains(cue))
            || (descriptor.name == ToolName::Calculator && DIGIT_EXPRESSION.is_match(&lowered));
        if matched {
            selected.push(ToolConfig {
                name: descriptor.name,
                description: descriptor.description.clone(),
                parameters: normalize_parameters(descriptor.name, &Map::new()),
            });
        }
    }
    selected
}

async fn metadata_via_model(
    model: &dyn ModelClient,
    requirement: &str,
    tools: &[ToolConfig],
) -> Result<AgentMetadata, ModelError> {
    let tools_summary: Vec<Value> = tools
        .iter()
        .map(|tool| {
            json!({
                "name": tool.name,
                "description": tool.description,
                "parameters": tool.parameters,
            })
        })
        .collect();
    let user = format!(
        "用户需求: {requirement}\n可用工具(JSON): {}\n请直接返回所需JSON。",
        serde_json::to_string(&tools_summary).map_err(|err| ModelError::Parse(err.to_string()))?
    );
    let content = model
        .complete(CompletionRequest::new(METADATA_PROMPT, user).with_temperature(0.2))
        .await?;
    let payload = extract_json(&content)?;

    let field = |key: &str| -> Option<String> {
        payload[key]
            .as_str()
            .map(str::trim)
            .filter(|value| !value.is_empty())
            .map(str::to_string)
    };
    match (field("name"), field("description"), field("prompt")) {
        (Some(name), Some(description), Some(prompt)) => Ok(AgentMetadata {
            name,
            description,
            prompt,
        }),
        _ => Err(ModelError::Parse(
            "metadata response is missing name/description/prompt".to_string(),
        )),
    }
}

fn fallback_metadata(requirement: &str, tools: &[ToolConfig]) -> AgentMetadata {
    let name = derive_friendly_name(requirement);
    let description = compose_description(requirement, tools, &name);
    let joined = tools
        .iter()
        .map(|tool| tool.name.as_str())
        .collect::<Vec<_>>()
        .join(", ");
    let tool_sentence = if joined.is_empty() {
        String::new()
    } else {
        format!("You may use these tools: {joined}. ")
    };
    AgentMetadata {
        name,
        description,
        prompt: format!(
            "You are a helpful assistant focused on the user's stated goal. {tool_sentence}When tools are insufficient or not provided, provide reasoned answers using your own knowledge."
        ),
    }
}

fn derive_friendly_name(requirement: &str) -> String {
    let normalized = requirement
        .trim()
        .replace("请", "")
        .replace("帮我", "")
        .replace("需要", "");
    let normalized = normalized.trim();
    if !normalized.is_empty() && normalized.chars().count() <= 20 {
        normalized.to_string()
    } else {
        "自定义 Agent".to_string()
    }
}

fn compose_description(requirement: &str, tools: &[ToolConfig], name: &str) -> String {
    let requirement = match requirement.trim() {
        "" => "用户的业务需求",
        trimmed => trimmed,
    };
    let tool_hint = if tools.is_empty() {
        String::new()
    } else {
        let mut names: Vec<&str> = tools.iter().map(|tool| tool.name.as_str()).collect();
        names.sort_unstable();
        names.dedup();
        format!("（可用工具：{}）", names.join(", "))
    };
    format!("{name} 处理指定的任务{tool_hint}，适用于：{requirement}。")
}

async fn decompose_via_model(
    model: &dyn ModelClient,
    requirement: &str,
) -> Result<Vec<String>, ModelError> {
    let content = model
        .complete(CompletionRequest::new(
            DECOMPOSE_PROMPT,
            format!("User requirement: {requirement}"),
        ))
        .await?;
    let payload = extract_json(&content)?;
    let parts: Vec<String> = payload["sub_requirements"]
        .as_array()
        .cloned()
        .unwrap_or_default()
        .iter()
        .filter_map(|value| value.as_str())
        .map(str::trim)
        .filter(|part| !part.is_empty())
        .map(str::to_string)
        .collect();
    Ok(parts)
}

/// Delimiter-based split for when the model cannot decompose the
/// requirement. Fewer than two parts means no usable decomposition.
fn fallback_split(requirement: &str) -> Vec<String> {
    let mut normalized = requirement.to_string();
    for connector in ["然后", "并且", "以及", " and ", "；", ";"] {
        normalized = normalized.replace(connector, "，");
    }
    normalized
        .split(['，', ',', '。'])
        .map(str::trim)
        .filter(|part| part.chars().count() >= 2)
        .map(str::to_string)
        .collect()
}
