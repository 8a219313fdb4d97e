//! Built-in tool capabilities and the registry that gates them.
//!
//! Adding a tool means adding a `ToolName` variant, a capability
//! implementation, and a descriptor entry here; nothing else changes.

pub mod calculator;
pub mod search;
pub mod weather;

use std::sync::Arc;
use std::time::Duration;

use async_trait::async_trait;
use reqwest::Client;
use serde::Serialize;
use serde_json::{Map, Value, json};

use crate::config::Settings;
use crate::error::ToolError;
use crate::models::{ToolConfig, ToolName};

pub use calculator::CalculatorTool;
pub use search::GoogleSearchTool;
pub use weather::AmapWeatherTool;

/// Uniform invoke contract for every built-in tool.
#[async_trait]
pub trait ToolCapability: Send + Sync {
    fn name(&self) -> ToolName;

    async fn invoke(&self, input: &str) -> Result<String, ToolError>;
}

/// Static catalogue entry: one per registered tool, immutable after start.
#[derive(Debug, Clone, Serialize)]
pub struct ToolDescriptor {
    pub name: ToolName,
    pub description: String,
    pub parameters_schema: Value,
}

/// Catalogue of tool descriptors plus credential-driven availability gating.
pub struct ToolRegistry {
    settings: Arc<Settings>,
    http: Client,
}

impl ToolRegistry {
    pub fn new(settings: Arc<Settings>) -> Self {
        let http = Client::builder()
            .timeout(Duration::from_secs(10))
            .build()
            .expect("Failed to build reqwest client");
        Self { settings, http }
    }

    /// Only the tools whose required credentials are configured. This is the
    /// candidate set for agent creation and the resolution set for task runs.
    pub fn available(&self) -> Vec<ToolDescriptor> {
        ToolName::ALL
            .iter()
            .filter(|name| self.is_available(**name))
            .map(|name| descriptor(*name))
            .collect()
    }

    pub fn is_available(&self, name: ToolName) -> bool {
        match name {
            ToolName::Calculator => true,
            ToolName::WebSearch => self.settings.has_search_credentials(),
            ToolName::AmapWeather => self.settings.has_weather_credentials(),
        }
    }

    /// Build the capability for one configured tool. Fails with
    /// `ToolError::Unavailable` when the credential has gone missing since
    /// the agent was created.
    pub fn resolve(&self, config: &ToolConfig) -> Result<Box<dyn ToolCapability>, ToolError> {
        if !self.is_available(config.name) {
            return Err(ToolError::Unavailable(format!(
                "tool {} is missing its required credential",
                config.name
            )));
        }
        let parameters = normalize_parameters(config.name, &config.parameters);
        Ok(match config.name {
            ToolName::Calculator => Box::new(CalculatorTool),
            ToolName::WebSearch => Box::new(GoogleSearchTool::new(
                self.http.clone(),
                self.settings.clone(),
                parameters,
            )),
            ToolName::AmapWeather => Box::new(AmapWeatherTool::new(
                self.http.clone(),
                self.settings.clone(),
                parameters,
            )),
        })
    }
}

/// An agent's configured tools, resolved through the registry per call so a
/// revoked credential shows up as a failed trace instead of a stale success.
pub struct ToolBox<'a> {
    registry: &'a ToolRegistry,
    configs: &'a [ToolConfig],
}

impl<'a> ToolBox<'a> {
    pub fn new(registry: &'a ToolRegistry, configs: &'a [ToolConfig]) -> Self {
        Self { registry, configs }
    }

    pub fn is_empty(&self) -> bool {
        self.configs.is_empty()
    }

    pub fn config(&self, name: ToolName) -> Option<&ToolConfig> {
        self.configs.iter().find(|config| config.name == name)
    }

    pub async fn run(&self, name: ToolName, input: &str) -> Result<String, ToolError> {
        let config = self.config(name).ok_or_else(|| {
            ToolError::Unavailable(format!("tool {name} is not configured for this agent"))
        })?;
        let tool = self.registry.resolve(config)?;
        tool.invoke(input).await
    }
}

fn descriptor(name: ToolName) -> ToolDescriptor {
    match name {
        ToolName::Calculator => ToolDescriptor {
            name,
            description: "Evaluate arithmetic expressions (+, -, *, /, parentheses).".to_string(),
            parameters_schema: json!({}),
        },
        ToolName::WebSearch => ToolDescriptor {
            name,
            description: "Use Google Programmable Search to gather fresh web information."
                .to_string(),
            parameters_schema: json!({
                "auto_search": { "type": "boolean", "optional": true },
                "strategy": { "type": "string", "optional": true },
                "search_params": { "type": "object", "optional": true },
            }),
        },
        ToolName::AmapWeather => ToolDescriptor {
            name,
            description: "Query live or forecast weather by city via AMap Web API.".to_string(),
            parameters_schema: json!({
                "mode": { "type": "string", "enum": ["live", "forecast"], "optional": true },
            }),
        },
    }
}

/// Validate and normalize selected tool parameters against the tool's schema:
/// strips unknown keys, coerces types where safe, applies defaults.
pub fn normalize_parameters(name: ToolName, params: &Map<String, Value>) -> Map<String, Value> {
    let mut normalized = Map::new();
    match name {
        // Calculator takes no parameters; drop any extras.
        ToolName::Calculator => {}
        ToolName::WebSearch => {
            let auto_search = params.get("auto_search").is_some_and(coerce_bool);
            normalized.insert("auto_search".to_string(), Value::Bool(auto_search));
            if let Some(Value::String(strategy)) = params.get("strategy") {
                let trimmed: String = strategy.trim().chars().take(64).collect();
                if !trimmed.is_empty() {
                    normalized.insert("strategy".to_string(), Value::String(trimmed));
                }
            }
            if let Some(Value::Object(search_params)) = params.get("search_params") {
                let filtered: Map<String, Value> = search_params
                    .iter()
                    .filter(|(_, value)| {
                        value.is_string() || value.is_number() || value.is_boolean()
                    })
                    .map(|(key, value)| (key.clone(), value.clone()))
                    .collect();
                if !filtered.is_empty() {
                    normalized.insert("search_params".to_string(), Value::Object(filtered));
                }
            }
        }
        ToolName::AmapWeather => {
            let mode = params
                .get("mode")
                .and_then(Value::as_str)
                .map(str::to_lowercase)
                .filter(|mode| mode == "live" || mode == "forecast")
                .unwrap_or_else(|| "live".to_string());
            normalized.insert("mode".to_string(), Value::String(mode));
        }
    }
    normalized
}

fn coerce_bool(value: &Value) -> bool {
    match value {
        Value::Bool(b) => *b,
        Value::String(s) => matches!(
            s.trim().to_lowercase().as_str(),
            "1" | "true" | "yes" | "y" | "on"
        ),
        Value::Number(n) => n.as_f64().is_some_and(|n| n != 0.0),
        _ => false,
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn registry_without_credentials() -> ToolRegistry {
        ToolRegistry::new(Arc::new(Settings::bare("unused.json")))
    }

    #[test]
    fn test_normalize_web_search_params() {
        let params = serde_json::from_value::<Map<String, Value>>(json!({
            "auto_search": "yes",
            "strategy": " financial_news ",
            "search_params": { "num": 5, "safe": "active", "hl": "zh-CN", "bad": [1, 2] },
            "unknown": true,
        }))
        .unwrap();

        let normalized = normalize_parameters(ToolName::WebSearch, &params);
        assert_eq!(normalized["auto_search"], Value::Bool(true));
        assert_eq!(normalized["strategy"], Value::String("financial_news".into()));
        let search_params = normalized["search_params"].as_object().unwrap();
        assert_eq!(search_params.len(), 3);
        assert!(!search_params.contains_key("bad"));
        assert!(!normalized.contains_key("unknown"));
    }

    #[test]
    fn test_normalize_web_search_defaults() {
        let normalized = normalize_parameters(ToolName::WebSearch, &Map::new());
        assert_eq!(normalized["auto_search"], Value::Bool(false));
        assert!(!normalized.contains_key("strategy"));
    }

    #[test]
    fn test_normalize_calculator_strips_everything() {
        let params = serde_json::from_value::<Map<String, Value>>(json!({ "x": 1 })).unwrap();
        assert!(normalize_parameters(ToolName::Calculator, &params).is_empty());
    }

    #[test]
    fn test_normalize_weather_mode() {
        let params =
            serde_json::from_value::<Map<String, Value>>(json!({ "mode": "FORECAST" })).unwrap();
        let normalized = normalize_parameters(ToolName::AmapWeather, &params);
        assert_eq!(normalized["mode"], Value::String("forecast".into()));

        let fallback = normalize_parameters(ToolName::AmapWeather, &Map::new());
        assert_eq!(fallback["mode"], Value::String("live".into()));
    }

    #[test]
    fn test_availability_follows_credentials() {
        let registry = registry_without_credentials();
        assert!(registry.is_available(ToolName::Calculator));
        assert!(!registry.is_available(ToolName::WebSearch));
        assert!(!registry.is_available(ToolName::AmapWeather));

        let available: Vec<ToolName> = registry
            .available()
            .iter()
            .map(|descriptor| descriptor.name)
            .collect();
        assert_eq!(available, vec![ToolName::Calculator]);
    }

    #[test]
    fn test_resolve_unavailable_tool() {
        let registry = registry_without_credentials();
        let config = ToolConfig {
            name: ToolName::WebSearch,
            description: "search".to_string(),
            parameters: Map::new(),
        };
        let err = match registry.resolve(&config) {
            Ok(_) => panic!("expected resolve to fail"),
            Err(err) => err,
        };
        assert!(matches!(err, ToolError::Unavailable(_)));
    }

    #[tokio::test]
    async fn test_toolbox_rejects_unconfigured_tool() {
        let registry = registry_without_credentials();
        let toolbox = ToolBox::new(&registry, &[]);
        let err = toolbox.run(ToolName::Calculator, "1+1").await.unwrap_err();
        assert!(matches!(err, ToolError::Unavailable(_)));
    }
}
