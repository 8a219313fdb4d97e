use std::sync::Arc;

use async_trait::async_trait;
use reqwest::Client;
use serde_json::{Map, Value};

use crate::config::Settings;
use crate::error::ToolError;
use crate::models::ToolName;
use crate::tools::ToolCapability;

const SEARCH_ENDPOINT: &str = "https://www.googleapis.com/customsearch/v1";

/// Web search via Google Programmable Search.
pub struct GoogleSearchTool {
    http: Client,
    settings: Arc<Settings>,
    parameters: Map<String, Value>,
}

impl GoogleSearchTool {
    pub fn new(http: Client, settings: Arc<Settings>, parameters: Map<String, Value>) -> Self {
        Self {
            http,
            settings,
            parameters,
        }
    }
}

#[async_trait]
impl ToolCapability for GoogleSearchTool {
    fn name(&self) -> ToolName {
        ToolName::WebSearch
    }

    async fn invoke(&self, input: &str) -> Result<String, ToolError> {
        let query = input.trim();
        if query.is_empty() {
            return Err(ToolError::Execution(
                "web search query cannot be empty".to_string(),
            ));
        }

        // Availability gating guarantees both credentials are present here.
        let (Some(api_key), Some(cx)) = (
            self.settings.google_search_api_key.as_deref(),
            self.settings.google_search_cx.as_deref(),
        ) else {
            return Err(ToolError::Unavailable(
                "Google Search API key or CX is not configured".to_string(),
            ));
        };

        let mut params: Vec<(String, String)> = vec![
            ("key".to_string(), api_key.to_string()),
            ("cx".to_string(), cx.to_string()),
            ("q".to_string(), query.to_string()),
            ("num".to_string(), "3".to_string()),
            ("safe".to_string(), "active".to_string()),
            ("hl".to_string(), "zh-CN".to_string()),
        ];
        if let Some(Value::Object(extra)) = self.parameters.get("search_params") {
            for (key, value) in extra {
                let rendered = match value {
                    Value::String(s) => s.clone(),
                    other => other.to_string(),
                };
                params.push((key.clone(), rendered));
            }
        }

        let response = self
            .http
            .get(SEARCH_ENDPOINT)
            .query(&params)
            .send()
            .await
            .map_err(|err| ToolError::Execution(format!("Google search request error: {err}")))?;

        let status = response.status();
        if !status.is_success() {
            let body = response.text().await.unwrap_or_default();
            return Err(ToolError::Execution(format!(
                "Google search failed with status {status}: {body}"
            )));
        }

        let data: Value = response
            .json()
            .await
            .map_err(|err| ToolError::Execution(format!("Google search returned invalid JSON: {err}")))?;

        let items = data["items"].as_array().cloned().unwrap_or_default();
        if items.is_empty() {
            return Ok("Google 搜索未返回结果，请尝试调整关键词。".to_string());
        }

        let results: Vec<String> = items
            .iter()
            .map(|item| {
                let title = item["title"].as_str().unwrap_or("未命名结果");
                let snippet = item["snippet"].as_str().unwrap_or("").replace('\n', " ");
                let link = item["link"].as_str().unwrap_or("");
                format!("{title}\n{snippet}\n来源: {link}")
            })
            .collect();
        Ok(results.join("\n\n"))
    }
}
