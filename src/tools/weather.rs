use std::sync::Arc;

use async_trait::async_trait;
use reqwest::Client;
use serde_json::{Map, Value};

use crate::config::Settings;
use crate::error::ToolError;
use crate::models::ToolName;
use crate::tools::ToolCapability;

const DISTRICT_ENDPOINT: &str = "https://restapi.amap.com/v3/config/district";
const WEATHER_ENDPOINT: &str = "https://restapi.amap.com/v3/weather/weatherInfo";

/// City weather via the AMap Web API: resolve the city adcode first, then
/// fetch live or forecast data for it.
pub struct AmapWeatherTool {
    http: Client,
    settings: Arc<Settings>,
    parameters: Map<String, Value>,
}

impl AmapWeatherTool {
    pub fn new(http: Client, settings: Arc<Settings>, parameters: Map<String, Value>) -> Self {
        Self {
            http,
            settings,
            parameters,
        }
    }

    fn mode(&self) -> &str {
        match self.parameters.get("mode").and_then(Value::as_str) {
            Some("forecast") => "forecast",
            _ => "live",
        }
    }

    async fn get_json(&self, url: &str, params: &[(String, String)]) -> Result<Value, ToolError> {
        let response = self
            .http
            .get(url)
            .query(params)
            .send()
            .await
            .map_err(|err| ToolError::Execution(format!("AMap request error: {err}")))?;

        let status = response.status();
        if !status.is_success() {
            let body = response.text().await.unwrap_or_default();
            return Err(ToolError::Execution(format!(
                "AMap request failed with status {status}: {body}"
            )));
        }

        response
            .json()
            .await
            .map_err(|err| ToolError::Execution(format!("AMap returned invalid JSON: {err}")))
    }
}

#[async_trait]
impl ToolCapability for AmapWeatherTool {
    fn name(&self) -> ToolName {
        ToolName::AmapWeather
    }

    async fn invoke(&self, input: &str) -> Result<String, ToolError> {
        let city = input.trim();
        if city.is_empty() {
            return Err(ToolError::Execution(
                "weather query requires a city name, e.g. '上海' or 'Beijing'".to_string(),
            ));
        }

        let Some(api_key) = self.settings.amap_api_key.as_deref() else {
            return Err(ToolError::Unavailable(
                "AMAP_API_KEY is not configured".to_string(),
            ));
        };

        let district_params = vec![
            ("key".to_string(), api_key.to_string()),
            ("keywords".to_string(), city.to_string()),
            ("subdistrict".to_string(), "0".to_string()),
        ];
        let district = self.get_json(DISTRICT_ENDPOINT, &district_params).await?;
        let districts = district["districts"].as_array().cloned().unwrap_or_default();
        if district["status"].as_str() != Some("1") || districts.is_empty() {
            return Err(ToolError::Execution(
                "未能解析城市编码，请检查城市名称是否正确。".to_string(),
            ));
        }
        let first = &districts[0];
        let name = first["name"].as_str().unwrap_or(city).to_string();
        let adcode = first["adcode"]
            .as_str()
            .or_else(|| first["citycode"].as_str())
            .ok_or_else(|| ToolError::Execution("未能获取城市编码（adcode）。".to_string()))?
            .to_string();

        let mode = self.mode();
        let extensions = if mode == "live" { "base" } else { "all" };
        let weather_params = vec![
            ("key".to_string(), api_key.to_string()),
            ("city".to_string(), adcode),
            ("extensions".to_string(), extensions.to_string()),
        ];
        let weather = self.get_json(WEATHER_ENDPOINT, &weather_params).await?;

        if mode == "live" {
            let lives = weather["lives"].as_array().cloned().unwrap_or_default();
            let Some(live) = lives.first() else {
                return Ok(format!("{name} 的实时天气暂无数据。"));
            };
            let condition = live["weather"].as_str().unwrap_or("未知");
            let temp = live["temperature"].as_str().unwrap_or("?");
            let wind = format!(
                "{}风 {}级",
                live["winddirection"].as_str().unwrap_or("?"),
                live["windpower"].as_str().unwrap_or("?")
            );
            let humidity = live["humidity"].as_str().unwrap_or("?");
            let report = live["reporttime"].as_str().unwrap_or("?");
            Ok(format!(
                "{name} 实时天气：{condition}，{temp}℃，{wind}，湿度{humidity}%。更新时间：{report}"
            ))
        } else {
            let forecasts = weather["forecasts"].as_array().cloned().unwrap_or_default();
            let Some(cast) = forecasts.first() else {
                return Ok(format!("{name} 的预报天气暂无数据。"));
            };
            let days = cast["casts"].as_array().cloned().unwrap_or_default();
            let mut lines = vec![format!("{name} 天气预报（未来{}天）：", days.len())];
            for day in &days {
                lines.push(format!(
                    "{} 白天{} {}℃ / 夜间{} {}℃",
                    day["date"].as_str().unwrap_or("?"),
                    day["dayweather"].as_str().unwrap_or("?"),
                    day["daytemp"].as_str().unwrap_or("?"),
                    day["nightweather"].as_str().unwrap_or("?"),
                    day["nighttemp"].as_str().unwrap_or("?"),
                ));
            }
            Ok(lines.join("\n"))
        }
    }
}
