use std::path::PathBuf;

/// Environment-driven configuration, read once at startup.
///
/// Tool credentials are optional on purpose: a missing credential removes the
/// corresponding tool from the available set without affecting anything else.
#[derive(Debug, Clone)]
pub struct Settings {
    pub host: String,
    pub port: u16,
    /// Path of the durable agent snapshot file.
    pub snapshot_path: PathBuf,
    pub openai_api_key: Option<String>,
    pub openai_model: String,
    pub google_search_api_key: Option<String>,
    pub google_search_cx: Option<String>,
    pub amap_api_key: Option<String>,
}

impl Settings {
    pub fn from_env() -> Self {
        Self {
            host: env_opt("METAGENT_HOST").unwrap_or_else(|| "127.0.0.1".to_string()),
            port: env_opt("METAGENT_PORT")
                .and_then(|value| value.parse().ok())
                .unwrap_or(3000),
            snapshot_path: env_opt("METAGENT_STORE")
                .map(PathBuf::from)
                .unwrap_or_else(|| PathBuf::from("data/agents.json")),
            openai_api_key: env_opt("OPENAI_API_KEY"),
            openai_model: env_opt("OPENAI_MODEL").unwrap_or_else(|| "gpt-4o-mini".to_string()),
            google_search_api_key: env_opt("GOOGLE_SEARCH_API_KEY"),
            google_search_cx: env_opt("GOOGLE_SEARCH_CX"),
            amap_api_key: env_opt("AMAP_API_KEY"),
        }
    }

    pub fn has_search_credentials(&self) -> bool {
        self.google_search_api_key.is_some() && self.google_search_cx.is_some()
    }

    pub fn has_weather_credentials(&self) -> bool {
        self.amap_api_key.is_some()
    }
}

fn env_opt(key: &str) -> Option<String> {
    std::env::var(key).ok().filter(|value| !value.trim().is_empty())
}

#[cfg(test)]
impl Settings {
    /// Settings with no credentials configured, pointing at a throwaway store.
    pub fn bare(snapshot_path: impl Into<PathBuf>) -> Self {
        Self {
            host: "127.0.0.1".to_string(),
            port: 0,
            snapshot_path: snapshot_path.into(),
            openai_api_key: None,
            openai_model: "gpt-4o-mini".to_string(),
            google_search_api_key: None,
            google_search_cx: None,
            amap_api_key: None,
        }
    }
}
