pub mod api;
pub mod config;
pub mod error;
pub mod llm;
pub mod models;
pub mod services;
pub mod storage;
pub mod tools;

pub use models::*;

use std::sync::Arc;

use tracing::warn;

use crate::api::AppState;
use crate::config::Settings;
use crate::llm::{ModelClient, OpenAiModel};
use crate::services::{AgentFactory, TaskRunner};
use crate::storage::AgentStore;
use crate::tools::ToolRegistry;

/// Core application state: the registry, the store, and the two services
/// driving it. Constructed once at startup and shared by the API handlers.
pub struct AppCore {
    pub settings: Arc<Settings>,
    pub store: Arc<AgentStore>,
    pub registry: Arc<ToolRegistry>,
    pub factory: Arc<AgentFactory>,
    pub runner: Arc<TaskRunner>,
}

impl AppCore {
    pub fn new(settings: Settings) -> anyhow::Result<Self> {
        let settings = Arc::new(settings);
        let store = Arc::new(AgentStore::load(&settings.snapshot_path)?);
        let registry = Arc::new(ToolRegistry::new(settings.clone()));

        let model: Option<Arc<dyn ModelClient>> = OpenAiModel::from_settings(&settings)
            .map(|client| Arc::new(client) as Arc<dyn ModelClient>);
        if model.is_none() {
            warn!("OPENAI_API_KEY not configured; model-driven steps will use deterministic fallbacks");
        }

        let factory = Arc::new(AgentFactory::new(
            model.clone(),
            registry.clone(),
            store.clone(),
        ));
        let runner = Arc::new(TaskRunner::new(model, registry.clone()));

        Ok(Self {
            settings,
            store,
            registry,
            factory,
            runner,
        })
    }

    pub fn app_state(&self) -> AppState {
        AppState::new(self.store.clone(), self.factory.clone(), self.runner.clone())
    }
}
