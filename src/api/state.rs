use std::sync::Arc;

use crate::services::{AgentFactory, TaskRunner};
use crate::storage::AgentStore;

/// Application state shared across all API handlers.
#[derive(Clone)]
pub struct AppState {
    pub store: Arc<AgentStore>,
    pub factory: Arc<AgentFactory>,
    pub runner: Arc<TaskRunner>,
}

impl AppState {
    pub fn new(
        store: Arc<AgentStore>,
        factory: Arc<AgentFactory>,
        runner: Arc<TaskRunner>,
    ) -> Self {
        Self {
            store,
            factory,
            runner,
        }
    }
}
