use std::collections::HashMap;
use std::fs;
use std::io::Write;
use std::path::{Path, PathBuf};

use tempfile::NamedTempFile;
use tokio::sync::RwLock;
use tracing::warn;

use crate::error::StoreError;
use crate::models::{AgentDefinition, AgentSummary};

/// Durable, concurrency-safe registry of agent definitions.
///
/// The in-memory map is the source of truth while running; every mutation
/// rewrites the full JSON snapshot through a temp file followed by an atomic
/// rename, so readers of the file only ever see a complete snapshot. The
/// snapshot write happens under the write lock, and a failed write rolls the
/// in-memory change back so both views stay consistent.
pub struct AgentStore {
    agents: RwLock<HashMap<String, AgentDefinition>>,
    path: PathBuf,
}

impl AgentStore {
    /// Load the snapshot (or start empty if absent). Entries that no longer
    /// deserialize are skipped with a warning rather than poisoning the rest.
    pub fn load(path: impl Into<PathBuf>) -> Result<Self, StoreError> {
        let path = path.into();
        let mut agents = HashMap::new();

        if path.exists() {
            let raw = fs::read_to_string(&path)
                .map_err(|err| StoreError::Persistence(format!("failed to read snapshot: {err}")))?;
            let entries: Vec<serde_json::Value> = serde_json::from_str(&raw).map_err(|err| {
                StoreError::Persistence(format!("snapshot is not a JSON array: {err}"))
            })?;
            for entry in entries {
                match serde_json::from_value::<AgentDefinition>(entry) {
                    Ok(agent) => {
                        agents.insert(agent.agent_id.clone(), agent);
                    }
                    Err(err) => warn!(error = %err, "skipping invalid agent in snapshot"),
                }
            }
        }

        Ok(Self {
            agents: RwLock::new(agents),
            path,
        })
    }

    pub async fn create(&self, agent: AgentDefinition) -> Result<(), StoreError> {
        let mut agents = self.agents.write().await;
        let agent_id = agent.agent_id.clone();
        let previous = agents.insert(agent_id.clone(), agent);

        if let Err(err) = write_snapshot(&self.path, &agents) {
            match previous {
                Some(prev) => agents.insert(agent_id, prev),
                None => agents.remove(&agent_id),
            };
            return Err(err);
        }
        Ok(())
    }

    pub async fn get(&self, agent_id: &str) -> Result<AgentDefinition, StoreError> {
        self.agents
            .read()
            .await
            .get(agent_id)
            .cloned()
            .ok_or_else(|| StoreError::NotFound(agent_id.to_string()))
    }

    /// Summaries ordered by creation time (ties broken by id).
    pub async fn list(&self) -> Vec<AgentSummary> {
        let agents = self.agents.read().await;
        let mut summaries: Vec<AgentSummary> = agents.values().map(AgentDefinition::summary).collect();
        summaries.sort_by(|a, b| {
            a.created_at
                .cmp(&b.created_at)
                .then_with(|| a.agent_id.cmp(&b.agent_id))
        });
        summaries
    }

    pub async fn delete(&self, agent_id: &str) -> Result<(), StoreError> {
        let mut agents = self.agents.write().await;
        let removed = agents
            .remove(agent_id)
            .ok_or_else(|| StoreError::NotFound(agent_id.to_string()))?;

        if let Err(err) = write_snapshot(&self.path, &agents) {
            agents.insert(agent_id.to_string(), removed);
            return Err(err);
        }
        Ok(())
    }
}

fn write_snapshot(path: &Path, agents: &HashMap<String, AgentDefinition>) -> Result<(), StoreError> {
    let parent = match path.parent() {
        Some(parent) if !parent.as_os_str().is_empty() => parent,
        _ => Path::new("."),
    };
    fs::create_dir_all(parent).map_err(|err| {
        StoreError::Persistence(format!("failed to create snapshot directory: {err}"))
    })?;

    let mut definitions: Vec<&AgentDefinition> = agents.values().collect();
    definitions.sort_by(|a, b| {
        a.created_at
            .cmp(&b.created_at)
            .then_with(|| a.agent_id.cmp(&b.agent_id))
    });
    let payload = serde_json::to_vec_pretty(&definitions)
        .map_err(|err| StoreError::Persistence(format!("failed to serialize snapshot: {err}")))?;

    // Write the whole snapshot next to the target, then rename over it, so a
    // crash mid-write never leaves a truncated file at the snapshot path.
    let mut tmp = NamedTempFile::new_in(parent)
        .map_err(|err| StoreError::Persistence(format!("failed to create temp file: {err}")))?;
    tmp.write_all(&payload)
        .map_err(|err| StoreError::Persistence(format!("failed to write snapshot: {err}")))?;
    tmp.persist(path)
        .map_err(|err| StoreError::Persistence(format!("failed to replace snapshot: {err}")))?;
    Ok(())
}

#[cfg(test)]
mod tests {
    use std::sync::Arc;

    use chrono::Utc;
    use uuid::Uuid;

    use super::*;
    use crate::models::{ToolConfig, ToolName};

    fn sample_agent(name: &str) -> AgentDefinition {
        AgentDefinition {
            agent_id: Uuid::new_v4().to_string(),
            name: name.to_string(),
            description: format!("{name} description"),
            prompt: "You are a helpful assistant.".to_string(),
            tools: vec![ToolConfig {
                name: ToolName::Calculator,
                description: "calc".to_string(),
                parameters: serde_json::Map::new(),
            }],
            created_at: Utc::now(),
            is_composite: false,
            sub_agents: Vec::new(),
        }
    }

    #[tokio::test]
    async fn test_create_then_get_returns_equal_definition() {
        let dir = tempfile::tempdir().unwrap();
        let store = AgentStore::load(dir.path().join("agents.json")).unwrap();

        let agent = sample_agent("calc agent");
        store.create(agent.clone()).await.unwrap();

        let loaded = store.get(&agent.agent_id).await.unwrap();
        assert_eq!(loaded.agent_id, agent.agent_id);
        assert_eq!(loaded.name, agent.name);
        assert_eq!(loaded.prompt, agent.prompt);
        assert_eq!(loaded.tools.len(), 1);
        assert_eq!(loaded.tools[0].name, ToolName::Calculator);
    }

    #[tokio::test]
    async fn test_get_missing_agent() {
        let dir = tempfile::tempdir().unwrap();
        let store = AgentStore::load(dir.path().join("agents.json")).unwrap();
        assert!(matches!(
            store.get("missing").await,
            Err(StoreError::NotFound(_))
        ));
    }

    #[tokio::test]
    async fn test_delete_removes_from_list_and_survives_reload() {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("agents.json");
        let store = AgentStore::load(&path).unwrap();

        let keep = sample_agent("keeper");
        let drop = sample_agent("dropped");
        store.create(keep.clone()).await.unwrap();
        store.create(drop.clone()).await.unwrap();
        store.delete(&drop.agent_id).await.unwrap();

        let summaries = store.list().await;
        assert_eq!(summaries.len(), 1);
        assert_eq!(summaries[0].agent_id, keep.agent_id);
        assert!(matches!(
            store.get(&drop.agent_id).await,
            Err(StoreError::NotFound(_))
        ));

        // Simulated restart: reload from the durable snapshot.
        let reloaded = AgentStore::load(&path).unwrap();
        assert!(matches!(
            reloaded.get(&drop.agent_id).await,
            Err(StoreError::NotFound(_))
        ));
        let survivor = reloaded.get(&keep.agent_id).await.unwrap();
        assert_eq!(survivor.name, keep.name);
        assert_eq!(survivor.description, keep.description);
        assert_eq!(survivor.created_at, keep.created_at);
    }

    #[tokio::test]
    async fn test_delete_missing_agent() {
        let dir = tempfile::tempdir().unwrap();
        let store = AgentStore::load(dir.path().join("agents.json")).unwrap();
        assert!(matches!(
            store.delete("missing").await,
            Err(StoreError::NotFound(_))
        ));
    }

    #[tokio::test]
    async fn test_concurrent_creates_keep_snapshot_consistent() {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("agents.json");
        let store = Arc::new(AgentStore::load(&path).unwrap());

        let mut handles = Vec::new();
        for i in 0..16 {
            let store = store.clone();
            handles.push(tokio::spawn(async move {
                store.create(sample_agent(&format!("agent-{i}"))).await
            }));
        }
        for handle in handles {
            handle.await.unwrap().unwrap();
        }

        let summaries = store.list().await;
        assert_eq!(summaries.len(), 16);
        let ids: std::collections::HashSet<String> =
            summaries.iter().map(|s| s.agent_id.clone()).collect();
        assert_eq!(ids.len(), 16);

        let reloaded = AgentStore::load(&path).unwrap();
        assert_eq!(reloaded.list().await.len(), 16);
    }

    #[tokio::test]
    async fn test_snapshot_is_a_json_array() {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("agents.json");
        let store = AgentStore::load(&path).unwrap();
        store.create(sample_agent("solo")).await.unwrap();

        let raw = std::fs::read_to_string(&path).unwrap();
        let value: serde_json::Value = serde_json::from_str(&raw).unwrap();
        assert_eq!(value.as_array().unwrap().len(), 1);
    }

    #[tokio::test]
    async fn test_load_skips_invalid_entries() {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("agents.json");
        let good = sample_agent("good");
        let snapshot = serde_json::json!([&good, { "agent_id": "broken" }]);
        std::fs::write(&path, serde_json::to_vec(&snapshot).unwrap()).unwrap();

        let store = AgentStore::load(&path).unwrap();
        assert_eq!(store.list().await.len(), 1);
        assert!(store.get(&good.agent_id).await.is_ok());
    }
}
