//! Persistence for agent records.
//!
//! Agents live in one flat JSON array on disk. Every store operation that
//! fails is caught and logged, resolving to an empty result so a corrupt or
//! missing file never takes the conversation loop down with it.

use std::path::{Path, PathBuf};

use serde::{Deserialize, Serialize};
use tokio::fs;
use tracing::{error, warn};

use crate::agent::{Agent, AgentHandle, HandoffPolicy};
use crate::error::{HiveError, Result};
use crate::llm::{load_provider, ProviderRecord};
use crate::message::Task;
use crate::tools;

/// Flat serialized form of an agent, nested provider included so the
/// binding can be rehydrated by platform name.
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq)]
pub struct AgentRecord {
    pub id: String,
    pub name: String,
    #[serde(default)]
    pub parent_id: Option<String>,
    pub prompt_template: String,
    #[serde(default)]
    pub verbose: bool,
    #[serde(default)]
    pub is_sub_agent: bool,
    #[serde(default)]
    pub autostart: bool,
    #[serde(default)]
    pub handoff: HandoffPolicy,
    #[serde(default)]
    pub task: Option<Task>,
    #[serde(default)]
    pub tools: Vec<String>,
    pub llm: ProviderRecord,
}

impl AgentRecord {
    pub fn from_agent(agent: &Agent) -> Self {
        Self {
            id: agent.id.clone(),
            name: agent.name.clone(),
            parent_id: agent.parent_id.clone(),
            prompt_template: agent.prompt_template.clone(),
            verbose: agent.verbose,
            is_sub_agent: agent.is_sub_agent,
            autostart: agent.autostart,
            handoff: agent.handoff,
            task: agent.task.clone(),
            tools: agent.available_tools(),
            llm: ProviderRecord {
                platform: agent.llm.platform().to_string(),
                profile: agent.llm.profile().clone(),
            },
        }
    }
}

/// CRUD over the agents file.
#[derive(Clone)]
pub struct AgentStore {
    path: PathBuf,
}

impl AgentStore {
    pub fn new(path: impl Into<PathBuf>) -> Self {
        Self { path: path.into() }
    }

    pub fn path(&self) -> &Path {
        &self.path
    }

    async fn read_records(&self) -> Result<Vec<AgentRecord>> {
        let content = match fs::read_to_string(&self.path).await {
            Ok(content) => content,
            Err(err) if err.kind() == std::io::ErrorKind::NotFound => return Ok(Vec::new()),
            Err(err) => {
                return Err(HiveError::Storage(format!(
                    "failed to read agents file `{}`: {err}",
                    self.path.display()
                )))
            }
        };
        if content.trim().is_empty() {
            return Ok(Vec::new());
        }
        serde_json::from_str(&content).map_err(|err| {
            HiveError::Storage(format!(
                "invalid agents file `{}`: {err}",
                self.path.display()
            ))
        })
    }

    async fn write_records(&self, records: &[AgentRecord]) -> Result<()> {
        let serialized = serde_json::to_string_pretty(records)?;
        fs::write(&self.path, serialized).await.map_err(|err| {
            HiveError::Storage(format!(
                "failed to write agents file `{}`: {err}",
                self.path.display()
            ))
        })
    }

    fn hydrate(&self, record: AgentRecord) -> Result<Agent> {
        let llm = load_provider(&record.llm.platform, record.llm.profile)?;
        let mut agent = Agent::new(record.name, llm);
        agent.id = record.id;
        agent.parent_id = record.parent_id;
        agent.prompt_template = record.prompt_template;
        agent.verbose = record.verbose;
        agent.is_sub_agent = record.is_sub_agent;
        agent.autostart = record.autostart;
        agent.handoff = record.handoff;
        agent.task = record.task;
        agent.tools = tools::resolve(&record.tools, self.clone());
        Ok(agent)
    }

    /// Append one record. Returns whether the write landed.
    pub async fn append(&self, record: &AgentRecord) -> bool {
        let result = async {
            let mut records = self.read_records().await?;
            records.push(record.clone());
            self.write_records(&records).await
        }
        .await;
        match result {
            Ok(()) => true,
            Err(err) => {
                error!(error = %err, "failed to persist agent");
                false
            }
        }
    }

    /// Persist a freshly constructed agent and hand back its shared handle.
    pub async fn create(&self, agent: Agent) -> Option<AgentHandle> {
        let record = AgentRecord::from_agent(&agent);
        if self.append(&record).await {
            Some(agent.into_handle())
        } else {
            None
        }
    }

    /// All persisted agents, rehydrated; optionally filtered by parent id.
    /// Records that fail to rehydrate are skipped with a warning.
    pub async fn list(&self, parent_id: Option<&str>) -> Vec<Agent> {
        let records = match self.read_records().await {
            Ok(records) => records,
            Err(err) => {
                warn!(error = %err, "listing agents failed");
                return Vec::new();
            }
        };

        let mut agents = Vec::new();
        for record in records {
            if let Some(parent) = parent_id {
                if record.parent_id.as_deref() != Some(parent) {
                    continue;
                }
            }
            match self.hydrate(record) {
                Ok(agent) => agents.push(agent),
                Err(err) => warn!(error = %err, "skipping agent record"),
            }
        }
        agents
    }

    pub async fn get(&self, id: &str) -> Option<Agent> {
        self.list(None).await.into_iter().find(|agent| agent.id == id)
    }

    /// Single-match lookup by name; loads the agent's children into its
    /// sub-agent roster.
    pub async fn load_by_name(&self, name: &str) -> Option<Agent> {
        let mut agent = self
            .list(None)
            .await
            .into_iter()
            .find(|agent| agent.name.eq_ignore_ascii_case(name))?;
        agent.sub_agents = self
            .list(Some(&agent.id))
            .await
            .into_iter()
            .map(Agent::into_handle)
            .collect();
        Some(agent)
    }

    /// Replace the record with a matching id, or append when absent.
    pub async fn update(&self, record: &AgentRecord) -> bool {
        let result = async {
            let mut records = self.read_records().await?;
            match records.iter_mut().find(|existing| existing.id == record.id) {
                Some(existing) => *existing = record.clone(),
                None => records.push(record.clone()),
            }
            self.write_records(&records).await
        }
        .await;
        match result {
            Ok(()) => true,
            Err(err) => {
                error!(error = %err, "failed to update agent");
                false
            }
        }
    }

    /// Delete by id or (case-insensitive) name. Returns whether a record
    /// was removed.
    pub async fn delete(&self, id_or_name: &str) -> bool {
        let result = async {
            let mut records = self.read_records().await?;
            let before = records.len();
            records.retain(|record| {
                record.id != id_or_name && !record.name.eq_ignore_ascii_case(id_or_name)
            });
            if records.len() == before {
                return Ok(false);
            }
            self.write_records(&records).await.map(|_| true)
        }
        .await;
        match result {
            Ok(removed) => removed,
            Err(err) => {
                error!(error = %err, "failed to delete agent");
                false
            }
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use tempfile::tempdir;

    use crate::llm::StubModel;

    fn store_in(dir: &tempfile::TempDir) -> AgentStore {
        AgentStore::new(dir.path().join("agents.json"))
    }

    fn stub_agent(name: &str) -> Agent {
        Agent::new(name, Box::new(StubModel::new(Vec::new())))
    }

    #[tokio::test]
    async fn empty_store_lists_nothing() {
        let dir = tempdir().unwrap();
        let store = store_in(&dir);

        assert!(store.list(None).await.is_empty());
        assert!(store.get("nope").await.is_none());
    }

    #[tokio::test]
    async fn append_and_list_round_trip() {
        let dir = tempdir().unwrap();
        let store = store_in(&dir);

        let agent = stub_agent("Avatar");
        let id = agent.id.clone();
        assert!(store.append(&AgentRecord::from_agent(&agent)).await);

        let listed = store.list(None).await;
        assert_eq!(listed.len(), 1);
        assert_eq!(listed[0].id, id);
        assert_eq!(listed[0].name, "Avatar");
        assert_eq!(listed[0].llm.platform(), "stub");
    }

    #[tokio::test]
    async fn list_filters_by_parent_id() {
        let dir = tempdir().unwrap();
        let store = store_in(&dir);

        let parent = stub_agent("Boss");
        let parent_id = parent.id.clone();
        let mut child = stub_agent("Helper");
        child.parent_id = Some(parent_id.clone());

        store.append(&AgentRecord::from_agent(&parent)).await;
        store.append(&AgentRecord::from_agent(&child)).await;

        let children = store.list(Some(&parent_id)).await;
        assert_eq!(children.len(), 1);
        assert_eq!(children[0].name, "Helper");
    }

    #[tokio::test]
    async fn load_by_name_is_case_insensitive_and_loads_children() {
        let dir = tempdir().unwrap();
        let store = store_in(&dir);

        let parent = stub_agent("Boss");
        let parent_id = parent.id.clone();
        let mut child = stub_agent("Helper");
        child.parent_id = Some(parent_id);

        store.append(&AgentRecord::from_agent(&parent)).await;
        store.append(&AgentRecord::from_agent(&child)).await;

        let loaded = store.load_by_name("boss").await.unwrap();
        assert_eq!(loaded.name, "Boss");
        assert_eq!(loaded.sub_agents.len(), 1);
    }

    #[tokio::test]
    async fn update_replaces_matching_record() {
        let dir = tempdir().unwrap();
        let store = store_in(&dir);

        let mut agent = stub_agent("Avatar");
        store.append(&AgentRecord::from_agent(&agent)).await;

        agent.task = Some(Task::new("new task"));
        assert!(store.update(&AgentRecord::from_agent(&agent)).await);

        let listed = store.list(None).await;
        assert_eq!(listed.len(), 1);
        assert_eq!(listed[0].task.as_ref().unwrap().description, "new task");
    }

    #[tokio::test]
    async fn delete_by_name_removes_the_record() {
        let dir = tempdir().unwrap();
        let store = store_in(&dir);

        let agent = stub_agent("Avatar");
        store.append(&AgentRecord::from_agent(&agent)).await;

        assert!(store.delete("avatar").await);
        assert!(!store.delete("avatar").await);
        assert!(store.list(None).await.is_empty());
    }

    #[tokio::test]
    async fn corrupt_file_degrades_to_empty_list() {
        let dir = tempdir().unwrap();
        let path = dir.path().join("agents.json");
        std::fs::write(&path, "not json at all").unwrap();

        let store = AgentStore::new(path);
        assert!(store.list(None).await.is_empty());
    }
}
