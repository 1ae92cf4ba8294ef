//! Delegation tools: spawning sub-agents and handing tasks to them.

use async_trait::async_trait;
use serde_json::Value;

use crate::agent::{call_sub_agent, Agent, CREATE_AGENTS_TOOL};
use crate::error::{HiveError, Result};
use crate::llm::{default_profile, load_provider};
use crate::message::{Task, ToolOutcome};
use crate::store::AgentStore;
use crate::tool::{Tool, ToolContext};

fn string_arg(args: &[Value], index: usize) -> Option<String> {
    args.get(index).and_then(Value::as_str).map(str::to_string)
}

fn bool_arg(args: &[Value], index: usize) -> bool {
    match args.get(index) {
        Some(Value::Bool(flag)) => *flag,
        Some(Value::String(text)) => text.eq_ignore_ascii_case("true"),
        _ => false,
    }
}

/// Spawns a persisted sub-agent. The orchestrator appends the caller's id
/// as the trailing argument, so the new agent always knows its parent.
pub struct CreateAgentsTool {
    store: AgentStore,
}

impl CreateAgentsTool {
    pub fn new(store: AgentStore) -> Self {
        Self { store }
    }
}

#[async_trait]
impl Tool for CreateAgentsTool {
    fn name(&self) -> &str {
        CREATE_AGENTS_TOOL
    }

    fn description(&self) -> &str {
        "Create a new sub-agent. Arguments: [name, system prompt, task description, llm platform, autostart]"
    }

    async fn run(&self, args: Vec<Value>, _ctx: &ToolContext) -> Result<ToolOutcome> {
        if args.len() < 2 {
            return Err(HiveError::Protocol(
                "create agents needs at least a name".into(),
            ));
        }
        let name = string_arg(&args, 0)
            .filter(|name| !name.is_empty())
            .ok_or_else(|| HiveError::Protocol("create agents: missing agent name".into()))?;
        let description = string_arg(&args, 1).unwrap_or_default();
        let task = string_arg(&args, 2).unwrap_or_default();
        let platform = string_arg(&args, 3)
            .filter(|platform| !platform.is_empty())
            .unwrap_or_else(|| "ollama".to_string());
        let autostart = bool_arg(&args, 4);
        // Trailing argument: the caller's id, appended by normalization.
        let parent_id = args
            .last()
            .and_then(Value::as_str)
            .map(str::to_string)
            .ok_or_else(|| HiveError::Protocol("create agents: missing parent id".into()))?;

        let llm = load_provider(&platform, default_profile(&platform))?;
        let mut agent = Agent::new(name.clone(), llm);
        agent.parent_id = Some(parent_id);
        agent.is_sub_agent = true;
        agent.autostart = autostart;
        if !description.is_empty() {
            agent.prompt_template = description;
        }
        if !task.is_empty() {
            agent.task = Some(Task::new(task));
        }

        let handle = self
            .store
            .create(agent)
            .await
            .ok_or_else(|| HiveError::Protocol("create agents: failed to persist".into()))?;

        Ok(ToolOutcome::SpawnAgent {
            agent: handle,
            note: format!("Created new agent {name}"),
        })
    }
}

/// Delegates a task to one of the caller's sub-agents. The name carries the
/// sub-agent marker, so the orchestrator provides the calling agent here.
pub struct CallSubAgentTool;

#[async_trait]
impl Tool for CallSubAgentTool {
    fn name(&self) -> &str {
        "call sub agent"
    }

    fn description(&self) -> &str {
        "Delegate a task to one of your sub-agents. Arguments: [agent name, task description]"
    }

    async fn run(&self, args: Vec<Value>, ctx: &ToolContext) -> Result<ToolOutcome> {
        let caller = ctx
            .caller
            .clone()
            .ok_or_else(|| HiveError::Protocol("call sub agent: no calling agent".into()))?;
        let agent_name = string_arg(&args, 0)
            .filter(|name| !name.is_empty())
            .ok_or_else(|| HiveError::Protocol("call sub agent: missing agent name".into()))?;
        let task_description = string_arg(&args, 1).unwrap_or_default();

        let started = call_sub_agent(&caller, &agent_name, &task_description).await;
        Ok(ToolOutcome::Text(if started {
            format!("Delegated task to {agent_name}.")
        } else {
            format!("Sub-agent with name {agent_name} was not found.")
        }))
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use serde_json::json;
    use tempfile::tempdir;

    use crate::llm::StubModel;

    #[tokio::test]
    async fn create_agents_persists_child_with_trailing_parent_id() {
        let dir = tempdir().unwrap();
        let store = AgentStore::new(dir.path().join("agents.json"));
        let tool = CreateAgentsTool::new(store.clone());

        let outcome = tool
            .run(
                vec![
                    json!("Helper"),
                    json!("You sort files."),
                    json!("sort the downloads folder"),
                    json!("ollama"),
                    json!(true),
                    json!("parent-123"),
                ],
                &ToolContext::default(),
            )
            .await
            .unwrap();

        let ToolOutcome::SpawnAgent { agent, note } = outcome else {
            panic!("expected a spawned agent");
        };
        assert_eq!(note, "Created new agent Helper");
        {
            let child = agent.lock().await;
            assert_eq!(child.parent_id.as_deref(), Some("parent-123"));
            assert!(child.autostart);
            assert!(child.is_sub_agent);
            assert_eq!(child.prompt_template, "You sort files.");
        }

        let persisted = store.list(Some("parent-123")).await;
        assert_eq!(persisted.len(), 1);
        assert_eq!(persisted[0].name, "Helper");
    }

    #[tokio::test]
    async fn create_agents_rejects_missing_name() {
        let dir = tempdir().unwrap();
        let tool = CreateAgentsTool::new(AgentStore::new(dir.path().join("agents.json")));

        let result = tool.run(vec![json!("parent-123")], &ToolContext::default()).await;
        assert!(result.is_err());
    }

    #[tokio::test]
    async fn call_sub_agent_requires_a_caller() {
        let result = CallSubAgentTool
            .run(vec![json!("Helper"), json!("task")], &ToolContext::default())
            .await;
        assert!(result.is_err());
    }

    #[tokio::test]
    async fn call_sub_agent_reports_missing_child() {
        let caller = Agent::new(
            "Boss",
            StubModel::scripted(&[r#"{"type": "final_answer", "result": "understood"}"#]),
        )
        .into_handle();

        let outcome = CallSubAgentTool
            .run(
                vec![json!("Ghost"), json!("find it")],
                &ToolContext::with_caller(caller),
            )
            .await
            .unwrap();

        let ToolOutcome::Text(text) = outcome else {
            panic!("expected text outcome");
        };
        assert!(text.contains("was not found"));
    }
}
