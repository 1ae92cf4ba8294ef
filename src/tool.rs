use std::sync::Arc;

use async_trait::async_trait;
use serde_json::Value;

use crate::agent::AgentHandle;
use crate::error::{HiveError, Result};
use crate::message::ToolOutcome;

/// Extra context handed to a tool run. Only tools whose name marks them as
/// sub-agent aware receive the calling agent.
#[derive(Default, Clone)]
pub struct ToolContext {
    pub caller: Option<AgentHandle>,
}

impl ToolContext {
    pub fn with_caller(caller: AgentHandle) -> Self {
        Self {
            caller: Some(caller),
        }
    }
}

/// A named, invocable capability with a positional argument list.
#[async_trait]
pub trait Tool: Send + Sync {
    fn name(&self) -> &str;
    fn description(&self) -> &str;
    fn category(&self) -> &str {
        "general"
    }
    async fn run(&self, args: Vec<Value>, ctx: &ToolContext) -> Result<ToolOutcome>;
}

/// Ordered collection of tools, unique by name. Registration rejects
/// duplicates; lookup is case-insensitive and returns the first match.
#[derive(Default, Clone)]
pub struct ToolRegistry {
    tools: Vec<Arc<dyn Tool>>,
}

impl ToolRegistry {
    pub fn new() -> Self {
        Self { tools: Vec::new() }
    }

    pub fn register<T: Tool + 'static>(&mut self, tool: T) -> Result<()> {
        self.register_arc(Arc::new(tool))
    }

    pub fn register_arc(&mut self, tool: Arc<dyn Tool>) -> Result<()> {
        if self.get(tool.name()).is_some() {
            return Err(HiveError::DuplicateTool(tool.name().to_string()));
        }
        self.tools.push(tool);
        Ok(())
    }

    pub fn get(&self, name: &str) -> Option<Arc<dyn Tool>> {
        self.tools
            .iter()
            .find(|tool| tool.name().eq_ignore_ascii_case(name))
            .cloned()
    }

    pub fn names(&self) -> Vec<String> {
        self.tools.iter().map(|tool| tool.name().to_string()).collect()
    }

    pub fn all(&self) -> Vec<Arc<dyn Tool>> {
        self.tools.clone()
    }

    pub fn by_category(&self, category: &str) -> Vec<Arc<dyn Tool>> {
        self.tools
            .iter()
            .filter(|tool| tool.category().eq_ignore_ascii_case(category))
            .cloned()
            .collect()
    }

    pub fn is_empty(&self) -> bool {
        self.tools.is_empty()
    }

    pub fn len(&self) -> usize {
        self.tools.len()
    }
}
