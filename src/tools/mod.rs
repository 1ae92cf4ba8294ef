//! Built-in toolkit.
//!
//! Tools take positional arguments and are grouped into categories the CLI
//! can load selectively. The delegation actions (`create agents`,
//! `call sub agent`) live here too; they are ordinary tools as far as the
//! registry is concerned, with their reserved-name handling applied by the
//! orchestrator.

pub mod agents;
pub mod files;
pub mod general;
pub mod web;

use std::sync::Arc;

use tracing::warn;

use crate::store::AgentStore;
use crate::tool::{Tool, ToolRegistry};

pub const CATEGORIES: [&str; 3] = ["general", "system", "web"];

/// Every built-in tool, delegation actions included.
pub fn toolkit(store: AgentStore) -> ToolRegistry {
    let mut registry = ToolRegistry::new();
    let tools: Vec<Arc<dyn Tool>> = vec![
        Arc::new(agents::CreateAgentsTool::new(store)),
        Arc::new(agents::CallSubAgentTool),
        Arc::new(general::CalculatorTool),
        Arc::new(general::CurrentDatetimeTool),
        Arc::new(files::ReadFileTool),
        Arc::new(files::WriteFileTool),
        Arc::new(web::HttpRequestTool),
    ];
    for tool in tools {
        if let Err(err) = registry.register_arc(tool) {
            warn!(error = %err, "skipping duplicate built-in tool");
        }
    }
    registry
}

/// Resolve persisted tool names against the built-in toolkit. Unknown names
/// are dropped with a warning so stale records still load.
pub fn resolve(names: &[String], store: AgentStore) -> Vec<Arc<dyn Tool>> {
    let registry = toolkit(store);
    let mut tools = Vec::new();
    for name in names {
        match registry.get(name) {
            Some(tool) => tools.push(tool),
            None => warn!(tool = %name, "unknown tool in agent record"),
        }
    }
    tools
}

/// Tools for the requested categories; `all` selects everything.
pub fn by_categories(categories: &[String], store: AgentStore) -> Vec<Arc<dyn Tool>> {
    let registry = toolkit(store);
    if categories
        .iter()
        .any(|category| category.eq_ignore_ascii_case("all"))
    {
        return registry.all();
    }
    let mut tools: Vec<Arc<dyn Tool>> = Vec::new();
    for category in categories {
        for tool in registry.by_category(category) {
            if !tools.iter().any(|existing| existing.name() == tool.name()) {
                tools.push(tool);
            }
        }
    }
    tools
}

#[cfg(test)]
mod tests {
    use super::*;
    use tempfile::tempdir;

    #[test]
    fn toolkit_contains_the_delegation_actions() {
        let dir = tempdir().unwrap();
        let registry = toolkit(AgentStore::new(dir.path().join("agents.json")));

        assert!(registry.get("create agents").is_some());
        assert!(registry.get("Call Sub Agent").is_some());
    }

    #[test]
    fn category_loading_deduplicates_and_honors_all() {
        let dir = tempdir().unwrap();
        let store = AgentStore::new(dir.path().join("agents.json"));

        let general = by_categories(&["general".into(), "General".into()], store.clone());
        assert!(general.iter().any(|tool| tool.name() == "calculator"));
        assert!(!general.iter().any(|tool| tool.name() == "read file"));
        let names: Vec<_> = general.iter().map(|tool| tool.name()).collect();
        let mut deduped = names.clone();
        deduped.dedup();
        assert_eq!(names, deduped);

        let all = by_categories(&["all".into()], store.clone());
        assert_eq!(all.len(), toolkit(store).len());
    }

    #[test]
    fn resolve_skips_unknown_names() {
        let dir = tempdir().unwrap();
        let store = AgentStore::new(dir.path().join("agents.json"));

        let tools = resolve(&["calculator".into(), "teleport".into()], store);
        assert_eq!(tools.len(), 1);
        assert_eq!(tools[0].name(), "calculator");
    }
}
