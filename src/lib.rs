//! Building blocks for running hivemind agents.
//!
//! The crate provides a small runtime with:
//! - A language model abstraction ([`LanguageModel`]) with providers looked
//!   up by platform name.
//! - A tool interface ([`Tool`]) with positional arguments and categories.
//! - An [`Agent`] that loops between the model and tools using structured
//!   JSON directives, and can spawn sub-agents to delegate tasks to.
//! - Flat JSON stores for agent records and conversation sessions.

mod agent;
mod config;
mod error;
mod interpreter;
mod llm;
mod message;
mod prompt;
mod server;
mod session;
mod store;
mod tool;
pub mod tools;

pub use agent::{
    call_sub_agent, converse, create_agent_interactive, execute_directive, run_interactive,
    run_task, spawn_task, Agent, AgentHandle, HandoffPolicy, StepOutcome, TaskHandle,
    CREATE_AGENTS_TOOL, SUB_AGENT_MARKER,
};
pub use config::{AppConfig, ModelDefaults, ServerConfig};
pub use error::{HiveError, Result};
pub use interpreter::{extract_json, flatten_arguments, interpret, Directive};
pub use llm::{
    default_profile, list_providers, load_provider, AnthropicClient, LanguageModel, ModelProfile,
    OllamaClient, OpenAIClient, ProviderRecord, StubModel,
};
pub use message::{Envelope, Payload, Query, Task, ToolOutcome};
pub use prompt::{
    render_system_prompt, render_template, DEFAULT_PROMPT_TEMPLATE, JSON_RETURN_FORMAT,
};
pub use server::{handle_message, router, serve, ServerState};
pub use session::{Session, SessionBinding, SessionStore};
pub use store::{AgentRecord, AgentStore};
pub use tool::{Tool, ToolContext, ToolRegistry};
