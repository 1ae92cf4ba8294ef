//! The agent orchestrator.
//!
//! An [`Agent`] owns its identity, one language-model binding, an ordered
//! tool set, and a tree of sub-agents. The free functions below drive the
//! two loops: [`run_interactive`] for a human-facing session and
//! [`run_task`] for an autonomous delegated run. Agents are shared between
//! loops as [`AgentHandle`]s; locks are only ever taken parent-to-child, so
//! a child handing off to its parent never deadlocks against the parent
//! rendering its sub-agent roster.

use std::future::Future;
use std::pin::Pin;
use std::sync::Arc;

use serde::{Deserialize, Serialize};
use serde_json::{json, Value};
use tokio::io::{AsyncBufReadExt, BufReader, Lines, Stdin};
use tokio::sync::Mutex;
use tokio::task::JoinHandle;
use tracing::{error, info, warn};
use uuid::Uuid;

use crate::error::{HiveError, Result};
use crate::interpreter::{extract_json, interpret, Directive};
use crate::llm::{default_profile, list_providers, load_provider, LanguageModel};
use crate::message::{Envelope, Query, Task, ToolOutcome};
use crate::prompt::{render_system_prompt, DEFAULT_PROMPT_TEMPLATE};
use crate::session::{Session, SessionBinding};
use crate::store::AgentStore;
use crate::tool::{Tool, ToolContext};

pub type AgentHandle = Arc<Mutex<Agent>>;

/// Reserved action: calls to this tool get the caller's id appended so
/// spawned agents know their parent.
pub const CREATE_AGENTS_TOOL: &str = "create agents";

/// Tools whose name contains this marker receive the calling agent itself.
pub const SUB_AGENT_MARKER: &str = "sub agent";

/// What a task loop does once the child produces a non-tool reply.
#[derive(Debug, Clone, Copy, Default, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum HandoffPolicy {
    /// Hand the reply to the parent exactly once, then terminate.
    #[default]
    SingleHandoff,
    /// Feed the parent's reply back to the child as its next query.
    ResumeChild,
}

/// Handle on a spawned task loop. Delegation is fire-and-forget by default,
/// but the parent can wait for or abort any child run it started.
pub struct TaskHandle {
    pub agent_name: String,
    join: JoinHandle<()>,
}

impl TaskHandle {
    pub async fn wait(self) {
        let _ = self.join.await;
    }

    pub fn abort(&self) {
        self.join.abort();
    }

    pub fn is_finished(&self) -> bool {
        self.join.is_finished()
    }
}

pub struct Agent {
    pub id: String,
    pub parent_id: Option<String>,
    pub name: String,
    pub llm: Box<dyn LanguageModel>,
    pub tools: Vec<Arc<dyn Tool>>,
    pub sub_agents: Vec<AgentHandle>,
    pub task: Option<Task>,
    pub prompt_template: String,
    pub autostart: bool,
    pub is_sub_agent: bool,
    pub verbose: bool,
    pub handoff: HandoffPolicy,
    pub task_handles: Vec<TaskHandle>,
}

impl Agent {
    pub fn new(name: impl Into<String>, llm: Box<dyn LanguageModel>) -> Self {
        Self {
            id: Uuid::new_v4().simple().to_string(),
            parent_id: None,
            name: name.into(),
            llm,
            tools: Vec::new(),
            sub_agents: Vec::new(),
            task: None,
            prompt_template: DEFAULT_PROMPT_TEMPLATE.to_string(),
            autostart: false,
            is_sub_agent: false,
            verbose: false,
            handoff: HandoffPolicy::default(),
            task_handles: Vec::new(),
        }
    }

    pub fn into_handle(self) -> AgentHandle {
        Arc::new(Mutex::new(self))
    }

    pub fn available_tools(&self) -> Vec<String> {
        self.tools.iter().map(|tool| tool.name().to_string()).collect()
    }

    /// Attach a tool. Names are unique per agent; duplicates are rejected.
    pub fn add_tool(&mut self, tool: Arc<dyn Tool>) -> Result<()> {
        if self.tool_by_name(tool.name()).is_some() {
            return Err(HiveError::DuplicateTool(tool.name().to_string()));
        }
        self.tools.push(tool);
        Ok(())
    }

    /// Case-insensitive lookup, first match wins.
    pub fn tool_by_name(&self, name: &str) -> Option<Arc<dyn Tool>> {
        self.tools
            .iter()
            .find(|tool| tool.name().eq_ignore_ascii_case(name))
            .cloned()
    }

    pub fn add_sub_agent(&mut self, agent: AgentHandle) {
        self.sub_agents.push(agent);
    }

    /// Case-insensitive lookup over the live sub-agent roster.
    pub async fn sub_agent_by_name(&self, name: &str) -> Option<AgentHandle> {
        for child in &self.sub_agents {
            if child.lock().await.name.eq_ignore_ascii_case(name) {
                return Some(child.clone());
            }
        }
        None
    }

    /// Build the turn envelope for a query, registering any freshly spawned
    /// child on the way. Children flagged for autostart are returned so the
    /// caller can start their task loops with itself as parent context.
    pub async fn build_turn(&mut self, query: Query, role: &str) -> (Envelope, Vec<AgentHandle>) {
        match query {
            Query::Text(text) => match extract_json(&text) {
                Some(object) if object.get("result").is_some() => {
                    let result = object.get("result").cloned().unwrap_or(Value::Null);
                    (self.route_value(role, result), Vec::new())
                }
                _ => (Envelope::text(role, text), Vec::new()),
            },
            Query::Outcome(outcome) => match outcome {
                ToolOutcome::Image(reference) => (Envelope::image(role, reference), Vec::new()),
                ToolOutcome::SpawnAgent { agent, note } => {
                    let mut autostart = Vec::new();
                    {
                        let mut child = agent.lock().await;
                        child.parent_id = Some(self.id.clone());
                        if child.autostart && child.task.is_some() {
                            autostart.push(agent.clone());
                        }
                    }
                    self.add_sub_agent(agent);
                    (Envelope::text(role, note), autostart)
                }
                ToolOutcome::Json(value) => (self.route_value(role, value), Vec::new()),
                ToolOutcome::Text(text) => (Envelope::text(role, text), Vec::new()),
            },
        }
    }

    /// Route a result payload: a `["image", <ref>]` tagged pair becomes an
    /// image envelope, everything else is carried as text verbatim.
    fn route_value(&self, role: &str, value: Value) -> Envelope {
        if let Value::Array(items) = &value {
            if items.first().and_then(Value::as_str) == Some("image") {
                if let Some(reference) = items.get(1).and_then(Value::as_str) {
                    return Envelope::image(role, reference);
                }
            }
        }
        match value {
            Value::String(text) => Envelope::text(role, text),
            other => Envelope::text(role, other.to_string()),
        }
    }

    /// One model exchange: render the system prompt, build the turn, call
    /// the model, and append both envelopes to the owned history (the reply
    /// under this agent's own name).
    pub async fn dispatch(&mut self, query: Query, role: &str) -> Result<(String, Vec<AgentHandle>)> {
        let system_prompt = render_system_prompt(self).await;
        self.llm.profile_mut().system_prompt = system_prompt;

        let (turn, autostart) = self.build_turn(query, role).await;
        let reply = self.complete_turn(turn).await?;
        Ok((reply, autostart))
    }

    /// Handoff dispatch: the envelope message carries the child's name tag
    /// verbatim, bypassing turn classification.
    pub async fn dispatch_handoff(&mut self, child_name: &str, reply: &str) -> Result<String> {
        let system_prompt = render_system_prompt(self).await;
        self.llm.profile_mut().system_prompt = system_prompt;
        self.complete_turn(Envelope::text("user", format!("{child_name}: {reply}")))
            .await
    }

    async fn complete_turn(&mut self, turn: Envelope) -> Result<String> {
        let reply = self.llm.complete(&turn).await?;

        let history = &mut self.llm.profile_mut().chat_history;
        history.push(turn);
        history.push(Envelope::text(self.name.clone(), reply.clone()));

        if self.verbose {
            println!("{reply}");
        }
        Ok(reply)
    }

    /// Argument normalization for reserved actions: the `create agents`
    /// tool always receives the caller's id as its trailing argument.
    pub fn normalize_arguments(&self, function: &str, mut arguments: Vec<Value>) -> Vec<Value> {
        if function.eq_ignore_ascii_case(CREATE_AGENTS_TOOL) {
            arguments.push(Value::String(self.id.clone()));
        }
        arguments
    }
}

/// Result of acting on one interpreted model reply.
pub enum StepOutcome {
    /// A tool ran; its outcome re-enters the loop as the next query.
    Continue(ToolOutcome),
    /// Terminal for this cycle; the text is surfaced to the human or parent.
    Display(String),
}

/// Act on an interpreted reply for `caller`. Tool lookups that miss and
/// tool runs that fail degrade to displaying the call payload; neither
/// crashes the loop.
pub async fn execute_directive(directive: Directive, caller: &AgentHandle) -> StepOutcome {
    match directive {
        Directive::Final(value) => StepOutcome::Display(render_value(&value)),
        Directive::Fallback(object) => StepOutcome::Display(render_value(&object)),
        Directive::Malformed(text) => StepOutcome::Display(text),
        Directive::ToolCall {
            function,
            arguments,
        } => {
            let (tool, arguments) = {
                let guard = caller.lock().await;
                let normalized = guard.normalize_arguments(&function, arguments);
                (guard.tool_by_name(&function), normalized)
            };
            let raw = json!({
                "type": "function_call",
                "function": function.clone(),
                "arguments": arguments.clone(),
            });
            let Some(tool) = tool else {
                warn!(error = %HiveError::ToolNotFound(function), "echoing call payload");
                return StepOutcome::Display(raw.to_string());
            };

            info!(tool = %tool.name(), arguments = %raw["arguments"], "running tool");
            let ctx = if tool.name().to_ascii_lowercase().contains(SUB_AGENT_MARKER) {
                ToolContext::with_caller(caller.clone())
            } else {
                ToolContext::default()
            };
            match tool.run(arguments, &ctx).await {
                Ok(outcome) => StepOutcome::Continue(outcome),
                Err(err) => {
                    warn!(tool = %tool.name(), error = %err, "tool failed; echoing call payload");
                    StepOutcome::Display(raw.to_string())
                }
            }
        }
    }
}

fn render_value(value: &Value) -> String {
    match value.as_str() {
        Some(text) => text.to_string(),
        None => value.to_string(),
    }
}

/// Drive one query to a displayable reply, looping internally on tool-call
/// results. Sub-agents spawned along the way start with `handle` as parent.
pub async fn converse(handle: &AgentHandle, text: impl Into<String>) -> Result<String> {
    let mut query = Query::Text(text.into());
    loop {
        let (reply, autostart) = {
            let mut agent = handle.lock().await;
            agent.dispatch(query, "User").await?
        };
        start_tasks(handle, autostart).await;

        match execute_directive(interpret(&reply), handle).await {
            StepOutcome::Continue(outcome) => query = Query::Outcome(outcome),
            StepOutcome::Display(text) => return Ok(text),
        }
    }
}

// Type-erased to a boxed `Send` future at its own definition: the cycle
// spawn_task -> run_task -> start_tasks -> spawn_task is otherwise an opaque
// `Send` inference loop the compiler cannot resolve.
fn start_tasks<'a>(
    parent: &'a AgentHandle,
    children: Vec<AgentHandle>,
) -> Pin<Box<dyn Future<Output = ()> + Send + 'a>> {
    Box::pin(async move {
        for child in children {
            let task = spawn_task(child, parent.clone()).await;
            parent.lock().await.task_handles.push(task);
        }
    })
}

/// Start a child's autonomous task loop on its own tokio task, named after
/// the agent.
pub async fn spawn_task(child: AgentHandle, parent: AgentHandle) -> TaskHandle {
    let agent_name = child.lock().await.name.clone();
    let loop_name = agent_name.to_lowercase();
    let join = tokio::spawn(async move {
        if let Err(err) = run_task(child, parent).await {
            error!(agent = %loop_name, error = %err, "task loop terminated");
        }
    });
    TaskHandle { agent_name, join }
}

/// The autonomous task loop. Seeded with the child's task description; tool
/// calls loop internally, the first plain reply triggers the handoff policy.
pub async fn run_task(child: AgentHandle, parent: AgentHandle) -> Result<()> {
    let (seed, child_name, policy) = {
        let guard = child.lock().await;
        let Some(task) = guard.task.clone() else {
            return Ok(());
        };
        (task.description, guard.name.clone(), guard.handoff)
    };

    let mut query = Query::Text(seed);
    loop {
        let (reply, autostart) = {
            let mut guard = child.lock().await;
            guard.dispatch(query, "User").await?
        };
        start_tasks(&child, autostart).await;

        match execute_directive(interpret(&reply), &child).await {
            StepOutcome::Continue(outcome) => query = Query::Outcome(outcome),
            StepOutcome::Display(_) => {
                // Hand the reply to the parent, tagged with the child's name.
                let parent_reply = {
                    let mut guard = parent.lock().await;
                    guard.dispatch_handoff(&child_name, &reply).await?
                };

                let displayed = match execute_directive(interpret(&parent_reply), &parent).await {
                    StepOutcome::Continue(outcome) => outcome.render(),
                    StepOutcome::Display(text) => text,
                };
                let parent_name = parent.lock().await.name.clone();
                println!("\n\n{parent_name}: {displayed}");

                match policy {
                    HandoffPolicy::SingleHandoff => return Ok(()),
                    HandoffPolicy::ResumeChild => query = Query::Text(displayed),
                }
            }
        }
    }
}

/// Delegation entry point: assign `task_description` to the named child and
/// start its task loop. A missing child notifies the caller's own model
/// instead of failing; returns whether a task was started.
pub async fn call_sub_agent(caller: &AgentHandle, agent_name: &str, task_description: &str) -> bool {
    let found = {
        let guard = caller.lock().await;
        guard.sub_agent_by_name(agent_name).await
    };

    match found {
        Some(child) => {
            child.lock().await.task = Some(Task::new(task_description));
            let task = spawn_task(child, caller.clone()).await;
            caller.lock().await.task_handles.push(task);
            true
        }
        None => {
            warn!(error = %HiveError::SubAgentNotFound(agent_name.to_string()), "notifying caller");
            let notice = format!("Sub-agent with name {agent_name} was not found.");
            let result = {
                let mut guard = caller.lock().await;
                guard.dispatch(Query::Text(notice), "User").await
            };
            if let Err(err) = result {
                warn!(error = %err, "failed to notify caller about missing sub-agent");
            }
            false
        }
    }
}

/// The human-facing loop: read a line, handle control commands locally,
/// otherwise dispatch through [`converse`] and print the reply. Unhandled
/// errors end this session only.
pub async fn run_interactive(
    handle: AgentHandle,
    store: AgentStore,
    session: Option<SessionBinding>,
) -> Result<()> {
    let mut lines = BufReader::new(tokio::io::stdin()).lines();

    loop {
        let Some(line) = prompt_line(&mut lines, "\nUser (q to quit): ").await? else {
            return Ok(());
        };
        let input = line.trim().to_string();
        if input.is_empty() {
            continue;
        }

        match input.to_lowercase().as_str() {
            "q" | "quit" | "exit" => {
                println!("Exiting...");
                return Ok(());
            }
            "add agent" => {
                let parent_id = handle.lock().await.id.clone();
                match create_agent_interactive(&store, Some(parent_id), true).await {
                    Some(child) => {
                        let name = child.lock().await.name.clone();
                        handle.lock().await.add_sub_agent(child);
                        println!("\nAgent {name} added successfully!");
                    }
                    None => println!("\nError creating agent"),
                }
                continue;
            }
            "list agents" => {
                let parent_id = handle.lock().await.id.clone();
                println!("\nAvailable Agents:");
                for (index, agent) in store.list(Some(&parent_id)).await.iter().enumerate() {
                    println!("[{index}] {}", agent.name);
                }
                continue;
            }
            _ => {}
        }

        match converse(&handle, input).await {
            Ok(reply) => {
                let name = handle.lock().await.name.clone();
                println!("\n{name}: {reply}");
                if let Some(binding) = &session {
                    snapshot_session(&handle, binding).await;
                }
            }
            Err(err) => {
                error!(error = %err, "interactive loop terminated");
                return Ok(());
            }
        }
    }
}

async fn snapshot_session(handle: &AgentHandle, binding: &SessionBinding) {
    let (agent_id, chat) = {
        let guard = handle.lock().await;
        (guard.id.clone(), guard.llm.profile().chat_history.clone())
    };
    binding
        .store
        .save(Session {
            id: binding.id.clone(),
            agent_id,
            chat,
            datetime: chrono::Utc::now(),
        })
        .await;
}

async fn prompt_line(lines: &mut Lines<BufReader<Stdin>>, prompt: &str) -> Result<Option<String>> {
    use std::io::Write;
    print!("{prompt}");
    std::io::stdout().flush()?;
    Ok(lines.next_line().await?)
}

/// Interactive agent creation: prompts for a name, a provider from the
/// listing, a model, and an API key, then persists the new agent. Failures
/// are logged and resolve to `None`.
pub async fn create_agent_interactive(
    store: &AgentStore,
    parent_id: Option<String>,
    is_sub_agent: bool,
) -> Option<AgentHandle> {
    let mut lines = BufReader::new(tokio::io::stdin()).lines();

    let name = match prompt_line(&mut lines, "\n[Enter agent name]: ").await {
        Ok(Some(name)) if !name.trim().is_empty() => name.trim().to_string(),
        _ => return None,
    };

    let providers = list_providers();
    println!("\nAvailable LLMs:");
    for (index, provider) in providers.iter().enumerate() {
        println!("[{index}] {provider}");
    }
    let platform = loop {
        match prompt_line(&mut lines, "\n[Select LLM]: ").await {
            Ok(Some(choice)) => {
                if let Ok(index) = choice.trim().parse::<usize>() {
                    if index < providers.len() {
                        break providers[index].to_string();
                    }
                }
                println!("Invalid choice.");
            }
            _ => return None,
        }
    };

    let mut profile = default_profile(&platform);
    if let Ok(Some(model)) =
        prompt_line(&mut lines, &format!("\nEnter model name [{}]: ", profile.model)).await
    {
        if !model.trim().is_empty() {
            profile.model = model.trim().to_string();
        }
    }
    if let Ok(Some(key)) = prompt_line(&mut lines, "\nEnter API key (blank to skip): ").await {
        if !key.trim().is_empty() {
            profile.api_key = key.trim().to_string();
        }
    }

    let llm = match load_provider(&platform, profile) {
        Ok(llm) => llm,
        Err(err) => {
            error!(error = %err, "failed to load provider");
            return None;
        }
    };

    let mut agent = Agent::new(name, llm);
    agent.parent_id = parent_id;
    agent.is_sub_agent = is_sub_agent;
    store.create(agent).await
}
