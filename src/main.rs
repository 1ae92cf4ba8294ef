use std::net::SocketAddr;
use std::path::PathBuf;
use std::process::ExitCode;

use clap::{Parser, Subcommand};
use tracing::error;
use tracing_subscriber::EnvFilter;

use hivemind::{
    create_agent_interactive, list_providers, load_provider, run_interactive, serve, tools, Agent,
    AgentRecord, AgentStore, AppConfig, HiveError, ServerState, SessionBinding, SessionStore,
};

#[derive(Parser)]
#[command(
    name = "hivemind",
    version,
    about = "Build and run AI agents on your computer"
)]
struct Cli {
    /// Name for a fresh agent
    #[arg(long, default_value = "Assistant")]
    name: String,

    /// Saved agent to load by name (created if missing)
    #[arg(long)]
    agent: Option<String>,

    /// LLM provider to use
    #[arg(long)]
    provider: Option<String>,

    /// List all supported providers
    #[arg(long)]
    providers: bool,

    /// List all saved agents
    #[arg(long)]
    agents: bool,

    /// Model id to use
    #[arg(long)]
    model: Option<String>,

    /// API key of the selected provider
    #[arg(long)]
    api_key: Option<String>,

    /// API base url of the selected provider
    #[arg(long)]
    api_base: Option<String>,

    /// Sampling temperature
    #[arg(long)]
    temperature: Option<f32>,

    /// Prompt template override: a string or a text file path
    #[arg(long)]
    system_prompt: Option<String>,

    /// Tool categories to attach, comma separated (`all` for everything)
    #[arg(long, value_delimiter = ',', default_value = "general")]
    load_tools: Vec<String>,

    /// Session id to record this conversation under
    #[arg(long)]
    session: Option<String>,

    /// List all saved sessions
    #[arg(long)]
    sessions: bool,

    /// Verbose mode: debug logging plus raw model replies
    #[arg(short, long)]
    verbose: bool,

    /// Take input from the microphone where a speech backend is configured
    #[arg(long)]
    audio: bool,

    /// Serve the realtime transport instead of the interactive loop
    #[arg(long)]
    server: bool,

    /// Configuration file
    #[arg(long)]
    config: Option<PathBuf>,

    #[command(subcommand)]
    command: Option<Command>,
}

#[derive(Subcommand)]
enum Command {
    /// Manage saved agents
    Agents {
        /// Name of the agent to manage
        name: Option<String>,

        /// Create a new agent interactively
        #[arg(long)]
        new: bool,

        /// Delete an agent by name or id
        #[arg(long)]
        delete: bool,

        /// List all saved agents
        #[arg(short, long)]
        list: bool,

        /// Agent id to delete
        #[arg(long)]
        id: Option<String>,
    },
    /// Manage tools
    Tools {
        /// List tools by category
        #[arg(short, long, default_value = "all")]
        list: String,
    },
}

#[tokio::main]
async fn main() -> ExitCode {
    let cli = Cli::parse();
    init_tracing(cli.verbose);

    match run(cli).await {
        Ok(()) => ExitCode::SUCCESS,
        Err(err) => {
            error!(error = %err, "fatal error");
            eprintln!("hivemind: {err}");
            eprintln!("Run `hivemind --help` for usage.");
            ExitCode::FAILURE
        }
    }
}

fn init_tracing(verbose: bool) {
    let default_filter = if verbose {
        "hivemind=debug"
    } else {
        "hivemind=info"
    };
    let filter =
        EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new(default_filter));
    tracing_subscriber::fmt().with_env_filter(filter).init();
}

async fn run(cli: Cli) -> hivemind::Result<()> {
    let config = AppConfig::load(cli.config.as_deref())?;
    let store = AgentStore::new(&config.agents_file);
    let sessions = SessionStore::new(&config.sessions_file);

    if let Some(command) = cli.command {
        return match command {
            Command::Agents {
                name,
                new,
                delete,
                list: _,
                id,
            } => manage_agents(&store, name, new, delete, id).await,
            Command::Tools { list } => {
                list_tools(&store, &list);
                Ok(())
            }
        };
    }

    if cli.providers {
        println!("\nAvailable Providers:");
        for (index, provider) in list_providers().iter().enumerate() {
            println!("[{index}] {provider}");
        }
        return Ok(());
    }
    if cli.agents {
        list_agents(&store).await;
        return Ok(());
    }
    if cli.sessions {
        println!("\nSaved Sessions:");
        for (index, session) in sessions.list().await.iter().enumerate() {
            println!("[{index}] [{}] {}", session.datetime, session.id);
        }
        return Ok(());
    }

    let provider = cli
        .provider
        .clone()
        .unwrap_or_else(|| config.model.provider.clone());
    let mut profile = config.model.profile(&provider);
    if let Some(model) = &cli.model {
        profile.model = model.clone();
    }
    if let Some(api_key) = &cli.api_key {
        profile.api_key = api_key.clone();
    }
    if let Some(api_base) = &cli.api_base {
        profile.base_url = api_base.clone();
    }
    if let Some(temperature) = cli.temperature {
        profile.temperature = temperature;
    }

    let mut agent = match &cli.agent {
        Some(name) => match store.load_by_name(name).await {
            Some(mut loaded) => {
                // An explicit provider flag rebinds a loaded agent.
                if cli.provider.is_some() {
                    loaded.llm = load_provider(&provider, profile.clone())?;
                }
                loaded
            }
            None => Agent::new(name.clone(), load_provider(&provider, profile.clone())?),
        },
        None => Agent::new(cli.name.clone(), load_provider(&provider, profile.clone())?),
    };

    agent.tools = tools::by_categories(&cli.load_tools, store.clone());
    agent.verbose = cli.verbose;
    if let Some(template) = &cli.system_prompt {
        agent.prompt_template = str_or_file(template);
    }

    store.update(&AgentRecord::from_agent(&agent)).await;
    let handle = agent.into_handle();

    if cli.server {
        let addr: SocketAddr = format!("{}:{}", config.server.host, config.server.port)
            .parse()
            .map_err(|err| HiveError::Protocol(format!("invalid server address: {err}")))?;
        serve(
            ServerState {
                agent: handle,
                store,
                sessions,
            },
            addr,
        )
        .await
    } else {
        if cli.audio {
            tracing::warn!("no speech backend is configured; reading text input");
        }
        let binding = cli.session.map(|id| SessionBinding {
            store: sessions.clone(),
            id,
        });
        run_interactive(handle, store, binding).await
    }
}

async fn manage_agents(
    store: &AgentStore,
    name: Option<String>,
    new: bool,
    delete: bool,
    id: Option<String>,
) -> hivemind::Result<()> {
    if new {
        match create_agent_interactive(store, None, false).await {
            Some(agent) => {
                println!("\nAgent {} added successfully!", agent.lock().await.name)
            }
            None => println!("\nError creating agent"),
        }
        return Ok(());
    }
    if delete {
        let target = id
            .or(name)
            .ok_or_else(|| HiveError::Protocol("specify agent name or id to delete".into()))?;
        if store.delete(&target).await {
            println!("\nAgent {target} deleted successfully!");
        } else {
            println!("\nAgent {target} couldn't be deleted");
        }
        return Ok(());
    }
    list_agents(store).await;
    Ok(())
}

async fn list_agents(store: &AgentStore) {
    println!("\nAvailable Agents:");
    for (index, agent) in store.list(None).await.iter().enumerate() {
        println!("[{index}] {} ({})", agent.name, agent.llm.platform());
    }
}

fn list_tools(store: &AgentStore, category: &str) {
    if !category.eq_ignore_ascii_case("all")
        && !tools::CATEGORIES
            .iter()
            .any(|known| known.eq_ignore_ascii_case(category))
    {
        println!(
            "Unknown category `{category}`. Categories: {}",
            tools::CATEGORIES.join(", ")
        );
        return;
    }
    println!("\nAvailable Tools:");
    let selected = tools::by_categories(&[category.to_string()], store.clone());
    for (index, tool) in selected.iter().enumerate() {
        println!("[{index}] {} [{}]", tool.name(), tool.category());
    }
}

/// Accept either an inline string or a path to a text file holding it.
fn str_or_file(value: &str) -> String {
    if value.len() > 100 {
        return value.to_string();
    }
    match std::fs::read_to_string(value) {
        Ok(contents) => contents,
        Err(_) => value.to_string(),
    }
}
