//! quill - editor-embeddable LLM agent CLI

mod config;
mod context;
mod display;
mod tools;

use std::sync::Arc;

use anyhow::bail;
use clap::Parser;
use quill_ai::{ChatOptions, ProviderKind, create_provider};
use quill_agent::{
    Agent, AgentConfig, EditorSurface, Memory, NullEditor, Operator, ToolRegistry,
};
use tracing_subscriber::EnvFilter;

use config::Config;
use display::{StdoutSink, TerminalOperator};

/// quill - conversational coding agent
#[derive(Parser, Debug)]
#[command(name = "quill")]
#[command(author, version, about, long_about = None)]
struct Args {
    /// The prompt to send
    prompt: Vec<String>,

    /// Provider (openai, anthropic, google, ollama, openrouter)
    #[arg(short, long)]
    provider: Option<String>,

    /// Model to use (overrides the provider's configured model)
    #[arg(short, long)]
    model: Option<String>,

    /// Sampling temperature
    #[arg(long)]
    temperature: Option<f32>,

    /// Maximum tokens per response
    #[arg(long)]
    max_tokens: Option<u32>,

    /// Disable tool calling for this invocation
    #[arg(long)]
    no_tools: bool,

    /// Skip the plan-approval workflow (direct execution)
    #[arg(long)]
    no_approval: bool,

    /// Disable per-project history/summary persistence
    #[arg(long)]
    no_session: bool,

    /// Force regeneration of the project context file and exit
    #[arg(long)]
    refresh_context: bool,

    /// Force summary compaction of the history log and exit
    #[arg(long)]
    compact: bool,

    /// Print the pending plan and exit
    #[arg(long)]
    show_plan: bool,

    /// Delete the pending plan and exit
    #[arg(long)]
    clear_plan: bool,

    /// Write an example config file and exit
    #[arg(long)]
    init_config: bool,
}

#[tokio::main]
async fn main() -> anyhow::Result<()> {
    tracing_subscriber::fmt()
        .with_env_filter(EnvFilter::from_default_env())
        .with_writer(std::io::stderr)
        .init();

    let args = Args::parse();

    if args.init_config {
        let path = Config::config_path();
        if path.exists() {
            println!("Config already exists at {}", path.display());
        } else {
            if let Some(parent) = path.parent() {
                std::fs::create_dir_all(parent)?;
            }
            std::fs::write(&path, config::example_config())?;
            println!("Wrote example config to {}", path.display());
        }
        return Ok(());
    }

    let config = Config::load();
    let cwd = std::env::current_dir()?;

    let session_mode = !args.no_session && config.session_mode.unwrap_or(true);
    let memory = if session_mode {
        Memory::new(&cwd, config.memory_config())
    } else {
        Memory::disabled()
    };

    if args.show_plan {
        match memory.load_plan() {
            Some(plan) => println!("{}", plan),
            None => println!("No pending plan."),
        }
        return Ok(());
    }
    if args.clear_plan {
        memory.clear_plan();
        println!("Pending plan cleared.");
        return Ok(());
    }

    let kind = ProviderKind::parse(
        args.provider
            .as_deref()
            .or(config.provider.as_deref())
            .unwrap_or("openai"),
    );
    let provider = create_provider(kind, config.provider_config(kind, args.model.as_deref()))?;

    let options = ChatOptions {
        temperature: args.temperature.or(config.temperature).unwrap_or(0.7),
        max_tokens: args.max_tokens.or(config.max_tokens).unwrap_or(2000),
    };

    let operator: Arc<dyn Operator> = Arc::new(TerminalOperator::new(true));
    let editor: Arc<dyn EditorSurface> = Arc::new(NullEditor);
    let registry = ToolRegistry::new(
        tools::builtin_tools(
            operator.clone(),
            editor,
            config.memory_config().recent_window_bytes,
        ),
        operator.clone(),
        config.require_tool_approval.unwrap_or(true),
    );

    if args.compact {
        memory.compact(provider.as_ref(), &options).await?;
        println!("Summary compaction complete.");
        return Ok(());
    }

    if args.refresh_context {
        context::generate(provider.as_ref(), &registry, &memory, &options).await?;
        println!("Project context written to {}", memory.context_path().display());
        return Ok(());
    }

    let prompt = args.prompt.join(" ");
    if prompt.trim().is_empty() {
        bail!("No prompt given. Run `quill --help` for usage.");
    }

    // Keep the project context fresh for session-backed conversations
    if session_mode && provider.supports_tools() && context::is_stale(&memory) {
        if let Err(e) = context::generate(provider.as_ref(), &registry, &memory, &options).await {
            tracing::warn!("Project context generation failed: {}", e);
        }
    }

    let agent_config = AgentConfig {
        persona: config
            .persona
            .clone()
            .unwrap_or_else(|| AgentConfig::default().persona),
        language: config.language.clone(),
        temperature: options.temperature,
        max_tokens: options.max_tokens,
        enable_tools: !args.no_tools && config.enable_tools.unwrap_or(true),
        require_plan_approval: !args.no_approval && config.require_plan_approval.unwrap_or(true),
        ..Default::default()
    };

    let agent = Agent::new(
        agent_config,
        provider,
        registry,
        memory,
        Arc::new(StdoutSink),
        operator,
    );

    agent.run(&prompt).await?;
    println!();
    Ok(())
}
