// Copyright 2026 Layne Penney
// SPDX-License-Identifier: AGPL-3.0-or-later

//! Codi CLI entry point.
//!
//! Your AI coding wingman - a hybrid assistant supporting Claude, OpenAI, and local models.

use std::str::FromStr;
use std::sync::Arc;

use clap::{Parser, Subcommand, ValueEnum};
use colored::Colorize;
use futures::StreamExt;

use codi::agent::approval::ApprovalPolicy;
use codi::agent::events::{AgentEvent, ToolResultOutcome};
use codi::agent::{Agent, AgentConfig, AgentOptions};
use codi::config::{self, CliOptions, ResolvedConfig};
use codi::providers::{self, ModelConfig, ProviderKind};
use codi::system_prompt::{self, SystemPromptInputs};
use codi::telemetry::NullTelemetryClient;
use codi::tools::handlers::{
    BashHandler, EditFileHandler, GlobHandler, GrepHandler, ListDirHandler, ReadFileHandler,
    ReadImageHandler, TaskHandler, TodoHandler, WriteFileHandler,
};
use codi::tools::ToolRegistry;

/// Codi version string.
const VERSION: &str = env!("CARGO_PKG_VERSION");

/// Codi - Your AI coding wingman.
#[derive(Parser)]
#[command(name = "codi")]
#[command(author, version, about = "Your AI coding wingman", long_about = None)]
struct Cli {
    /// AI provider to use
    #[arg(short, long, env = "CODI_PROVIDER")]
    provider: Option<Provider>,

    /// Model to use
    #[arg(short, long, env = "CODI_MODEL")]
    model: Option<String>,

    /// Base URL for the API
    #[arg(long, env = "CODI_BASE_URL")]
    base_url: Option<String>,

    /// RunPod endpoint ID
    #[arg(long, env = "RUNPOD_ENDPOINT_ID")]
    endpoint_id: Option<String>,

    /// Disable all tool use
    #[arg(long)]
    no_tools: bool,

    /// Enable context compression
    #[arg(short, long)]
    compress: bool,

    /// Provider for summarization
    #[arg(long)]
    summarize_provider: Option<String>,

    /// Model for summarization
    #[arg(long)]
    summarize_model: Option<String>,

    /// Session to load on startup
    #[arg(short, long)]
    session: Option<String>,

    /// Run a single prompt and exit
    #[arg(short = 'P', long)]
    prompt: Option<String>,

    /// Output format for non-interactive mode
    #[arg(short = 'f', long, value_enum, default_value = "text")]
    output_format: OutputFormat,

    /// Suppress spinners and progress output
    #[arg(short, long)]
    quiet: bool,

    /// Auto-approve all tool operations
    #[arg(short = 'y', long)]
    yes: bool,

    /// Show verbose output
    #[arg(long)]
    verbose: bool,

    /// Show debug output
    #[arg(long)]
    debug: bool,

    /// Show trace output (full payloads)
    #[arg(long)]
    trace: bool,

    #[command(subcommand)]
    command: Option<Commands>,
}

/// Available AI providers.
#[derive(Debug, Clone, Copy, ValueEnum)]
enum Provider {
    Anthropic,
    Openai,
    Ollama,
    Runpod,
}

impl std::fmt::Display for Provider {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            Provider::Anthropic => write!(f, "anthropic"),
            Provider::Openai => write!(f, "openai"),
            Provider::Ollama => write!(f, "ollama"),
            Provider::Runpod => write!(f, "runpod"),
        }
    }
}

/// Output format for non-interactive mode.
#[derive(Debug, Clone, Copy, ValueEnum)]
enum OutputFormat {
    Text,
    Json,
}

/// Subcommands for codi.
#[derive(Subcommand)]
enum Commands {
    /// Show configuration
    Config {
        #[command(subcommand)]
        action: Option<ConfigAction>,
    },

    /// Initialize a new configuration file
    Init,

    /// Show version information
    Version,
}

/// Config subcommand actions.
#[derive(Subcommand)]
enum ConfigAction {
    /// Show current configuration
    Show,
    /// Initialize a new config file
    Init,
    /// Show example configuration
    Example,
}

#[tokio::main]
async fn main() -> anyhow::Result<()> {
    init_tracing();
    let _ = dotenvy::dotenv();

    let cli = Cli::parse();

    if let Some(command) = cli.command {
        return handle_command(command).await;
    }

    let cli_options = CliOptions {
        provider: cli.provider.map(|p| p.to_string()),
        model: cli.model,
        base_url: cli.base_url,
        endpoint_id: cli.endpoint_id,
        no_tools: if cli.no_tools { Some(true) } else { None },
        compress: if cli.compress { Some(true) } else { None },
        summarize_provider: cli.summarize_provider,
        summarize_model: cli.summarize_model,
        session: cli.session,
    };

    let workspace_root = std::env::current_dir()?;
    let config = config::load_config(&workspace_root, cli_options)?;

    if !cli.quiet {
        print_startup_message(&config);
    }

    if let Some(prompt) = cli.prompt {
        return handle_prompt(&config, &workspace_root, &prompt, cli.output_format, cli.yes, cli.quiet).await;
    }

    run_repl(&config)
}

fn init_tracing() {
    use tracing_subscriber::EnvFilter;

    tracing_subscriber::fmt()
        .with_env_filter(EnvFilter::from_default_env())
        .init();
}

fn print_startup_message(config: &ResolvedConfig) {
    println!(
        "{} {} - Your AI coding wingman",
        "codi".cyan().bold(),
        format!("v{}", VERSION).dimmed()
    );
    println!(
        "Provider: {} | Model: {}",
        config.provider.green(),
        config.model.as_deref().unwrap_or("default").yellow()
    );
    println!();
}

async fn handle_command(command: Commands) -> anyhow::Result<()> {
    match command {
        Commands::Config { action } => {
            let workspace_root = std::env::current_dir()?;
            match action {
                Some(ConfigAction::Show) | None => {
                    let config = config::load_config(&workspace_root, CliOptions::default())?;
                    println!("{}", serde_json::to_string_pretty(&config)?);
                }
                Some(ConfigAction::Init) => {
                    let path = config::init_config(&workspace_root, None)?;
                    println!("Created config file: {}", path.display());
                }
                Some(ConfigAction::Example) => {
                    let example = config::get_example_config();
                    println!("{}", serde_json::to_string_pretty(&example)?);
                }
            }
        }
        Commands::Init => {
            let workspace_root = std::env::current_dir()?;
            let path = config::init_config(&workspace_root, None)?;
            println!("Created config file: {}", path.display());
        }
        Commands::Version => {
            println!("codi {}", VERSION);
        }
    }
    Ok(())
}

/// Resolve the configured model name (CLI/config override, else the first
/// entry in `models`, else a bare-bones fallback for the configured
/// provider) into the [`ModelConfig`] the backend adapters need.
fn resolve_model(config: &ResolvedConfig) -> anyhow::Result<ModelConfig> {
    let provider = ProviderKind::from_str(&config.provider)
        .map_err(|_| anyhow::anyhow!("unknown provider: {}", config.provider))?;

    let name = config.model.clone();
    if let Some(entry) = config
        .models
        .iter()
        .find(|m| Some(&m.name) == name.as_ref() || m.alias == name)
    {
        return Ok(ModelConfig {
            name: entry.name.clone(),
            provider,
            default_temperature: entry.temperature,
            max_context_tokens: entry.max_context_tokens,
            adaptive: entry.adaptive,
            input_cost_per_million: entry.input_cost_per_million,
            output_cost_per_million: entry.output_cost_per_million,
            cache_write_cost_per_million: entry.cache_write_cost_per_million,
            cache_read_cost_per_million: entry.cache_read_cost_per_million,
        });
    }

    Ok(ModelConfig {
        name: name.unwrap_or_else(|| "claude-sonnet-4-5".to_string()),
        provider,
        default_temperature: 1.0,
        max_context_tokens: 200_000,
        adaptive: false,
        input_cost_per_million: 0.0,
        output_cost_per_million: 0.0,
        cache_write_cost_per_million: 0.0,
        cache_read_cost_per_million: 0.0,
    })
}

fn api_key_env_var(provider: ProviderKind) -> &'static str {
    match provider {
        ProviderKind::Anthropic => "ANTHROPIC_API_KEY",
        ProviderKind::Vertex => "VERTEX_ACCESS_TOKEN",
        ProviderKind::OpenAi => "OPENAI_API_KEY",
    }
}

fn builtin_tool_registry() -> ToolRegistry {
    let mut registry = ToolRegistry::new();
    let handlers: Vec<Arc<dyn codi::tools::Tool>> = vec![
        Arc::new(BashHandler),
        Arc::new(EditFileHandler),
        Arc::new(GlobHandler),
        Arc::new(GrepHandler),
        Arc::new(ListDirHandler),
        Arc::new(ReadFileHandler),
        Arc::new(ReadImageHandler),
        Arc::new(WriteFileHandler),
        Arc::new(TodoHandler::default()),
    ];
    for handler in handlers {
        registry.register(handler).expect("builtin tool names are unique");
    }
    registry
}

async fn handle_prompt(
    config: &ResolvedConfig,
    workspace_root: &std::path::Path,
    prompt: &str,
    format: OutputFormat,
    auto_approve: bool,
    quiet: bool,
) -> anyhow::Result<()> {
    let model = resolve_model(config)?;
    let provider = model.provider;
    let api_key = std::env::var(api_key_env_var(provider)).unwrap_or_default();
    let backend = providers::create_backend(model.clone(), api_key, config.base_url.clone())?;

    // `task` needs its own view of the builtin tools to hand to the
    // subagents it spawns, so build that registry before the top-level one
    // that additionally carries `task` itself.
    let subagent_tool_registry = Arc::new(builtin_tool_registry());

    let enabled_tool_names: Vec<String> =
        subagent_tool_registry.names().into_iter().map(str::to_string).collect();
    let system_prompt = system_prompt::build_system_prompt(
        config,
        &SystemPromptInputs {
            workspace_root: &workspace_root.display().to_string(),
            project_context: None,
            model_name: &model.name,
            commit_signature: None,
            enabled_tool_names: &enabled_tool_names,
        },
    );

    let telemetry = Arc::new(NullTelemetryClient);
    let task_handler = TaskHandler::with_builtin_subagents(
        backend.clone(),
        subagent_tool_registry,
        system_prompt.clone(),
        AgentConfig::default(),
        workspace_root.to_path_buf(),
        telemetry.clone(),
    );

    let mut top_level_registry = builtin_tool_registry();
    top_level_registry.register(Arc::new(task_handler)).expect("task tool name is unique");
    if let Some(enabled) = &config.enabled_tools {
        top_level_registry = top_level_registry.filtered(enabled);
    }
    let tool_registry = Arc::new(top_level_registry);

    let save_dir = config
        .session_logging
        .save_dir
        .clone()
        .unwrap_or_else(|| workspace_root.join(".codi").join("sessions"));

    let options = AgentOptions {
        backend,
        tool_registry,
        approval_policy: ApprovalPolicy { auto_approve, ..ApprovalPolicy::default() },
        system_prompt,
        config: AgentConfig::default(),
        session_save_dir: save_dir,
        session_prefix: config.session_logging.session_prefix.clone(),
        working_directory: workspace_root.to_path_buf(),
        telemetry,
        profile_manager: None,
        active_profile: "default".to_string(),
        max_context_tokens: Some(model.max_context_tokens),
        approval_callback: None,
        user_input_callback: None,
        sampling_callback: None,
    };

    let mut agent = Agent::new(options)?;
    let mut response = String::new();
    let mut tool_calls = Vec::new();

    {
        let mut events = agent.act(prompt.to_string());
        while let Some(event) = events.next().await {
            match event? {
                AgentEvent::Assistant(assistant) => {
                    if !quiet && matches!(format, OutputFormat::Text) {
                        print!("{}", assistant.content);
                    }
                    response.push_str(&assistant.content);
                }
                AgentEvent::ToolCall(call) => {
                    if !quiet && matches!(format, OutputFormat::Text) {
                        println!("\n{} {}", "→".cyan(), call.tool_name.bold());
                    }
                    tool_calls.push(serde_json::json!({
                        "callId": call.call_id,
                        "tool": call.tool_name,
                        "arguments": call.arguments,
                    }));
                }
                AgentEvent::ToolResult(result) => {
                    if !quiet && matches!(format, OutputFormat::Text) {
                        match &result.outcome {
                            ToolResultOutcome::Result { content } => println!("{}", content.dimmed()),
                            ToolResultOutcome::Error { message } => {
                                println!("{}", format!("error: {message}").red())
                            }
                            ToolResultOutcome::Skipped { reason } => {
                                println!("{}", format!("skipped: {reason}").yellow())
                            }
                        }
                    }
                }
                _ => {}
            }
        }
    }

    if matches!(format, OutputFormat::Text) && !response.ends_with('\n') {
        println!();
    }

    if matches!(format, OutputFormat::Json) {
        let payload = serde_json::json!({
            "success": true,
            "response": response,
            "toolCalls": tool_calls,
        });
        println!("{}", serde_json::to_string_pretty(&payload)?);
    }

    Ok(())
}

fn run_repl(_config: &ResolvedConfig) -> anyhow::Result<()> {
    println!(
        "{}",
        "Interactive mode is not implemented for this crate; it exposes the agent core only."
            .yellow()
    );
    println!("Use --prompt/-P flag for non-interactive mode.");
    println!();
    println!("Example:");
    println!("  codi -P \"explain this code\" src/main.rs");

    Ok(())
}
