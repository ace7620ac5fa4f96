//! agentflow - sequential LLM agent pipelines
//!
//! Serves the HTTP API, or runs a single pipeline from the command line.

use agentflow::catalog::AgentCatalog;
use agentflow::config::AppConfig;
use agentflow::dispatcher::AgentDispatcher;
use agentflow::lifecycle_span;
use agentflow::llm::{LlmProvider, ModelSettings, ProviderBackend};
use agentflow::observability::logging::LogFormat;
use agentflow::observability::{init_default_logging, init_logging, metrics::metrics};
use agentflow::pipeline::{PipelineExecutor, RunState};
use agentflow::progress::{ConversationLog, StatusBoard};
use agentflow::server;
use clap::{Parser, Subcommand};
use std::net::SocketAddr;
use std::path::PathBuf;
use std::process;
use std::sync::Arc;
use tokio::signal;
use tracing::{error, info, warn, Instrument, Level};

/// Sequential LLM agent pipelines
#[derive(Parser)]
#[command(name = "agentflow")]
#[command(about = "Compose LLM agents into sequential pipelines")]
#[command(version)]
struct Cli {
    /// Configuration file path
    #[arg(short, long, value_name = "FILE")]
    config: Option<PathBuf>,

    /// Verbose logging (-v debug, -vv trace)
    #[arg(short, long, action = clap::ArgAction::Count)]
    verbose: u8,

    #[command(subcommand)]
    command: Commands,
}

#[derive(Subcommand)]
enum Commands {
    /// Serve the HTTP API
    Serve,
    /// Run one pipeline and print its result
    Run {
        /// Agent ids in execution order, comma separated
        #[arg(short, long, value_delimiter = ',', required = true)]
        agents: Vec<String>,
        /// Initial input text
        #[arg(short, long)]
        input: String,
    },
    /// List the agent catalog
    Agents,
    /// Validate configuration
    Config {
        /// Show current configuration
        #[arg(long)]
        show: bool,
    },
}

#[tokio::main]
async fn main() {
    let cli = Cli::parse();

    match cli.verbose {
        0 => init_default_logging(),
        n => {
            let level = if n == 1 { Level::DEBUG } else { Level::TRACE };
            let format = std::env::var("LOG_FORMAT").unwrap_or_else(|_| "compact".to_string());
            init_logging(level, LogFormat::parse(&format), false);
        }
    }

    info!("Starting agentflow v{}", env!("CARGO_PKG_VERSION"));

    let config = match load_configuration(&cli.config) {
        Ok(config) => config,
        Err(e) => {
            error!("Failed to load configuration: {}", e);
            process::exit(1);
        }
    };

    let result = match cli.command {
        Commands::Serve => serve(require(config)).await,
        Commands::Run { agents, input } => run_pipeline(require(config), agents, input).await,
        Commands::Agents => list_agents(config.as_ref()),
        Commands::Config { show } => handle_config_command(require(config), show),
    };

    match result {
        Ok(code) => {
            info!("Application shutdown complete");
            if code != 0 {
                process::exit(code);
            }
        }
        Err(e) => {
            error!("Command failed: {}", e);
            process::exit(1);
        }
    }
}

fn require(config: Option<AppConfig>) -> AppConfig {
    match config {
        Some(config) => config,
        None => {
            error!(
                "No configuration file found. Please provide one with -c/--config or create agentflow.toml"
            );
            process::exit(1);
        }
    }
}

fn load_configuration(
    config_path: &Option<PathBuf>,
) -> Result<Option<AppConfig>, Box<dyn std::error::Error>> {
    match config_path {
        Some(path) => {
            info!("Loading configuration from: {}", path.display());
            Ok(Some(AppConfig::load_from_file(path)?))
        }
        None => {
            let default_paths = ["agentflow.toml", "config/agentflow.toml"];

            for path_str in default_paths {
                let path = PathBuf::from(path_str);
                if path.exists() {
                    info!("Loading configuration from: {}", path.display());
                    return Ok(Some(AppConfig::load_from_file(&path)?));
                }
            }
            Ok(None)
        }
    }
}

/// Provider factory for creating LLM providers from configuration
struct LlmProviderFactory;

impl LlmProviderFactory {
    fn create_provider(
        config: &AppConfig,
    ) -> Result<Arc<dyn LlmProvider>, Box<dyn std::error::Error>> {
        use agentflow::llm::providers::{
            AnthropicConfig, AnthropicProvider, OpenAiConfig, OpenAiProvider,
        };

        match config.llm.provider.as_str() {
            "openai" => {
                let defaults = OpenAiConfig::default();
                let openai_config = OpenAiConfig {
                    api_key: config.get_llm_api_key()?,
                    base_url: config.llm.base_url.clone().unwrap_or(defaults.base_url),
                    timeout: config.llm.timeout(),
                };
                Ok(Arc::new(OpenAiProvider::new(openai_config)?))
            }
            "anthropic" => {
                let defaults = AnthropicConfig::default();
                let anthropic_config = AnthropicConfig {
                    api_key: config.get_llm_api_key()?,
                    base_url: config.llm.base_url.clone().unwrap_or(defaults.base_url),
                    timeout: config.llm.timeout(),
                    ..defaults
                };
                Ok(Arc::new(AnthropicProvider::new(anthropic_config)?))
            }
            provider => Err(format!("Unsupported LLM provider: {provider}").into()),
        }
    }
}

/// Bootstrap: wire catalog, provider and dispatcher into an executor
fn build_executor(config: &AppConfig) -> Result<PipelineExecutor, Box<dyn std::error::Error>> {
    let provider = LlmProviderFactory::create_provider(config)?;
    if !provider.available_models().contains(&config.llm.model) {
        warn!(
            provider = provider.name(),
            model = %config.llm.model,
            "Model is not in the provider's known model list"
        );
    }

    let backend = Arc::new(ProviderBackend::new(
        provider,
        ModelSettings::from(&config.llm),
    ));
    let catalog = Arc::new(AgentCatalog::from_config(config));
    info!(
        provider = backend.provider_name(),
        model = %config.llm.model,
        agents = catalog.len(),
        "Executor ready"
    );

    let dispatcher = AgentDispatcher::new(catalog, backend);
    Ok(PipelineExecutor::new(Arc::new(dispatcher)))
}

async fn serve(config: AppConfig) -> Result<i32, Box<dyn std::error::Error>> {
    metrics().set_service_state("initializing");
    let executor = build_executor(&config)?;

    let addr: SocketAddr = format!("{}:{}", config.server.host, config.listen_port()).parse()?;

    let mut sigint = signal::unix::signal(signal::unix::SignalKind::interrupt())?;
    let mut sigterm = signal::unix::signal(signal::unix::SignalKind::terminate())?;
    let shutdown = async move {
        tokio::select! {
            _ = sigint.recv() => info!("Received SIGINT, shutting down gracefully..."),
            _ = sigterm.recv() => info!("Received SIGTERM, shutting down gracefully..."),
        }
        metrics().set_service_state("stopping");
    };

    server::serve(executor, addr, shutdown)
        .instrument(lifecycle_span!(event = "serve", address = %addr))
        .await
        .map_err(|e| e as Box<dyn std::error::Error>)?;
    Ok(0)
}

async fn run_pipeline(
    config: AppConfig,
    agents: Vec<String>,
    input: String,
) -> Result<i32, Box<dyn std::error::Error>> {
    let executor = build_executor(&config)?;
    let catalog = executor.dispatcher().catalog().clone();
    let mut handle = executor.start(agents, input)?;

    let cancel = handle.cancel.clone();
    tokio::spawn(async move {
        if signal::ctrl_c().await.is_ok() {
            warn!("Interrupted, cancelling pipeline");
            cancel.cancel();
        }
    });

    while let Some(snapshot) = handle.snapshots.recv().await {
        eprintln!("{}", StatusBoard::project(&snapshot, &catalog));
    }
    let run = handle.outcome.await?;

    print!("{}", ConversationLog::project(&run, &catalog));
    match run.state {
        RunState::Succeeded => Ok(0),
        RunState::Failed => {
            if let Some((index, stage)) = run.failed_stage() {
                eprintln!(
                    "Stage {} ({}) failed: {}",
                    index + 1,
                    stage.agent_id,
                    stage.output.as_deref().unwrap_or_default()
                );
            }
            Ok(1)
        }
        RunState::Cancelled | RunState::Running => {
            eprintln!("Pipeline cancelled");
            Ok(130)
        }
    }
}

fn list_agents(config: Option<&AppConfig>) -> Result<i32, Box<dyn std::error::Error>> {
    let catalog = match config {
        Some(config) => AgentCatalog::from_config(config),
        None => AgentCatalog::builtin().clone(),
    };
    for profile in catalog.profiles() {
        println!(
            "{:<12} {} {} - {}",
            profile.id, profile.icon, profile.name, profile.description
        );
    }
    Ok(0)
}

fn handle_config_command(config: AppConfig, show: bool) -> Result<i32, Box<dyn std::error::Error>> {
    if show {
        println!("Current configuration:");
        println!("{}", toml::to_string_pretty(&config)?);
    }

    info!("Configuration validation complete");
    Ok(0)
}
