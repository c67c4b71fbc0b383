//! Research Orchestrator Server

use std::net::SocketAddr;

use clap::Parser;
use research_core::ModelCandidate;
use tokio::net::TcpListener;
use tracing::info;
use tracing_subscriber::EnvFilter;

use research_orchestrator::config::{ChatConfig, PollConfig, StuckPolicy, TaskApiConfig};
use research_orchestrator::{create_router, AppState, Config};

/// Research orchestrator: compose, submit, and poll research runs.
#[derive(Parser, Debug)]
#[command(name = "research-orchestrator", about = "Research-job orchestrator HTTP server")]
struct Args {
    /// HTTP server address
    #[arg(long, env = "RESEARCH_BIND_ADDR", default_value = "0.0.0.0:8080")]
    bind_addr: String,

    /// Base URL of the OpenAI-compatible chat API
    #[arg(long, env = "CHAT_API_BASE_URL", default_value = "https://api.openai.com/v1")]
    chat_base_url: String,

    /// Chat API key
    #[arg(long, env = "CHAT_API_KEY", hide_env_values = true)]
    chat_api_key: Option<String>,

    /// Compose models in fallback order
    #[arg(
        long = "compose-model",
        env = "COMPOSE_MODELS",
        value_delimiter = ',',
        default_value = "gpt-4o-mini,gpt-4.1-mini,gpt-4o"
    )]
    compose_models: Vec<String>,

    /// Per-model compose deadline in seconds
    #[arg(long, default_value = "25")]
    compose_timeout_secs: u64,

    /// Base URL of the task API
    #[arg(long, env = "TASK_API_BASE_URL", default_value = "https://api.parallel.ai")]
    task_api_base_url: String,

    /// Task API key
    #[arg(long, env = "TASK_API_KEY", hide_env_values = true)]
    task_api_key: Option<String>,

    /// Run-creation deadline in seconds
    #[arg(long, default_value = "20")]
    submit_timeout_secs: u64,

    /// Result-fetch wait when callers do not pass waitSec
    #[arg(long, default_value = "25")]
    default_wait_secs: u64,

    /// Grace added to the queue estimate before a run is reported stuck
    #[arg(long, default_value = "10")]
    stuck_grace_secs: u64,

    /// Queue estimate for the lite tier (seconds)
    #[arg(long, default_value = "90")]
    estimate_lite_secs: u64,

    /// Queue estimate for the base tier (seconds)
    #[arg(long, default_value = "120")]
    estimate_base_secs: u64,

    /// Queue estimate for the core tier (seconds)
    #[arg(long, default_value = "120")]
    estimate_core_secs: u64,

    /// Queue estimate for the pro tier (seconds)
    #[arg(long, default_value = "180")]
    estimate_pro_secs: u64,

    /// Queue estimate for the ultra tier (seconds)
    #[arg(long, default_value = "240")]
    estimate_ultra_secs: u64,
}

impl From<Args> for Config {
    fn from(args: Args) -> Self {
        let defaults = Config::default();
        Self {
            bind_addr: args.bind_addr,
            chat: ChatConfig {
                base_url: args.chat_base_url,
                api_key: args.chat_api_key.filter(|k| !k.is_empty()),
                models: args
                    .compose_models
                    .iter()
                    .map(|m| m.trim())
                    .filter(|m| !m.is_empty())
                    .map(ModelCandidate::new)
                    .collect(),
                attempt_timeout_secs: args.compose_timeout_secs,
                ..defaults.chat
            },
            task_api: TaskApiConfig {
                base_url: args.task_api_base_url,
                api_key: args.task_api_key.filter(|k| !k.is_empty()),
                submit_timeout_secs: args.submit_timeout_secs,
            },
            poll: PollConfig {
                default_wait_secs: args.default_wait_secs,
                stuck: StuckPolicy {
                    grace_secs: args.stuck_grace_secs,
                    lite_secs: args.estimate_lite_secs,
                    base_secs: args.estimate_base_secs,
                    core_secs: args.estimate_core_secs,
                    pro_secs: args.estimate_pro_secs,
                    ultra_secs: args.estimate_ultra_secs,
                },
                ..defaults.poll
            },
        }
    }
}

#[tokio::main]
async fn main() -> Result<(), Box<dyn std::error::Error>> {
    // Initialize tracing
    let filter = EnvFilter::from_default_env()
        .add_directive("research_orchestrator=info".parse()?)
        .add_directive("tower_http=info".parse()?);
    tracing_subscriber::fmt()
        .with_env_filter(filter)
        .with_target(true)
        .init();

    // Load config
    let config = Config::from(Args::parse());
    let http_addr: SocketAddr = config.bind_addr.parse()?;

    info!(
        compose_models = ?config.chat.models,
        chat_key = config.chat.api_key.is_some(),
        task_api = %config.task_api.base_url,
        task_key = config.task_api.api_key.is_some(),
        "Starting research orchestrator"
    );

    // Create shared state
    let state = AppState::new(&config)?;

    // Start HTTP server
    let listener = TcpListener::bind(http_addr).await?;
    info!("HTTP server listening on {}", http_addr);

    axum::serve(listener, create_router(state)).await?;

    Ok(())
}
