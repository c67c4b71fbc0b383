//! Research CLI - Command line interface for the research orchestrator.

use clap::{Args, Parser, Subcommand};
use serde::Serialize;
use tracing::info;
use tracing_subscriber::EnvFilter;

use research_client::{
    ComposeRequest, CreateRunRequest, HttpClient, LoopOutcome, PollLoop, PollResponse, RunTracker,
};
use research_core::{PollStatus, ProcessorTier, RunId};

type CliResult = Result<(), Box<dyn std::error::Error>>;

/// Research CLI - compose, submit, and follow research runs
#[derive(Parser)]
#[command(name = "research")]
#[command(about = "CLI for the research orchestrator", long_about = None)]
struct Cli {
    /// Orchestrator address
    #[arg(short, long, env = "RESEARCH_ADDR", default_value = "http://127.0.0.1:8080")]
    addr: String,

    #[command(subcommand)]
    command: Commands,
}

#[derive(Subcommand)]
enum Commands {
    /// Turn a free-form request into a task input and output description
    Compose(ComposeArgs),

    /// Submit a research run
    #[command(name = "create-run")]
    CreateRun(CompanyArgs),

    /// Poll a run once, or until it settles with --follow
    Poll {
        /// Run ID
        run_id: String,

        /// Result-fetch wait in seconds
        #[arg(short, long)]
        wait_sec: Option<u64>,

        /// Processor tier hint for stuck detection
        #[arg(short, long)]
        processor: Option<ProcessorTier>,

        /// Keep polling until the run completes or fails
        #[arg(short, long)]
        follow: bool,

        #[command(flatten)]
        follow_opts: FollowArgs,
    },

    /// Compose, submit, and follow a run to completion
    Research {
        #[command(flatten)]
        compose: ComposeArgs,

        #[command(flatten)]
        company: CompanyArgs,

        /// Result-fetch wait in seconds for each poll
        #[arg(short, long)]
        wait_sec: Option<u64>,

        #[command(flatten)]
        follow_opts: FollowArgs,
    },

    /// Check orchestrator health
    Health,
}

#[derive(Args)]
struct ComposeArgs {
    /// The research request in plain language
    #[arg(long)]
    prompt: String,

    /// Background about the requesting business
    #[arg(long)]
    business_context: Option<String>,

    /// Facts about the company being researched
    #[arg(long)]
    company_block: Option<String>,
}

#[derive(Args)]
struct CompanyArgs {
    /// Company to research
    #[arg(long)]
    company_name: String,

    /// Company website
    #[arg(long)]
    website: Option<String>,

    /// Organisation number
    #[arg(long)]
    org_number: Option<String>,

    /// Processor tier (lite, base, core, pro, ultra)
    #[arg(short, long)]
    processor: Option<ProcessorTier>,

    /// Task input; defaults to one built from the company fields
    #[arg(long)]
    input: Option<String>,

    /// Output description or JSON schema
    #[arg(long)]
    output_schema: Option<String>,
}

#[derive(Args)]
struct FollowArgs {
    /// Stop at the first stuck report instead of polling through it
    #[arg(long)]
    stop_on_stuck: bool,

    /// Give up after this many polls
    #[arg(long)]
    max_attempts: Option<u32>,
}

impl From<&CompanyArgs> for CreateRunRequest {
    fn from(args: &CompanyArgs) -> Self {
        Self {
            company_name: args.company_name.clone(),
            website: args.website.clone(),
            org_number: args.org_number.clone(),
            processor: args.processor,
            input: args.input.clone(),
            output_schema: args.output_schema.clone(),
        }
    }
}

#[tokio::main]
async fn main() -> CliResult {
    // Progress goes to stderr so stdout stays machine-readable.
    let filter = EnvFilter::from_default_env().add_directive("research=info".parse()?);
    tracing_subscriber::fmt()
        .with_env_filter(filter)
        .with_writer(std::io::stderr)
        .with_target(false)
        .init();

    let cli = Cli::parse();
    let client = HttpClient::new(&cli.addr);

    match cli.command {
        Commands::Compose(args) => {
            compose(&client, &args, None).await?;
        }
        Commands::CreateRun(args) => {
            let created = client.create_run(&CreateRunRequest::from(&args)).await?;
            print_json(&created)?;
        }
        Commands::Poll {
            run_id,
            wait_sec,
            processor,
            follow,
            follow_opts,
        } => {
            let run_id = RunId::new(run_id);
            if follow {
                let mut poll_loop = poll_loop(wait_sec, &follow_opts);
                if let Some(tier) = processor {
                    poll_loop = poll_loop.with_processor(tier);
                }
                follow_run(&client, &poll_loop, &run_id).await?;
            } else {
                let response = client.poll_run(&run_id, wait_sec, processor).await?;
                print_json(&response)?;
            }
        }
        Commands::Research {
            compose: compose_args,
            company,
            wait_sec,
            follow_opts,
        } => {
            research(&client, &compose_args, &company, wait_sec, &follow_opts).await?;
        }
        Commands::Health => {
            let healthy = client.health().await?;
            println!("{}", if healthy { "ok" } else { "unhealthy" });
            if !healthy {
                return Err("orchestrator is unhealthy".into());
            }
        }
    }

    Ok(())
}

async fn compose(
    client: &HttpClient,
    args: &ComposeArgs,
    processor: Option<ProcessorTier>,
) -> Result<research_client::ComposeResponse, Box<dyn std::error::Error>> {
    let request = ComposeRequest {
        prompt: args.prompt.clone(),
        business_context: args.business_context.clone(),
        company_block: args.company_block.clone(),
        processor,
    };
    let composed = client.compose(&request).await?;
    print_json(&composed)?;
    Ok(composed)
}

async fn research(
    client: &HttpClient,
    compose_args: &ComposeArgs,
    company: &CompanyArgs,
    wait_sec: Option<u64>,
    follow_opts: &FollowArgs,
) -> CliResult {
    let composed = compose(client, compose_args, company.processor).await?;
    info!(model = %composed.model, "Task composed");

    let mut request = CreateRunRequest::from(company);
    request.input = request.input.or(Some(composed.input));
    request.output_schema = request.output_schema.or(Some(composed.output_schema));

    let created = client.create_run(&request).await?;
    info!(run_id = %created.run_id, "Run created");

    let mut poll_loop = poll_loop(wait_sec, follow_opts);
    if let Some(tier) = company.processor {
        poll_loop = poll_loop.with_processor(tier);
    }
    follow_run(client, &poll_loop, &created.run_id).await
}

fn poll_loop(wait_sec: Option<u64>, opts: &FollowArgs) -> PollLoop {
    let mut poll_loop = PollLoop::new().stop_on_stuck(opts.stop_on_stuck);
    if let Some(wait) = wait_sec {
        poll_loop = poll_loop.with_wait_secs(wait);
    }
    if let Some(max) = opts.max_attempts {
        poll_loop = poll_loop.with_max_attempts(max);
    }
    poll_loop
}

async fn follow_run(client: &HttpClient, poll_loop: &PollLoop, run_id: &RunId) -> CliResult {
    let tracker = RunTracker::new();
    let token = tracker.begin_run();

    let outcome = poll_loop
        .run(client, &tracker, token, run_id, print_progress)
        .await;

    match outcome {
        LoopOutcome::Completed(response) => print_json(&response),
        LoopOutcome::Failed(response) => {
            print_json(&response)?;
            Err(format!(
                "run failed: {}",
                response.error.as_deref().unwrap_or("unknown error")
            )
            .into())
        }
        LoopOutcome::Stuck(response) => {
            print_json(&response)?;
            Err("run is stuck in the upstream queue".into())
        }
        LoopOutcome::GaveUp { attempts, last } => {
            if let Some(response) = last {
                print_json(&response)?;
            }
            Err(format!("run did not settle after {} polls", attempts).into())
        }
        LoopOutcome::Rejected(e) => Err(e.into()),
        LoopOutcome::Superseded => Ok(()),
    }
}

fn print_progress(response: &PollResponse) {
    match (response.status, response.diagnostics) {
        (PollStatus::Stuck, Some(diag)) => info!(
            run_id = %response.run_id,
            elapsed_seconds = diag.elapsed_seconds,
            estimate_seconds = diag.estimate_seconds,
            "Run looks stuck; still polling"
        ),
        (status, _) if !status.is_terminal() => info!(
            run_id = %response.run_id,
            status = %status,
            retry_after = ?response.retry_after_seconds,
            "Run in progress"
        ),
        _ => {}
    }
}

fn print_json<T: Serialize>(value: &T) -> CliResult {
    println!("{}", serde_json::to_string_pretty(value)?);
    Ok(())
}
