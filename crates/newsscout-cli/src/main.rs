use std::path::PathBuf;
use std::sync::Arc;

use anyhow::{Context, Result};
use clap::{Args, Parser, Subcommand};
use newsscout_core::provider::DynSearchProvider;
use newsscout_core::store::DynContentStore;
use newsscout_core::{
    AgentSpec, ChatModel, Collaborators, Config, ConfigLoader, ExaSearchProvider,
    InMemoryContentStore, LlmEvaluator, LlmQueryRefiner, OpenAiChat, Profile, ProviderKeys,
    RunSettings, RunSource, SearchOrchestrator, SearchReport, TelemetryOptions, init_telemetry,
    metrics, persist_trace,
};
use tokio::runtime::Runtime;
use tracing::{info, warn};

#[derive(Parser, Debug)]
#[command(
    name = "newsscout",
    version,
    about = "Daily AI-news curation with specialist search agents"
)]
struct Cli {
    #[command(subcommand)]
    command: Command,
}

#[derive(Subcommand, Debug)]
enum Command {
    /// Run every specialist agent once and print the aggregate report.
    Run(RunArgs),
    /// Print the settings a run would use.
    ShowConfig(ShowConfigArgs),
}

#[derive(Args, Debug)]
struct RunArgs {
    /// Path to a TOML config file (defaults to `newsscout.toml`).
    #[arg(long, env = "NEWSSCOUT_CONFIG")]
    config: Option<PathBuf>,

    /// Override the iteration ceiling for every agent.
    #[arg(long)]
    max_iterations: Option<u32>,

    /// What triggered this run (`manual` or `scheduled`).
    #[arg(long, default_value = "manual")]
    source: RunSource,

    /// Use the reduced-cost profile.
    #[arg(long)]
    reduced_cost: bool,

    /// Ignore and do not write today's cached results.
    #[arg(long)]
    no_cache: bool,

    /// Directory to write the full report JSON into.
    #[arg(long)]
    trace_out: Option<PathBuf>,

    /// Print the report as JSON instead of Markdown.
    #[arg(long)]
    json: bool,

    /// Postgres content store (falls back to an in-memory store if omitted).
    #[cfg(feature = "postgres-store")]
    #[arg(long, env = "DATABASE_URL")]
    database_url: Option<String>,
}

#[derive(Args, Debug)]
struct ShowConfigArgs {
    /// Path to a TOML config file (defaults to `newsscout.toml`).
    #[arg(long, env = "NEWSSCOUT_CONFIG")]
    config: Option<PathBuf>,

    /// Show the reduced-cost profile.
    #[arg(long)]
    reduced_cost: bool,
}

fn main() -> Result<()> {
    let cli = Cli::parse();

    let rt = Runtime::new()?;
    rt.block_on(async move {
        match cli.command {
            Command::Run(args) => run_command(args).await?,
            Command::ShowConfig(args) => show_config_command(args)?,
        }
        Ok::<(), anyhow::Error>(())
    })?;

    Ok(())
}

fn load_settings(path: Option<PathBuf>, reduced_cost: bool) -> Result<(Config, RunSettings)> {
    let config = ConfigLoader::load(path).context("failed to load configuration")?;
    let profile = reduced_cost.then_some(Profile::ReducedCost);
    let settings = config.resolve(profile).context("invalid configuration")?;
    Ok((config, settings))
}

async fn run_command(args: RunArgs) -> Result<()> {
    let (config, settings) = load_settings(args.config.clone(), args.reduced_cost)?;

    init_telemetry(TelemetryOptions::from_logging(&config.logging))?;
    metrics::init_metrics_from_env("newsscout");

    let max_iterations = args.max_iterations.unwrap_or(settings.max_iterations);
    info!(
        profile = %settings.profile,
        max_iterations,
        source = %args.source,
        "starting newsscout run"
    );

    let collaborators = build_collaborators(&config, &args).await?;
    let specs = AgentSpec::standard(&settings);
    let mut orchestrator = SearchOrchestrator::new(Arc::new(settings), collaborators);
    if args.no_cache {
        orchestrator = orchestrator.with_cache(None);
    }

    let report = orchestrator
        .run_all(specs, max_iterations, args.source)
        .await;

    if let Some(dir) = &args.trace_out {
        let path = persist_trace(dir, &report.run_id, &report)?;
        info!(path = %path.display(), "report written");
    }

    print_report(&report, args.json)?;
    Ok(())
}

fn show_config_command(args: ShowConfigArgs) -> Result<()> {
    let (_, settings) = load_settings(args.config, args.reduced_cost)?;
    println!("{}", serde_json::to_string_pretty(&settings)?);
    Ok(())
}

async fn build_collaborators(config: &Config, args: &RunArgs) -> Result<Collaborators> {
    let keys = ProviderKeys::from_env(config)?;

    let search: DynSearchProvider = Arc::new(ExaSearchProvider::new(&config.exa, keys.exa)?);
    let chat: Arc<dyn ChatModel> = Arc::new(OpenAiChat::new(&config.llm, keys.llm)?);

    Ok(Collaborators {
        search,
        evaluator: Arc::new(LlmEvaluator::new(Arc::clone(&chat))),
        refiner: Arc::new(LlmQueryRefiner::new(chat)),
        store: build_store(args).await?,
    })
}

#[cfg(feature = "postgres-store")]
async fn build_store(args: &RunArgs) -> Result<DynContentStore> {
    if let Some(url) = &args.database_url {
        let store = newsscout_core::PgContentStore::connect(url)
            .await
            .context("failed to connect to the content store")?;
        return Ok(Arc::new(store));
    }
    warn!("no database URL supplied; deduplication only covers this process");
    Ok(Arc::new(InMemoryContentStore::new()))
}

#[cfg(not(feature = "postgres-store"))]
async fn build_store(_args: &RunArgs) -> Result<DynContentStore> {
    warn!("built without postgres-store; deduplication only covers this process");
    Ok(Arc::new(InMemoryContentStore::new()))
}

fn print_report(report: &SearchReport, json: bool) -> Result<()> {
    if json {
        println!("{}", serde_json::to_string_pretty(report)?);
        return Ok(());
    }

    println!("{}", report.render_markdown());
    for failure in &report.failures {
        warn!(category = %failure.category, reason = %failure.reason, "agent failed");
    }
    if tracing::enabled!(tracing::Level::DEBUG) {
        println!("{}", report.trace_summary().render_markdown());
    }
    Ok(())
}
