//! `overseer` command-line front end.

mod config;

use clap::{Parser, Subcommand, ValueEnum};
use config::{OverseerConfig, API_KEY_ENV};
use overseer_orchestrator::{Storage, Supervisor};
use std::path::PathBuf;
use std::sync::Arc;
use tokio_util::sync::CancellationToken;
use tracing::warn;
use tracing_subscriber::EnvFilter;

#[derive(Parser)]
#[command(name = "overseer", about = "Overseer: task routing and quality control for agent teams")]
struct Cli {
    /// Path to config file
    #[arg(short, long, default_value = "overseer.toml")]
    config: PathBuf,

    /// Log output format
    #[arg(long, value_enum, default_value_t = LogFormat::Json)]
    log_format: LogFormat,

    #[command(subcommand)]
    command: Commands,
}

#[derive(Clone, Copy, ValueEnum)]
enum LogFormat {
    Json,
    Pretty,
}

#[derive(Subcommand)]
enum Commands {
    /// Run one task through the supervisor and print the outcome
    Run {
        /// Task text
        #[arg(required = true, num_args = 1..)]
        task: Vec<String>,
    },
    /// Harvest high-quality runs into training examples
    Improve {
        /// Minimum quality score (overrides config)
        #[arg(long)]
        min_quality: Option<f32>,
        /// Maximum examples to add (overrides config)
        #[arg(long)]
        max_examples: Option<usize>,
        /// History entries to inspect (overrides config)
        #[arg(long)]
        lookback: Option<usize>,
    },
    /// Show the team and its tool catalog
    Tools,
    /// Show history statistics and the latest runs
    History {
        /// Number of runs to list
        #[arg(short, default_value_t = 10)]
        n: usize,
    },
    /// Manage the routing caches
    Cache {
        #[command(subcommand)]
        action: CacheAction,
    },
}

#[derive(Subcommand)]
enum CacheAction {
    /// Clear cached routes and mark the compiled routing module stale
    Clear,
}

fn init_tracing(format: LogFormat) {
    let filter = EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new("info"));
    let builder = tracing_subscriber::fmt()
        .with_env_filter(filter)
        .with_writer(std::io::stderr);
    match format {
        LogFormat::Json => builder.json().init(),
        LogFormat::Pretty => builder.pretty().init(),
    }
}

fn print_json<T: serde::Serialize>(value: &T) -> anyhow::Result<()> {
    println!("{}", serde_json::to_string_pretty(value)?);
    Ok(())
}

#[tokio::main]
async fn main() -> anyhow::Result<()> {
    let cli = Cli::parse();
    init_tracing(cli.log_format);

    let config = OverseerConfig::load(&cli.config).await?;
    let roster = config.roster();
    let registry = config.registry(&roster);

    if let Commands::Tools = cli.command {
        println!("Team:\n{}", roster.describe());
        println!("\nTools:\n{}", registry.describe());
        println!("\nTotal: {} worker(s), {} tool(s)", roster.len(), registry.tool_count());
        return Ok(());
    }

    let reasoner = config.reasoner(std::env::var(API_KEY_ENV).ok())?;
    let runtime = Arc::new(config.runtime());
    let storage = Storage::open(&config.data_dir).await?;
    let supervisor = Supervisor::new(
        config.supervisor.clone(),
        roster,
        registry,
        reasoner,
        runtime,
        storage,
    )?;

    match cli.command {
        Commands::Run { task } => {
            let task = task.join(" ");
            let cancel = CancellationToken::new();
            let on_interrupt = cancel.clone();
            tokio::spawn(async move {
                if tokio::signal::ctrl_c().await.is_ok() {
                    warn!("Interrupted, cancelling run");
                    on_interrupt.cancel();
                }
            });

            match supervisor.run_with_cancel(&task, cancel).await {
                Ok(outcome) => print_json(&outcome)?,
                Err(e) => {
                    if let Some(partial) = &e.partial_output {
                        println!("{partial}");
                    }
                    return Err(e.into());
                }
            }
        }
        Commands::Improve {
            min_quality,
            max_examples,
            lookback,
        } => {
            let defaults = supervisor.config();
            let report = supervisor
                .self_improve_with(
                    min_quality.unwrap_or(defaults.min_quality),
                    max_examples.unwrap_or(defaults.max_examples),
                    lookback.unwrap_or(defaults.lookback),
                )
                .await?;
            print_json(&report)?;
        }
        Commands::History { n } => {
            let stats = supervisor.stats().await?;
            let runs = supervisor.recent_runs(n).await?;
            print_json(&serde_json::json!({
                "stats": stats.history,
                "module_state": stats.module_state,
                "recent": runs,
            }))?;
        }
        Commands::Cache {
            action: CacheAction::Clear,
        } => {
            supervisor.clear_routing_cache();
            supervisor.invalidate_module().await?;
            println!("Routing cache cleared; compiled module marked stale.");
        }
        Commands::Tools => {}
    }

    Ok(())
}
