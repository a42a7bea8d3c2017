//! Catalog Harvester main entry point
//!
//! This is the command-line interface for the scheduled catalog crawler.

use anyhow::{bail, Context};
use catalog_harvester::categories::{CategorySource, JsonCategoryFile};
use catalog_harvester::config::{load_config_with_hash, Config};
use catalog_harvester::output::{load_history, print_history};
use catalog_harvester::storage::open_storage;
use catalog_harvester::{JobKind, JobState, Orchestrator, Scheduler};
use clap::{Parser, Subcommand};
use std::path::{Path, PathBuf};
use std::sync::Arc;
use std::time::Duration;
use tracing_subscriber::EnvFilter;

/// Catalog Harvester: a scheduled retail catalog crawler
///
/// Walks every configured catalog category page by page, writes the harvested
/// items as JSON artifacts and keeps a history of every run.
#[derive(Parser, Debug)]
#[command(name = "catalog-harvester")]
#[command(version = "1.0.0")]
#[command(about = "A scheduled retail catalog crawler", long_about = None)]
struct Cli {
    /// Path to TOML configuration file
    #[arg(value_name = "CONFIG")]
    config: PathBuf,

    /// Increase logging verbosity (-v, -vv, -vvv)
    #[arg(short, long, action = clap::ArgAction::Count, global = true)]
    verbose: u8,

    /// Suppress non-error output
    #[arg(short, long, conflicts_with = "verbose", global = true)]
    quiet: bool,

    #[command(subcommand)]
    command: Option<Command>,
}

#[derive(Subcommand, Debug)]
enum Command {
    /// Run the recurring scheduler until interrupted (default)
    Serve,

    /// Run one job immediately and wait for it to finish
    Run {
        /// Job kind: all, price or non-price
        kind: JobKind,
    },

    /// Show recent runs from the history database and exit
    History {
        /// Number of runs to show
        #[arg(short, long, default_value_t = 20)]
        limit: usize,
    },

    /// Validate config and show what would be crawled without crawling
    DryRun,
}

#[tokio::main]
async fn main() -> anyhow::Result<()> {
    let cli = Cli::parse();

    setup_logging(cli.verbose, cli.quiet);

    tracing::info!("Loading configuration from: {}", cli.config.display());
    let (config, config_hash) = match load_config_with_hash(&cli.config) {
        Ok((cfg, hash)) => {
            tracing::info!("Configuration loaded successfully (hash: {})", hash);
            (cfg, hash)
        }
        Err(e) => {
            tracing::error!("Failed to load configuration: {}", e);
            return Err(e.into());
        }
    };

    match cli.command.unwrap_or(Command::Serve) {
        Command::Serve => handle_serve(config, config_hash).await,
        Command::Run { kind } => handle_run(config, config_hash, kind).await,
        Command::History { limit } => handle_history(&config, limit),
        Command::DryRun => handle_dry_run(&config),
    }
}

/// Sets up the logging/tracing subscriber based on verbosity level
fn setup_logging(verbose: u8, quiet: bool) {
    let filter = if quiet {
        EnvFilter::new("error")
    } else {
        match verbose {
            0 => EnvFilter::new("catalog_harvester=info,warn"),
            1 => EnvFilter::new("catalog_harvester=debug,info"),
            2 => EnvFilter::new("catalog_harvester=trace,debug"),
            _ => EnvFilter::new("trace"),
        }
    };

    tracing_subscriber::fmt()
        .with_env_filter(filter)
        .with_target(false)
        .with_thread_ids(false)
        .with_file(false)
        .init();
}

/// Handles `serve`: evaluates triggers until Ctrl-C, then stops active runs
async fn handle_serve(config: Config, config_hash: String) -> anyhow::Result<()> {
    let tick = Duration::from_secs(config.schedule.tick_secs);
    let orchestrator = Arc::new(Orchestrator::from_config(config, config_hash)?);

    let schedule = orchestrator.schedule();
    tracing::info!(
        "Scheduler {} (UTC{:+})",
        if schedule.enabled { "enabled" } else { "disabled" },
        schedule.utc_offset_hours
    );
    for entry in &schedule.entries {
        match entry.next_fire {
            Some(next) => {
                tracing::info!(job = %entry.kind, "{}; next at {}", entry.description, next)
            }
            None => tracing::info!(job = %entry.kind, "{}", entry.description),
        }
    }

    orchestrator.spawn_timer(tick);
    tokio::signal::ctrl_c()
        .await
        .context("failed to listen for Ctrl-C")?;

    for outcome in orchestrator.shutdown().await {
        tracing::info!(
            job = %outcome.kind,
            "Stopped with {} pages, {} items",
            outcome.pages_done,
            outcome.items_collected
        );
    }
    Ok(())
}

/// Handles `run <kind>`: one immediate run; Ctrl-C requests a stop
async fn handle_run(config: Config, config_hash: String, kind: JobKind) -> anyhow::Result<()> {
    let orchestrator = Arc::new(Orchestrator::from_config(config, config_hash)?);
    orchestrator.run_now(kind)?;

    let stopper = Arc::clone(&orchestrator);
    tokio::spawn(async move {
        if tokio::signal::ctrl_c().await.is_ok() {
            tracing::warn!(job = %kind, "Interrupted, stopping at the next page boundary");
            if let Err(e) = stopper.stop(kind) {
                tracing::debug!(job = %kind, "Stop ignored: {}", e);
            }
        }
    });

    let mut outcome = orchestrator
        .wait(kind)
        .await
        .context("run ended abnormally")?;
    if let Some(upload) = outcome.upload.take() {
        upload.await.context("upload task ended abnormally")?;
    }

    println!(
        "{}: {} ({} pages, {} items, {} artifacts)",
        kind,
        outcome.state,
        outcome.pages_done,
        outcome.items_collected,
        outcome.artifacts.len()
    );

    if outcome.state == JobState::Failed {
        match outcome.error {
            Some(e) => bail!("run failed: {}", e),
            None => bail!("run failed"),
        }
    }
    Ok(())
}

/// Handles `history`: prints recent runs from the ledger
fn handle_history(config: &Config, limit: usize) -> anyhow::Result<()> {
    println!("Database: {}\n", config.output.database_path);

    let storage = open_storage(Path::new(&config.output.database_path))?;
    let history = load_history(&storage, limit)?;
    print_history(&history);

    Ok(())
}

/// Handles `dry-run`: validates config and shows what would be crawled
fn handle_dry_run(config: &Config) -> anyhow::Result<()> {
    println!("=== Catalog Harvester Dry Run ===\n");

    let crawler = &config.crawler;
    println!("Crawler Configuration:");
    println!("  Base URL: {}", crawler.base_url);
    println!("  Start page: {}", crawler.start_page);
    match crawler.end_page {
        Some(end) => println!("  End page: {}", end),
        None => println!("  End page: unbounded"),
    }
    match crawler.page_cap {
        Some(cap) => println!("  Page cap: {}", cap),
        None => println!("  Page cap: none"),
    }
    println!("  Page delay: {}s", crawler.page_delay_secs);
    println!("  Empty page stop: {}", crawler.empty_page_stop);
    println!("  Checkpoint every: {} pages", crawler.partial_save_every);
    println!("  Download images: {}", crawler.download_images);

    println!("\nRetry:");
    println!("  Max attempts: {}", config.retry.max_attempts);
    println!(
        "  Backoff: {:?} from {}ms up to {}ms",
        config.retry.backoff, config.retry.initial_backoff_ms, config.retry.max_backoff_ms
    );

    println!("\nOutput:");
    println!("  Directory: {}", config.output.directory);
    println!("  Database: {}", config.output.database_path);
    println!("  Categories: {}", config.output.categories_path);

    let scheduler = Scheduler::from_config(&config.schedule)?;
    let view = scheduler.view();
    println!(
        "\nSchedule ({}, UTC{:+}):",
        if view.enabled { "enabled" } else { "disabled" },
        view.utc_offset_hours
    );
    for entry in &view.entries {
        println!("  - {:<10} {}", entry.kind.as_str(), entry.description);
    }

    match &config.embedding.server {
        Some(server) => println!(
            "\nIndex signal: {} {}{}",
            config.embedding.method, server, config.embedding.endpoint
        ),
        None => println!("\nIndex signal: disabled"),
    }

    let categories = JsonCategoryFile::new(&config.output.categories_path).load();
    println!("\nCategories ({}):", categories.len());
    for category in &categories {
        println!("  - {} ({})", category.name, category.id);
    }

    println!("\n✓ Configuration is valid");
    for kind in JobKind::ALL {
        println!(
            "✓ {} runs would write {} artifacts to {}/{}",
            kind,
            categories.len(),
            config.output.directory,
            kind.output_dir()
        );
    }

    Ok(())
}
