//! Bangumi collector main entry point
//!
//! This is the command-line interface for the collector.

use anyhow::Context;
use bangumi_collector::config::{resolve_config, Config, ConfigOverrides};
use bangumi_collector::crawler::{collect, RunPlan};
use clap::Parser;
use std::path::PathBuf;
use std::process::ExitCode;
use tracing_subscriber::EnvFilter;

/// Bangumi collector: ranking scan and subject detail harvester
///
/// Discovers subject identifiers from the ranking pages of one entity type,
/// then fetches every subject's detail record and writes a flat CSV table.
/// Interrupted runs resume from the identifier checkpoint.
#[derive(Parser, Debug)]
#[command(name = "bangumi-collector")]
#[command(version = "1.0.0")]
#[command(about = "Collect catalogue subjects into a CSV table", long_about = None)]
struct Cli {
    /// Path to TOML configuration file
    #[arg(short, long, value_name = "CONFIG")]
    config: Option<PathBuf>,

    /// Entity type to collect (anime, book, music, game, real)
    #[arg(short = 't', long = "type", value_name = "TYPE")]
    entity_type: Option<String>,

    /// First ranking page to scan
    #[arg(short, long)]
    start: Option<u32>,

    /// Last ranking page to scan
    #[arg(short, long)]
    end: Option<u32>,

    /// User-Agent header sent with every request
    #[arg(short = 'u', long)]
    user_agent: Option<String>,

    /// API access token, sent as a bearer token
    #[arg(short = 'a', long)]
    access_token: Option<String>,

    /// Directory for checkpoints, the record table and the failure log
    #[arg(short, long, value_name = "DIR")]
    path: Option<PathBuf>,

    /// Increase logging verbosity (-v, -vv, -vvv)
    #[arg(short, long, action = clap::ArgAction::Count)]
    verbose: u8,

    /// Suppress non-error output
    #[arg(short, long, conflicts_with = "verbose")]
    quiet: bool,

    /// Rescan the ranking pages even if an identifier checkpoint exists
    #[arg(long)]
    fresh: bool,

    /// Validate config and show what would be collected without any network access
    #[arg(long)]
    dry_run: bool,
}

impl Cli {
    fn overrides(&self) -> ConfigOverrides {
        ConfigOverrides {
            entity_type: self.entity_type.clone(),
            start: self.start,
            end: self.end,
            user_agent: self.user_agent.clone(),
            access_token: self.access_token.clone(),
            data_dir: self.path.clone(),
        }
    }
}

#[tokio::main]
async fn main() -> ExitCode {
    let cli = Cli::parse();

    setup_logging(cli.verbose, cli.quiet);

    match run(cli).await {
        Ok(()) => ExitCode::SUCCESS,
        Err(e) => {
            eprintln!("error: {:#}", e);
            ExitCode::FAILURE
        }
    }
}

async fn run(cli: Cli) -> anyhow::Result<()> {
    let (config, config_hash) = resolve_config(cli.config.as_deref(), &cli.overrides())
        .context("Failed to load configuration")?;

    match (&cli.config, config_hash) {
        (Some(path), Some(hash)) => {
            tracing::info!("Configuration loaded from {} (hash: {})", path.display(), hash)
        }
        _ => tracing::info!("Using default configuration"),
    }

    if cli.dry_run {
        handle_dry_run(&config)
    } else {
        handle_collect(config, cli.fresh).await
    }
}

/// Sets up the logging/tracing subscriber based on verbosity level
fn setup_logging(verbose: u8, quiet: bool) {
    let filter = if quiet {
        // Only show errors
        EnvFilter::new("error")
    } else {
        match verbose {
            0 => EnvFilter::new("bangumi_collector=info,warn"),
            1 => EnvFilter::new("bangumi_collector=debug,info"),
            2 => EnvFilter::new("bangumi_collector=trace,debug"),
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

/// Handles the --dry-run mode: validates config and shows what would be collected
fn handle_dry_run(config: &Config) -> anyhow::Result<()> {
    let plan = RunPlan::from_config(config)?;

    println!("=== Bangumi Collector Dry Run ===\n");

    println!("Target:");
    println!("  Entity type: {}", plan.entity_type);
    println!(
        "  Pages: {}..={}",
        plan.checkpoint.start_page, plan.checkpoint.end_page
    );

    println!("\nFetching:");
    println!("  Batch size: {}", config.crawler.batch_size);
    println!("  Concurrency: {}", config.crawler.concurrency);
    println!("  Attempts per URL: {}", config.crawler.max_retries);
    println!(
        "  Backoff: {}ms + up to {}ms",
        config.crawler.retry_base_delay_ms, config.crawler.retry_jitter_ms
    );
    println!("  Timeout: {}s", config.crawler.timeout_secs);
    println!(
        "  Access token: {}",
        if config.request.access_token.is_some() { "set" } else { "not set" }
    );

    println!("\nOutput:");
    println!(
        "  Checkpoint: {} ({})",
        plan.checkpoint_path.display(),
        if plan.checkpoint_exists { "exists, will be reused" } else { "missing, will scan" }
    );
    println!("  Table: {}", plan.table_path.display());
    println!("  Failure log: {}", plan.failure_log.display());

    if !plan.checkpoint_exists {
        println!("\nRanking pages ({}):", plan.page_urls.len());
        for url in &plan.page_urls {
            println!("  - {}", url);
        }
    }

    println!("\n✓ Configuration is valid");

    Ok(())
}

/// Handles the main collection run
async fn handle_collect(config: Config, fresh: bool) -> anyhow::Result<()> {
    tracing::info!(
        "Collecting {} pages {}..={} into {}",
        config.crawler.entity_type,
        config.crawler.start,
        config.crawler.end,
        config.output.data_dir.display()
    );

    let summary = collect(config, fresh).await.context("Collection failed")?;

    let elapsed = summary.finished_at - summary.started_at;
    tracing::info!(
        "Collection completed in {}s: {} records written to {}",
        elapsed.num_seconds(),
        summary.records,
        summary.table_path.display()
    );

    Ok(())
}
