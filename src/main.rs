//! Image-Ledger main entry point
//!
//! This is the command-line interface for the Image-Ledger page image
//! collector.

use anyhow::{bail, Context};
use clap::Parser;
use image_ledger::collect::{CandidateList, FailureList, TracingSink};
use image_ledger::config::{load_config_with_hash, Config};
use image_ledger::ledger::stats::{load_host_listing, load_statistics};
use image_ledger::ledger::{open_ledger, DiffEngine};
use image_ledger::url::derive_page_identity;
use image_ledger::{HarvestReport, Harvester};
use std::path::{Path, PathBuf};
use std::sync::Arc;
use tokio_util::sync::CancellationToken;
use tracing_subscriber::EnvFilter;

/// Image-Ledger: polite image collection with a per-page history
///
/// Image-Ledger retrieves every image a page references under global and
/// per-host concurrency ceilings, deduplicates them by content, and reports
/// which ones are new since the page was last visited.
#[derive(Parser, Debug)]
#[command(name = "image-ledger")]
#[command(version = "1.0.0")]
#[command(about = "Polite image collection with a per-page ledger", long_about = None)]
struct Cli {
    /// Path to TOML configuration file
    #[arg(value_name = "CONFIG")]
    config: PathBuf,

    /// Page the candidates were found on
    #[arg(long, value_name = "URL")]
    page: Option<String>,

    /// TOML file of [[candidate]] tables to collect
    #[arg(long, value_name = "FILE", conflicts_with = "retry")]
    candidates: Option<PathBuf>,

    /// Resubmit a failure list written by --failures-out
    #[arg(long, value_name = "FILE")]
    retry: Option<PathBuf>,

    /// Write failed candidates to a TOML file
    #[arg(long, value_name = "FILE")]
    failures_out: Option<PathBuf>,

    /// Increase logging verbosity (-v, -vv, -vvv)
    #[arg(short, long, action = clap::ArgAction::Count)]
    verbose: u8,

    /// Suppress non-error output
    #[arg(short, long, conflicts_with = "verbose")]
    quiet: bool,

    /// Remove records not scanned within DAYS (default: configured retention) and exit
    #[arg(long, value_name = "DAYS", num_args = 0..=1, conflicts_with_all = ["clear", "stats", "dry_run"])]
    cleanup: Option<Option<u32>>,

    /// Remove every record and exit
    #[arg(long, conflicts_with_all = ["stats", "dry_run"])]
    clear: bool,

    /// Show statistics from the ledger and exit
    #[arg(long, conflicts_with = "dry_run")]
    stats: bool,

    /// With --stats, also list the pages recorded for HOST
    #[arg(long, value_name = "HOST", requires = "stats")]
    host: Option<String>,

    /// Validate config and inputs without retrieving anything
    #[arg(long)]
    dry_run: bool,
}

#[tokio::main]
async fn main() -> anyhow::Result<()> {
    let cli = Cli::parse();

    setup_logging(cli.verbose, cli.quiet);

    tracing::info!("Loading configuration from: {}", cli.config.display());
    let (config, config_hash) = load_config_with_hash(&cli.config)
        .with_context(|| format!("Failed to load configuration {}", cli.config.display()))?;
    tracing::info!("Configuration loaded successfully (hash: {})", config_hash);

    if cli.dry_run {
        handle_dry_run(&config, &cli)
    } else if cli.stats {
        handle_stats(&config, cli.host.as_deref())
    } else if let Some(days) = cli.cleanup {
        handle_cleanup(config, days)
    } else if cli.clear {
        handle_clear(config)
    } else {
        handle_harvest(config, &cli).await
    }
}

/// Sets up the logging/tracing subscriber based on verbosity level
fn setup_logging(verbose: u8, quiet: bool) {
    let filter = if quiet {
        EnvFilter::new("error")
    } else {
        match verbose {
            0 => EnvFilter::new("image_ledger=info,warn"),
            1 => EnvFilter::new("image_ledger=debug,info"),
            2 => EnvFilter::new("image_ledger=trace,debug"),
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
fn handle_dry_run(config: &Config, cli: &Cli) -> anyhow::Result<()> {
    println!("=== Image-Ledger Dry Run ===\n");

    println!("Fetch Configuration:");
    println!("  Max concurrent: {}", config.fetch.max_concurrent);
    println!("  Max per host: {}", config.fetch.max_per_host);
    println!("  Attempt timeout: {}s", config.fetch.timeout_secs);
    println!("  Max attempts: {}", config.fetch.max_attempts);
    println!("  Backoff base: {}ms", config.fetch.backoff_base_ms);

    println!("\nUser Agent:");
    println!("  {}", config.user_agent.header_value());

    println!("\nLedger:");
    println!("  Database: {}", config.ledger.database_path);
    println!("  Retention: {} days", config.ledger.retention_days);

    println!(
        "\nSignificant query parameters ({}): {}",
        config.identity.significant_params.len(),
        config.identity.significant_params.join(", ")
    );

    if let Some(page) = &cli.page {
        let identity = derive_page_identity(page, &config.identity)?;
        println!("\nPage:");
        println!("  Canonical URL: {}", identity.url);
        println!("  Identity: {}", identity.id);
    }

    let count = match (&cli.candidates, &cli.retry) {
        (Some(path), _) => Some(CandidateList::load(path)?.candidates.len()),
        (None, Some(path)) => Some(FailureList::load(path)?.failures.len()),
        (None, None) => None,
    };

    println!("\n✓ Configuration is valid");
    if let Some(count) = count {
        println!("✓ Would collect {} candidates", count);
    }

    Ok(())
}

/// Handles the --stats mode: shows statistics from the ledger
fn handle_stats(config: &Config, host: Option<&str>) -> anyhow::Result<()> {
    println!("Database: {}\n", config.ledger.database_path);

    let ledger = open_ledger(Path::new(&config.ledger.database_path))?;
    let stats = load_statistics(&ledger)?;

    print!("{}", stats);

    if let Some(host) = host {
        println!();
        print!("{}", load_host_listing(&ledger, host)?);
    }
    Ok(())
}

/// Handles the --cleanup mode; without DAYS the configured retention applies
fn handle_cleanup(config: Config, days: Option<u32>) -> anyhow::Result<()> {
    let days = days.unwrap_or(config.ledger.retention_days);

    let ledger = open_ledger(Path::new(&config.ledger.database_path))?;
    let engine = DiffEngine::new(ledger, config.identity);
    let removed = engine.cleanup(days)?;

    println!("✓ Removed {} records older than {} days", removed, days);
    Ok(())
}

/// Handles the --clear mode
fn handle_clear(config: Config) -> anyhow::Result<()> {
    let ledger = open_ledger(Path::new(&config.ledger.database_path))?;
    let engine = DiffEngine::new(ledger, config.identity);
    let removed = engine.clear_all()?;

    println!("✓ Removed {} records", removed);
    Ok(())
}

/// Handles the main harvest operation
async fn handle_harvest(config: Config, cli: &Cli) -> anyhow::Result<()> {
    let Some(page) = cli.page.as_deref() else {
        bail!("--page is required to collect images");
    };

    let candidates = match (&cli.candidates, &cli.retry) {
        (Some(path), _) => CandidateList::load(path)
            .with_context(|| format!("Failed to load candidates from {}", path.display()))?
            .candidates,
        (None, Some(path)) => FailureList::load(path)
            .with_context(|| format!("Failed to load failure list from {}", path.display()))?
            .candidates(),
        (None, None) => bail!("One of --candidates or --retry is required"),
    };

    let ledger = open_ledger(Path::new(&config.ledger.database_path))?;
    let harvester = Harvester::new(config, ledger)?.with_sink(Arc::new(TracingSink));

    let token = CancellationToken::new();
    tokio::spawn({
        let token = token.clone();
        async move {
            if tokio::signal::ctrl_c().await.is_ok() {
                tracing::warn!("Interrupted; finishing in-flight retrievals");
                token.cancel();
            }
        }
    });

    let report = harvester
        .harvest_with_cancel(page, candidates, token)
        .await?;

    print_report(&report);

    if let Some(path) = &cli.failures_out {
        let list = FailureList {
            failures: report.collection.failures.clone(),
        };
        list.save(path)
            .with_context(|| format!("Failed to write {}", path.display()))?;
        println!("✓ Wrote {} failures to {}", list.failures.len(), path.display());
    }

    Ok(())
}

fn print_report(report: &HarvestReport) {
    let stats = &report.collection.stats;

    println!("=== Harvest Report ===\n");
    println!("Page identity: {}", report.page_id);
    println!(
        "Candidates: {}  Collected: {}  Failed: {}  Duplicates: {}",
        stats.total, stats.collected, stats.failed, stats.deduplicated
    );

    if report.diff.is_first_visit {
        println!("\nFirst visit: all {} images are new", report.diff.new.len());
    } else {
        println!(
            "\nNew: {}  Previously seen: {}",
            report.diff.new.len(),
            report.diff.existing.len()
        );
    }

    for snapshot in &report.diff.new {
        println!("  + {} {}", snapshot.content_hash.short(), snapshot.url);
    }

    if !report.collection.failures.is_empty() {
        println!("\nFailures:");
        for failure in &report.collection.failures {
            println!(
                "  ✗ {} [{}] {} (attempts: {})",
                failure.candidate.url, failure.error_kind, failure.detail, failure.attempts
            );
        }
    }
}
