//! Repo-Sieve main entry point
//!
//! This is the command-line interface for the Repo-Sieve repository harvester.

use anyhow::Context;
use clap::Parser;
use repo_sieve::config::{load_config_with_hash, resolve_tokens, validate, Config};
use repo_sieve::crawler::{crawl, Shutdown, StopReason};
use repo_sieve::output::{load_statistics, print_statistics};
use repo_sieve::state::Cursor;
use repo_sieve::storage::{JsonStorage, Storage};
use std::path::PathBuf;
use tracing_subscriber::EnvFilter;

/// Repo-Sieve: a resumable, rate-limit-aware repository harvester
///
/// Repo-Sieve searches repositories one creation-date window at a time, keeps those
/// whose dependency manifest names both required frameworks, and collects their test
/// and source files. Interrupt with Ctrl-C and run again to resume.
#[derive(Parser, Debug)]
#[command(name = "repo-sieve")]
#[command(version)]
#[command(about = "A resumable, rate-limit-aware repository harvester", long_about = None)]
struct Cli {
    /// Path to TOML configuration file (defaults apply when omitted)
    #[arg(value_name = "CONFIG")]
    config: Option<PathBuf>,

    /// Increase logging verbosity (-v, -vv, -vvv)
    #[arg(short, long, action = clap::ArgAction::Count)]
    verbose: u8,

    /// Suppress non-error output
    #[arg(short, long, conflicts_with = "verbose")]
    quiet: bool,

    /// Ignore the saved cursor and start at the configured date window
    #[arg(long)]
    fresh: bool,

    /// Validate config and show where the crawl would start without crawling
    #[arg(long, conflicts_with = "stats")]
    dry_run: bool,

    /// Show statistics from the result directory and exit
    #[arg(long, conflicts_with = "dry_run")]
    stats: bool,
}

#[tokio::main]
async fn main() -> anyhow::Result<()> {
    let cli = Cli::parse();

    setup_logging(cli.verbose, cli.quiet);

    let config = load(cli.config.as_ref())?;

    if cli.dry_run {
        handle_dry_run(&config, cli.fresh)?;
    } else if cli.stats {
        handle_stats(&config)?;
    } else {
        handle_crawl(config, cli.fresh).await?;
    }

    Ok(())
}

/// Sets up the logging/tracing subscriber based on verbosity level
fn setup_logging(verbose: u8, quiet: bool) {
    let filter = if quiet {
        // Only show errors
        EnvFilter::new("error")
    } else {
        match verbose {
            0 => EnvFilter::new("repo_sieve=info,warn"),
            1 => EnvFilter::new("repo_sieve=debug,info"),
            2 => EnvFilter::new("repo_sieve=trace,debug"),
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

/// Loads the configuration file, or validated defaults when none is given
fn load(path: Option<&PathBuf>) -> anyhow::Result<Config> {
    let Some(path) = path else {
        tracing::info!("No configuration file given, using defaults");
        let config = Config::default();
        validate(&config)?;
        return Ok(config);
    };

    tracing::info!("Loading configuration from: {}", path.display());
    let (config, hash) = load_config_with_hash(path)
        .with_context(|| format!("failed to load configuration from {}", path.display()))?;
    tracing::info!("Configuration loaded successfully (hash: {})", hash);
    Ok(config)
}

/// Handles the --dry-run mode: validates config and shows where the crawl would start
fn handle_dry_run(config: &Config, fresh: bool) -> anyhow::Result<()> {
    println!("=== Repo-Sieve Dry Run ===\n");

    println!("Search:");
    println!("  Language: {}", config.search.language);
    println!("  Sort: {}", config.search.sort);
    println!(
        "  Dates: {} to {} in {}-day windows",
        config.search.start_date, config.search.end_date, config.search.window_days
    );
    println!(
        "  Pages: up to {} of {} results",
        config.search.max_pages, config.search.per_page
    );

    println!("\nFilter:");
    println!("  Manifest: {}", config.filter.manifest_path);
    println!("  Requires all of: {}", config.filter.required_markers.join(", "));
    println!("  Requires one of: {}", config.filter.any_markers.join(", "));
    println!(
        "  Files: *{} (at most {} per class)",
        config.filter.extension, config.filter.max_files_per_class
    );

    println!("\nAPI:");
    println!("  Base URL: {}", config.api.base_url);
    let tokens = resolve_tokens(&config.api, |name| std::env::var(name).ok());
    println!("  Tokens: {}", tokens.len());
    println!("  Batch size: {}", config.crawler.batch_size);

    println!("\nOutput:");
    println!("  Directory: {}", config.output.result_dir);
    println!("  Results: {}", config.output.results_file);

    let storage = JsonStorage::open(&config.output)?;
    let saved = if fresh { None } else { storage.load_window()? };
    let cursor = Cursor::resume(saved, &config.search)?;

    println!("\n✓ Configuration is valid");
    if cursor.is_terminal() {
        println!("✓ Crawl already finished; nothing left to search");
    } else {
        println!("✓ Would start at {}", cursor.window());
    }

    Ok(())
}

/// Handles the --stats mode: shows statistics from the result directory
fn handle_stats(config: &Config) -> anyhow::Result<()> {
    println!("Result directory: {}\n", config.output.result_dir);

    let storage = JsonStorage::open(&config.output)?;
    let stats = load_statistics(&storage)?;
    print_statistics(&stats);

    Ok(())
}

/// Handles the main crawl operation
async fn handle_crawl(config: Config, fresh: bool) -> anyhow::Result<()> {
    if fresh {
        tracing::info!("Starting fresh crawl (ignoring saved cursor)");
    } else {
        tracing::info!("Starting crawl (will resume from saved cursor)");
    }

    let shutdown = Shutdown::new();
    let listener = shutdown.listener();
    tokio::spawn(async move {
        if tokio::signal::ctrl_c().await.is_err() {
            return;
        }
        tracing::info!("Interrupt received, finishing in-flight work (press Ctrl-C again to quit now)");
        shutdown.trigger();

        if tokio::signal::ctrl_c().await.is_ok() {
            tracing::warn!("Second interrupt, exiting without checkpoint");
            std::process::exit(130);
        }
    });

    match crawl(config, fresh, listener).await {
        Ok(summary) => {
            match summary.stop {
                StopReason::Finished => tracing::info!("Crawl completed successfully"),
                StopReason::Interrupted => tracing::info!("Crawl stopped; run again to resume"),
            }
            Ok(())
        }
        Err(e) => {
            tracing::error!("Crawl failed: {}", e);
            Err(e.into())
        }
    }
}
