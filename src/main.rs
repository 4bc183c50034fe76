use anyhow::{Context, Result};
use clap::{Parser, Subcommand};
use std::path::PathBuf;
use std::sync::Arc;
use tracing_subscriber::layer::SubscriberExt;
use tracing_subscriber::util::SubscriberInitExt;

use relist::config::Config;
use relist::crawler::{Crawler, HttpFetcher, ListingSource, PostFetcher};

#[derive(Parser)]
#[command(
    name = "relist",
    version,
    about = "Incremental listing crawler with a crash-safe journal",
    long_about = None
)]
struct Cli {
    #[command(subcommand)]
    command: Commands,

    /// TOML configuration file; RELIST_* environment variables are used otherwise
    #[arg(short, long, global = true)]
    config: Option<PathBuf>,

    /// Enable verbose logging
    #[arg(short, long, global = true)]
    verbose: bool,

    /// Log format (text, json); overrides the configured format
    #[arg(long, global = true)]
    log_format: Option<String>,
}

#[derive(Subcommand)]
enum Commands {
    /// Run discovery and detail fetching until interrupted
    Run,

    /// Perform a single discovery pass and exit
    Discover,

    /// Print registry counters rebuilt from the journal
    Status,
}

#[tokio::main]
async fn main() -> Result<()> {
    let cli = Cli::parse();

    let config = match &cli.config {
        Some(path) => Config::from_file(path)?,
        None => Config::from_env()?,
    };

    let format = cli
        .log_format
        .clone()
        .unwrap_or_else(|| config.logging.format.clone());
    setup_tracing(&format, &config.logging.level, cli.verbose)?;

    tracing::info!(
        data_dir = %config.storage.data_dir.display(),
        source_url = %config.crawler.source_url,
        "relist starting"
    );

    match cli.command {
        Commands::Run => run(config).await,
        Commands::Discover => discover(config).await,
        Commands::Status => status(config).await,
    }
}

fn setup_tracing(format: &str, level: &str, verbose: bool) -> Result<()> {
    let env_filter = if verbose {
        tracing_subscriber::EnvFilter::new("relist=debug,info")
    } else {
        tracing_subscriber::EnvFilter::try_new(format!("relist={level},warn"))
            .context("Invalid log level")?
    };

    match format {
        "json" => {
            tracing_subscriber::registry()
                .with(env_filter)
                .with(tracing_subscriber::fmt::layer().json())
                .init();
        }
        _ => {
            tracing_subscriber::registry()
                .with(env_filter)
                .with(tracing_subscriber::fmt::layer().pretty())
                .init();
        }
    }

    Ok(())
}

fn build_http(config: &Config) -> Result<Arc<HttpFetcher>> {
    let fetcher =
        HttpFetcher::from_config(&config.crawler).context("Failed to create HTTP client")?;
    Ok(Arc::new(fetcher))
}

async fn run(config: Config) -> Result<()> {
    let http = build_http(&config)?;
    let max_pages = config.crawler.max_listing_pages;
    let crawler = Crawler::open(config).await?;
    log_hydration(&crawler);

    let source = Arc::new(ListingSource::new(Arc::clone(&http), max_pages));
    let fetcher = Arc::new(PostFetcher::new(http));

    tokio::select! {
        result = crawler.run(source, fetcher) => {
            result.context("Crawler stopped")?;
        }
        _ = tokio::signal::ctrl_c() => {
            tracing::info!("Interrupted, shutting down");
        }
    }

    Ok(())
}

async fn discover(config: Config) -> Result<()> {
    let http = build_http(&config)?;
    let max_pages = config.crawler.max_listing_pages;
    let crawler = Crawler::open(config).await?;
    log_hydration(&crawler);

    let source = Arc::new(ListingSource::new(http, max_pages));
    let report = crawler.discovery_loop(source).run_once().await?;

    println!("Discovery run {}", report.run_id);
    println!("  Found:     {}", report.found);
    println!("  New items: {}", report.new_items);
    if let Some(error) = report.error {
        println!("  Stopped early: {error}");
    }
    Ok(())
}

async fn status(config: Config) -> Result<()> {
    let crawler = Crawler::open(config).await?;
    let summary = crawler.registry().read().await.summary_at(chrono::Utc::now());
    let last_run = crawler.run_ids().last().await?;
    let hydration = crawler.hydration();

    println!("Journal: {}", crawler.journal().path().display());
    println!("  Records:       {}", hydration.records);
    println!("  Items:         {}", summary.total);
    println!("  Never fetched: {}", summary.never_fetched);
    println!("  Due:           {}", summary.due);
    println!("  Removed:       {}", summary.removed);
    match last_run {
        Some(run_id) => println!("  Last run:      {run_id}"),
        None => println!("  Last run:      none"),
    }
    Ok(())
}

fn log_hydration(crawler: &Crawler) {
    let stats = crawler.hydration();
    tracing::info!(
        records = stats.records,
        discovery_records = stats.discovery_records,
        detail_records = stats.detail_records,
        items = stats.items,
        "Registry ready"
    );
}
