//! offline-collector CLI - crawls the get-offline.com calendar through a
//! rotating proxy pool.

use std::sync::Arc;

use anyhow::{Context, Result};
use chrono::NaiveDate;
use clap::Parser;
use tracing::{info, warn};
use tracing_subscriber::{EnvFilter, FmtSubscriber};

use offline_collector::{
    calendar,
    clock::SystemClock,
    config::Config,
    crawl::CrawlEngine,
    detail::DetailCollector,
    dispatch::Dispatcher,
    fetcher::PageFetcher,
    fetcher_http::ProxiedFetcher,
    proxy::{
        FailureTracker, HttpHealthCheck, ProxyPool, ProxyService, ProxyValidator, SnapshotStore,
    },
    sink::{CollectionSink, HttpEventSink},
};

/// Collect offline events between two dates
#[derive(Parser)]
#[command(name = "offline-collector")]
#[command(author, version, about, long_about = None)]
struct Cli {
    /// Start date YYYY-MM-DD (defaults to today)
    #[arg(long, value_parser = parse_date)]
    start: Option<NaiveDate>,

    /// End date YYYY-MM-DD (defaults to the start date)
    #[arg(long, value_parser = parse_date)]
    end: Option<NaiveDate>,

    /// Enable verbose output
    #[arg(short, long)]
    verbose: bool,
}

fn parse_date(value: &str) -> std::result::Result<NaiveDate, String> {
    calendar::parse_date(value).map_err(|e| e.to_string())
}

#[tokio::main]
async fn main() -> Result<()> {
    let cli = Cli::parse();

    // Setup logging
    let default_level = if cli.verbose { "debug" } else { "info" };
    let filter =
        EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new(default_level));
    let subscriber = FmtSubscriber::builder().with_env_filter(filter).finish();
    tracing::subscriber::set_global_default(subscriber)?;

    let config = Config::from_env().context("Failed to read configuration")?;

    let start = cli
        .start
        .unwrap_or_else(|| chrono::Local::now().date_naive());
    let end = cli.end.unwrap_or(start);
    if end < start {
        anyhow::bail!("--end {} is before --start {}", end, start);
    }

    run(config, start, end).await
}

async fn run(config: Config, start: NaiveDate, end: NaiveDate) -> Result<()> {
    let source = config.build_source()?;
    let pool = Arc::new(
        ProxyPool::new(config.pool, source).with_snapshot(SnapshotStore::new(&config.snapshot_path)),
    );
    let validator = ProxyValidator::new(
        Arc::clone(&pool),
        Arc::new(HttpHealthCheck::new(&config.health_url, config.probe_timeout)),
        Arc::new(SystemClock),
        config.validator,
    );

    let mut proxies = ProxyService::new(Arc::clone(&pool), validator);
    let interrupted = tokio::select! {
        _ = proxies.start() => false,
        _ = tokio::signal::ctrl_c() => true,
    };
    if interrupted {
        warn!("Interrupted while waiting for proxies");
        proxies.stop().await;
        return Ok(());
    }

    let fetcher: Arc<dyn PageFetcher> = Arc::new(ProxiedFetcher::new(
        Arc::clone(&pool),
        Arc::new(FailureTracker::new(config.failure_threshold)),
    ));

    let collection = Arc::new(CollectionSink::new());
    let mut collector = DetailCollector::new(Arc::clone(&fetcher)).with_sink(collection.clone());
    if let Some(url) = &config.sink_url {
        info!("Posting events to {}", url);
        collector = collector.with_sink(Arc::new(HttpEventSink::new(url.as_str())?));
    }

    let dispatcher = Dispatcher::start(config.dispatcher, Arc::new(collector));
    let mut engine = CrawlEngine::new(fetcher, dispatcher.submitter())
        .with_base_url(config.calendar_url.as_str());
    if !config.allowed_hosts.is_empty() {
        engine = engine.with_allowed_hosts(config.allowed_hosts.clone());
    }

    let crawled = tokio::select! {
        report = engine.run(start, end) => Some(report),
        _ = tokio::signal::ctrl_c() => {
            warn!("Interrupted, finishing queued jobs");
            None
        }
    };

    let stats = dispatcher.stop().await;
    info!(
        completed = stats.completed,
        failed = stats.failed,
        "All detail jobs finished"
    );

    collection.dump(&config.collect_dir).await?;
    proxies.stop().await;

    if let Some(report) = crawled {
        let report = report?;
        if !report.failed_dates.is_empty() {
            warn!("{} dates could not be crawled", report.failed_dates.len());
        }
    }
    Ok(())
}
