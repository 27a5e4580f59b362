//! CLI entry point for the sreality crawler.

use std::process::ExitCode;
use std::sync::Arc;

use anyhow::Result;
use clap::Parser;
use sreality_crawler::fetch::{DEFAULT_START_DELAY, DEFAULT_TARGET_CONCURRENCY};
use sreality_crawler::{
    AutoThrottle, CategoryPartition, Config, Crawler, FetchClient, Pipeline, RetryPolicy,
    RunStats, RunVerdict, StorageBackend, connect_backend, report_run,
};
use tracing::{debug, error, info, warn};

mod cli;

use cli::Args;

#[tokio::main]
async fn main() -> ExitCode {
    // Parse CLI arguments first (before tracing, so --help works without logs)
    let args = Args::parse();

    // .env is optional; a missing file is not an error
    let _ = dotenvy::dotenv();

    // Determine log level based on verbose/quiet flags
    // Priority: RUST_LOG env var > quiet flag > verbose flag > default (info)
    let default_level = if args.quiet {
        "error"
    } else {
        match args.verbose {
            0 => "info",
            1 => "debug",
            _ => "trace",
        }
    };

    let filter = tracing_subscriber::EnvFilter::try_from_default_env()
        .unwrap_or_else(|_| tracing_subscriber::EnvFilter::new(default_level));

    tracing_subscriber::fmt().with_env_filter(filter).init();

    debug!(?args, "CLI arguments parsed");

    let config = match Config::from_env().and_then(|config| args.apply(config)) {
        Ok(config) => config,
        Err(e) => {
            error!(error = %e, "configuration error");
            return ExitCode::FAILURE;
        }
    };

    match run(config).await {
        Ok(RunVerdict::Success) => ExitCode::SUCCESS,
        Ok(RunVerdict::MissingRecords(shortfall)) => {
            error!(shortfall, "crawl incomplete");
            ExitCode::FAILURE
        }
        Err(e) => {
            error!(error = %e, "crawl aborted");
            ExitCode::FAILURE
        }
    }
}

/// Wires the run together and crawls the default partition set.
async fn run(config: Config) -> Result<RunVerdict> {
    info!(
        backend = config.backend.name(),
        region_id = config.region_id,
        concurrency = config.concurrency,
        "crawler starting"
    );

    // An unreachable backend is the run's only fatal error
    let backend: Arc<dyn StorageBackend> = Arc::from(connect_backend(&config).await?);

    let throttle = if config.autothrottle {
        Arc::new(AutoThrottle::new(
            DEFAULT_START_DELAY,
            config.download_delay,
            sreality_crawler::fetch::DEFAULT_MAX_DELAY,
            DEFAULT_TARGET_CONCURRENCY,
        ))
    } else if config.download_delay.is_zero() {
        debug!("request throttling disabled");
        Arc::new(AutoThrottle::disabled())
    } else {
        // Fixed spacing: clamp the adaptive delay to a single value
        Arc::new(AutoThrottle::new(
            config.download_delay,
            config.download_delay,
            config.download_delay,
            DEFAULT_TARGET_CONCURRENCY,
        ))
    };

    let client = Arc::new(FetchClient::with_timeout(
        RetryPolicy::with_max_attempts(config.max_retries),
        throttle,
        config.timeout,
    )?);

    let stats = Arc::new(RunStats::new());
    let pipeline = Arc::new(Pipeline::new(
        &config.required_fields,
        Arc::clone(&stats),
        Arc::clone(&backend),
    ));
    let crawler = Crawler::new(
        client,
        pipeline,
        Arc::clone(&stats),
        config.base_url.clone(),
        config.region_id,
        config.page_size,
        config.concurrency,
    );

    let snapshot = crawler.run(&CategoryPartition::defaults()).await;

    if let Err(e) = backend.close().await {
        warn!(backend = backend.name(), error = %e, "backend close failed");
    }

    Ok(report_run(&snapshot))
}
