//! CLI argument definitions using clap derive macros.

use std::path::PathBuf;

use clap::Parser;

use sreality_crawler::{BackendKind, Config, ConfigError};

/// Crawl the sreality.cz listings API into a storage backend.
///
/// Configuration comes from the environment (see `.env`); every flag here
/// overrides its environment counterpart for one run.
#[derive(Parser, Debug)]
#[command(name = "sreality-crawler")]
#[command(author, version, about)]
pub struct Args {
    /// Increase output verbosity (-v for debug, -vv for trace)
    #[arg(short, long, action = clap::ArgAction::Count)]
    pub verbose: u8,

    /// Suppress non-error output
    #[arg(short, long)]
    pub quiet: bool,

    /// Storage backend: csv, postgres or mongodb
    #[arg(short, long)]
    pub backend: Option<String>,

    /// Maximum concurrent page fetches (1-64)
    #[arg(short = 'c', long, value_parser = clap::value_parser!(u8).range(1..=64))]
    pub concurrency: Option<u8>,

    /// Maximum fetch attempts per page (1-10)
    #[arg(short = 'r', long, value_parser = clap::value_parser!(u8).range(1..=10))]
    pub max_retries: Option<u8>,

    /// Minimum delay between requests in milliseconds (0 disables throttling, max 60000)
    #[arg(short = 'l', long, value_parser = clap::value_parser!(u64).range(0..=60000))]
    pub download_delay: Option<u64>,

    /// Region filter (locality_region_id)
    #[arg(long)]
    pub region_id: Option<u32>,

    /// Output directory for the CSV backend
    #[arg(short, long)]
    pub output_dir: Option<PathBuf>,
}

impl Args {
    /// Applies the flag overrides on top of the environment configuration.
    ///
    /// # Errors
    ///
    /// Returns [`ConfigError::UnknownBackend`] if `--backend` names a
    /// backend that does not exist.
    pub fn apply(&self, mut config: Config) -> Result<Config, ConfigError> {
        if let Some(backend) = &self.backend {
            config.backend = BackendKind::parse(backend)?;
        }
        if let Some(concurrency) = self.concurrency {
            config.concurrency = usize::from(concurrency);
        }
        if let Some(max_retries) = self.max_retries {
            config.max_retries = u32::from(max_retries);
        }
        if let Some(delay_ms) = self.download_delay {
            config.download_delay = std::time::Duration::from_millis(delay_ms);
            if delay_ms == 0 {
                config.autothrottle = false;
            }
        }
        if let Some(region_id) = self.region_id {
            config.region_id = region_id;
        }
        if let Some(output_dir) = &self.output_dir {
            config.output_dir = output_dir.clone();
        }
        Ok(config)
    }
}
