//! Sreality Crawler Core Library
//!
//! This library crawls the paginated sreality.cz listings API, normalizes
//! each raw listing into a flat record and persists the result exactly once
//! per run through a pluggable storage backend.
//!
//! # Architecture
//!
//! The library is organized into the following modules:
//! - [`config`] - Run configuration from the environment
//! - [`fetch`] - HTTP client with retry classification and adaptive throttling
//! - [`crawl`] - Partition planning, concurrent page fetching, run statistics
//! - [`record`] - Flat record model and raw-listing extraction
//! - [`pipeline`] - Validation, deduplication and persistence stages
//! - [`store`] - CSV, Postgres and MongoDB backends

// Clippy lints - strict for library code
#![deny(clippy::unwrap_used)]
#![deny(clippy::expect_used)]
#![warn(clippy::pedantic)]
#![allow(clippy::module_name_repetitions)]

pub mod config;
pub mod crawl;
pub mod fetch;
pub mod pipeline;
pub mod record;
pub mod store;

// Re-export commonly used types
pub use config::{BackendKind, Config, ConfigError, DEFAULT_CONCURRENCY, DEFAULT_DOWNLOAD_DELAY};
pub use crawl::{
    CategoryPartition, Crawler, RunStats, RunVerdict, StatsSnapshot, plan_crawl, report_run,
};
pub use fetch::{
    AutoThrottle, DEFAULT_MAX_RETRIES, FetchClient, FetchError, RetryPolicy, classify_error,
};
pub use pipeline::{Pipeline, StageOutcome};
pub use record::{Record, RecordMeta, extract_record};
pub use store::{StorageBackend, StoreError, UpsertOutcome, connect_backend};
