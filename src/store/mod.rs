//! Persistence backends.
//!
//! All backends implement the same capability contract: an idempotent
//! [`StorageBackend::upsert`] keyed by the record's stable identifier, plus
//! a graceful [`StorageBackend::close`]. The active variant is selected by
//! configuration at startup; failing to connect there is the run's only
//! fatal error (there is no point crawling without a sink).

mod csv;
mod mongo;
mod postgres;

use std::path::PathBuf;

use async_trait::async_trait;
use thiserror::Error;
use tracing::info;

pub use csv::CsvStore;
pub use mongo::MongoStore;
pub use postgres::PostgresStore;

use crate::config::{BackendKind, Config};
use crate::record::Record;

/// Result of an idempotent upsert.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum UpsertOutcome {
    /// A new row/document/line was written.
    Inserted,
    /// An existing document was replaced in place.
    Updated,
    /// The identifier was already stored; nothing was written.
    SkippedDuplicate,
}

/// Errors from the persistence layer.
#[derive(Debug, Error)]
pub enum StoreError {
    /// The record carries no usable identifier to key the upsert by.
    #[error("record has no usable hash_id")]
    MissingId,

    /// Postgres error (connection, schema setup or query).
    #[error("postgres error: {0}")]
    Postgres(#[from] sqlx::Error),

    /// MongoDB driver error.
    #[error("mongodb error: {0}")]
    Mongo(#[from] mongodb::error::Error),

    /// A record failed to serialize into a BSON document.
    #[error("bson serialization error: {0}")]
    Bson(#[from] mongodb::bson::ser::Error),

    /// Filesystem error opening or writing the CSV export.
    #[error("io error at {path}: {source}")]
    Io {
        /// The path involved.
        path: PathBuf,
        /// The underlying error.
        #[source]
        source: std::io::Error,
    },

    /// CSV encoding error.
    #[error("csv write error: {0}")]
    Csv(#[from] ::csv::Error),
}

/// Capability contract every backend variant implements.
///
/// Upserts must be idempotent under re-delivery of a record with the same
/// identifier, and an upsert error must stay scoped to that record: the
/// caller logs it, skips the record and keeps the run going.
#[async_trait]
pub trait StorageBackend: Send + Sync {
    /// Backend name for logs and the run report.
    fn name(&self) -> &'static str;

    /// Stores one record, keyed by its stable identifier.
    async fn upsert(&self, record: &Record) -> Result<UpsertOutcome, StoreError>;

    /// Flushes and releases the backend's resources.
    async fn close(&self) -> Result<(), StoreError>;
}

/// Connects the backend the configuration selects.
///
/// # Errors
///
/// Any error here is fatal to the run: an unreachable database, a missing
/// output directory that cannot be created, a failed schema setup.
pub async fn connect_backend(config: &Config) -> Result<Box<dyn StorageBackend>, StoreError> {
    let backend: Box<dyn StorageBackend> = match config.backend {
        BackendKind::Csv => Box::new(CsvStore::create(csv::output_path(config))?),
        BackendKind::Postgres => {
            // from_env guarantees the URL is present for this backend
            let url = config.postgres_url.as_deref().unwrap_or_default();
            Box::new(PostgresStore::connect(url).await?)
        }
        BackendKind::Mongo => {
            Box::new(MongoStore::connect(&config.mongo_uri, &config.mongo_database).await?)
        }
    };

    info!(backend = backend.name(), "storage backend ready");
    Ok(backend)
}
