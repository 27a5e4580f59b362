//! Append-only CSV export backend.
//!
//! A true idempotent upsert is impossible in an append-only sink, so this
//! variant leans on the pipeline's deduplication stage as its sole
//! uniqueness guarantee and spends its effort on schema-drift detection
//! instead: the column header freezes on the first record's field set, and
//! any later record exposing fields outside that header is still written
//! (extras ignored, missing columns left empty) while the drifted field
//! names are collected and logged at close - never silently dropped.

use std::collections::BTreeSet;
use std::fs::File;
use std::path::{Path, PathBuf};
use std::sync::Mutex;

use async_trait::async_trait;
use chrono::Utc;
use tracing::{debug, info, warn};

use super::{StorageBackend, StoreError, UpsertOutcome};
use crate::config::Config;
use crate::record::Record;

/// CSV export backend.
#[derive(Debug)]
pub struct CsvStore {
    path: PathBuf,
    state: Mutex<CsvState>,
}

#[derive(Debug)]
struct CsvState {
    writer: csv::Writer<File>,
    /// Column header, frozen on the first record.
    header: Option<Vec<String>>,
    /// Field names seen outside the frozen header.
    drift: BTreeSet<String>,
    rows: u64,
}

/// Resolves the output file path for a run.
///
/// Uses the configured file name, or generates a timestamped one so
/// successive runs never clobber each other.
pub(super) fn output_path(config: &Config) -> PathBuf {
    let file = config.output_file.clone().unwrap_or_else(|| {
        format!("sreality_{}.csv", Utc::now().format("%Y%m%d_%H%M%S"))
    });
    config.output_dir.join(file)
}

impl CsvStore {
    /// Creates the output file (and its parent directory).
    ///
    /// # Errors
    ///
    /// Returns [`StoreError::Io`] if the directory or file cannot be
    /// created - fatal at startup.
    pub fn create(path: impl Into<PathBuf>) -> Result<Self, StoreError> {
        let path = path.into();
        if let Some(parent) = path.parent()
            && !parent.as_os_str().is_empty()
        {
            std::fs::create_dir_all(parent).map_err(|source| StoreError::Io {
                path: parent.to_path_buf(),
                source,
            })?;
        }

        let file = File::create(&path).map_err(|source| StoreError::Io {
            path: path.clone(),
            source,
        })?;

        info!(path = %path.display(), "csv export open");

        Ok(Self {
            state: Mutex::new(CsvState {
                writer: csv::Writer::from_writer(file),
                header: None,
                drift: BTreeSet::new(),
                rows: 0,
            }),
            path,
        })
    }

    /// Path the export is being written to.
    #[must_use]
    pub fn path(&self) -> &Path {
        &self.path
    }

    fn lock_state(&self) -> std::sync::MutexGuard<'_, CsvState> {
        match self.state.lock() {
            Ok(guard) => guard,
            Err(poisoned) => poisoned.into_inner(),
        }
    }
}

#[async_trait]
impl StorageBackend for CsvStore {
    fn name(&self) -> &'static str {
        "csv"
    }

    async fn upsert(&self, record: &Record) -> Result<UpsertOutcome, StoreError> {
        let mut state = self.lock_state();

        if state.header.is_none() {
            let header: Vec<String> = record.field_names().map(ToString::to_string).collect();
            state.writer.write_record(&header)?;
            debug!(columns = header.len(), "csv header frozen from first record");
            state.header = Some(header);
        }

        // Collect drift before borrowing the header for the row
        let drifted: Vec<String> = {
            let header = state.header.as_deref().unwrap_or_default();
            record
                .field_names()
                .filter(|name| !header.iter().any(|h| h == name))
                .map(ToString::to_string)
                .collect()
        };
        for field in drifted {
            if state.drift.insert(field.clone()) {
                debug!(field, "record field outside the frozen csv header");
            }
        }

        let row: Vec<String> = state
            .header
            .as_deref()
            .unwrap_or_default()
            .iter()
            .map(|column| record.flat_field(column))
            .collect();
        state.writer.write_record(&row)?;
        state.writer.flush().map_err(|source| StoreError::Io {
            path: self.path.clone(),
            source,
        })?;
        state.rows += 1;

        Ok(UpsertOutcome::Inserted)
    }

    async fn close(&self) -> Result<(), StoreError> {
        let mut state = self.lock_state();
        state.writer.flush().map_err(|source| StoreError::Io {
            path: self.path.clone(),
            source,
        })?;

        if state.drift.is_empty() {
            info!(path = %self.path.display(), rows = state.rows, "csv export closed");
        } else {
            let fields: Vec<&str> = state.drift.iter().map(String::as_str).collect();
            warn!(
                path = %self.path.display(),
                rows = state.rows,
                drifted_fields = ?fields,
                "csv export closed with schema drift - these fields were not in the header"
            );
        }
        Ok(())
    }
}
