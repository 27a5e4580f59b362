//! Record processing pipeline.
//!
//! Every record emitted by a page task flows through the same fixed stage
//! order: validation, deduplication, count tracking, persistence. A record
//! dropped by an earlier stage never reaches a later one - in particular an
//! invalid record's identifier is never entered into the seen-set, so a
//! later complete copy of the same listing still gets stored.
//!
//! Persistence failures are scoped to the record: they are logged and the
//! run continues. Only backend connection at startup is fatal, and that
//! happens before the pipeline exists.

mod dedupe;
mod validate;

use std::sync::Arc;

use tracing::{debug, warn};

pub use dedupe::{DedupDecision, Deduper};
pub use validate::Validator;

use crate::crawl::RunStats;
use crate::record::Record;
use crate::store::{StorageBackend, UpsertOutcome};

/// Why the pipeline dropped a record.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum DropReason {
    /// A required field was absent or empty. Carries the first missing
    /// field; all of them are counted in the run statistics.
    MissingRequiredField {
        /// The first missing field name.
        field: String,
    },
    /// The identifier was already processed earlier in this run.
    DuplicateId,
}

/// Outcome of pushing one record through the pipeline.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum StageOutcome {
    /// The record traversed every stage (persistence errors included -
    /// they are logged, not propagated).
    Processed,
    /// The record was dropped before reaching persistence.
    Dropped(DropReason),
}

/// The assembled processing pipeline for one run.
pub struct Pipeline {
    validator: Validator,
    deduper: Deduper,
    stats: Arc<RunStats>,
    backend: Arc<dyn StorageBackend>,
}

impl Pipeline {
    /// Assembles the pipeline around the active backend.
    #[must_use]
    pub fn new(
        required_fields: &[String],
        stats: Arc<RunStats>,
        backend: Arc<dyn StorageBackend>,
    ) -> Self {
        Self {
            validator: Validator::new(required_fields.iter().cloned()),
            deduper: Deduper::new(),
            stats,
            backend,
        }
    }

    /// Pushes one record through validation, dedup, count tracking and
    /// persistence.
    pub async fn process(&self, record: &Record) -> StageOutcome {
        // Stage 1: validation
        let missing = self.validator.missing_fields(record);
        if !missing.is_empty() {
            for field in &missing {
                self.stats.record_missing_field(field);
            }
            self.stats.record_invalid();
            debug!(
                hash_id = ?record.hash_id(),
                missing = ?missing,
                "record dropped: missing required fields"
            );
            return StageOutcome::Dropped(DropReason::MissingRequiredField {
                field: missing[0].to_string(),
            });
        }
        self.stats.record_valid();

        // Stage 2: deduplication
        match self.deduper.check_and_insert(record) {
            DedupDecision::Duplicate => {
                self.stats.record_duplicate();
                debug!(hash_id = ?record.hash_id(), "record dropped: duplicate");
                return StageOutcome::Dropped(DropReason::DuplicateId);
            }
            // No identifier to dedup on; the backend decides what to do
            // with it (and will reject it if it needs one).
            DedupDecision::FirstSeen | DedupDecision::NoIdentifier => {}
        }

        // Stage 3: count tracking
        self.stats.record_count_tracked();

        // Stage 4: persistence
        match self.backend.upsert(record).await {
            Ok(UpsertOutcome::Inserted | UpsertOutcome::Updated) => {
                self.stats.record_persisted();
            }
            Ok(UpsertOutcome::SkippedDuplicate) => {
                debug!(
                    hash_id = ?record.hash_id(),
                    "backend already holds this record"
                );
            }
            Err(e) => {
                warn!(
                    hash_id = ?record.hash_id(),
                    backend = self.backend.name(),
                    error = %e,
                    "failed to store record - continuing"
                );
            }
        }

        StageOutcome::Processed
    }
}

#[cfg(test)]
#[allow(clippy::unwrap_used)]
mod tests {
    use super::*;
    use crate::store::StoreError;
    use async_trait::async_trait;
    use serde_json::json;
    use std::sync::Mutex;

    /// Backend double that records every upsert it receives.
    #[derive(Default)]
    struct RecordingBackend {
        stored: Mutex<Vec<i64>>,
        fail: bool,
    }

    #[async_trait]
    impl StorageBackend for RecordingBackend {
        fn name(&self) -> &'static str {
            "recording"
        }

        async fn upsert(&self, record: &Record) -> Result<UpsertOutcome, StoreError> {
            if self.fail {
                return Err(StoreError::MissingId);
            }
            let hash_id = record.hash_id().ok_or(StoreError::MissingId)?;
            self.stored.lock().unwrap().push(hash_id);
            Ok(UpsertOutcome::Inserted)
        }

        async fn close(&self) -> Result<(), StoreError> {
            Ok(())
        }
    }

    fn record(hash_id: i64, name: &str) -> Record {
        let mut record = Record::new();
        record.insert("hash_id", json!(hash_id));
        if !name.is_empty() {
            record.insert("name", json!(name));
        }
        record
    }

    fn pipeline(backend: Arc<RecordingBackend>) -> (Pipeline, Arc<RunStats>) {
        let stats = Arc::new(RunStats::new());
        let required = vec!["hash_id".to_string(), "name".to_string()];
        (
            Pipeline::new(&required, Arc::clone(&stats), backend),
            stats,
        )
    }

    // ==================== Stage Order Tests ====================

    #[tokio::test]
    async fn test_valid_record_reaches_backend() {
        let backend = Arc::new(RecordingBackend::default());
        let (pipeline, stats) = pipeline(Arc::clone(&backend));

        let outcome = pipeline.process(&record(1, "Listing")).await;
        assert_eq!(outcome, StageOutcome::Processed);
        assert_eq!(*backend.stored.lock().unwrap(), vec![1]);

        let snapshot = stats.snapshot();
        assert_eq!(snapshot.valid, 1);
        assert_eq!(snapshot.count_tracked, 1);
        assert_eq!(snapshot.persisted, 1);
    }

    #[tokio::test]
    async fn test_invalid_record_never_reaches_later_stages() {
        let backend = Arc::new(RecordingBackend::default());
        let (pipeline, stats) = pipeline(Arc::clone(&backend));

        let outcome = pipeline.process(&record(1, "")).await;
        assert_eq!(
            outcome,
            StageOutcome::Dropped(DropReason::MissingRequiredField {
                field: "name".to_string()
            })
        );
        assert!(backend.stored.lock().unwrap().is_empty());

        let snapshot = stats.snapshot();
        assert_eq!(snapshot.invalid, 1);
        assert_eq!(snapshot.count_tracked, 0);
        assert_eq!(snapshot.missing_fields, vec![("name".to_string(), 1)]);
    }

    #[tokio::test]
    async fn test_invalid_record_does_not_poison_the_seen_set() {
        let backend = Arc::new(RecordingBackend::default());
        let (pipeline, _stats) = pipeline(Arc::clone(&backend));

        // Incomplete copy dropped by validation
        pipeline.process(&record(42, "")).await;
        // Complete copy of the same listing must still be stored
        let outcome = pipeline.process(&record(42, "Listing")).await;
        assert_eq!(outcome, StageOutcome::Processed);
        assert_eq!(*backend.stored.lock().unwrap(), vec![42]);
    }

    // ==================== Deduplication Tests ====================

    #[tokio::test]
    async fn test_duplicate_dropped_and_counted() {
        let backend = Arc::new(RecordingBackend::default());
        let (pipeline, stats) = pipeline(Arc::clone(&backend));

        pipeline.process(&record(7, "Listing")).await;
        pipeline.process(&record(7, "Listing")).await;
        let outcome = pipeline.process(&record(7, "Listing")).await;
        assert_eq!(outcome, StageOutcome::Dropped(DropReason::DuplicateId));

        let snapshot = stats.snapshot();
        // n occurrences mean n-1 duplicates
        assert_eq!(snapshot.duplicates, 2);
        assert_eq!(snapshot.persisted, 1);
        assert_eq!(*backend.stored.lock().unwrap(), vec![7]);
    }

    // ==================== Persistence Failure Tests ====================

    #[tokio::test]
    async fn test_backend_failure_does_not_stop_the_pipeline() {
        let backend = Arc::new(RecordingBackend {
            fail: true,
            ..Default::default()
        });
        let (pipeline, stats) = pipeline(Arc::clone(&backend));

        let outcome = pipeline.process(&record(1, "Listing")).await;
        assert_eq!(outcome, StageOutcome::Processed);

        let snapshot = stats.snapshot();
        assert_eq!(snapshot.count_tracked, 1);
        assert_eq!(snapshot.persisted, 0, "failed upsert is not persisted");
    }
}
