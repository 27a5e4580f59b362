//! In-run deduplication on the stable record identifier.
//!
//! Listings matching more than one category filter arrive more than once
//! within a run; the first arrival wins. The seen-set lives in memory and
//! lasts exactly one run - cross-run idempotence is the backend's job.

use std::collections::HashSet;
use std::sync::Mutex;

use crate::record::Record;

/// What the deduper decided about one record.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum DedupDecision {
    /// First time this identifier was seen; it is now recorded.
    FirstSeen,
    /// The identifier was already seen earlier in this run.
    Duplicate,
    /// The record carries no usable identifier; dedup cannot apply.
    NoIdentifier,
}

/// Tracks identifiers seen during the current run.
#[derive(Debug, Default)]
pub struct Deduper {
    seen: Mutex<HashSet<i64>>,
}

impl Deduper {
    #[must_use]
    pub fn new() -> Self {
        Self::default()
    }

    /// Checks the record's identifier and records it in one critical
    /// section, so two workers carrying the same identifier cannot both
    /// observe it as unseen.
    pub fn check_and_insert(&self, record: &Record) -> DedupDecision {
        let Some(hash_id) = record.hash_id() else {
            return DedupDecision::NoIdentifier;
        };

        let mut seen = match self.seen.lock() {
            Ok(guard) => guard,
            Err(poisoned) => poisoned.into_inner(),
        };
        if seen.insert(hash_id) {
            DedupDecision::FirstSeen
        } else {
            DedupDecision::Duplicate
        }
    }

    /// Number of distinct identifiers seen so far.
    #[must_use]
    pub fn seen_count(&self) -> usize {
        match self.seen.lock() {
            Ok(guard) => guard.len(),
            Err(poisoned) => poisoned.into_inner().len(),
        }
    }
}

#[cfg(test)]
#[allow(clippy::unwrap_used)]
mod tests {
    use super::*;
    use serde_json::json;
    use std::sync::Arc;

    fn record_with_id(hash_id: i64) -> Record {
        let mut record = Record::new();
        record.insert("hash_id", json!(hash_id));
        record
    }

    #[test]
    fn test_first_occurrence_passes_rest_are_duplicates() {
        let deduper = Deduper::new();
        let record = record_with_id(7);

        assert_eq!(deduper.check_and_insert(&record), DedupDecision::FirstSeen);
        assert_eq!(deduper.check_and_insert(&record), DedupDecision::Duplicate);
        assert_eq!(deduper.check_and_insert(&record), DedupDecision::Duplicate);
        assert_eq!(deduper.seen_count(), 1);
    }

    #[test]
    fn test_distinct_ids_all_pass() {
        let deduper = Deduper::new();
        for id in 1..=5 {
            assert_eq!(
                deduper.check_and_insert(&record_with_id(id)),
                DedupDecision::FirstSeen
            );
        }
        assert_eq!(deduper.seen_count(), 5);
    }

    #[test]
    fn test_record_without_id_is_not_tracked() {
        let deduper = Deduper::new();
        let record = Record::new();
        assert_eq!(
            deduper.check_and_insert(&record),
            DedupDecision::NoIdentifier
        );
        assert_eq!(
            deduper.check_and_insert(&record),
            DedupDecision::NoIdentifier
        );
        assert_eq!(deduper.seen_count(), 0);
    }

    #[test]
    fn test_concurrent_workers_admit_exactly_one() {
        let deduper = Arc::new(Deduper::new());
        let mut handles = Vec::new();
        for _ in 0..8 {
            let deduper = Arc::clone(&deduper);
            handles.push(std::thread::spawn(move || {
                let mut first_seen = 0u32;
                for id in 0..100 {
                    if deduper.check_and_insert(&record_with_id(id)) == DedupDecision::FirstSeen {
                        first_seen += 1;
                    }
                }
                first_seen
            }));
        }
        let total: u32 = handles.into_iter().map(|h| h.join().unwrap()).sum();
        assert_eq!(total, 100, "each id admitted exactly once across threads");
        assert_eq!(deduper.seen_count(), 100);
    }
}
