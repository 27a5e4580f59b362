//! Run-scoped statistics shared across concurrently completing fetch tasks.
//!
//! One [`RunStats`] is created per crawl run, handed around as
//! `Arc<RunStats>`, mutated by the planner, the page tasks and the pipeline
//! stages as records flow through, and read once at run end by the reporter.
//! Scalar counters are atomics; the per-category and per-field maps and the
//! failure list sit behind mutexes so a concurrent completion can never
//! corrupt a count.

use std::collections::BTreeMap;
use std::sync::Mutex;
use std::sync::atomic::{AtomicU64, Ordering};

use tracing::warn;

/// Expected-vs-fetched accounting for one category partition.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub struct CategoryCount {
    /// Result count the planner probe reported.
    pub expected: u64,
    /// Records actually emitted by page tasks.
    pub fetched: u64,
}

/// A reported (non-fatal) task failure.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct TaskFailure {
    /// Partition the failed task belonged to.
    pub category: String,
    /// Page number, or `None` for a planning (probe) failure.
    pub page: Option<u32>,
    /// What went wrong, for the run report.
    pub reason: String,
}

/// Process-wide counters scoped to one crawl run.
#[derive(Debug, Default)]
pub struct RunStats {
    pages_fetched: AtomicU64,
    records_fetched: AtomicU64,
    valid: AtomicU64,
    invalid: AtomicU64,
    duplicates: AtomicU64,
    count_tracked: AtomicU64,
    persisted: AtomicU64,

    categories: Mutex<BTreeMap<String, CategoryCount>>,
    missing_fields: Mutex<BTreeMap<String, u64>>,
    failures: Mutex<Vec<TaskFailure>>,
}

/// Immutable snapshot of the run statistics, taken at run end.
#[derive(Debug, Clone)]
pub struct StatsSnapshot {
    /// Per-category expected/fetched counts, sorted by category name.
    pub categories: Vec<(String, CategoryCount)>,
    /// Pages successfully fetched and parsed.
    pub pages_fetched: u64,
    /// Records emitted by page tasks.
    pub records_fetched: u64,
    /// Records that passed validation.
    pub valid: u64,
    /// Records dropped by validation.
    pub invalid: u64,
    /// Records dropped as duplicates.
    pub duplicates: u64,
    /// Records that reached the count-track stage.
    pub count_tracked: u64,
    /// Records the active backend reports as stored (inserted or updated).
    pub persisted: u64,
    /// Per-field missing counters from validation.
    pub missing_fields: Vec<(String, u64)>,
    /// Reported task failures (probe and page level).
    pub failures: Vec<TaskFailure>,
}

impl StatsSnapshot {
    /// Sum of expected counts over all categories.
    #[must_use]
    pub fn total_expected(&self) -> u64 {
        self.categories.iter().map(|(_, c)| c.expected).sum()
    }
}

impl RunStats {
    /// Creates a stats tracker with zero counts.
    #[must_use]
    pub fn new() -> Self {
        Self::default()
    }

    /// Records the probe result for a category.
    pub fn set_expected(&self, category: &str, expected: u64) {
        let mut categories = self.lock_categories();
        categories.entry(category.to_string()).or_default().expected = expected;
    }

    /// Counts one record emitted for a category.
    pub fn record_fetched(&self, category: &str) {
        self.records_fetched.fetch_add(1, Ordering::SeqCst);
        let mut categories = self.lock_categories();
        categories.entry(category.to_string()).or_default().fetched += 1;
    }

    /// Counts one successfully fetched and parsed page.
    pub fn record_page(&self) {
        self.pages_fetched.fetch_add(1, Ordering::SeqCst);
    }

    /// Counts one record passing validation.
    pub fn record_valid(&self) {
        self.valid.fetch_add(1, Ordering::SeqCst);
    }

    /// Counts one record dropped by validation.
    pub fn record_invalid(&self) {
        self.invalid.fetch_add(1, Ordering::SeqCst);
    }

    /// Counts one missing occurrence of a required field.
    pub fn record_missing_field(&self, field: &str) {
        let mut missing = match self.missing_fields.lock() {
            Ok(guard) => guard,
            Err(poisoned) => poisoned.into_inner(),
        };
        *missing.entry(field.to_string()).or_insert(0) += 1;
    }

    /// Counts one record dropped as a duplicate.
    pub fn record_duplicate(&self) {
        self.duplicates.fetch_add(1, Ordering::SeqCst);
    }

    /// Counts one record reaching the count-track stage.
    pub fn record_count_tracked(&self) {
        self.count_tracked.fetch_add(1, Ordering::SeqCst);
    }

    /// Counts one record the backend reports as stored.
    pub fn record_persisted(&self) {
        self.persisted.fetch_add(1, Ordering::SeqCst);
    }

    /// Records a reported task failure.
    pub fn record_failure(&self, category: &str, page: Option<u32>, reason: impl Into<String>) {
        let reason = reason.into();
        warn!(category, ?page, %reason, "task failed");
        let mut failures = match self.failures.lock() {
            Ok(guard) => guard,
            Err(poisoned) => poisoned.into_inner(),
        };
        failures.push(TaskFailure {
            category: category.to_string(),
            page,
            reason,
        });
    }

    /// Takes a consistent snapshot for the reporter.
    #[must_use]
    pub fn snapshot(&self) -> StatsSnapshot {
        let categories = self
            .lock_categories()
            .iter()
            .map(|(name, count)| (name.clone(), *count))
            .collect();
        let missing_fields = match self.missing_fields.lock() {
            Ok(guard) => guard,
            Err(poisoned) => poisoned.into_inner(),
        }
        .iter()
        .map(|(field, count)| (field.clone(), *count))
        .collect();
        let failures = match self.failures.lock() {
            Ok(guard) => guard,
            Err(poisoned) => poisoned.into_inner(),
        }
        .clone();

        StatsSnapshot {
            categories,
            pages_fetched: self.pages_fetched.load(Ordering::SeqCst),
            records_fetched: self.records_fetched.load(Ordering::SeqCst),
            valid: self.valid.load(Ordering::SeqCst),
            invalid: self.invalid.load(Ordering::SeqCst),
            duplicates: self.duplicates.load(Ordering::SeqCst),
            count_tracked: self.count_tracked.load(Ordering::SeqCst),
            persisted: self.persisted.load(Ordering::SeqCst),
            missing_fields,
            failures,
        }
    }

    fn lock_categories(&self) -> std::sync::MutexGuard<'_, BTreeMap<String, CategoryCount>> {
        match self.categories.lock() {
            Ok(guard) => guard,
            Err(poisoned) => poisoned.into_inner(),
        }
    }
}

#[cfg(test)]
#[allow(clippy::unwrap_used)]
mod tests {
    use super::*;
    use std::sync::Arc;

    #[test]
    fn test_stats_default_is_zeroed() {
        let snapshot = RunStats::new().snapshot();
        assert_eq!(snapshot.records_fetched, 0);
        assert_eq!(snapshot.persisted, 0);
        assert!(snapshot.categories.is_empty());
        assert!(snapshot.failures.is_empty());
        assert_eq!(snapshot.total_expected(), 0);
    }

    #[test]
    fn test_stats_per_category_accounting() {
        let stats = RunStats::new();
        stats.set_expected("flats-sale", 5);
        stats.set_expected("houses-rent", 2);
        stats.record_fetched("flats-sale");
        stats.record_fetched("flats-sale");

        let snapshot = stats.snapshot();
        assert_eq!(snapshot.total_expected(), 7);
        assert_eq!(snapshot.records_fetched, 2);

        let flats = snapshot
            .categories
            .iter()
            .find(|(name, _)| name == "flats-sale")
            .unwrap();
        assert_eq!(flats.1.expected, 5);
        assert_eq!(flats.1.fetched, 2);
    }

    #[test]
    fn test_stats_missing_field_counters() {
        let stats = RunStats::new();
        stats.record_missing_field("name");
        stats.record_missing_field("name");
        stats.record_missing_field("hash_id");

        let snapshot = stats.snapshot();
        assert_eq!(
            snapshot.missing_fields,
            vec![("hash_id".to_string(), 1), ("name".to_string(), 2)]
        );
    }

    #[test]
    fn test_stats_failure_list() {
        let stats = RunStats::new();
        stats.record_failure("flats-sale", Some(3), "HTTP 500");
        stats.record_failure("houses-rent", None, "probe failed");

        let snapshot = stats.snapshot();
        assert_eq!(snapshot.failures.len(), 2);
        assert_eq!(snapshot.failures[1].page, None);
    }

    #[test]
    fn test_stats_thread_safe() {
        let stats = Arc::new(RunStats::new());
        let mut handles = Vec::new();

        for _ in 0..8 {
            let stats = Arc::clone(&stats);
            handles.push(std::thread::spawn(move || {
                for _ in 0..100 {
                    stats.record_fetched("cat");
                    stats.record_valid();
                    stats.record_missing_field("name");
                }
            }));
        }
        for handle in handles {
            handle.join().unwrap();
        }

        let snapshot = stats.snapshot();
        assert_eq!(snapshot.records_fetched, 800);
        assert_eq!(snapshot.valid, 800);
        assert_eq!(snapshot.missing_fields, vec![("name".to_string(), 800)]);
        assert_eq!(snapshot.categories[0].1.fetched, 800);
    }
}
