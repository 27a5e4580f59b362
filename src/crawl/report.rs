//! End-of-run reconciliation report.
//!
//! Compares, per category, the record count the planner probe promised
//! against what the page tasks actually delivered, and logs a verdict.
//! Reporting never fails and never panics; a shortfall is information for
//! the operator, not an error in the run.

use tracing::{error, info, warn};

use super::stats::StatsSnapshot;

/// Overall verdict of a crawl run.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum RunVerdict {
    /// Every category delivered at least its expected count.
    Success,
    /// The total shortfall across categories, in records.
    MissingRecords(u64),
}

/// Writes the reconciliation report to the log and returns the verdict.
pub fn report_run(snapshot: &StatsSnapshot) -> RunVerdict {
    let mut shortfall = 0u64;

    for (category, count) in &snapshot.categories {
        if count.fetched >= count.expected {
            info!(
                category,
                expected = count.expected,
                fetched = count.fetched,
                "category complete"
            );
        } else {
            let missing = count.expected - count.fetched;
            shortfall += missing;
            warn!(
                category,
                expected = count.expected,
                fetched = count.fetched,
                missing,
                "category incomplete"
            );
        }
    }

    for failure in &snapshot.failures {
        warn!(
            category = %failure.category,
            page = ?failure.page,
            reason = %failure.reason,
            "recorded task failure"
        );
    }

    for (field, count) in &snapshot.missing_fields {
        info!(field, count, "records missing required field");
    }

    info!(
        pages = snapshot.pages_fetched,
        fetched = snapshot.records_fetched,
        valid = snapshot.valid,
        invalid = snapshot.invalid,
        duplicates = snapshot.duplicates,
        persisted = snapshot.persisted,
        failed_tasks = snapshot.failures.len(),
        "run totals"
    );

    if shortfall == 0 {
        info!(
            expected = snapshot.total_expected(),
            "run complete - every category delivered its expected count"
        );
        RunVerdict::Success
    } else {
        error!(
            shortfall,
            expected = snapshot.total_expected(),
            "run finished with missing records"
        );
        RunVerdict::MissingRecords(shortfall)
    }
}

#[cfg(test)]
#[allow(clippy::unwrap_used)]
mod tests {
    use super::*;
    use crate::crawl::RunStats;

    #[test]
    fn test_full_delivery_is_success() {
        let stats = RunStats::new();
        stats.set_expected("flats-sale", 3);
        for _ in 0..3 {
            stats.record_fetched("flats-sale");
        }
        assert_eq!(report_run(&stats.snapshot()), RunVerdict::Success);
    }

    #[test]
    fn test_shortfall_is_summed_across_categories() {
        let stats = RunStats::new();
        stats.set_expected("flats-sale", 1000);
        for _ in 0..950 {
            stats.record_fetched("flats-sale");
        }
        stats.set_expected("houses-rent", 10);
        for _ in 0..8 {
            stats.record_fetched("houses-rent");
        }
        assert_eq!(
            report_run(&stats.snapshot()),
            RunVerdict::MissingRecords(52)
        );
    }

    #[test]
    fn test_overdelivery_does_not_mask_another_categorys_shortfall() {
        let stats = RunStats::new();
        // The dataset can grow between probe and fetch
        stats.set_expected("flats-sale", 2);
        for _ in 0..5 {
            stats.record_fetched("flats-sale");
        }
        stats.set_expected("houses-rent", 4);
        stats.record_fetched("houses-rent");
        assert_eq!(report_run(&stats.snapshot()), RunVerdict::MissingRecords(3));
    }

    #[test]
    fn test_empty_run_is_success() {
        let stats = RunStats::new();
        assert_eq!(report_run(&stats.snapshot()), RunVerdict::Success);
    }
}
