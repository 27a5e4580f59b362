//! Category planner: count probes and page task generation.
//!
//! For every configured partition the planner issues one lightweight probe
//! (`per_page=1`) and reads `result_size` from the envelope. From that it
//! computes the page count at the real page size and emits one [`PageTask`]
//! per page. Empty partitions are skipped with a log line; probe failures
//! are recorded as planning failures and skip the partition without
//! touching the rest of the run.

use std::sync::Arc;

use tracing::{info, warn};

use super::category::{CategoryPartition, PAGE_CEILING, PageTask, estates_url};
use super::stats::RunStats;
use crate::fetch::FetchClient;

/// Planner output for one partition that will actually be crawled.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct CategoryPlan {
    /// The partition being crawled.
    pub partition: CategoryPartition,
    /// Result count the probe reported.
    pub expected: u64,
    /// Number of pages to fetch at the configured page size.
    pub total_pages: u32,
}

/// The full crawl plan: per-partition plans plus the flattened task list.
#[derive(Debug, Clone, Default)]
pub struct CrawlPlan {
    /// Partitions with a non-zero result count.
    pub plans: Vec<CategoryPlan>,
    /// One task per (partition, page), in partition order.
    pub tasks: Vec<PageTask>,
}

/// Computes `ceil(expected / page_size)` pages for a partition.
#[must_use]
pub fn total_pages(expected: u64, page_size: u32) -> u32 {
    if page_size == 0 {
        return 0;
    }
    u32::try_from(expected.div_ceil(u64::from(page_size))).unwrap_or(u32::MAX)
}

/// Plans the crawl by probing every partition.
///
/// Never fails: a probe failure is recorded in the run statistics as a
/// planning failure and the partition is skipped.
pub async fn plan_crawl(
    client: &Arc<FetchClient>,
    base_url: &str,
    region_id: u32,
    page_size: u32,
    partitions: &[CategoryPartition],
    stats: &RunStats,
) -> CrawlPlan {
    let mut plan = CrawlPlan::default();

    for partition in partitions {
        let probe_url = match estates_url(base_url, partition, region_id, 1, 1) {
            Ok(url) => url,
            Err(e) => {
                stats.record_failure(&partition.name, None, e.to_string());
                continue;
            }
        };

        let expected = match probe_partition(client, &probe_url).await {
            Ok(expected) => expected,
            Err(reason) => {
                stats.record_failure(&partition.name, None, reason);
                continue;
            }
        };

        if expected == 0 {
            info!(category = %partition.name, "empty partition - skipping");
            continue;
        }

        stats.set_expected(&partition.name, expected);

        let mut pages = total_pages(expected, page_size);
        if pages > PAGE_CEILING {
            // The API will not serve pages past the ceiling. The partition
            // would need a narrower filter to be complete; the shortfall
            // surfaces as INCOMPLETE in the run report.
            warn!(
                category = %partition.name,
                expected,
                pages,
                ceiling = PAGE_CEILING,
                "partition exceeds the API page ceiling - listings past it will be missed"
            );
            pages = PAGE_CEILING;
        }

        info!(
            category = %partition.name,
            expected,
            pages,
            "planned partition"
        );

        for page in 1..=pages {
            plan.tasks.push(PageTask {
                partition: partition.clone(),
                page,
            });
        }
        plan.plans.push(CategoryPlan {
            partition: partition.clone(),
            expected,
            total_pages: pages,
        });
    }

    info!(
        partitions = plan.plans.len(),
        tasks = plan.tasks.len(),
        "crawl planned"
    );

    plan
}

/// Probes one partition and extracts `result_size`.
async fn probe_partition(client: &Arc<FetchClient>, probe_url: &str) -> Result<u64, String> {
    let body = client
        .fetch_json(probe_url)
        .await
        .map_err(|e| format!("probe fetch failed: {e}"))?;

    body.get("result_size")
        .and_then(serde_json::Value::as_u64)
        .ok_or_else(|| "probe response missing result_size".to_string())
}
