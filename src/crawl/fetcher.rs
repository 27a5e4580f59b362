//! Concurrent page fetching.
//!
//! The crawler takes the planner's task list and works through it with a
//! semaphore-bounded pool of spawned tasks. Every page failure is scoped to
//! its task: it is recorded in the run statistics and the remaining pages
//! keep going. A panicking task is likewise absorbed and reported.

use std::sync::Arc;

use chrono::Utc;
use tokio::sync::Semaphore;
use tracing::{debug, info, warn};

use super::category::{CategoryPartition, PageTask, estates_url};
use super::planner::{CrawlPlan, plan_crawl};
use super::stats::{RunStats, StatsSnapshot};
use crate::fetch::FetchClient;
use crate::pipeline::Pipeline;
use crate::record::{RecordMeta, extract_record};

/// The crawl orchestrator: plans partitions, fans out page tasks and feeds
/// every extracted record through the pipeline.
pub struct Crawler {
    client: Arc<FetchClient>,
    pipeline: Arc<Pipeline>,
    stats: Arc<RunStats>,
    base_url: String,
    region_id: u32,
    page_size: u32,
    concurrency: usize,
}

impl Crawler {
    /// Assembles a crawler over an already-connected pipeline.
    #[must_use]
    #[allow(clippy::too_many_arguments)]
    pub fn new(
        client: Arc<FetchClient>,
        pipeline: Arc<Pipeline>,
        stats: Arc<RunStats>,
        base_url: impl Into<String>,
        region_id: u32,
        page_size: u32,
        concurrency: usize,
    ) -> Self {
        Self {
            client,
            pipeline,
            stats,
            base_url: base_url.into(),
            region_id,
            page_size,
            concurrency: concurrency.max(1),
        }
    }

    /// Runs the full crawl: plan, fetch every page, snapshot the counters.
    ///
    /// Never fails; everything that goes wrong is recorded in the returned
    /// snapshot's failure list.
    pub async fn run(&self, partitions: &[CategoryPartition]) -> StatsSnapshot {
        let plan = plan_crawl(
            &self.client,
            &self.base_url,
            self.region_id,
            self.page_size,
            partitions,
            &self.stats,
        )
        .await;

        self.fetch_pages(plan).await;
        self.stats.snapshot()
    }

    async fn fetch_pages(&self, plan: CrawlPlan) {
        let semaphore = Arc::new(Semaphore::new(self.concurrency));
        let mut handles = Vec::with_capacity(plan.tasks.len());

        for task in plan.tasks {
            // The semaphore is never closed, so acquisition only fails if
            // the run is being torn down.
            let Ok(permit) = Arc::clone(&semaphore).acquire_owned().await else {
                break;
            };

            let client = Arc::clone(&self.client);
            let pipeline = Arc::clone(&self.pipeline);
            let stats = Arc::clone(&self.stats);
            let base_url = self.base_url.clone();
            let region_id = self.region_id;
            let page_size = self.page_size;

            handles.push((
                task.partition.name.clone(),
                task.page,
                tokio::spawn(async move {
                    let _permit = permit;
                    crawl_page(&client, &pipeline, &stats, &base_url, region_id, page_size, task)
                        .await;
                }),
            ));
        }

        for (category, page, handle) in handles {
            if handle.await.is_err() {
                self.stats
                    .record_failure(&category, Some(page), "page task panicked");
            }
        }

        info!("all page tasks finished");
    }
}

/// Fetches one page and pushes its records through the pipeline.
async fn crawl_page(
    client: &FetchClient,
    pipeline: &Pipeline,
    stats: &RunStats,
    base_url: &str,
    region_id: u32,
    page_size: u32,
    task: PageTask,
) {
    let category = task.partition.name.as_str();

    let url = match estates_url(base_url, &task.partition, region_id, page_size, task.page) {
        Ok(url) => url,
        Err(e) => {
            stats.record_failure(category, Some(task.page), e.to_string());
            return;
        }
    };

    let body = match client.fetch_json(&url).await {
        Ok(body) => body,
        Err(e) => {
            stats.record_failure(category, Some(task.page), e.to_string());
            return;
        }
    };

    let Some(estates) = body
        .pointer("/_embedded/estates")
        .and_then(serde_json::Value::as_array)
    else {
        stats.record_failure(
            category,
            Some(task.page),
            "response missing _embedded.estates",
        );
        return;
    };

    stats.record_page();

    if estates.is_empty() {
        // Pages the planner emitted should all carry records; an empty one
        // usually means the dataset shrank between probe and fetch.
        warn!(category, page = task.page, "page returned no records");
        return;
    }

    debug!(category, page = task.page, records = estates.len(), "page fetched");

    let meta = RecordMeta {
        scraped_at: Utc::now(),
        source_category: task.partition.name.clone(),
        source_page: task.page,
    };
    for raw in estates {
        let record = extract_record(raw, &meta);
        stats.record_fetched(category);
        pipeline.process(&record).await;
    }
}
