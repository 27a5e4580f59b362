//! Crawl orchestration: partitions, planning, page fetching, statistics
//! and the end-of-run reconciliation report.

mod category;
mod fetcher;
mod planner;
mod report;
mod stats;

pub use category::{
    CategoryPartition, DEFAULT_PAGE_SIZE, DEFAULT_REGION_ID, PAGE_CEILING, PageTask, estates_url,
};
pub use fetcher::Crawler;
pub use planner::{CategoryPlan, CrawlPlan, plan_crawl, total_pages};
pub use report::{RunVerdict, report_run};
pub use stats::{CategoryCount, RunStats, StatsSnapshot, TaskFailure};
