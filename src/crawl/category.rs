//! Category partitions and API query construction.
//!
//! The API caps how many pages it will serve for a single filter, so one
//! query can never see the whole dataset. The crawl is therefore partitioned
//! into disjoint category filters (`category_main_cb` x `category_type_cb`),
//! each small enough to stay under the ceiling.

use url::Url;

use crate::fetch::FetchError;

/// Maximum page count the API serves for one filter.
///
/// At the default page size of 999 this corresponds to the observed result
/// cap per query; pages past the ceiling return empty lists.
pub const PAGE_CEILING: u32 = 60;

/// Default records per page. The API accepts at most 999.
pub const DEFAULT_PAGE_SIZE: u32 = 999;

/// Default region filter (Prague).
pub const DEFAULT_REGION_ID: u32 = 10;

/// One disjoint API query filter.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct CategoryPartition {
    /// Human-readable partition name, used in logs and reports.
    pub name: String,
    /// `category_main_cb` classification code (property kind).
    pub main_cb: u32,
    /// `category_type_cb` classification code (listing kind).
    pub type_cb: u32,
}

impl CategoryPartition {
    /// Creates a partition.
    #[must_use]
    pub fn new(name: impl Into<String>, main_cb: u32, type_cb: u32) -> Self {
        Self {
            name: name.into(),
            main_cb,
            type_cb,
        }
    }

    /// The default partition set: property kinds crossed with sale/rent.
    ///
    /// Auctions (`category_type_cb=3`) are thin enough that they ride along
    /// in neither partition; add them here if a deployment needs them.
    #[must_use]
    pub fn defaults() -> Vec<Self> {
        vec![
            Self::new("flats-sale", 1, 1),
            Self::new("flats-rent", 1, 2),
            Self::new("houses-sale", 2, 1),
            Self::new("houses-rent", 2, 2),
            Self::new("land-sale", 3, 1),
            Self::new("commercial-sale", 4, 1),
            Self::new("commercial-rent", 4, 2),
            Self::new("others-sale", 5, 1),
        ]
    }
}

/// One page-fetch unit of work: a (partition, page) pair.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct PageTask {
    /// The partition this page belongs to.
    pub partition: CategoryPartition,
    /// Page number, 1-indexed.
    pub page: u32,
}

/// Builds an estates query URL for one partition page.
///
/// # Errors
///
/// Returns [`FetchError::InvalidUrl`] if `base` is not a valid URL.
pub fn estates_url(
    base: &str,
    partition: &CategoryPartition,
    region_id: u32,
    per_page: u32,
    page: u32,
) -> Result<String, FetchError> {
    let mut url = Url::parse(base).map_err(|_| FetchError::invalid_url(base))?;
    url.query_pairs_mut()
        .append_pair("category_main_cb", &partition.main_cb.to_string())
        .append_pair("category_type_cb", &partition.type_cb.to_string())
        .append_pair("locality_region_id", &region_id.to_string())
        .append_pair("per_page", &per_page.to_string())
        .append_pair("page", &page.to_string());
    Ok(url.into())
}
