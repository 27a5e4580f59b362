//! API fetch layer: HTTP client, retry classification and adaptive throttling.
//!
//! The crawl layer treats this module as its transport collaborator: it asks
//! for a URL and gets back either a parsed JSON body or a classified
//! [`FetchError`], with retries, backoff and request spacing already applied.

mod client;
mod error;
mod retry;
mod throttle;

pub use client::{DEFAULT_TIMEOUT, FetchClient};
pub use error::FetchError;
pub use retry::{DEFAULT_MAX_RETRIES, FailureType, RetryDecision, RetryPolicy, classify_error};
pub use throttle::{
    AutoThrottle, DEFAULT_MAX_DELAY, DEFAULT_MIN_DELAY, DEFAULT_START_DELAY,
    DEFAULT_TARGET_CONCURRENCY,
};
