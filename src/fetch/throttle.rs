//! Adaptive request throttling for the single upstream API host.
//!
//! This module provides the [`AutoThrottle`] struct which spaces requests by
//! a self-tuning delay. The delay starts low and converges toward
//! `latency / target_concurrency`: when the server slows down (latency grows
//! beyond what the targeted concurrency can absorb) the delay rises, and when
//! it speeds up the delay falls back toward the configured minimum. Failed
//! responses may raise the delay but never lower it.
//!
//! # Example
//!
//! ```
//! use std::sync::Arc;
//! use std::time::Duration;
//! use sreality_crawler::fetch::AutoThrottle;
//!
//! # async fn example() {
//! let throttle = Arc::new(AutoThrottle::default());
//!
//! // First request proceeds immediately
//! throttle.acquire().await;
//!
//! // Feed back the observed latency so the delay adapts
//! throttle.record_response(Duration::from_millis(800), true).await;
//!
//! // Subsequent requests wait out the current delay
//! throttle.acquire().await;
//! # }
//! ```

use std::time::Duration;

use tokio::sync::Mutex;
use tokio::time::Instant;
use tracing::{debug, trace};

/// Default delay the throttle starts from.
pub const DEFAULT_START_DELAY: Duration = Duration::from_millis(500);

/// Default minimum delay between requests.
pub const DEFAULT_MIN_DELAY: Duration = Duration::from_millis(250);

/// Default upper bound the delay may grow to.
pub const DEFAULT_MAX_DELAY: Duration = Duration::from_secs(5);

/// Default number of requests the throttle tries to keep in flight.
pub const DEFAULT_TARGET_CONCURRENCY: f64 = 4.0;

/// Adaptive request throttle.
///
/// Designed to be wrapped in `Arc` and shared across spawned Tokio tasks.
/// All timing state lives behind a single `tokio::sync::Mutex` so that the
/// read-update of "when may the next request start" is atomic across
/// concurrently completing tasks.
#[derive(Debug)]
pub struct AutoThrottle {
    /// Lower clamp for the adaptive delay.
    min_delay: Duration,

    /// Upper clamp for the adaptive delay.
    max_delay: Duration,

    /// Concurrency the delay is tuned toward.
    target_concurrency: f64,

    /// Whether throttling is disabled (delay 0, no adaptation).
    disabled: bool,

    /// Mutable timing state.
    state: Mutex<ThrottleState>,
}

#[derive(Debug)]
struct ThrottleState {
    /// Current adaptive delay between requests.
    current_delay: Duration,

    /// When the last request was released. `None` before the first request.
    last_request: Option<Instant>,
}

impl Default for AutoThrottle {
    fn default() -> Self {
        Self::new(
            DEFAULT_START_DELAY,
            DEFAULT_MIN_DELAY,
            DEFAULT_MAX_DELAY,
            DEFAULT_TARGET_CONCURRENCY,
        )
    }
}

impl AutoThrottle {
    /// Creates a new throttle.
    ///
    /// # Arguments
    ///
    /// * `start_delay` - Delay used until the first response is observed
    /// * `min_delay` - Lower clamp for the adaptive delay
    /// * `max_delay` - Upper clamp for the adaptive delay
    /// * `target_concurrency` - Concurrency the delay is tuned toward (> 0)
    #[must_use]
    pub fn new(
        start_delay: Duration,
        min_delay: Duration,
        max_delay: Duration,
        target_concurrency: f64,
    ) -> Self {
        Self {
            min_delay,
            max_delay,
            target_concurrency: target_concurrency.max(0.1),
            disabled: false,
            state: Mutex::new(ThrottleState {
                current_delay: start_delay.clamp(min_delay, max_delay),
                last_request: None,
            }),
        }
    }

    /// Creates a disabled throttle that never delays.
    #[must_use]
    pub fn disabled() -> Self {
        Self {
            min_delay: Duration::ZERO,
            max_delay: Duration::ZERO,
            target_concurrency: DEFAULT_TARGET_CONCURRENCY,
            disabled: true,
            state: Mutex::new(ThrottleState {
                current_delay: Duration::ZERO,
                last_request: None,
            }),
        }
    }

    /// Returns whether throttling is disabled.
    #[must_use]
    pub fn is_disabled(&self) -> bool {
        self.disabled
    }

    /// Returns the current adaptive delay.
    pub async fn current_delay(&self) -> Duration {
        self.state.lock().await.current_delay
    }

    /// Waits until the next request may start, then stamps the release time.
    ///
    /// The first request proceeds immediately. Subsequent callers wait out
    /// whatever remains of the current delay since the last release. The
    /// release stamp is written before sleeping finishes returning, so
    /// concurrent callers queue up behind each other rather than releasing
    /// in a burst.
    pub async fn acquire(&self) {
        if self.disabled {
            return;
        }

        let wait = {
            let mut state = self.state.lock().await;
            let now = Instant::now();

            let wait = match state.last_request {
                None => Duration::ZERO,
                Some(last) => {
                    let next_allowed = last + state.current_delay;
                    next_allowed.saturating_duration_since(now)
                }
            };

            // Stamp the slot this caller occupies while still holding the
            // lock, so the next caller queues behind it.
            state.last_request = Some(now + wait);
            wait
        };

        if !wait.is_zero() {
            trace!(wait_ms = wait.as_millis(), "throttling request");
            tokio::time::sleep(wait).await;
        }
    }

    /// Feeds an observed response back into the throttle.
    ///
    /// Moves the delay halfway toward `latency / target_concurrency`,
    /// clamped to `[min_delay, max_delay]`. A failed response (non-2xx or
    /// transport error) may only raise the delay, never lower it - backing
    /// off from a struggling server must not be undone by a fast error
    /// response.
    pub async fn record_response(&self, latency: Duration, ok: bool) {
        if self.disabled {
            return;
        }

        let mut state = self.state.lock().await;

        let target_ms = latency.as_secs_f64() * 1000.0 / self.target_concurrency;
        let current_ms = state.current_delay.as_secs_f64() * 1000.0;
        let new_ms = (current_ms + target_ms) / 2.0;

        if !ok && new_ms < current_ms {
            trace!(
                latency_ms = latency.as_millis(),
                "failed response - keeping current delay"
            );
            return;
        }

        let clamped = Duration::from_secs_f64(new_ms / 1000.0).clamp(self.min_delay, self.max_delay);

        if clamped != state.current_delay {
            debug!(
                old_ms = state.current_delay.as_millis(),
                new_ms = clamped.as_millis(),
                latency_ms = latency.as_millis(),
                "adjusted throttle delay"
            );
        }

        state.current_delay = clamped;
    }
}
