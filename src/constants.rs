//! Application constants
//!
//! Centralized defaults for cache policy, retry timing, and the remote API
//! used throughout the data layer.

/// Query cache policy
pub mod cache {
    use std::time::Duration;

    /// How long a successful entry is served without refetching.
    pub const STALE_TIME: Duration = Duration::from_secs(5);

    /// How long an unobserved entry survives before garbage collection.
    pub const GC_TIME: Duration = Duration::from_secs(5 * 60);

    /// Sweep interval for the background garbage collector.
    pub const GC_INTERVAL: Duration = Duration::from_secs(60);

    /// Capacity of the lifecycle event bus.
    pub const EVENT_BUS_CAPACITY: usize = 32;
}

/// Retry/backoff policy
pub mod retry {
    /// Retries after the first failed attempt (4 attempts total).
    pub const MAX_RETRIES: u32 = 3;

    /// Delay before the first retry; doubles for each further retry.
    pub const BASE_DELAY_MS: u64 = 1_000;

    /// Upper bound on any single backoff delay.
    pub const MAX_DELAY_MS: u64 = 30_000;
}

/// Remote stats API
pub mod api {
    /// Path prefix every endpoint lives under (relative to the base URL).
    pub const PATH_PREFIX: &str = "api/v1/nba/";

    pub const DEFAULT_BASE_URL: &str = "http://127.0.0.1:3000/";

    pub const DEFAULT_HTTP_TIMEOUT_MS: u64 = 10_000;

    /// News items requested per page.
    pub const NEWS_PAGE_SIZE: u32 = 20;

    /// Hours east of UTC used to interpret a picked calendar date.
    pub const LOCAL_UTC_OFFSET_HOURS: i64 = 8;
}

/// User-facing message strings
pub mod messages {
    /// Top-level query failed; the screen offers a retry.
    pub const LOAD_FAILED: &str = "Couldn't load data. Tap to retry.";

    /// "Load more" failed; existing rows stay visible.
    pub const LOAD_MORE_FAILED: &str = "Couldn't load more. Tap to retry.";

    /// Server is throttling us.
    pub const RATE_LIMITED: &str = "Too many requests. Try again in a moment.";

    /// Transport-level failure.
    pub const OFFLINE: &str = "You appear to be offline.";
}
