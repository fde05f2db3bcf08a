//! courtside - data layer for a basketball stats client
//!
//! This library holds everything between the screens and the remote stats
//! API: a process-wide query cache with staleness, retry and in-flight
//! deduplication, dependent-query gating, infinite-list accumulation, and
//! the envelope normalizer that turns HTTP responses into typed payloads.
//!
//! ## Architecture
//!
//! - **envelope / api**: one GET per query, unwrapped into typed `models`
//! - **query_cache**: one entry per `QueryKey`, observers notified on every transition
//! - **sequencer**: dependents stay idle until their parent succeeds
//! - **pagination**: pages appended in fetch order under a single key
//! - **events**: foreground/reconnect signals that revalidate observed queries
//!
//! ## Usage
//!
//! ```bash
//! COURTSIDE_API_URL=https://stats.example.com cargo run -- player 2544
//! ```

// Core modules
pub mod config;
pub mod constants;
pub mod error;
pub mod util_text;

// Wire format and transport
pub mod api;
pub mod envelope;
pub mod models;

// Cache and sequencing
pub mod events;
pub mod net;
pub mod pagination;
pub mod query_cache;
pub mod query_key;
pub mod sequencer;

// Business rules and screen wiring
pub mod game_date;
pub mod screens;
pub mod session;

// Re-export commonly used types
pub use api::{HttpStatsSource, StatsApi, StatsSource};
pub use config::{CliArgs, Command, Config};
pub use error::FetchError;
pub use events::{EventBus, LifecycleEvent};
pub use net::RetryPolicy;
pub use pagination::{InfiniteQuery, NextPageOutcome, Page, PageSet, PageToken, PaginationMeta};
pub use query_cache::{QueryCache, QueryEntry, QueryOptions, QueryStatus, QuerySubscription};
pub use query_key::{keys, KeyPart, QueryKey};
pub use sequencer::DependencyEdge;
pub use session::Session;
