//! Process-lifetime service container.
//!
//! A `Session` owns the query cache, the typed API, the lifecycle event bus
//! and the background tasks tying them together (event listener, GC sweep).
//! Build one per process inside a tokio runtime; dropping it stops the tasks.

use std::sync::Arc;

use anyhow::{Context, Result};
use tokio::task::JoinHandle;

use crate::api::{HttpStatsSource, StatsApi, StatsSource};
use crate::config::Config;
use crate::constants::cache;
use crate::events::{EventBus, LifecycleEvent};
use crate::query_cache::{QueryCache, QueryOptions};

pub struct Session {
    config: Config,
    cache: QueryCache,
    api: StatsApi,
    events: EventBus,
    tasks: Vec<JoinHandle<()>>,
}

impl Session {
    /// Session talking HTTP to `config.api_base_url`.
    pub fn new(config: Config) -> Result<Self> {
        let source = HttpStatsSource::new(&config.api_base_url, config.http_timeout())
            .with_context(|| format!("invalid API url: {}", config.api_base_url))?;
        log::info!("[session] API root {}", source.root());
        Ok(Self::with_source(config, Arc::new(source)))
    }

    pub fn with_source(config: Config, source: Arc<dyn StatsSource>) -> Self {
        let cache = QueryCache::new(config.query_options(), config.gc_time());
        let api = StatsApi::new(source).with_news_page_size(config.news_page_size);
        let events = EventBus::default();
        let tasks = vec![
            cache.spawn_event_listener(events.subscribe()),
            cache.spawn_gc(cache::GC_INTERVAL),
        ];
        Self {
            config,
            cache,
            api,
            events,
            tasks,
        }
    }

    pub fn config(&self) -> &Config {
        &self.config
    }

    pub fn cache(&self) -> &QueryCache {
        &self.cache
    }

    pub fn api(&self) -> &StatsApi {
        &self.api
    }

    pub fn events(&self) -> &EventBus {
        &self.events
    }

    pub fn options(&self) -> QueryOptions {
        self.cache.default_options()
    }

    /// Forward a platform lifecycle signal to the cache.
    pub fn publish(&self, event: LifecycleEvent) {
        self.events.publish(event);
    }
}

impl Drop for Session {
    fn drop(&mut self) {
        for task in self.tasks.drain(..) {
            task.abort();
        }
        log::debug!("[session] shut down");
    }
}
