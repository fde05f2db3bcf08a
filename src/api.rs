//! Remote stats API client.
//!
//! `StatsSource` is the transport seam: it performs one GET and hands back a
//! normalized envelope. `HttpStatsSource` is the reqwest implementation;
//! tests swap in an in-memory source. `StatsApi` maps every endpoint family
//! to a typed method on top of whichever source it was built with.

use std::sync::{Arc, OnceLock};
use std::time::Duration;

use async_trait::async_trait;
use serde::de::DeserializeOwned;
use url::Url;

use crate::constants::api;
use crate::envelope::{normalize, Normalized};
use crate::error::FetchError;
use crate::models::{
    AdvancedStats, GameDetail, GameList, GameLog, GameSummary, Leaderboard, NewsItem,
    PlayerBio, PlayerDetails, RegularStats, ScheduleItem, SeasonStats, Standings,
    TeamLeaders, TeamOverview,
};
use crate::pagination::{Page, PageToken};

#[async_trait]
pub trait StatsSource: Send + Sync {
    /// GET `segments` under the API root with `query` parameters.
    async fn get(
        &self,
        segments: &[&str],
        query: &[(&str, String)],
    ) -> Result<Normalized, FetchError>;
}

static HTTP: OnceLock<reqwest::Client> = OnceLock::new();

fn http_client() -> &'static reqwest::Client {
    HTTP.get_or_init(|| {
        reqwest::Client::builder()
            .pool_max_idle_per_host(8)
            .tcp_nodelay(true)
            .build()
            .unwrap_or_else(|e| {
                log::warn!("[api] client builder failed ({e}), using defaults");
                reqwest::Client::new()
            })
    })
}

#[derive(Debug, Clone)]
pub struct HttpStatsSource {
    root: Url,
    timeout: Duration,
}

impl HttpStatsSource {
    /// `base_url` is the server origin (optionally with a path prefix); the
    /// `api/v1/nba/` root is appended.
    pub fn new(base_url: &str, timeout: Duration) -> Result<Self, url::ParseError> {
        let mut base = Url::parse(base_url)?;
        if !base.path().ends_with('/') {
            let path = format!("{}/", base.path());
            base.set_path(&path);
        }
        let root = base.join(api::PATH_PREFIX)?;
        Ok(Self { root, timeout })
    }

    pub fn root(&self) -> &Url {
        &self.root
    }

    pub fn endpoint(&self, segments: &[&str]) -> Result<Url, FetchError> {
        let mut url = self.root.clone();
        url.path_segments_mut()
            .map_err(|_| FetchError::network(format!("cannot append path to {}", self.root)))?
            .pop_if_empty()
            .extend(segments);
        Ok(url)
    }
}

#[async_trait]
impl StatsSource for HttpStatsSource {
    async fn get(
        &self,
        segments: &[&str],
        query: &[(&str, String)],
    ) -> Result<Normalized, FetchError> {
        let url = self.endpoint(segments)?;
        log::debug!("[api] GET {url} {query:?}");

        let response = http_client()
            .get(url.clone())
            .query(query)
            .timeout(self.timeout)
            .send()
            .await?;

        let status = response.status();
        let status_text = status.canonical_reason().unwrap_or_default().to_string();
        if !status.is_success() {
            log::warn!("[api] {url} -> {}", status.as_u16());
            return normalize(status.as_u16(), &status_text, &[]);
        }

        let body = response.bytes().await?;
        normalize(status.as_u16(), &status_text, &body)
    }
}

/// Typed access to every endpoint family.
#[derive(Clone)]
pub struct StatsApi {
    source: Arc<dyn StatsSource>,
    news_page_size: u32,
}

impl StatsApi {
    pub fn new(source: Arc<dyn StatsSource>) -> Self {
        Self {
            source,
            news_page_size: api::NEWS_PAGE_SIZE,
        }
    }

    pub fn with_news_page_size(mut self, news_page_size: u32) -> Self {
        self.news_page_size = news_page_size;
        self
    }

    async fn get_json<T: DeserializeOwned>(
        &self,
        segments: &[&str],
        query: &[(&str, String)],
    ) -> Result<T, FetchError> {
        self.source.get(segments, query).await?.decode()
    }

    async fn get_page<T: DeserializeOwned>(
        &self,
        segments: &[&str],
        token: Option<PageToken>,
        extra: &[(&str, String)],
    ) -> Result<Page<T>, FetchError> {
        let page = token.map_or(1, |t| t.0);
        let mut query = vec![("page", page.to_string())];
        query.extend(extra.iter().cloned());
        self.source.get(segments, &query).await?.into_page()
    }

    pub async fn games_by_date(&self, date_token: &str) -> Result<GameList, FetchError> {
        self.get_json(&["games"], &[("date", date_token.to_string())]).await
    }

    pub async fn standings(&self) -> Result<Standings, FetchError> {
        self.get_json(&["standings"], &[]).await
    }

    pub async fn game_detail(&self, game_id: &str) -> Result<GameDetail, FetchError> {
        self.get_json(&["games", game_id], &[]).await
    }

    pub async fn game_summary(&self, game_id: &str) -> Result<GameSummary, FetchError> {
        self.get_json(&["games", game_id, "summary"], &[]).await
    }

    pub async fn team_overview(&self, team_id: &str) -> Result<TeamOverview, FetchError> {
        self.get_json(&["teams", team_id], &[]).await
    }

    pub async fn team_leaders(&self, team_id: &str) -> Result<TeamLeaders, FetchError> {
        self.get_json(&["teams", team_id, "leaders"], &[]).await
    }

    pub async fn team_recent_games(&self, team_id: &str) -> Result<GameList, FetchError> {
        self.get_json(&["teams", team_id, "recent-games"], &[]).await
    }

    pub async fn team_schedule_page(
        &self,
        team_id: &str,
        token: Option<PageToken>,
    ) -> Result<Page<ScheduleItem>, FetchError> {
        self.get_page(&["teams", team_id, "schedule"], token, &[]).await
    }

    pub async fn player_details(&self, player_id: &str) -> Result<PlayerDetails, FetchError> {
        self.get_json(&["players", player_id], &[]).await
    }

    pub async fn player_bio(&self, player_id: &str) -> Result<PlayerBio, FetchError> {
        self.get_json(&["players", player_id, "bio"], &[]).await
    }

    pub async fn player_current_stats(&self, player_id: &str) -> Result<SeasonStats, FetchError> {
        self.get_json(&["players", player_id, "stats", "current"], &[]).await
    }

    pub async fn player_regular_stats(&self, player_id: &str) -> Result<RegularStats, FetchError> {
        self.get_json(&["players", player_id, "stats", "regular"], &[]).await
    }

    pub async fn player_advanced_stats(
        &self,
        player_id: &str,
    ) -> Result<AdvancedStats, FetchError> {
        self.get_json(&["players", player_id, "stats", "advanced"], &[]).await
    }

    pub async fn player_game_log(&self, player_id: &str) -> Result<GameLog, FetchError> {
        self.get_json(&["players", player_id, "game-log"], &[]).await
    }

    pub async fn leaders(&self, stat: &str) -> Result<Leaderboard, FetchError> {
        self.get_json(&["leaders"], &[("stat", stat.to_string())]).await
    }

    pub async fn news_page(&self, token: Option<PageToken>) -> Result<Page<NewsItem>, FetchError> {
        let limit = [("limit", self.news_page_size.to_string())];
        self.get_page(&["news"], token, &limit).await
    }
}
