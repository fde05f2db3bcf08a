//! Per-screen query wiring.
//!
//! Each function issues the queries one screen needs, with the dependency
//! edges that screen declares. Dependents are declared before the parent
//! fetch so the parent's success releases them in the same cache update.

use std::future::Future;

use futures::future::{BoxFuture, FutureExt};
use serde::Serialize;
use serde_json::{json, Value};

use crate::api::StatsApi;
use crate::constants::messages;
use crate::error::FetchError;
use crate::game_date::games_date_token;
use crate::models::{
    AdvancedStats, GameDetail, GameList, GameLog, GameSummary, Leaderboard, NewsItem,
    PlayerBio, PlayerDetails, RegularStats, ScheduleItem, SeasonStats, Standings,
    TeamLeaders, TeamOverview,
};
use crate::pagination::{InfiniteQuery, Page, PageSet, PageToken};
use crate::query_cache::{QueryEntry, QueryStatus, QuerySubscription};
use crate::query_key::keys;
use crate::sequencer::DependencyEdge;
use crate::session::Session;

/// Build a cache fetcher calling `call(api, id)`.
fn fetcher<T, F, Fut>(
    api: &StatsApi,
    id: &str,
    call: F,
) -> impl Fn() -> BoxFuture<'static, Result<T, FetchError>> + Send + Sync + 'static
where
    T: 'static,
    F: Fn(StatsApi, String) -> Fut + Send + Sync + 'static,
    Fut: Future<Output = Result<T, FetchError>> + Send + 'static,
{
    let api = api.clone();
    let id = id.to_string();
    move || call(api.clone(), id.clone()).boxed()
}

fn page_fetcher<T, F, Fut>(
    api: &StatsApi,
    id: &str,
    call: F,
) -> impl Fn(Option<PageToken>) -> BoxFuture<'static, Result<Page<T>, FetchError>>
       + Send
       + Sync
       + 'static
where
    T: 'static,
    F: Fn(StatsApi, String, Option<PageToken>) -> Fut + Send + Sync + 'static,
    Fut: Future<Output = Result<Page<T>, FetchError>> + Send + 'static,
{
    let api = api.clone();
    let id = id.to_string();
    move |token| call(api.clone(), id.clone(), token).boxed()
}

async fn settle<T: Send + Sync + 'static>(
    parent_ok: bool,
    sub: &mut QuerySubscription<T>,
) -> QueryEntry<T> {
    if !parent_ok {
        return sub.current();
    }
    sub.settled().await.unwrap_or_else(|| sub.current())
}

pub async fn scoreboard(session: &Session, date: chrono::NaiveDate) -> QueryEntry<GameList> {
    let token = games_date_token(date);
    let key = keys::games_by_date(&token);
    session
        .cache()
        .fetch_query(
            key,
            fetcher(session.api(), &token, |api, token| async move {
                api.games_by_date(&token).await
            }),
            session.options(),
        )
        .await
}

pub async fn standings(session: &Session) -> QueryEntry<Standings> {
    session
        .cache()
        .fetch_query(
            keys::standings(),
            fetcher(session.api(), "", |api, _| async move { api.standings().await }),
            session.options(),
        )
        .await
}

pub async fn leaderboard(session: &Session, stat: &str) -> QueryEntry<Leaderboard> {
    session
        .cache()
        .fetch_query(
            keys::leaders(stat),
            fetcher(session.api(), stat, |api, stat| async move {
                api.leaders(&stat).await
            }),
            session.options(),
        )
        .await
}

pub async fn news_feed(session: &Session) -> InfiniteQuery<NewsItem> {
    session
        .cache()
        .infinite_query(
            keys::news(),
            page_fetcher(session.api(), "", |api, _, token| async move {
                api.news_page(token).await
            }),
            session.options(),
        )
        .await
}

pub async fn team_schedule(session: &Session, team_id: &str) -> InfiniteQuery<ScheduleItem> {
    session
        .cache()
        .infinite_query(
            keys::team_schedule(team_id),
            page_fetcher(session.api(), team_id, |api, id, token| async move {
                api.team_schedule_page(&id, token).await
            }),
            session.options(),
        )
        .await
}

/// Game detail plus its recap, which waits for the detail.
pub struct GameScreen {
    pub detail: QueryEntry<GameDetail>,
    summary: QuerySubscription<GameSummary>,
}

impl GameScreen {
    pub async fn summary(&mut self) -> QueryEntry<GameSummary> {
        settle(self.detail.is_success(), &mut self.summary).await
    }
}

pub async fn game(session: &Session, game_id: &str) -> GameScreen {
    let cache = session.cache();
    let api = session.api();
    let options = session.options();
    let parent = keys::game_detail(game_id);

    let summary = cache.fetch_dependent(
        DependencyEdge::new(parent.clone(), keys::game_summary(game_id)),
        fetcher(api, game_id, |api, id| async move { api.game_summary(&id).await }),
        options,
    );
    let detail = cache
        .fetch_query(
            parent,
            fetcher(api, game_id, |api, id| async move { api.game_detail(&id).await }),
            options,
        )
        .await;

    GameScreen { detail, summary }
}

/// Player identity first; everything else is gated on it.
pub struct PlayerScreen {
    pub details: QueryEntry<PlayerDetails>,
    bio: QuerySubscription<PlayerBio>,
    current_stats: QuerySubscription<SeasonStats>,
    regular_stats: QuerySubscription<RegularStats>,
    advanced_stats: QuerySubscription<AdvancedStats>,
    game_log: QuerySubscription<GameLog>,
}

pub struct PlayerProfile {
    pub details: QueryEntry<PlayerDetails>,
    pub bio: QueryEntry<PlayerBio>,
    pub current_stats: QueryEntry<SeasonStats>,
    pub regular_stats: QueryEntry<RegularStats>,
    pub advanced_stats: QueryEntry<AdvancedStats>,
    pub game_log: QueryEntry<GameLog>,
}

impl PlayerScreen {
    /// Wait for every dependent section. Sections of a player whose details
    /// failed come back `Idle`.
    pub async fn settle(mut self) -> PlayerProfile {
        let ok = self.details.is_success();
        let (bio, current_stats, regular_stats, advanced_stats, game_log) = tokio::join!(
            settle(ok, &mut self.bio),
            settle(ok, &mut self.current_stats),
            settle(ok, &mut self.regular_stats),
            settle(ok, &mut self.advanced_stats),
            settle(ok, &mut self.game_log),
        );
        PlayerProfile {
            details: self.details,
            bio,
            current_stats,
            regular_stats,
            advanced_stats,
            game_log,
        }
    }
}

pub async fn player(session: &Session, player_id: &str) -> PlayerScreen {
    let cache = session.cache();
    let api = session.api();
    let options = session.options();
    let parent = keys::player_details(player_id);
    let edge = |dependent| DependencyEdge::new(parent.clone(), dependent);

    let bio = cache.fetch_dependent(
        edge(keys::player_bio(player_id)),
        fetcher(api, player_id, |api, id| async move { api.player_bio(&id).await }),
        options,
    );
    let current_stats = cache.fetch_dependent(
        edge(keys::player_current_stats(player_id)),
        fetcher(api, player_id, |api, id| async move {
            api.player_current_stats(&id).await
        }),
        options,
    );
    let regular_stats = cache.fetch_dependent(
        edge(keys::player_regular_stats(player_id)),
        fetcher(api, player_id, |api, id| async move {
            api.player_regular_stats(&id).await
        }),
        options,
    );
    let advanced_stats = cache.fetch_dependent(
        edge(keys::player_advanced_stats(player_id)),
        fetcher(api, player_id, |api, id| async move {
            api.player_advanced_stats(&id).await
        }),
        options,
    );
    let game_log = cache.fetch_dependent(
        edge(keys::player_game_log(player_id)),
        fetcher(api, player_id, |api, id| async move {
            api.player_game_log(&id).await
        }),
        options,
    );

    let details = cache
        .fetch_query(
            parent.clone(),
            fetcher(api, player_id, |api, id| async move {
                api.player_details(&id).await
            }),
            options,
        )
        .await;

    PlayerScreen {
        details,
        bio,
        current_stats,
        regular_stats,
        advanced_stats,
        game_log,
    }
}

/// Team overview gating leaders and recent games. The schedule list is
/// opened only once the overview loaded.
pub struct TeamScreen {
    pub overview: QueryEntry<TeamOverview>,
    leaders: QuerySubscription<TeamLeaders>,
    recent_games: QuerySubscription<GameList>,
    pub schedule: Option<InfiniteQuery<ScheduleItem>>,
}

impl TeamScreen {
    pub async fn leaders(&mut self) -> QueryEntry<TeamLeaders> {
        settle(self.overview.is_success(), &mut self.leaders).await
    }

    pub async fn recent_games(&mut self) -> QueryEntry<GameList> {
        settle(self.overview.is_success(), &mut self.recent_games).await
    }
}

pub async fn team(session: &Session, team_id: &str) -> TeamScreen {
    let cache = session.cache();
    let api = session.api();
    let options = session.options();
    let parent = keys::team_overview(team_id);

    let leaders = cache.fetch_dependent(
        DependencyEdge::new(parent.clone(), keys::team_leaders(team_id)),
        fetcher(api, team_id, |api, id| async move { api.team_leaders(&id).await }),
        options,
    );
    let recent_games = cache.fetch_dependent(
        DependencyEdge::new(parent.clone(), keys::team_recent_games(team_id)),
        fetcher(api, team_id, |api, id| async move {
            api.team_recent_games(&id).await
        }),
        options,
    );
    let overview = cache
        .fetch_query(
            parent,
            fetcher(api, team_id, |api, id| async move { api.team_overview(&id).await }),
            options,
        )
        .await;

    let schedule = if overview.is_success() {
        Some(team_schedule(session, team_id).await)
    } else {
        None
    };

    TeamScreen {
        overview,
        leaders,
        recent_games,
        schedule,
    }
}

fn status_label(status: QueryStatus) -> &'static str {
    match status {
        QueryStatus::Idle => "idle",
        QueryStatus::Loading => "loading",
        QueryStatus::Success => "success",
        QueryStatus::Error => "error",
    }
}

/// JSON view of an entry: status, data, and the error with its user message.
pub fn entry_json<T: Serialize>(entry: &QueryEntry<T>) -> Value {
    json!({
        "status": status_label(entry.status),
        "data": entry.data(),
        "error": entry.error.as_ref().map(|e| json!({
            "kind": e.to_string(),
            "message": e.user_message(),
        })),
        "retryCount": entry.retry_count,
    })
}

/// JSON view of an accumulated list.
pub fn list_json<T: Serialize>(entry: &QueryEntry<PageSet<T>>) -> Value {
    let set = entry.data();
    json!({
        "status": status_label(entry.status),
        "items": set.map(|s| s.items().collect::<Vec<_>>()),
        "pages": set.map_or(0, |s| s.page_count()),
        "hasMore": set.is_some_and(|s| s.has_more()),
        "loadMoreError": set
            .and_then(|s| s.next_page_error())
            .map(|e| json!({ "kind": e.to_string(), "message": messages::LOAD_MORE_FAILED })),
        "error": entry.error.as_ref().map(|e| e.to_string()),
    })
}

impl PlayerProfile {
    pub fn to_json(&self) -> Value {
        json!({
            "details": entry_json(&self.details),
            "bio": entry_json(&self.bio),
            "currentStats": entry_json(&self.current_stats),
            "regularStats": entry_json(&self.regular_stats),
            "advancedStats": entry_json(&self.advanced_stats),
            "gameLog": entry_json(&self.game_log),
        })
    }
}
