// HTTP-level behavior of the stats client against a mock server

use std::sync::Arc;
use std::time::Duration;

use courtside::{
    keys, FetchError, HttpStatsSource, PageToken, QueryCache, QueryOptions, RetryPolicy,
    StatsApi,
};
use pretty_assertions::assert_eq;
use serde_json::json;
use wiremock::matchers::{method, path, query_param};
use wiremock::{Mock, MockServer, ResponseTemplate};

fn api_for(server: &MockServer) -> StatsApi {
    let source = HttpStatsSource::new(&server.uri(), Duration::from_secs(5)).unwrap();
    StatsApi::new(Arc::new(source))
}

fn fast_retry(max_retries: u32) -> QueryOptions {
    QueryOptions::default().with_retry(RetryPolicy {
        max_retries,
        base_delay: Duration::from_millis(10),
        max_delay: Duration::from_millis(40),
    })
}

#[tokio::test]
async fn success_envelope_is_unwrapped() {
    let server = MockServer::start().await;
    Mock::given(method("GET"))
        .and(path("/api/v1/nba/players/2544"))
        .respond_with(ResponseTemplate::new(200).set_body_json(json!({
            "success": true,
            "data": {"id": 2544, "name": "LeBron James", "teamId": 1610612747, "jersey": 23}
        })))
        .mount(&server)
        .await;

    let player = api_for(&server).player_details("2544").await.unwrap();
    assert_eq!(player.id, "2544");
    assert_eq!(player.team_id.as_deref(), Some("1610612747"));
    assert_eq!(player.jersey.as_deref(), Some("23"));
}

#[tokio::test]
async fn legacy_body_is_used_as_is() {
    let server = MockServer::start().await;
    Mock::given(method("GET"))
        .and(path("/api/v1/nba/games"))
        .and(query_param("date", "20260114"))
        .respond_with(ResponseTemplate::new(200).set_body_json(json!({
            "date": "20260114",
            "games": []
        })))
        .mount(&server)
        .await;

    let list = api_for(&server).games_by_date("20260114").await.unwrap();
    assert_eq!(list.date.as_deref(), Some("20260114"));
    assert!(list.games.is_empty());
}

#[tokio::test]
async fn error_kinds_are_distinct() {
    let server = MockServer::start().await;
    Mock::given(path("/api/v1/nba/players/1"))
        .respond_with(ResponseTemplate::new(429).set_body_json(json!({"success": true})))
        .mount(&server)
        .await;
    Mock::given(path("/api/v1/nba/players/2"))
        .respond_with(ResponseTemplate::new(500))
        .mount(&server)
        .await;
    Mock::given(path("/api/v1/nba/players/3"))
        .respond_with(ResponseTemplate::new(200).set_body_json(json!({
            "success": false,
            "error": {"message": "player not found"}
        })))
        .mount(&server)
        .await;
    Mock::given(path("/api/v1/nba/players/4"))
        .respond_with(ResponseTemplate::new(200).set_body_json(json!({"success": "yes"})))
        .mount(&server)
        .await;
    Mock::given(path("/api/v1/nba/players/5"))
        .respond_with(ResponseTemplate::new(200).set_body_string("<html>maintenance</html>"))
        .mount(&server)
        .await;

    let api = api_for(&server);

    let err = api.player_details("1").await.unwrap_err();
    assert!(err.is_rate_limit());
    assert_eq!(err.status(), Some(429));

    assert_eq!(
        api.player_details("2").await.unwrap_err(),
        FetchError::Http {
            status: 500,
            status_text: "Internal Server Error".into()
        }
    );
    assert_eq!(
        api.player_details("3").await.unwrap_err(),
        FetchError::Api {
            message: "player not found".into()
        }
    );
    assert!(matches!(
        api.player_details("4").await.unwrap_err(),
        FetchError::Malformed { .. }
    ));
    assert!(matches!(
        api.player_details("5").await.unwrap_err(),
        FetchError::Malformed { .. }
    ));
}

#[tokio::test]
async fn both_pagination_shapes_are_understood() {
    let server = MockServer::start().await;
    Mock::given(path("/api/v1/nba/news"))
        .and(query_param("page", "1"))
        .respond_with(ResponseTemplate::new(200).set_body_json(json!({
            "success": true,
            "data": [{"id": 1, "title": "a"}],
            "meta": {"pagination": {"hasMore": true, "nextPage": 2}}
        })))
        .mount(&server)
        .await;
    Mock::given(path("/api/v1/nba/teams/BOS/schedule"))
        .and(query_param("page", "2"))
        .respond_with(ResponseTemplate::new(200).set_body_json(json!({
            "success": true,
            "data": [{"gameId": 9, "date": "2026-02-01", "opponent": "NYK"}],
            "meta": {"pagination": {"page": 2, "pages": 2}}
        })))
        .mount(&server)
        .await;

    let api = api_for(&server);
    let news = api.news_page(None).await.unwrap();
    assert!(news.has_more);
    assert_eq!(news.next_token, Some(PageToken(2)));

    let schedule = api.team_schedule_page("BOS", Some(PageToken(2))).await.unwrap();
    assert!(!schedule.has_more);
    assert_eq!(schedule.items[0].opponent, "NYK");
}

#[tokio::test]
async fn transient_failures_are_retried_through_the_cache() {
    let server = MockServer::start().await;
    Mock::given(path("/api/v1/nba/standings"))
        .respond_with(ResponseTemplate::new(503))
        .up_to_n_times(2)
        .mount(&server)
        .await;
    Mock::given(path("/api/v1/nba/standings"))
        .respond_with(ResponseTemplate::new(200).set_body_json(json!({
            "success": true,
            "data": {"east": [], "west": []}
        })))
        .expect(1)
        .mount(&server)
        .await;

    let api = api_for(&server);
    let cache = QueryCache::default();
    let entry = cache
        .fetch_query(
            keys::standings(),
            move || {
                let api = api.clone();
                async move { api.standings().await }
            },
            fast_retry(3),
        )
        .await;

    assert!(entry.is_success());
    assert_eq!(entry.retry_count, 2);
}

#[tokio::test]
async fn concurrent_screens_share_one_request() {
    let server = MockServer::start().await;
    Mock::given(path("/api/v1/nba/games/401585"))
        .respond_with(
            ResponseTemplate::new(200)
                .set_delay(Duration::from_millis(100))
                .set_body_json(json!({
                    "success": true,
                    "data": {
                        "id": "401585",
                        "home": {"id": 1, "name": "Celtics"},
                        "away": {"id": 2, "name": "Lakers"}
                    }
                })),
        )
        .expect(1)
        .mount(&server)
        .await;

    let api = api_for(&server);
    let cache = QueryCache::default();
    let fetch = || {
        let api = api.clone();
        cache.fetch_query(
            keys::game_detail("401585"),
            move || {
                let api = api.clone();
                async move { api.game_detail("401585").await }
            },
            fast_retry(0),
        )
    };

    let (a, b) = tokio::join!(fetch(), fetch());
    assert!(a.is_success() && b.is_success());
    assert_eq!(a.data().unwrap().game.home.name, "Celtics");
}
