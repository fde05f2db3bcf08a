// Native binary for courtside - runs one screen's queries and prints the result as JSON

use anyhow::{Context, Result};
use clap::Parser;
use serde_json::{json, Value};

use courtside::{
    config::{CliArgs, Command, Config},
    game_date, screens, InfiniteQuery, NextPageOutcome, Session,
};

#[tokio::main]
async fn main() -> Result<()> {
    // Load .env file if it exists (safe to ignore if not found)
    let _ = dotenvy::dotenv();
    env_logger::Builder::from_env(env_logger::Env::default().default_filter_or("info")).init();

    let args = CliArgs::parse();
    let cfg = Config::from_args(&args).context("Failed to load configuration")?;
    cfg.print_summary();

    let session = Session::new(cfg)?;
    let output = tokio::select! {
        out = run(&session, args.command) => out?,
        _ = tokio::signal::ctrl_c() => {
            log::info!("[courtside] interrupted");
            return Ok(());
        }
    };

    println!("{}", serde_json::to_string_pretty(&output)?);
    Ok(())
}

async fn run(session: &Session, command: Command) -> Result<Value> {
    match command {
        Command::Scores { date } => {
            let date = match date {
                Some(s) => game_date::parse_calendar_date(&s)
                    .with_context(|| format!("invalid --date '{s}', expected YYYY-MM-DD"))?,
                None => game_date::today_local(chrono::Utc::now()),
            };
            let entry = screens::scoreboard(session, date).await;
            for game in entry.data().map(|l| l.games.as_slice()).unwrap_or_default() {
                log::info!("[courtside] {}", game.headline());
            }
            Ok(json!({
                "date": game_date::games_date_token(date),
                "scoreboard": screens::entry_json(&entry),
            }))
        }
        Command::Standings => Ok(screens::entry_json(&screens::standings(session).await)),
        Command::Game { id } => {
            let mut screen = screens::game(session, &id).await;
            let summary = screen.summary().await;
            Ok(json!({
                "detail": screens::entry_json(&screen.detail),
                "summary": screens::entry_json(&summary),
            }))
        }
        Command::Player { id } => {
            let profile = screens::player(session, &id).await.settle().await;
            Ok(profile.to_json())
        }
        Command::Team { id, pages } => {
            let mut screen = screens::team(session, &id).await;
            let leaders = screen.leaders().await;
            let recent = screen.recent_games().await;
            let schedule = match &screen.schedule {
                Some(list) => {
                    load_pages(list, pages).await;
                    screens::list_json(&list.entry())
                }
                None => Value::Null,
            };
            Ok(json!({
                "overview": screens::entry_json(&screen.overview),
                "leaders": screens::entry_json(&leaders),
                "recentGames": screens::entry_json(&recent),
                "schedule": schedule,
            }))
        }
        Command::News { pages } => {
            let feed = screens::news_feed(session).await;
            load_pages(&feed, pages).await;
            Ok(screens::list_json(&feed.entry()))
        }
        Command::Leaders { stat } => Ok(screens::entry_json(
            &screens::leaderboard(session, &stat).await,
        )),
    }
}

/// Load until `pages` pages are present or the list stops growing.
async fn load_pages<T: Send + Sync + 'static>(list: &InfiniteQuery<T>, pages: u32) {
    for _ in 1..pages {
        match list.fetch_next_page().await {
            NextPageOutcome::Appended => {}
            other => {
                log::info!("[courtside] {} stopped at {other:?}", list.key());
                break;
            }
        }
    }
}
