//! Per-endpoint payload schemas.
//!
//! Everything is decoded at the envelope boundary, so a shape mismatch is a
//! `Malformed` fetch error instead of a missing field deep in a screen.

use serde::{Deserialize, Serialize};

use crate::util_text::{de_id, de_opt_id, format_record};

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct TeamScore {
    #[serde(deserialize_with = "de_id")]
    pub id: String,
    pub name: String,
    #[serde(default)]
    pub abbreviation: String,
    #[serde(default)]
    pub score: Option<u32>,
    #[serde(default)]
    pub record: Option<String>,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct Game {
    #[serde(deserialize_with = "de_id")]
    pub id: String,
    /// "scheduled", "live", "final", ...
    #[serde(default)]
    pub status: String,
    #[serde(default)]
    pub start_time: Option<String>,
    #[serde(default)]
    pub period: Option<u32>,
    #[serde(default)]
    pub clock: Option<String>,
    pub home: TeamScore,
    pub away: TeamScore,
    #[serde(default)]
    pub arena: Option<String>,
}

impl Game {
    /// One-line scoreboard summary, e.g. `BOS 112 - 108 LAL (final)`.
    pub fn headline(&self) -> String {
        let score = |t: &TeamScore| t.score.map(|s| s.to_string()).unwrap_or_else(|| "-".into());
        format!(
            "{} {} - {} {} ({})",
            self.away.abbreviation,
            score(&self.away),
            score(&self.home),
            self.home.abbreviation,
            self.status
        )
    }
}

#[derive(Debug, Clone, PartialEq, Default, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct GameList {
    #[serde(default)]
    pub date: Option<String>,
    #[serde(default)]
    pub games: Vec<Game>,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct StandingRow {
    #[serde(deserialize_with = "de_id")]
    pub team_id: String,
    pub team_name: String,
    pub wins: u32,
    pub losses: u32,
    #[serde(default)]
    pub games_behind: Option<f64>,
    #[serde(default)]
    pub streak: Option<String>,
    #[serde(default)]
    pub seed: Option<u32>,
}

impl StandingRow {
    pub fn record(&self) -> String {
        format_record(self.wins, self.losses)
    }
}

#[derive(Debug, Clone, PartialEq, Default, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct Standings {
    #[serde(default)]
    pub east: Vec<StandingRow>,
    #[serde(default)]
    pub west: Vec<StandingRow>,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct PlayerLine {
    #[serde(deserialize_with = "de_id")]
    pub player_id: String,
    pub name: String,
    #[serde(default)]
    pub minutes: Option<String>,
    #[serde(default)]
    pub points: u32,
    #[serde(default)]
    pub rebounds: u32,
    #[serde(default)]
    pub assists: u32,
}

#[derive(Debug, Clone, PartialEq, Default, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct BoxScore {
    #[serde(default)]
    pub home: Vec<PlayerLine>,
    #[serde(default)]
    pub away: Vec<PlayerLine>,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct GameDetail {
    #[serde(flatten)]
    pub game: Game,
    #[serde(default)]
    pub box_score: Option<BoxScore>,
}

/// Generated recap for a finished game.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct GameSummary {
    #[serde(default, deserialize_with = "de_opt_id")]
    pub game_id: Option<String>,
    pub summary: String,
    #[serde(default)]
    pub generated_at: Option<String>,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct TeamOverview {
    #[serde(deserialize_with = "de_id")]
    pub id: String,
    pub name: String,
    #[serde(default)]
    pub abbreviation: String,
    #[serde(default)]
    pub city: Option<String>,
    #[serde(default)]
    pub conference: Option<String>,
    #[serde(default)]
    pub wins: u32,
    #[serde(default)]
    pub losses: u32,
    #[serde(default)]
    pub coach: Option<String>,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct StatLeader {
    #[serde(deserialize_with = "de_id")]
    pub player_id: String,
    pub name: String,
    #[serde(default)]
    pub team: Option<String>,
    #[serde(default)]
    pub stat: Option<String>,
    pub value: f64,
    #[serde(default)]
    pub rank: Option<u32>,
}

#[derive(Debug, Clone, PartialEq, Default, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct TeamLeaders {
    #[serde(default)]
    pub leaders: Vec<StatLeader>,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct ScheduleItem {
    #[serde(deserialize_with = "de_id")]
    pub game_id: String,
    pub date: String,
    pub opponent: String,
    #[serde(default)]
    pub home: bool,
    #[serde(default)]
    pub result: Option<String>,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct PlayerDetails {
    #[serde(deserialize_with = "de_id")]
    pub id: String,
    pub name: String,
    #[serde(default, deserialize_with = "de_opt_id")]
    pub team_id: Option<String>,
    #[serde(default)]
    pub team_name: Option<String>,
    #[serde(default)]
    pub position: Option<String>,
    #[serde(default, deserialize_with = "de_opt_id")]
    pub jersey: Option<String>,
    #[serde(default)]
    pub height: Option<String>,
    #[serde(default)]
    pub weight: Option<String>,
}

#[derive(Debug, Clone, PartialEq, Default, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct PlayerBio {
    #[serde(default)]
    pub bio: String,
    #[serde(default)]
    pub birth_date: Option<String>,
    #[serde(default)]
    pub country: Option<String>,
    #[serde(default)]
    pub college: Option<String>,
    #[serde(default)]
    pub draft: Option<String>,
}

#[derive(Debug, Clone, PartialEq, Default, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct SeasonStats {
    #[serde(default)]
    pub season: Option<String>,
    #[serde(default)]
    pub games_played: u32,
    #[serde(default)]
    pub minutes: Option<f64>,
    #[serde(default)]
    pub points: f64,
    #[serde(default)]
    pub rebounds: f64,
    #[serde(default)]
    pub assists: f64,
    #[serde(default)]
    pub steals: f64,
    #[serde(default)]
    pub blocks: f64,
    #[serde(default)]
    pub fg_pct: Option<f64>,
    #[serde(default)]
    pub three_pct: Option<f64>,
    #[serde(default)]
    pub ft_pct: Option<f64>,
}

#[derive(Debug, Clone, PartialEq, Default, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct RegularStats {
    #[serde(default)]
    pub seasons: Vec<SeasonStats>,
}

#[derive(Debug, Clone, PartialEq, Default, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct AdvancedStats {
    #[serde(default)]
    pub season: Option<String>,
    #[serde(default)]
    pub per: Option<f64>,
    #[serde(default)]
    pub true_shooting_pct: Option<f64>,
    #[serde(default)]
    pub usage_pct: Option<f64>,
    #[serde(default)]
    pub win_shares: Option<f64>,
    #[serde(default)]
    pub plus_minus: Option<f64>,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct GameLogRow {
    #[serde(deserialize_with = "de_id")]
    pub game_id: String,
    pub date: String,
    pub opponent: String,
    #[serde(default)]
    pub result: Option<String>,
    #[serde(default)]
    pub minutes: Option<String>,
    #[serde(default)]
    pub points: u32,
    #[serde(default)]
    pub rebounds: u32,
    #[serde(default)]
    pub assists: u32,
}

#[derive(Debug, Clone, PartialEq, Default, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct GameLog {
    #[serde(default)]
    pub games: Vec<GameLogRow>,
}

#[derive(Debug, Clone, PartialEq, Default, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct Leaderboard {
    #[serde(default)]
    pub stat: String,
    #[serde(default)]
    pub leaders: Vec<StatLeader>,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct NewsItem {
    #[serde(deserialize_with = "de_id")]
    pub id: String,
    pub title: String,
    #[serde(default)]
    pub summary: Option<String>,
    #[serde(default)]
    pub url: Option<String>,
    #[serde(default)]
    pub source: Option<String>,
    #[serde(default)]
    pub published_at: Option<String>,
    #[serde(default)]
    pub image_url: Option<String>,
}
