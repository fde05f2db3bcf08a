use std::fmt;

/// One primitive component of a `QueryKey`.
#[derive(Debug, Clone, PartialEq, Eq, Hash, PartialOrd, Ord)]
pub enum KeyPart {
    Str(String),
    Int(i64),
    Bool(bool),
}

impl fmt::Display for KeyPart {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            KeyPart::Str(s) => write!(f, "{s}"),
            KeyPart::Int(n) => write!(f, "{n}"),
            KeyPart::Bool(b) => write!(f, "{b}"),
        }
    }
}

impl From<&str> for KeyPart {
    fn from(s: &str) -> Self {
        KeyPart::Str(s.to_string())
    }
}

impl From<String> for KeyPart {
    fn from(s: String) -> Self {
        KeyPart::Str(s)
    }
}

impl From<&String> for KeyPart {
    fn from(s: &String) -> Self {
        KeyPart::Str(s.clone())
    }
}

impl From<i64> for KeyPart {
    fn from(n: i64) -> Self {
        KeyPart::Int(n)
    }
}

impl From<i32> for KeyPart {
    fn from(n: i32) -> Self {
        KeyPart::Int(n as i64)
    }
}

impl From<u32> for KeyPart {
    fn from(n: u32) -> Self {
        KeyPart::Int(n as i64)
    }
}

impl From<bool> for KeyPart {
    fn from(b: bool) -> Self {
        KeyPart::Bool(b)
    }
}

/// Identifies one cacheable request: resource name followed by parameters.
///
/// Equality and hashing are structural, so two screens that build
/// `QueryKey::new("gameDetail").with("401585")` share one cache entry.
#[derive(Debug, Clone, PartialEq, Eq, Hash, PartialOrd, Ord)]
pub struct QueryKey(Vec<KeyPart>);

impl QueryKey {
    pub fn new(resource: impl Into<String>) -> Self {
        QueryKey(vec![KeyPart::Str(resource.into())])
    }

    pub fn with(mut self, part: impl Into<KeyPart>) -> Self {
        self.0.push(part.into());
        self
    }

    pub fn resource(&self) -> &str {
        match self.0.first() {
            Some(KeyPart::Str(s)) => s,
            _ => "",
        }
    }

    pub fn parts(&self) -> &[KeyPart] {
        &self.0
    }

    /// True when `prefix`'s parts are a leading subsequence of this key's.
    pub fn starts_with(&self, prefix: &QueryKey) -> bool {
        self.0.starts_with(&prefix.0)
    }
}

impl fmt::Display for QueryKey {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        for (i, part) in self.0.iter().enumerate() {
            if i > 0 {
                f.write_str("/")?;
            }
            write!(f, "{part}")?;
        }
        Ok(())
    }
}

/// Keys for every resource family the app reads.
pub mod keys {
    use super::QueryKey;

    pub fn games_by_date(date_token: &str) -> QueryKey {
        QueryKey::new("games").with(date_token)
    }

    pub fn standings() -> QueryKey {
        QueryKey::new("standings")
    }

    pub fn game_detail(game_id: &str) -> QueryKey {
        QueryKey::new("gameDetail").with(game_id)
    }

    pub fn game_summary(game_id: &str) -> QueryKey {
        QueryKey::new("gameSummary").with(game_id)
    }

    pub fn team_overview(team_id: &str) -> QueryKey {
        QueryKey::new("teamOverview").with(team_id)
    }

    pub fn team_leaders(team_id: &str) -> QueryKey {
        QueryKey::new("teamLeaders").with(team_id)
    }

    pub fn team_recent_games(team_id: &str) -> QueryKey {
        QueryKey::new("teamRecentGames").with(team_id)
    }

    pub fn team_schedule(team_id: &str) -> QueryKey {
        QueryKey::new("teamSchedule").with(team_id)
    }

    pub fn player_details(player_id: &str) -> QueryKey {
        QueryKey::new("playerDetails").with(player_id)
    }

    pub fn player_bio(player_id: &str) -> QueryKey {
        QueryKey::new("playerBio").with(player_id)
    }

    pub fn player_current_stats(player_id: &str) -> QueryKey {
        QueryKey::new("playerCurrentStats").with(player_id)
    }

    pub fn player_regular_stats(player_id: &str) -> QueryKey {
        QueryKey::new("playerRegularStats").with(player_id)
    }

    pub fn player_advanced_stats(player_id: &str) -> QueryKey {
        QueryKey::new("playerAdvancedStats").with(player_id)
    }

    pub fn player_game_log(player_id: &str) -> QueryKey {
        QueryKey::new("playerGameLog").with(player_id)
    }

    pub fn leaders(stat: &str) -> QueryKey {
        QueryKey::new("leaders").with(stat)
    }

    pub fn news() -> QueryKey {
        QueryKey::new("news")
    }
}
