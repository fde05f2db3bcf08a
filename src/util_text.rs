use serde::{Deserialize, Deserializer};

/// Format a win-loss record
/// Examples: "42-17", "0-0"
pub fn format_record(wins: u32, losses: u32) -> String {
    format!("{wins}-{losses}")
}

/// Format a fraction as a percentage with one decimal
/// Examples: "48.7%", "100.0%"
pub fn format_pct(ratio: f64) -> String {
    if !ratio.is_finite() {
        return "-".to_string();
    }
    format!("{:.1}%", ratio * 100.0)
}

/// Format a per-game average with one decimal
pub fn format_avg(value: f64) -> String {
    if !value.is_finite() {
        return "-".to_string();
    }
    format!("{value:.1}")
}

/// Winning percentage in the ".707" style used on standings tables.
pub fn format_win_pct(wins: u32, losses: u32) -> String {
    let games = wins + losses;
    if games == 0 {
        return ".000".to_string();
    }
    let pct = wins as f64 / games as f64;
    if wins == games {
        "1.000".to_string()
    } else {
        format!("{pct:.3}").trim_start_matches('0').to_string()
    }
}

/// Truncate to `max` chars, appending an ellipsis when shortened.
pub fn truncate(s: &str, max: usize) -> String {
    if s.chars().count() <= max {
        return s.to_string();
    }
    let keep: String = s.chars().take(max.saturating_sub(1)).collect();
    format!("{keep}…")
}

/// Ids arrive as JSON strings on some endpoints and numbers on others.
pub fn de_id<'de, D>(deserializer: D) -> Result<String, D::Error>
where
    D: Deserializer<'de>,
{
    #[derive(Deserialize)]
    #[serde(untagged)]
    enum Raw {
        Str(String),
        Int(i64),
    }
    Ok(match Raw::deserialize(deserializer)? {
        Raw::Str(s) => s,
        Raw::Int(n) => n.to_string(),
    })
}

/// Optional variant of [`de_id`].
pub fn de_opt_id<'de, D>(deserializer: D) -> Result<Option<String>, D::Error>
where
    D: Deserializer<'de>,
{
    #[derive(Deserialize)]
    #[serde(untagged)]
    enum Raw {
        Str(String),
        Int(i64),
    }
    Ok(Option::<Raw>::deserialize(deserializer)?.map(|raw| match raw {
        Raw::Str(s) => s,
        Raw::Int(n) => n.to_string(),
    }))
}
