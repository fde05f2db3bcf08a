use anyhow::{anyhow, Context, Result};
use clap::{Parser, Subcommand};
use serde::Deserialize;
use std::path::{Path, PathBuf};
use std::time::Duration;

use crate::constants::{api, cache, retry};
use crate::net::RetryPolicy;
use crate::query_cache::QueryOptions;

/// courtside - basketball stats from the command line
///
/// Configuration priority: CLI args > Environment variables > Config file > Defaults
#[derive(Parser, Debug)]
#[command(name = "courtside")]
#[command(version = env!("CARGO_PKG_VERSION"))]
#[command(about = "Basketball scores, standings and player stats", long_about = None)]
pub struct CliArgs {
    /// Stats API origin (the api/v1/nba/ root is appended)
    #[arg(long, env = "COURTSIDE_API_URL", global = true)]
    pub api_url: Option<String>,

    /// TOML config file
    #[arg(long, env = "COURTSIDE_CONFIG", global = true)]
    pub config_file: Option<PathBuf>,

    /// How long a result is served from cache, in milliseconds (0-3600000)
    #[arg(long, env = "COURTSIDE_STALE_TIME_MS", global = true)]
    pub stale_time_ms: Option<u64>,

    /// Unused cache entries are dropped after this many milliseconds (1000-86400000)
    #[arg(long, env = "COURTSIDE_GC_TIME_MS", global = true)]
    pub gc_time_ms: Option<u64>,

    /// Retries after a failed request (0-10)
    #[arg(long, env = "COURTSIDE_MAX_RETRIES", global = true)]
    pub max_retries: Option<u32>,

    /// First retry delay in milliseconds; doubles per retry (1-60000)
    #[arg(long, env = "COURTSIDE_RETRY_BASE_MS", global = true)]
    pub retry_base_ms: Option<u64>,

    /// Cap on any retry delay in milliseconds (1-600000)
    #[arg(long, env = "COURTSIDE_RETRY_MAX_MS", global = true)]
    pub retry_max_ms: Option<u64>,

    /// HTTP request timeout in milliseconds (100-120000)
    #[arg(long, env = "COURTSIDE_HTTP_TIMEOUT_MS", global = true)]
    pub http_timeout_ms: Option<u64>,

    /// News items per page (1-100)
    #[arg(long, env = "COURTSIDE_NEWS_PAGE_SIZE", global = true)]
    pub news_page_size: Option<u32>,

    #[command(subcommand)]
    pub command: Command,
}

#[derive(Subcommand, Debug, Clone, PartialEq, Eq)]
pub enum Command {
    /// Scoreboard for a day (defaults to today at UTC+8)
    Scores {
        /// Calendar date, YYYY-MM-DD
        #[arg(long)]
        date: Option<String>,
    },
    /// Conference standings
    Standings,
    /// Game detail followed by its recap
    Game { id: String },
    /// Player profile with bio, stats and game log
    Player { id: String },
    /// Team overview, leaders, recent games and schedule
    Team {
        id: String,
        /// Schedule pages to load
        #[arg(long, default_value_t = 1)]
        pages: u32,
    },
    /// News feed
    News {
        /// Pages to load
        #[arg(long, default_value_t = 1)]
        pages: u32,
    },
    /// League leaders for one stat (pts, reb, ast, ...)
    Leaders { stat: String },
}

/// Config file layout:
///
/// ```toml
/// [api]
/// url = "https://stats.example.com"
/// timeout_ms = 10000
/// news_page_size = 20
///
/// [cache]
/// stale_time_ms = 5000
/// gc_time_ms = 300000
///
/// [retry]
/// max_retries = 3
/// base_ms = 1000
/// max_ms = 30000
/// ```
#[derive(Debug, Default, Deserialize)]
pub struct ConfigFile {
    #[serde(default)]
    pub api: ApiSection,
    #[serde(default)]
    pub cache: CacheSection,
    #[serde(default)]
    pub retry: RetrySection,
}

#[derive(Debug, Default, Deserialize)]
pub struct ApiSection {
    pub url: Option<String>,
    pub timeout_ms: Option<u64>,
    pub news_page_size: Option<u32>,
}

#[derive(Debug, Default, Deserialize)]
pub struct CacheSection {
    pub stale_time_ms: Option<u64>,
    pub gc_time_ms: Option<u64>,
}

#[derive(Debug, Default, Deserialize)]
pub struct RetrySection {
    pub max_retries: Option<u32>,
    pub base_ms: Option<u64>,
    pub max_ms: Option<u64>,
}

#[derive(Clone, Debug, PartialEq, Eq)]
pub struct Config {
    pub api_base_url: String,
    pub stale_time_ms: u64,
    pub gc_time_ms: u64,
    pub max_retries: u32,
    pub retry_base_ms: u64,
    pub retry_max_ms: u64,
    pub http_timeout_ms: u64,
    pub news_page_size: u32,
}

impl Default for Config {
    fn default() -> Self {
        Self {
            api_base_url: api::DEFAULT_BASE_URL.to_string(),
            stale_time_ms: cache::STALE_TIME.as_millis() as u64,
            gc_time_ms: cache::GC_TIME.as_millis() as u64,
            max_retries: retry::MAX_RETRIES,
            retry_base_ms: retry::BASE_DELAY_MS,
            retry_max_ms: retry::MAX_DELAY_MS,
            http_timeout_ms: api::DEFAULT_HTTP_TIMEOUT_MS,
            news_page_size: api::NEWS_PAGE_SIZE,
        }
    }
}

/// Validate that a value is within a given range (inclusive)
fn validate_in_range<T>(val: T, min: T, max: T, name: &str) -> Result<T>
where
    T: PartialOrd + std::fmt::Display + Copy,
{
    if val < min || val > max {
        Err(anyhow!("{name} must be in range [{min}, {max}], got {val}"))
    } else {
        Ok(val)
    }
}

/// Validate URL format
fn validate_url(url: &str, name: &str) -> Result<()> {
    if url.is_empty() {
        return Err(anyhow!("{name} cannot be empty"));
    }
    if !(url.starts_with("http://") || url.starts_with("https://")) {
        return Err(anyhow!("{name} must start with http:// or https://"));
    }
    url::Url::parse(url).with_context(|| format!("{name} is not a valid URL: {url}"))?;
    Ok(())
}

/// Load configuration from TOML file
fn load_from_file(path: &Path) -> Result<ConfigFile> {
    let contents = std::fs::read_to_string(path)
        .with_context(|| format!("Failed to read config file: {}", path.display()))?;
    toml::from_str(&contents)
        .with_context(|| format!("Failed to parse TOML config: {}", path.display()))
}

impl Config {
    /// Resolve parsed CLI args (env already folded in by clap) against the
    /// optional config file and defaults.
    pub fn from_args(args: &CliArgs) -> Result<Config> {
        let file = match args.config_file.as_deref() {
            Some(path) => {
                log::info!("[config] loading {}", path.display());
                load_from_file(path)?
            }
            None => ConfigFile::default(),
        };
        Self::resolve(args, file)
    }

    fn resolve(args: &CliArgs, file: ConfigFile) -> Result<Config> {
        let d = Config::default();

        let api_base_url = args
            .api_url
            .clone()
            .or(file.api.url)
            .unwrap_or(d.api_base_url);
        validate_url(&api_base_url, "COURTSIDE_API_URL")?;

        let stale_time_ms = args
            .stale_time_ms
            .or(file.cache.stale_time_ms)
            .unwrap_or(d.stale_time_ms);
        let stale_time_ms =
            validate_in_range(stale_time_ms, 0, 3_600_000, "COURTSIDE_STALE_TIME_MS")?;

        let gc_time_ms = args
            .gc_time_ms
            .or(file.cache.gc_time_ms)
            .unwrap_or(d.gc_time_ms);
        let gc_time_ms = validate_in_range(gc_time_ms, 1_000, 86_400_000, "COURTSIDE_GC_TIME_MS")?;

        let max_retries = args
            .max_retries
            .or(file.retry.max_retries)
            .unwrap_or(d.max_retries);
        let max_retries = validate_in_range(max_retries, 0, 10, "COURTSIDE_MAX_RETRIES")?;

        let retry_base_ms = args
            .retry_base_ms
            .or(file.retry.base_ms)
            .unwrap_or(d.retry_base_ms);
        let retry_base_ms = validate_in_range(retry_base_ms, 1, 60_000, "COURTSIDE_RETRY_BASE_MS")?;

        let retry_max_ms = args
            .retry_max_ms
            .or(file.retry.max_ms)
            .unwrap_or(d.retry_max_ms);
        let retry_max_ms =
            validate_in_range(retry_max_ms, retry_base_ms, 600_000, "COURTSIDE_RETRY_MAX_MS")?;

        let http_timeout_ms = args
            .http_timeout_ms
            .or(file.api.timeout_ms)
            .unwrap_or(d.http_timeout_ms);
        let http_timeout_ms =
            validate_in_range(http_timeout_ms, 100, 120_000, "COURTSIDE_HTTP_TIMEOUT_MS")?;

        let news_page_size = args
            .news_page_size
            .or(file.api.news_page_size)
            .unwrap_or(d.news_page_size);
        let news_page_size = validate_in_range(news_page_size, 1, 100, "COURTSIDE_NEWS_PAGE_SIZE")?;

        Ok(Config {
            api_base_url,
            stale_time_ms,
            gc_time_ms,
            max_retries,
            retry_base_ms,
            retry_max_ms,
            http_timeout_ms,
            news_page_size,
        })
    }

    pub fn retry_policy(&self) -> RetryPolicy {
        RetryPolicy {
            max_retries: self.max_retries,
            base_delay: Duration::from_millis(self.retry_base_ms),
            max_delay: Duration::from_millis(self.retry_max_ms),
        }
    }

    pub fn query_options(&self) -> QueryOptions {
        QueryOptions {
            stale_time: Duration::from_millis(self.stale_time_ms),
            retry: self.retry_policy(),
        }
    }

    pub fn gc_time(&self) -> Duration {
        Duration::from_millis(self.gc_time_ms)
    }

    pub fn http_timeout(&self) -> Duration {
        Duration::from_millis(self.http_timeout_ms)
    }

    pub fn print_summary(&self) {
        log::info!("courtside configuration:");
        log::info!("  API: {}", self.api_base_url);
        log::info!("  HTTP timeout: {}ms", self.http_timeout_ms);
        log::info!("  Stale time: {}ms", self.stale_time_ms);
        log::info!("  GC time: {}ms", self.gc_time_ms);
        log::info!(
            "  Retries: {} (base {}ms, max {}ms)",
            self.max_retries,
            self.retry_base_ms,
            self.retry_max_ms
        );
        log::info!("  News page size: {}", self.news_page_size);
    }
}
