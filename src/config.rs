use std::time::Duration;

use crate::error::{AppError, Result};

pub const ESPN_SCOREBOARD_URL: &str =
    "https://site.api.espn.com/apis/site/v2/sports/football/nfl/scoreboard";
pub const ESPN_SUMMARY_URL: &str =
    "https://site.api.espn.com/apis/site/v2/sports/football/nfl/summary";

/// Seconds between poll cycles while the feed is healthy.
pub const POLL_INTERVAL_SECS: u64 = 60;

/// Upper bound on every upstream HTTP call (seconds).
pub const REQUEST_TIMEOUT_SECS: u64 = 10;

/// Scheduling backoff after a failed discovery call.
pub const BACKOFF_INITIAL_SECS: f64 = 5.0;
pub const BACKOFF_MULTIPLIER: f64 = 2.0;
pub const BACKOFF_MAX_SECS: f64 = 300.0;

/// How many of the most recent plays end up in a record's `events`.
pub const MAX_RECENT_PLAYS: usize = 10;

/// Per-cycle fan-out limit for summary fetches.
pub const MAX_CONCURRENT_FETCHES: usize = 4;

/// Scoreboard `status.type.name` values that mark a game as live.
pub const LIVE_STATUSES: &[&str] = &[
    "STATUS_IN_PROGRESS",
    "STATUS_HALFTIME",
    "STATUS_END_PERIOD",
];

/// Box-score statistics copied into `TeamData::stats`. Anything else upstream is dropped.
pub const STAT_KEYS: &[&str] = &[
    "totalYards",
    "netPassingYards",
    "rushingYards",
    "turnovers",
    "fumblesLost",
    "interceptions",
    "firstDowns",
    "thirdDownEff",
    "fourthDownEff",
    "totalPenaltiesYards",
    "possessionTime",
    "completionAttempts",
    "sacksYardsLost",
    "rushingAttempts",
    "passingFirstDowns",
    "rushingFirstDowns",
    "totalDrives",
];

#[derive(Debug, Clone)]
pub struct Config {
    pub scoreboard_url: String,
    pub summary_url: String,
    pub log_level: String,
    /// Emit JSON log lines instead of the human-readable format (LOG_JSON)
    pub log_json: bool,
    pub db_path: String,
    pub api_port: u16,
    pub poll_interval: Duration,
    pub request_timeout: Duration,
    pub backoff: BackoffConfig,
    /// Scoreboard status names treated as live (LIVE_STATUSES, comma-separated)
    pub live_statuses: Vec<String>,
    /// Allow-listed box-score stat names (STAT_KEYS, comma-separated)
    pub stat_keys: Vec<String>,
    pub max_recent_plays: usize,
    pub max_concurrent_fetches: usize,
}

#[derive(Debug, Clone, Copy, PartialEq)]
pub struct BackoffConfig {
    pub initial: Duration,
    pub multiplier: f64,
    pub max: Duration,
}

impl Default for BackoffConfig {
    fn default() -> Self {
        Self {
            initial: Duration::from_secs_f64(BACKOFF_INITIAL_SECS),
            multiplier: BACKOFF_MULTIPLIER,
            max: Duration::from_secs_f64(BACKOFF_MAX_SECS),
        }
    }
}

impl Default for Config {
    fn default() -> Self {
        Self {
            scoreboard_url: ESPN_SCOREBOARD_URL.to_string(),
            summary_url: ESPN_SUMMARY_URL.to_string(),
            log_level: "info".to_string(),
            log_json: false,
            db_path: "live_games.db".to_string(),
            api_port: 8000,
            poll_interval: Duration::from_secs(POLL_INTERVAL_SECS),
            request_timeout: Duration::from_secs(REQUEST_TIMEOUT_SECS),
            backoff: BackoffConfig::default(),
            live_statuses: to_owned_list(LIVE_STATUSES),
            stat_keys: to_owned_list(STAT_KEYS),
            max_recent_plays: MAX_RECENT_PLAYS,
            max_concurrent_fetches: MAX_CONCURRENT_FETCHES,
        }
    }
}

impl Config {
    pub fn from_env() -> Result<Self> {
        Self::from_lookup(|key| std::env::var(key).ok())
    }

    /// Build from any key → value source. `from_env` passes the process environment.
    pub fn from_lookup(get: impl Fn(&str) -> Option<String>) -> Result<Self> {
        let defaults = Self::default();
        let backoff = BackoffConfig {
            initial: env_secs_f64(&get, "BACKOFF_INITIAL_SECONDS", BACKOFF_INITIAL_SECS)?,
            multiplier: env_parse(&get, "BACKOFF_MULTIPLIER", BACKOFF_MULTIPLIER)?,
            max: env_secs_f64(&get, "BACKOFF_MAX_SECONDS", BACKOFF_MAX_SECS)?,
        };
        if !(backoff.multiplier.is_finite() && backoff.multiplier >= 1.0) {
            return Err(AppError::Config(
                "BACKOFF_MULTIPLIER must be a finite number >= 1".to_string(),
            ));
        }

        let poll_interval_secs: u64 = env_parse(&get, "POLL_INTERVAL_SECONDS", POLL_INTERVAL_SECS)?;
        if poll_interval_secs == 0 {
            return Err(AppError::Config(
                "POLL_INTERVAL_SECONDS must be >= 1".to_string(),
            ));
        }

        Ok(Self {
            scoreboard_url: get("ESPN_SCOREBOARD_URL").unwrap_or(defaults.scoreboard_url),
            summary_url: get("ESPN_SUMMARY_URL").unwrap_or(defaults.summary_url),
            log_level: get("LOG_LEVEL").unwrap_or(defaults.log_level),
            log_json: get("LOG_JSON")
                .map(|v| v == "true" || v == "1")
                .unwrap_or(false),
            db_path: get("DB_PATH").unwrap_or(defaults.db_path),
            api_port: get("API_PORT")
                .unwrap_or_else(|| "8000".to_string())
                .parse::<u16>()
                .map_err(|_| AppError::Config("API_PORT must be a valid port number".to_string()))?,
            poll_interval: Duration::from_secs(poll_interval_secs),
            request_timeout: Duration::from_secs(env_parse(
                &get,
                "REQUEST_TIMEOUT_SECONDS",
                REQUEST_TIMEOUT_SECS,
            )?),
            backoff,
            live_statuses: env_list(&get, "LIVE_STATUSES").unwrap_or(defaults.live_statuses),
            stat_keys: env_list(&get, "STAT_KEYS").unwrap_or(defaults.stat_keys),
            max_recent_plays: env_parse(&get, "MAX_RECENT_PLAYS", MAX_RECENT_PLAYS)?,
            max_concurrent_fetches: env_parse(
                &get,
                "MAX_CONCURRENT_FETCHES",
                MAX_CONCURRENT_FETCHES,
            )?
            .max(1),
        })
    }
}

fn env_parse<T: std::str::FromStr>(
    get: &impl Fn(&str) -> Option<String>,
    key: &str,
    default: T,
) -> Result<T> {
    match get(key) {
        Some(raw) => raw
            .trim()
            .parse::<T>()
            .map_err(|_| AppError::Config(format!("{key} has an invalid value: {raw:?}"))),
        None => Ok(default),
    }
}

/// Fractional seconds; negative, NaN and overflowing values are config errors.
fn env_secs_f64(
    get: &impl Fn(&str) -> Option<String>,
    key: &str,
    default: f64,
) -> Result<Duration> {
    let secs: f64 = env_parse(get, key, default)?;
    Duration::try_from_secs_f64(secs).map_err(|e| AppError::Config(format!("{key}: {e}")))
}

/// Comma-separated list; `None` when unset or empty so the default applies.
fn env_list(get: &impl Fn(&str) -> Option<String>, key: &str) -> Option<Vec<String>> {
    let items: Vec<String> = get(key)?
        .split(',')
        .map(|s| s.trim().to_string())
        .filter(|s| !s.is_empty())
        .collect();
    if items.is_empty() {
        None
    } else {
        Some(items)
    }
}

fn to_owned_list(items: &[&str]) -> Vec<String> {
    items.iter().map(|s| s.to_string()).collect()
}
