//! Runtime configuration loaded from environment variables.
//!
//! Every option has a default except `DATABASE_URL`. Values that are present
//! but unparsable are rejected rather than silently replaced, and the final
//! configuration is validated before anything is started.

use crate::error::IndexerError;
use std::fmt::Display;
use std::str::FromStr;
use std::time::Duration;
use url::Url;

pub const DEFAULT_FEED_URL: &str = "wss://pumpportal.fun/api/data";

/// Stream client settings.
#[derive(Debug, Clone)]
pub struct StreamConfig {
    pub ws_url: String,
    pub max_reconnect_attempts: u32,
    pub reconnect_base_delay: Duration,
    pub token_cache_size: usize,
    pub trade_cache_size: usize,
}

impl Default for StreamConfig {
    fn default() -> Self {
        Self {
            ws_url: DEFAULT_FEED_URL.to_string(),
            max_reconnect_attempts: 10,
            reconnect_base_delay: Duration::from_millis(1_000),
            token_cache_size: 1_000,
            trade_cache_size: 200,
        }
    }
}

/// Tick intervals for the periodic tasks. Each task runs on its own ticker.
#[derive(Debug, Clone)]
pub struct ScheduleConfig {
    pub price_interval: Duration,
    pub trading_interval: Duration,
    pub alert_interval: Duration,
    pub scoring_interval: Duration,
}

impl Default for ScheduleConfig {
    fn default() -> Self {
        Self {
            price_interval: Duration::from_secs(60),
            trading_interval: Duration::from_secs(60),
            alert_interval: Duration::from_secs(30),
            scoring_interval: Duration::from_secs(300),
        }
    }
}

/// Golden-dog rule thresholds. Defaults are deliberately low to favour recall.
#[derive(Debug, Clone)]
pub struct GoldenDogConfig {
    pub min_price_change: f64,
    pub min_volume_change: f64,
    pub min_liquidity: f64,
    pub min_score: u8,
    pub cooldown_minutes: i64,
}

impl Default for GoldenDogConfig {
    fn default() -> Self {
        Self {
            min_price_change: 10.0,
            min_volume_change: 50.0,
            min_liquidity: 5.0,
            min_score: 0,
            cooldown_minutes: 60,
        }
    }
}

#[derive(Debug, Clone)]
pub struct AppConfig {
    pub database_url: String,
    pub redis_url: Option<String>,
    pub broadcast_prefix: String,
    pub run_migrations: bool,
    pub stream: StreamConfig,
    pub schedule: ScheduleConfig,
    pub golden_dog: GoldenDogConfig,
    pub risk_cooldown_minutes: i64,
    pub price_history_limit: i64,
    pub token_inactive_hours: i64,
    pub liquidity_multiplier: f64,
    pub sentiment_api_url: Option<String>,
    pub kol_api_url: Option<String>,
}

impl AppConfig {
    /// Load configuration from the process environment.
    pub fn from_env() -> Result<Self, IndexerError> {
        Self::from_lookup(|key| std::env::var(key).ok())
    }

    /// Build configuration from an arbitrary key lookup, then validate it.
    pub fn from_lookup<F>(lookup: F) -> Result<Self, IndexerError>
    where
        F: Fn(&str) -> Option<String>,
    {
        let stream_defaults = StreamConfig::default();
        let schedule_defaults = ScheduleConfig::default();
        let dog_defaults = GoldenDogConfig::default();

        let database_url = lookup("DATABASE_URL")
            .filter(|v| !v.trim().is_empty())
            .ok_or_else(|| IndexerError::ConfigError("DATABASE_URL must be set".to_string()))?;

        let config = Self {
            database_url,
            redis_url: lookup("REDIS_URL").filter(|v| !v.trim().is_empty()),
            broadcast_prefix: lookup("BROADCAST_PREFIX").unwrap_or_else(|| "golden_dog".to_string()),
            run_migrations: parse_or(&lookup, "RUN_MIGRATIONS", true)?,
            stream: StreamConfig {
                ws_url: lookup("FEED_WS_URL").unwrap_or(stream_defaults.ws_url),
                max_reconnect_attempts: parse_or(
                    &lookup,
                    "MAX_RECONNECT_ATTEMPTS",
                    stream_defaults.max_reconnect_attempts,
                )?,
                reconnect_base_delay: Duration::from_millis(parse_or(
                    &lookup,
                    "RECONNECT_BASE_DELAY_MS",
                    stream_defaults.reconnect_base_delay.as_millis() as u64,
                )?),
                token_cache_size: parse_or(
                    &lookup,
                    "TOKEN_CACHE_SIZE",
                    stream_defaults.token_cache_size,
                )?,
                trade_cache_size: parse_or(
                    &lookup,
                    "TRADE_CACHE_SIZE",
                    stream_defaults.trade_cache_size,
                )?,
            },
            schedule: ScheduleConfig {
                price_interval: secs_or(
                    &lookup,
                    "PRICE_AGGREGATOR_INTERVAL_SECS",
                    schedule_defaults.price_interval,
                )?,
                trading_interval: secs_or(
                    &lookup,
                    "TRADING_AGGREGATOR_INTERVAL_SECS",
                    schedule_defaults.trading_interval,
                )?,
                alert_interval: secs_or(
                    &lookup,
                    "ALERT_ENGINE_INTERVAL_SECS",
                    schedule_defaults.alert_interval,
                )?,
                scoring_interval: secs_or(
                    &lookup,
                    "SCORING_ENGINE_INTERVAL_SECS",
                    schedule_defaults.scoring_interval,
                )?,
            },
            golden_dog: GoldenDogConfig {
                min_price_change: parse_or(
                    &lookup,
                    "GOLDEN_DOG_MIN_PRICE_CHANGE",
                    dog_defaults.min_price_change,
                )?,
                min_volume_change: parse_or(
                    &lookup,
                    "GOLDEN_DOG_MIN_VOLUME_CHANGE",
                    dog_defaults.min_volume_change,
                )?,
                min_liquidity: parse_or(
                    &lookup,
                    "GOLDEN_DOG_MIN_LIQUIDITY",
                    dog_defaults.min_liquidity,
                )?,
                min_score: parse_or(&lookup, "GOLDEN_DOG_MIN_SCORE", dog_defaults.min_score)?,
                cooldown_minutes: parse_or(
                    &lookup,
                    "GOLDEN_DOG_COOLDOWN_MINUTES",
                    dog_defaults.cooldown_minutes,
                )?,
            },
            risk_cooldown_minutes: parse_or(&lookup, "RISK_ALERT_COOLDOWN_MINUTES", 30)?,
            price_history_limit: parse_or(&lookup, "PRICE_HISTORY_LIMIT", 1_000)?,
            token_inactive_hours: parse_or(&lookup, "TOKEN_INACTIVE_HOURS", 24)?,
            liquidity_multiplier: parse_or(&lookup, "LIQUIDITY_MULTIPLIER", 10.0)?,
            sentiment_api_url: lookup("SENTIMENT_API_URL").filter(|v| !v.trim().is_empty()),
            kol_api_url: lookup("KOL_API_URL").filter(|v| !v.trim().is_empty()),
        };

        config.validate()?;
        Ok(config)
    }

    /// Validated at startup, so the fallback never applies to a loaded config.
    pub fn token_inactive_after(&self) -> chrono::Duration {
        chrono::Duration::try_hours(self.token_inactive_hours).unwrap_or(chrono::Duration::MAX)
    }

    pub fn validate(&self) -> Result<(), IndexerError> {
        let feed = Url::parse(&self.stream.ws_url)
            .map_err(|e| invalid(format!("FEED_WS_URL is not a valid URL: {e}")))?;
        if !matches!(feed.scheme(), "ws" | "wss") {
            return Err(invalid(format!(
                "FEED_WS_URL must use ws:// or wss://, got {}://",
                feed.scheme()
            )));
        }

        for (name, url) in [
            ("SENTIMENT_API_URL", &self.sentiment_api_url),
            ("KOL_API_URL", &self.kol_api_url),
        ] {
            if let Some(url) = url {
                Url::parse(url).map_err(|e| invalid(format!("{name} is not a valid URL: {e}")))?;
            }
        }

        if self.stream.max_reconnect_attempts == 0 {
            return Err(invalid("MAX_RECONNECT_ATTEMPTS must be greater than 0"));
        }
        if self.stream.reconnect_base_delay.is_zero() {
            return Err(invalid("RECONNECT_BASE_DELAY_MS must be greater than 0"));
        }
        if self.stream.token_cache_size == 0 || self.stream.trade_cache_size == 0 {
            return Err(invalid("cache sizes must be greater than 0"));
        }

        for (name, interval) in [
            ("PRICE_AGGREGATOR_INTERVAL_SECS", self.schedule.price_interval),
            ("TRADING_AGGREGATOR_INTERVAL_SECS", self.schedule.trading_interval),
            ("ALERT_ENGINE_INTERVAL_SECS", self.schedule.alert_interval),
            ("SCORING_ENGINE_INTERVAL_SECS", self.schedule.scoring_interval),
        ] {
            if interval.is_zero() {
                return Err(invalid(format!("{name} must be greater than 0")));
            }
        }

        let dog = &self.golden_dog;
        for (name, value) in [
            ("GOLDEN_DOG_MIN_PRICE_CHANGE", dog.min_price_change),
            ("GOLDEN_DOG_MIN_VOLUME_CHANGE", dog.min_volume_change),
            ("GOLDEN_DOG_MIN_LIQUIDITY", dog.min_liquidity),
            ("LIQUIDITY_MULTIPLIER", self.liquidity_multiplier),
        ] {
            if !value.is_finite() || value < 0.0 {
                return Err(invalid(format!(
                    "{name} must be a finite, non-negative number (got {value})"
                )));
            }
        }
        if dog.min_score > 100 {
            return Err(invalid("GOLDEN_DOG_MIN_SCORE must be between 0 and 100"));
        }
        for (name, minutes) in [
            ("GOLDEN_DOG_COOLDOWN_MINUTES", dog.cooldown_minutes),
            ("RISK_ALERT_COOLDOWN_MINUTES", self.risk_cooldown_minutes),
        ] {
            if minutes < 0 || chrono::Duration::try_minutes(minutes).is_none() {
                return Err(invalid(format!(
                    "{name} must be a non-negative, representable number of minutes (got {minutes})"
                )));
            }
        }
        if self.price_history_limit <= 0 {
            return Err(invalid("PRICE_HISTORY_LIMIT must be greater than 0"));
        }
        if self.token_inactive_hours <= 0 || chrono::Duration::try_hours(self.token_inactive_hours).is_none() {
            return Err(invalid(format!(
                "TOKEN_INACTIVE_HOURS must be a positive, representable number of hours (got {})",
                self.token_inactive_hours
            )));
        }

        Ok(())
    }
}

fn invalid(message: impl Into<String>) -> IndexerError {
    IndexerError::ConfigError(message.into())
}

fn parse_or<F, T>(lookup: &F, key: &str, default: T) -> Result<T, IndexerError>
where
    F: Fn(&str) -> Option<String>,
    T: FromStr,
    T::Err: Display,
{
    match lookup(key) {
        Some(raw) if !raw.trim().is_empty() => raw
            .trim()
            .parse()
            .map_err(|e| invalid(format!("{key}={raw:?} could not be parsed: {e}"))),
        _ => Ok(default),
    }
}

fn secs_or<F>(lookup: &F, key: &str, default: Duration) -> Result<Duration, IndexerError>
where
    F: Fn(&str) -> Option<String>,
{
    parse_or(lookup, key, default.as_secs()).map(Duration::from_secs)
}
