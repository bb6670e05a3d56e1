//! Configuration for quote lookup and degradation behaviour

use crate::error::{Result, StockError};
use serde::{Deserialize, Serialize};
use std::str::FromStr;
use std::time::Duration;

/// Tunable knobs for the degradation pipeline and its caches
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct StockConfig {
    /// Maximum resident entries in the quote-info cache
    pub info_cache_capacity: usize,

    /// Maximum resident entries in the price-history cache
    pub history_cache_capacity: usize,

    /// Chance of serving fallback-table data without calling upstream
    pub fallback_shortcut_probability: f64,

    /// Pause between the first failed fetch and the single retry
    pub retry_delay: Duration,

    /// Lower bound of the random pause before each upstream call
    pub throttle_min: Duration,

    /// Upper bound of the random pause before each upstream call
    pub throttle_max: Duration,

    /// Requests per minute allowed against Yahoo Finance
    pub yahoo_rate_limit: u32,

    /// Request timeout duration
    pub request_timeout: Duration,

    /// Freshness window of the popular-stocks aggregate
    pub popular_window: Duration,

    /// Number of entries in the popular-stocks aggregate
    pub popular_limit: usize,

    /// Pause between tickers while warming the cache at start-up
    pub warmup_interval: Duration,
}

impl Default for StockConfig {
    fn default() -> Self {
        Self {
            info_cache_capacity: 100,
            history_cache_capacity: 50,
            fallback_shortcut_probability: 0.2,
            retry_delay: Duration::from_secs(5),
            throttle_min: Duration::from_secs(1),
            throttle_max: Duration::from_secs(3),
            yahoo_rate_limit: 30,
            request_timeout: Duration::from_secs(30),
            popular_window: Duration::from_secs(300), // 5 minutes
            popular_limit: 5,
            warmup_interval: Duration::from_secs(2),
        }
    }
}

impl StockConfig {
    /// Create a new configuration builder
    pub fn builder() -> StockConfigBuilder {
        StockConfigBuilder::default()
    }

    /// Configuration with every delay set to zero, for tests and tools
    pub fn without_delays() -> Self {
        Self {
            retry_delay: Duration::ZERO,
            throttle_min: Duration::ZERO,
            throttle_max: Duration::ZERO,
            warmup_interval: Duration::ZERO,
            ..Self::default()
        }
    }

    /// Override fields from process environment variables
    pub fn with_env(self) -> Result<Self> {
        self.with_lookup(|key| std::env::var(key).ok())
    }

    /// Override fields from an arbitrary key lookup
    ///
    /// Recognised keys: `FALLBACK_SHORTCUT_PROBABILITY`, `RETRY_DELAY_SECS`,
    /// `THROTTLE_MIN_MS`, `THROTTLE_MAX_MS`, `YAHOO_RATE_LIMIT`,
    /// `POPULAR_WINDOW_SECS`.
    pub fn with_lookup<F>(mut self, lookup: F) -> Result<Self>
    where
        F: Fn(&str) -> Option<String>,
    {
        if let Some(p) = parse_var::<f64, _>(&lookup, "FALLBACK_SHORTCUT_PROBABILITY")? {
            self.fallback_shortcut_probability = p;
        }
        if let Some(secs) = parse_var::<u64, _>(&lookup, "RETRY_DELAY_SECS")? {
            self.retry_delay = Duration::from_secs(secs);
        }
        if let Some(ms) = parse_var::<u64, _>(&lookup, "THROTTLE_MIN_MS")? {
            self.throttle_min = Duration::from_millis(ms);
        }
        if let Some(ms) = parse_var::<u64, _>(&lookup, "THROTTLE_MAX_MS")? {
            self.throttle_max = Duration::from_millis(ms);
        }
        if let Some(limit) = parse_var::<u32, _>(&lookup, "YAHOO_RATE_LIMIT")? {
            self.yahoo_rate_limit = limit;
        }
        if let Some(secs) = parse_var::<u64, _>(&lookup, "POPULAR_WINDOW_SECS")? {
            self.popular_window = Duration::from_secs(secs);
        }

        self.validate()?;
        Ok(self)
    }

    /// Validate the configuration
    pub fn validate(&self) -> Result<()> {
        if self.info_cache_capacity == 0 || self.history_cache_capacity == 0 {
            return Err(StockError::ConfigError(
                "cache capacities must be greater than 0".to_string(),
            ));
        }

        if !(0.0..=1.0).contains(&self.fallback_shortcut_probability) {
            return Err(StockError::ConfigError(format!(
                "fallback_shortcut_probability must be within [0, 1], got {}",
                self.fallback_shortcut_probability
            )));
        }

        if self.throttle_min > self.throttle_max {
            return Err(StockError::ConfigError(
                "throttle_min must not exceed throttle_max".to_string(),
            ));
        }

        if self.yahoo_rate_limit == 0 {
            return Err(StockError::ConfigError(
                "yahoo_rate_limit must be greater than 0".to_string(),
            ));
        }

        if self.popular_limit == 0 {
            return Err(StockError::ConfigError(
                "popular_limit must be greater than 0".to_string(),
            ));
        }

        Ok(())
    }
}

fn parse_var<T, F>(lookup: &F, key: &str) -> Result<Option<T>>
where
    T: FromStr,
    F: Fn(&str) -> Option<String>,
{
    lookup(key)
        .map(|raw| {
            raw.trim()
                .parse::<T>()
                .map_err(|_| StockError::ConfigError(format!("invalid value for {key}: {raw}")))
        })
        .transpose()
}

/// Builder for StockConfig
#[derive(Debug, Default)]
pub struct StockConfigBuilder {
    info_cache_capacity: Option<usize>,
    history_cache_capacity: Option<usize>,
    fallback_shortcut_probability: Option<f64>,
    retry_delay: Option<Duration>,
    throttle: Option<(Duration, Duration)>,
    yahoo_rate_limit: Option<u32>,
    request_timeout: Option<Duration>,
    popular_window: Option<Duration>,
    popular_limit: Option<usize>,
    warmup_interval: Option<Duration>,
}

impl StockConfigBuilder {
    /// Set quote-info cache capacity
    pub fn info_cache_capacity(mut self, capacity: usize) -> Self {
        self.info_cache_capacity = Some(capacity);
        self
    }

    /// Set price-history cache capacity
    pub fn history_cache_capacity(mut self, capacity: usize) -> Self {
        self.history_cache_capacity = Some(capacity);
        self
    }

    /// Set the fallback shortcut probability
    pub fn fallback_shortcut_probability(mut self, probability: f64) -> Self {
        self.fallback_shortcut_probability = Some(probability);
        self
    }

    /// Set the retry delay
    pub fn retry_delay(mut self, delay: Duration) -> Self {
        self.retry_delay = Some(delay);
        self
    }

    /// Set the random throttle range applied before upstream calls
    pub fn throttle(mut self, min: Duration, max: Duration) -> Self {
        self.throttle = Some((min, max));
        self
    }

    /// Set Yahoo Finance requests per minute
    pub fn yahoo_rate_limit(mut self, limit: u32) -> Self {
        self.yahoo_rate_limit = Some(limit);
        self
    }

    /// Set request timeout
    pub fn request_timeout(mut self, duration: Duration) -> Self {
        self.request_timeout = Some(duration);
        self
    }

    /// Set the popular-stocks freshness window
    pub fn popular_window(mut self, window: Duration) -> Self {
        self.popular_window = Some(window);
        self
    }

    /// Set the popular-stocks list length
    pub fn popular_limit(mut self, limit: usize) -> Self {
        self.popular_limit = Some(limit);
        self
    }

    /// Set the pause between warm-up fetches
    pub fn warmup_interval(mut self, interval: Duration) -> Self {
        self.warmup_interval = Some(interval);
        self
    }

    /// Build the configuration
    pub fn build(self) -> Result<StockConfig> {
        let defaults = StockConfig::default();
        let (throttle_min, throttle_max) = self
            .throttle
            .unwrap_or((defaults.throttle_min, defaults.throttle_max));

        let config = StockConfig {
            info_cache_capacity: self.info_cache_capacity.unwrap_or(defaults.info_cache_capacity),
            history_cache_capacity: self
                .history_cache_capacity
                .unwrap_or(defaults.history_cache_capacity),
            fallback_shortcut_probability: self
                .fallback_shortcut_probability
                .unwrap_or(defaults.fallback_shortcut_probability),
            retry_delay: self.retry_delay.unwrap_or(defaults.retry_delay),
            throttle_min,
            throttle_max,
            yahoo_rate_limit: self.yahoo_rate_limit.unwrap_or(defaults.yahoo_rate_limit),
            request_timeout: self.request_timeout.unwrap_or(defaults.request_timeout),
            popular_window: self.popular_window.unwrap_or(defaults.popular_window),
            popular_limit: self.popular_limit.unwrap_or(defaults.popular_limit),
            warmup_interval: self.warmup_interval.unwrap_or(defaults.warmup_interval),
        };

        config.validate()?;
        Ok(config)
    }
}
