//! Process-level configuration loaded from the environment

use serde::{Deserialize, Serialize};
use thiserror::Error;

const DEFAULT_BIND_ADDRESS: &str = "127.0.0.1:5000";
const DEFAULT_DATABASE_URL: &str = "sqlite://stock_analyzer.db";

/// Errors raised while reading configuration
#[derive(Debug, Error)]
pub enum ConfigError {
    /// A variable was set but could not be parsed
    #[error("invalid value for {key}: {value}")]
    InvalidValue { key: String, value: String },
}

/// Log output format
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum LogFormat {
    /// Human-readable lines
    #[default]
    Pretty,
    /// One JSON object per line
    Json,
}

/// Main configuration structure
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct AppConfig {
    /// Application name
    pub app_name: String,
    /// Environment (development, production, etc.)
    pub environment: String,
    /// Socket address the HTTP server binds to
    pub bind_address: String,
    /// Connection string for the document store
    pub database_url: String,
    /// Log output format
    pub log_format: LogFormat,
}

impl Default for AppConfig {
    fn default() -> Self {
        Self {
            app_name: "stock-analyzer".to_string(),
            environment: "development".to_string(),
            bind_address: DEFAULT_BIND_ADDRESS.to_string(),
            database_url: DEFAULT_DATABASE_URL.to_string(),
            log_format: LogFormat::Pretty,
        }
    }
}

impl AppConfig {
    /// Read configuration from process environment variables
    ///
    /// Recognised variables: `APP_ENV`, `BIND_ADDRESS`, `DATABASE_URL`
    /// and `LOG_FORMAT` (`pretty` or `json`).
    pub fn from_env() -> Result<Self, ConfigError> {
        Self::from_lookup(|key| std::env::var(key).ok())
    }

    /// Build configuration from an arbitrary key lookup
    pub fn from_lookup<F>(lookup: F) -> Result<Self, ConfigError>
    where
        F: Fn(&str) -> Option<String>,
    {
        let defaults = Self::default();

        let log_format = match lookup("LOG_FORMAT") {
            None => defaults.log_format,
            Some(value) if value.eq_ignore_ascii_case("json") => LogFormat::Json,
            Some(value) if value.eq_ignore_ascii_case("pretty") => LogFormat::Pretty,
            Some(value) => {
                return Err(ConfigError::InvalidValue {
                    key: "LOG_FORMAT".to_string(),
                    value,
                });
            }
        };

        Ok(Self {
            app_name: defaults.app_name,
            environment: lookup("APP_ENV").unwrap_or(defaults.environment),
            bind_address: lookup("BIND_ADDRESS").unwrap_or(defaults.bind_address),
            database_url: lookup("DATABASE_URL").unwrap_or(defaults.database_url),
            log_format,
        })
    }
}
