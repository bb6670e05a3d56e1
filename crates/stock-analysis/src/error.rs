//! Error types for quote lookup, persistence and analysis

use thiserror::Error;

/// Stock service errors
#[derive(Debug, Error)]
pub enum StockError {
    /// The data provider failed, timed out or rate-limited us
    #[error("Upstream unavailable: {0}")]
    UpstreamUnavailable(String),

    /// The provider answered but a required field was missing or malformed
    #[error("Invalid data for {symbol}: {reason}")]
    DataShapeInvalid { symbol: String, reason: String },

    /// Ticker unknown upstream and absent from the fallback table
    #[error("Could not fetch data for {0}")]
    NotFound(String),

    /// Document store unreachable or query failed
    #[error("Persistence failure: {0}")]
    PersistenceFailure(String),

    /// Missing or malformed caller input
    #[error("{0}")]
    ValidationError(String),

    /// Synthetic data could not be produced
    #[error("Synthetic generation failed: {0}")]
    Generation(String),

    /// A prompt template failed to render
    #[error("Prompt rendering failed: {0}")]
    Prompt(String),

    /// Configuration error
    #[error("Configuration error: {0}")]
    ConfigError(String),

    /// Generic error
    #[error("{0}")]
    Other(String),
}

/// Result type alias for stock operations
pub type Result<T> = std::result::Result<T, StockError>;

impl StockError {
    /// Whether the degradation chain should absorb this error
    pub fn is_degradable(&self) -> bool {
        matches!(
            self,
            StockError::UpstreamUnavailable(_) | StockError::DataShapeInvalid { .. }
        )
    }
}

impl From<reqwest::Error> for StockError {
    fn from(err: reqwest::Error) -> Self {
        StockError::UpstreamUnavailable(err.to_string())
    }
}

impl From<yahoo_finance_api::YahooError> for StockError {
    fn from(err: yahoo_finance_api::YahooError) -> Self {
        StockError::UpstreamUnavailable(err.to_string())
    }
}

impl From<minijinja::Error> for StockError {
    fn from(err: minijinja::Error) -> Self {
        StockError::Prompt(err.to_string())
    }
}

impl From<sqlx::Error> for StockError {
    fn from(err: sqlx::Error) -> Self {
        StockError::PersistenceFailure(err.to_string())
    }
}
