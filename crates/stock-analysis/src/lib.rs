//! Stock data service core
//!
//! This crate resolves quotes and price history for US tickers while
//! keeping the caller served when the upstream provider is rate-limited
//! or down. It includes:
//!
//! - A memoizing quote cache with least-recently-used eviction
//! - A degradation pipeline: shortcut, retry, fallback table, synthetic data
//! - A deterministic synthetic history generator
//! - A time-windowed most-searched aggregate
//! - Narrative analysis with canned summaries when no narrator answers
//!
//! # Example
//!
//! ```rust,no_run
//! use stock_analysis::{
//!     DegradationPipeline, QuoteCache, SqliteStore, StockConfig, YahooFinanceClient,
//! };
//! use std::sync::Arc;
//!
//! # async fn run() -> stock_analysis::Result<()> {
//! let config = StockConfig::default().with_env()?;
//! let provider = Arc::new(YahooFinanceClient::new(&config)?);
//! let store = Arc::new(SqliteStore::connect("sqlite://stock_analyzer.db").await?);
//!
//! let cache = QuoteCache::new(provider, &config);
//! let pipeline = DegradationPipeline::new(cache, store, &config);
//!
//! let quote = pipeline.quote("aapl").await?;
//! println!("{:?} {:?}", quote.data.price, quote.message());
//! # Ok(())
//! # }
//! ```

pub mod analysis;
pub mod api;
pub mod cache;
pub mod config;
pub mod error;
pub mod fallback;
pub mod models;
pub mod pipeline;
pub mod popular;
pub mod prompts;
pub mod store;
pub mod synthetic;

pub use analysis::{AnalysisOrchestrator, AnalysisResult, PriceLevels};
pub use api::{MarketDataProvider, YahooFinanceClient};
pub use cache::QuoteCache;
pub use config::{StockConfig, StockConfigBuilder};
pub use error::{Result, StockError};
pub use models::{
    FieldValue, HistoryPeriod, HistoryPoint, InfoMap, NOT_AVAILABLE, PopularStock, QuoteInfo,
};
pub use pipeline::{DEFAULT_INTERVAL, DataSource, DegradationPipeline, Lookup};
pub use popular::{PopularOutcome, PopularityAggregator};
pub use store::{SqliteStore, StockStore};
