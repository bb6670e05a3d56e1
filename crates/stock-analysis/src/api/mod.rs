//! Market data providers

pub mod yahoo;

use async_trait::async_trait;

use crate::error::Result;
use crate::models::{HistoryPeriod, HistoryPoint, InfoMap};

pub use yahoo::YahooFinanceClient;

/// Source of live quote snapshots and price history
#[cfg_attr(test, mockall::automock)]
#[async_trait]
pub trait MarketDataProvider: Send + Sync {
    /// Flattened quote snapshot; an unknown ticker yields an empty map
    async fn fetch_info(&self, ticker: &str) -> Result<InfoMap>;

    /// Daily (or `interval`) bars covering `period`, oldest first
    async fn fetch_history(
        &self,
        ticker: &str,
        period: HistoryPeriod,
        interval: &str,
    ) -> Result<Vec<HistoryPoint>>;
}
