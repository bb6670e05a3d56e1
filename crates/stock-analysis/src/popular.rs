//! Time-windowed most-searched list

use std::sync::Arc;
use std::time::{Duration, Instant};
use tokio::sync::RwLock;
use tracing::{debug, error, info};

use crate::config::StockConfig;
use crate::error::Result;
use crate::models::PopularStock;
use crate::store::StockStore;

/// Most-searched list plus whether it outlived its refresh window
#[derive(Debug, Clone, PartialEq)]
pub struct PopularOutcome {
    pub stocks: Vec<PopularStock>,
    pub stale: bool,
}

#[derive(Debug, Clone)]
struct Snapshot {
    stocks: Vec<PopularStock>,
    fetched_at: Instant,
}

/// Serves the top searched tickers, querying the store at most once per window
pub struct PopularityAggregator {
    store: Arc<dyn StockStore>,
    window: Duration,
    limit: usize,
    snapshot: RwLock<Option<Snapshot>>,
}

impl PopularityAggregator {
    pub fn new(store: Arc<dyn StockStore>, config: &StockConfig) -> Self {
        Self {
            store,
            window: config.popular_window,
            limit: config.popular_limit,
            snapshot: RwLock::new(None),
        }
    }

    /// Current most-searched list
    pub async fn popular(&self) -> Result<PopularOutcome> {
        self.popular_at(Instant::now()).await
    }

    /// Most-searched list as seen at `now`
    ///
    /// An empty snapshot counts as no snapshot. When the store fails, the
    /// last non-empty list is returned regardless of age, marked stale.
    pub async fn popular_at(&self, now: Instant) -> Result<PopularOutcome> {
        if let Some(stocks) = self.fresh(now).await {
            info!("Using cached popular stocks data");
            return Ok(PopularOutcome {
                stocks,
                stale: false,
            });
        }

        match self.store.top_searched(self.limit).await {
            Ok(stocks) => {
                debug!(count = stocks.len(), "Refreshed popular stocks");
                *self.snapshot.write().await = Some(Snapshot {
                    stocks: stocks.clone(),
                    fetched_at: now,
                });
                Ok(PopularOutcome {
                    stocks,
                    stale: false,
                })
            }
            Err(err) => {
                error!(error = %err, "Error fetching popular stocks");
                match self.previous().await {
                    Some(stocks) => {
                        info!("Using expired cache for popular stocks due to error");
                        Ok(PopularOutcome {
                            stocks,
                            stale: true,
                        })
                    }
                    None => Err(err),
                }
            }
        }
    }

    async fn fresh(&self, now: Instant) -> Option<Vec<PopularStock>> {
        let snapshot = self.snapshot.read().await;
        snapshot
            .as_ref()
            .filter(|s| !s.stocks.is_empty() && now.duration_since(s.fetched_at) < self.window)
            .map(|s| s.stocks.clone())
    }

    async fn previous(&self) -> Option<Vec<PopularStock>> {
        let snapshot = self.snapshot.read().await;
        snapshot
            .as_ref()
            .filter(|s| !s.stocks.is_empty())
            .map(|s| s.stocks.clone())
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::error::StockError;
    use crate::store::MockStockStore;

    fn stock(ticker: &str, count: i64) -> PopularStock {
        PopularStock {
            ticker: ticker.to_string(),
            name: format!("{ticker} Inc."),
            count,
        }
    }

    fn aggregator(store: MockStockStore) -> PopularityAggregator {
        PopularityAggregator::new(Arc::new(store), &StockConfig::default())
    }

    const AFTER_WINDOW: Duration = Duration::from_secs(301);

    #[tokio::test]
    async fn test_fresh_snapshot_skips_store() {
        let mut store = MockStockStore::new();
        store
            .expect_top_searched()
            .withf(|limit| *limit == 5)
            .times(1)
            .returning(|_| Ok(vec![stock("AAPL", 4), stock("MSFT", 2)]));

        let aggregator = aggregator(store);
        let now = Instant::now();
        let first = aggregator.popular_at(now).await.unwrap();
        let second = aggregator
            .popular_at(now + Duration::from_secs(299))
            .await
            .unwrap();

        assert_eq!(first, second);
        assert!(!second.stale);
    }

    #[tokio::test]
    async fn test_refresh_after_window() {
        let mut store = MockStockStore::new();
        let mut seq = mockall::Sequence::new();
        store
            .expect_top_searched()
            .times(1)
            .in_sequence(&mut seq)
            .returning(|_| Ok(vec![stock("AAPL", 1)]));
        store
            .expect_top_searched()
            .times(1)
            .in_sequence(&mut seq)
            .returning(|_| Ok(vec![stock("META", 3), stock("AAPL", 1)]));

        let aggregator = aggregator(store);
        let now = Instant::now();
        aggregator.popular_at(now).await.unwrap();
        let refreshed = aggregator.popular_at(now + AFTER_WINDOW).await.unwrap();

        assert_eq!(refreshed.stocks[0].ticker, "META");
        assert!(!refreshed.stale);
    }

    #[tokio::test]
    async fn test_stale_on_store_failure() {
        let mut store = MockStockStore::new();
        let mut seq = mockall::Sequence::new();
        store
            .expect_top_searched()
            .times(1)
            .in_sequence(&mut seq)
            .returning(|_| Ok(vec![stock("GOOGL", 7)]));
        store
            .expect_top_searched()
            .times(1)
            .in_sequence(&mut seq)
            .returning(|_| Err(StockError::PersistenceFailure("unable to open database".into())));

        let aggregator = aggregator(store);
        let now = Instant::now();
        aggregator.popular_at(now).await.unwrap();
        let stale = aggregator.popular_at(now + AFTER_WINDOW).await.unwrap();

        assert!(stale.stale);
        assert_eq!(stale.stocks, vec![stock("GOOGL", 7)]);
    }

    #[tokio::test]
    async fn test_failure_without_previous_value() {
        let mut store = MockStockStore::new();
        store
            .expect_top_searched()
            .returning(|_| Err(StockError::PersistenceFailure("unable to open database".into())));

        let aggregator = aggregator(store);
        assert!(matches!(
            aggregator.popular().await,
            Err(StockError::PersistenceFailure(_))
        ));
    }

    #[tokio::test]
    async fn test_empty_snapshot_counts_as_absent() {
        let mut store = MockStockStore::new();
        let mut seq = mockall::Sequence::new();
        store
            .expect_top_searched()
            .times(2)
            .in_sequence(&mut seq)
            .returning(|_| Ok(Vec::new()));
        store
            .expect_top_searched()
            .times(1)
            .in_sequence(&mut seq)
            .returning(|_| Err(StockError::PersistenceFailure("locked".into())));

        let aggregator = aggregator(store);
        let now = Instant::now();
        assert!(aggregator.popular_at(now).await.unwrap().stocks.is_empty());
        // Still inside the window, but an empty list is re-queried
        assert!(aggregator.popular_at(now).await.unwrap().stocks.is_empty());
        assert!(aggregator.popular_at(now).await.is_err());
    }
}
