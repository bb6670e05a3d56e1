//! Caching layer for provider calls

use cached::{Cached, SizedCache};
use rand::Rng;
use std::future::Future;
use std::hash::Hash;
use std::sync::Arc;
use std::time::Duration;
use tokio::sync::RwLock;
use tracing::{debug, warn};

use crate::api::MarketDataProvider;
use crate::config::StockConfig;
use crate::error::Result;
use crate::models::{HistoryPeriod, HistoryPoint, InfoMap};

/// Thread-safe bounded map with least-recently-used eviction
pub struct LruStore<K, V> {
    cache: Arc<RwLock<SizedCache<K, V>>>,
}

impl<K, V> LruStore<K, V>
where
    K: Hash + Eq + Clone + std::fmt::Debug,
    V: Clone,
{
    /// Create a store holding at most `capacity` entries
    pub fn new(capacity: usize) -> Self {
        Self {
            cache: Arc::new(RwLock::new(SizedCache::with_size(capacity))),
        }
    }

    /// Get a value, marking it most recently used
    pub async fn get(&self, key: &K) -> Option<V> {
        // SizedCache reorders on read, so even lookups need the write lock
        let mut cache = self.cache.write().await;
        cache.cache_get(key).cloned()
    }

    /// Insert a value, evicting the least recently used entry when full
    pub async fn insert(&self, key: K, value: V) {
        let mut cache = self.cache.write().await;
        let _ = cache.cache_set(key, value);
    }

    /// Get or fetch a value using the provided fetcher function
    ///
    /// Only successful fetches are stored; the lock is not held while the
    /// fetcher runs, so concurrent misses on one key may both fetch.
    pub async fn get_or_fetch<F, Fut, E>(&self, key: K, fetcher: F) -> std::result::Result<V, E>
    where
        F: FnOnce() -> Fut,
        Fut: Future<Output = std::result::Result<V, E>>,
    {
        if let Some(value) = self.get(&key).await {
            debug!("Cache hit for key: {:?}", key);
            return Ok(value);
        }

        debug!("Cache miss for key: {:?}", key);

        let value = fetcher().await?;
        self.insert(key, value.clone()).await;

        Ok(value)
    }

    /// Number of resident entries
    pub async fn size(&self) -> usize {
        let cache = self.cache.read().await;
        cache.cache_size()
    }
}

impl<K, V> Clone for LruStore<K, V> {
    fn clone(&self) -> Self {
        Self {
            cache: Arc::clone(&self.cache),
        }
    }
}

/// Cache key for history lookups
#[derive(Debug, Clone, PartialEq, Eq, Hash)]
pub struct HistoryKey {
    pub ticker: String,
    pub period: HistoryPeriod,
    pub interval: String,
}

/// Memoizing front for a [`MarketDataProvider`]
///
/// Entries never expire by age. Every provider call, whether from a miss
/// or a refresh, first waits a random throttle delay.
#[derive(Clone)]
pub struct QuoteCache {
    provider: Arc<dyn MarketDataProvider>,
    info: LruStore<String, InfoMap>,
    history: LruStore<HistoryKey, Vec<HistoryPoint>>,
    throttle: (Duration, Duration),
}

impl QuoteCache {
    pub fn new(provider: Arc<dyn MarketDataProvider>, config: &StockConfig) -> Self {
        let (min, max) = (config.throttle_min, config.throttle_max);
        if min > max {
            warn!(?min, ?max, "Throttle bounds inverted, swapping");
        }

        Self {
            provider,
            info: LruStore::new(config.info_cache_capacity),
            history: LruStore::new(config.history_cache_capacity),
            throttle: (min.min(max), min.max(max)),
        }
    }

    /// Quote snapshot for a normalized ticker
    pub async fn info(&self, ticker: &str) -> Result<InfoMap> {
        self.info
            .get_or_fetch(ticker.to_string(), || async {
                self.pause().await;
                self.provider.fetch_info(ticker).await
            })
            .await
    }

    /// Current quote snapshot, bypassing any cached entry
    ///
    /// A successful fetch replaces the cached entry.
    pub async fn refresh_info(&self, ticker: &str) -> Result<InfoMap> {
        self.pause().await;
        let info = self.provider.fetch_info(ticker).await?;
        self.info.insert(ticker.to_string(), info.clone()).await;
        Ok(info)
    }

    /// Price history for a normalized ticker
    pub async fn history(
        &self,
        ticker: &str,
        period: HistoryPeriod,
        interval: &str,
    ) -> Result<Vec<HistoryPoint>> {
        let key = HistoryKey {
            ticker: ticker.to_string(),
            period,
            interval: interval.to_string(),
        };

        self.history
            .get_or_fetch(key, || async {
                self.pause().await;
                self.provider.fetch_history(ticker, period, interval).await
            })
            .await
    }

    /// Number of resident (info, history) entries
    pub async fn sizes(&self) -> (usize, usize) {
        (self.info.size().await, self.history.size().await)
    }

    async fn pause(&self) {
        let (min, max) = self.throttle;
        if max.is_zero() {
            return;
        }
        let delay = {
            let mut rng = rand::thread_rng();
            Duration::from_millis(rng.gen_range(min.as_millis() as u64..=max.as_millis() as u64))
        };
        debug!("Throttling upstream call for {:?}", delay);
        tokio::time::sleep(delay).await;
    }
}
