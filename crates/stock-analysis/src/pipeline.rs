//! Layered degradation for quote and history lookups
//!
//! Quote lookups walk: probabilistic shortcut, cached fetch, one delayed
//! retry, fallback table, NotFound. History lookups end in the synthetic
//! generator instead, so they only fail if generation itself fails.

use chrono::{NaiveDate, Utc};
use rand::Rng;
use std::future::Future;
use std::sync::Arc;
use std::time::Duration;
use tracing::{error, info, instrument, warn};

use crate::cache::QuoteCache;
use crate::config::StockConfig;
use crate::error::{Result, StockError};
use crate::fallback::{self, FallbackEntry};
use crate::models::{
    HistoryPeriod, HistoryPoint, InfoMap, QuoteInfo, display_name, normalize_ticker,
};
use crate::store::StockStore;
use crate::synthetic;

/// Interval used when the caller does not pick one
pub const DEFAULT_INTERVAL: &str = "1d";

/// Where a lookup's data came from
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum DataSource {
    /// Provider data, possibly served from the cache
    Live,
    /// Fallback table used without calling the provider
    Shortcut,
    /// Fallback table used after the provider failed
    Fallback,
    /// Generated series
    Synthetic,
}

impl DataSource {
    /// Explanation attached to degraded responses
    pub fn message(self) -> Option<&'static str> {
        match self {
            DataSource::Live => None,
            DataSource::Shortcut => Some("Using fallback data to reduce API load"),
            DataSource::Fallback => Some("Using fallback data due to API limitations"),
            DataSource::Synthetic => {
                Some("Using generated synthetic data due to API limitations")
            }
        }
    }
}

/// Lookup result tagged with its source
#[derive(Debug, Clone, PartialEq)]
pub struct Lookup<T> {
    pub data: T,
    pub source: DataSource,
}

impl<T> Lookup<T> {
    fn new(data: T, source: DataSource) -> Self {
        Self { data, source }
    }

    pub fn message(&self) -> Option<&'static str> {
        self.source.message()
    }
}

/// Progress of a single fetch-with-retry
#[derive(Debug)]
enum LookupState<T> {
    Trying,
    Retrying,
    /// Retry exhausted on a degradable error
    Degraded(StockError),
    /// An error the degradation chain must not absorb
    Failed(StockError),
    Done(T),
}

/// Quote and history lookups with graceful degradation
#[derive(Clone)]
pub struct DegradationPipeline {
    cache: QuoteCache,
    store: Arc<dyn StockStore>,
    shortcut_probability: f64,
    retry_delay: Duration,
    warmup_interval: Duration,
}

impl DegradationPipeline {
    pub fn new(cache: QuoteCache, store: Arc<dyn StockStore>, config: &StockConfig) -> Self {
        Self {
            cache,
            store,
            shortcut_probability: shortcut_probability(config.fallback_shortcut_probability),
            retry_delay: config.retry_delay,
            warmup_interval: config.warmup_interval,
        }
    }

    /// Shared quote cache
    pub fn cache(&self) -> &QuoteCache {
        &self.cache
    }

    /// Resolve a quote snapshot
    ///
    /// Fails with `ValidationError` for an empty ticker, `NotFound` when
    /// the provider is unusable and the ticker is not in the fallback
    /// table, or with any provider error that is not degradable.
    #[instrument(skip(self))]
    pub async fn quote(&self, raw_ticker: &str) -> Result<Lookup<QuoteInfo>> {
        let ticker = normalize_ticker(raw_ticker)?;
        let entry = fallback::lookup(&ticker);

        if let Some(entry) = entry.filter(|_| self.take_shortcut()) {
            info!("Serving fallback data for {ticker} to reduce API load");
            self.record_fallback(entry).await;
            return Ok(Lookup::new(entry.quote(), DataSource::Shortcut));
        }

        let outcome = self
            .fetch_with_retry(&ticker, || self.cache.info(&ticker))
            .await
            .and_then(|info| match display_name(&info) {
                Some(name) => Ok((name.to_string(), info)),
                None => Err(StockError::DataShapeInvalid {
                    symbol: ticker.clone(),
                    reason: "missing longName".to_string(),
                }),
            });

        match (outcome, entry) {
            (Err(err), _) if !err.is_degradable() => Err(err),
            (Ok((name, info)), _) => {
                self.record_search(&ticker, &name, &info).await;
                Ok(Lookup::new(
                    QuoteInfo::from_info(&ticker, &info),
                    DataSource::Live,
                ))
            }
            (Err(err), Some(entry)) => {
                warn!(error = %err, "Quote lookup failed for {ticker}, using fallback table");
                self.record_fallback(entry).await;
                Ok(Lookup::new(entry.quote(), DataSource::Fallback))
            }
            (Err(err), None) => {
                warn!(error = %err, "Quote lookup failed for {ticker}, no fallback available");
                Err(StockError::NotFound(ticker))
            }
        }
    }

    /// Resolve price history, ending on today's date when synthesized
    pub async fn history(
        &self,
        raw_ticker: &str,
        period: HistoryPeriod,
        interval: &str,
    ) -> Result<Lookup<Vec<HistoryPoint>>> {
        self.history_as_of(raw_ticker, period, interval, Utc::now().date_naive())
            .await
    }

    /// Resolve price history; synthetic series end on `today`
    #[instrument(skip(self))]
    pub async fn history_as_of(
        &self,
        raw_ticker: &str,
        period: HistoryPeriod,
        interval: &str,
        today: NaiveDate,
    ) -> Result<Lookup<Vec<HistoryPoint>>> {
        let ticker = normalize_ticker(raw_ticker)?;

        let outcome = self
            .fetch_with_retry(&ticker, || self.cache.history(&ticker, period, interval))
            .await
            .and_then(|series| {
                if series.is_empty() {
                    Err(StockError::DataShapeInvalid {
                        symbol: ticker.clone(),
                        reason: "empty history".to_string(),
                    })
                } else if !series.iter().all(HistoryPoint::is_finite) {
                    Err(StockError::DataShapeInvalid {
                        symbol: ticker.clone(),
                        reason: "non-finite prices".to_string(),
                    })
                } else {
                    Ok(series)
                }
            });

        match outcome {
            Ok(series) => Ok(Lookup::new(series, DataSource::Live)),
            Err(err) if !err.is_degradable() => Err(err),
            Err(err) => {
                warn!(error = %err, "History lookup failed for {ticker}, generating synthetic data");
                let series = synthetic::generate(&ticker, period, today)?;
                Ok(Lookup::new(series, DataSource::Synthetic))
            }
        }
    }

    /// Pre-fetch every fallback-table ticker into the cache
    ///
    /// Returns how many tickers were fetched successfully.
    pub async fn warm_cache(&self) -> usize {
        info!("Pre-fetching data for common stocks...");
        let mut warmed = 0;

        for (i, ticker) in fallback::tickers().enumerate() {
            if i > 0 && !self.warmup_interval.is_zero() {
                tokio::time::sleep(self.warmup_interval).await;
            }
            match self.cache.info(ticker).await {
                Ok(_) => {
                    info!("Pre-fetched data for {ticker}");
                    warmed += 1;
                }
                Err(err) => warn!(error = %err, "Could not pre-fetch {ticker}"),
            }
        }

        warmed
    }

    async fn fetch_with_retry<T, F, Fut>(&self, ticker: &str, fetch: F) -> Result<T>
    where
        F: Fn() -> Fut,
        Fut: Future<Output = Result<T>>,
    {
        let mut state = LookupState::Trying;
        loop {
            state = match state {
                LookupState::Trying => match fetch().await {
                    Ok(value) => LookupState::Done(value),
                    Err(err) if !err.is_degradable() => LookupState::Failed(err),
                    Err(err) => {
                        warn!(error = %err, "Upstream error for {ticker}, retrying in {:?}", self.retry_delay);
                        if !self.retry_delay.is_zero() {
                            tokio::time::sleep(self.retry_delay).await;
                        }
                        LookupState::Retrying
                    }
                },
                LookupState::Retrying => match fetch().await {
                    Ok(value) => LookupState::Done(value),
                    Err(err) if !err.is_degradable() => LookupState::Failed(err),
                    Err(err) => {
                        error!(error = %err, "Retry failed for {ticker}");
                        LookupState::Degraded(err)
                    }
                },
                LookupState::Degraded(err) | LookupState::Failed(err) => return Err(err),
                LookupState::Done(value) => return Ok(value),
            };
        }
    }

    fn take_shortcut(&self) -> bool {
        self.shortcut_probability > 0.0 && rand::thread_rng().gen_bool(self.shortcut_probability)
    }

    async fn record_fallback(&self, entry: &FallbackEntry) {
        let mut info = InfoMap::new();
        info.insert("longName".to_string(), entry.name.into());
        self.record_search(entry.ticker, entry.name, &info).await;
    }

    async fn record_search(&self, ticker: &str, name: &str, info: &InfoMap) {
        if let Err(err) = self.store.record_search(ticker, name, info).await {
            error!(error = %err, "Failed to record search for {ticker}");
        }
    }
}

/// Clamp the shortcut probability into `[0, 1]`; NaN disables the shortcut
fn shortcut_probability(configured: f64) -> f64 {
    if configured.is_nan() {
        warn!("Shortcut probability is NaN, disabling the shortcut");
        return 0.0;
    }
    if !(0.0..=1.0).contains(&configured) {
        warn!(configured, "Shortcut probability out of range, clamping");
    }
    configured.clamp(0.0, 1.0)
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::api::MockMarketDataProvider;
    use crate::models::FieldValue;
    use crate::store::MockStockStore;
    use serde_json::json;

    fn config(shortcut: f64) -> StockConfig {
        StockConfig {
            fallback_shortcut_probability: shortcut,
            ..StockConfig::without_delays()
        }
    }

    fn pipeline_with(
        provider: MockMarketDataProvider,
        store: MockStockStore,
        config: &StockConfig,
    ) -> DegradationPipeline {
        let cache = QuoteCache::new(Arc::new(provider), config);
        DegradationPipeline::new(cache, Arc::new(store), config)
    }

    fn failing_provider() -> MockMarketDataProvider {
        let mut provider = MockMarketDataProvider::new();
        provider
            .expect_fetch_info()
            .returning(|_| Err(StockError::UpstreamUnavailable("429 Too Many Requests".into())));
        provider
            .expect_fetch_history()
            .returning(|_, _, _| Err(StockError::UpstreamUnavailable("timeout".into())));
        provider
    }

    fn permissive_store() -> MockStockStore {
        let mut store = MockStockStore::new();
        store.expect_record_search().returning(|_, _, _| Ok(()));
        store
    }

    fn today() -> NaiveDate {
        NaiveDate::from_ymd_opt(2024, 6, 30).unwrap()
    }

    #[tokio::test]
    async fn test_fallback_for_every_table_ticker() {
        let pipeline = pipeline_with(failing_provider(), permissive_store(), &config(0.0));

        for ticker in fallback::tickers() {
            let entry = fallback::lookup(ticker).unwrap();
            let lookup = pipeline.quote(&ticker.to_lowercase()).await.unwrap();

            assert_eq!(lookup.source, DataSource::Fallback);
            assert_eq!(lookup.message(), Some("Using fallback data due to API limitations"));
            assert_eq!(lookup.data.ticker, ticker);
            assert_eq!(lookup.data.name, FieldValue::Text(entry.name.to_string()));
            assert_eq!(lookup.data.price, FieldValue::from(entry.price));
            assert_eq!(lookup.data.change, FieldValue::from(entry.change));
            assert_eq!(lookup.data.pe, FieldValue::NotAvailable);
        }
    }

    #[tokio::test]
    async fn test_retries_exactly_once() {
        let mut provider = MockMarketDataProvider::new();
        provider
            .expect_fetch_info()
            .times(2)
            .returning(|_| Err(StockError::UpstreamUnavailable("503".into())));

        let mut store = MockStockStore::new();
        store.expect_record_search().never();

        let pipeline = pipeline_with(provider, store, &config(0.0));
        let result = pipeline.quote("ZZZZ").await;
        assert!(matches!(result, Err(StockError::NotFound(t)) if t == "ZZZZ"));
    }

    #[tokio::test]
    async fn test_retry_recovers() {
        let mut provider = MockMarketDataProvider::new();
        let mut seq = mockall::Sequence::new();
        provider
            .expect_fetch_info()
            .times(1)
            .in_sequence(&mut seq)
            .returning(|_| Err(StockError::UpstreamUnavailable("reset".into())));
        provider
            .expect_fetch_info()
            .times(1)
            .in_sequence(&mut seq)
            .returning(|_| {
                let mut info = InfoMap::new();
                info.insert("longName".into(), json!("NVIDIA Corporation"));
                info.insert("currentPrice".into(), json!(120.5));
                Ok(info)
            });

        let mut store = MockStockStore::new();
        store
            .expect_record_search()
            .withf(|ticker, name, _| ticker == "NVDA" && name == "NVIDIA Corporation")
            .times(1)
            .returning(|_, _, _| Ok(()));

        let pipeline = pipeline_with(provider, store, &config(0.0));
        let lookup = pipeline.quote("nvda").await.unwrap();
        assert_eq!(lookup.source, DataSource::Live);
        assert_eq!(lookup.message(), None);
        assert_eq!(lookup.data.price, FieldValue::from(120.5));
    }

    #[tokio::test]
    async fn test_missing_long_name_degrades_without_retry() {
        let mut provider = MockMarketDataProvider::new();
        provider
            .expect_fetch_info()
            .times(2)
            .returning(|_| Ok(InfoMap::new()));

        let pipeline = pipeline_with(provider, permissive_store(), &config(0.0));
        let lookup = pipeline.quote("AMZN").await.unwrap();
        assert_eq!(lookup.source, DataSource::Fallback);

        let err = pipeline.quote("QQQQ").await.unwrap_err();
        assert_eq!(err.to_string(), "Could not fetch data for QQQQ");
    }

    #[tokio::test]
    async fn test_shortcut_skips_provider() {
        let mut provider = MockMarketDataProvider::new();
        provider.expect_fetch_info().never();

        let mut store = MockStockStore::new();
        store
            .expect_record_search()
            .withf(|ticker, name, info| {
                ticker == "META" && name == "Meta Platforms, Inc." && info.len() == 1
            })
            .times(1)
            .returning(|_, _, _| Ok(()));

        let pipeline = pipeline_with(provider, store, &config(1.0));
        let lookup = pipeline.quote("META").await.unwrap();
        assert_eq!(lookup.source, DataSource::Shortcut);
        assert_eq!(lookup.message(), Some("Using fallback data to reduce API load"));
    }

    #[tokio::test]
    async fn test_persistence_failure_is_swallowed() {
        let mut store = MockStockStore::new();
        store
            .expect_record_search()
            .returning(|_, _, _| Err(StockError::PersistenceFailure("database is locked".into())));

        let pipeline = pipeline_with(failing_provider(), store, &config(0.0));
        let lookup = pipeline.quote("AAPL").await.unwrap();
        assert_eq!(lookup.source, DataSource::Fallback);
    }

    #[tokio::test]
    async fn test_empty_ticker_is_rejected() {
        let mut provider = MockMarketDataProvider::new();
        provider.expect_fetch_info().never();
        provider.expect_fetch_history().never();
        let mut store = MockStockStore::new();
        store.expect_record_search().never();

        let pipeline = pipeline_with(provider, store, &config(0.0));
        assert!(matches!(
            pipeline.quote("  ").await,
            Err(StockError::ValidationError(_))
        ));
        assert!(matches!(
            pipeline.history("", HistoryPeriod::OneYear, DEFAULT_INTERVAL).await,
            Err(StockError::ValidationError(_))
        ));
    }

    #[tokio::test]
    async fn test_history_failure_goes_synthetic() {
        let pipeline = pipeline_with(failing_provider(), MockStockStore::new(), &config(0.0));

        let lookup = pipeline
            .history_as_of("GOOGL", HistoryPeriod::OneMonth, DEFAULT_INTERVAL, today())
            .await
            .unwrap();

        assert_eq!(lookup.source, DataSource::Synthetic);
        assert_eq!(
            lookup.message(),
            Some("Using generated synthetic data due to API limitations")
        );
        assert_eq!(
            lookup.data,
            synthetic::generate("GOOGL", HistoryPeriod::OneMonth, today()).unwrap()
        );
    }

    #[tokio::test]
    async fn test_empty_history_goes_synthetic() {
        let mut provider = MockMarketDataProvider::new();
        provider
            .expect_fetch_history()
            .times(1)
            .returning(|_, _, _| Ok(Vec::new()));

        let pipeline = pipeline_with(provider, MockStockStore::new(), &config(0.0));
        let lookup = pipeline
            .history_as_of("TSLA", HistoryPeriod::FiveYears, "1d", today())
            .await
            .unwrap();
        assert_eq!(lookup.source, DataSource::Synthetic);
        assert_eq!(lookup.data.len(), 1825);
    }

    #[tokio::test]
    async fn test_non_finite_history_goes_synthetic() {
        let mut provider = MockMarketDataProvider::new();
        provider.expect_fetch_history().returning(|_, _, _| {
            Ok(vec![HistoryPoint {
                date: NaiveDate::from_ymd_opt(2024, 6, 28).unwrap(),
                open: f64::NAN,
                high: 1.0,
                low: 1.0,
                close: 1.0,
                volume: 0,
            }])
        });

        let pipeline = pipeline_with(provider, MockStockStore::new(), &config(0.0));
        let lookup = pipeline
            .history_as_of("MSFT", HistoryPeriod::OneMonth, "1d", today())
            .await
            .unwrap();
        assert_eq!(lookup.source, DataSource::Synthetic);
    }

    #[tokio::test]
    async fn test_live_history_passes_through() {
        let bar = HistoryPoint {
            date: NaiveDate::from_ymd_opt(2024, 6, 28).unwrap(),
            open: 10.0,
            high: 11.0,
            low: 9.5,
            close: 10.5,
            volume: 1200,
        };
        let expected = vec![bar.clone()];

        let mut provider = MockMarketDataProvider::new();
        provider
            .expect_fetch_history()
            .withf(|ticker, period, interval| {
                ticker == "AAPL" && *period == HistoryPeriod::SixMonths && interval == "1wk"
            })
            .times(1)
            .returning(move |_, _, _| Ok(vec![bar.clone()]));

        let pipeline = pipeline_with(provider, MockStockStore::new(), &config(0.0));
        let lookup = pipeline
            .history("aapl", HistoryPeriod::SixMonths, "1wk")
            .await
            .unwrap();
        assert_eq!(lookup.source, DataSource::Live);
        assert_eq!(lookup.data, expected);
    }

    #[tokio::test]
    async fn test_warm_cache() {
        let mut provider = MockMarketDataProvider::new();
        provider.expect_fetch_info().times(5).returning(|ticker| {
            if ticker == "GOOGL" {
                return Err(StockError::UpstreamUnavailable("429".into()));
            }
            let mut info = InfoMap::new();
            info.insert("longName".into(), json!(ticker));
            Ok(info)
        });

        let pipeline = pipeline_with(provider, MockStockStore::new(), &config(0.0));
        assert_eq!(pipeline.warm_cache().await, 4);
        assert_eq!(pipeline.cache().sizes().await.0, 4);
    }

    #[tokio::test]
    async fn test_non_degradable_error_surfaces() {
        let mut provider = MockMarketDataProvider::new();
        provider
            .expect_fetch_info()
            .times(1)
            .returning(|_| Err(StockError::ConfigError("bad provider setup".into())));
        provider
            .expect_fetch_history()
            .times(1)
            .returning(|_, _, _| Err(StockError::Other("decoder bug".into())));

        let mut store = MockStockStore::new();
        store.expect_record_search().never();

        let pipeline = pipeline_with(provider, store, &config(0.0));
        // AAPL has a fallback entry, but only degradable errors reach it
        assert!(matches!(
            pipeline.quote("AAPL").await,
            Err(StockError::ConfigError(_))
        ));
        assert!(matches!(
            pipeline
                .history_as_of("AAPL", HistoryPeriod::OneMonth, "1d", today())
                .await,
            Err(StockError::Other(_))
        ));
    }

    #[tokio::test(start_paused = true)]
    async fn test_retry_waits_retry_delay() {
        let calls = Arc::new(std::sync::Mutex::new(Vec::new()));
        let seen = Arc::clone(&calls);

        let mut provider = MockMarketDataProvider::new();
        provider.expect_fetch_info().times(2).returning(move |_| {
            seen.lock().unwrap().push(tokio::time::Instant::now());
            Err(StockError::UpstreamUnavailable("503".into()))
        });

        let config = StockConfig {
            fallback_shortcut_probability: 0.0,
            retry_delay: Duration::from_secs(5),
            ..StockConfig::without_delays()
        };
        let pipeline = pipeline_with(provider, permissive_store(), &config);
        let lookup = pipeline.quote("MSFT").await.unwrap();
        assert_eq!(lookup.source, DataSource::Fallback);

        let calls = calls.lock().unwrap();
        assert_eq!(calls.len(), 2);
        assert!(calls[1] - calls[0] >= Duration::from_secs(5));
    }

    #[tokio::test]
    async fn test_out_of_range_probability_is_clamped() {
        let mut provider = MockMarketDataProvider::new();
        provider.expect_fetch_info().never();
        let pipeline = pipeline_with(provider, permissive_store(), &config(7.0));
        assert_eq!(pipeline.quote("AAPL").await.unwrap().source, DataSource::Shortcut);

        let pipeline = pipeline_with(failing_provider(), permissive_store(), &config(f64::NAN));
        assert_eq!(pipeline.quote("AAPL").await.unwrap().source, DataSource::Fallback);

        let pipeline = pipeline_with(failing_provider(), permissive_store(), &config(-0.5));
        assert_eq!(pipeline.quote("AAPL").await.unwrap().source, DataSource::Fallback);
    }
}
