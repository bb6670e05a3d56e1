//! Yahoo Finance API client

use async_trait::async_trait;
use chrono::DateTime;
use governor::clock::DefaultClock;
use governor::state::{InMemoryState, NotKeyed};
use governor::{Quota, RateLimiter};
use reqwest::{Client, Response, StatusCode};
use serde_json::Value;
use std::num::NonZeroU32;
use std::sync::Arc;
use tokio::sync::RwLock;
use tracing::{debug, instrument};
use yahoo_finance_api as yahoo;

use super::MarketDataProvider;
use crate::config::StockConfig;
use crate::error::{Result, StockError};
use crate::models::{HistoryPeriod, HistoryPoint, InfoMap};

const COOKIE_URL: &str = "https://fc.yahoo.com";
const CRUMB_URL: &str = "https://query1.finance.yahoo.com/v1/test/getcrumb";
const QUOTE_SUMMARY_URL: &str = "https://query2.finance.yahoo.com/v10/finance/quoteSummary";
const QUOTE_SUMMARY_MODULES: &str = "price,summaryDetail,defaultKeyStatistics,financialData";
const USER_AGENT: &str = "Mozilla/5.0 (X11; Linux x86_64) AppleWebKit/537.36 (KHTML, like Gecko)";

type SharedRateLimiter = Arc<RateLimiter<NotKeyed, InMemoryState, DefaultClock>>;

/// Where the session and quote requests go
#[derive(Debug, Clone)]
struct Endpoints {
    cookie: String,
    crumb: String,
    quote_summary: String,
}

impl Default for Endpoints {
    fn default() -> Self {
        Self {
            cookie: COOKIE_URL.to_string(),
            crumb: CRUMB_URL.to_string(),
            quote_summary: QUOTE_SUMMARY_URL.to_string(),
        }
    }
}

/// Yahoo Finance API client
///
/// Quote snapshots come from the `quoteSummary` endpoint, which needs a
/// session cookie plus the matching crumb; both are obtained on first use
/// and renewed once when Yahoo rejects them. Price history goes through
/// `yahoo_finance_api`. Both share one rate limiter.
#[derive(Clone)]
pub struct YahooFinanceClient {
    client: Client,
    connector: Arc<yahoo::YahooConnector>,
    rate_limiter: SharedRateLimiter,
    endpoints: Arc<Endpoints>,
    crumb: Arc<RwLock<Option<String>>>,
}

impl YahooFinanceClient {
    /// Create a client honouring the configured timeout and rate limit
    pub fn new(config: &StockConfig) -> Result<Self> {
        Self::with_endpoints(config, Endpoints::default())
    }

    fn with_endpoints(config: &StockConfig, endpoints: Endpoints) -> Result<Self> {
        let per_minute = NonZeroU32::new(config.yahoo_rate_limit).ok_or_else(|| {
            StockError::ConfigError("yahoo_rate_limit must be greater than 0".to_string())
        })?;

        let client = Client::builder()
            .timeout(config.request_timeout)
            .user_agent(USER_AGENT)
            .cookie_store(true)
            .build()?;

        let connector = yahoo::YahooConnector::new()?;

        Ok(Self {
            client,
            connector: Arc::new(connector),
            rate_limiter: Arc::new(RateLimiter::direct(Quota::per_minute(per_minute))),
            endpoints: Arc::new(endpoints),
            crumb: Arc::new(RwLock::new(None)),
        })
    }

    /// Crumb of the current session, starting one if needed
    async fn crumb(&self) -> Result<String> {
        if let Some(crumb) = self.crumb.read().await.as_ref() {
            return Ok(crumb.clone());
        }

        // Held across the handshake so concurrent callers share one session
        let mut slot = self.crumb.write().await;
        if let Some(crumb) = slot.as_ref() {
            return Ok(crumb.clone());
        }

        let crumb = self.start_session().await?;
        *slot = Some(crumb.clone());
        Ok(crumb)
    }

    async fn start_session(&self) -> Result<String> {
        // Answers 404, but sets the session cookie on the way
        if let Err(err) = self.client.get(&self.endpoints.cookie).send().await {
            debug!(error = %err, "Session cookie request failed");
        }

        let response = self.client.get(&self.endpoints.crumb).send().await?;
        if !response.status().is_success() {
            return Err(StockError::UpstreamUnavailable(format!(
                "crumb request returned {}",
                response.status()
            )));
        }

        let crumb = response.text().await?.trim().to_string();
        if crumb.is_empty() || crumb.contains('<') {
            return Err(StockError::UpstreamUnavailable(
                "Yahoo returned no session crumb".to_string(),
            ));
        }

        debug!("Started Yahoo session");
        Ok(crumb)
    }

    async fn request_quote_summary(&self, ticker: &str) -> Result<Response> {
        let crumb = self.crumb().await?;
        let response = self
            .client
            .get(format!("{}/{ticker}", self.endpoints.quote_summary))
            .query(&[("modules", QUOTE_SUMMARY_MODULES), ("crumb", crumb.as_str())])
            .send()
            .await?;
        Ok(response)
    }
}

#[async_trait]
impl MarketDataProvider for YahooFinanceClient {
    #[instrument(skip(self))]
    async fn fetch_info(&self, ticker: &str) -> Result<InfoMap> {
        self.rate_limiter.until_ready().await;

        let mut response = self.request_quote_summary(ticker).await?;
        if response.status() == StatusCode::UNAUTHORIZED {
            debug!("Crumb rejected, starting a new Yahoo session");
            self.crumb.write().await.take();
            response = self.request_quote_summary(ticker).await?;
        }

        // Yahoo answers 404 for symbols it does not know
        if response.status() == StatusCode::NOT_FOUND {
            debug!("quoteSummary has no entry for {ticker}");
            return Ok(InfoMap::new());
        }

        if !response.status().is_success() {
            return Err(StockError::UpstreamUnavailable(format!(
                "quoteSummary returned {} for {ticker}",
                response.status()
            )));
        }

        let body: Value = response.json().await?;
        Ok(flatten_quote_summary(&body))
    }

    #[instrument(skip(self))]
    async fn fetch_history(
        &self,
        ticker: &str,
        period: HistoryPeriod,
        interval: &str,
    ) -> Result<Vec<HistoryPoint>> {
        self.rate_limiter.until_ready().await;

        let response = self
            .connector
            .get_quote_range(ticker, interval, period.as_str())
            .await?;

        let quotes = response.quotes()?;

        quotes
            .iter()
            .map(|q| {
                let date = DateTime::from_timestamp(q.timestamp as i64, 0)
                    .ok_or_else(|| StockError::DataShapeInvalid {
                        symbol: ticker.to_string(),
                        reason: format!("unconvertible timestamp {}", q.timestamp),
                    })?
                    .date_naive();

                Ok(HistoryPoint {
                    date,
                    open: q.open,
                    high: q.high,
                    low: q.low,
                    close: q.close,
                    volume: q.volume,
                })
            })
            .collect()
    }
}

/// Merge every module of the first `quoteSummary` result into one map
///
/// Formatted numbers (`{"raw": .., "fmt": ..}`) keep their raw value,
/// plain scalars are copied, anything else is dropped.
fn flatten_quote_summary(body: &Value) -> InfoMap {
    let mut info = InfoMap::new();

    let Some(modules) = body
        .pointer("/quoteSummary/result/0")
        .and_then(Value::as_object)
    else {
        return info;
    };

    for module in modules.values().filter_map(Value::as_object) {
        for (key, value) in module {
            let flat = match value {
                Value::Object(formatted) => match formatted.get("raw") {
                    Some(raw) => raw.clone(),
                    None => continue,
                },
                Value::Number(_) | Value::String(_) | Value::Bool(_) => value.clone(),
                Value::Null | Value::Array(_) => continue,
            };
            info.entry(key.clone()).or_insert(flat);
        }
    }

    info
}
