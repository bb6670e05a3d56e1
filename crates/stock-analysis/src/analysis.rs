//! Narrative analysis of a single ticker
//!
//! Price levels are fetched fresh for every analysis (the quote cache
//! entry is replaced, never served), or taken from the fallback table
//! when the provider is unusable. The narrative comes from an
//! [`LLMProvider`] when one is configured and answers; otherwise a canned
//! summary chosen from the price levels is returned.

use chrono::Utc;
use serde::Serialize;
use serde_json::Value;
use std::sync::Arc;
use stock_llm::{CompletionRequest, LLMProvider, Message};
use tracing::{debug, error, info, instrument, warn};

use crate::cache::QuoteCache;
use crate::error::{Result, StockError};
use crate::fallback;
use crate::models::{AnalysisRecord, InfoMap, display_name, normalize_ticker};
use crate::prompts::{ANALYSIS_SYSTEM_PROMPT, Outlook, PromptVars, analysis_prompt, canned_analysis};
use crate::store::StockStore;

const DEFAULT_BASE_PRICE: f64 = 100.0;
const NARRATIVE_MAX_TOKENS: usize = 600;

/// Body of a successful analysis
#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct AnalysisResult {
    pub ticker: String,
    pub analysis: String,
}

/// Price and moving averages used to frame the analysis
#[derive(Debug, Clone, PartialEq)]
pub struct PriceLevels {
    pub name: String,
    pub price: f64,
    pub ma50: f64,
    pub ma200: f64,
}

impl PriceLevels {
    /// Levels from a live snapshot; `None` without a usable `longName`
    pub fn from_info(info: &InfoMap) -> Option<Self> {
        let number = |key: &str| info.get(key).and_then(Value::as_f64);

        Some(Self {
            name: display_name(info)?.to_string(),
            price: number("currentPrice")
                .or_else(|| number("regularMarketPrice"))
                .unwrap_or(0.0),
            ma50: number("fiftyDayAverage").unwrap_or(0.0),
            ma200: number("twoHundredDayAverage").unwrap_or(0.0),
        })
    }

    /// Estimated levels when no live data is available
    pub fn estimated(ticker: &str) -> Self {
        match fallback::lookup(ticker) {
            Some(entry) => Self {
                name: entry.name.to_string(),
                price: entry.price,
                ma50: entry.price * 0.95,
                ma200: entry.price * 0.90,
            },
            None => Self {
                name: ticker.to_string(),
                price: DEFAULT_BASE_PRICE,
                ma50: 95.0,
                ma200: 90.0,
            },
        }
    }

    pub fn outlook(&self) -> Outlook {
        Outlook::classify(self.price, self.ma50, self.ma200)
    }
}

/// Produces and records narrative analyses
pub struct AnalysisOrchestrator {
    cache: QuoteCache,
    store: Arc<dyn StockStore>,
    narrator: Option<Arc<dyn LLMProvider>>,
    model: String,
}

impl AnalysisOrchestrator {
    /// Create an orchestrator; without a narrator every analysis is canned
    pub fn new(
        cache: QuoteCache,
        store: Arc<dyn StockStore>,
        narrator: Option<Arc<dyn LLMProvider>>,
        model: impl Into<String>,
    ) -> Self {
        Self {
            cache,
            store,
            narrator,
            model: model.into(),
        }
    }

    /// Analyze one ticker
    ///
    /// Only an empty ticker fails; it is rejected before any provider
    /// or store call.
    #[instrument(skip(self))]
    pub async fn analyze(&self, raw_ticker: &str) -> Result<AnalysisResult> {
        let ticker = normalize_ticker(raw_ticker)?;
        info!("Analyzing stock {ticker}");

        let levels = self.levels(&ticker).await;
        let vars = PromptVars::new(&ticker, &levels.name, levels.price, levels.ma50, levels.ma200);

        let analysis = match self.narrate(&vars).await {
            Ok(text) => text,
            Err(err) => {
                warn!(error = %err, "Narrative unavailable for {ticker}, using canned analysis");
                canned_analysis(levels.outlook(), &vars)?
            }
        };

        let record = AnalysisRecord {
            ticker: ticker.clone(),
            timestamp: Utc::now(),
            analysis: analysis.clone(),
            current_price: levels.price,
        };
        if let Err(err) = self.store.record_analysis(&record).await {
            error!(error = %err, "Failed to store analysis for {ticker}");
        }

        Ok(AnalysisResult { ticker, analysis })
    }

    async fn levels(&self, ticker: &str) -> PriceLevels {
        match self.cache.refresh_info(ticker).await {
            Ok(info) => PriceLevels::from_info(&info).unwrap_or_else(|| {
                warn!("No valid data returned for {ticker}, estimating price levels");
                PriceLevels::estimated(ticker)
            }),
            Err(err) => {
                warn!(error = %err, "Error fetching stock data for analysis of {ticker}");
                PriceLevels::estimated(ticker)
            }
        }
    }

    async fn narrate(&self, vars: &PromptVars<'_>) -> Result<String> {
        let narrator = self
            .narrator
            .as_ref()
            .ok_or_else(|| StockError::Other("no narrative provider configured".to_string()))?;

        let request = CompletionRequest::builder(&self.model)
            .system(ANALYSIS_SYSTEM_PROMPT)
            .add_message(Message::user(analysis_prompt(vars)?))
            .max_tokens(NARRATIVE_MAX_TOKENS)
            .build();

        let response = narrator
            .complete(request)
            .await
            .map_err(|e| StockError::Other(format!("{} failed: {e}", narrator.name())))?;

        debug!(
            tokens = response.usage.total(),
            "{} produced the narrative",
            narrator.name()
        );
        if response.stop_reason.is_truncated() {
            warn!(
                stop_reason = ?response.stop_reason,
                "{} cut the narrative short",
                narrator.name()
            );
        }

        response
            .message
            .text()
            .map(str::to_string)
            .ok_or_else(|| StockError::Other(format!("{} returned no text", narrator.name())))
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::api::MockMarketDataProvider;
    use crate::config::StockConfig;
    use crate::store::MockStockStore;
    use async_trait::async_trait;
    use serde_json::json;
    use std::sync::Mutex;
    use stock_llm::{CompletionResponse, LLMError, StopReason, TokenUsage};

    struct ScriptedNarrator {
        reply: std::result::Result<String, ()>,
        prompts: Mutex<Vec<String>>,
    }

    impl ScriptedNarrator {
        fn replying(text: &str) -> Self {
            Self {
                reply: Ok(text.to_string()),
                prompts: Mutex::new(Vec::new()),
            }
        }

        fn failing() -> Self {
            Self {
                reply: Err(()),
                prompts: Mutex::new(Vec::new()),
            }
        }
    }

    #[async_trait]
    impl LLMProvider for ScriptedNarrator {
        async fn complete(&self, request: CompletionRequest) -> stock_llm::Result<CompletionResponse> {
            if let Some(message) = request.messages.first() {
                self.prompts.lock().unwrap().push(message.content.clone());
            }
            match &self.reply {
                Ok(text) => Ok(CompletionResponse {
                    message: Message::assistant(text.clone()),
                    stop_reason: StopReason::EndTurn,
                    usage: TokenUsage::default(),
                }),
                Err(()) => Err(LLMError::RateLimitExceeded("quota exhausted".to_string())),
            }
        }

        fn name(&self) -> &str {
            "scripted"
        }
    }

    fn provider_with_levels(price: f64, ma50: f64, ma200: f64) -> MockMarketDataProvider {
        let mut provider = MockMarketDataProvider::new();
        provider.expect_fetch_info().returning(move |ticker| {
            let value = json!({
                "longName": format!("{ticker} Holdings"),
                "currentPrice": price,
                "fiftyDayAverage": ma50,
                "twoHundredDayAverage": ma200
            });
            match value {
                Value::Object(map) => Ok(map),
                _ => unreachable!(),
            }
        });
        provider
    }

    fn recording_store() -> MockStockStore {
        let mut store = MockStockStore::new();
        store.expect_record_analysis().times(1).returning(|_| Ok(()));
        store
    }

    fn orchestrator(
        provider: MockMarketDataProvider,
        store: MockStockStore,
        narrator: Option<Arc<dyn LLMProvider>>,
    ) -> AnalysisOrchestrator {
        let config = StockConfig::without_delays();
        let cache = QuoteCache::new(Arc::new(provider), &config);
        AnalysisOrchestrator::new(cache, Arc::new(store), narrator, "gemini-pro")
    }

    #[tokio::test]
    async fn test_template_selection() {
        for (levels, expected) in [
            ((110.0, 105.0, 100.0), "Recommendation: Buy"),
            ((95.0, 100.0, 90.0), "Recommendation: Hold"),
            ((80.0, 100.0, 90.0), "Recommendation: Sell/Avoid"),
        ] {
            let (price, ma50, ma200) = levels;
            let orchestrator =
                orchestrator(provider_with_levels(price, ma50, ma200), recording_store(), None);

            let result = orchestrator.analyze("tsla").await.unwrap();
            assert_eq!(result.ticker, "TSLA");
            assert!(result.analysis.contains(expected), "{levels:?}");
        }
    }

    #[tokio::test]
    async fn test_narrative_used_when_available() {
        let narrator = Arc::new(ScriptedNarrator::replying("TSLA trades above both averages."));
        let orchestrator = orchestrator(
            provider_with_levels(110.0, 105.0, 100.0),
            recording_store(),
            Some(narrator.clone() as Arc<dyn LLMProvider>),
        );

        let result = orchestrator.analyze("TSLA").await.unwrap();
        assert_eq!(result.analysis, "TSLA trades above both averages.");

        let prompts = narrator.prompts.lock().unwrap();
        assert_eq!(prompts.len(), 1);
        assert!(prompts[0].contains("Analyze the stock TSLA (TSLA Holdings)"));
        assert!(prompts[0].contains("Current Price: $110.00"));
    }

    #[tokio::test]
    async fn test_failing_narrator_falls_back_to_template() {
        let orchestrator = orchestrator(
            provider_with_levels(95.0, 100.0, 90.0),
            recording_store(),
            Some(Arc::new(ScriptedNarrator::failing())),
        );

        let result = orchestrator.analyze("NFLX").await.unwrap();
        assert!(result.analysis.contains("Recommendation: Hold"));
        assert!(result.analysis.contains("AI analysis service is currently unavailable"));
    }

    #[tokio::test]
    async fn test_fetch_error_uses_estimated_levels() {
        let mut provider = MockMarketDataProvider::new();
        provider
            .expect_fetch_info()
            .returning(|_| Err(StockError::UpstreamUnavailable("429".into())));

        let mut store = MockStockStore::new();
        store
            .expect_record_analysis()
            .withf(|record| record.ticker == "AAPL" && (record.current_price - 173.31).abs() < 1e-9)
            .times(1)
            .returning(|_| Ok(()));

        let orchestrator = orchestrator(provider, store, None);
        let result = orchestrator.analyze("AAPL").await.unwrap();
        // 0.95 and 0.90 of the table price put AAPL in a bullish trend
        assert!(result.analysis.contains("Recommendation: Buy"));
        assert!(result.analysis.contains("($173.31)"));
    }

    #[tokio::test]
    async fn test_unknown_ticker_estimates() {
        let levels = PriceLevels::estimated("ZZZZ");
        assert_eq!(levels.name, "ZZZZ");
        assert_eq!((levels.price, levels.ma50, levels.ma200), (100.0, 95.0, 90.0));
        assert_eq!(levels.outlook(), Outlook::Bullish);
    }

    #[test]
    fn test_levels_from_info() {
        let info = match json!({"longName": "Alphabet Inc.", "regularMarketPrice": 150.0}) {
            Value::Object(map) => map,
            _ => unreachable!(),
        };
        let levels = PriceLevels::from_info(&info).unwrap();
        assert_eq!(levels.price, 150.0);
        assert_eq!(levels.ma50, 0.0);

        assert!(PriceLevels::from_info(&InfoMap::new()).is_none());
    }

    #[tokio::test]
    async fn test_persistence_failure_is_swallowed() {
        let mut store = MockStockStore::new();
        store
            .expect_record_analysis()
            .returning(|_| Err(StockError::PersistenceFailure("disk full".into())));

        let orchestrator = orchestrator(provider_with_levels(1.0, 2.0, 3.0), store, None);
        assert!(orchestrator.analyze("AMD").await.is_ok());
    }

    #[tokio::test]
    async fn test_empty_ticker_touches_nothing() {
        let mut provider = MockMarketDataProvider::new();
        provider.expect_fetch_info().never();
        let mut store = MockStockStore::new();
        store.expect_record_analysis().never();
        store.expect_record_search().never();

        let orchestrator = orchestrator(provider, store, None);
        let err = orchestrator.analyze("   ").await.unwrap_err();
        assert!(matches!(err, StockError::ValidationError(_)));
        assert_eq!(err.to_string(), "Ticker symbol is required");
    }

    #[tokio::test]
    async fn test_each_analysis_sees_current_levels() {
        let mut provider = MockMarketDataProvider::new();
        let mut seq = mockall::Sequence::new();
        for (price, ma50, ma200) in [(110.0, 105.0, 100.0), (80.0, 100.0, 90.0)] {
            provider
                .expect_fetch_info()
                .times(1)
                .in_sequence(&mut seq)
                .returning(move |_| {
                    let value = json!({
                        "longName": "Tesla, Inc.",
                        "currentPrice": price,
                        "fiftyDayAverage": ma50,
                        "twoHundredDayAverage": ma200
                    });
                    Ok(serde_json::from_value(value).unwrap())
                });
        }

        let mut store = MockStockStore::new();
        store.expect_record_analysis().times(2).returning(|_| Ok(()));

        let orchestrator = orchestrator(provider, store, None);
        let first = orchestrator.analyze("TSLA").await.unwrap();
        let second = orchestrator.analyze("TSLA").await.unwrap();

        assert!(first.analysis.contains("Recommendation: Buy"));
        assert!(second.analysis.contains("Recommendation: Sell/Avoid"));
    }
}
