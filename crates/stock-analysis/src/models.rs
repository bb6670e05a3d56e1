//! Response and record types shared across the service

use chrono::{DateTime, NaiveDate, Utc};
use serde::{Deserialize, Serialize, Serializer};
use serde_json::Value;
use std::fmt;

use crate::error::{Result, StockError};

/// Sentinel written for every quote field the provider did not supply
pub const NOT_AVAILABLE: &str = "N/A";

/// Flattened provider payload, keyed the way Yahoo names its fields
/// (`longName`, `currentPrice`, `trailingPE`, ...)
pub type InfoMap = serde_json::Map<String, Value>;

/// Trim and upper-case a ticker, rejecting empty input
pub fn normalize_ticker(raw: &str) -> Result<String> {
    let ticker = raw.trim().to_uppercase();
    if ticker.is_empty() {
        return Err(StockError::ValidationError(
            "Ticker symbol is required".to_string(),
        ));
    }
    Ok(ticker)
}

/// A quote field: a real value or the "N/A" sentinel
///
/// Numbers keep the provider's representation, so integer fields such as
/// `marketCap` serialize without a fractional part.
#[derive(Debug, Clone, PartialEq)]
pub enum FieldValue {
    Number(serde_json::Number),
    Text(String),
    NotAvailable,
}

impl FieldValue {
    /// Convert a raw provider value; nulls and non-finite numbers become N/A
    pub fn from_json(value: Option<&Value>) -> Self {
        match value {
            Some(Value::Number(n)) if n.as_f64().is_some_and(f64::is_finite) => {
                FieldValue::Number(n.clone())
            }
            Some(Value::String(s)) if !s.is_empty() => FieldValue::Text(s.clone()),
            _ => FieldValue::NotAvailable,
        }
    }

    pub fn as_f64(&self) -> Option<f64> {
        match self {
            FieldValue::Number(n) => n.as_f64(),
            _ => None,
        }
    }

    /// Multiply a numeric field, leaving text and N/A untouched
    fn scaled(self, factor: f64) -> Self {
        match self.as_f64() {
            Some(value) => FieldValue::from(value * factor),
            None => self,
        }
    }
}

impl From<f64> for FieldValue {
    fn from(value: f64) -> Self {
        serde_json::Number::from_f64(value).map_or(FieldValue::NotAvailable, FieldValue::Number)
    }
}

impl From<&str> for FieldValue {
    fn from(value: &str) -> Self {
        FieldValue::Text(value.to_string())
    }
}

impl Serialize for FieldValue {
    fn serialize<S: Serializer>(&self, serializer: S) -> std::result::Result<S::Ok, S::Error> {
        match self {
            FieldValue::Number(n) => n.serialize(serializer),
            FieldValue::Text(s) => serializer.serialize_str(s),
            FieldValue::NotAvailable => serializer.serialize_str(NOT_AVAILABLE),
        }
    }
}

/// Quote snapshot returned by the stock-info endpoint
///
/// Every field is always present; unknown values serialize as `"N/A"`.
#[derive(Debug, Clone, PartialEq, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct QuoteInfo {
    pub ticker: String,
    pub name: FieldValue,
    pub price: FieldValue,
    pub change: FieldValue,
    pub market_cap: FieldValue,
    pub volume: FieldValue,
    pub average_volume: FieldValue,
    pub pe: FieldValue,
    pub eps: FieldValue,
    pub dividend: FieldValue,
    pub target_high: FieldValue,
    pub target_low: FieldValue,
    pub target_mean: FieldValue,
    pub recommendation: FieldValue,
}

impl QuoteInfo {
    /// Shape a live provider payload
    pub fn from_info(ticker: &str, info: &InfoMap) -> Self {
        let field = |key: &str| FieldValue::from_json(info.get(key));

        let price = match field("currentPrice") {
            FieldValue::NotAvailable => field("regularMarketPrice"),
            price => price,
        };

        // Yahoo reports yield and change as fractions; zero yield means "no dividend"
        let dividend = match field("dividendYield").as_f64() {
            Some(y) if y != 0.0 => FieldValue::from(y * 100.0),
            _ => FieldValue::NotAvailable,
        };
        let change = field("regularMarketChangePercent").scaled(100.0);

        Self {
            ticker: ticker.to_string(),
            name: field("longName"),
            price,
            change,
            market_cap: field("marketCap"),
            volume: field("volume"),
            average_volume: field("averageVolume"),
            pe: field("trailingPE"),
            eps: field("trailingEps"),
            dividend,
            target_high: field("targetHighPrice"),
            target_low: field("targetLowPrice"),
            target_mean: field("targetMeanPrice"),
            recommendation: field("recommendationKey"),
        }
    }

    /// Snapshot carrying only name, price and change
    pub fn partial(ticker: &str, name: &str, price: f64, change: f64) -> Self {
        Self {
            ticker: ticker.to_string(),
            name: name.into(),
            price: price.into(),
            change: change.into(),
            market_cap: FieldValue::NotAvailable,
            volume: FieldValue::NotAvailable,
            average_volume: FieldValue::NotAvailable,
            pe: FieldValue::NotAvailable,
            eps: FieldValue::NotAvailable,
            dividend: FieldValue::NotAvailable,
            target_high: FieldValue::NotAvailable,
            target_low: FieldValue::NotAvailable,
            target_mean: FieldValue::NotAvailable,
            recommendation: FieldValue::NotAvailable,
        }
    }
}

/// Display name from a provider payload, if usable
pub fn display_name(info: &InfoMap) -> Option<&str> {
    info.get("longName")
        .and_then(Value::as_str)
        .filter(|name| !name.trim().is_empty())
}

/// One daily OHLCV bar
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct HistoryPoint {
    pub date: NaiveDate,
    pub open: f64,
    pub high: f64,
    pub low: f64,
    pub close: f64,
    pub volume: u64,
}

impl HistoryPoint {
    /// All prices finite
    pub fn is_finite(&self) -> bool {
        [self.open, self.high, self.low, self.close]
            .iter()
            .all(|v| v.is_finite())
    }
}

/// Look-back window accepted by the history endpoint
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Default, Serialize, Deserialize)]
pub enum HistoryPeriod {
    #[serde(rename = "1mo")]
    OneMonth,
    #[serde(rename = "3mo")]
    ThreeMonths,
    #[serde(rename = "6mo")]
    SixMonths,
    #[default]
    #[serde(rename = "1y")]
    OneYear,
    #[serde(rename = "5y")]
    FiveYears,
}

impl HistoryPeriod {
    pub fn as_str(self) -> &'static str {
        match self {
            HistoryPeriod::OneMonth => "1mo",
            HistoryPeriod::ThreeMonths => "3mo",
            HistoryPeriod::SixMonths => "6mo",
            HistoryPeriod::OneYear => "1y",
            HistoryPeriod::FiveYears => "5y",
        }
    }

    /// Number of daily points generated for this window
    pub fn num_points(self) -> usize {
        match self {
            HistoryPeriod::OneMonth => 30,
            HistoryPeriod::ThreeMonths => 90,
            HistoryPeriod::SixMonths => 180,
            HistoryPeriod::OneYear => 365,
            HistoryPeriod::FiveYears => 365 * 5,
        }
    }

    /// Parse a query value; `None` for unrecognised input
    pub fn parse(raw: &str) -> Option<Self> {
        match raw.trim() {
            "1mo" => Some(HistoryPeriod::OneMonth),
            "3mo" => Some(HistoryPeriod::ThreeMonths),
            "6mo" => Some(HistoryPeriod::SixMonths),
            "1y" => Some(HistoryPeriod::OneYear),
            "5y" => Some(HistoryPeriod::FiveYears),
            _ => None,
        }
    }

    /// Parse a query value, falling back to the default window
    pub fn parse_or_default(raw: Option<&str>) -> Self {
        match raw {
            None => Self::default(),
            Some(value) => Self::parse(value).unwrap_or_else(|| {
                tracing::warn!(period = %value, "Unknown history period, using 1y");
                Self::default()
            }),
        }
    }
}

impl fmt::Display for HistoryPeriod {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

/// Entry of the most-searched list
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct PopularStock {
    pub ticker: String,
    pub name: String,
    pub count: i64,
}

/// Persisted narrative analysis
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct AnalysisRecord {
    pub ticker: String,
    pub timestamp: DateTime<Utc>,
    pub analysis: String,
    pub current_price: f64,
}
