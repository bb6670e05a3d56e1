//! Static quote table served when the upstream provider is unusable

use crate::models::QuoteInfo;

/// Hard-coded quote for a well-known ticker
#[derive(Debug, Clone, Copy, PartialEq)]
pub struct FallbackEntry {
    pub ticker: &'static str,
    pub name: &'static str,
    pub price: f64,
    pub change: f64,
}

impl FallbackEntry {
    /// Quote snapshot with name, price and change filled in
    pub fn quote(&self) -> QuoteInfo {
        QuoteInfo::partial(self.ticker, self.name, self.price, self.change)
    }
}

const FALLBACK_TABLE: [FallbackEntry; 5] = [
    FallbackEntry {
        ticker: "AAPL",
        name: "Apple Inc.",
        price: 173.31,
        change: 0.65,
    },
    FallbackEntry {
        ticker: "MSFT",
        name: "Microsoft Corporation",
        price: 417.12,
        change: 1.23,
    },
    FallbackEntry {
        ticker: "GOOGL",
        name: "Alphabet Inc.",
        price: 157.73,
        change: -0.42,
    },
    FallbackEntry {
        ticker: "AMZN",
        name: "Amazon.com, Inc.",
        price: 183.32,
        change: 0.87,
    },
    FallbackEntry {
        ticker: "META",
        name: "Meta Platforms, Inc.",
        price: 487.58,
        change: 1.05,
    },
];

/// Look up a normalized ticker
pub fn lookup(ticker: &str) -> Option<&'static FallbackEntry> {
    FALLBACK_TABLE.iter().find(|entry| entry.ticker == ticker)
}

/// Tickers covered by the table, in declaration order
pub fn tickers() -> impl Iterator<Item = &'static str> {
    FALLBACK_TABLE.iter().map(|entry| entry.ticker)
}
