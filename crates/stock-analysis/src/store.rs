//! Search counters and analysis history
//!
//! Three operations matter: an upsert that bumps a ticker's search
//! count, an append-only insert of analyses, and a sorted, limited read
//! of the most searched tickers.

use async_trait::async_trait;
use chrono::Utc;
use sqlx::sqlite::{SqliteConnectOptions, SqlitePool, SqlitePoolOptions};
use std::str::FromStr;
use tracing::{debug, instrument};

use crate::error::{Result, StockError};
use crate::models::{AnalysisRecord, InfoMap, PopularStock};

const SCHEMA: &str = include_str!("../schema.sql");
const UNKNOWN_NAME: &str = "Unknown";

/// Persistence seam for the service
#[cfg_attr(test, mockall::automock)]
#[async_trait]
pub trait StockStore: Send + Sync {
    /// Insert or update the ticker's snapshot and increment its search count
    async fn record_search(&self, ticker: &str, name: &str, info: &InfoMap) -> Result<()>;

    /// Append an analysis
    async fn record_analysis(&self, record: &AnalysisRecord) -> Result<()>;

    /// Tickers ordered by search count, highest first
    async fn top_searched(&self, limit: usize) -> Result<Vec<PopularStock>>;
}

/// SQLite-backed store
#[derive(Clone)]
pub struct SqliteStore {
    pool: SqlitePool,
}

impl SqliteStore {
    /// Connect, creating the database file and schema when missing
    pub async fn connect(database_url: &str) -> Result<Self> {
        let options = SqliteConnectOptions::from_str(database_url)?.create_if_missing(true);

        // Each connection to an in-memory database sees its own copy,
        // so those get exactly one connection that is never recycled
        let pool = if database_url.contains(":memory:") {
            SqlitePoolOptions::new()
                .max_connections(1)
                .idle_timeout(None)
                .max_lifetime(None)
                .connect_with(options)
                .await?
        } else {
            SqlitePoolOptions::new()
                .max_connections(5)
                .connect_with(options)
                .await?
        };

        let store = Self { pool };
        store.init_schema().await?;
        Ok(store)
    }

    /// Fresh in-memory store
    pub async fn in_memory() -> Result<Self> {
        Self::connect("sqlite::memory:").await
    }

    async fn init_schema(&self) -> Result<()> {
        // Execute schema (split by statement since sqlx doesn't support multiple statements)
        for statement in SCHEMA.split(';') {
            let stmt = statement.trim();
            if !stmt.is_empty() {
                sqlx::query(stmt).execute(&self.pool).await?;
            }
        }
        Ok(())
    }

    /// Get the database pool
    pub fn pool(&self) -> &SqlitePool {
        &self.pool
    }
}

#[async_trait]
impl StockStore for SqliteStore {
    #[instrument(skip(self, info))]
    async fn record_search(&self, ticker: &str, name: &str, info: &InfoMap) -> Result<()> {
        let info_json = serde_json::to_string(info)
            .map_err(|e| StockError::PersistenceFailure(e.to_string()))?;

        sqlx::query(
            r"INSERT INTO stocks (ticker, name, info, search_count, updated_at)
              VALUES (?, ?, ?, 1, ?)
              ON CONFLICT(ticker) DO UPDATE SET
                  name = excluded.name,
                  info = excluded.info,
                  search_count = stocks.search_count + 1,
                  updated_at = excluded.updated_at",
        )
        .bind(ticker)
        .bind(name)
        .bind(info_json)
        .bind(Utc::now())
        .execute(&self.pool)
        .await?;

        debug!("Recorded search for {ticker}");
        Ok(())
    }

    #[instrument(skip(self, record), fields(ticker = %record.ticker))]
    async fn record_analysis(&self, record: &AnalysisRecord) -> Result<()> {
        sqlx::query(
            "INSERT INTO analyses (ticker, timestamp, analysis, current_price) VALUES (?, ?, ?, ?)",
        )
        .bind(&record.ticker)
        .bind(record.timestamp)
        .bind(&record.analysis)
        .bind(record.current_price)
        .execute(&self.pool)
        .await?;

        Ok(())
    }

    async fn top_searched(&self, limit: usize) -> Result<Vec<PopularStock>> {
        let rows: Vec<(String, Option<String>, i64)> = sqlx::query_as(
            "SELECT ticker, name, search_count FROM stocks
             ORDER BY search_count DESC, ticker ASC
             LIMIT ?",
        )
        .bind(limit as i64)
        .fetch_all(&self.pool)
        .await?;

        Ok(rows
            .into_iter()
            .map(|(ticker, name, count)| PopularStock {
                ticker,
                name: name.unwrap_or_else(|| UNKNOWN_NAME.to_string()),
                count,
            })
            .collect())
    }
}
