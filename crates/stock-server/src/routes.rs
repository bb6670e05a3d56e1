//! HTTP handlers

use axum::{
    Json, Router,
    extract::{Path, Query, State, rejection::JsonRejection},
    routing::{get, post},
};
use serde::Deserialize;
use stock_analysis::{
    AnalysisResult, DEFAULT_INTERVAL, HistoryPeriod, HistoryPoint, PopularStock, QuoteInfo,
};

use crate::AppState;
use crate::response::{ApiResponse, AppError};

pub fn stock_routes() -> Router<AppState> {
    Router::new()
        .route("/api/stock-info/:ticker", get(stock_info))
        .route("/api/stock-history/:ticker", get(stock_history))
        .route("/api/analyze", post(analyze))
        .route("/api/popular-stocks", get(popular_stocks))
}

async fn stock_info(
    State(state): State<AppState>,
    Path(ticker): Path<String>,
) -> Result<Json<ApiResponse<QuoteInfo>>, AppError> {
    let lookup = state.pipeline.quote(&ticker).await?;
    let message = lookup.message();

    Ok(Json(ApiResponse::ok(lookup.data).with_message(message)))
}

#[derive(Debug, Deserialize)]
struct HistoryQuery {
    period: Option<String>,
    interval: Option<String>,
}

async fn stock_history(
    State(state): State<AppState>,
    Path(ticker): Path<String>,
    Query(query): Query<HistoryQuery>,
) -> Result<Json<ApiResponse<Vec<HistoryPoint>>>, AppError> {
    let period = HistoryPeriod::parse_or_default(query.period.as_deref());
    let interval = query
        .interval
        .as_deref()
        .map(str::trim)
        .filter(|i| !i.is_empty())
        .unwrap_or(DEFAULT_INTERVAL);

    let lookup = state.pipeline.history(&ticker, period, interval).await?;
    let message = lookup.message();

    Ok(Json(ApiResponse::ok(lookup.data).with_message(message)))
}

#[derive(Debug, Deserialize)]
struct AnalyzeRequest {
    #[serde(default)]
    ticker: Option<String>,
}

async fn analyze(
    State(state): State<AppState>,
    payload: Result<Json<AnalyzeRequest>, JsonRejection>,
) -> Result<Json<ApiResponse<AnalysisResult>>, AppError> {
    let Json(request) = payload.map_err(|rejection| {
        AppError::bad_request(format!("Invalid request body: {}", rejection.body_text()))
    })?;

    let result = state
        .analysis
        .analyze(request.ticker.as_deref().unwrap_or_default())
        .await?;

    Ok(Json(ApiResponse::ok(result)))
}

async fn popular_stocks(
    State(state): State<AppState>,
) -> Result<Json<ApiResponse<Vec<PopularStock>>>, AppError> {
    let outcome = state.popular.popular().await?;

    Ok(Json(ApiResponse::ok(outcome.stocks).stale(outcome.stale)))
}
