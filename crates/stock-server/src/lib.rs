//! HTTP surface of the stock analyzer
//!
//! Four JSON routes over the `stock-analysis` services:
//!
//! - `GET /api/stock-info/:ticker`
//! - `GET /api/stock-history/:ticker?period=&interval=`
//! - `POST /api/analyze` with `{"ticker": ..}`
//! - `GET /api/popular-stocks`

pub mod narrative;
pub mod request_id;
pub mod response;
pub mod routes;

use axum::{Router, body::Body, http::Request, middleware};
use std::sync::Arc;
use stock_analysis::{
    AnalysisOrchestrator, DegradationPipeline, MarketDataProvider, PopularityAggregator,
    QuoteCache, SqliteStore, StockConfig, StockStore, YahooFinanceClient,
};
use tower_http::{cors::CorsLayer, trace::TraceLayer};
use tracing::{error, info};

pub use narrative::{Narrator, narrator_from_lookup};
pub use request_id::request_id_middleware;
pub use response::{ApiResponse, AppError};

/// Services shared by every handler
#[derive(Clone)]
pub struct AppState {
    pub pipeline: Arc<DegradationPipeline>,
    pub popular: Arc<PopularityAggregator>,
    pub analysis: Arc<AnalysisOrchestrator>,
}

impl AppState {
    /// Wire the services around one shared quote cache
    pub fn new(
        provider: Arc<dyn MarketDataProvider>,
        store: Arc<dyn StockStore>,
        narrator: Narrator,
        config: &StockConfig,
    ) -> Self {
        let cache = QuoteCache::new(provider, config);

        Self {
            pipeline: Arc::new(DegradationPipeline::new(
                cache.clone(),
                Arc::clone(&store),
                config,
            )),
            popular: Arc::new(PopularityAggregator::new(Arc::clone(&store), config)),
            analysis: Arc::new(AnalysisOrchestrator::new(
                cache,
                store,
                narrator.provider,
                narrator.model,
            )),
        }
    }
}

/// Routes plus request-id, tracing and CORS layers
pub fn build_router(state: AppState) -> Router {
    routes::stock_routes()
        .layer(middleware::from_fn(request_id_middleware))
        .layer(
            TraceLayer::new_for_http().make_span_with(|request: &Request<Body>| {
                tracing::info_span!(
                    "http_request",
                    method = %request.method(),
                    uri = %request.uri(),
                    request_id = tracing::field::Empty,
                )
            }),
        )
        .layer(CorsLayer::permissive())
        .with_state(state)
}

/// Start-up options resolved from the environment and command line
#[derive(Debug, Clone)]
pub struct ServerOptions {
    pub bind_address: String,
    pub database_url: String,
    pub warmup: bool,
}

/// Connect collaborators, optionally warm the cache, and serve until Ctrl-C
pub async fn run_server(options: ServerOptions) -> anyhow::Result<()> {
    let config = StockConfig::default().with_env()?;

    let provider: Arc<dyn MarketDataProvider> = Arc::new(YahooFinanceClient::new(&config)?);
    let store: Arc<dyn StockStore> = Arc::new(SqliteStore::connect(&options.database_url).await?);
    let narrator = narrator_from_lookup(|key| std::env::var(key).ok())?;

    let state = AppState::new(provider, store, narrator, &config);

    if options.warmup {
        let pipeline = Arc::clone(&state.pipeline);
        tokio::spawn(async move {
            let warmed = pipeline.warm_cache().await;
            info!(warmed, "Cache warm-up finished");
        });
    }

    let listener = tokio::net::TcpListener::bind(&options.bind_address).await?;
    info!("Listening on {}", listener.local_addr()?);

    axum::serve(listener, build_router(state))
        .with_graceful_shutdown(shutdown_signal())
        .await?;

    Ok(())
}

async fn shutdown_signal() {
    if let Err(err) = tokio::signal::ctrl_c().await {
        error!(error = %err, "Failed to listen for shutdown signal");
    }
    info!("Shutting down");
}
