//! stock-server binary

use clap::Parser;
use stock_server::{ServerOptions, run_server};
use stock_utils::{AppConfig, init_tracing_with};
use tracing::info;

#[derive(Parser, Debug)]
#[command(name = "stock-server")]
#[command(about = "Stock quote, history and analysis API", long_about = None)]
struct Args {
    /// Socket address to bind (overrides BIND_ADDRESS)
    #[arg(long)]
    bind: Option<String>,

    /// SQLite connection string (overrides DATABASE_URL)
    #[arg(long)]
    database_url: Option<String>,

    /// Skip pre-fetching the fallback tickers at start-up
    #[arg(long)]
    no_warmup: bool,
}

#[tokio::main]
async fn main() -> anyhow::Result<()> {
    let args = Args::parse();

    dotenvy::dotenv().ok();
    let config = AppConfig::from_env()?;

    init_tracing_with(config.log_format);

    info!(
        app = %config.app_name,
        environment = %config.environment,
        "Starting stock-server"
    );

    run_server(ServerOptions {
        bind_address: args.bind.unwrap_or(config.bind_address),
        database_url: args.database_url.unwrap_or(config.database_url),
        warmup: !args.no_warmup,
    })
    .await
}
