use std::sync::Arc;

use trade_anchor::api;
use trade_anchor::config::Config;
use trade_anchor::counters::AggregateUpdater;
use trade_anchor::ledger::{HttpLedger, RetryConfig};
use trade_anchor::service::AnchorService;
use trade_anchor::store::TradeStore;
use tracing_subscriber::EnvFilter;

#[tokio::main]
async fn main() -> anyhow::Result<()> {
    dotenvy::dotenv().ok();
    tracing_subscriber::fmt()
        .with_env_filter(
            EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new("info")),
        )
        .init();

    let config = Config::from_env()?;

    let db = sled::open(&config.db_path)?;
    let store = TradeStore::open(&db)?;
    let counters = AggregateUpdater::open(&db)?;

    let retry = RetryConfig {
        max_retries: config.max_submit_retries,
        ..RetryConfig::default()
    };
    let ledger = Arc::new(HttpLedger::new(
        &config.ledger_url,
        &config.signer_key,
        config.confirm_timeout,
        retry,
    )?);

    let service = Arc::new(AnchorService::new(ledger, store, counters));
    let app = api::router(service);

    let listener = tokio::net::TcpListener::bind(config.bind_addr).await?;
    tracing::info!(addr = %config.bind_addr, ledger = %config.ledger_url, "trade anchor service listening");
    axum::serve(listener, app).await?;

    Ok(())
}
