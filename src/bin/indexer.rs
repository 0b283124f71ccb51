use anyhow::Result;
use std::sync::Arc;
use tracing::{error, info};
use tracing_subscriber::EnvFilter;
use wallet_tx_indexer::config::Config;
use wallet_tx_indexer::decoder::TransferDecoder;
use wallet_tx_indexer::events::Erc20Abi;
use wallet_tx_indexer::reconciler::TransactionReconciler;
use wallet_tx_indexer::repository::Database;
use wallet_tx_indexer::rpc::RpcClient;
use wallet_tx_indexer::watcher::{ChainWatcher, WatcherConfig};

#[tokio::main]
async fn main() -> Result<()> {
    tracing_subscriber::fmt()
        .with_env_filter(
            EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new("info")),
        )
        .init();

    info!("Starting wallet transaction indexer");

    let config = Config::from_env()?;
    info!("Configuration loaded");
    info!(
        "Node: {} ({}), start block {}, reorg margin {}",
        config.node_url, config.connection_type, config.start_block, config.reorg_margin
    );

    let db = Database::new(&config.database_url)?;
    info!("Database initialized");

    let client = Arc::new(RpcClient::connect(config.connection_type, &config.node_url).await?);

    let reconciler = Arc::new(TransactionReconciler::new(
        client.clone(),
        Arc::new(db.clone()),
        Arc::new(db),
        TransferDecoder::new(Erc20Abi::default()),
        config.transaction_concurrency,
    ));

    let watcher = ChainWatcher::new(client, reconciler, WatcherConfig::from(&config))?;
    let handle = watcher.start();

    if let Err(e) = tokio::signal::ctrl_c().await {
        error!("Failed to listen for shutdown signal: {}", e);
    }

    info!("Shutting down");
    let cursor = handle.stop().await?;
    info!("Stopped at block {}", cursor.last_checking_block());

    Ok(())
}
