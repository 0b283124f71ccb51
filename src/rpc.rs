use crate::chain::{BlockRef, ChainBlock, ChainClient, ChainReceipt, HeadStream, RawTransaction};
use crate::config::ConnectionType;
use alloy::consensus::Transaction as ConsensusTransaction;
use alloy::network::TransactionResponse;
use alloy::providers::{DynProvider, IpcConnect, Provider, ProviderBuilder, WsConnect};
use alloy::rpc::types::{Block, BlockNumberOrTag, Transaction, TransactionReceipt};
use alloy::transports::TransportResult;
use alloy_primitives::B256;
use anyhow::{Context, Result};
use async_trait::async_trait;
use futures::StreamExt;
use std::future::Future;
use std::sync::{Arc, RwLock};
use std::time::Duration;
use tokio::time::timeout;
use tokio_retry::Retry;
use tokio_retry::strategy::{ExponentialBackoff, jitter};
use tracing::{info, warn};

const REQUEST_TIMEOUT: Duration = Duration::from_secs(30);

/// Node client over a single alloy provider. The provider sits behind a lock
/// so a websocket reconnect can swap it while requests are in flight.
#[derive(Clone)]
pub struct RpcClient {
    connection_type: ConnectionType,
    url: String,
    provider: Arc<RwLock<DynProvider>>,
    max_retries: usize,
}

impl RpcClient {
    pub async fn connect(connection_type: ConnectionType, url: &str) -> Result<Self> {
        let provider = Self::build_provider(connection_type, url).await?;
        info!("Connected to {} node at {}", connection_type, url);

        Ok(RpcClient {
            connection_type,
            url: url.to_string(),
            provider: Arc::new(RwLock::new(provider)),
            max_retries: 5,
        })
    }

    async fn build_provider(connection_type: ConnectionType, url: &str) -> Result<DynProvider> {
        let provider = match connection_type {
            ConnectionType::Http => {
                let parsed_url = url
                    .parse()
                    .map_err(|_| anyhow::anyhow!("Invalid RPC URL: {}", url))?;
                ProviderBuilder::new().connect_http(parsed_url).erased()
            }
            ConnectionType::WebSocket => ProviderBuilder::new()
                .connect_ws(WsConnect::new(url))
                .await
                .with_context(|| format!("Failed to open websocket connection to {url}"))?
                .erased(),
            ConnectionType::Ipc => ProviderBuilder::new()
                .connect_ipc(IpcConnect::new(url.to_string()))
                .await
                .with_context(|| format!("Failed to open IPC connection to {url}"))?
                .erased(),
        };
        Ok(provider)
    }

    fn provider(&self) -> DynProvider {
        self.provider
            .read()
            .unwrap_or_else(|poisoned| poisoned.into_inner())
            .clone()
    }

    fn get_retry_strategy(&self) -> impl Iterator<Item = Duration> {
        ExponentialBackoff::from_millis(100)
            .factor(2)
            .max_delay(Duration::from_secs(10))
            .map(jitter)
            .take(self.max_retries)
    }

    async fn request<T, F, Fut>(&self, method: &'static str, call: F) -> Result<T>
    where
        F: Fn(DynProvider) -> Fut,
        Fut: Future<Output = TransportResult<T>>,
    {
        Retry::spawn(self.get_retry_strategy(), || {
            let pending = call(self.provider());
            async move {
                match timeout(REQUEST_TIMEOUT, pending).await {
                    Ok(Ok(result)) => Ok(result),
                    Ok(Err(e)) => {
                        warn!("RPC error on {} ({}): {}", self.url, method, e);
                        Err(anyhow::anyhow!("{method} failed: {e}"))
                    }
                    Err(_) => {
                        warn!(
                            "Request timeout after {} seconds on {} ({})",
                            REQUEST_TIMEOUT.as_secs(),
                            self.url,
                            method
                        );
                        Err(anyhow::anyhow!(
                            "{method} timed out after {} seconds",
                            REQUEST_TIMEOUT.as_secs()
                        ))
                    }
                }
            }
        })
        .await
    }
}

#[async_trait]
impl ChainClient for RpcClient {
    fn connection_type(&self) -> ConnectionType {
        self.connection_type
    }

    async fn get_block_number(&self) -> Result<u64> {
        self.request("eth_blockNumber", |provider| async move {
            provider.get_block_number().await
        })
        .await
    }

    async fn get_block(&self, block: BlockRef) -> Result<Option<ChainBlock>> {
        let block = match block {
            BlockRef::Number(number) => {
                self.request("eth_getBlockByNumber", |provider| async move {
                    provider
                        .get_block_by_number(BlockNumberOrTag::Number(number))
                        .full()
                        .await
                })
                .await?
            }
            BlockRef::Hash(hash) => {
                self.request("eth_getBlockByHash", |provider| async move {
                    provider.get_block_by_hash(hash).full().await
                })
                .await?
            }
        };
        Ok(block.map(convert_block))
    }

    async fn get_transaction_receipt(&self, hash: B256) -> Result<Option<ChainReceipt>> {
        let receipt = self
            .request("eth_getTransactionReceipt", |provider| async move {
                provider.get_transaction_receipt(hash).await
            })
            .await?;
        Ok(receipt.map(convert_receipt))
    }

    async fn subscribe_new_heads(&self) -> Result<HeadStream> {
        if !self.connection_type.supports_push() {
            anyhow::bail!(
                "{} connections do not support subscriptions",
                self.connection_type
            );
        }

        let subscription = self
            .provider()
            .subscribe_blocks()
            .await
            .context("Failed to subscribe to new block headers")?;
        Ok(subscription
            .into_stream()
            .map(|header| header.hash)
            .boxed())
    }

    async fn reconnect(&self) -> Result<()> {
        if !self.connection_type.supports_reconnect() {
            anyhow::bail!("{} connections are not re-established", self.connection_type);
        }

        let provider = Self::build_provider(self.connection_type, &self.url).await?;
        *self
            .provider
            .write()
            .unwrap_or_else(|poisoned| poisoned.into_inner()) = provider;
        info!("Reconnected to {}", self.url);
        Ok(())
    }
}

fn convert_block(block: Block) -> ChainBlock {
    ChainBlock {
        number: block.header.number,
        hash: block.header.hash,
        timestamp: block.header.timestamp,
        transactions: block.transactions.txns().map(convert_transaction).collect(),
    }
}

fn convert_transaction(tx: &Transaction) -> RawTransaction {
    RawTransaction {
        hash: TransactionResponse::tx_hash(tx),
        from: TransactionResponse::from(tx),
        to: ConsensusTransaction::to(tx),
        value: ConsensusTransaction::value(tx),
        input: ConsensusTransaction::input(tx).clone(),
        gas: ConsensusTransaction::gas_limit(tx),
        gas_price: tx
            .effective_gas_price
            .or_else(|| ConsensusTransaction::gas_price(tx)),
    }
}

fn convert_receipt(receipt: TransactionReceipt) -> ChainReceipt {
    ChainReceipt {
        transaction_hash: receipt.transaction_hash,
        success: receipt.status(),
        gas_used: receipt.gas_used,
        logs: receipt
            .inner
            .logs()
            .iter()
            .map(|log| log.inner.clone())
            .collect(),
    }
}
