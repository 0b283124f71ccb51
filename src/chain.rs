use crate::config::ConnectionType;
use alloy_primitives::{Address, B256, Bytes, Log, U256};
use anyhow::Result;
use async_trait::async_trait;
use futures::stream::BoxStream;
use std::fmt;

/// Stream of new block hashes pushed by the node.
pub type HeadStream = BoxStream<'static, B256>;

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum BlockRef {
    Number(u64),
    Hash(B256),
}

impl fmt::Display for BlockRef {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            BlockRef::Number(number) => write!(f, "#{number}"),
            BlockRef::Hash(hash) => write!(f, "{hash:?}"),
        }
    }
}

/// A transaction as it appears inside a block.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct RawTransaction {
    pub hash: B256,
    pub from: Address,
    /// `None` for contract creation.
    pub to: Option<Address>,
    pub value: U256,
    pub input: Bytes,
    pub gas: u64,
    pub gas_price: Option<u128>,
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ChainBlock {
    pub number: u64,
    pub hash: B256,
    pub timestamp: u64,
    pub transactions: Vec<RawTransaction>,
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ChainReceipt {
    pub transaction_hash: B256,
    pub success: bool,
    pub gas_used: u64,
    pub logs: Vec<Log>,
}

/// Read access to the chain plus the connection lifecycle hooks the watcher
/// drives.
#[async_trait]
pub trait ChainClient: Send + Sync {
    fn connection_type(&self) -> ConnectionType;

    async fn get_block_number(&self) -> Result<u64>;

    /// Full block with transactions, `None` if the node does not know it yet.
    async fn get_block(&self, block: BlockRef) -> Result<Option<ChainBlock>>;

    /// `None` while the transaction is not mined.
    async fn get_transaction_receipt(&self, hash: B256) -> Result<Option<ChainReceipt>>;

    /// Subscribes to new block headers. The stream ends when the connection
    /// closes.
    async fn subscribe_new_heads(&self) -> Result<HeadStream>;

    /// Replaces the underlying connection with a fresh one.
    async fn reconnect(&self) -> Result<()>;
}
