#![allow(dead_code)]

use alloy::sol_types::{SolCall, SolEvent};
use alloy_primitives::{Address, B256, Bytes, Log, LogData, U256, address};
use anyhow::Result;
use async_trait::async_trait;
use futures::StreamExt;
use futures::channel::mpsc;
use std::collections::{HashMap, HashSet};
use std::sync::Arc;
use std::sync::Mutex;
use std::sync::atomic::{AtomicUsize, Ordering};
use wallet_tx_indexer::chain::{
    BlockRef, ChainBlock, ChainClient, ChainReceipt, HeadStream, RawTransaction,
};
use wallet_tx_indexer::config::ConnectionType;
use wallet_tx_indexer::decoder::TransferDecoder;
use wallet_tx_indexer::events::{Transfer, transferCall, transferFromCall};
use wallet_tx_indexer::reconciler::TransactionReconciler;
use wallet_tx_indexer::repository::{Database, WalletRepository};

pub const W1: Address = address!("0x1111111111111111111111111111111111111111");
pub const W2: Address = address!("0x2222222222222222222222222222222222222222");
pub const STRANGER: Address = address!("0x9999999999999999999999999999999999999999");
pub const TOKEN: Address = address!("0x3333333333333333333333333333333333333333");

pub fn one_ether() -> U256 {
    U256::from(1_000_000_000_000_000_000u128)
}

/// In-process chain with scripted blocks, receipts and head notifications.
pub struct MockChain {
    connection_type: ConnectionType,
    head: Mutex<u64>,
    blocks: Mutex<HashMap<u64, ChainBlock>>,
    malformed: Mutex<HashSet<u64>>,
    receipts: Mutex<HashMap<B256, ChainReceipt>>,
    heads: Mutex<Option<mpsc::UnboundedSender<B256>>>,
    pub subscriptions: AtomicUsize,
    pub reconnects: AtomicUsize,
}

impl MockChain {
    pub fn new(connection_type: ConnectionType) -> Arc<Self> {
        Arc::new(Self {
            connection_type,
            head: Mutex::new(0),
            blocks: Mutex::new(HashMap::new()),
            malformed: Mutex::new(HashSet::new()),
            receipts: Mutex::new(HashMap::new()),
            heads: Mutex::new(None),
            subscriptions: AtomicUsize::new(0),
            reconnects: AtomicUsize::new(0),
        })
    }

    pub fn set_head(&self, head: u64) {
        *self.head.lock().unwrap() = head;
    }

    pub fn add_block(&self, block: ChainBlock) {
        self.blocks.lock().unwrap().insert(block.number, block);
    }

    pub fn mark_malformed(&self, number: u64) {
        self.malformed.lock().unwrap().insert(number);
    }

    pub fn set_receipt(&self, receipt: ChainReceipt) {
        self.receipts
            .lock()
            .unwrap()
            .insert(receipt.transaction_hash, receipt);
    }

    /// Serves `receipt` for `hash` regardless of the hash it carries.
    pub fn set_receipt_for(&self, hash: B256, receipt: ChainReceipt) {
        self.receipts.lock().unwrap().insert(hash, receipt);
    }

    /// Returns false when nobody is subscribed.
    pub fn push_head(&self, hash: B256) -> bool {
        match self.heads.lock().unwrap().as_ref() {
            Some(sender) => sender.unbounded_send(hash).is_ok(),
            None => false,
        }
    }

    pub fn close_subscription(&self) {
        self.heads.lock().unwrap().take();
    }

    pub fn is_subscribed(&self) -> bool {
        self.heads.lock().unwrap().is_some()
    }
}

#[async_trait]
impl ChainClient for MockChain {
    fn connection_type(&self) -> ConnectionType {
        self.connection_type
    }

    async fn get_block_number(&self) -> Result<u64> {
        Ok(*self.head.lock().unwrap())
    }

    async fn get_block(&self, block: BlockRef) -> Result<Option<ChainBlock>> {
        match block {
            BlockRef::Number(number) => {
                if self.malformed.lock().unwrap().contains(&number) {
                    anyhow::bail!("malformed block payload at {number}");
                }
                Ok(self.blocks.lock().unwrap().get(&number).cloned())
            }
            BlockRef::Hash(hash) => Ok(self
                .blocks
                .lock()
                .unwrap()
                .values()
                .find(|block| block.hash == hash)
                .cloned()),
        }
    }

    async fn get_transaction_receipt(&self, hash: B256) -> Result<Option<ChainReceipt>> {
        Ok(self.receipts.lock().unwrap().get(&hash).cloned())
    }

    async fn subscribe_new_heads(&self) -> Result<HeadStream> {
        if !self.connection_type.supports_push() {
            anyhow::bail!("no push support");
        }
        let (sender, receiver) = mpsc::unbounded();
        *self.heads.lock().unwrap() = Some(sender);
        self.subscriptions.fetch_add(1, Ordering::SeqCst);
        Ok(receiver.boxed())
    }

    async fn reconnect(&self) -> Result<()> {
        self.reconnects.fetch_add(1, Ordering::SeqCst);
        Ok(())
    }
}

pub fn block(number: u64, transactions: Vec<RawTransaction>) -> ChainBlock {
    ChainBlock {
        number,
        hash: B256::from(U256::from(number)),
        timestamp: 1_700_000_000 + number,
        transactions,
    }
}

pub fn native_tx(hash: B256, from: Address, to: Address, value: U256) -> RawTransaction {
    RawTransaction {
        hash,
        from,
        to: Some(to),
        value,
        input: Bytes::new(),
        gas: 21_000,
        gas_price: Some(20_000_000_000),
    }
}

pub fn token_tx(hash: B256, from: Address, to: Address, value: U256) -> RawTransaction {
    RawTransaction {
        hash,
        from,
        to: Some(TOKEN),
        value: U256::ZERO,
        input: Bytes::from(transferCall { to, value }.abi_encode()),
        gas: 60_000,
        gas_price: Some(20_000_000_000),
    }
}

pub fn token_transfer_from_tx(
    hash: B256,
    spender: Address,
    owner: Address,
    to: Address,
    value: U256,
) -> RawTransaction {
    RawTransaction {
        input: Bytes::from(
            transferFromCall {
                from: owner,
                to,
                value,
            }
            .abi_encode(),
        ),
        ..token_tx(hash, spender, to, value)
    }
}

pub fn receipt(hash: B256, success: bool, logs: Vec<Log>) -> ChainReceipt {
    ChainReceipt {
        transaction_hash: hash,
        success,
        gas_used: 21_000,
        logs,
    }
}

pub fn transfer_log(from: Address, to: Address, value: U256) -> Log {
    Log {
        address: TOKEN,
        data: LogData::new_unchecked(
            vec![Transfer::SIGNATURE_HASH, from.into_word(), to.into_word()],
            Bytes::from(value.to_be_bytes::<32>().to_vec()),
        ),
    }
}

pub fn database_with_wallets(addresses: &[Address]) -> Database {
    let db = Database::in_memory().unwrap();
    {
        let conn = db.conn().unwrap();
        let wallets = WalletRepository::new(&conn);
        for (owner, address) in addresses.iter().enumerate() {
            wallets.insert(owner as i64 + 1, address, &[]).unwrap();
        }
    }
    db
}

pub fn reconciler(chain: Arc<MockChain>, db: &Database) -> Arc<TransactionReconciler> {
    Arc::new(TransactionReconciler::new(
        chain,
        Arc::new(db.clone()),
        Arc::new(db.clone()),
        TransferDecoder::default(),
        4,
    ))
}
