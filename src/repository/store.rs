use super::database::Database;
use super::models::{Transaction, Wallet};
use super::transaction_repository::TransactionRepository;
use super::wallet_repository::WalletRepository;
use alloy_primitives::{Address, B256};
use anyhow::Result;
use std::collections::HashSet;

/// Read access to the monitored wallets.
pub trait WalletStore: Send + Sync {
    fn find_wallets_by_addresses(&self, addresses: &HashSet<Address>) -> Result<Vec<Wallet>>;
}

/// Persistence contract for reconciled transactions.
pub trait TransactionStore: Send + Sync {
    fn find_by_hash(&self, hash: &B256) -> Result<Option<Transaction>>;

    fn find_max_block_number(&self) -> Result<Option<u64>>;

    /// Pending records, least recently checked first, then oldest block.
    fn find_pending(&self, limit: usize) -> Result<Vec<Transaction>>;

    /// Upsert keyed by hash. Must leave terminal records untouched.
    fn save(&self, transaction: &Transaction) -> Result<()>;

    /// Records that a Pending row was re-checked without settling.
    fn mark_checked(&self, hash: &B256) -> Result<()>;
}

impl WalletStore for Database {
    fn find_wallets_by_addresses(&self, addresses: &HashSet<Address>) -> Result<Vec<Wallet>> {
        let conn = self.conn()?;
        WalletRepository::new(&conn).find_by_addresses(addresses)
    }
}

impl TransactionStore for Database {
    fn find_by_hash(&self, hash: &B256) -> Result<Option<Transaction>> {
        let conn = self.conn()?;
        TransactionRepository::new(&conn).find_by_hash(hash)
    }

    fn find_max_block_number(&self) -> Result<Option<u64>> {
        let conn = self.conn()?;
        TransactionRepository::new(&conn).find_max_block_number()
    }

    fn find_pending(&self, limit: usize) -> Result<Vec<Transaction>> {
        let conn = self.conn()?;
        TransactionRepository::new(&conn).find_pending(limit)
    }

    fn save(&self, transaction: &Transaction) -> Result<()> {
        let conn = self.conn()?;
        TransactionRepository::new(&conn).upsert(transaction)?;
        Ok(())
    }

    fn mark_checked(&self, hash: &B256) -> Result<()> {
        let conn = self.conn()?;
        TransactionRepository::new(&conn).mark_checked(hash)
    }
}
