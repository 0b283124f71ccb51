use crate::chain::{ChainBlock, ChainClient, ChainReceipt, RawTransaction};
use crate::decoder::{Classification, TransferDecoder};
use crate::executor::BoundedExecutor;
use crate::repository::{
    Transaction, TransactionKind, TransactionStatus, TransactionStore, WalletStore,
};
use crate::wallet_index::WalletIndex;
use alloy_primitives::U256;
use alloy_primitives::utils::format_units;
use anyhow::Result;
use serde_json::json;
use std::sync::{Arc, Mutex, MutexGuard};
use tracing::{debug, info, warn};

/// Decimals used to render amounts for both native coin and tokens.
const AMOUNT_DECIMALS: u8 = 18;

/// Renders a base-unit amount as a decimal string, e.g. 10^18 as `"1.0"`.
pub fn format_amount(value: U256) -> String {
    let formatted = format_units(value, AMOUNT_DECIMALS).unwrap_or_else(|_| value.to_string());
    match formatted.split_once('.') {
        Some((whole, fraction)) => {
            let fraction = fraction.trim_end_matches('0');
            if fraction.is_empty() {
                format!("{whole}.0")
            } else {
                format!("{whole}.{fraction}")
            }
        }
        None => formatted,
    }
}

/// Outcome counters for one batch of transactions.
#[derive(Debug, Default, Clone, Copy, PartialEq, Eq)]
pub struct BlockReport {
    pub relevant: usize,
    pub pending: usize,
    pub confirmed: usize,
    pub failed: usize,
    pub skipped: usize,
    pub errors: usize,
}

impl BlockReport {
    pub fn merge(&mut self, other: &BlockReport) {
        self.relevant += other.relevant;
        self.pending += other.pending;
        self.confirmed += other.confirmed;
        self.failed += other.failed;
        self.skipped += other.skipped;
        self.errors += other.errors;
    }

    fn record(&mut self, outcome: Option<TransactionStatus>) {
        match outcome {
            Some(TransactionStatus::Pending) => self.pending += 1,
            Some(TransactionStatus::Confirmed) => self.confirmed += 1,
            Some(TransactionStatus::Failed) => self.failed += 1,
            None => self.skipped += 1,
        }
    }
}

/// Mirrors relevant on-chain transfers into the transaction store and drives
/// each record from Pending to Confirmed or Failed.
pub struct TransactionReconciler {
    client: Arc<dyn ChainClient>,
    transactions: Arc<dyn TransactionStore>,
    wallets: Arc<dyn WalletStore>,
    decoder: TransferDecoder,
    executor: BoundedExecutor,
}

impl TransactionReconciler {
    pub fn new(
        client: Arc<dyn ChainClient>,
        transactions: Arc<dyn TransactionStore>,
        wallets: Arc<dyn WalletStore>,
        decoder: TransferDecoder,
        transaction_concurrency: usize,
    ) -> Self {
        Self {
            client,
            transactions,
            wallets,
            decoder,
            executor: BoundedExecutor::new(transaction_concurrency),
        }
    }

    pub fn transactions(&self) -> &Arc<dyn TransactionStore> {
        &self.transactions
    }

    pub async fn process_transactions_in_block(&self, block: &ChainBlock) -> Result<BlockReport> {
        let index =
            WalletIndex::resolve(self.wallets.as_ref(), &self.decoder, &block.transactions)?;
        let relevant: Vec<RawTransaction> = index
            .filter_relevant(&self.decoder, &block.transactions)
            .into_iter()
            .cloned()
            .collect();

        if relevant.is_empty() {
            return Ok(BlockReport::default());
        }

        debug!(
            "Block {} has {} relevant transaction(s) out of {}",
            block.number,
            relevant.len(),
            block.transactions.len()
        );

        let report = Mutex::new(BlockReport {
            relevant: relevant.len(),
            ..Default::default()
        });
        let report_ref = &report;

        self.executor
            .run(
                relevant,
                |tx: RawTransaction| async move {
                    let outcome = self.reconcile_transaction(&tx, block).await?;
                    lock_report(report_ref).record(outcome);
                    anyhow::Ok(())
                },
                |tx, e| {
                    warn!(
                        "Failed to reconcile transaction {:?} in block {}: {:#}",
                        tx.hash, block.number, e
                    );
                    lock_report(report_ref).errors += 1;
                },
            )
            .await;

        Ok(into_report(report))
    }

    /// Creates or advances the record for one observed transaction.
    /// Returns `None` when the transaction is not a recognised transfer.
    pub async fn reconcile_transaction(
        &self,
        raw: &RawTransaction,
        block: &ChainBlock,
    ) -> Result<Option<TransactionStatus>> {
        let record = match self.transactions.find_by_hash(&raw.hash)? {
            Some(existing) if existing.status.is_terminal() => {
                debug!(
                    "Transaction {:?} already {}, skipping",
                    existing.hash, existing.status
                );
                return Ok(Some(existing.status));
            }
            Some(existing) => existing,
            None => match self.build_record(raw, block) {
                Some(record) => {
                    self.transactions.save(&record)?;
                    info!(
                        "Tracking {} {:?} in block {}",
                        record.kind, record.hash, record.block_number
                    );
                    record
                }
                None => {
                    debug!("Skipping unrecognised transaction {:?}", raw.hash);
                    return Ok(None);
                }
            },
        };

        self.settle(record).await.map(Some)
    }

    /// Re-examines stored Pending records, oldest first.
    pub async fn reconcile_pending(&self, limit: usize) -> Result<BlockReport> {
        let pending = self.transactions.find_pending(limit)?;
        let report = Mutex::new(BlockReport {
            relevant: pending.len(),
            ..Default::default()
        });
        let report_ref = &report;

        self.executor
            .run(
                pending,
                |record| async move {
                    let status = self.settle(record).await?;
                    lock_report(report_ref).record(Some(status));
                    anyhow::Ok(())
                },
                |record, e| {
                    warn!("Failed to re-check pending {:?}: {:#}", record.hash, e);
                    lock_report(report_ref).errors += 1;
                },
            )
            .await;

        Ok(into_report(report))
    }

    /// Terminal status implied by a receipt.
    pub fn settle_status(
        &self,
        kind: TransactionKind,
        receipt: &ChainReceipt,
    ) -> TransactionStatus {
        if !receipt.success {
            return TransactionStatus::Failed;
        }

        match kind {
            TransactionKind::NativeTransfer => TransactionStatus::Confirmed,
            TransactionKind::Erc20Transfer => {
                let confirmed = receipt
                    .logs
                    .iter()
                    .filter_map(|log| self.decoder.decode_transfer_event(log))
                    .any(|event| !event.from.is_zero() && !event.to.is_zero());

                if confirmed {
                    TransactionStatus::Confirmed
                } else {
                    TransactionStatus::Failed
                }
            }
        }
    }

    async fn settle(&self, mut record: Transaction) -> Result<TransactionStatus> {
        let Some(receipt) = self.client.get_transaction_receipt(record.hash).await? else {
            debug!("No receipt yet for {:?}", record.hash);
            self.transactions.mark_checked(&record.hash)?;
            return Ok(TransactionStatus::Pending);
        };
        if receipt.transaction_hash != record.hash {
            anyhow::bail!(
                "Receipt for {:?} belongs to {:?}",
                record.hash,
                receipt.transaction_hash
            );
        }

        record.status = self.settle_status(record.kind, &receipt);
        if let Some(details) = record.details.as_object_mut() {
            details.insert("gasUsed".to_string(), json!(receipt.gas_used));
        }
        self.transactions.save(&record)?;

        info!(
            "Transaction {:?} {} ({} {})",
            record.hash, record.status, record.amount, record.kind
        );
        Ok(record.status)
    }

    fn build_record(&self, raw: &RawTransaction, block: &ChainBlock) -> Option<Transaction> {
        let (kind, contract_address, transfer) = match self.decoder.classify(raw) {
            Classification::NativeTransfer(transfer) => {
                (TransactionKind::NativeTransfer, None, transfer)
            }
            Classification::Erc20Transfer {
                contract_address,
                transfer,
            } => (
                TransactionKind::Erc20Transfer,
                Some(contract_address),
                transfer,
            ),
            Classification::Unknown => return None,
        };

        Some(Transaction {
            hash: raw.hash,
            status: TransactionStatus::Pending,
            kind,
            from_address: transfer.from,
            to_address: transfer.to,
            amount: format_amount(transfer.value),
            raw_amount: transfer.value.to_string(),
            contract_address,
            block_number: block.number,
            timestamp: block.timestamp,
            details: json!({
                "gas": raw.gas,
                "gasPrice": raw.gas_price.map(|price| price.to_string()),
            }),
        })
    }
}

fn lock_report(report: &Mutex<BlockReport>) -> MutexGuard<'_, BlockReport> {
    report.lock().unwrap_or_else(|poisoned| poisoned.into_inner())
}

fn into_report(report: Mutex<BlockReport>) -> BlockReport {
    report
        .into_inner()
        .unwrap_or_else(|poisoned| poisoned.into_inner())
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn formats_whole_and_fractional_amounts() {
        let one_ether = U256::from(10u64).pow(U256::from(18));
        assert_eq!(format_amount(one_ether), "1.0");
        assert_eq!(format_amount(one_ether * U256::from(3u64) / U256::from(2u64)), "1.5");
        assert_eq!(format_amount(U256::from(1u64)), "0.000000000000000001");
        assert_eq!(format_amount(U256::ZERO), "0.0");
    }
}
