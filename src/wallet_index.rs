use crate::chain::RawTransaction;
use crate::decoder::TransferDecoder;
use crate::repository::{Wallet, WalletStore};
use alloy_primitives::Address;
use anyhow::Result;
use std::collections::{HashMap, HashSet};
use tracing::debug;

/// Monitored wallets keyed by address, built for a single batch of
/// transactions.
#[derive(Debug, Default, Clone)]
pub struct WalletIndex {
    wallets: HashMap<Address, Vec<Wallet>>,
}

impl WalletIndex {
    /// Looks up every participant of `transactions` with one store query.
    pub fn resolve(
        store: &dyn WalletStore,
        decoder: &TransferDecoder,
        transactions: &[RawTransaction],
    ) -> Result<Self> {
        let addresses: HashSet<Address> = transactions
            .iter()
            .flat_map(|tx| decoder.participants(tx))
            .collect();

        if addresses.is_empty() {
            return Ok(Self::default());
        }

        let mut wallets: HashMap<Address, Vec<Wallet>> = HashMap::new();
        for wallet in store.find_wallets_by_addresses(&addresses)? {
            wallets.entry(wallet.address).or_default().push(wallet);
        }

        debug!(
            "Matched {} of {} addresses against monitored wallets",
            wallets.len(),
            addresses.len()
        );

        Ok(Self { wallets })
    }

    pub fn is_empty(&self) -> bool {
        self.wallets.is_empty()
    }

    pub fn contains(&self, address: &Address) -> bool {
        self.wallets.contains_key(address)
    }

    /// Transactions with at least one monitored participant.
    pub fn filter_relevant<'t>(
        &self,
        decoder: &TransferDecoder,
        transactions: &'t [RawTransaction],
    ) -> Vec<&'t RawTransaction> {
        if self.is_empty() {
            return Vec::new();
        }

        transactions
            .iter()
            .filter(|tx| {
                decoder
                    .participants(tx)
                    .iter()
                    .any(|address| self.contains(address))
            })
            .collect()
    }
}
