use crate::query::formatters::{
    OutputFormat, format_stats, format_transaction_detail, format_transactions, format_wallets,
};
use crate::repository::{TransactionRepository, TransactionStatus, WalletRepository};
use alloy_primitives::{Address, B256};
use anyhow::{Context, Result};
use std::str::FromStr;

#[derive(Debug, Default)]
pub struct TransactionQuery {
    pub status: Option<String>,
    pub address: Option<String>,
    pub limit: usize,
    pub offset: usize,
}

pub fn cmd_transactions(
    repo: &TransactionRepository,
    query: TransactionQuery,
    format: &OutputFormat,
) -> Result<()> {
    let status = query
        .status
        .as_deref()
        .map(TransactionStatus::from_str)
        .transpose()?;

    let address = query
        .address
        .as_deref()
        .map(parse_address)
        .transpose()?;

    let transactions =
        repo.query_transactions(status, address.as_ref(), query.limit, query.offset)?;
    println!("{}", format_transactions(&transactions, format));

    Ok(())
}

pub fn cmd_show(repo: &TransactionRepository, hash: &str, format: &OutputFormat) -> Result<()> {
    let hash = B256::from_str(hash)
        .map_err(|_| anyhow::anyhow!("Invalid transaction hash: {}", hash))?;

    match repo.find_by_hash(&hash)? {
        Some(transaction) => println!("{}", format_transaction_detail(&transaction, format)),
        None => println!("Transaction {hash:?} is not tracked."),
    }

    Ok(())
}

pub fn cmd_stats(repo: &TransactionRepository, format: &OutputFormat) -> Result<()> {
    let stats = repo.get_statistics()?;
    println!("{}", format_stats(&stats, format));

    Ok(())
}

pub fn cmd_add_wallet(
    repo: &WalletRepository,
    owner_id: i64,
    address: &str,
    tokens: &[String],
) -> Result<()> {
    let address = parse_address(address)?;
    let tokens = tokens
        .iter()
        .map(|token| parse_address(token))
        .collect::<Result<Vec<_>>>()
        .context("Invalid token address")?;

    repo.insert(owner_id, &address, &tokens)?;
    println!("Monitoring {address:#} for owner {owner_id}");

    Ok(())
}

pub fn cmd_wallets(repo: &WalletRepository, format: &OutputFormat) -> Result<()> {
    let wallets = repo.list()?;
    println!("{}", format_wallets(&wallets, format));

    Ok(())
}

fn parse_address(address: &str) -> Result<Address> {
    Address::from_str(address).map_err(|_| anyhow::anyhow!("Invalid address format: {}", address))
}
