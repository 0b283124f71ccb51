use alloy_primitives::{Address, B256};
use serde::Serialize;
use std::fmt;
use std::str::FromStr;

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize)]
#[serde(rename_all = "snake_case")]
pub enum TransactionStatus {
    Pending,
    Confirmed,
    Failed,
}

impl TransactionStatus {
    pub fn as_str(&self) -> &'static str {
        match self {
            TransactionStatus::Pending => "pending",
            TransactionStatus::Confirmed => "confirmed",
            TransactionStatus::Failed => "failed",
        }
    }

    /// Confirmed and Failed records are never re-evaluated.
    pub fn is_terminal(&self) -> bool {
        !matches!(self, TransactionStatus::Pending)
    }
}

impl FromStr for TransactionStatus {
    type Err = anyhow::Error;

    fn from_str(s: &str) -> anyhow::Result<Self> {
        match s.to_lowercase().as_str() {
            "pending" => Ok(TransactionStatus::Pending),
            "confirmed" => Ok(TransactionStatus::Confirmed),
            "failed" => Ok(TransactionStatus::Failed),
            other => anyhow::bail!("Unknown transaction status: {other}"),
        }
    }
}

impl fmt::Display for TransactionStatus {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize)]
#[serde(rename_all = "snake_case")]
pub enum TransactionKind {
    NativeTransfer,
    Erc20Transfer,
}

impl TransactionKind {
    pub fn as_str(&self) -> &'static str {
        match self {
            TransactionKind::NativeTransfer => "native_transfer",
            TransactionKind::Erc20Transfer => "erc20_transfer",
        }
    }
}

impl FromStr for TransactionKind {
    type Err = anyhow::Error;

    fn from_str(s: &str) -> anyhow::Result<Self> {
        match s {
            "native_transfer" => Ok(TransactionKind::NativeTransfer),
            "erc20_transfer" => Ok(TransactionKind::Erc20Transfer),
            other => anyhow::bail!("Unknown transaction kind: {other}"),
        }
    }
}

impl fmt::Display for TransactionKind {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct Transaction {
    pub hash: B256,
    pub status: TransactionStatus,
    pub kind: TransactionKind,
    pub from_address: Address,
    pub to_address: Address,
    /// Decimal rendering with 18 decimals.
    pub amount: String,
    /// Transferred value in base units, exact for any token.
    pub raw_amount: String,
    pub contract_address: Option<Address>,
    pub block_number: u64,
    pub timestamp: u64,
    pub details: serde_json::Value,
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct Wallet {
    pub id: i64,
    pub owner_id: i64,
    pub address: Address,
    pub monitored_tokens: Vec<Address>,
}
