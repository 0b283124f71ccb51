use super::models::Wallet;
use alloy_primitives::Address;
use anyhow::{Context, Result};
use rusqlite::{Row, params, params_from_iter};
use std::collections::HashSet;
use std::str::FromStr;

pub struct WalletRepository<'a> {
    conn: &'a rusqlite::Connection,
}

impl<'a> WalletRepository<'a> {
    const INSERT_WALLET: &'static str =
        "INSERT OR IGNORE INTO wallets (owner_id, address, monitored_tokens)
         VALUES (?1, ?2, ?3)";

    const SELECT_WALLET: &'static str =
        "SELECT id, owner_id, address, monitored_tokens FROM wallets";

    pub fn new(conn: &'a rusqlite::Connection) -> Self {
        Self { conn }
    }

    /// Registers an address for monitoring. A duplicate (owner, address)
    /// pair is ignored.
    pub fn insert(
        &self,
        owner_id: i64,
        address: &Address,
        monitored_tokens: &[Address],
    ) -> Result<()> {
        let tokens = serde_json::to_string(monitored_tokens)
            .context("Failed to encode monitored tokens")?;
        self.conn.execute(
            Self::INSERT_WALLET,
            params![owner_id, format!("{address:?}"), tokens],
        )?;
        Ok(())
    }

    /// One query for the whole address set.
    pub fn find_by_addresses(&self, addresses: &HashSet<Address>) -> Result<Vec<Wallet>> {
        if addresses.is_empty() {
            return Ok(Vec::new());
        }

        let placeholders = vec!["?"; addresses.len()].join(", ");
        let query = format!(
            "{} WHERE address IN ({placeholders}) ORDER BY id",
            Self::SELECT_WALLET
        );
        let keys: Vec<String> = addresses
            .iter()
            .map(|address| format!("{address:?}"))
            .collect();

        let mut stmt = self.conn.prepare(&query)?;
        let wallets = stmt
            .query_map(params_from_iter(keys), Self::row_to_wallet)?
            .collect::<Result<Vec<_>, _>>()?;

        Ok(wallets)
    }

    pub fn list(&self) -> Result<Vec<Wallet>> {
        let query = format!("{} ORDER BY id", Self::SELECT_WALLET);
        let mut stmt = self.conn.prepare(&query)?;
        let wallets = stmt
            .query_map([], Self::row_to_wallet)?
            .collect::<Result<Vec<_>, _>>()?;
        Ok(wallets)
    }

    fn row_to_wallet(row: &Row) -> rusqlite::Result<Wallet> {
        let address = Address::from_str(&row.get::<_, String>(2)?).map_err(|e| {
            rusqlite::Error::FromSqlConversionFailure(2, rusqlite::types::Type::Text, Box::new(e))
        })?;
        let monitored_tokens =
            serde_json::from_str(&row.get::<_, String>(3)?).map_err(|e| {
                rusqlite::Error::FromSqlConversionFailure(
                    3,
                    rusqlite::types::Type::Text,
                    Box::new(e),
                )
            })?;

        Ok(Wallet {
            id: row.get(0)?,
            owner_id: row.get(1)?,
            address,
            monitored_tokens,
        })
    }
}
