use super::models::{Transaction, TransactionStatus};
use alloy_primitives::{Address, B256};
use anyhow::Result;
use rusqlite::{OptionalExtension, Row, ToSql, params, params_from_iter};
use std::str::FromStr;

pub struct TransactionRepository<'a> {
    conn: &'a rusqlite::Connection,
}

impl<'a> TransactionRepository<'a> {
    // Terminal rows are never overwritten; the WHERE clause turns a late
    // upsert for a confirmed or failed hash into a no-op.
    const UPSERT_TRANSACTION: &'static str = "INSERT INTO transactions (
            hash, status, kind, from_address, to_address,
            amount, raw_amount, contract_address, block_number, timestamp, details
        ) VALUES (?1, ?2, ?3, ?4, ?5, ?6, ?7, ?8, ?9, ?10, ?11)
        ON CONFLICT(hash) DO UPDATE SET
            status = excluded.status,
            kind = excluded.kind,
            from_address = excluded.from_address,
            to_address = excluded.to_address,
            amount = excluded.amount,
            raw_amount = excluded.raw_amount,
            contract_address = excluded.contract_address,
            block_number = excluded.block_number,
            timestamp = excluded.timestamp,
            details = excluded.details
        WHERE transactions.status = 'pending'";

    const SELECT_TRANSACTION: &'static str = "SELECT hash, status, kind, from_address, to_address, amount, raw_amount, contract_address, block_number, timestamp, details FROM transactions";

    // Least recently checked first, so rows that never settle cannot starve
    // the rest of the queue.
    const SELECT_PENDING_ORDER: &'static str = " WHERE status = 'pending'
        ORDER BY check_sequence ASC, block_number ASC, hash ASC LIMIT ?1";

    const MARK_CHECKED: &'static str = "UPDATE transactions
        SET check_sequence = (SELECT COALESCE(MAX(check_sequence), 0) + 1 FROM transactions)
        WHERE hash = ?1 AND status = 'pending'";

    const SELECT_MAX_BLOCK_NUMBER: &'static str = "SELECT MAX(block_number) FROM transactions";

    pub fn new(conn: &'a rusqlite::Connection) -> Self {
        Self { conn }
    }

    /// Inserts or updates the record keyed by hash. Returns whether a row
    /// was written.
    pub fn upsert(&self, transaction: &Transaction) -> Result<bool> {
        let changed = self.conn.execute(
            Self::UPSERT_TRANSACTION,
            params![
                format!("{:?}", transaction.hash),
                transaction.status.as_str(),
                transaction.kind.as_str(),
                format!("{:?}", transaction.from_address),
                format!("{:?}", transaction.to_address),
                transaction.amount,
                transaction.raw_amount,
                transaction
                    .contract_address
                    .map(|address| format!("{address:?}")),
                transaction.block_number,
                transaction.timestamp,
                transaction.details.to_string(),
            ],
        )?;
        Ok(changed > 0)
    }

    pub fn find_by_hash(&self, hash: &B256) -> Result<Option<Transaction>> {
        let query = format!("{} WHERE hash = ?1", Self::SELECT_TRANSACTION);
        let transaction = self
            .conn
            .query_row(&query, params![format!("{hash:?}")], Self::row_to_transaction)
            .optional()?;
        Ok(transaction)
    }

    pub fn find_max_block_number(&self) -> Result<Option<u64>> {
        let block: Option<u64> =
            self.conn
                .query_row(Self::SELECT_MAX_BLOCK_NUMBER, [], |row| row.get(0))?;
        Ok(block)
    }

    pub fn find_pending(&self, limit: usize) -> Result<Vec<Transaction>> {
        let query = format!("{}{}", Self::SELECT_TRANSACTION, Self::SELECT_PENDING_ORDER);
        let mut stmt = self.conn.prepare(&query)?;
        let transactions = stmt
            .query_map(params![limit as i64], Self::row_to_transaction)?
            .collect::<Result<Vec<_>, _>>()?;
        Ok(transactions)
    }

    /// Moves a Pending row to the back of the re-check queue.
    pub fn mark_checked(&self, hash: &B256) -> Result<()> {
        self.conn
            .execute(Self::MARK_CHECKED, params![format!("{hash:?}")])?;
        Ok(())
    }

    pub fn query_transactions(
        &self,
        status: Option<TransactionStatus>,
        address: Option<&Address>,
        limit: usize,
        offset: usize,
    ) -> Result<Vec<Transaction>> {
        let mut conditions = Vec::new();
        let mut params: Vec<Box<dyn ToSql>> = Vec::new();

        if let Some(status) = status {
            conditions.push("status = ?");
            params.push(Box::new(status.as_str()));
        }

        if let Some(address) = address {
            let address_str = format!("{address:?}");
            conditions.push("(from_address = ? OR to_address = ?)");
            params.push(Box::new(address_str.clone()));
            params.push(Box::new(address_str));
        }

        let mut query = Self::SELECT_TRANSACTION.to_string();
        if !conditions.is_empty() {
            query.push_str(" WHERE ");
            query.push_str(&conditions.join(" AND "));
        }
        query.push_str(&format!(
            " ORDER BY block_number ASC, hash ASC LIMIT {limit} OFFSET {offset}"
        ));

        let mut stmt = self.conn.prepare(&query)?;
        let transactions = stmt
            .query_map(params_from_iter(params), Self::row_to_transaction)?
            .collect::<Result<Vec<_>, _>>()?;

        Ok(transactions)
    }

    pub fn get_statistics(&self) -> Result<TransactionStats> {
        let mut stmt = self
            .conn
            .prepare("SELECT status, COUNT(*) FROM transactions GROUP BY status")?;
        let counts = stmt
            .query_map([], |row| {
                Ok((row.get::<_, String>(0)?, row.get::<_, usize>(1)?))
            })?
            .collect::<Result<Vec<_>, _>>()?;

        let mut stats = TransactionStats::default();
        for (status, count) in counts {
            stats.total += count;
            match TransactionStatus::from_str(&status)? {
                TransactionStatus::Pending => stats.pending = count,
                TransactionStatus::Confirmed => stats.confirmed = count,
                TransactionStatus::Failed => stats.failed = count,
            }
        }

        let (earliest_block, latest_block): (Option<u64>, Option<u64>) = self.conn.query_row(
            "SELECT MIN(block_number), MAX(block_number) FROM transactions",
            [],
            |row| Ok((row.get(0)?, row.get(1)?)),
        )?;
        stats.earliest_block = earliest_block;
        stats.latest_block = latest_block;

        Ok(stats)
    }

    fn row_to_transaction(row: &Row) -> rusqlite::Result<Transaction> {
        let contract_address = row
            .get::<_, Option<String>>(7)?
            .map(|raw| parse_text::<Address>(7, &raw))
            .transpose()?;
        let details = row.get::<_, String>(10)?;
        let details = serde_json::from_str(&details).map_err(|e| {
            rusqlite::Error::FromSqlConversionFailure(10, rusqlite::types::Type::Text, Box::new(e))
        })?;

        Ok(Transaction {
            hash: parse_text(0, &row.get::<_, String>(0)?)?,
            status: parse_text(1, &row.get::<_, String>(1)?)?,
            kind: parse_text(2, &row.get::<_, String>(2)?)?,
            from_address: parse_text(3, &row.get::<_, String>(3)?)?,
            to_address: parse_text(4, &row.get::<_, String>(4)?)?,
            amount: row.get(5)?,
            raw_amount: row.get(6)?,
            contract_address,
            block_number: row.get(8)?,
            timestamp: row.get(9)?,
            details,
        })
    }
}

fn parse_text<T>(index: usize, raw: &str) -> rusqlite::Result<T>
where
    T: FromStr,
    T::Err: Into<Box<dyn std::error::Error + Send + Sync>>,
{
    T::from_str(raw).map_err(|e| {
        rusqlite::Error::FromSqlConversionFailure(index, rusqlite::types::Type::Text, e.into())
    })
}

#[derive(Debug, Default, Clone, PartialEq, Eq)]
pub struct TransactionStats {
    pub total: usize,
    pub pending: usize,
    pub confirmed: usize,
    pub failed: usize,
    pub earliest_block: Option<u64>,
    pub latest_block: Option<u64>,
}
