use crate::repository::{Transaction, TransactionStats, Wallet};
use comfy_table::{Cell, Table, modifiers::UTF8_ROUND_CORNERS, presets::UTF8_FULL};
use csv::Writer;
use serde_json::json;

#[derive(Debug, Clone, PartialEq, Eq)]
pub enum OutputFormat {
    Table,
    Json,
    Csv,
}

impl From<&str> for OutputFormat {
    fn from(s: &str) -> Self {
        match s.to_lowercase().as_str() {
            "json" => OutputFormat::Json,
            "csv" => OutputFormat::Csv,
            _ => OutputFormat::Table,
        }
    }
}

pub fn format_transactions(transactions: &[Transaction], format: &OutputFormat) -> String {
    match format {
        OutputFormat::Table => format_transactions_table(transactions),
        OutputFormat::Json => serde_json::to_string_pretty(transactions)
            .unwrap_or_else(|_| "[]".to_string()),
        OutputFormat::Csv => format_transactions_csv(transactions),
    }
}

fn format_transactions_table(transactions: &[Transaction]) -> String {
    if transactions.is_empty() {
        return "No transactions found.".to_string();
    }

    let mut table = Table::new();
    table
        .load_preset(UTF8_FULL)
        .apply_modifier(UTF8_ROUND_CORNERS)
        .set_header(vec![
            "Block",
            "Status",
            "Type",
            "From",
            "To",
            "Amount",
            "Raw Amount",
            "Token",
            "Tx Hash",
        ]);

    for tx in transactions {
        table.add_row(vec![
            Cell::new(tx.block_number),
            Cell::new(tx.status),
            Cell::new(tx.kind),
            Cell::new(format!("{:#}", tx.from_address)),
            Cell::new(format!("{:#}", tx.to_address)),
            Cell::new(&tx.amount),
            Cell::new(&tx.raw_amount),
            Cell::new(
                tx.contract_address
                    .map_or("-".to_string(), |address| format!("{address:#}")),
            ),
            Cell::new(format_tx_hash(&format!("{:?}", tx.hash))),
        ]);
    }

    table.to_string()
}

fn format_transactions_csv(transactions: &[Transaction]) -> String {
    let mut wtr = Writer::from_writer(vec![]);

    let _ = wtr.write_record([
        "hash",
        "status",
        "type",
        "from",
        "to",
        "amount",
        "raw_amount",
        "contract_address",
        "block_number",
        "timestamp",
    ]);

    for tx in transactions {
        let _ = wtr.write_record([
            format!("{:?}", tx.hash),
            tx.status.to_string(),
            tx.kind.to_string(),
            format!("{:?}", tx.from_address),
            format!("{:?}", tx.to_address),
            tx.amount.clone(),
            tx.raw_amount.clone(),
            tx.contract_address
                .map_or(String::new(), |address| format!("{address:?}")),
            tx.block_number.to_string(),
            tx.timestamp.to_string(),
        ]);
    }

    String::from_utf8(wtr.into_inner().unwrap_or_default()).unwrap_or_default()
}

pub fn format_transaction_detail(transaction: &Transaction, format: &OutputFormat) -> String {
    match format {
        OutputFormat::Table => {
            let mut table = Table::new();
            table
                .load_preset(UTF8_FULL)
                .apply_modifier(UTF8_ROUND_CORNERS)
                .set_header(vec!["Field", "Value"]);

            let rows = [
                ("Hash", format!("{:?}", transaction.hash)),
                ("Status", transaction.status.to_string()),
                ("Type", transaction.kind.to_string()),
                ("From", format!("{:?}", transaction.from_address)),
                ("To", format!("{:?}", transaction.to_address)),
                ("Amount", transaction.amount.clone()),
                ("Raw Amount", transaction.raw_amount.clone()),
                (
                    "Token",
                    transaction
                        .contract_address
                        .map_or("-".to_string(), |address| format!("{address:?}")),
                ),
                ("Block", transaction.block_number.to_string()),
                ("Timestamp", transaction.timestamp.to_string()),
                ("Details", transaction.details.to_string()),
            ];
            for (field, value) in rows {
                table.add_row(vec![Cell::new(field), Cell::new(value)]);
            }
            table.to_string()
        }
        OutputFormat::Json => {
            serde_json::to_string_pretty(transaction).unwrap_or_else(|_| "{}".to_string())
        }
        OutputFormat::Csv => format_transactions_csv(std::slice::from_ref(transaction)),
    }
}

pub fn format_wallets(wallets: &[Wallet], format: &OutputFormat) -> String {
    match format {
        OutputFormat::Table => {
            if wallets.is_empty() {
                return "No wallets registered.".to_string();
            }
            let mut table = Table::new();
            table
                .load_preset(UTF8_FULL)
                .apply_modifier(UTF8_ROUND_CORNERS)
                .set_header(vec!["Id", "Owner", "Address", "Tokens"]);
            for wallet in wallets {
                table.add_row(vec![
                    Cell::new(wallet.id),
                    Cell::new(wallet.owner_id),
                    Cell::new(format!("{:#}", wallet.address)),
                    Cell::new(wallet.monitored_tokens.len()),
                ]);
            }
            table.to_string()
        }
        OutputFormat::Json => {
            serde_json::to_string_pretty(wallets).unwrap_or_else(|_| "[]".to_string())
        }
        OutputFormat::Csv => {
            let mut wtr = Writer::from_writer(vec![]);
            let _ = wtr.write_record(["id", "owner_id", "address", "monitored_tokens"]);
            for wallet in wallets {
                let tokens: Vec<String> = wallet
                    .monitored_tokens
                    .iter()
                    .map(|token| format!("{token:?}"))
                    .collect();
                let _ = wtr.write_record([
                    &wallet.id.to_string(),
                    &wallet.owner_id.to_string(),
                    &format!("{:?}", wallet.address),
                    &tokens.join(";"),
                ]);
            }
            String::from_utf8(wtr.into_inner().unwrap_or_default()).unwrap_or_default()
        }
    }
}

pub fn format_stats(stats: &TransactionStats, format: &OutputFormat) -> String {
    let block_or_na = |block: Option<u64>| block.map_or("N/A".to_string(), |b| b.to_string());

    match format {
        OutputFormat::Table => {
            let mut table = Table::new();
            table
                .load_preset(UTF8_FULL)
                .apply_modifier(UTF8_ROUND_CORNERS)
                .set_header(vec!["Metric", "Value"]);

            table.add_row(vec![Cell::new("Total Transactions"), Cell::new(stats.total)]);
            table.add_row(vec![Cell::new("Pending"), Cell::new(stats.pending)]);
            table.add_row(vec![Cell::new("Confirmed"), Cell::new(stats.confirmed)]);
            table.add_row(vec![Cell::new("Failed"), Cell::new(stats.failed)]);
            table.add_row(vec![
                Cell::new("Earliest Block"),
                Cell::new(block_or_na(stats.earliest_block)),
            ]);
            table.add_row(vec![
                Cell::new("Latest Block"),
                Cell::new(block_or_na(stats.latest_block)),
            ]);

            table.to_string()
        }
        OutputFormat::Json => serde_json::to_string_pretty(&json!({
            "total": stats.total,
            "pending": stats.pending,
            "confirmed": stats.confirmed,
            "failed": stats.failed,
            "earliest_block": stats.earliest_block,
            "latest_block": stats.latest_block,
        }))
        .unwrap_or_else(|_| "{}".to_string()),
        OutputFormat::Csv => {
            let mut wtr = Writer::from_writer(vec![]);
            let _ = wtr.write_record(["metric", "value"]);
            let _ = wtr.write_record(["total", &stats.total.to_string()]);
            let _ = wtr.write_record(["pending", &stats.pending.to_string()]);
            let _ = wtr.write_record(["confirmed", &stats.confirmed.to_string()]);
            let _ = wtr.write_record(["failed", &stats.failed.to_string()]);
            let _ = wtr.write_record(["earliest_block", &block_or_na(stats.earliest_block)]);
            let _ = wtr.write_record(["latest_block", &block_or_na(stats.latest_block)]);
            String::from_utf8(wtr.into_inner().unwrap_or_default()).unwrap_or_default()
        }
    }
}

fn format_tx_hash(hash: &str) -> String {
    format!("{}...{}", &hash[..6], &hash[hash.len() - 4..])
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::repository::{TransactionKind, TransactionStatus};
    use alloy_primitives::{Address, B256};

    fn sample() -> Transaction {
        Transaction {
            hash: B256::repeat_byte(0xab),
            status: TransactionStatus::Confirmed,
            kind: TransactionKind::Erc20Transfer,
            from_address: Address::repeat_byte(0x11),
            to_address: Address::repeat_byte(0x22),
            amount: "12.5".to_string(),
            raw_amount: "12500000000000000000".to_string(),
            contract_address: Some(Address::repeat_byte(0x33)),
            block_number: 42,
            timestamp: 1_700_000_000,
            details: json!({}),
        }
    }

    #[test]
    fn csv_has_header_and_row() {
        let csv = format_transactions(&[sample()], &OutputFormat::Csv);
        let lines: Vec<&str> = csv.lines().collect();

        assert_eq!(lines.len(), 2);
        assert!(lines[0].starts_with("hash,status,type"));
        assert!(lines[1].contains(",confirmed,erc20_transfer,"));
        assert!(lines[1].contains(",12.5,12500000000000000000,"));
    }

    #[test]
    fn json_uses_snake_case_enums() {
        let out = format_transactions(&[sample()], &OutputFormat::Json);
        let value: serde_json::Value = serde_json::from_str(&out).unwrap();

        assert_eq!(value[0]["status"], "confirmed");
        assert_eq!(value[0]["kind"], "erc20_transfer");
        assert_eq!(value[0]["block_number"], 42);
    }

    #[test]
    fn empty_table_message() {
        assert_eq!(
            format_transactions(&[], &OutputFormat::Table),
            "No transactions found."
        );
    }

    #[test]
    fn unknown_format_falls_back_to_table() {
        assert_eq!(OutputFormat::from("xml"), OutputFormat::Table);
        assert_eq!(OutputFormat::from("JSON"), OutputFormat::Json);
    }
}
