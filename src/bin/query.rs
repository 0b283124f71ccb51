use anyhow::Result;
use clap::{Parser, Subcommand};
use wallet_tx_indexer::query::commands::{
    TransactionQuery, cmd_add_wallet, cmd_show, cmd_stats, cmd_transactions, cmd_wallets,
};
use wallet_tx_indexer::query::formatters::OutputFormat;
use wallet_tx_indexer::repository::{Database, TransactionRepository, WalletRepository};

#[derive(Parser)]
#[command(name = "query")]
#[command(about = "Query reconciled wallet transactions", long_about = None)]
struct Cli {
    #[arg(short, long, default_value = "table")]
    format: String,

    #[arg(long, env = "DATABASE_URL", default_value = "sqlite:./indexer.db")]
    database_url: String,

    #[command(subcommand)]
    command: Commands,
}

#[derive(Subcommand)]
enum Commands {
    Transactions {
        #[arg(long)]
        status: Option<String>,

        #[arg(long)]
        address: Option<String>,

        #[arg(long, default_value = "100")]
        limit: usize,

        #[arg(long, default_value = "0")]
        offset: usize,
    },
    Show {
        hash: String,
    },
    Stats,
    Wallets,
    AddWallet {
        owner_id: i64,
        address: String,
        #[arg(long = "token")]
        tokens: Vec<String>,
    },
}

fn main() -> Result<()> {
    dotenv::dotenv().ok();
    let cli = Cli::parse();
    let format = OutputFormat::from(cli.format.as_str());

    let db = Database::new(&cli.database_url)?;
    let conn = db.conn()?;
    let transaction_repo = TransactionRepository::new(&conn);
    let wallet_repo = WalletRepository::new(&conn);

    match cli.command {
        Commands::Transactions {
            status,
            address,
            limit,
            offset,
        } => {
            let query = TransactionQuery {
                status,
                address,
                limit,
                offset,
            };
            cmd_transactions(&transaction_repo, query, &format)?;
        }
        Commands::Show { hash } => {
            cmd_show(&transaction_repo, &hash, &format)?;
        }
        Commands::Stats => {
            cmd_stats(&transaction_repo, &format)?;
        }
        Commands::Wallets => {
            cmd_wallets(&wallet_repo, &format)?;
        }
        Commands::AddWallet {
            owner_id,
            address,
            tokens,
        } => {
            cmd_add_wallet(&wallet_repo, owner_id, &address, &tokens)?;
        }
    }

    Ok(())
}
