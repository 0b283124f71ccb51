pub mod database;
pub mod models;
pub mod store;
pub mod transaction_repository;
pub mod wallet_repository;

pub use database::Database;
pub use models::{Transaction, TransactionKind, TransactionStatus, Wallet};
pub use store::{TransactionStore, WalletStore};
pub use transaction_repository::{TransactionRepository, TransactionStats};
pub use wallet_repository::WalletRepository;
