pub mod chain;
pub mod config;
pub mod decoder;
pub mod events;
pub mod executor;
pub mod query;
pub mod reconciler;
pub mod repository;
pub mod rpc;
pub mod wallet_index;
pub mod watcher;
