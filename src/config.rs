use anyhow::{Context, Result};
use std::fmt;
use std::str::FromStr;
use std::time::Duration;

/// Transport used to reach the node.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ConnectionType {
    Ipc,
    WebSocket,
    Http,
}

impl ConnectionType {
    /// Whether the transport can push new block headers.
    pub fn supports_push(&self) -> bool {
        matches!(self, ConnectionType::Ipc | ConnectionType::WebSocket)
    }

    /// Only websocket connections are re-established after a drop.
    pub fn supports_reconnect(&self) -> bool {
        matches!(self, ConnectionType::WebSocket)
    }
}

impl FromStr for ConnectionType {
    type Err = anyhow::Error;

    fn from_str(s: &str) -> Result<Self> {
        match s.trim().to_lowercase().as_str() {
            "ipc" => Ok(ConnectionType::Ipc),
            "websocket" | "ws" => Ok(ConnectionType::WebSocket),
            "http" => Ok(ConnectionType::Http),
            other => anyhow::bail!("Unknown connection type: {other}"),
        }
    }
}

impl fmt::Display for ConnectionType {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let name = match self {
            ConnectionType::Ipc => "ipc",
            ConnectionType::WebSocket => "websocket",
            ConnectionType::Http => "http",
        };
        f.write_str(name)
    }
}

#[derive(Debug, Clone)]
pub struct Config {
    pub connection_type: ConnectionType,
    pub node_url: String,
    pub database_url: String,
    pub start_block: u64,
    pub reorg_margin: u64,
    pub sweep_interval: Duration,
    pub block_concurrency: usize,
    pub transaction_concurrency: usize,
    pub reconnect_interval: Duration,
    pub pending_recheck_limit: usize,
}

impl Config {
    pub fn from_env() -> Result<Self> {
        dotenv::dotenv().ok();

        let connection_type = std::env::var("CONNECTION_TYPE")
            .context("CONNECTION_TYPE must be set in .env")?
            .parse::<ConnectionType>()
            .context("Invalid CONNECTION_TYPE")?;

        let node_url = std::env::var("NODE_URL").context("NODE_URL must be set in .env")?;

        let database_url = std::env::var("DATABASE_URL")
            .unwrap_or_else(|_| "sqlite:./indexer.db".to_string());

        Ok(Config {
            connection_type,
            node_url,
            database_url,
            start_block: env_or("START_BLOCK", 0)?,
            reorg_margin: env_or("REORG_MARGIN", 5)?,
            sweep_interval: Duration::from_secs(env_or("SWEEP_INTERVAL_SECS", 30)?),
            block_concurrency: env_or("BLOCK_CONCURRENCY", 3)?,
            transaction_concurrency: env_or("TRANSACTION_CONCURRENCY", 4)?,
            reconnect_interval: Duration::from_secs(env_or("RECONNECT_INTERVAL_SECS", 5)?),
            pending_recheck_limit: env_or("PENDING_RECHECK_LIMIT", 200)?,
        })
    }
}

fn env_or<T>(key: &str, default: T) -> Result<T>
where
    T: FromStr,
    T::Err: std::error::Error + Send + Sync + 'static,
{
    match std::env::var(key) {
        Ok(raw) => raw
            .trim()
            .parse()
            .with_context(|| format!("Invalid value for {key}: {raw}")),
        Err(_) => Ok(default),
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn parses_known_connection_types() {
        assert_eq!("ipc".parse::<ConnectionType>().unwrap(), ConnectionType::Ipc);
        assert_eq!(
            "WebSocket".parse::<ConnectionType>().unwrap(),
            ConnectionType::WebSocket
        );
        assert_eq!("http".parse::<ConnectionType>().unwrap(), ConnectionType::Http);
    }

    #[test]
    fn rejects_unknown_connection_type() {
        let err = "grpc".parse::<ConnectionType>().unwrap_err();
        assert!(err.to_string().contains("grpc"));
    }

    #[test]
    fn only_websocket_reconnects() {
        assert!(ConnectionType::WebSocket.supports_reconnect());
        assert!(!ConnectionType::Ipc.supports_reconnect());
        assert!(ConnectionType::Ipc.supports_push());
        assert!(!ConnectionType::Http.supports_push());
    }
}
