//! Configuration for the reference feed service

use anyhow::{Context, Result};
use serde::{Deserialize, Serialize};
use std::net::SocketAddr;
use std::path::Path;
use std::time::Duration;

/// Main configuration for the reference feed
#[derive(Debug, Clone, Serialize, Deserialize, Default)]
#[serde(default)]
pub struct FeedConfig {
    /// Upstream connection settings
    pub upstream: UpstreamConfig,

    /// Query server settings
    pub server: ServerConfig,
}

/// Upstream WebSocket settings
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct UpstreamConfig {
    /// WebSocket endpoint of the reference exchange
    pub ws_url: String,

    /// Markets to mirror
    pub markets: Vec<String>,

    /// Channels requested in the subscribe message
    pub channels: Vec<String>,

    /// First reconnect delay in milliseconds
    pub initial_backoff_ms: u64,

    /// Reconnect delay cap in seconds
    pub max_backoff_secs: u64,
}

/// HTTP query server settings
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct ServerConfig {
    pub host: String,
    pub port: u16,
}

impl Default for UpstreamConfig {
    fn default() -> Self {
        Self {
            ws_url: "wss://ws-feed.pro.coinbase.com".to_string(),
            markets: ["BTC-USD", "LTC-USD", "BCH-USD", "XLM-USD", "DASH-USD"]
                .iter()
                .map(|m| m.to_string())
                .collect(),
            channels: vec!["level2".to_string(), "heartbeat".to_string()],
            initial_backoff_ms: 1_000,
            max_backoff_secs: 60,
        }
    }
}

impl Default for ServerConfig {
    fn default() -> Self {
        Self { host: "0.0.0.0".to_string(), port: 2222 }
    }
}

impl FeedConfig {
    /// Load from an optional TOML file, then apply environment overrides
    pub fn load(path: Option<&Path>) -> Result<Self> {
        let mut config = match path {
            Some(path) => Self::load_from_file(path)?,
            None => Self::default(),
        };
        config.apply_env()?;
        Ok(config)
    }

    /// Load configuration from file
    pub fn load_from_file(path: &Path) -> Result<Self> {
        let content = std::fs::read_to_string(path)
            .with_context(|| format!("Failed to read config file {}", path.display()))?;
        toml::from_str(&content)
            .with_context(|| format!("Failed to parse config file {}", path.display()))
    }

    fn apply_env(&mut self) -> Result<()> {
        if let Ok(url) = std::env::var("REFERENCE_FEED_URL") {
            self.upstream.ws_url = url;
        }

        if let Ok(markets) = std::env::var("REFERENCE_FEED_MARKETS") {
            self.upstream.markets = markets
                .split(',')
                .map(|m| m.trim().to_uppercase())
                .filter(|m| !m.is_empty())
                .collect();
        }

        if let Ok(host) = std::env::var("REFERENCE_FEED_HOST") {
            self.server.host = host;
        }

        if let Ok(port) = std::env::var("REFERENCE_FEED_PORT") {
            self.server.port = port.parse().context("Invalid REFERENCE_FEED_PORT")?;
        }

        Ok(())
    }

    /// Get the server address
    pub fn server_addr(&self) -> Result<SocketAddr> {
        format!("{}:{}", self.server.host, self.server.port)
            .parse()
            .context("Invalid server address")
    }

    pub fn initial_backoff(&self) -> Duration {
        Duration::from_millis(self.upstream.initial_backoff_ms)
    }

    pub fn max_backoff(&self) -> Duration {
        Duration::from_secs(self.upstream.max_backoff_secs)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::io::Write;

    #[test]
    fn test_defaults() {
        let config = FeedConfig::default();
        assert_eq!(config.upstream.markets.len(), 5);
        assert_eq!(config.initial_backoff(), Duration::from_secs(1));
        assert_eq!(config.max_backoff(), Duration::from_secs(60));
        assert_eq!(config.server_addr().unwrap().port(), 2222);
    }

    #[test]
    fn test_partial_toml_file() {
        let mut file = tempfile::NamedTempFile::new().unwrap();
        writeln!(file, "[upstream]\nmarkets = [\"BTC-USD\"]\n\n[server]\nport = 3000").unwrap();

        let config = FeedConfig::load_from_file(file.path()).unwrap();
        assert_eq!(config.upstream.markets, vec!["BTC-USD".to_string()]);
        assert_eq!(config.upstream.ws_url, "wss://ws-feed.pro.coinbase.com");
        assert_eq!(config.server.port, 3000);
        assert_eq!(config.server.host, "0.0.0.0");
    }
}
