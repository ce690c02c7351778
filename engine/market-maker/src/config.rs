use anyhow::{Context, Result};
use rate_service::RefreshPolicy;
use rust_decimal::Decimal;
use serde::{Deserialize, Serialize};
use std::net::SocketAddr;
use std::path::{Path, PathBuf};
use std::time::Duration;

/// Market Maker configuration
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct MarketMakerConfig {
    pub server: ServerConfig,
    pub prices: PriceConfig,
    pub exchange: ExchangeConfig,

    /// JSON credentials file with the exchange API tokens
    pub credentials_file: PathBuf,

    /// Where bots are saved on shutdown and restored from on start
    pub bots_file: PathBuf,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct ServerConfig {
    pub host: String,
    pub port: u16,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct PriceConfig {
    /// Reference feed query service
    pub feed_url: String,

    /// Rate service
    pub rate_url: String,

    /// Quote currency of the bot markets that is priced through the rate
    pub fiat_quote: String,

    /// Quote currency of the reference markets
    pub reference_quote: String,

    /// Timeout of a single price or rate request in seconds
    pub request_timeout_secs: u64,

    /// Local rate cache refresh policy
    pub rate_refresh: RefreshPolicy,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct ExchangeConfig {
    /// Replace the exchange with an in-memory simulation
    pub dry_run: bool,

    /// Overrides the production/staging URL picked from the credentials
    pub base_url: Option<String>,

    /// Timeout of a single exchange request in seconds
    pub request_timeout_secs: u64,

    /// Register balance webhooks at startup
    pub register_webhooks: bool,

    /// Balances the simulated exchange starts with
    pub simulated_balances: Vec<SimulatedBalance>,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct SimulatedBalance {
    pub account: String,
    pub coin: String,
    pub available: Decimal,
}

impl Default for ServerConfig {
    fn default() -> Self {
        Self { host: "0.0.0.0".to_string(), port: 9090 }
    }
}

impl Default for PriceConfig {
    fn default() -> Self {
        Self {
            feed_url: "http://127.0.0.1:2222".to_string(),
            rate_url: "http://127.0.0.1:2223".to_string(),
            fiat_quote: "MXN".to_string(),
            reference_quote: "USD".to_string(),
            request_timeout_secs: 10,
            rate_refresh: RefreshPolicy { interval_secs: 5 * 60, ..RefreshPolicy::default() },
        }
    }
}

impl Default for ExchangeConfig {
    fn default() -> Self {
        Self {
            dry_run: false,
            base_url: None,
            request_timeout_secs: 10,
            register_webhooks: true,
            simulated_balances: Vec::new(),
        }
    }
}

impl Default for MarketMakerConfig {
    fn default() -> Self {
        Self {
            server: ServerConfig::default(),
            prices: PriceConfig::default(),
            exchange: ExchangeConfig::default(),
            credentials_file: PathBuf::from("credentials.json"),
            bots_file: PathBuf::from("bots.json"),
        }
    }
}

impl MarketMakerConfig {
    /// Load from an optional TOML file, then apply environment overrides
    pub fn load(path: Option<&Path>) -> Result<Self> {
        let mut config = match path {
            Some(path) => {
                let content = std::fs::read_to_string(path)
                    .with_context(|| format!("Failed to read config file {}", path.display()))?;
                toml::from_str(&content)
                    .with_context(|| format!("Failed to parse config file {}", path.display()))?
            }
            None => Self::default(),
        };
        config.apply_env()?;
        Ok(config)
    }

    fn apply_env(&mut self) -> Result<()> {
        if let Ok(port) = std::env::var("MARKET_MAKER_PORT") {
            self.server.port = port.parse().context("MARKET_MAKER_PORT must be a port number")?;
        }
        if let Ok(url) = std::env::var("MARKET_MAKER_FEED_URL") {
            self.prices.feed_url = url;
        }
        if let Ok(url) = std::env::var("MARKET_MAKER_RATE_URL") {
            self.prices.rate_url = url;
        }
        if let Ok(path) = std::env::var("MARKET_MAKER_CREDENTIALS") {
            self.credentials_file = PathBuf::from(path);
        }
        if let Ok(path) = std::env::var("MARKET_MAKER_BOTS_FILE") {
            self.bots_file = PathBuf::from(path);
        }
        if let Ok(dry_run) = std::env::var("MARKET_MAKER_DRY_RUN") {
            self.exchange.dry_run = dry_run.parse().context("MARKET_MAKER_DRY_RUN must be true or false")?;
        }
        Ok(())
    }

    pub fn server_addr(&self) -> Result<SocketAddr> {
        format!("{}:{}", self.server.host, self.server.port)
            .parse()
            .context("Invalid server address")
    }

    pub fn price_timeout(&self) -> Duration {
        Duration::from_secs(self.prices.request_timeout_secs)
    }

    pub fn exchange_timeout(&self) -> Duration {
        Duration::from_secs(self.exchange.request_timeout_secs)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use rust_decimal_macros::dec;
    use std::io::Write;
    use tempfile::NamedTempFile;

    #[test]
    fn test_defaults() {
        let config = MarketMakerConfig::default();
        assert_eq!(config.server.port, 9090);
        assert_eq!(config.prices.fiat_quote, "MXN");
        assert_eq!(config.prices.rate_refresh.interval(), Duration::from_secs(300));
        assert_eq!(config.exchange_timeout(), Duration::from_secs(10));
        assert!(!config.exchange.dry_run);
    }

    #[test]
    fn test_load_from_file() {
        let mut file = NamedTempFile::new().unwrap();
        writeln!(
            file,
            r#"
bots_file = "/tmp/bots.json"

[prices]
feed_url = "http://feed:2222"

[exchange]
dry_run = true

[[exchange.simulated_balances]]
account = "main"
coin = "BTC"
available = "1.5"
"#
        )
        .unwrap();

        let config = MarketMakerConfig::load(Some(file.path())).unwrap();
        assert_eq!(config.bots_file, PathBuf::from("/tmp/bots.json"));
        assert_eq!(config.prices.feed_url, "http://feed:2222");
        assert_eq!(config.prices.reference_quote, "USD");
        assert!(config.exchange.dry_run);
        assert_eq!(config.exchange.simulated_balances[0].available, dec!(1.5));
    }
}
