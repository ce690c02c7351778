//! Configuration for the rate service

use crate::refresher::RefreshPolicy;
use anyhow::{Context, Result};
use serde::{Deserialize, Serialize};
use std::net::SocketAddr;
use std::path::{Path, PathBuf};
use std::time::Duration;

#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct RateServiceConfig {
    /// Currency quoted per USD
    pub currency: String,

    /// Open Exchange Rates base URL
    pub source_url: String,

    /// Request timeout in seconds
    pub request_timeout_secs: u64,

    /// JSON credentials file holding `openexchangerates_token`
    pub credentials_file: PathBuf,

    pub refresh: RefreshPolicy,

    pub host: String,
    pub port: u16,
}

impl Default for RateServiceConfig {
    fn default() -> Self {
        Self {
            currency: "MXN".to_string(),
            source_url: "http://openexchangerates.org".to_string(),
            request_timeout_secs: 60,
            credentials_file: PathBuf::from("credentials.json"),
            refresh: RefreshPolicy::default(),
            host: "0.0.0.0".to_string(),
            port: 2223,
        }
    }
}

/// The part of the shared credentials file this service reads
#[derive(Debug, Clone, Deserialize)]
pub struct RateCredentials {
    pub openexchangerates_token: String,
}

impl RateServiceConfig {
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

        if let Ok(currency) = std::env::var("RATE_SERVICE_CURRENCY") {
            config.currency = currency.to_uppercase();
        }
        if let Ok(file) = std::env::var("RATE_SERVICE_CREDENTIALS") {
            config.credentials_file = PathBuf::from(file);
        }
        if let Ok(port) = std::env::var("RATE_SERVICE_PORT") {
            config.port = port.parse().context("Invalid RATE_SERVICE_PORT")?;
        }
        if let Ok(interval) = std::env::var("RATE_SERVICE_INTERVAL_SECS") {
            config.refresh.interval_secs =
                interval.parse().context("Invalid RATE_SERVICE_INTERVAL_SECS")?;
        }

        Ok(config)
    }

    /// Read the API token from the credentials file, or `OPENEXCHANGERATES_TOKEN`
    pub fn api_token(&self) -> Result<String> {
        if let Ok(token) = std::env::var("OPENEXCHANGERATES_TOKEN") {
            return Ok(token);
        }
        let content = std::fs::read_to_string(&self.credentials_file).with_context(|| {
            format!("Failed to read credentials file {}", self.credentials_file.display())
        })?;
        let credentials: RateCredentials =
            serde_json::from_str(&content).context("Failed to parse credentials file")?;
        Ok(credentials.openexchangerates_token)
    }

    pub fn server_addr(&self) -> Result<SocketAddr> {
        format!("{}:{}", self.host, self.port).parse().context("Invalid server address")
    }

    pub fn request_timeout(&self) -> Duration {
        Duration::from_secs(self.request_timeout_secs)
    }
}
