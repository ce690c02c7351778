//! Rate sources

use crate::{RateError, Result};
use async_trait::async_trait;
use rust_decimal::Decimal;
use serde::Deserialize;
use std::collections::HashMap;
use std::str::FromStr;
use std::time::Duration;
use tracing::debug;

/// Anything that can quote units of `currency` per anchor currency
#[async_trait]
pub trait RateSource: Send + Sync {
    async fn fetch_rate(&self, currency: &str) -> Result<Decimal>;
}

/// Open Exchange Rates `latest.json` endpoint (USD anchored)
pub struct OpenExchangeRatesSource {
    client: reqwest::Client,
    base_url: String,
    app_id: String,
}

#[derive(Debug, Deserialize)]
struct LatestResponse {
    #[serde(default)]
    rates: HashMap<String, serde_json::Number>,
}

impl OpenExchangeRatesSource {
    pub fn new(base_url: impl Into<String>, app_id: impl Into<String>, timeout: Duration) -> Result<Self> {
        let client = reqwest::Client::builder().timeout(timeout).build()?;
        Ok(Self { client, base_url: base_url.into(), app_id: app_id.into() })
    }
}

/// Parse a JSON number into a decimal without going through `f64` math
pub fn decimal_from_number(number: &serde_json::Number) -> Option<Decimal> {
    let text = number.to_string();
    Decimal::from_str(&text).or_else(|_| Decimal::from_scientific(&text)).ok()
}

#[async_trait]
impl RateSource for OpenExchangeRatesSource {
    async fn fetch_rate(&self, currency: &str) -> Result<Decimal> {
        let url = format!("{}/api/latest.json", self.base_url.trim_end_matches('/'));
        let response = self.client.get(&url).query(&[("app_id", &self.app_id)]).send().await?;

        let status = response.status();
        if !status.is_success() {
            let body = response.text().await.unwrap_or_default();
            return Err(RateError::Status { status: status.as_u16(), body });
        }

        let body = response.text().await?;
        let latest: LatestResponse =
            serde_json::from_str(&body).map_err(|e| RateError::Decode(e.to_string()))?;
        let currency = currency.to_uppercase();
        let number = latest
            .rates
            .get(&currency)
            .ok_or_else(|| RateError::MissingCurrency(currency.clone()))?;

        let rate = decimal_from_number(number)
            .filter(|rate| *rate > Decimal::ZERO)
            .ok_or_else(|| RateError::InvalidRate { currency: currency.clone(), rate: number.to_string() })?;
        debug!("Open Exchange Rates {} = {}", currency, rate);
        Ok(rate)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use rust_decimal_macros::dec;

    #[test]
    fn test_decimal_from_number() {
        let number: serde_json::Number = serde_json::from_str("19.8765").unwrap();
        assert_eq!(decimal_from_number(&number), Some(dec!(19.8765)));

        let number: serde_json::Number = serde_json::from_str("20").unwrap();
        assert_eq!(decimal_from_number(&number), Some(dec!(20)));

        let number: serde_json::Number = serde_json::from_str("1.5e-5").unwrap();
        assert_eq!(decimal_from_number(&number), Some(dec!(0.000015)));
    }

    #[test]
    fn test_latest_response_shape() {
        let body = r#"{"disclaimer":"...","timestamp":1449877801,"base":"USD","rates":{"MXN":17.252,"EUR":0.91}}"#;
        let latest: LatestResponse = serde_json::from_str(body).unwrap();
        assert_eq!(decimal_from_number(&latest.rates["MXN"]), Some(dec!(17.252)));
    }
}
