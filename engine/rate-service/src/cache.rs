//! Exchange rate cache

use crate::source::RateSource;
use crate::{RateError, Result};
use chrono::{DateTime, Utc};
use parking_lot::RwLock;
use rust_decimal::Decimal;
use serde::{Deserialize, Serialize};
use tracing::{info, warn};

/// Last successfully fetched rate
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct ExchangeRate {
    pub currency: String,
    pub rate: Decimal,
    pub updated_at: DateTime<Utc>,
}

/// Holds one currency's rate, replaced wholesale on every successful refresh
#[derive(Debug)]
pub struct ExchangeRateCache {
    currency: String,
    current: RwLock<Option<ExchangeRate>>,
}

impl ExchangeRateCache {
    /// Create an empty cache for `currency`
    pub fn new(currency: &str) -> Self {
        Self { currency: currency.to_uppercase(), current: RwLock::new(None) }
    }

    pub fn currency(&self) -> &str {
        &self.currency
    }

    /// Fetch from `source` and replace the cached value.
    ///
    /// On failure the previous value is kept and the error returned.
    pub async fn refresh(&self, source: &dyn RateSource) -> Result<Decimal> {
        let rate = match source.fetch_rate(&self.currency).await {
            Ok(rate) if rate > Decimal::ZERO => rate,
            Ok(rate) => {
                return Err(RateError::InvalidRate {
                    currency: self.currency.clone(),
                    rate: rate.to_string(),
                })
            }
            Err(e) => {
                warn!("Refresh of {} rate failed, keeping previous value: {}", self.currency, e);
                return Err(e);
            }
        };

        *self.current.write() =
            Some(ExchangeRate { currency: self.currency.clone(), rate, updated_at: Utc::now() });
        info!("{} exchange rate updated to {}", self.currency, rate);
        Ok(rate)
    }

    /// Last cached rate, if any refresh has succeeded
    pub fn get(&self) -> Option<Decimal> {
        self.current.read().as_ref().map(|r| r.rate)
    }

    pub fn snapshot(&self) -> Option<ExchangeRate> {
        self.current.read().clone()
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::testing::ScriptedSource;
    use rust_decimal_macros::dec;

    #[tokio::test]
    async fn test_refresh_replaces_value() {
        let cache = ExchangeRateCache::new("mxn");
        assert_eq!(cache.get(), None);

        let source = ScriptedSource::new(vec![Ok(dec!(19.5)), Ok(dec!(20.1))]);
        assert_eq!(cache.refresh(&source).await.unwrap(), dec!(19.5));
        assert_eq!(cache.get(), Some(dec!(19.5)));
        cache.refresh(&source).await.unwrap();
        assert_eq!(cache.get(), Some(dec!(20.1)));
        assert_eq!(cache.snapshot().unwrap().currency, "MXN");
        assert_eq!(source.requests(), vec!["MXN".to_string(), "MXN".to_string()]);
    }

    #[tokio::test]
    async fn test_failed_refresh_keeps_previous_value() {
        let cache = ExchangeRateCache::new("MXN");
        let source = ScriptedSource::new(vec![
            Ok(dec!(19.5)),
            Err(RateError::Status { status: 500, body: "down".into() }),
            Ok(dec!(0)),
        ]);
        cache.refresh(&source).await.unwrap();

        assert!(cache.refresh(&source).await.is_err());
        assert_eq!(cache.get(), Some(dec!(19.5)));

        assert!(matches!(cache.refresh(&source).await, Err(RateError::InvalidRate { .. })));
        assert_eq!(cache.get(), Some(dec!(19.5)));
    }
}
