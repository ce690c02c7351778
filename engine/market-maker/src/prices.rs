//! Reference prices and the fiat rate, as the bots see them

use crate::error::{BotError, Result};
use async_trait::async_trait;
use rate_service::{ExchangeRateCache, RateError, RateResponse, RateSource};
use reference_book::{Market, Side, Ticker};
use reference_feed::{ApiResponse, SpreadPriceResponse, TickerResponse};
use rust_decimal::{Decimal, RoundingStrategy};
use serde::de::DeserializeOwned;
use std::sync::Arc;
use std::time::Duration;
use tracing::debug;

/// Prices are sent to the exchange with this many decimals
pub const PRICE_DECIMALS: u32 = 8;

/// Depth prices of the reference markets
#[async_trait]
pub trait PriceSource: Send + Sync {
    async fn ticker(&self, market: &Market) -> Result<Ticker>;

    /// Depth price for a bot quoting `side`
    async fn spread_price(&self, market: &Market, side: Side, depth: Decimal) -> Result<Decimal>;
}

/// Client of the reference feed query service
pub struct FeedPriceClient {
    client: reqwest::Client,
    base_url: String,
}

impl FeedPriceClient {
    pub fn new(base_url: impl Into<String>, timeout: Duration) -> Result<Self> {
        let client = reqwest::Client::builder().timeout(timeout).build()?;
        Ok(Self { client, base_url: base_url.into().trim_end_matches('/').to_string() })
    }

    async fn query<T: DeserializeOwned>(&self, market: &Market, request: reqwest::RequestBuilder) -> Result<T> {
        let unavailable = |message: String| BotError::PriceUnavailable { market: market.to_string(), message };
        let response = request.send().await?;
        let body: ApiResponse<T> = response.json().await?;
        if !body.success {
            return Err(unavailable(body.message));
        }
        body.data.ok_or_else(|| unavailable("empty response".to_string()))
    }
}

#[async_trait]
impl PriceSource for FeedPriceClient {
    async fn ticker(&self, market: &Market) -> Result<Ticker> {
        let url = format!("{}/ticker/{}", self.base_url, market);
        let ticker: TickerResponse = self.query(market, self.client.get(&url)).await?;
        Ok(Ticker { best_bid: ticker.best_bid, best_ask: ticker.best_ask })
    }

    async fn spread_price(&self, market: &Market, side: Side, depth: Decimal) -> Result<Decimal> {
        let url = format!("{}/spread/{}", self.base_url, market);
        let request = self
            .client
            .get(&url)
            .query(&[("side", side.as_str().to_string()), ("depth", depth.to_string())]);
        let spread: SpreadPriceResponse = self.query(market, request).await?;
        Ok(spread.price)
    }
}

/// Rate source backed by the rate service, used to refresh the local cache
pub struct RemoteRateSource {
    client: reqwest::Client,
    base_url: String,
}

impl RemoteRateSource {
    pub fn new(base_url: impl Into<String>, timeout: Duration) -> Result<Self> {
        let client = reqwest::Client::builder().timeout(timeout).build()?;
        Ok(Self { client, base_url: base_url.into().trim_end_matches('/').to_string() })
    }
}

#[async_trait]
impl RateSource for RemoteRateSource {
    async fn fetch_rate(&self, currency: &str) -> rate_service::Result<Decimal> {
        let url = format!("{}/rate/{}", self.base_url, currency);
        let response = self.client.get(&url).send().await?;
        let body: RateResponse = response.json().await?;
        match body.data {
            Some(rate) if body.success => Ok(rate.rate),
            _ => Err(RateError::Unavailable(body.message)),
        }
    }
}

/// Turns reference depth prices into bot prices: maps fiat-quoted markets
/// onto the reference quote, converts through the cached rate and applies
/// the bot's bias.
#[derive(Clone)]
pub struct Pricer {
    source: Arc<dyn PriceSource>,
    rates: Arc<ExchangeRateCache>,
    fiat_quote: String,
    reference_quote: String,
}

impl Pricer {
    pub fn new(
        source: Arc<dyn PriceSource>,
        rates: Arc<ExchangeRateCache>,
        fiat_quote: &str,
        reference_quote: &str,
    ) -> Self {
        Self {
            source,
            rates,
            fiat_quote: fiat_quote.to_uppercase(),
            reference_quote: reference_quote.to_uppercase(),
        }
    }

    /// Reference market and conversion factor for a bot market
    fn reference(&self, market: &Market) -> Result<(Market, Decimal)> {
        if market.quote() != self.fiat_quote {
            return Ok((market.clone(), Decimal::ONE));
        }
        let rate = self.rates.get().ok_or_else(|| BotError::RateUnavailable(self.fiat_quote.clone()))?;
        Ok((market.with_quote(&self.reference_quote), rate))
    }

    /// Bot price for quoting `side` at `depth`, rounded to exchange precision
    pub async fn target_price(&self, market: &Market, side: Side, depth: Decimal, bias: Decimal) -> Result<Decimal> {
        let (reference, rate) = self.reference(market)?;
        let depth_price = self.source.spread_price(&reference, side, depth).await?;
        let price = (depth_price * rate * (Decimal::ONE + bias))
            .round_dp_with_strategy(PRICE_DECIMALS, RoundingStrategy::MidpointNearestEven);
        debug!("{} {} depth {} on {} = {} -> {}", market, side, depth, reference, depth_price, price);
        Ok(price)
    }

    /// Reference ticker expressed in the bot market's quote currency
    pub async fn ticker(&self, market: &Market) -> Result<Ticker> {
        let (reference, rate) = self.reference(market)?;
        let ticker = self.source.ticker(&reference).await?;
        Ok(Ticker { best_bid: ticker.best_bid * rate, best_ask: ticker.best_ask * rate })
    }
}

#[cfg(test)]
pub(crate) mod testing {
    use super::*;
    use parking_lot::Mutex;
    use std::collections::HashMap;

    /// Fixed prices per (market, side), changeable between cycles
    #[derive(Default)]
    pub struct StaticPrices {
        prices: Mutex<HashMap<(String, Side), Decimal>>,
    }

    impl StaticPrices {
        pub fn set(&self, market: &str, side: Side, price: Decimal) {
            self.prices.lock().insert((market.to_uppercase(), side), price);
        }
    }

    #[async_trait]
    impl PriceSource for StaticPrices {
        async fn ticker(&self, market: &Market) -> Result<Ticker> {
            let prices = self.prices.lock();
            let key = market.to_string();
            match (prices.get(&(key.clone(), Side::Buy)), prices.get(&(key, Side::Sell))) {
                (Some(bid), Some(ask)) => Ok(Ticker { best_bid: *bid, best_ask: *ask }),
                _ => Err(BotError::NoLiquidity { market: market.to_string(), side: Side::Buy }),
            }
        }

        async fn spread_price(&self, market: &Market, side: Side, _depth: Decimal) -> Result<Decimal> {
            self.prices
                .lock()
                .get(&(market.to_string(), side))
                .copied()
                .ok_or_else(|| BotError::NoLiquidity { market: market.to_string(), side })
        }
    }
}
