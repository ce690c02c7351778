//! RateService - fiat exchange rate cache
//!
//! Keeps the latest Open Exchange Rates quote for one currency (MXN per USD
//! by default), refreshed on a fixed interval, and serves it over HTTP. The
//! [`ExchangeRateCache`] and [`RateSource`] trait are also used in-process by
//! the market maker.

pub mod cache;
pub mod config;
pub mod error;
pub mod refresher;
pub mod server;
pub mod source;

#[cfg(test)]
mod testing;

pub use cache::{ExchangeRate, ExchangeRateCache};
pub use config::RateServiceConfig;
pub use error::{RateError, Result};
pub use refresher::{RateRefresher, RefreshPolicy};
pub use server::{create_routes, RateResponse};
pub use source::{OpenExchangeRatesSource, RateSource};
