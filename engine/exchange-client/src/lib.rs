//! Trading exchange client
//!
//! [`ExchangeApi`] is the order, balance and webhook surface of the exchange
//! the bots trade on. [`HttpExchangeClient`] talks to the real REST API;
//! [`SimulatedExchange`] keeps everything in memory for dry runs and tests.

pub mod client;
pub mod error;
pub mod messages;
pub mod simulated;

pub use client::{ExchangeApi, HttpExchangeClient, PRODUCTION_URL, STAGING_URL};
pub use error::{ExchangeError, Result};
pub use messages::{CoinBalance, OpenOrder, OrderId, OrderRequest, Webhook};
pub use simulated::{SimulatedExchange, SimulatedOrder};
