//! Market Maker service
//!
//! Runs limit order bots on the trading exchange. Each bot quotes one side of
//! one market at a depth price of the reference exchange's book, converted to
//! the bot's quote currency, and reserves the coin its order locks in a local
//! balance ledger that the exchange's webhooks keep current.

pub mod config;
pub mod engine;
pub mod error;
pub mod models;
pub mod own_orders;
pub mod persistence;
pub mod prices;
pub mod registry;
pub mod rest_api;
pub mod service;
pub mod startup;


pub use config::MarketMakerConfig;
pub use engine::{BotEngine, CycleAction, CycleOutcome};
pub use error::{BotError, Result};
pub use models::{Bot, BotUpdate};
pub use own_orders::{OwnOrder, OwnOrderIndex};
pub use persistence::BotStore;
pub use prices::{FeedPriceClient, PriceSource, Pricer, RemoteRateSource};
pub use registry::BotRegistry;
pub use rest_api::{create_routes, AppState};
pub use service::MarketMakerService;
