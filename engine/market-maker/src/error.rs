//! Error types for the market maker

use account_service::LedgerError;
use exchange_client::ExchangeError;
use rate_service::RateError;
use reference_book::{BookError, Side};
use thiserror::Error;

#[derive(Error, Debug)]
pub enum BotError {
    #[error("Bot {0} not found")]
    NotFound(u64),

    #[error("Invalid bot: {0}")]
    InvalidBot(String),

    #[error("Unknown account: {0}")]
    UnknownAccount(String),

    #[error("Invalid order: {0}")]
    InvalidOrder(String),

    #[error("Price unavailable for {market}: {message}")]
    PriceUnavailable { market: String, message: String },

    #[error("No liquidity for {side} on {market}")]
    NoLiquidity { market: String, side: Side },

    #[error("No exchange rate cached for {0}")]
    RateUnavailable(String),

    #[error("Ledger error: {0}")]
    Ledger(#[from] LedgerError),

    #[error("Exchange error: {0}")]
    Exchange(#[from] ExchangeError),

    #[error("Market error: {0}")]
    Market(#[from] BookError),

    #[error("Rate error: {0}")]
    Rate(#[from] RateError),

    #[error("HTTP error: {0}")]
    Http(#[from] reqwest::Error),

    #[error("Persistence error: {0}")]
    Persistence(String),
}

/// Result type alias
pub type Result<T> = std::result::Result<T, BotError>;
