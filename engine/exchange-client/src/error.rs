//! Error types for the exchange client

use crate::messages::OrderId;
use thiserror::Error;

#[derive(Error, Debug)]
pub enum ExchangeError {
    #[error("HTTP error: {0}")]
    Http(#[from] reqwest::Error),

    #[error("Failed to decode exchange response: {0}")]
    Decode(String),

    #[error("Exchange rejected request: {0}")]
    Rejected(String),

    #[error("No API token for account {0}")]
    UnknownAccount(String),

    #[error("Order {0} is not open")]
    UnknownOrder(OrderId),

    #[error("Invalid order: {0}")]
    InvalidOrder(String),
}

/// Result type alias
pub type Result<T> = std::result::Result<T, ExchangeError>;
