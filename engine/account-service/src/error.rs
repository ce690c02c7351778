//! Error types for the balance ledger

use reference_book::BookError;
use rust_decimal::Decimal;
use thiserror::Error;

#[derive(Error, Debug, Clone, PartialEq, Eq)]
pub enum LedgerError {
    #[error("Insufficient balance for {account}/{coin}: required {required}, available {available}")]
    InsufficientBalance { account: String, coin: String, required: Decimal, available: Decimal },

    #[error("Release of {amount} {coin} for {account} exceeds reserved {reserved}")]
    ReleaseExceedsReserved { account: String, coin: String, amount: Decimal, reserved: Decimal },

    #[error("Invalid amount: {0}, must not be negative")]
    InvalidAmount(Decimal),

    #[error("Unknown account: {0}")]
    UnknownAccount(String),

    #[error("Unknown webhook event type: {0}")]
    UnknownEventType(String),

    #[error("Invalid webhook event: {0}")]
    InvalidEvent(String),

    #[error("Invalid market: {0}")]
    Market(#[from] BookError),

    #[error("Invalid configuration: {message}")]
    InvalidConfig { message: String },
}
