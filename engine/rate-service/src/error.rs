//! Error types for the rate service

use thiserror::Error;

#[derive(Error, Debug)]
pub enum RateError {
    #[error("HTTP error: {0}")]
    Http(#[from] reqwest::Error),

    #[error("Rate source returned status {status}: {body}")]
    Status { status: u16, body: String },

    #[error("Unable to decode rate response: {0}")]
    Decode(String),

    #[error("Currency {0} missing from rate response")]
    MissingCurrency(String),

    #[error("Invalid rate for {currency}: {rate}")]
    InvalidRate { currency: String, rate: String },

    #[error("No rate cached for {0}")]
    Unavailable(String),

    #[error("Rate refresh failed {failures} times in a row, last error: {last}")]
    Exhausted { failures: u32, last: String },
}

pub type Result<T> = std::result::Result<T, RateError>;
