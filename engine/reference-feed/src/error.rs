//! Error types for the reference feed

use reference_book::{BookError, Side};
use thiserror::Error;

/// Errors that can occur while mirroring or querying the reference book
#[derive(Error, Debug)]
pub enum FeedError {
    #[error("WebSocket error: {0}")]
    WebSocket(#[from] tokio_tungstenite::tungstenite::Error),

    #[error("Serialization error: {0}")]
    Serialization(#[from] serde_json::Error),

    #[error("Invalid feed URL: {0}")]
    InvalidUrl(#[from] url::ParseError),

    #[error("Book error: {0}")]
    Book(#[from] BookError),

    #[error("Update for {0} arrived before its snapshot")]
    OutOfOrder(String),

    #[error("Book for {market} desynchronized: {source}")]
    Desync { market: String, source: BookError },

    #[error("Upstream error: {0}")]
    Upstream(String),

    #[error("Connection closed by upstream")]
    ConnectionClosed,

    #[error("Invalid decimal value: {0}")]
    InvalidDecimal(String),

    #[error("Invalid depth: {0}, must be a positive decimal")]
    InvalidDepth(String),

    #[error("No liquidity on {market} for a {side} bot")]
    NoLiquidity { market: String, side: Side },

    #[error("Configuration error: {0}")]
    Config(String),
}

/// Result type for feed operations
pub type FeedResult<T> = Result<T, FeedError>;
