//! Error types for the reference book

use crate::market::Side;
use rust_decimal::Decimal;
use thiserror::Error;

#[derive(Error, Debug, Clone, PartialEq, Eq)]
pub enum BookError {
    #[error("Unknown market: {0}")]
    UnknownMarket(String),

    #[error("Invalid market identifier: {0}, expected BASE-QUOTE")]
    InvalidMarket(String),

    #[error("Invalid side: {0}, must be 'buy' or 'sell'")]
    InvalidSide(String),

    #[error("Invalid price level: price {price}, size {size}")]
    InvalidLevel { price: Decimal, size: Decimal },

    #[error("Crossed book: best bid {bid} >= best ask {ask}")]
    Crossed { bid: Decimal, ask: Decimal },

    #[error("No liquidity on the {0} side of the book")]
    EmptySide(Side),
}
