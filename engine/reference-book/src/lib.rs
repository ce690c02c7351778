//! Reference order book
//!
//! In-memory mirror of the reference exchange's level-2 book. One
//! [`PriceLevelBook`] is kept per market; the feed is its only writer and the
//! query service and bot loops read from it concurrently.

pub mod book;
pub mod error;
pub mod level;
pub mod market;

pub use book::{MarketBooks, PriceLevelBook, Ticker};
pub use error::BookError;
pub use level::PriceLevel;
pub use market::{Market, Side};

/// Result type alias
pub type Result<T> = std::result::Result<T, BookError>;
