//! ReferenceFeed - mirrors the reference exchange's level2 books
//!
//! Connects to the reference exchange WebSocket, keeps one
//! [`reference_book::PriceLevelBook`] per subscribed market and serves ticker
//! and depth-price queries over HTTP.

pub mod config;
pub mod error;
pub mod feed;
pub mod messages;
pub mod query;
pub mod server;

pub use config::FeedConfig;
pub use error::{FeedError, FeedResult};
pub use feed::{FeedSession, FeedState, FeedStatus, ReferenceBookFeed};
pub use query::{PriceQueryService, SpreadQuote};
pub use server::{create_routes, ApiResponse, SpreadPriceResponse, TickerResponse};
