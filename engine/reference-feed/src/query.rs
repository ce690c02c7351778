//! Ticker and depth-price queries over the mirrored books

use crate::error::{FeedError, FeedResult};
use reference_book::{MarketBooks, Side, Ticker};
use rust_decimal::Decimal;
use std::str::FromStr;
use std::sync::Arc;

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct SpreadQuote {
    pub side: Side,
    pub depth: Decimal,
    pub price: Decimal,
}

/// Read-only query surface used by the bots
#[derive(Clone)]
pub struct PriceQueryService {
    books: Arc<MarketBooks>,
}

impl PriceQueryService {
    pub fn new(books: Arc<MarketBooks>) -> Self {
        Self { books }
    }

    /// Best bid and ask for a market
    pub fn get_ticker(&self, market: &str) -> FeedResult<Ticker> {
        Ok(self.books.get(market)?.ticker()?)
    }

    /// Depth price for a bot on `side` quoting `depth` units deep.
    ///
    /// A buy bot is priced off the bids and a sell bot off the asks, walking
    /// `depth` units from the best level outward.
    pub fn get_spread_price(&self, market: &str, side: &str, depth: &str) -> FeedResult<Decimal> {
        self.spread_quote(market, side, depth).map(|quote| quote.price)
    }

    /// Same as [`Self::get_spread_price`], with the parsed side and depth
    pub fn spread_quote(&self, market: &str, side: &str, depth: &str) -> FeedResult<SpreadQuote> {
        let side = Side::from_str(side)?;
        let depth = match Decimal::from_str(depth.trim()) {
            Ok(depth) if depth > Decimal::ZERO => depth.normalize(),
            _ => return Err(FeedError::InvalidDepth(depth.to_string())),
        };
        let book = self.books.get(market)?;

        let price = book
            .depth_price(side.opposite(), depth)
            .ok_or_else(|| FeedError::NoLiquidity { market: book.market().to_string(), side })?;
        Ok(SpreadQuote { side, depth, price })
    }

    pub fn markets(&self) -> Vec<String> {
        self.books.markets()
    }
}
