//! Price-level book for one market, plus the per-feed set of books

use crate::{BookError, PriceLevel, Result, Side};
use parking_lot::RwLock;
use rust_decimal::Decimal;
use serde::{Deserialize, Serialize};
use std::cmp::Reverse;
use std::collections::{BTreeMap, HashMap};
use std::sync::Arc;
use tracing::debug;

/// Best bid and best ask of a book.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub struct Ticker {
    pub best_bid: Decimal,
    pub best_ask: Decimal,
}

/// Both ladders keyed so that iteration starts at the best price.
#[derive(Debug, Default)]
struct Ladders {
    bids: BTreeMap<Reverse<Decimal>, Decimal>,
    asks: BTreeMap<Decimal, Decimal>,
}

impl Ladders {
    fn upsert(&mut self, side: Side, price: Decimal, size: Decimal) -> Result<()> {
        if price <= Decimal::ZERO || size < Decimal::ZERO {
            return Err(BookError::InvalidLevel { price, size });
        }
        match (side, size.is_zero()) {
            (Side::Buy, true) => {
                self.bids.remove(&Reverse(price));
            }
            (Side::Buy, false) => {
                self.bids.insert(Reverse(price), size);
            }
            (Side::Sell, true) => {
                self.asks.remove(&price);
            }
            (Side::Sell, false) => {
                self.asks.insert(price, size);
            }
        }
        Ok(())
    }

    fn best(&self, side: Side) -> Option<PriceLevel> {
        match side {
            Side::Buy => self.bids.iter().next().map(|(p, s)| PriceLevel::new(p.0, *s)),
            Side::Sell => self.asks.iter().next().map(|(p, s)| PriceLevel::new(*p, *s)),
        }
    }

    /// Levels of one side from the best price outward.
    fn walk(&self, side: Side) -> Box<dyn Iterator<Item = PriceLevel> + '_> {
        match side {
            Side::Buy => Box::new(self.bids.iter().map(|(p, s)| PriceLevel::new(p.0, *s))),
            Side::Sell => Box::new(self.asks.iter().map(|(p, s)| PriceLevel::new(*p, *s))),
        }
    }

    fn crossed(&self) -> Option<(Decimal, Decimal)> {
        match (self.best(Side::Buy), self.best(Side::Sell)) {
            (Some(bid), Some(ask)) if bid.price >= ask.price => Some((bid.price, ask.price)),
            _ => None,
        }
    }

    fn clear(&mut self) {
        self.bids.clear();
        self.asks.clear();
    }
}

/// Bid/ask price-level book for one market.
///
/// All mutation happens under the write lock, so readers see either the
/// whole of a batch or none of it. A batch that leaves the book crossed is
/// rejected and the book is cleared in the same critical section; a crossed
/// book is never observable by readers.
#[derive(Debug)]
pub struct PriceLevelBook {
    market: String,
    ladders: RwLock<Ladders>,
}

impl PriceLevelBook {
    /// Create an empty book
    pub fn new(market: impl Into<String>) -> Self {
        Self { market: market.into().to_uppercase(), ladders: RwLock::new(Ladders::default()) }
    }

    pub fn market(&self) -> &str {
        &self.market
    }

    /// Insert, overwrite or (with `size == 0`) remove one level.
    pub fn upsert(&self, side: Side, price: Decimal, size: Decimal) -> Result<()> {
        self.ladders.write().upsert(side, price, size)
    }

    /// Apply an incremental batch atomically and check the book is still
    /// uncrossed. On a crossed result the book is cleared.
    pub fn apply_changes(&self, changes: &[(Side, Decimal, Decimal)]) -> Result<()> {
        let mut ladders = self.ladders.write();
        for (side, price, size) in changes {
            if let Err(e) = ladders.upsert(*side, *price, *size) {
                ladders.clear();
                return Err(e);
            }
        }
        if let Some((bid, ask)) = ladders.crossed() {
            ladders.clear();
            return Err(BookError::Crossed { bid, ask });
        }
        Ok(())
    }

    /// Replace the whole book with a snapshot.
    pub fn apply_snapshot(&self, bids: &[PriceLevel], asks: &[PriceLevel]) -> Result<()> {
        let mut ladders = self.ladders.write();
        ladders.clear();
        let levels = bids
            .iter()
            .map(|l| (Side::Buy, l))
            .chain(asks.iter().map(|l| (Side::Sell, l)));
        for (side, level) in levels {
            if let Err(e) = ladders.upsert(side, level.price, level.size) {
                ladders.clear();
                return Err(e);
            }
        }
        if let Some((bid, ask)) = ladders.crossed() {
            ladders.clear();
            return Err(BookError::Crossed { bid, ask });
        }
        debug!(
            "{} snapshot applied: {} bids, {} asks",
            self.market,
            ladders.bids.len(),
            ladders.asks.len()
        );
        Ok(())
    }

    /// Drop every level, used when the upstream feed is desynchronized.
    pub fn reset(&self) {
        self.ladders.write().clear();
    }

    pub fn best_bid(&self) -> Option<PriceLevel> {
        self.ladders.read().best(Side::Buy)
    }

    pub fn best_ask(&self) -> Option<PriceLevel> {
        self.ladders.read().best(Side::Sell)
    }

    /// Best bid and ask read under one lock.
    pub fn ticker(&self) -> Result<Ticker> {
        let ladders = self.ladders.read();
        let bid = ladders.best(Side::Buy).ok_or(BookError::EmptySide(Side::Buy))?;
        let ask = ladders.best(Side::Sell).ok_or(BookError::EmptySide(Side::Sell))?;
        Ok(Ticker { best_bid: bid.price, best_ask: ask.price })
    }

    /// Worst price a taker on `taker_side` needs to clear `target` size.
    ///
    /// A taker sell walks the bids, a taker buy walks the asks. Returns the
    /// price of the level where the cumulative size first reaches `target`,
    /// the last level's price if the whole side is thinner than `target`, or
    /// `None` when that side has no levels.
    pub fn depth_price(&self, taker_side: Side, target: Decimal) -> Option<Decimal> {
        let ladders = self.ladders.read();
        let mut cumulative = Decimal::ZERO;
        let mut last = None;
        for level in ladders.walk(taker_side.opposite()) {
            cumulative += level.size;
            last = Some(level.price);
            if cumulative >= target {
                break;
            }
        }
        last
    }

    /// Up to `limit` levels of a side, best first.
    pub fn levels(&self, side: Side, limit: usize) -> Vec<PriceLevel> {
        self.ladders.read().walk(side).take(limit).collect()
    }

    /// Number of levels on a side
    pub fn depth(&self, side: Side) -> usize {
        let ladders = self.ladders.read();
        match side {
            Side::Buy => ladders.bids.len(),
            Side::Sell => ladders.asks.len(),
        }
    }

    pub fn is_empty(&self) -> bool {
        let ladders = self.ladders.read();
        ladders.bids.is_empty() && ladders.asks.is_empty()
    }

    pub fn is_crossed(&self) -> bool {
        self.ladders.read().crossed().is_some()
    }
}

/// The fixed set of books mirrored by one feed, keyed by market.
#[derive(Debug, Default)]
pub struct MarketBooks {
    books: HashMap<String, Arc<PriceLevelBook>>,
}

impl MarketBooks {
    pub fn new<I, S>(markets: I) -> Self
    where
        I: IntoIterator<Item = S>,
        S: Into<String>,
    {
        let books = markets
            .into_iter()
            .map(|m| {
                let book = Arc::new(PriceLevelBook::new(m));
                (book.market().to_string(), book)
            })
            .collect();
        Self { books }
    }

    /// Look up a book; market identifiers are case-insensitive.
    pub fn get(&self, market: &str) -> Result<Arc<PriceLevelBook>> {
        self.books
            .get(&market.trim().to_uppercase())
            .cloned()
            .ok_or_else(|| BookError::UnknownMarket(market.to_string()))
    }

    /// Market identifiers, sorted
    pub fn markets(&self) -> Vec<String> {
        let mut markets: Vec<String> = self.books.keys().cloned().collect();
        markets.sort();
        markets
    }

    pub fn reset_all(&self) {
        for book in self.books.values() {
            book.reset();
        }
    }
}
