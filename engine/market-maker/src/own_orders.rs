//! Index of the orders this process has resting on the exchange
//!
//! Every entry carries the reservation it holds in the [`BalanceLedger`].
//! Inserting reserves and removing releases, both while the index lock is
//! held, so the ledger's reserved totals always equal the sum over the index.

use account_service::{BalanceLedger, LedgerError, Reservation};
use chrono::{DateTime, Utc};
use exchange_client::OrderId;
use parking_lot::Mutex;
use reference_book::{Market, Side};
use rust_decimal::Decimal;
use serde::{Deserialize, Serialize};
use std::collections::BTreeMap;
use std::sync::Arc;
use tracing::{debug, error};

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct OwnOrder {
    pub id: OrderId,
    pub bot_id: u64,
    pub account: String,
    pub market: Market,
    pub side: Side,
    pub price: Decimal,
    pub amount: Decimal,
    /// What is still reserved for this order
    pub reservation: Reservation,
    pub placed_at: DateTime<Utc>,
}

impl OwnOrder {
    pub fn new(id: OrderId, bot_id: u64, account: &str, market: Market, side: Side, price: Decimal, amount: Decimal) -> Self {
        let reservation = Reservation::for_order(account, &market, side, price, amount);
        Self {
            id,
            bot_id,
            account: account.to_string(),
            market,
            side,
            price,
            amount,
            reservation,
            placed_at: Utc::now(),
        }
    }

    /// Whether a new order at `price` on `side` would trade against this one
    pub fn crossed_by(&self, side: Side, price: Decimal) -> bool {
        match (side, self.side) {
            (Side::Sell, Side::Buy) => self.price >= price,
            (Side::Buy, Side::Sell) => self.price <= price,
            _ => false,
        }
    }
}

/// Fills can arrive before the placing cycle has recorded its order. At most
/// this many such fills are kept for the order to pick up on insert.
const MAX_UNMATCHED_FILLS: usize = 256;

#[derive(Debug, Clone, Copy)]
struct UnmatchedFill {
    paid: Decimal,
    is_open: bool,
}

#[derive(Default)]
struct IndexState {
    orders: BTreeMap<OrderId, OwnOrder>,
    unmatched: BTreeMap<OrderId, UnmatchedFill>,
}

pub struct OwnOrderIndex {
    ledger: Arc<BalanceLedger>,
    state: Mutex<IndexState>,
}

impl OwnOrderIndex {
    pub fn new(ledger: Arc<BalanceLedger>) -> Self {
        Self { ledger, state: Mutex::new(IndexState::default()) }
    }

    pub fn ledger(&self) -> &Arc<BalanceLedger> {
        &self.ledger
    }

    /// Record a placed order and reserve its notional. Fills already seen
    /// for its id are deducted first; returns `None` when those fills closed
    /// the order, in which case nothing is reserved or recorded. On a failed
    /// reservation nothing is recorded either.
    pub fn insert(&self, mut order: OwnOrder) -> Result<Option<OwnOrder>, LedgerError> {
        let mut state = self.state.lock();
        let early = state.unmatched.get(&order.id).copied();
        if let Some(fill) = early {
            if !fill.is_open {
                state.unmatched.remove(&order.id);
                debug!("Order {} of bot {} was filled before it was recorded", order.id, order.bot_id);
                return Ok(None);
            }
            order.reservation = order.reservation.reduced_by(fill.paid.max(Decimal::ZERO));
        }

        let reservation = &order.reservation;
        if !reservation.amount.is_zero() {
            self.ledger.reserve(&reservation.account, &reservation.coin, reservation.amount)?;
        }
        state.unmatched.remove(&order.id);
        debug!("Recorded order {} of bot {} reserving {:?}", order.id, order.bot_id, order.reservation);
        state.orders.insert(order.id, order.clone());
        Ok(Some(order))
    }

    /// Drop an order and release what it still reserves
    pub fn remove(&self, id: OrderId) -> Option<OwnOrder> {
        let mut state = self.state.lock();
        let order = state.orders.remove(&id)?;
        self.release(&order.reservation);
        debug!("Dropped order {} of bot {}", order.id, order.bot_id);
        Some(order)
    }

    fn release(&self, reservation: &Reservation) {
        if reservation.amount.is_zero() {
            return;
        }
        if let Err(e) = self.ledger.release(&reservation.account, &reservation.coin, reservation.amount) {
            error!("Reservation {:?} could not be released: {}", reservation, e);
        }
    }

    /// Account for a fill notification on one of our orders: release what
    /// was paid, capped at what remains reserved, and drop the order once it
    /// is no longer open. A fill for an id not in the index is kept until
    /// that order is inserted.
    pub fn apply_fill(&self, id: OrderId, paid: Decimal, is_open: bool) -> Option<OwnOrder> {
        let mut guard = self.state.lock();
        let state = &mut *guard;
        let Some(order) = state.orders.get_mut(&id) else {
            Self::remember_unmatched(&mut state.unmatched, id, paid, is_open);
            return None;
        };
        let released = paid.min(order.reservation.amount).max(Decimal::ZERO);
        let reduced = order.reservation.reduced_by(released);
        self.release(&Reservation { amount: released, ..order.reservation.clone() });
        order.reservation = reduced;

        if is_open {
            return Some(order.clone());
        }
        let order = state.orders.remove(&id)?;
        self.release(&order.reservation);
        debug!("Order {} of bot {} filled", order.id, order.bot_id);
        Some(order)
    }

    fn remember_unmatched(unmatched: &mut BTreeMap<OrderId, UnmatchedFill>, id: OrderId, paid: Decimal, is_open: bool) {
        let fill = unmatched.entry(id).or_insert(UnmatchedFill { paid: Decimal::ZERO, is_open: true });
        fill.paid += paid;
        fill.is_open &= is_open;
        // exchange ids grow, so the oldest fills go first
        while unmatched.len() > MAX_UNMATCHED_FILLS {
            unmatched.pop_first();
        }
    }

    pub fn get(&self, id: OrderId) -> Option<OwnOrder> {
        self.state.lock().orders.get(&id).cloned()
    }

    /// The resting order of a bot, if any
    pub fn for_bot(&self, bot_id: u64) -> Option<OwnOrder> {
        self.state.lock().orders.values().find(|o| o.bot_id == bot_id).cloned()
    }

    /// Own orders on `market` that a new order on `side` at `price` would cross
    pub fn crossing(&self, market: &Market, side: Side, price: Decimal) -> Vec<OwnOrder> {
        self.state
            .lock()
            .orders
            .values()
            .filter(|o| &o.market == market && o.crossed_by(side, price))
            .cloned()
            .collect()
    }

    pub fn list(&self) -> Vec<OwnOrder> {
        self.state.lock().orders.values().cloned().collect()
    }

    /// Sum of what the index holds reserved for one (account, coin)
    pub fn reserved_total(&self, account: &str, coin: &str) -> Decimal {
        let coin = coin.to_uppercase();
        self.state
            .lock()
            .orders
            .values()
            .filter(|o| o.reservation.account == account && o.reservation.coin == coin)
            .map(|o| o.reservation.amount)
            .sum()
    }

    pub fn len(&self) -> usize {
        self.state.lock().orders.len()
    }

    pub fn is_empty(&self) -> bool {
        self.state.lock().orders.is_empty()
    }
}
