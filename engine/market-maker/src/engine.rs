//! One reconciliation cycle of a bot
//!
//! A cycle sizes and prices the bot's order, keeps the resting order when
//! the price moved less than the bot's variance gate, and otherwise cancels
//! the old order and every own order the new one would cross before placing
//! the replacement. Cancels always happen before the placement, and cycles
//! of bots on the same market run one at a time.

use crate::error::{BotError, Result};
use crate::models::Bot;
use crate::own_orders::{OwnOrder, OwnOrderIndex};
use crate::prices::{Pricer, PRICE_DECIMALS};
use account_service::BalanceLedger;
use exchange_client::{ExchangeApi, OrderId, OrderRequest};
use parking_lot::Mutex;
use reference_book::{Market, Side};
use rust_decimal::{Decimal, RoundingStrategy};
use std::collections::HashMap;
use std::sync::Arc;
use tracing::{debug, error, info, warn};

#[derive(Debug, Clone, PartialEq, Eq)]
pub enum CycleAction {
    /// The resting order was close enough to the target and kept
    Held { order: OwnOrder, target: Decimal },
    /// A new order was placed
    Placed { order: OwnOrder },
    /// A new order was placed and filled before it could be recorded
    Filled { order: OwnOrder },
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct CycleOutcome {
    pub action: CycleAction,
    /// Non-fatal failures, such as a cancel the exchange rejected
    pub warnings: Vec<String>,
}

/// Order size for `spendable` balance of the locked coin. Buy bots hold the
/// quote coin, so their size is converted to base units at `price`.
pub fn order_amount(side: Side, spendable: Decimal, size_pct: Decimal, price: Decimal) -> Decimal {
    let committed = spendable * size_pct;
    let amount = match side {
        Side::Sell => committed,
        Side::Buy if price > Decimal::ZERO => committed / price,
        Side::Buy => Decimal::ZERO,
    };
    amount.round_dp_with_strategy(PRICE_DECIMALS, RoundingStrategy::ToZero)
}

/// Whether moving from `current` to `target` passes the variance gate
pub fn exceeds_variance(current: Decimal, target: Decimal, min_variance: Decimal) -> bool {
    if current <= Decimal::ZERO {
        return true;
    }
    (target - current).abs() / current >= min_variance
}

pub struct BotEngine {
    exchange: Arc<dyn ExchangeApi>,
    orders: Arc<OwnOrderIndex>,
    pricer: Pricer,
    /// Serialises the cancel, scan, place and record steps per market
    market_locks: Mutex<HashMap<Market, Arc<tokio::sync::Mutex<()>>>>,
}

impl BotEngine {
    pub fn new(exchange: Arc<dyn ExchangeApi>, orders: Arc<OwnOrderIndex>, pricer: Pricer) -> Self {
        Self { exchange, orders, pricer, market_locks: Mutex::new(HashMap::new()) }
    }

    fn market_lock(&self, market: &Market) -> Arc<tokio::sync::Mutex<()>> {
        self.market_locks.lock().entry(market.clone()).or_default().clone()
    }

    pub fn exchange(&self) -> &Arc<dyn ExchangeApi> {
        &self.exchange
    }

    pub fn orders(&self) -> &Arc<OwnOrderIndex> {
        &self.orders
    }

    pub fn ledger(&self) -> &Arc<BalanceLedger> {
        self.orders.ledger()
    }

    pub fn pricer(&self) -> &Pricer {
        &self.pricer
    }

    pub async fn run_cycle(&self, bot: &Bot) -> Result<CycleOutcome> {
        // An opposite bot on the same market waits until our order is
        // recorded, so its crossing scan sees it
        let market_lock = self.market_lock(&bot.market);
        let _guard = market_lock.lock().await;

        let current = self.orders.for_bot(bot.id);

        // The bot's own reservation is released before its replacement is placed
        let coin = bot.locked_coin();
        let mut spendable = self.ledger().spendable(&bot.account, coin);
        if let Some(order) = &current {
            spendable += order.reservation.amount;
        }

        let price = self.pricer.target_price(&bot.market, bot.side, bot.spread_depth, bot.bias).await?;
        let amount = order_amount(bot.side, spendable, bot.size_pct, price);

        if let Some(order) = &current {
            if !exceeds_variance(order.price, price, bot.min_price_variance) {
                debug!("Bot {} keeps order {} at {} (target {})", bot.id, order.id, order.price, price);
                return Ok(CycleOutcome {
                    action: CycleAction::Held { order: order.clone(), target: price },
                    warnings: Vec::new(),
                });
            }
        }

        if price <= Decimal::ZERO {
            return Err(BotError::InvalidOrder(format!("price {} for bot {} is not positive", price, bot.id)));
        }
        if amount <= Decimal::ZERO {
            return Err(BotError::InvalidOrder(format!(
                "bot {} has no spendable {} in {} (spendable {})",
                bot.id, coin, bot.account, spendable
            )));
        }

        let mut warnings = Vec::new();
        if let Some(order) = current {
            if let Err(e) = self.cancel(&order).await {
                warnings.push(format!("cancel of order {} failed: {}", order.id, e));
            }
        }

        for order in self.orders.crossing(&bot.market, bot.side, price) {
            info!(
                "Bot {} cancels own {} order {} at {} crossing new {} at {}",
                bot.id, order.side, order.id, order.price, bot.side, price
            );
            if let Err(e) = self.cancel(&order).await {
                warnings.push(format!("cancel of crossing order {} failed: {}", order.id, e));
            }
        }

        let request = OrderRequest::limit(bot.market.clone(), bot.side, price, amount);
        let id = self.exchange.place_order(&bot.account, &request).await?;
        let order = OwnOrder::new(id, bot.id, &bot.account, bot.market.clone(), bot.side, price, amount);
        let order = match self.orders.insert(order.clone()) {
            Ok(Some(order)) => order,
            Ok(None) => {
                info!("Bot {} order {} filled before it was recorded", bot.id, id);
                return Ok(CycleOutcome { action: CycleAction::Filled { order }, warnings });
            }
            Err(e) => {
                error!("Bot {} cannot reserve for order {}: {}", bot.id, id, e);
                if let Err(cancel) = self.exchange.close_order(&bot.account, id).await {
                    error!("Order {} is resting without a reservation: {}", id, cancel);
                }
                return Err(e.into());
            }
        };

        info!(
            "Bot {} placed {} {} {} @ {} as order {} (spendable {})",
            bot.id, bot.market, bot.side, amount, price, id, spendable
        );
        Ok(CycleOutcome { action: CycleAction::Placed { order }, warnings })
    }

    /// Cancel the bot's resting order, if any. Calling it again is a no-op.
    pub async fn retire(&self, bot_id: u64) -> Result<Option<OrderId>> {
        match self.orders.for_bot(bot_id) {
            Some(order) => {
                info!("Retiring order {} of bot {}", order.id, bot_id);
                self.cancel(&order).await?;
                Ok(Some(order.id))
            }
            None => Ok(None),
        }
    }

    /// Cancel remotely and drop from the index. The reservation is released
    /// even when the exchange rejects the cancel; the exchange stays
    /// authoritative for the order itself.
    async fn cancel(&self, order: &OwnOrder) -> Result<()> {
        let result = self.exchange.close_order(&order.account, order.id).await;
        self.orders.remove(order.id);
        if let Err(e) = &result {
            warn!("Exchange rejected cancel of order {} ({}): {}", order.id, order.account, e);
        }
        result.map_err(BotError::from)
    }
}
