//! In-memory exchange for dry runs and tests
//!
//! Orders rest until closed or filled through [`SimulatedExchange::fill`].
//! Failures can be scripted per operation to exercise error paths.

use crate::client::ExchangeApi;
use crate::messages::{CoinBalance, OpenOrder, OrderId, OrderRequest, Webhook};
use crate::{ExchangeError, Result};
use async_trait::async_trait;
use parking_lot::Mutex;
use rust_decimal::Decimal;
use std::collections::{BTreeMap, HashMap};
use tracing::debug;

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct SimulatedOrder {
    pub account: String,
    pub order: OpenOrder,
}

#[derive(Debug, Default)]
struct SimulatedState {
    next_order_id: i64,
    next_webhook_id: i64,
    open: BTreeMap<OrderId, SimulatedOrder>,
    placed: Vec<(String, OrderRequest)>,
    closed: Vec<OrderId>,
    balances: HashMap<String, BTreeMap<String, Decimal>>,
    webhooks: HashMap<String, Vec<Webhook>>,
    place_failures: u32,
    close_failures: u32,
}

#[derive(Debug, Default)]
pub struct SimulatedExchange {
    state: Mutex<SimulatedState>,
}

impl SimulatedExchange {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn set_balance(&self, account: &str, coin: &str, available: Decimal) {
        self.state
            .lock()
            .balances
            .entry(account.to_string())
            .or_default()
            .insert(coin.to_uppercase(), available);
    }

    /// Make the next `count` placements fail
    pub fn fail_next_places(&self, count: u32) {
        self.state.lock().place_failures = count;
    }

    /// Make the next `count` cancellations fail
    pub fn fail_next_closes(&self, count: u32) {
        self.state.lock().close_failures = count;
    }

    /// Remove an order as if it had been completely filled
    pub fn fill(&self, id: OrderId) -> Option<SimulatedOrder> {
        self.state.lock().open.remove(&id)
    }

    pub fn open(&self) -> Vec<SimulatedOrder> {
        self.state.lock().open.values().cloned().collect()
    }

    pub fn is_open(&self, id: OrderId) -> bool {
        self.state.lock().open.contains_key(&id)
    }

    /// Every placement accepted so far, in order
    pub fn placed(&self) -> Vec<(String, OrderRequest)> {
        self.state.lock().placed.clone()
    }

    /// Every successful cancellation so far, in order
    pub fn closed(&self) -> Vec<OrderId> {
        self.state.lock().closed.clone()
    }

    pub fn registered_webhooks(&self, account: &str) -> Vec<Webhook> {
        self.state.lock().webhooks.get(account).cloned().unwrap_or_default()
    }
}

#[async_trait]
impl ExchangeApi for SimulatedExchange {
    async fn place_order(&self, account: &str, order: &OrderRequest) -> Result<OrderId> {
        let mut state = self.state.lock();
        if state.place_failures > 0 {
            state.place_failures -= 1;
            return Err(ExchangeError::Rejected("simulated placement failure".to_string()));
        }
        if order.price <= Decimal::ZERO || order.amount <= Decimal::ZERO {
            return Err(ExchangeError::InvalidOrder(format!(
                "price {} amount {} must be positive",
                order.price, order.amount
            )));
        }

        state.next_order_id += 1;
        let id = OrderId(state.next_order_id);
        let open = OpenOrder {
            id,
            market: order.market.to_string(),
            side: order.side.as_str().to_uppercase(),
            amount: order.amount,
            price: order.price,
            created_at: None,
        };
        state.open.insert(id, SimulatedOrder { account: account.to_string(), order: open });
        state.placed.push((account.to_string(), order.clone()));
        debug!("Simulated place {} for {}: {} {} @ {}", id, account, order.side, order.amount, order.price);
        Ok(id)
    }

    async fn close_order(&self, account: &str, id: OrderId) -> Result<()> {
        let mut state = self.state.lock();
        if state.close_failures > 0 {
            state.close_failures -= 1;
            return Err(ExchangeError::Rejected("simulated cancel failure".to_string()));
        }
        let owned = state.open.get(&id).is_some_and(|o| o.account == account);
        if !owned {
            return Err(ExchangeError::UnknownOrder(id));
        }
        state.open.remove(&id);
        state.closed.push(id);
        debug!("Simulated close {} for {}", id, account);
        Ok(())
    }

    async fn open_orders(&self, account: &str) -> Result<Vec<OpenOrder>> {
        let state = self.state.lock();
        Ok(state.open.values().filter(|o| o.account == account).map(|o| o.order.clone()).collect())
    }

    async fn balances(&self, account: &str) -> Result<Vec<CoinBalance>> {
        let state = self.state.lock();
        Ok(state
            .balances
            .get(account)
            .map(|coins| {
                coins
                    .iter()
                    .map(|(coin, available)| CoinBalance {
                        coin: coin.clone(),
                        available: *available,
                        pending: Decimal::ZERO,
                        frozen: Decimal::ZERO,
                    })
                    .collect()
            })
            .unwrap_or_default())
    }

    async fn webhooks(&self, account: &str) -> Result<Vec<Webhook>> {
        Ok(self.registered_webhooks(account))
    }

    async fn delete_webhook(&self, account: &str, id: i64) -> Result<()> {
        if let Some(hooks) = self.state.lock().webhooks.get_mut(account) {
            hooks.retain(|w| w.id != Some(id));
        }
        Ok(())
    }

    async fn create_webhook(&self, account: &str, webhook: &Webhook) -> Result<i64> {
        let mut state = self.state.lock();
        state.next_webhook_id += 1;
        let id = state.next_webhook_id;
        let mut webhook = webhook.clone();
        webhook.id = Some(id);
        state.webhooks.entry(account.to_string()).or_default().push(webhook);
        Ok(id)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use reference_book::{Market, Side};
    use rust_decimal_macros::dec;

    fn order(side: Side, price: Decimal) -> OrderRequest {
        OrderRequest::limit(Market::new("BTC", "MXN"), side, price, dec!(0.1))
    }

    #[tokio::test]
    async fn test_place_and_close() {
        let exchange = SimulatedExchange::new();
        let a = exchange.place_order("main", &order(Side::Sell, dec!(101))).await.unwrap();
        let b = exchange.place_order("main", &order(Side::Buy, dec!(99))).await.unwrap();
        assert_ne!(a, b);
        assert_eq!(exchange.open_orders("main").await.unwrap().len(), 2);

        exchange.close_order("main", a).await.unwrap();
        assert!(matches!(exchange.close_order("main", a).await, Err(ExchangeError::UnknownOrder(_))));
        assert!(matches!(exchange.close_order("other", b).await, Err(ExchangeError::UnknownOrder(_))));
        assert_eq!(exchange.closed(), vec![a]);

        assert_eq!(exchange.close_all_orders("main").await.unwrap(), 1);
        assert!(exchange.open().is_empty());
    }

    #[tokio::test]
    async fn test_scripted_failures() {
        let exchange = SimulatedExchange::new();
        exchange.fail_next_places(1);
        assert!(exchange.place_order("main", &order(Side::Sell, dec!(101))).await.is_err());
        let id = exchange.place_order("main", &order(Side::Sell, dec!(101))).await.unwrap();

        exchange.fail_next_closes(1);
        assert!(exchange.close_order("main", id).await.is_err());
        assert!(exchange.is_open(id));
        exchange.close_order("main", id).await.unwrap();
    }

    #[tokio::test]
    async fn test_balances_and_webhooks() {
        let exchange = SimulatedExchange::new();
        exchange.set_balance("main", "btc", dec!(1.5));
        let balances = exchange.balances("main").await.unwrap();
        assert_eq!(balances[0].coin, "BTC");
        assert_eq!(balances[0].available, dec!(1.5));

        exchange.create_webhook("main", &Webhook::balance_events("bots", "https://a")).await.unwrap();
        exchange.delete_webhooks("main").await.unwrap();
        exchange.create_webhook("main", &Webhook::balance_events("bots", "https://b")).await.unwrap();
        let hooks = exchange.registered_webhooks("main");
        assert_eq!(hooks.len(), 1);
        assert_eq!(hooks[0].endpoint, "https://b");
    }
}
