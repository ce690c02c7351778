//! Exchange API payloads

use reference_book::{Market, Side};
use rust_decimal::Decimal;
use serde::{Deserialize, Serialize};
use std::fmt;

/// Exchange-assigned order identifier
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize)]
#[serde(transparent)]
pub struct OrderId(pub i64);

impl fmt::Display for OrderId {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}", self.0)
    }
}

/// Limit order to place
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct OrderRequest {
    pub market: Market,
    pub side: Side,
    #[serde(rename = "type")]
    pub kind: String,
    pub price: Decimal,
    pub amount: Decimal,
}

impl OrderRequest {
    pub fn limit(market: Market, side: Side, price: Decimal, amount: Decimal) -> Self {
        Self { market, side, kind: "limit".to_string(), price, amount }
    }
}

/// One of the account's resting orders
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct OpenOrder {
    #[serde(rename = "order_id")]
    pub id: OrderId,
    pub market: String,
    pub side: String,
    pub amount: Decimal,
    pub price: Decimal,
    #[serde(default)]
    pub created_at: Option<String>,
}

/// Balance of one coin as reported by the exchange
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct CoinBalance {
    pub coin: String,
    pub available: Decimal,
    #[serde(default)]
    pub pending: Decimal,
    #[serde(default)]
    pub frozen: Decimal,
}

#[derive(Debug, Deserialize)]
pub(crate) struct WalletBalances {
    pub available: Decimal,
    #[serde(default)]
    pub pending: Decimal,
    #[serde(default)]
    pub frozen: Decimal,
}

#[derive(Debug, Deserialize)]
pub(crate) struct Wallet {
    pub coin: String,
    pub balances: WalletBalances,
}

#[derive(Debug, Deserialize)]
pub(crate) struct Wallets {
    pub wallets: Vec<Wallet>,
}

impl From<Wallet> for CoinBalance {
    fn from(wallet: Wallet) -> Self {
        Self {
            coin: wallet.coin.to_uppercase(),
            available: wallet.balances.available,
            pending: wallet.balances.pending,
            frozen: wallet.balances.frozen,
        }
    }
}

/// A registered notification endpoint
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct Webhook {
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub id: Option<i64>,
    pub name: String,
    pub endpoint: String,
    #[serde(default)]
    pub notify_deposit: bool,
    #[serde(default)]
    pub notify_withdrawal: bool,
    #[serde(default)]
    pub notify_order_place: bool,
    // the exchange spells this field with a space
    #[serde(rename = "notify order_filled", default)]
    pub notify_order_filled: bool,
    #[serde(default)]
    pub notify_trade: bool,
    #[serde(default)]
    pub is_active: bool,
}

impl Webhook {
    /// Webhook for deposits, withdrawals, fills and trades
    pub fn balance_events(name: &str, endpoint: &str) -> Self {
        Self {
            id: None,
            name: name.to_string(),
            endpoint: endpoint.to_string(),
            notify_deposit: true,
            notify_withdrawal: true,
            notify_order_place: false,
            notify_order_filled: true,
            notify_trade: true,
            is_active: true,
        }
    }
}

#[derive(Debug, Deserialize)]
pub(crate) struct WebhookList {
    #[serde(default)]
    pub results: Vec<Webhook>,
    #[serde(default)]
    pub detail: Option<String>,
}

#[derive(Debug, Deserialize)]
pub(crate) struct Created {
    pub id: i64,
}

/// Response wrapper shared by every endpoint
#[derive(Debug, Deserialize)]
pub(crate) struct Envelope {
    pub success: bool,
    #[serde(default)]
    pub msg: Option<serde_json::Value>,
    #[serde(default)]
    pub data: Option<serde_json::Value>,
    #[serde(default)]
    pub payload: Option<serde_json::Value>,
}
