//! Exchange webhook notifications and their effect on balances
//!
//! The exchange posts `{title, description, type, date, object}` messages.
//! Every value inside `object` may arrive as a string or a bare number, so
//! fields are captured as optional strings and parsed on demand.

use crate::ledger::Adjustment;
use crate::{LedgerError, Result};
use reference_book::Side;
use rust_decimal::Decimal;
use serde::{Deserialize, Deserializer, Serialize};
use std::str::FromStr;

fn lenient<'de, D>(deserializer: D) -> std::result::Result<Option<String>, D::Error>
where
    D: Deserializer<'de>,
{
    let value = Option::<serde_json::Value>::deserialize(deserializer)?;
    Ok(match value {
        Some(serde_json::Value::String(s)) if s.trim().is_empty() => None,
        Some(serde_json::Value::String(s)) => Some(s.trim().to_string()),
        Some(serde_json::Value::Number(n)) => Some(n.to_string()),
        Some(serde_json::Value::Bool(b)) => Some(b.to_string()),
        _ => None,
    })
}

#[derive(Debug, Clone, Default, Serialize, Deserialize)]
pub struct WebhookObject {
    #[serde(default, deserialize_with = "lenient")]
    pub id: Option<String>,
    #[serde(default, deserialize_with = "lenient")]
    pub market: Option<String>,
    #[serde(default, deserialize_with = "lenient")]
    pub side: Option<String>,
    #[serde(default, deserialize_with = "lenient")]
    pub is_open: Option<String>,
    #[serde(default, deserialize_with = "lenient")]
    pub amount_paid: Option<String>,
    #[serde(default, deserialize_with = "lenient")]
    pub amount_received: Option<String>,
    #[serde(default, deserialize_with = "lenient")]
    pub left_coin: Option<String>,
    #[serde(default, deserialize_with = "lenient")]
    pub right_coin: Option<String>,
    #[serde(default, deserialize_with = "lenient")]
    pub coin: Option<String>,
    #[serde(default, deserialize_with = "lenient")]
    pub amount: Option<String>,
    #[serde(default, deserialize_with = "lenient")]
    pub total_amount: Option<String>,
    #[serde(default, deserialize_with = "lenient")]
    pub price: Option<String>,
    #[serde(rename = "type", default, deserialize_with = "lenient")]
    pub kind: Option<String>,
}

/// One webhook notification as posted by the exchange
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct WebhookMessage {
    #[serde(default)]
    pub title: String,
    #[serde(default)]
    pub description: String,
    #[serde(rename = "type")]
    pub kind: String,
    #[serde(default)]
    pub date: Option<String>,
    #[serde(default)]
    pub object: WebhookObject,
}

/// Coin movement caused by a fill or trade
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Settlement {
    pub order_id: Option<String>,
    pub market: Option<String>,
    pub side: Side,
    pub paid_coin: String,
    pub paid: Decimal,
    pub received_coin: String,
    pub received: Decimal,
    pub is_open: bool,
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub enum BalanceEvent {
    /// Deposit or withdrawal
    Transfer { coin: String, amount: Decimal, withdrawal: bool },
    /// One of the account's resting orders was filled (maker side)
    Fill(Settlement),
    /// The account took liquidity
    Trade(Settlement),
    /// Known notification with no balance effect
    Ignored(String),
}

impl BalanceEvent {
    /// Ledger deltas for `account`
    pub fn adjustments(&self, account: &str) -> Vec<Adjustment> {
        match self {
            BalanceEvent::Transfer { coin, amount, withdrawal: false } => {
                vec![Adjustment::credit(account, coin, *amount)]
            }
            BalanceEvent::Transfer { coin, amount, withdrawal: true } => {
                vec![Adjustment::debit(account, coin, *amount)]
            }
            BalanceEvent::Fill(s) | BalanceEvent::Trade(s) => vec![
                Adjustment::debit(account, &s.paid_coin, s.paid),
                Adjustment::credit(account, &s.received_coin, s.received),
            ],
            BalanceEvent::Ignored(_) => Vec::new(),
        }
    }
}

fn required<'a>(field: &'a Option<String>, name: &str) -> Result<&'a str> {
    field
        .as_deref()
        .ok_or_else(|| LedgerError::InvalidEvent(format!("missing field `{}`", name)))
}

fn amount(field: &Option<String>, name: &str) -> Result<Decimal> {
    let raw = required(field, name)?;
    let value = Decimal::from_str(raw)
        .or_else(|_| Decimal::from_scientific(raw))
        .map_err(|_| LedgerError::InvalidEvent(format!("`{}` is not a decimal: {}", name, raw)))?;
    if value < Decimal::ZERO {
        return Err(LedgerError::InvalidEvent(format!("`{}` is negative: {}", name, raw)));
    }
    Ok(value)
}

impl WebhookMessage {
    pub fn is_balance_affecting(&self) -> bool {
        matches!(self.kind.as_str(), "TR" | "OF" | "TD")
    }

    pub fn to_event(&self) -> Result<BalanceEvent> {
        match self.kind.as_str() {
            "TR" => self.transfer(),
            "OF" => self.settlement().map(BalanceEvent::Fill),
            "TD" => self.settlement().map(BalanceEvent::Trade),
            "OC" | "OP" => Ok(BalanceEvent::Ignored(self.kind.clone())),
            other => Err(LedgerError::UnknownEventType(other.to_string())),
        }
    }

    fn transfer(&self) -> Result<BalanceEvent> {
        let object = &self.object;
        let coin = required(&object.coin, "coin")?.to_uppercase();
        let amount = if object.total_amount.is_some() {
            amount(&object.total_amount, "total_amount")?
        } else {
            amount(&object.amount, "amount")?
        };
        let withdrawal = object.kind.as_deref().is_some_and(|k| k.eq_ignore_ascii_case("withdrawal"));
        Ok(BalanceEvent::Transfer { coin, amount, withdrawal })
    }

    fn settlement(&self) -> Result<Settlement> {
        let object = &self.object;
        let side = required(&object.side, "side")?
            .parse::<Side>()
            .map_err(|e| LedgerError::InvalidEvent(e.to_string()))?;
        let left = required(&object.left_coin, "left_coin")?.to_uppercase();
        let right = required(&object.right_coin, "right_coin")?.to_uppercase();
        let (paid_coin, received_coin) = match side {
            Side::Sell => (left, right),
            Side::Buy => (right, left),
        };
        Ok(Settlement {
            order_id: object.id.clone(),
            market: object.market.as_ref().map(|m| m.to_uppercase()),
            side,
            paid_coin,
            paid: amount(&object.amount_paid, "amount_paid")?,
            received_coin,
            received: amount(&object.amount_received, "amount_received")?,
            is_open: object.is_open.as_deref().is_some_and(|v| v.eq_ignore_ascii_case("true")),
        })
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::ledger::BalanceLedger;
    use rust_decimal_macros::dec;

    fn message(json: &str) -> WebhookMessage {
        serde_json::from_str(json).unwrap()
    }

    #[test]
    fn test_deposit_and_withdrawal() {
        let deposit = message(
            r#"{"title":"Deposit","type":"TR","object":{"coin":"btc","amount":"0.5","type":"deposit"}}"#,
        );
        assert_eq!(
            deposit.to_event().unwrap(),
            BalanceEvent::Transfer { coin: "BTC".into(), amount: dec!(0.5), withdrawal: false }
        );

        let withdrawal = message(
            r#"{"type":"TR","object":{"coin":"MXN","amount":"90","total_amount":"100","type":"withdrawal"}}"#,
        );
        assert_eq!(
            withdrawal.to_event().unwrap(),
            BalanceEvent::Transfer { coin: "MXN".into(), amount: dec!(100), withdrawal: true }
        );
    }

    #[test]
    fn test_sell_fill_moves_left_to_right() {
        let fill = message(
            r#"{"type":"OF","object":{"id":12345,"market":"btc-mxn","side":"SELL","is_open":false,
                "amount_paid":"0.1","amount_received":"20000","left_coin":"BTC","right_coin":"MXN"}}"#,
        );
        let event = fill.to_event().unwrap();
        let BalanceEvent::Fill(settlement) = &event else { panic!("expected fill") };
        assert_eq!(settlement.order_id.as_deref(), Some("12345"));
        assert_eq!(settlement.paid_coin, "BTC");
        assert_eq!(settlement.received_coin, "MXN");
        assert!(!settlement.is_open);

        let ledger = BalanceLedger::new();
        ledger.credit("main", "BTC", dec!(1)).unwrap();
        ledger.apply(&event.adjustments("main")).unwrap();
        assert_eq!(ledger.balance("main", "BTC").available, dec!(0.9));
        assert_eq!(ledger.balance("main", "MXN").available, dec!(20000));
    }

    #[test]
    fn test_buy_trade_moves_right_to_left() {
        let trade = message(
            r#"{"type":"TD","object":{"side":"BUY","amount_paid":200,"amount_received":"0.001",
                "left_coin":"BTC","right_coin":"MXN"}}"#,
        );
        let BalanceEvent::Trade(settlement) = trade.to_event().unwrap() else { panic!("expected trade") };
        assert_eq!(settlement.paid_coin, "MXN");
        assert_eq!(settlement.paid, dec!(200));
        assert_eq!(settlement.received_coin, "BTC");
    }

    #[test]
    fn test_unknown_and_ignored_types() {
        let placed = message(r#"{"type":"OP","object":{}}"#);
        assert_eq!(placed.to_event().unwrap(), BalanceEvent::Ignored("OP".into()));
        assert!(placed.to_event().unwrap().adjustments("main").is_empty());

        let other = message(r#"{"type":"XX"}"#);
        assert_eq!(other.to_event(), Err(LedgerError::UnknownEventType("XX".into())));
    }

    #[test]
    fn test_malformed_amount_is_rejected() {
        let bad = message(r#"{"type":"TR","object":{"coin":"BTC","amount":"lots"}}"#);
        assert!(matches!(bad.to_event(), Err(LedgerError::InvalidEvent(_))));

        let missing = message(r#"{"type":"TD","object":{"side":"BUY","left_coin":"BTC"}}"#);
        assert!(matches!(missing.to_event(), Err(LedgerError::InvalidEvent(_))));
    }
}
