//! Reference exchange level2 wire messages
//!
//! The upstream speaks the Coinbase Pro level2 protocol. The generic
//! `update`/`market` names are accepted alongside `l2update`/`product_id`.

use crate::error::{FeedError, FeedResult};
use reference_book::{PriceLevel, Side};
use rust_decimal::Decimal;
use serde::{Deserialize, Serialize};
use std::str::FromStr;

/// Messages received from the reference exchange
#[derive(Debug, Clone, Deserialize)]
#[serde(tag = "type", rename_all = "lowercase")]
pub enum FeedMessage {
    Snapshot {
        #[serde(alias = "market")]
        product_id: String,
        #[serde(default)]
        bids: Vec<WireLevel>,
        #[serde(default)]
        asks: Vec<WireLevel>,
    },
    #[serde(rename = "l2update", alias = "update")]
    L2Update {
        #[serde(alias = "market")]
        product_id: String,
        #[serde(default)]
        changes: Vec<WireChange>,
    },
    Subscriptions,
    Heartbeat {
        #[serde(default)]
        product_id: Option<String>,
        #[serde(default)]
        sequence: Option<u64>,
    },
    Error {
        #[serde(default)]
        message: String,
        #[serde(default)]
        reason: Option<String>,
    },
    #[serde(other)]
    Other,
}

/// One `[price, size]` entry of a snapshot
#[derive(Debug, Clone, Deserialize)]
#[serde(untagged)]
pub enum WireLevel {
    Pair(String, String),
    Object { price: String, size: String },
}

/// One `[side, price, size]` entry of an incremental update
#[derive(Debug, Clone, Deserialize)]
#[serde(untagged)]
pub enum WireChange {
    Triple(String, String, String),
    Object { side: String, price: String, size: String },
}

fn parse_decimal(value: &str) -> FeedResult<Decimal> {
    Decimal::from_str(value.trim()).map_err(|_| FeedError::InvalidDecimal(value.to_string()))
}

impl WireLevel {
    pub fn to_level(&self) -> FeedResult<PriceLevel> {
        let (price, size) = match self {
            WireLevel::Pair(price, size) => (price, size),
            WireLevel::Object { price, size } => (price, size),
        };
        Ok(PriceLevel::new(parse_decimal(price)?, parse_decimal(size)?))
    }
}

impl WireChange {
    pub fn to_change(&self) -> FeedResult<(Side, Decimal, Decimal)> {
        let (side, price, size) = match self {
            WireChange::Triple(side, price, size) => (side, price, size),
            WireChange::Object { side, price, size } => (side, price, size),
        };
        Ok((Side::from_str(side)?, parse_decimal(price)?, parse_decimal(size)?))
    }
}

/// Subscribe request sent after every (re)connect
#[derive(Debug, Clone, Serialize)]
pub struct SubscribeRequest {
    #[serde(rename = "type")]
    pub kind: &'static str,
    pub product_ids: Vec<String>,
    pub channels: Vec<String>,
}

impl SubscribeRequest {
    pub fn new(markets: &[String], channels: &[String]) -> Self {
        Self { kind: "subscribe", product_ids: markets.to_vec(), channels: channels.to_vec() }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use rust_decimal_macros::dec;

    #[test]
    fn test_parse_coinbase_snapshot() {
        let raw = r#"{"type":"snapshot","product_id":"BTC-USD","bids":[["100.00","1.5"]],"asks":[["101.00","0.25"]]}"#;
        match serde_json::from_str::<FeedMessage>(raw).unwrap() {
            FeedMessage::Snapshot { product_id, bids, asks } => {
                assert_eq!(product_id, "BTC-USD");
                assert_eq!(bids[0].to_level().unwrap(), PriceLevel::new(dec!(100), dec!(1.5)));
                assert_eq!(asks[0].to_level().unwrap(), PriceLevel::new(dec!(101), dec!(0.25)));
            }
            other => panic!("unexpected message {:?}", other),
        }
    }

    #[test]
    fn test_parse_l2update() {
        let raw = r#"{"type":"l2update","product_id":"BTC-USD","time":"2019-08-14T20:42:27.265Z","changes":[["buy","10101.80","0.162567"],["sell","10102.00","0"]]}"#;
        match serde_json::from_str::<FeedMessage>(raw).unwrap() {
            FeedMessage::L2Update { product_id, changes } => {
                assert_eq!(product_id, "BTC-USD");
                assert_eq!(
                    changes[0].to_change().unwrap(),
                    (Side::Buy, dec!(10101.80), dec!(0.162567))
                );
                assert_eq!(changes[1].to_change().unwrap(), (Side::Sell, dec!(10102.00), dec!(0)));
            }
            other => panic!("unexpected message {:?}", other),
        }
    }

    #[test]
    fn test_parse_generic_names() {
        let raw = r#"{"type":"update","market":"LTC-USD","changes":[{"side":"sell","price":"50.1","size":"3"}]}"#;
        match serde_json::from_str::<FeedMessage>(raw).unwrap() {
            FeedMessage::L2Update { product_id, changes } => {
                assert_eq!(product_id, "LTC-USD");
                assert_eq!(changes[0].to_change().unwrap(), (Side::Sell, dec!(50.1), dec!(3)));
            }
            other => panic!("unexpected message {:?}", other),
        }

        let raw = r#"{"type":"snapshot","market":"LTC-USD","bids":[{"price":"49","size":"2"}],"asks":[]}"#;
        assert!(matches!(
            serde_json::from_str::<FeedMessage>(raw).unwrap(),
            FeedMessage::Snapshot { .. }
        ));
    }

    #[test]
    fn test_unknown_types_are_other() {
        let raw = r#"{"type":"match","trade_id":10,"product_id":"BTC-USD"}"#;
        assert!(matches!(serde_json::from_str::<FeedMessage>(raw).unwrap(), FeedMessage::Other));

        let raw = r#"{"type":"subscriptions","channels":[{"name":"level2","product_ids":["BTC-USD"]}]}"#;
        assert!(matches!(
            serde_json::from_str::<FeedMessage>(raw).unwrap(),
            FeedMessage::Subscriptions
        ));
    }

    #[test]
    fn test_bad_decimal_is_rejected() {
        let level = WireLevel::Pair("abc".into(), "1".into());
        assert!(matches!(level.to_level(), Err(FeedError::InvalidDecimal(_))));

        let change = WireChange::Triple("hold".into(), "1".into(), "1".into());
        assert!(matches!(change.to_change(), Err(FeedError::Book(_))));
    }

    #[test]
    fn test_subscribe_request_shape() {
        let request = SubscribeRequest::new(
            &["BTC-USD".to_string()],
            &["level2".to_string(), "heartbeat".to_string()],
        );
        let json = serde_json::to_value(&request).unwrap();
        assert_eq!(json["type"], "subscribe");
        assert_eq!(json["product_ids"][0], "BTC-USD");
        assert_eq!(json["channels"][1], "heartbeat");
    }
}
