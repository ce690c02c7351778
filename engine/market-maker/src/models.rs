use chrono::{DateTime, Utc};
use exchange_client::OrderId;
use reference_book::{Market, Side};
use rust_decimal::Decimal;
use serde::{Deserialize, Serialize};
use std::time::Duration;

use crate::error::{BotError, Result};

/// One market-making bot: quotes a single side of a market at the depth
/// price of the reference book.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Bot {
    #[serde(default)]
    pub id: u64,
    pub account: String,
    pub market: Market,
    pub side: Side,

    /// Reference book depth the price is taken at
    #[serde(alias = "spread")]
    pub spread_depth: Decimal,

    /// Fraction of the spendable balance committed to the order
    #[serde(alias = "pct")]
    pub size_pct: Decimal,

    /// Multiplicative price adjustment, `price * (1 + bias)`
    #[serde(default)]
    pub bias: Decimal,

    /// Relative price change below which the resting order is kept
    #[serde(alias = "min_variance", default)]
    pub min_price_variance: Decimal,

    /// Milliseconds
    pub min_interval: u64,
    pub max_interval: u64,

    #[serde(default)]
    pub active: bool,

    #[serde(default)]
    pub order_id: Option<OrderId>,
    #[serde(default)]
    pub price: Option<Decimal>,
    #[serde(default)]
    pub amount: Option<Decimal>,

    #[serde(alias = "error_message", default)]
    pub last_error: Option<String>,
    #[serde(default)]
    pub last_cycle_at: Option<DateTime<Utc>>,
}

impl Bot {
    /// Check the parameters that do not depend on the registry
    pub fn validate(&self) -> Result<()> {
        if self.account.trim().is_empty() {
            return Err(BotError::InvalidBot("account must not be empty".to_string()));
        }
        if self.spread_depth <= Decimal::ZERO {
            return Err(BotError::InvalidBot(format!("spread depth {} must be positive", self.spread_depth)));
        }
        if self.size_pct <= Decimal::ZERO || self.size_pct > Decimal::ONE {
            return Err(BotError::InvalidBot(format!("size pct {} must be in (0, 1]", self.size_pct)));
        }
        if self.min_interval == 0 || self.min_interval > self.max_interval {
            return Err(BotError::InvalidBot(format!(
                "interval [{}, {}] must satisfy 0 < min <= max",
                self.min_interval, self.max_interval
            )));
        }
        if self.min_price_variance < Decimal::ZERO {
            return Err(BotError::InvalidBot(format!(
                "min price variance {} must not be negative",
                self.min_price_variance
            )));
        }
        if self.bias <= Decimal::NEGATIVE_ONE {
            return Err(BotError::InvalidBot(format!("bias {} must be greater than -1", self.bias)));
        }
        Ok(())
    }

    pub fn interval_bounds(&self) -> (Duration, Duration) {
        (Duration::from_millis(self.min_interval), Duration::from_millis(self.max_interval))
    }

    /// Coin the bot's orders lock: base for sell bots, quote for buy bots
    pub fn locked_coin(&self) -> &str {
        self.market.locked_coin(self.side)
    }

    pub fn clear_order(&mut self) {
        self.order_id = None;
        self.price = None;
        self.amount = None;
    }
}

/// Parameters that can change while a bot runs. Anything else requires
/// deleting the bot and adding a new one.
#[derive(Debug, Clone, Default, Serialize, Deserialize)]
pub struct BotUpdate {
    pub id: u64,
    #[serde(alias = "spread", default)]
    pub spread_depth: Option<Decimal>,
    #[serde(alias = "pct", default)]
    pub size_pct: Option<Decimal>,
    #[serde(default)]
    pub min_interval: Option<u64>,
    #[serde(default)]
    pub max_interval: Option<u64>,
    #[serde(default)]
    pub bias: Option<Decimal>,
    #[serde(alias = "min_variance", default)]
    pub min_price_variance: Option<Decimal>,
}

impl BotUpdate {
    /// The bot with this update applied, validated
    pub fn apply_to(&self, bot: &Bot) -> Result<Bot> {
        let mut updated = bot.clone();
        if let Some(depth) = self.spread_depth {
            updated.spread_depth = depth;
        }
        if let Some(pct) = self.size_pct {
            updated.size_pct = pct;
        }
        if let Some(min) = self.min_interval {
            updated.min_interval = min;
        }
        if let Some(max) = self.max_interval {
            updated.max_interval = max;
        }
        if let Some(bias) = self.bias {
            updated.bias = bias;
        }
        if let Some(variance) = self.min_price_variance {
            updated.min_price_variance = variance;
        }
        updated.validate()?;
        Ok(updated)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use rust_decimal_macros::dec;

    fn bot() -> Bot {
        serde_json::from_str(
            r#"{"account":"main","market":"btc-mxn","side":"sell","spread":2,"pct":"0.5",
                "min_interval":1000,"max_interval":5000,"bias":"0.01","min_variance":"0.01"}"#,
        )
        .unwrap()
    }

    #[test]
    fn test_bot_accepts_legacy_field_names() {
        let bot = bot();
        assert_eq!(bot.market, Market::new("BTC", "MXN"));
        assert_eq!(bot.spread_depth, dec!(2));
        assert_eq!(bot.size_pct, dec!(0.5));
        assert_eq!(bot.min_price_variance, dec!(0.01));
        assert_eq!(bot.locked_coin(), "BTC");
        assert!(!bot.active);
        assert!(bot.validate().is_ok());
    }

    #[test]
    fn test_validation() {
        let mut invalid = bot();
        invalid.size_pct = dec!(1.5);
        assert!(invalid.validate().is_err());

        let mut invalid = bot();
        invalid.min_interval = 6000;
        assert!(invalid.validate().is_err());

        let mut invalid = bot();
        invalid.spread_depth = dec!(0);
        assert!(invalid.validate().is_err());

        let mut invalid = bot();
        invalid.bias = dec!(-1);
        assert!(invalid.validate().is_err());
    }

    #[test]
    fn test_update_applies_only_given_fields() {
        let update: BotUpdate = serde_json::from_str(r#"{"id":0,"pct":"0.25","bias":"-0.02"}"#).unwrap();
        let updated = update.apply_to(&bot()).unwrap();
        assert_eq!(updated.size_pct, dec!(0.25));
        assert_eq!(updated.bias, dec!(-0.02));
        assert_eq!(updated.spread_depth, dec!(2));
        assert_eq!(updated.max_interval, 5000);

        let update = BotUpdate { id: 0, max_interval: Some(10), ..Default::default() };
        assert!(update.apply_to(&bot()).is_err());
    }
}
