//! Market identifiers and order sides

use crate::error::BookError;
use serde::{Deserialize, Serialize};
use std::fmt;
use std::str::FromStr;

/// Order side. On a book, `Buy` is the bid ladder and `Sell` the ask ladder.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum Side {
    Buy,
    Sell,
}

impl Side {
    pub fn opposite(self) -> Self {
        match self {
            Side::Buy => Side::Sell,
            Side::Sell => Side::Buy,
        }
    }

    pub fn as_str(self) -> &'static str {
        match self {
            Side::Buy => "buy",
            Side::Sell => "sell",
        }
    }
}

impl fmt::Display for Side {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

impl FromStr for Side {
    type Err = BookError;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s.trim().to_lowercase().as_str() {
            "buy" => Ok(Side::Buy),
            "sell" => Ok(Side::Sell),
            _ => Err(BookError::InvalidSide(s.to_string())),
        }
    }
}

/// A `BASE-QUOTE` market such as `BTC-MXN`.
#[derive(Debug, Clone, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(try_from = "String", into = "String")]
pub struct Market {
    base: String,
    quote: String,
}

impl Market {
    pub fn new(base: &str, quote: &str) -> Self {
        Self { base: base.to_uppercase(), quote: quote.to_uppercase() }
    }

    /// Base coin (left side of the pair)
    pub fn base(&self) -> &str {
        &self.base
    }

    /// Quote coin (right side of the pair)
    pub fn quote(&self) -> &str {
        &self.quote
    }

    /// Same base coin priced in another quote currency
    pub fn with_quote(&self, quote: &str) -> Self {
        Self::new(&self.base, quote)
    }

    /// Coin committed by an order on `side`: a sell locks the base coin,
    /// a buy locks the quote coin.
    pub fn locked_coin(&self, side: Side) -> &str {
        match side {
            Side::Sell => &self.base,
            Side::Buy => &self.quote,
        }
    }
}

impl fmt::Display for Market {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}-{}", self.base, self.quote)
    }
}

impl FromStr for Market {
    type Err = BookError;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        let mut parts = s.trim().split('-');
        match (parts.next(), parts.next(), parts.next()) {
            (Some(base), Some(quote), None) if !base.is_empty() && !quote.is_empty() => {
                Ok(Self::new(base, quote))
            }
            _ => Err(BookError::InvalidMarket(s.to_string())),
        }
    }
}

impl TryFrom<String> for Market {
    type Error = BookError;

    fn try_from(value: String) -> Result<Self, Self::Error> {
        value.parse()
    }
}

impl From<Market> for String {
    fn from(market: Market) -> Self {
        market.to_string()
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_market_parsing() {
        let market: Market = "btc-mxn".parse().unwrap();
        assert_eq!(market.base(), "BTC");
        assert_eq!(market.quote(), "MXN");
        assert_eq!(market.to_string(), "BTC-MXN");
        assert_eq!(market.with_quote("usd").to_string(), "BTC-USD");

        assert!("BTCMXN".parse::<Market>().is_err());
        assert!("BTC-".parse::<Market>().is_err());
        assert!("A-B-C".parse::<Market>().is_err());
    }

    #[test]
    fn test_locked_coin() {
        let market = Market::new("BTC", "MXN");
        assert_eq!(market.locked_coin(Side::Sell), "BTC");
        assert_eq!(market.locked_coin(Side::Buy), "MXN");
    }

    #[test]
    fn test_side_parsing() {
        assert_eq!("BUY".parse::<Side>().unwrap(), Side::Buy);
        assert_eq!(" sell ".parse::<Side>().unwrap(), Side::Sell);
        assert_eq!(Side::Buy.opposite(), Side::Sell);
        assert!(matches!("hold".parse::<Side>(), Err(BookError::InvalidSide(_))));
    }

    #[test]
    fn test_market_string_conversion() {
        let market = Market::try_from("ltc-usd".to_string()).unwrap();
        assert_eq!(String::from(market), "LTC-USD");
    }
}
