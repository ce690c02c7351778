//! Per (account, coin) balance

use rust_decimal::Decimal;
use serde::{Deserialize, Serialize};
use std::fmt;

/// Ledger key. Coins are stored upper-cased.
#[derive(Debug, Clone, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize)]
pub struct BalanceKey {
    pub account: String,
    pub coin: String,
}

impl BalanceKey {
    pub fn new(account: &str, coin: &str) -> Self {
        Self { account: account.to_string(), coin: coin.to_uppercase() }
    }
}

impl fmt::Display for BalanceKey {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}/{}", self.account, self.coin)
    }
}

/// Balance of one coin in one account
///
/// `available` is what the exchange reports as free; `reserved` is the part
/// of it committed to this process's own open orders.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct Balance {
    pub available: Decimal,
    pub reserved: Decimal,
}

impl Balance {
    pub fn new(available: Decimal, reserved: Decimal) -> Self {
        Self { available, reserved }
    }

    /// Free balance bots may commit, never negative.
    ///
    /// A fill can debit `available` before the matching reservation is
    /// released, so the raw difference is clamped.
    pub fn spendable(&self) -> Decimal {
        (self.available - self.reserved).max(Decimal::ZERO)
    }

    pub fn is_zero(&self) -> bool {
        self.available.is_zero() && self.reserved.is_zero()
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use rust_decimal_macros::dec;

    #[test]
    fn test_spendable() {
        assert_eq!(Balance::new(dec!(10), dec!(4)).spendable(), dec!(6));
        assert_eq!(Balance::new(dec!(1), dec!(3)).spendable(), dec!(0));
        assert!(Balance::default().is_zero());
    }

    #[test]
    fn test_key_normalises_coin() {
        let key = BalanceKey::new("main", "btc");
        assert_eq!(key.coin, "BTC");
        assert_eq!(key.to_string(), "main/BTC");
    }
}
