//! Balance committed by one open order

use reference_book::{Market, Side};
use rust_decimal::Decimal;
use serde::{Deserialize, Serialize};

/// The notional an open order holds against its account.
///
/// A sell locks `amount` of the base coin, a buy locks `amount * price` of the
/// quote coin. The same value is reserved on placement and released on
/// removal, so repeated place/cancel pairs cannot drift.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct Reservation {
    pub account: String,
    pub coin: String,
    pub amount: Decimal,
}

impl Reservation {
    pub fn new(account: &str, coin: &str, amount: Decimal) -> Self {
        Self { account: account.to_string(), coin: coin.to_uppercase(), amount }
    }

    /// Reservation for a limit order
    pub fn for_order(account: &str, market: &Market, side: Side, price: Decimal, amount: Decimal) -> Self {
        let notional = match side {
            Side::Sell => amount,
            Side::Buy => amount * price,
        };
        Self::new(account, market.locked_coin(side), notional)
    }

    /// The same reservation reduced by `amount`, floored at zero
    pub fn reduced_by(&self, amount: Decimal) -> Self {
        Self { amount: (self.amount - amount).max(Decimal::ZERO), ..self.clone() }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use rust_decimal_macros::dec;

    #[test]
    fn test_reservation_for_order() {
        let market = Market::new("BTC", "MXN");

        let sell = Reservation::for_order("main", &market, Side::Sell, dec!(200000), dec!(0.5));
        assert_eq!(sell, Reservation::new("main", "BTC", dec!(0.5)));

        let buy = Reservation::for_order("main", &market, Side::Buy, dec!(200000), dec!(0.5));
        assert_eq!(buy, Reservation::new("main", "MXN", dec!(100000)));
    }

    #[test]
    fn test_reduced_by() {
        let reservation = Reservation::new("main", "BTC", dec!(1));
        assert_eq!(reservation.reduced_by(dec!(0.25)).amount, dec!(0.75));
        assert_eq!(reservation.reduced_by(dec!(3)).amount, dec!(0));
    }
}
