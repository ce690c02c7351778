//! Balance ledger
//!
//! All mutations go through one mutex, so concurrent reserve/release calls
//! from different bots on the same (account, coin) are linearizable.

use crate::balance::{Balance, BalanceKey};
use crate::reservation::Reservation;
use crate::{LedgerError, Result};
use parking_lot::Mutex;
use rust_decimal::Decimal;
use std::collections::HashMap;
use tracing::{debug, error};

/// A signed change to one balance
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Adjustment {
    pub key: BalanceKey,
    pub available: Decimal,
    pub reserved: Decimal,
}

impl Adjustment {
    pub fn credit(account: &str, coin: &str, amount: Decimal) -> Self {
        Self { key: BalanceKey::new(account, coin), available: amount, reserved: Decimal::ZERO }
    }

    pub fn debit(account: &str, coin: &str, amount: Decimal) -> Self {
        Self { key: BalanceKey::new(account, coin), available: -amount, reserved: Decimal::ZERO }
    }

    pub fn reserve(reservation: &Reservation) -> Self {
        Self {
            key: BalanceKey::new(&reservation.account, &reservation.coin),
            available: Decimal::ZERO,
            reserved: reservation.amount,
        }
    }

    pub fn release(reservation: &Reservation) -> Self {
        Self {
            key: BalanceKey::new(&reservation.account, &reservation.coin),
            available: Decimal::ZERO,
            reserved: -reservation.amount,
        }
    }
}

fn check_amount(amount: Decimal) -> Result<()> {
    if amount < Decimal::ZERO {
        return Err(LedgerError::InvalidAmount(amount));
    }
    Ok(())
}

/// Validate `adjustment` against `balance` and return the new balance
fn adjusted(balance: Balance, adjustment: &Adjustment) -> Result<Balance> {
    let key = &adjustment.key;
    let available = balance.available + adjustment.available;
    if available < Decimal::ZERO {
        return Err(LedgerError::InsufficientBalance {
            account: key.account.clone(),
            coin: key.coin.clone(),
            required: -adjustment.available,
            available: balance.available,
        });
    }

    if adjustment.reserved > Decimal::ZERO && adjustment.reserved > balance.spendable() {
        return Err(LedgerError::InsufficientBalance {
            account: key.account.clone(),
            coin: key.coin.clone(),
            required: adjustment.reserved,
            available: balance.spendable(),
        });
    }

    let reserved = balance.reserved + adjustment.reserved;
    if reserved < Decimal::ZERO {
        return Err(LedgerError::ReleaseExceedsReserved {
            account: key.account.clone(),
            coin: key.coin.clone(),
            amount: -adjustment.reserved,
            reserved: balance.reserved,
        });
    }

    Ok(Balance::new(available, reserved))
}

#[derive(Debug, Default)]
pub struct BalanceLedger {
    balances: Mutex<HashMap<BalanceKey, Balance>>,
}

impl BalanceLedger {
    pub fn new() -> Self {
        Self::default()
    }

    /// Apply one signed adjustment under exclusive access
    pub fn adjust(&self, adjustment: Adjustment) -> Result<Balance> {
        let mut balances = self.balances.lock();
        let current = balances.get(&adjustment.key).copied().unwrap_or_default();
        match adjusted(current, &adjustment) {
            Ok(balance) => {
                balances.insert(adjustment.key.clone(), balance);
                debug!(
                    "{} available {} reserved {}",
                    adjustment.key, balance.available, balance.reserved
                );
                Ok(balance)
            }
            Err(e) => {
                error!("Rejected ledger adjustment {:?}: {}", adjustment, e);
                Err(e)
            }
        }
    }

    /// Apply a batch atomically: either every adjustment lands or none does
    pub fn apply(&self, adjustments: &[Adjustment]) -> Result<()> {
        let mut balances = self.balances.lock();
        let mut staged: HashMap<BalanceKey, Balance> = HashMap::new();
        for adjustment in adjustments {
            let current = staged
                .get(&adjustment.key)
                .or_else(|| balances.get(&adjustment.key))
                .copied()
                .unwrap_or_default();
            match adjusted(current, adjustment) {
                Ok(balance) => {
                    staged.insert(adjustment.key.clone(), balance);
                }
                Err(e) => {
                    error!("Rejected ledger batch at {:?}: {}", adjustment, e);
                    return Err(e);
                }
            }
        }
        balances.extend(staged);
        Ok(())
    }

    /// Increase `available`
    pub fn credit(&self, account: &str, coin: &str, amount: Decimal) -> Result<Balance> {
        check_amount(amount)?;
        self.adjust(Adjustment::credit(account, coin, amount))
    }

    /// Decrease `available`; fails rather than going negative
    pub fn debit(&self, account: &str, coin: &str, amount: Decimal) -> Result<Balance> {
        check_amount(amount)?;
        self.adjust(Adjustment::debit(account, coin, amount))
    }

    /// Commit part of the spendable balance to an order
    pub fn reserve(&self, account: &str, coin: &str, amount: Decimal) -> Result<Balance> {
        check_amount(amount)?;
        self.adjust(Adjustment::reserve(&Reservation::new(account, coin, amount)))
    }

    /// Return a previously reserved amount to the spendable balance
    pub fn release(&self, account: &str, coin: &str, amount: Decimal) -> Result<Balance> {
        check_amount(amount)?;
        self.adjust(Adjustment::release(&Reservation::new(account, coin, amount)))
    }

    /// Overwrite `available`, keeping any reservation. Used to seed from the
    /// exchange's reported balances.
    pub fn set_available(&self, account: &str, coin: &str, amount: Decimal) -> Result<Balance> {
        check_amount(amount)?;
        let key = BalanceKey::new(account, coin);
        let mut balances = self.balances.lock();
        let balance = balances.entry(key).or_default();
        balance.available = amount;
        Ok(*balance)
    }

    /// `available - reserved`, the only free balance bots may size from
    pub fn spendable(&self, account: &str, coin: &str) -> Decimal {
        self.balance(account, coin).spendable()
    }

    pub fn balance(&self, account: &str, coin: &str) -> Balance {
        self.balances.lock().get(&BalanceKey::new(account, coin)).copied().unwrap_or_default()
    }

    /// All balances, ordered by account then coin
    pub fn list(&self) -> Vec<(BalanceKey, Balance)> {
        let mut entries: Vec<_> =
            self.balances.lock().iter().map(|(k, v)| (k.clone(), *v)).collect();
        entries.sort_by(|a, b| a.0.cmp(&b.0));
        entries
    }

    /// Sum of reservations for one coin in one account
    pub fn reserved(&self, account: &str, coin: &str) -> Decimal {
        self.balance(account, coin).reserved
    }
}
