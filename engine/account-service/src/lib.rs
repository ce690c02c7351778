//! Account balances for the market-making bots
//!
//! Tracks, per (account, coin), the balance reported by the exchange and the
//! part of it committed to the bots' own open orders. Webhook notifications
//! from the exchange are turned into ledger deltas here.

pub mod balance;
pub mod config;
pub mod error;
pub mod ledger;
pub mod reservation;
pub mod webhook;

pub use balance::{Balance, BalanceKey};
pub use config::{webhook_key, AccountToken, Credentials};
pub use error::LedgerError;
pub use ledger::{Adjustment, BalanceLedger};
pub use reservation::Reservation;
pub use webhook::{BalanceEvent, Settlement, WebhookMessage, WebhookObject};

// Result type alias
pub type Result<T> = std::result::Result<T, LedgerError>;
