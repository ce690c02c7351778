//! Per-account bootstrap against the exchange
//!
//! Closes whatever orders an earlier run left behind, seeds the ledger from
//! the reported balances and registers the balance webhook. The first two
//! steps are required before any bot can run; webhook registration is not.

use account_service::{BalanceLedger, Credentials};
use anyhow::{Context, Result};
use exchange_client::{ExchangeApi, Webhook};
use tracing::{info, warn};

pub async fn bootstrap_account(
    exchange: &dyn ExchangeApi,
    ledger: &BalanceLedger,
    credentials: &Credentials,
    account: &str,
    register_webhook: bool,
) -> Result<()> {
    let closed = exchange
        .close_all_orders(account)
        .await
        .with_context(|| format!("Failed to close open orders of {}", account))?;
    info!("Closed {} stale orders of {}", closed, account);

    let balances = exchange
        .balances(account)
        .await
        .with_context(|| format!("Failed to load balances of {}", account))?;
    for balance in &balances {
        ledger
            .set_available(account, &balance.coin, balance.available)
            .with_context(|| format!("Invalid balance for {}/{}", account, balance.coin))?;
    }
    info!("Seeded {} balances of {}", balances.len(), account);

    if register_webhook && !credentials.base_webhook_url.is_empty() {
        if let Err(e) = register(exchange, credentials, account).await {
            warn!("Webhook registration for {} failed, balances only update at restart: {:#}", account, e);
        }
    }
    Ok(())
}

async fn register(exchange: &dyn ExchangeApi, credentials: &Credentials, account: &str) -> Result<()> {
    let endpoint = credentials.webhook_endpoint(account)?;
    exchange.delete_webhooks(account).await.context("delete webhooks")?;
    let webhook = Webhook::balance_events(&format!("market-maker {}", account), &endpoint);
    exchange.create_webhook(account, &webhook).await.context("create webhook")?;
    Ok(())
}

/// Bootstrap every account in the credentials file
pub async fn bootstrap(
    exchange: &dyn ExchangeApi,
    ledger: &BalanceLedger,
    credentials: &Credentials,
    register_webhooks: bool,
) -> Result<()> {
    for account in credentials.accounts() {
        bootstrap_account(exchange, ledger, credentials, account, register_webhooks).await?;
    }
    Ok(())
}

#[cfg(test)]
mod tests {
    use super::*;
    use exchange_client::{OrderRequest, SimulatedExchange};
    use reference_book::{Market, Side};
    use rust_decimal_macros::dec;

    fn credentials() -> Credentials {
        serde_json::from_str(
            r#"{"tauros_tokens":[{"account":"main","api_token":"abcd123456efgh"}],
                "base_webhook_url":"https://bots.example.com"}"#,
        )
        .unwrap()
    }

    #[tokio::test]
    async fn test_bootstrap_clears_orders_and_seeds_ledger() {
        let exchange = SimulatedExchange::new();
        exchange.set_balance("main", "BTC", dec!(1.25));
        exchange.set_balance("main", "MXN", dec!(5000));
        let order = OrderRequest::limit(Market::new("BTC", "MXN"), Side::Sell, dec!(1), dec!(0.1));
        exchange.place_order("main", &order).await.unwrap();

        let ledger = BalanceLedger::new();
        bootstrap(&exchange, &ledger, &credentials(), true).await.unwrap();

        assert!(exchange.open().is_empty());
        assert_eq!(ledger.spendable("main", "BTC"), dec!(1.25));
        assert_eq!(ledger.spendable("main", "MXN"), dec!(5000));

        let hooks = exchange.registered_webhooks("main");
        assert_eq!(hooks.len(), 1);
        assert_eq!(hooks[0].endpoint, "https://bots.example.com/webhooks/123456");
    }

    #[tokio::test]
    async fn test_bootstrap_fails_when_orders_cannot_be_closed() {
        let exchange = SimulatedExchange::new();
        let order = OrderRequest::limit(Market::new("BTC", "MXN"), Side::Sell, dec!(1), dec!(0.1));
        exchange.place_order("main", &order).await.unwrap();
        exchange.fail_next_closes(1);

        let ledger = BalanceLedger::new();
        assert!(bootstrap(&exchange, &ledger, &credentials(), false).await.is_err());
    }
}
