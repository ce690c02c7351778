//! Exchange order API

use crate::messages::{
    CoinBalance, Created, Envelope, OpenOrder, OrderId, OrderRequest, Wallets, Webhook, WebhookList,
};
use crate::{ExchangeError, Result};
use async_trait::async_trait;
use reqwest::Method;
use rust_decimal::Decimal;
use serde::de::DeserializeOwned;
use serde_json::json;
use std::collections::HashMap;
use std::time::Duration;
use tracing::{debug, info, trace, warn};

pub const PRODUCTION_URL: &str = "https://api.tauros.io";
pub const STAGING_URL: &str = "https://api.staging.tauros.io";

/// Operations the bots need from the trading exchange, per account
#[async_trait]
pub trait ExchangeApi: Send + Sync {
    async fn place_order(&self, account: &str, order: &OrderRequest) -> Result<OrderId>;

    async fn close_order(&self, account: &str, id: OrderId) -> Result<()>;

    async fn open_orders(&self, account: &str) -> Result<Vec<OpenOrder>>;

    async fn balances(&self, account: &str) -> Result<Vec<CoinBalance>>;

    async fn webhooks(&self, account: &str) -> Result<Vec<Webhook>>;

    async fn delete_webhook(&self, account: &str, id: i64) -> Result<()>;

    async fn create_webhook(&self, account: &str, webhook: &Webhook) -> Result<i64>;

    /// Close every open order of `account`, returning how many were closed
    async fn close_all_orders(&self, account: &str) -> Result<usize> {
        let orders = self.open_orders(account).await?;
        info!("Closing {} open orders for {}", orders.len(), account);
        for order in &orders {
            self.close_order(account, order.id).await?;
        }
        Ok(orders.len())
    }

    /// Remove every registered webhook of `account`
    async fn delete_webhooks(&self, account: &str) -> Result<()> {
        for webhook in self.webhooks(account).await? {
            if let Some(id) = webhook.id {
                debug!("Deleting webhook {} for {}", id, account);
                self.delete_webhook(account, id).await?;
            }
        }
        Ok(())
    }
}

/// REST client for the exchange
pub struct HttpExchangeClient {
    client: reqwest::Client,
    base_url: String,
    tokens: HashMap<String, String>,
}

impl HttpExchangeClient {
    pub fn new(
        base_url: impl Into<String>,
        tokens: impl IntoIterator<Item = (String, String)>,
        timeout: Duration,
    ) -> Result<Self> {
        let client = reqwest::Client::builder().timeout(timeout).build()?;
        Ok(Self {
            client,
            base_url: base_url.into().trim_end_matches('/').to_string(),
            tokens: tokens.into_iter().collect(),
        })
    }

    pub fn base_url(&self) -> &str {
        &self.base_url
    }

    fn token(&self, account: &str) -> Result<&str> {
        self.tokens
            .get(account)
            .map(String::as_str)
            .ok_or_else(|| ExchangeError::UnknownAccount(account.to_string()))
    }

    /// Send a request and unwrap the `{success, msg, data|payload}` envelope.
    /// Version 1 endpoints answer in `data`, version 2 in `payload`.
    async fn request<T: DeserializeOwned>(
        &self,
        version: u8,
        method: Method,
        path: &str,
        account: &str,
        body: Option<serde_json::Value>,
    ) -> Result<T> {
        let token = self.token(account)?;
        let url = format!("{}/api/v{}/{}", self.base_url, version, path);
        trace!("{} {} {:?}", method, url, body);

        let mut request = self
            .client
            .request(method, &url)
            .header("Accept", "application/json")
            .header("Authorization", format!("Token {}", token));
        if let Some(body) = &body {
            request = request.json(body);
        }

        let response = request.send().await?;
        let status = response.status();
        let mut text = response.text().await?;
        trace!("status={} body={}", status, text);

        // Webhook endpoints answer with the bare payload
        if path.starts_with("webhooks") {
            if text.trim().is_empty() {
                text = "{}".to_string();
            }
            if !status.is_success() {
                return Err(ExchangeError::Rejected(format!("{}: {}", status, text)));
            }
            text = format!(r#"{{"success":true,"payload":{}}}"#, text);
        }

        let envelope: Envelope = serde_json::from_str(&text)
            .map_err(|e| ExchangeError::Decode(format!("{}: {}", e, text)))?;
        if !envelope.success {
            let message = match envelope.msg {
                Some(serde_json::Value::String(s)) => s,
                Some(other) => other.to_string(),
                None => text,
            };
            return Err(ExchangeError::Rejected(message));
        }

        let inner = if version == 1 { envelope.data } else { envelope.payload };
        serde_json::from_value(inner.unwrap_or(serde_json::Value::Null))
            .map_err(|e| ExchangeError::Decode(format!("{} {}: {}", path, e, text)))
    }
}

#[async_trait]
impl ExchangeApi for HttpExchangeClient {
    async fn place_order(&self, account: &str, order: &OrderRequest) -> Result<OrderId> {
        if order.price <= Decimal::ZERO || order.amount <= Decimal::ZERO {
            return Err(ExchangeError::InvalidOrder(format!(
                "price {} amount {} must be positive",
                order.price, order.amount
            )));
        }
        let body = serde_json::to_value(order).map_err(|e| ExchangeError::Decode(e.to_string()))?;
        let created: Created =
            self.request(1, Method::POST, "trading/placeorder/", account, Some(body)).await?;
        debug!("Placed order {} for {}: {:?}", created.id, account, order);
        Ok(OrderId(created.id))
    }

    async fn close_order(&self, account: &str, id: OrderId) -> Result<()> {
        let _: serde_json::Value = self
            .request(1, Method::POST, "trading/closeorder/", account, Some(json!({ "id": id })))
            .await?;
        debug!("Closed order {} for {}", id, account);
        Ok(())
    }

    async fn open_orders(&self, account: &str) -> Result<Vec<OpenOrder>> {
        let orders: Option<Vec<OpenOrder>> =
            self.request(1, Method::GET, "trading/myopenorders/", account, None).await?;
        Ok(orders.unwrap_or_default())
    }

    async fn balances(&self, account: &str) -> Result<Vec<CoinBalance>> {
        let wallets: Wallets = self.request(1, Method::GET, "data/listbalances", account, None).await?;
        Ok(wallets.wallets.into_iter().map(CoinBalance::from).collect())
    }

    async fn webhooks(&self, account: &str) -> Result<Vec<Webhook>> {
        let list: WebhookList = self.request(2, Method::GET, "webhooks/webhooks", account, None).await?;
        if let Some(detail) = list.detail {
            warn!("Webhook listing for {} failed: {}", account, detail);
            return Err(ExchangeError::Rejected(detail));
        }
        Ok(list.results)
    }

    async fn delete_webhook(&self, account: &str, id: i64) -> Result<()> {
        let path = format!("webhooks/webhooks/{}/", id);
        let _: serde_json::Value = self.request(2, Method::DELETE, &path, account, None).await?;
        Ok(())
    }

    async fn create_webhook(&self, account: &str, webhook: &Webhook) -> Result<i64> {
        let body = serde_json::to_value(webhook).map_err(|e| ExchangeError::Decode(e.to_string()))?;
        let created: Created =
            self.request(2, Method::POST, "webhooks/webhooks/", account, Some(body)).await?;
        info!("Registered webhook {} for {} at {}", created.id, account, webhook.endpoint);
        Ok(created.id)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use reference_book::{Market, Side};
    use rust_decimal_macros::dec;
    use std::sync::{Arc, Mutex};
    use warp::Filter;

    type Seen = Arc<Mutex<Vec<(String, String, serde_json::Value)>>>;

    /// Minimal stand-in for the exchange's REST API
    fn start_server() -> (String, Seen) {
        let seen: Seen = Arc::new(Mutex::new(Vec::new()));

        let record = {
            let seen = seen.clone();
            warp::path::full()
                .and(warp::header::<String>("authorization"))
                .and(warp::body::json::<serde_json::Value>().or(warp::any().map(|| serde_json::Value::Null)).unify())
                .map(move |path: warp::path::FullPath, auth: String, body: serde_json::Value| {
                    seen.lock().unwrap().push((path.as_str().to_string(), auth, body));
                    path.as_str().to_string()
                })
        };

        let routes = record.map(|path: String| {
            let body = match path.as_str() {
                "/api/v1/trading/placeorder/" => json!({"success": true, "data": {"id": 777}}),
                "/api/v1/trading/closeorder/" => json!({"success": false, "msg": "Order not found"}),
                "/api/v1/trading/myopenorders/" => json!({"success": true, "data": [
                    {"order_id": 1, "market": "BTC-MXN", "side": "SELL", "amount": "0.1", "price": "200000"}
                ]}),
                "/api/v1/data/listbalances" => json!({"success": true, "data": {"wallets": [
                    {"coin": "BTC", "balances": {"available": "2", "pending": "0", "frozen": "0"}}
                ]}}),
                "/api/v2/webhooks/webhooks" => json!({"count": 1, "results": [
                    {"id": 9, "name": "bots", "endpoint": "https://old"}
                ]}),
                "/api/v2/webhooks/webhooks/" => json!({"id": 10}),
                _ => return warp::reply::with_status(String::new(), warp::http::StatusCode::OK),
            };
            warp::reply::with_status(body.to_string(), warp::http::StatusCode::OK)
        });

        let (addr, server) = warp::serve(routes).bind_ephemeral(([127, 0, 0, 1], 0));
        tokio::spawn(server);
        (format!("http://{}", addr), seen)
    }

    fn client(base_url: &str) -> HttpExchangeClient {
        HttpExchangeClient::new(
            base_url,
            vec![("main".to_string(), "tok123456789".to_string())],
            Duration::from_secs(5),
        )
        .unwrap()
    }

    #[tokio::test]
    async fn test_place_order_sends_token_and_body() {
        let (url, seen) = start_server();
        let client = client(&url);

        let order = OrderRequest::limit(Market::new("BTC", "MXN"), Side::Buy, dec!(199000), dec!(0.01));
        let id = client.place_order("main", &order).await.unwrap();
        assert_eq!(id, OrderId(777));

        let seen = seen.lock().unwrap();
        let (path, auth, body) = &seen[0];
        assert_eq!(path, "/api/v1/trading/placeorder/");
        assert_eq!(auth, "Token tok123456789");
        assert_eq!(body["market"], "BTC-MXN");
        assert_eq!(body["side"], "buy");
    }

    #[tokio::test]
    async fn test_unsuccessful_envelope_is_rejected() {
        let (url, _) = start_server();
        let client = client(&url);
        match client.close_order("main", OrderId(5)).await {
            Err(ExchangeError::Rejected(message)) => assert_eq!(message, "Order not found"),
            other => panic!("unexpected {:?}", other),
        }
    }

    #[tokio::test]
    async fn test_listings() {
        let (url, _) = start_server();
        let client = client(&url);

        let orders = client.open_orders("main").await.unwrap();
        assert_eq!(orders.len(), 1);
        assert_eq!(orders[0].price, dec!(200000));

        let balances = client.balances("main").await.unwrap();
        assert_eq!(balances[0].coin, "BTC");
        assert_eq!(balances[0].available, dec!(2));
    }

    #[tokio::test]
    async fn test_webhooks_are_unwrapped() {
        let (url, seen) = start_server();
        let client = client(&url);

        client.delete_webhooks("main").await.unwrap();
        let id = client
            .create_webhook("main", &Webhook::balance_events("bots", "https://new/webhooks/123456"))
            .await
            .unwrap();
        assert_eq!(id, 10);

        let paths: Vec<String> = seen.lock().unwrap().iter().map(|(p, _, _)| p.clone()).collect();
        assert!(paths.contains(&"/api/v2/webhooks/webhooks/9/".to_string()));
    }

    #[tokio::test]
    async fn test_unknown_account_and_invalid_order() {
        let client = client("http://127.0.0.1:1");
        assert!(matches!(client.open_orders("other").await, Err(ExchangeError::UnknownAccount(_))));

        let order = OrderRequest::limit(Market::new("BTC", "MXN"), Side::Sell, dec!(0), dec!(1));
        assert!(matches!(client.place_order("main", &order).await, Err(ExchangeError::InvalidOrder(_))));
    }
}
