//! Management, balance and webhook HTTP surface
//!
//! Every response is wrapped in the `{success, message, data}` envelope.

use crate::error::{BotError, Result};
use crate::models::{Bot, BotUpdate};
use crate::own_orders::OwnOrder;
use crate::registry::BotRegistry;
use account_service::{BalanceEvent, Credentials, LedgerError, WebhookMessage};
use exchange_client::OrderId;
use reference_book::Market;
use reference_feed::ApiResponse;
use rust_decimal::Decimal;
use serde::{Deserialize, Serialize};
use std::convert::Infallible;
use std::sync::Arc;
use tracing::{debug, info, warn};
use warp::http::StatusCode;
use warp::reply::{Json, WithStatus};
use warp::Filter;

const MAX_BODY_BYTES: u64 = 64 * 1024;

#[derive(Clone)]
pub struct AppState {
    pub registry: BotRegistry,
    pub credentials: Arc<Credentials>,
}

#[derive(Debug, Serialize, Deserialize)]
pub struct CoinAmount {
    pub currency: String,
    pub available: Decimal,
    pub reserved: Decimal,
}

/// Balances of both coins of a market
#[derive(Debug, Serialize, Deserialize)]
pub struct MarketBalance {
    pub account: String,
    pub left: CoinAmount,
    pub right: CoinAmount,
}

#[derive(Debug, Serialize, Deserialize)]
pub struct BalanceEntry {
    pub account: String,
    pub coin: String,
    pub available: Decimal,
    pub reserved: Decimal,
    pub spendable: Decimal,
}

#[derive(Debug, Serialize, Deserialize)]
pub struct TickerResponse {
    pub market: String,
    pub best_bid: Decimal,
    pub best_ask: Decimal,
}

#[derive(Debug, Deserialize)]
pub struct AccountParams {
    pub account: Option<String>,
}

fn status_for(error: &BotError) -> StatusCode {
    match error {
        BotError::NotFound(_) => StatusCode::NOT_FOUND,
        BotError::InvalidBot(_)
        | BotError::UnknownAccount(_)
        | BotError::InvalidOrder(_)
        | BotError::Market(_) => StatusCode::BAD_REQUEST,
        BotError::PriceUnavailable { .. }
        | BotError::NoLiquidity { .. }
        | BotError::RateUnavailable(_)
        | BotError::Http(_) => StatusCode::SERVICE_UNAVAILABLE,
        _ => StatusCode::INTERNAL_SERVER_ERROR,
    }
}

fn ok<T: Serialize>(data: T) -> WithStatus<Json> {
    warp::reply::with_status(warp::reply::json(&ApiResponse::ok(data)), StatusCode::OK)
}

fn fail(message: impl Into<String>, status: StatusCode) -> WithStatus<Json> {
    warp::reply::with_status(warp::reply::json(&ApiResponse::<()>::error(message)), status)
}

fn reply<T: Serialize>(result: Result<T>) -> WithStatus<Json> {
    match result {
        Ok(data) => ok(data),
        Err(e) => {
            debug!("Request failed: {}", e);
            fail(e.to_string(), status_for(&e))
        }
    }
}

pub async fn list_bots(state: AppState) -> std::result::Result<impl warp::Reply, warp::Rejection> {
    Ok(ok(state.registry.list().await))
}

pub async fn get_bot(id: u64, state: AppState) -> std::result::Result<impl warp::Reply, warp::Rejection> {
    Ok(reply(state.registry.get(id).await))
}

pub async fn add_bot(bot: Bot, state: AppState) -> std::result::Result<impl warp::Reply, warp::Rejection> {
    Ok(reply(state.registry.add(bot).await))
}

pub async fn update_bot(update: BotUpdate, state: AppState) -> std::result::Result<impl warp::Reply, warp::Rejection> {
    Ok(reply(state.registry.update(update).await))
}

pub async fn delete_bot(id: u64, state: AppState) -> std::result::Result<impl warp::Reply, warp::Rejection> {
    Ok(reply(state.registry.delete(id).await))
}

pub async fn pause_bot(id: u64, state: AppState) -> std::result::Result<impl warp::Reply, warp::Rejection> {
    Ok(reply(state.registry.deactivate(id).await))
}

pub async fn unpause_bot(id: u64, state: AppState) -> std::result::Result<impl warp::Reply, warp::Rejection> {
    Ok(reply(state.registry.activate(id).await))
}

pub async fn list_orders(state: AppState) -> std::result::Result<impl warp::Reply, warp::Rejection> {
    let orders: Vec<OwnOrder> = state.registry.engine().orders().list();
    Ok(ok(orders))
}

pub async fn list_balances(state: AppState) -> std::result::Result<impl warp::Reply, warp::Rejection> {
    let balances: Vec<BalanceEntry> = state
        .registry
        .engine()
        .ledger()
        .list()
        .into_iter()
        .map(|(key, balance)| BalanceEntry {
            account: key.account,
            coin: key.coin,
            available: balance.available,
            reserved: balance.reserved,
            spendable: balance.spendable(),
        })
        .collect();
    Ok(ok(balances))
}

fn market_balance(state: &AppState, market: &str, account: Option<String>) -> Result<MarketBalance> {
    let market: Market = market.parse()?;
    let account = match account {
        Some(account) => account,
        None => state
            .credentials
            .accounts()
            .next()
            .map(str::to_string)
            .ok_or_else(|| BotError::UnknownAccount("no accounts configured".to_string()))?,
    };
    state.credentials.token_for(&account).map_err(|_| BotError::UnknownAccount(account.clone()))?;

    let ledger = state.registry.engine().ledger();
    let amount = |coin: &str| {
        let balance = ledger.balance(&account, coin);
        CoinAmount { currency: coin.to_string(), available: balance.available, reserved: balance.reserved }
    };
    Ok(MarketBalance { left: amount(market.base()), right: amount(market.quote()), account })
}

pub async fn get_balance(
    market: String,
    params: AccountParams,
    state: AppState,
) -> std::result::Result<impl warp::Reply, warp::Rejection> {
    Ok(reply(market_balance(&state, &market, params.account)))
}

pub async fn get_ticker(market: String, state: AppState) -> std::result::Result<impl warp::Reply, warp::Rejection> {
    let result = match market.parse::<Market>() {
        Ok(market) => state.registry.engine().pricer().ticker(&market).await.map(|ticker| TickerResponse {
            market: market.to_string(),
            best_bid: ticker.best_bid,
            best_ask: ticker.best_ask,
        }),
        Err(e) => Err(e.into()),
    };
    Ok(reply(result))
}

/// Apply a balance notification posted by the exchange
pub async fn receive_webhook(
    key: String,
    message: WebhookMessage,
    state: AppState,
) -> std::result::Result<impl warp::Reply, warp::Rejection> {
    let account = match state.credentials.account_for_webhook_key(&key) {
        Ok(account) => account.to_string(),
        Err(e) => {
            warn!("Webhook for unknown key {}: {}", key, e);
            return Ok(fail(e.to_string(), StatusCode::NOT_FOUND));
        }
    };

    let event = match message.to_event() {
        Ok(BalanceEvent::Ignored(kind)) => {
            debug!("Ignoring {} notification for {}", kind, account);
            return Ok(ok("ignored"));
        }
        Ok(event) => event,
        Err(LedgerError::UnknownEventType(kind)) => {
            warn!("Ignoring unknown notification type {} for {}", kind, account);
            return Ok(ok("ignored"));
        }
        Err(e) => {
            warn!("Malformed {} notification for {}: {}", message.kind, account, e);
            return Ok(fail(e.to_string(), StatusCode::BAD_REQUEST));
        }
    };

    let engine = state.registry.engine();
    if let Err(e) = engine.ledger().apply(&event.adjustments(&account)) {
        return Ok(fail(e.to_string(), StatusCode::CONFLICT));
    }
    info!("Applied {} notification for {}: {:?}", message.kind, account, event);

    if let BalanceEvent::Fill(settlement) = &event {
        let own = settlement.order_id.as_deref().and_then(|id| id.parse::<i64>().ok()).map(OrderId);
        if let Some(id) = own {
            if let Some(order) = engine.orders().apply_fill(id, settlement.paid, settlement.is_open) {
                if !settlement.is_open {
                    state.registry.forget_order(order.bot_id).await;
                }
            }
        }
    }
    Ok(ok("applied"))
}

fn with_state(state: AppState) -> impl Filter<Extract = (AppState,), Error = Infallible> + Clone {
    warp::any().map(move || state.clone())
}

pub fn create_routes(
    state: AppState,
) -> impl Filter<Extract = impl warp::Reply, Error = warp::Rejection> + Clone {
    let ping = warp::path!("ping").and(warp::get()).map(|| {
        warp::reply::json(&serde_json::json!({
            "success": true,
            "message": "pong",
            "data": null
        }))
    });

    let bots = warp::path!("bots").and(warp::get()).and(with_state(state.clone())).and_then(list_bots);

    let get = warp::path!("bot" / u64).and(warp::get()).and(with_state(state.clone())).and_then(get_bot);

    let add = warp::path!("bot")
        .and(warp::post())
        .and(warp::body::content_length_limit(MAX_BODY_BYTES))
        .and(warp::body::json())
        .and(with_state(state.clone()))
        .and_then(add_bot);

    let update = warp::path!("bot")
        .and(warp::put())
        .and(warp::body::content_length_limit(MAX_BODY_BYTES))
        .and(warp::body::json())
        .and(with_state(state.clone()))
        .and_then(update_bot);

    let delete = warp::path!("bot" / u64)
        .and(warp::delete())
        .and(with_state(state.clone()))
        .and_then(delete_bot);

    let pause = warp::path!("bot" / "pause" / u64)
        .and(warp::get())
        .and(with_state(state.clone()))
        .and_then(pause_bot);

    let unpause = warp::path!("bot" / "unpause" / u64)
        .and(warp::get())
        .and(with_state(state.clone()))
        .and_then(unpause_bot);

    let orders = warp::path!("orders").and(warp::get()).and(with_state(state.clone())).and_then(list_orders);

    let balances =
        warp::path!("balances").and(warp::get()).and(with_state(state.clone())).and_then(list_balances);

    let balance = warp::path!("balance" / String)
        .and(warp::get())
        .and(warp::query::<AccountParams>())
        .and(with_state(state.clone()))
        .and_then(get_balance);

    let ticker = warp::path!("ticker" / String)
        .and(warp::get())
        .and(with_state(state.clone()))
        .and_then(get_ticker);

    let webhook = warp::path!("webhooks" / String)
        .and(warp::post())
        .and(warp::body::content_length_limit(MAX_BODY_BYTES))
        .and(warp::body::json())
        .and(with_state(state))
        .and_then(receive_webhook);

    ping.or(bots)
        .or(pause)
        .or(unpause)
        .or(get)
        .or(add)
        .or(update)
        .or(delete)
        .or(orders)
        .or(balances)
        .or(balance)
        .or(ticker)
        .or(webhook)
        .with(warp::trace::request())
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::engine::BotEngine;
    use crate::own_orders::OwnOrderIndex;
    use crate::prices::testing::StaticPrices;
    use crate::prices::Pricer;
    use account_service::BalanceLedger;
    use exchange_client::SimulatedExchange;
    use rate_service::ExchangeRateCache;
    use rust_decimal_macros::dec;

    fn state() -> AppState {
        let credentials: Credentials = serde_json::from_str(
            r#"{"tauros_tokens":[{"account":"main","api_token":"abcd123456efgh"}]}"#,
        )
        .unwrap();
        let ledger = Arc::new(BalanceLedger::new());
        let orders = Arc::new(OwnOrderIndex::new(ledger));
        let prices = Arc::new(StaticPrices::default());
        prices.set("BTC-USD", reference_book::Side::Buy, dec!(100));
        prices.set("BTC-USD", reference_book::Side::Sell, dec!(101));
        let pricer = Pricer::new(prices, Arc::new(ExchangeRateCache::new("MXN")), "MXN", "USD");
        let engine = Arc::new(BotEngine::new(Arc::new(SimulatedExchange::new()), orders, pricer));
        let registry = BotRegistry::new(engine, credentials.accounts().map(str::to_string).collect::<Vec<_>>());
        AppState { registry, credentials: Arc::new(credentials) }
    }

    fn body<T: serde::de::DeserializeOwned>(raw: &[u8]) -> ApiResponse<T> {
        serde_json::from_slice(raw).unwrap()
    }

    const BOT: &str = r#"{"account":"main","market":"BTC-USD","side":"sell","spread":1,"pct":"0.5",
        "min_interval":60000,"max_interval":60000}"#;

    #[tokio::test]
    async fn test_bot_crud() {
        let routes = create_routes(state());

        let response = warp::test::request().method("POST").path("/bot").body(BOT).reply(&routes).await;
        assert_eq!(response.status(), StatusCode::OK);
        let created: ApiResponse<Bot> = body(response.body());
        let id = created.data.unwrap().id;

        let response = warp::test::request()
            .method("PUT")
            .path("/bot")
            .body(format!(r#"{{"id":{},"bias":"0.02"}}"#, id))
            .reply(&routes)
            .await;
        let updated: ApiResponse<Bot> = body(response.body());
        assert_eq!(updated.data.unwrap().bias, dec!(0.02));

        let response = warp::test::request().path(&format!("/bot/unpause/{}", id)).reply(&routes).await;
        let active: ApiResponse<Bot> = body(response.body());
        assert!(active.data.unwrap().active);

        let response = warp::test::request().path(&format!("/bot/pause/{}", id)).reply(&routes).await;
        let paused: ApiResponse<Bot> = body(response.body());
        assert!(!paused.data.unwrap().active);

        let response = warp::test::request().path("/bots").reply(&routes).await;
        let listed: ApiResponse<Vec<Bot>> = body(response.body());
        assert_eq!(listed.data.unwrap().len(), 1);

        let response = warp::test::request().method("DELETE").path(&format!("/bot/{}", id)).reply(&routes).await;
        assert_eq!(response.status(), StatusCode::OK);

        let response = warp::test::request().path(&format!("/bot/{}", id)).reply(&routes).await;
        assert_eq!(response.status(), StatusCode::NOT_FOUND);
    }

    #[tokio::test]
    async fn test_invalid_bot_is_rejected() {
        let routes = create_routes(state());
        let unknown_account = BOT.replace("\"main\"", "\"other\"");
        let response = warp::test::request().method("POST").path("/bot").body(unknown_account).reply(&routes).await;
        assert_eq!(response.status(), StatusCode::BAD_REQUEST);
        let rejected: ApiResponse<Bot> = body(response.body());
        assert!(!rejected.success);
    }

    #[tokio::test]
    async fn test_webhook_updates_balance() {
        let state = state();
        let routes = create_routes(state.clone());

        let response = warp::test::request()
            .method("POST")
            .path("/webhooks/123456")
            .body(r#"{"type":"TR","object":{"coin":"MXN","amount":"2500.5","type":"deposit"}}"#)
            .reply(&routes)
            .await;
        assert_eq!(response.status(), StatusCode::OK);

        let response = warp::test::request().path("/balance/btc-mxn").reply(&routes).await;
        let balance: ApiResponse<MarketBalance> = body(response.body());
        let balance = balance.data.unwrap();
        assert_eq!(balance.right.currency, "MXN");
        assert_eq!(balance.right.available, dec!(2500.5));
        assert_eq!(balance.left.available, dec!(0));

        let response = warp::test::request()
            .method("POST")
            .path("/webhooks/unknown")
            .body(r#"{"type":"TR","object":{"coin":"MXN","amount":"1"}}"#)
            .reply(&routes)
            .await;
        assert_eq!(response.status(), StatusCode::NOT_FOUND);

        let response = warp::test::request()
            .method("POST")
            .path("/webhooks/123456")
            .body(r#"{"type":"ZZ","object":{}}"#)
            .reply(&routes)
            .await;
        assert_eq!(response.status(), StatusCode::OK);
        assert_eq!(state.registry.engine().ledger().balance("main", "MXN").available, dec!(2500.5));
    }

    #[tokio::test]
    async fn test_ticker_and_ping() {
        let routes = create_routes(state());
        let response = warp::test::request().path("/ticker/BTC-USD").reply(&routes).await;
        let ticker: ApiResponse<TickerResponse> = body(response.body());
        assert_eq!(ticker.data.unwrap().best_ask, dec!(101));

        // MXN markets need a cached rate
        let response = warp::test::request().path("/ticker/BTC-MXN").reply(&routes).await;
        assert_eq!(response.status(), StatusCode::SERVICE_UNAVAILABLE);

        let response = warp::test::request().path("/ping").reply(&routes).await;
        assert_eq!(response.status(), StatusCode::OK);
    }
}
