//! HTTP query endpoints for the reference feed
//!
//! Every response is wrapped in the `{success, message, data}` envelope.

use crate::error::FeedError;
use crate::feed::{FeedState, FeedStatus};
use crate::query::PriceQueryService;
use reference_book::BookError;
use rust_decimal::Decimal;
use serde::{Deserialize, Serialize};
use warp::http::StatusCode;
use warp::Filter;

/// Response envelope shared by every endpoint
#[derive(Debug, Serialize, Deserialize)]
pub struct ApiResponse<T> {
    pub success: bool,
    pub message: String,
    pub data: Option<T>,
}

impl<T> ApiResponse<T> {
    pub fn ok(data: T) -> Self {
        Self { success: true, message: String::new(), data: Some(data) }
    }

    pub fn error(message: impl Into<String>) -> Self {
        Self { success: false, message: message.into(), data: None }
    }
}

#[derive(Debug, Serialize, Deserialize)]
pub struct TickerResponse {
    pub market: String,
    pub best_bid: Decimal,
    pub best_ask: Decimal,
}

#[derive(Debug, Serialize, Deserialize)]
pub struct SpreadPriceResponse {
    pub market: String,
    pub side: String,
    pub depth: String,
    pub price: Decimal,
}

#[derive(Debug, Serialize, Deserialize)]
pub struct PingResponse {
    pub state: FeedState,
    pub markets: Vec<String>,
}

/// Spread price query parameters
#[derive(Debug, Deserialize)]
pub struct SpreadParams {
    pub side: Option<String>,
    pub depth: Option<String>,
}

fn status_for(error: &FeedError) -> StatusCode {
    match error {
        FeedError::Book(BookError::UnknownMarket(_)) => StatusCode::NOT_FOUND,
        FeedError::NoLiquidity { .. } | FeedError::Book(BookError::EmptySide(_)) => {
            StatusCode::SERVICE_UNAVAILABLE
        }
        _ => StatusCode::BAD_REQUEST,
    }
}

fn reply<T: Serialize>(result: Result<T, FeedError>) -> warp::reply::WithStatus<warp::reply::Json> {
    match result {
        Ok(data) => warp::reply::with_status(warp::reply::json(&ApiResponse::ok(data)), StatusCode::OK),
        Err(e) => {
            tracing::debug!("Query failed: {}", e);
            let status = status_for(&e);
            warp::reply::with_status(warp::reply::json(&ApiResponse::<()>::error(e.to_string())), status)
        }
    }
}

/// Get the best bid and ask of a market
pub async fn get_ticker(
    market: String,
    service: PriceQueryService,
) -> Result<impl warp::Reply, warp::Rejection> {
    let result = service.get_ticker(&market).map(|ticker| TickerResponse {
        market: market.to_uppercase(),
        best_bid: ticker.best_bid,
        best_ask: ticker.best_ask,
    });
    Ok(reply(result))
}

/// Get the depth price for a bot side
pub async fn get_spread_price(
    market: String,
    params: SpreadParams,
    service: PriceQueryService,
) -> Result<impl warp::Reply, warp::Rejection> {
    let side = params.side.unwrap_or_default();
    let depth = params.depth.unwrap_or_default();
    let result = service.spread_quote(&market, &side, &depth).map(|quote| SpreadPriceResponse {
        market: market.to_uppercase(),
        side: quote.side.as_str().to_string(),
        depth: quote.depth.to_string(),
        price: quote.price,
    });
    Ok(reply(result))
}

pub fn create_routes(
    service: PriceQueryService,
    status: FeedStatus,
) -> impl Filter<Extract = impl warp::Reply, Error = warp::Rejection> + Clone {
    let service_filter = warp::any().map(move || service.clone());
    let status_filter = warp::any().map(move || status.clone());

    let ping = warp::path("ping")
        .and(warp::path::end())
        .and(warp::get())
        .and(status_filter)
        .and(service_filter.clone())
        .map(|status: FeedStatus, service: PriceQueryService| {
            warp::reply::json(&ApiResponse::ok(PingResponse {
                state: status.get(),
                markets: service.markets(),
            }))
        });

    let ticker = warp::path("ticker")
        .and(warp::path::param::<String>())
        .and(warp::path::end())
        .and(warp::get())
        .and(service_filter.clone())
        .and_then(get_ticker);

    let spread = warp::path("spread")
        .and(warp::path::param::<String>())
        .and(warp::path::end())
        .and(warp::get())
        .and(warp::query::<SpreadParams>())
        .and(service_filter)
        .and_then(get_spread_price);

    ping.or(ticker).or(spread).with(warp::trace::request())
}

#[cfg(test)]
mod tests {
    use super::*;
    use reference_book::{MarketBooks, PriceLevel};
    use rust_decimal_macros::dec;
    use std::sync::Arc;

    fn routes() -> impl Filter<Extract = impl warp::Reply, Error = warp::Rejection> + Clone {
        let books = Arc::new(MarketBooks::new(["BTC-USD"]));
        books
            .get("BTC-USD")
            .unwrap()
            .apply_snapshot(
                &[PriceLevel::new(dec!(100), dec!(1)), PriceLevel::new(dec!(99), dec!(2))],
                &[PriceLevel::new(dec!(101), dec!(1)), PriceLevel::new(dec!(102), dec!(3))],
            )
            .unwrap();
        create_routes(PriceQueryService::new(books), FeedStatus::default())
    }

    #[tokio::test]
    async fn test_ticker_endpoint() {
        let response = warp::test::request().path("/ticker/btc-usd").reply(&routes()).await;
        assert_eq!(response.status(), StatusCode::OK);
        let body: ApiResponse<TickerResponse> = serde_json::from_slice(response.body()).unwrap();
        assert!(body.success);
        let data = body.data.unwrap();
        assert_eq!(data.market, "BTC-USD");
        assert_eq!(data.best_bid, dec!(100));
        assert_eq!(data.best_ask, dec!(101));
    }

    #[tokio::test]
    async fn test_spread_endpoint() {
        let response = warp::test::request()
            .path("/spread/BTC-USD?side=buy&depth=2.5")
            .reply(&routes())
            .await;
        assert_eq!(response.status(), StatusCode::OK);
        let body: ApiResponse<SpreadPriceResponse> = serde_json::from_slice(response.body()).unwrap();
        assert_eq!(body.data.unwrap().price, dec!(99));
    }

    #[tokio::test]
    async fn test_spread_echoes_parsed_query() {
        let response = warp::test::request()
            .path("/spread/btc-usd?side=%20SELL&depth=%202.50")
            .reply(&routes())
            .await;
        assert_eq!(response.status(), StatusCode::OK);
        let data = serde_json::from_slice::<ApiResponse<SpreadPriceResponse>>(response.body())
            .unwrap()
            .data
            .unwrap();
        assert_eq!(data.market, "BTC-USD");
        assert_eq!(data.side, "sell");
        assert_eq!(data.depth, "2.5");
        assert_eq!(data.price, dec!(102));
    }

    #[tokio::test]
    async fn test_failures_use_envelope() {
        let response = warp::test::request().path("/ticker/ETH-USD").reply(&routes()).await;
        assert_eq!(response.status(), StatusCode::NOT_FOUND);
        let body: ApiResponse<serde_json::Value> = serde_json::from_slice(response.body()).unwrap();
        assert!(!body.success);
        assert!(body.message.contains("ETH-USD"));

        let response = warp::test::request()
            .path("/spread/BTC-USD?side=buy&depth=zero")
            .reply(&routes())
            .await;
        assert_eq!(response.status(), StatusCode::BAD_REQUEST);

        let response = warp::test::request().path("/spread/BTC-USD").reply(&routes()).await;
        assert_eq!(response.status(), StatusCode::BAD_REQUEST);
    }

    #[tokio::test]
    async fn test_ping() {
        let response = warp::test::request().path("/ping").reply(&routes()).await;
        let body: serde_json::Value = serde_json::from_slice(response.body()).unwrap();
        assert_eq!(body["data"]["state"], "disconnected");
        assert_eq!(body["data"]["markets"][0], "BTC-USD");
    }
}
