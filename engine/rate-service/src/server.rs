//! HTTP endpoints for the rate service

use crate::cache::{ExchangeRate, ExchangeRateCache};
use serde::{Deserialize, Serialize};
use std::sync::Arc;
use warp::http::StatusCode;
use warp::Filter;

/// Response envelope
#[derive(Debug, Serialize, Deserialize)]
pub struct RateResponse {
    pub success: bool,
    pub message: String,
    pub data: Option<ExchangeRate>,
}

/// Get the cached rate for a currency
pub async fn get_rate(
    currency: String,
    cache: Arc<ExchangeRateCache>,
) -> Result<impl warp::Reply, warp::Rejection> {
    if !currency.eq_ignore_ascii_case(cache.currency()) {
        let response = RateResponse {
            success: false,
            message: format!("Currency {} is not served, only {}", currency, cache.currency()),
            data: None,
        };
        return Ok(warp::reply::with_status(warp::reply::json(&response), StatusCode::NOT_FOUND));
    }

    let response = match cache.snapshot() {
        Some(rate) => RateResponse { success: true, message: String::new(), data: Some(rate) },
        None => RateResponse {
            success: false,
            message: format!("No rate cached for {}", cache.currency()),
            data: None,
        },
    };
    let status = if response.success { StatusCode::OK } else { StatusCode::SERVICE_UNAVAILABLE };
    Ok(warp::reply::with_status(warp::reply::json(&response), status))
}

pub fn create_routes(
    cache: Arc<ExchangeRateCache>,
) -> impl Filter<Extract = impl warp::Reply, Error = warp::Rejection> + Clone {
    let cache_filter = warp::any().map(move || cache.clone());

    let rate = warp::path("rate")
        .and(warp::path::param::<String>())
        .and(warp::path::end())
        .and(warp::get())
        .and(cache_filter)
        .and_then(get_rate);

    let ping = warp::path("ping").and(warp::get()).map(|| {
        warp::reply::json(&serde_json::json!({
            "success": true,
            "message": "pong",
            "data": null
        }))
    });

    rate.or(ping).with(warp::trace::request())
}
