use anyhow::{Context, Result};
use rate_service::{
    create_routes, ExchangeRateCache, OpenExchangeRatesSource, RateRefresher, RateServiceConfig,
};
use std::path::PathBuf;
use std::sync::Arc;
use tokio::sync::watch;
use tracing::{error, info};
use tracing_subscriber::EnvFilter;

#[tokio::main]
async fn main() -> Result<()> {
    let env_filter = EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new("info"));
    tracing_subscriber::fmt().with_env_filter(env_filter).with_target(false).init();

    info!("Starting Rate service v{}", env!("CARGO_PKG_VERSION"));

    let config_path = std::env::args().nth(1).map(PathBuf::from);
    let config =
        RateServiceConfig::load(config_path.as_deref()).context("Failed to load configuration")?;
    let token = config.api_token()?;
    let source = Arc::new(OpenExchangeRatesSource::new(
        config.source_url.clone(),
        token,
        config.request_timeout(),
    )?);
    let cache = Arc::new(ExchangeRateCache::new(&config.currency));
    let refresher = RateRefresher::new(cache.clone(), source, config.refresh.clone());

    // no point serving before the first rate is known
    refresher
        .refresh_with_retry()
        .await
        .with_context(|| format!("Initial {} rate fetch failed", config.currency))?;

    let (shutdown_tx, shutdown_rx) = watch::channel(false);
    let mut server_shutdown = shutdown_tx.subscribe();
    let (addr, server) = warp::serve(create_routes(cache))
        .try_bind_with_graceful_shutdown(config.server_addr()?, async move {
            let _ = server_shutdown.changed().await;
        })
        .context("Failed to bind rate server")?;
    info!("Rate server listening on {}", addr);
    let server_handle = tokio::spawn(server);

    let outcome = tokio::select! {
        result = refresher.run(shutdown_rx) => result.map_err(anyhow::Error::from),
        signal = tokio::signal::ctrl_c() => {
            info!("Ctrl+C signal received, shutting down");
            signal.context("Failed to listen for Ctrl+C")
        }
    };

    let _ = shutdown_tx.send(true);
    if let Err(e) = server_handle.await {
        error!("Server task failed: {}", e);
    }

    if let Err(e) = &outcome {
        error!("Rate service stopping: {}", e);
    }
    outcome
}
