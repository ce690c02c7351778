use anyhow::{Context, Result};
use reference_book::MarketBooks;
use reference_feed::{create_routes, FeedConfig, PriceQueryService, ReferenceBookFeed};
use std::path::PathBuf;
use std::sync::Arc;
use tokio::sync::watch;
use tracing::{error, info};
use tracing_subscriber::EnvFilter;

#[tokio::main]
async fn main() -> Result<()> {
    let env_filter = EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new("info"));
    tracing_subscriber::fmt().with_env_filter(env_filter).with_target(false).init();

    info!("Starting Reference Feed service v{}", env!("CARGO_PKG_VERSION"));

    let config_path = std::env::args().nth(1).map(PathBuf::from);
    let config = FeedConfig::load(config_path.as_deref()).context("Failed to load configuration")?;
    let addr = config.server_addr()?;
    info!("Mirroring {:?} from {}", config.upstream.markets, config.upstream.ws_url);

    let books = Arc::new(MarketBooks::new(config.upstream.markets.clone()));
    let feed = Arc::new(ReferenceBookFeed::new(config.upstream.clone(), books.clone()));
    let (shutdown_tx, shutdown_rx) = watch::channel(false);

    let feed_handle = {
        let feed = feed.clone();
        tokio::spawn(async move {
            if let Err(e) = feed.run(shutdown_rx).await {
                error!("Reference feed failed: {}", e);
            }
        })
    };

    let routes = create_routes(PriceQueryService::new(books), feed.status());
    let mut server_shutdown = shutdown_tx.subscribe();
    let (bound, server) = warp::serve(routes)
        .try_bind_with_graceful_shutdown(addr, async move {
            let _ = server_shutdown.changed().await;
        })
        .context("Failed to bind query server")?;
    info!("Query server listening on {}", bound);
    let server_handle = tokio::spawn(server);

    tokio::signal::ctrl_c().await.context("Failed to listen for Ctrl+C")?;
    info!("Ctrl+C signal received, shutting down");
    let _ = shutdown_tx.send(true);

    if let Err(e) = feed_handle.await {
        error!("Feed task failed: {}", e);
    }
    if let Err(e) = server_handle.await {
        error!("Server task failed: {}", e);
    }

    info!("Reference Feed service shutdown complete");
    Ok(())
}
