use anyhow::{Context, Result};
use market_maker::{MarketMakerConfig, MarketMakerService};
use std::path::PathBuf;
use tracing::info;
use tracing_subscriber::EnvFilter;

#[tokio::main]
async fn main() -> Result<()> {
    let env_filter = EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new("info"));
    tracing_subscriber::fmt().with_env_filter(env_filter).with_target(false).init();

    info!("Starting Market Maker service v{}", env!("CARGO_PKG_VERSION"));

    let config_path = std::env::args().nth(1).map(PathBuf::from);
    let config = MarketMakerConfig::load(config_path.as_deref()).context("Failed to load configuration")?;
    info!(
        "Feed {}, rates {}, dry run {}",
        config.prices.feed_url, config.prices.rate_url, config.exchange.dry_run
    );

    MarketMakerService::new(config)?.run().await
}
