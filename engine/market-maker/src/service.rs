use crate::config::MarketMakerConfig;
use crate::engine::BotEngine;
use crate::own_orders::OwnOrderIndex;
use crate::persistence::BotStore;
use crate::prices::{FeedPriceClient, Pricer, RemoteRateSource};
use crate::registry::BotRegistry;
use crate::rest_api::{create_routes, AppState};
use crate::startup;
use account_service::{BalanceLedger, Credentials};
use anyhow::{Context, Result};
use exchange_client::{ExchangeApi, HttpExchangeClient, SimulatedExchange, PRODUCTION_URL, STAGING_URL};
use rate_service::{ExchangeRateCache, RateRefresher};
use std::sync::Arc;
use tokio::sync::watch;
use tracing::{error, info, warn};

/// Market Maker service
pub struct MarketMakerService {
    config: MarketMakerConfig,
    credentials: Arc<Credentials>,
    exchange: Arc<dyn ExchangeApi>,
    ledger: Arc<BalanceLedger>,
    refresher: RateRefresher,
    registry: BotRegistry,
    store: BotStore,
}

fn build_exchange(config: &MarketMakerConfig, credentials: &Credentials) -> Result<Arc<dyn ExchangeApi>> {
    if config.exchange.dry_run {
        warn!("Dry run: orders go to a simulated exchange");
        let exchange = SimulatedExchange::new();
        for balance in &config.exchange.simulated_balances {
            exchange.set_balance(&balance.account, &balance.coin, balance.available);
        }
        return Ok(Arc::new(exchange));
    }

    let base_url = match &config.exchange.base_url {
        Some(url) => url.clone(),
        None if credentials.is_staging => STAGING_URL.to_string(),
        None => PRODUCTION_URL.to_string(),
    };
    let tokens = credentials
        .tauros_tokens
        .iter()
        .map(|t| (t.account.clone(), t.api_token.clone()));
    let client = HttpExchangeClient::new(base_url, tokens, config.exchange_timeout())
        .context("Failed to build exchange client")?;
    info!("Trading against {}", client.base_url());
    Ok(Arc::new(client))
}

impl MarketMakerService {
    /// Wire every component. Nothing talks to the network yet.
    pub fn new(config: MarketMakerConfig) -> Result<Self> {
        let credentials = Credentials::load_from_file(&config.credentials_file).with_context(|| {
            format!("Failed to load credentials from {}", config.credentials_file.display())
        })?;
        let credentials = Arc::new(credentials);
        let exchange = build_exchange(&config, &credentials)?;

        let ledger = Arc::new(BalanceLedger::new());
        let orders = Arc::new(OwnOrderIndex::new(ledger.clone()));

        let prices = &config.prices;
        let rates = Arc::new(ExchangeRateCache::new(&prices.fiat_quote));
        let rate_source = Arc::new(RemoteRateSource::new(prices.rate_url.clone(), config.price_timeout())?);
        let refresher = RateRefresher::new(rates.clone(), rate_source, prices.rate_refresh.clone());

        let feed = Arc::new(FeedPriceClient::new(prices.feed_url.clone(), config.price_timeout())?);
        let pricer = Pricer::new(feed, rates, &prices.fiat_quote, &prices.reference_quote);

        let engine = Arc::new(BotEngine::new(exchange.clone(), orders, pricer));
        let registry = BotRegistry::new(engine, credentials.accounts().map(str::to_string).collect::<Vec<_>>());
        let store = BotStore::new(config.bots_file.clone());

        Ok(Self { config, credentials, exchange, ledger, refresher, registry, store })
    }

    pub fn registry(&self) -> &BotRegistry {
        &self.registry
    }

    /// Run until Ctrl+C or until the rate can no longer be refreshed, then
    /// stop every bot and save them
    pub async fn run(self) -> Result<()> {
        self.refresher
            .refresh_with_retry()
            .await
            .with_context(|| format!("Initial {} rate fetch failed", self.config.prices.fiat_quote))?;

        startup::bootstrap(
            self.exchange.as_ref(),
            &self.ledger,
            &self.credentials,
            self.config.exchange.register_webhooks,
        )
        .await
        .context("Account bootstrap failed")?;

        let saved = self.store.load()?;
        self.registry.restore(saved).await;

        let (shutdown_tx, shutdown_rx) = watch::channel(false);
        let mut server_shutdown = shutdown_tx.subscribe();
        let state = AppState { registry: self.registry.clone(), credentials: self.credentials.clone() };
        let (addr, server) = warp::serve(create_routes(state))
            .try_bind_with_graceful_shutdown(self.config.server_addr()?, async move {
                let _ = server_shutdown.changed().await;
            })
            .context("Failed to bind management server")?;
        info!("Management server listening on {}", addr);
        let server_handle = tokio::spawn(server);

        let outcome = tokio::select! {
            result = self.refresher.run(shutdown_rx) => result.map_err(anyhow::Error::from),
            signal = tokio::signal::ctrl_c() => {
                info!("Ctrl+C signal received, shutting down");
                signal.context("Failed to listen for Ctrl+C")
            }
        };

        let _ = shutdown_tx.send(true);
        if let Err(e) = server_handle.await {
            error!("Server task failed: {}", e);
        }

        let bots = self.registry.shutdown().await;
        if let Err(e) = self.store.save(&bots) {
            error!("Failed to save bots: {}", e);
        }

        if let Err(e) = &outcome {
            error!("Market Maker stopping: {:#}", e);
        }
        info!("Market Maker shutdown complete");
        outcome
    }
}
