//! Reference book feed
//!
//! Keeps a [`MarketBooks`] in sync with the reference exchange. Each
//! connection runs one [`FeedSession`]:
//! `Disconnected -> Connecting -> Subscribed -> Streaming`, and any transport
//! or protocol failure drops back to `Disconnected` with every book cleared.

use crate::config::UpstreamConfig;
use crate::error::{FeedError, FeedResult};
use crate::messages::{FeedMessage, SubscribeRequest, WireChange, WireLevel};
use futures_util::{SinkExt, StreamExt};
use parking_lot::RwLock;
use reference_book::MarketBooks;
use serde::{Deserialize, Serialize};
use std::collections::HashSet;
use std::sync::Arc;
use std::time::Duration;
use tokio::sync::watch;
use tokio::time::sleep;
use tokio_tungstenite::{connect_async, tungstenite::Message};
use tracing::{debug, info, trace, warn};
use url::Url;

/// Connection state of the feed
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum FeedState {
    #[default]
    Disconnected,
    Connecting,
    Subscribed,
    Streaming,
}

/// Shared, cheaply clonable view of the feed state
#[derive(Debug, Clone, Default)]
pub struct FeedStatus(Arc<RwLock<FeedState>>);

impl FeedStatus {
    pub fn get(&self) -> FeedState {
        *self.0.read()
    }

    fn set(&self, state: FeedState) {
        *self.0.write() = state;
    }
}

/// Protocol state for one upstream connection
pub struct FeedSession {
    books: Arc<MarketBooks>,
    status: FeedStatus,
    synced: HashSet<String>,
}

impl FeedSession {
    pub fn new(books: Arc<MarketBooks>, status: FeedStatus) -> Self {
        Self { books, status, synced: HashSet::new() }
    }

    pub fn state(&self) -> FeedState {
        self.status.get()
    }

    /// Market has received its snapshot on this session
    pub fn is_synced(&self, market: &str) -> bool {
        self.synced.contains(&market.to_uppercase())
    }

    pub fn connecting(&mut self) {
        self.status.set(FeedState::Connecting);
    }

    pub fn subscribed(&mut self) {
        self.status.set(FeedState::Subscribed);
    }

    fn enter_streaming(&mut self) {
        self.books.reset_all();
        self.synced.clear();
        self.status.set(FeedState::Streaming);
        debug!("Reference feed streaming, waiting for snapshots");
    }

    /// Drop the session: clear every book so no reader sees stale levels
    pub fn disconnect(&mut self) {
        self.books.reset_all();
        self.synced.clear();
        self.status.set(FeedState::Disconnected);
    }

    /// Apply one upstream message
    pub fn handle(&mut self, message: FeedMessage) -> FeedResult<()> {
        match message {
            FeedMessage::Subscriptions => {
                if self.state() == FeedState::Subscribed {
                    self.enter_streaming();
                }
                Ok(())
            }
            FeedMessage::Snapshot { product_id, bids, asks } => {
                if self.state() != FeedState::Streaming {
                    self.enter_streaming();
                }
                let book = match self.books.get(&product_id) {
                    Ok(book) => book,
                    Err(_) => {
                        warn!("Ignoring snapshot for unsubscribed market {}", product_id);
                        return Ok(());
                    }
                };
                let bids = bids.iter().map(WireLevel::to_level).collect::<FeedResult<Vec<_>>>()?;
                let asks = asks.iter().map(WireLevel::to_level).collect::<FeedResult<Vec<_>>>()?;
                book.apply_snapshot(&bids, &asks)
                    .map_err(|source| FeedError::Desync { market: product_id.clone(), source })?;
                info!("Snapshot for {}: {} bids, {} asks", book.market(), bids.len(), asks.len());
                self.synced.insert(book.market().to_string());
                Ok(())
            }
            FeedMessage::L2Update { product_id, changes } => {
                let book = match self.books.get(&product_id) {
                    Ok(book) => book,
                    Err(_) => {
                        warn!("Ignoring update for unsubscribed market {}", product_id);
                        return Ok(());
                    }
                };
                if self.state() != FeedState::Streaming || !self.synced.contains(book.market()) {
                    return Err(FeedError::OutOfOrder(book.market().to_string()));
                }
                let changes =
                    changes.iter().map(WireChange::to_change).collect::<FeedResult<Vec<_>>>()?;
                book.apply_changes(&changes)
                    .map_err(|source| FeedError::Desync { market: product_id, source })
            }
            FeedMessage::Heartbeat { product_id, sequence } => {
                trace!("Heartbeat {:?} seq {:?}", product_id, sequence);
                Ok(())
            }
            FeedMessage::Error { message, reason } => Err(FeedError::Upstream(match reason {
                Some(reason) => format!("{}: {}", message, reason),
                None => message,
            })),
            FeedMessage::Other => Ok(()),
        }
    }

    fn handle_text(&mut self, text: &str) -> FeedResult<()> {
        let message: FeedMessage = serde_json::from_str(text)?;
        self.handle(message)
    }
}

/// Streams the reference exchange into a set of books until shutdown
pub struct ReferenceBookFeed {
    config: UpstreamConfig,
    books: Arc<MarketBooks>,
    status: FeedStatus,
}

impl ReferenceBookFeed {
    /// Create a new feed for the given books
    pub fn new(config: UpstreamConfig, books: Arc<MarketBooks>) -> Self {
        Self { config, books, status: FeedStatus::default() }
    }

    pub fn status(&self) -> FeedStatus {
        self.status.clone()
    }

    /// Run sessions until `shutdown` flips to true, resubscribing with
    /// exponential backoff after every failure.
    pub async fn run(&self, mut shutdown: watch::Receiver<bool>) -> FeedResult<()> {
        let url = Url::parse(&self.config.ws_url)?;
        let initial_delay = Duration::from_millis(self.config.initial_backoff_ms);
        let max_delay = Duration::from_secs(self.config.max_backoff_secs);
        let mut retry_delay = initial_delay;

        loop {
            if *shutdown.borrow() {
                return Ok(());
            }

            let mut session = FeedSession::new(self.books.clone(), self.status.clone());
            let result = self.stream(&url, &mut session, &mut shutdown).await;
            let was_streaming = !session.synced.is_empty();
            session.disconnect();

            match result {
                Ok(()) => {
                    info!("Reference feed stopped");
                    return Ok(());
                }
                Err(e) => warn!("Reference feed session failed, books reset: {}", e),
            }

            if was_streaming {
                retry_delay = initial_delay;
            }
            info!("Resubscribing to {} in {}ms", url, retry_delay.as_millis());
            tokio::select! {
                _ = sleep(retry_delay) => {}
                _ = shutdown.changed() => {
                    info!("Reference feed stopped during backoff");
                    return Ok(());
                }
            }
            retry_delay = (retry_delay * 2).min(max_delay);
        }
    }

    /// One connection. `Ok` means shutdown was requested.
    async fn stream(
        &self,
        url: &Url,
        session: &mut FeedSession,
        shutdown: &mut watch::Receiver<bool>,
    ) -> FeedResult<()> {
        session.connecting();
        let (ws_stream, _) = connect_async(url.clone()).await?;
        info!("Connected to reference feed {}", url);
        let (mut write, mut read) = ws_stream.split();

        let subscribe = SubscribeRequest::new(&self.books.markets(), &self.config.channels);
        write.send(Message::Text(serde_json::to_string(&subscribe)?)).await?;
        session.subscribed();
        info!("Subscribed to {:?}", subscribe.product_ids);

        loop {
            tokio::select! {
                changed = shutdown.changed() => {
                    if changed.is_err() || *shutdown.borrow() {
                        let _ = write.send(Message::Close(None)).await;
                        return Ok(());
                    }
                }
                message = read.next() => match message {
                    Some(Ok(Message::Text(text))) => session.handle_text(&text)?,
                    Some(Ok(Message::Binary(bin))) => {
                        let text = String::from_utf8(bin)
                            .map_err(|e| FeedError::Upstream(format!("non-utf8 frame: {}", e)))?;
                        session.handle_text(&text)?;
                    }
                    Some(Ok(Message::Ping(_))) | Some(Ok(Message::Pong(_))) | Some(Ok(Message::Frame(_))) => {}
                    Some(Ok(Message::Close(frame))) => {
                        warn!("Reference feed closed: {:?}", frame);
                        return Err(FeedError::ConnectionClosed);
                    }
                    Some(Err(e)) => return Err(e.into()),
                    None => return Err(FeedError::ConnectionClosed),
                }
            }
        }
    }
}
