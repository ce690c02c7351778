//! Bot registry and the per-bot loops
//!
//! Each active bot owns a task that sleeps a random interval drawn from the
//! bot's `[min_interval, max_interval]`, runs one engine cycle and repeats.
//! Stopping sends a one-shot signal; the task then retires the bot's order
//! and exits. The registry lock is never held across an exchange call.

use crate::engine::{BotEngine, CycleAction, CycleOutcome};
use crate::error::{BotError, Result};
use crate::models::{Bot, BotUpdate};
use chrono::Utc;
use rand::Rng;
use std::collections::{BTreeMap, HashSet};
use std::sync::Arc;
use std::time::Duration;
use tokio::sync::{oneshot, RwLock};
use tokio::task::JoinHandle;
use tracing::{error, info, warn};

struct BotTask {
    stop: oneshot::Sender<()>,
    handle: JoinHandle<()>,
}

struct BotEntry {
    bot: Bot,
    task: Option<BotTask>,
}

#[derive(Default)]
struct BotTable {
    next_id: u64,
    entries: BTreeMap<u64, BotEntry>,
}

#[derive(Clone)]
pub struct BotRegistry {
    table: Arc<RwLock<BotTable>>,
    engine: Arc<BotEngine>,
    accounts: Arc<HashSet<String>>,
}

fn jitter(bot: &Bot) -> Duration {
    let (min, max) = bot.interval_bounds();
    if max <= min {
        return min;
    }
    rand::thread_rng().gen_range(min..=max)
}

impl BotRegistry {
    pub fn new(engine: Arc<BotEngine>, accounts: impl IntoIterator<Item = String>) -> Self {
        Self {
            table: Arc::new(RwLock::new(BotTable::default())),
            engine,
            accounts: Arc::new(accounts.into_iter().collect()),
        }
    }

    pub fn engine(&self) -> &Arc<BotEngine> {
        &self.engine
    }

    fn check(&self, bot: &Bot) -> Result<()> {
        bot.validate()?;
        if !self.accounts.contains(&bot.account) {
            return Err(BotError::UnknownAccount(bot.account.clone()));
        }
        Ok(())
    }

    /// Register a bot under a fresh id and start it if it is active
    pub async fn add(&self, mut bot: Bot) -> Result<Bot> {
        self.check(&bot)?;
        bot.clear_order();
        bot.last_error = None;
        bot.last_cycle_at = None;

        let mut table = self.table.write().await;
        bot.id = table.next_id;
        table.next_id += 1;
        info!("Adding bot {}: {} {} on {}", bot.id, bot.side, bot.market, bot.account);
        let task = bot.active.then(|| self.spawn(bot.id));
        table.entries.insert(bot.id, BotEntry { bot: bot.clone(), task });
        Ok(bot)
    }

    /// Reload saved bots, keeping their ids. Order fields are cleared since
    /// startup closes every remote order.
    pub async fn restore(&self, bots: Vec<Bot>) -> usize {
        let mut table = self.table.write().await;
        let mut restored = 0;
        for mut bot in bots {
            if let Err(e) = self.check(&bot) {
                warn!("Skipping saved bot {}: {}", bot.id, e);
                continue;
            }
            if table.entries.contains_key(&bot.id) {
                warn!("Skipping saved bot {}: duplicate id", bot.id);
                continue;
            }
            bot.clear_order();
            table.next_id = table.next_id.max(bot.id + 1);
            let task = bot.active.then(|| self.spawn(bot.id));
            table.entries.insert(bot.id, BotEntry { bot, task });
            restored += 1;
        }
        info!("Restored {} bots, next id {}", restored, table.next_id);
        restored
    }

    pub async fn get(&self, id: u64) -> Result<Bot> {
        let table = self.table.read().await;
        table.entries.get(&id).map(|e| e.bot.clone()).ok_or(BotError::NotFound(id))
    }

    pub async fn list(&self) -> Vec<Bot> {
        self.table.read().await.entries.values().map(|e| e.bot.clone()).collect()
    }

    /// Change the tunable parameters of a bot; a running loop picks them up
    /// on its next cycle
    pub async fn update(&self, update: BotUpdate) -> Result<Bot> {
        let mut table = self.table.write().await;
        let entry = table.entries.get_mut(&update.id).ok_or(BotError::NotFound(update.id))?;
        let updated = update.apply_to(&entry.bot)?;
        info!("Updating bot {}: {:?}", update.id, update);
        entry.bot = updated.clone();
        Ok(updated)
    }

    pub async fn activate(&self, id: u64) -> Result<Bot> {
        let mut table = self.table.write().await;
        let entry = table.entries.get_mut(&id).ok_or(BotError::NotFound(id))?;
        entry.bot.active = true;
        if entry.task.is_none() {
            info!("Activating bot {}", id);
            entry.task = Some(self.spawn(id));
        }
        Ok(entry.bot.clone())
    }

    /// Stop a bot and cancel its order. Deactivating an inactive bot
    /// changes nothing.
    pub async fn deactivate(&self, id: u64) -> Result<Bot> {
        self.stop(id, true).await?;
        self.get(id).await
    }

    pub async fn delete(&self, id: u64) -> Result<Bot> {
        self.stop(id, true).await?;
        let mut table = self.table.write().await;
        let entry = table.entries.remove(&id).ok_or(BotError::NotFound(id))?;
        info!("Deleted bot {}", id);
        Ok(entry.bot)
    }

    /// Stop every running bot, leaving their `active` flag as it was so they
    /// restart after a restore. Returns the bots for saving.
    pub async fn shutdown(&self) -> Vec<Bot> {
        let ids: Vec<u64> = self.table.read().await.entries.keys().copied().collect();
        for id in ids {
            if let Err(e) = self.stop(id, false).await {
                error!("Failed to stop bot {}: {}", id, e);
            }
        }
        self.list().await
    }

    /// Forget an order that left the book outside of a cycle, e.g. filled
    pub async fn forget_order(&self, bot_id: u64) {
        if let Some(entry) = self.table.write().await.entries.get_mut(&bot_id) {
            entry.bot.clear_order();
        }
    }

    async fn stop(&self, id: u64, mark_inactive: bool) -> Result<()> {
        let task = {
            let mut table = self.table.write().await;
            let entry = table.entries.get_mut(&id).ok_or(BotError::NotFound(id))?;
            if mark_inactive {
                entry.bot.active = false;
            }
            entry.task.take()
        };

        if let Some(task) = task {
            info!("Stopping bot {}", id);
            let _ = task.stop.send(());
            if let Err(e) = task.handle.await {
                error!("Bot {} task failed: {}", id, e);
            }
        }
        Ok(())
    }

    fn spawn(&self, id: u64) -> BotTask {
        let (stop, stopped) = oneshot::channel();
        let registry = self.clone();
        let handle = tokio::spawn(async move { registry.run_bot(id, stopped).await });
        BotTask { stop, handle }
    }

    async fn run_bot(self, id: u64, mut stop: oneshot::Receiver<()>) {
        info!("Starting bot {}", id);
        loop {
            let Ok(bot) = self.get(id).await else { return };
            tokio::select! {
                biased;
                _ = &mut stop => break,
                _ = tokio::time::sleep(jitter(&bot)) => {}
            }

            // Parameters may have changed while sleeping
            let Ok(bot) = self.get(id).await else { return };
            let result = self.engine.run_cycle(&bot).await;
            self.record_cycle(id, result).await;
        }

        let result = self.engine.retire(id).await;
        let mut table = self.table.write().await;
        if let Some(entry) = table.entries.get_mut(&id) {
            entry.bot.clear_order();
            entry.bot.last_error = result.err().map(|e| e.to_string());
        }
        info!("Stopped bot {}", id);
    }

    async fn record_cycle(&self, id: u64, result: Result<CycleOutcome>) {
        let mut table = self.table.write().await;
        let Some(entry) = table.entries.get_mut(&id) else { return };
        let bot = &mut entry.bot;
        bot.last_cycle_at = Some(Utc::now());
        match result {
            Ok(outcome) => {
                match outcome.action {
                    CycleAction::Placed { order } | CycleAction::Held { order, .. } => {
                        bot.order_id = Some(order.id);
                        bot.price = Some(order.price);
                        bot.amount = Some(order.amount);
                    }
                    CycleAction::Filled { .. } => bot.clear_order(),
                }
                bot.last_error = outcome.warnings.last().cloned();
            }
            Err(e) => {
                warn!("Bot {} cycle failed: {}", id, e);
                // the index is the source of truth for what is still resting
                match self.engine.orders().for_bot(id) {
                    Some(order) => {
                        bot.order_id = Some(order.id);
                        bot.price = Some(order.price);
                        bot.amount = Some(order.amount);
                    }
                    None => bot.clear_order(),
                }
                bot.last_error = Some(e.to_string());
            }
        }
    }
}
