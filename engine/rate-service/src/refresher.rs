//! Periodic rate refresher with a fail-stop policy
//!
//! Each refresh retries up to `max_attempts` times with doubling delays. When
//! `max_consecutive_failures` refreshes in a row have failed, `run` returns
//! [`RateError::Exhausted`] and the owning process is expected to exit.

use crate::cache::ExchangeRateCache;
use crate::source::RateSource;
use crate::{RateError, Result};
use rust_decimal::Decimal;
use serde::{Deserialize, Serialize};
use std::sync::Arc;
use std::time::Duration;
use tokio::sync::watch;
use tokio::time::{interval_at, sleep, Instant, MissedTickBehavior};
use tracing::{error, info, warn};

/// Retry and fail-stop policy for one refresher
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct RefreshPolicy {
    /// Time between scheduled refreshes in seconds
    pub interval_secs: u64,

    /// Attempts per scheduled refresh
    pub max_attempts: u32,

    /// Delay before the first retry in milliseconds, doubled on each retry
    pub retry_delay_ms: u64,

    /// Failed refreshes in a row before giving up
    pub max_consecutive_failures: u32,
}

impl Default for RefreshPolicy {
    fn default() -> Self {
        Self {
            interval_secs: 15 * 60,
            max_attempts: 3,
            retry_delay_ms: 2_000,
            max_consecutive_failures: 3,
        }
    }
}

impl RefreshPolicy {
    pub fn interval(&self) -> Duration {
        Duration::from_secs(self.interval_secs)
    }

    pub fn retry_delay(&self) -> Duration {
        Duration::from_millis(self.retry_delay_ms)
    }
}

pub struct RateRefresher {
    cache: Arc<ExchangeRateCache>,
    source: Arc<dyn RateSource>,
    policy: RefreshPolicy,
}

impl RateRefresher {
    pub fn new(cache: Arc<ExchangeRateCache>, source: Arc<dyn RateSource>, policy: RefreshPolicy) -> Self {
        Self { cache, source, policy }
    }

    /// One scheduled refresh, retried per policy
    pub async fn refresh_with_retry(&self) -> Result<Decimal> {
        let attempts = self.policy.max_attempts.max(1);
        let mut delay = self.policy.retry_delay();
        let mut attempt = 1;
        loop {
            match self.cache.refresh(self.source.as_ref()).await {
                Ok(rate) => return Ok(rate),
                Err(e) if attempt < attempts => {
                    warn!(
                        "{} rate attempt {}/{} failed: {}, retrying in {:?}",
                        self.cache.currency(),
                        attempt,
                        attempts,
                        e,
                        delay
                    );
                    sleep(delay).await;
                    delay *= 2;
                    attempt += 1;
                }
                Err(e) => return Err(e),
            }
        }
    }

    /// Refresh on every interval until shutdown or until the policy gives up.
    /// The first refresh happens one interval after the call.
    pub async fn run(&self, mut shutdown: watch::Receiver<bool>) -> Result<()> {
        let period = self.policy.interval();
        let mut ticker = interval_at(Instant::now() + period, period);
        ticker.set_missed_tick_behavior(MissedTickBehavior::Delay);
        let mut failures = 0u32;

        loop {
            tokio::select! {
                _ = ticker.tick() => match self.refresh_with_retry().await {
                    Ok(_) => failures = 0,
                    Err(e) => {
                        failures += 1;
                        error!(
                            "{} rate refresh failed ({} in a row): {}",
                            self.cache.currency(),
                            failures,
                            e
                        );
                        if failures >= self.policy.max_consecutive_failures.max(1) {
                            return Err(RateError::Exhausted { failures, last: e.to_string() });
                        }
                    }
                },
                _ = shutdown.changed() => {
                    info!("Stopping {} rate refresher", self.cache.currency());
                    return Ok(());
                }
            }
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::testing::ScriptedSource;
    use rust_decimal_macros::dec;

    fn down() -> Result<Decimal> {
        Err(RateError::Status { status: 503, body: "down".into() })
    }

    fn policy() -> RefreshPolicy {
        RefreshPolicy { interval_secs: 300, max_attempts: 3, retry_delay_ms: 100, max_consecutive_failures: 2 }
    }

    #[tokio::test(start_paused = true)]
    async fn test_retry_recovers_within_attempts() {
        let cache = Arc::new(ExchangeRateCache::new("MXN"));
        let source = Arc::new(ScriptedSource::new(vec![down(), down(), Ok(dec!(18.9))]));
        let refresher = RateRefresher::new(cache.clone(), source.clone(), policy());

        assert_eq!(refresher.refresh_with_retry().await.unwrap(), dec!(18.9));
        assert_eq!(source.requests().len(), 3);
        assert_eq!(cache.get(), Some(dec!(18.9)));
    }

    #[tokio::test(start_paused = true)]
    async fn test_run_fails_stop_after_consecutive_failures() {
        let cache = Arc::new(ExchangeRateCache::new("MXN"));
        let source = Arc::new(ScriptedSource::new(vec![
            Ok(dec!(19)),
            down(),
            down(),
            down(),
        ]));
        let refresher = RateRefresher::new(cache.clone(), source.clone(), policy());
        let (_tx, rx) = watch::channel(false);

        // first tick succeeds, the next two exhaust their attempts
        let result = refresher.run(rx).await;
        assert!(matches!(result, Err(RateError::Exhausted { failures: 2, .. })));
        assert_eq!(source.requests().len(), 7);
        assert_eq!(cache.get(), Some(dec!(19)));
    }

    #[tokio::test(start_paused = true)]
    async fn test_run_stops_on_shutdown() {
        let cache = Arc::new(ExchangeRateCache::new("MXN"));
        let source = Arc::new(ScriptedSource::new(vec![Ok(dec!(19))]));
        let refresher = Arc::new(RateRefresher::new(cache.clone(), source.clone(), policy()));
        let (tx, rx) = watch::channel(false);

        let handle = {
            let refresher = refresher.clone();
            tokio::spawn(async move { refresher.run(rx).await })
        };
        sleep(Duration::from_secs(301)).await;
        assert_eq!(cache.get(), Some(dec!(19)));

        tx.send(true).unwrap();
        handle.await.unwrap().unwrap();
        assert_eq!(source.requests().len(), 1);
    }
}
