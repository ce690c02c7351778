//! Scripted rate source for tests

use crate::source::RateSource;
use crate::{RateError, Result};
use async_trait::async_trait;
use parking_lot::Mutex;
use rust_decimal::Decimal;
use std::collections::VecDeque;

/// Replays a fixed list of results, then fails with `Unavailable`
pub struct ScriptedSource {
    script: Mutex<VecDeque<Result<Decimal>>>,
    requests: Mutex<Vec<String>>,
}

impl ScriptedSource {
    pub fn new(script: Vec<Result<Decimal>>) -> Self {
        Self { script: Mutex::new(script.into()), requests: Mutex::new(Vec::new()) }
    }

    pub fn requests(&self) -> Vec<String> {
        self.requests.lock().clone()
    }
}

#[async_trait]
impl RateSource for ScriptedSource {
    async fn fetch_rate(&self, currency: &str) -> Result<Decimal> {
        self.requests.lock().push(currency.to_string());
        self.script
            .lock()
            .pop_front()
            .unwrap_or_else(|| Err(RateError::Unavailable(currency.to_string())))
    }
}
