//! Saved bot configurations

use crate::error::{BotError, Result};
use crate::models::Bot;
use std::path::{Path, PathBuf};
use tracing::{info, warn};

/// Flat JSON list of bots in one file
pub struct BotStore {
    path: PathBuf,
}

impl BotStore {
    pub fn new(path: impl Into<PathBuf>) -> Self {
        Self { path: path.into() }
    }

    pub fn path(&self) -> &Path {
        &self.path
    }

    /// Saved bots, or none when the file does not exist yet
    pub fn load(&self) -> Result<Vec<Bot>> {
        if !self.path.exists() {
            warn!("No saved bots at {}, starting with none", self.path.display());
            return Ok(Vec::new());
        }
        let content = std::fs::read_to_string(&self.path)
            .map_err(|e| BotError::Persistence(format!("read {}: {}", self.path.display(), e)))?;
        let bots: Vec<Bot> = serde_json::from_str(&content)
            .map_err(|e| BotError::Persistence(format!("parse {}: {}", self.path.display(), e)))?;
        info!("Loaded {} bots from {}", bots.len(), self.path.display());
        Ok(bots)
    }

    /// Write all bots, replacing the file only once the new content is on disk
    pub fn save(&self, bots: &[Bot]) -> Result<()> {
        let json = serde_json::to_string_pretty(bots)
            .map_err(|e| BotError::Persistence(format!("serialize bots: {}", e)))?;
        let tmp = self.path.with_extension("json.tmp");
        std::fs::write(&tmp, json)
            .map_err(|e| BotError::Persistence(format!("write {}: {}", tmp.display(), e)))?;
        std::fs::rename(&tmp, &self.path)
            .map_err(|e| BotError::Persistence(format!("rename to {}: {}", self.path.display(), e)))?;
        info!("Saved {} bots to {}", bots.len(), self.path.display());
        Ok(())
    }
}
