// =============================================================================
// Miner Configuration — JSON settings with env overrides and atomic save
// =============================================================================
//
// Every field carries `#[serde(default)]` so that adding new fields never
// breaks loading an older config file.  Persistence uses an atomic tmp +
// rename pattern to prevent corruption on crash.
//
// =============================================================================

use std::path::Path;
use std::time::Duration;

use anyhow::{Context, Result};
use serde::{Deserialize, Serialize};
use tracing::{info, warn};

use crate::engine::{EngineOptions, MIN_HISTORY_BARS};

// =============================================================================
// Default-value helpers (required by serde `default = "..."` attribute)
// =============================================================================

fn default_database_path() -> String {
    "feature_miner.db".to_string()
}

fn default_min_history_bars() -> usize {
    MIN_HISTORY_BARS
}

fn default_max_concurrency() -> usize {
    4
}

fn default_instrument_timeout_secs() -> u64 {
    30
}

fn default_show_limit() -> usize {
    20
}

// =============================================================================
// MinerConfig
// =============================================================================

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct MinerConfig {
    /// SQLite file holding prices and indicators.
    #[serde(default = "default_database_path")]
    pub database_path: String,

    /// Tickers to process in batch mode.  Empty means every instrument in the
    /// store.
    #[serde(default)]
    pub tickers: Vec<String>,

    /// Instruments with fewer bars are skipped with a warning.
    #[serde(default = "default_min_history_bars")]
    pub min_history_bars: usize,

    /// Upper bound on instruments processed at the same time.
    #[serde(default = "default_max_concurrency")]
    pub max_concurrency: usize,

    /// Load + compute budget per instrument; on expiry the result is dropped.
    #[serde(default = "default_instrument_timeout_secs")]
    pub instrument_timeout_secs: u64,

    /// Hide RSI / StochRSI until the Wilder average has absorbed a full period.
    #[serde(default)]
    pub mask_rsi_warmup: bool,

    /// Default row count for `show`.
    #[serde(default = "default_show_limit")]
    pub show_limit: usize,
}

impl Default for MinerConfig {
    fn default() -> Self {
        Self {
            database_path: default_database_path(),
            tickers: Vec::new(),
            min_history_bars: default_min_history_bars(),
            max_concurrency: default_max_concurrency(),
            instrument_timeout_secs: default_instrument_timeout_secs(),
            mask_rsi_warmup: false,
            show_limit: default_show_limit(),
        }
    }
}

impl MinerConfig {
    /// Load configuration from a JSON file at `path`.
    ///
    /// If the file does not exist, returns an error so the caller can fall
    /// back to defaults with a warning.
    pub fn load(path: impl AsRef<Path>) -> Result<Self> {
        let path = path.as_ref();

        let content = std::fs::read_to_string(path)
            .with_context(|| format!("failed to read miner config from {}", path.display()))?;

        let config: Self = serde_json::from_str(&content)
            .with_context(|| format!("failed to parse miner config from {}", path.display()))?;

        info!(
            path = %path.display(),
            database = %config.database_path,
            tickers = config.tickers.len(),
            "miner config loaded"
        );

        Ok(config)
    }

    /// Persist the configuration to `path` using an atomic write (write to
    /// `.tmp`, then rename).
    pub fn save(&self, path: impl AsRef<Path>) -> Result<()> {
        let path = path.as_ref();

        let content = serde_json::to_string_pretty(self)
            .context("failed to serialise miner config to JSON")?;

        let tmp_path = path.with_extension("json.tmp");

        std::fs::write(&tmp_path, &content)
            .with_context(|| format!("failed to write tmp config to {}", tmp_path.display()))?;

        std::fs::rename(&tmp_path, path)
            .with_context(|| format!("failed to rename tmp config to {}", path.display()))?;

        info!(path = %path.display(), "miner config saved (atomic)");
        Ok(())
    }

    /// Apply `MINER_*` environment overrides on top of the file values.
    pub fn apply_env(&mut self) {
        self.apply_overrides(|key| std::env::var(key).ok());
    }

    fn apply_overrides<F>(&mut self, lookup: F)
    where
        F: Fn(&str) -> Option<String>,
    {
        if let Some(path) = lookup("MINER_DB_PATH").filter(|p| !p.trim().is_empty()) {
            self.database_path = path.trim().to_string();
        }
        if let Some(list) = lookup("MINER_TICKERS") {
            self.tickers = parse_tickers(&list);
        }
        if let Some(raw) = lookup("MINER_MAX_CONCURRENCY") {
            match raw.trim().parse::<usize>() {
                Ok(n) if n > 0 => self.max_concurrency = n,
                _ => warn!(value = %raw, "ignoring invalid MINER_MAX_CONCURRENCY"),
            }
        }
    }

    pub fn engine_options(&self) -> EngineOptions {
        EngineOptions {
            mask_rsi_warmup: self.mask_rsi_warmup,
        }
    }

    pub fn instrument_timeout(&self) -> Duration {
        Duration::from_secs(self.instrument_timeout_secs.max(1))
    }
}

/// Split a comma-separated ticker list, upper-casing and dropping blanks.
pub fn parse_tickers(list: &str) -> Vec<String> {
    list.split(',')
        .map(|s| s.trim().to_uppercase())
        .filter(|s| !s.is_empty())
        .collect()
}
