//! Configuration structures for the liquidation sync pipeline.

use crate::error::{Error, Result};
use serde::{Deserialize, Serialize};
use std::path::{Path, PathBuf};

/// Main configuration for the pipeline.
#[derive(Debug, Clone, Default, Serialize, Deserialize)]
#[serde(default)]
pub struct Config {
    /// Instrument configuration.
    pub instrument: InstrumentConfig,
    /// Remote archive store configuration.
    pub remote: RemoteConfig,
    /// Local storage configuration.
    pub storage: StorageConfig,
    /// Download scheduling configuration.
    pub sync: SyncConfig,
    /// Summary table configuration.
    pub summary: SummaryConfig,
}

impl Config {
    /// Load a configuration from a JSON file. Missing sections fall back to defaults.
    pub fn from_json_file(path: impl AsRef<Path>) -> Result<Self> {
        let raw = std::fs::read_to_string(path)?;
        let config: Config = serde_json::from_str(&raw)?;
        config.validate()?;
        Ok(config)
    }

    /// Check values that would make a run meaningless.
    pub fn validate(&self) -> Result<()> {
        if self.instrument.symbol.trim().is_empty() {
            return Err(Error::config("instrument.symbol must not be empty"));
        }
        if self.instrument.market.trim().is_empty() {
            return Err(Error::config("instrument.market must not be empty"));
        }
        if self.sync.max_parallel == 0 {
            return Err(Error::config("sync.max_parallel must be at least 1"));
        }
        if self.remote.archive_extension.is_empty() || self.storage.data_extension.is_empty() {
            return Err(Error::config("file extensions must not be empty"));
        }
        if self.remote.archive_extension == self.storage.data_extension {
            return Err(Error::config(
                "remote.archive_extension and storage.data_extension must differ",
            ));
        }
        Ok(())
    }
}

/// Instrument-specific configuration.
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct InstrumentConfig {
    /// Trading symbol (e.g., "BTCUSDT").
    pub symbol: String,
    /// Futures market ("um" for USD-M, "cm" for COIN-M).
    pub market: String,
}

impl Default for InstrumentConfig {
    fn default() -> Self {
        Self {
            symbol: "BTCUSDT".to_string(),
            market: "um".to_string(),
        }
    }
}

/// Remote archive store configuration.
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct RemoteConfig {
    /// Bucket listing endpoint (S3 `ListBucketResult` XML).
    pub list_endpoint: String,
    /// Base URL objects are downloaded from.
    pub download_endpoint: String,
    /// Key prefix in front of the market segment.
    pub key_prefix: String,
    /// Dataset name embedded in keys and file names.
    pub dataset: String,
    /// Extension of published archives.
    pub archive_extension: String,
    /// Per-request timeout in seconds.
    pub request_timeout_secs: u64,
}

impl Default for RemoteConfig {
    fn default() -> Self {
        Self {
            list_endpoint: "https://s3-ap-northeast-1.amazonaws.com/data.binance.vision".to_string(),
            download_endpoint: "https://data.binance.vision".to_string(),
            key_prefix: "data/futures".to_string(),
            dataset: "liquidationSnapshot".to_string(),
            archive_extension: "zip".to_string(),
            request_timeout_secs: 30,
        }
    }
}

/// Local storage configuration.
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct StorageConfig {
    /// Root of the local store.
    pub root: PathBuf,
    /// Extension of materialized raw record files.
    pub data_extension: String,
}

impl Default for StorageConfig {
    fn default() -> Self {
        Self {
            root: PathBuf::from("./data"),
            data_extension: "csv".to_string(),
        }
    }
}

/// Download scheduling configuration.
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct SyncConfig {
    /// Maximum concurrent archive downloads.
    pub max_parallel: usize,
    /// Wall-clock limit for a whole scheduler run (None = unbounded).
    pub timeout_secs: Option<u64>,
    /// Extra rounds for jobs that failed to download.
    pub resubmit_attempts: u32,
}

impl Default for SyncConfig {
    fn default() -> Self {
        Self {
            max_parallel: 10,
            timeout_secs: None,
            resubmit_attempts: 0,
        }
    }
}

/// Summary table configuration.
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct SummaryConfig {
    /// Column label for BUY-side liquidation volume.
    pub buy_label: String,
    /// Column label for SELL-side liquidation volume.
    pub sell_label: String,
    /// File stem of the persisted summary table.
    pub file_stem: String,
}

impl Default for SummaryConfig {
    fn default() -> Self {
        Self {
            buy_label: "Shorts".to_string(),
            sell_label: "Longs".to_string(),
            file_stem: "liquidation_summary".to_string(),
        }
    }
}
