//! Pipeline composition.

use liquidation_aggregation::{summarize, RecordLoader, SummaryReport, SummaryStore};
use liquidation_core::{ArchiveNaming, Config, DailySummaryRow, Error, Result};
use liquidation_ingestion::{
    ArchiveFetcher, HttpObjectStore, LocalInventory, ObjectStore, RemoteCatalog, SchedulerOptions,
    SyncPlanner, SyncScheduler,
};
use std::path::PathBuf;
use std::sync::Arc;
use tokio_util::sync::CancellationToken;
use tracing::{info, warn};

use crate::report::SyncReport;

/// Sync and summarize one instrument/market.
pub struct LiquidationPipeline<S: ObjectStore> {
    config: Config,
    store: Arc<S>,
    naming: ArchiveNaming,
    cancel: CancellationToken,
}

impl LiquidationPipeline<HttpObjectStore> {
    /// Pipeline against the public HTTP archive store.
    pub fn from_config(config: Config) -> Result<Self> {
        let store = HttpObjectStore::new(&config.remote)?;
        Self::new(config, Arc::new(store))
    }
}

impl<S: ObjectStore> LiquidationPipeline<S> {
    /// Create a pipeline over an object store.
    pub fn new(config: Config, store: Arc<S>) -> Result<Self> {
        config.validate()?;
        let naming = ArchiveNaming::from_config(&config.remote);
        Ok(Self {
            config,
            store,
            naming,
            cancel: CancellationToken::new(),
        })
    }

    /// Pipeline configuration.
    pub fn config(&self) -> &Config {
        &self.config
    }

    /// Token that stops a running sync from starting new downloads.
    pub fn cancellation_token(&self) -> CancellationToken {
        self.cancel.clone()
    }

    /// Download every remote date missing locally.
    ///
    /// Only a catalog failure is an error; per-date failures are reported.
    pub async fn sync(&self) -> Result<SyncReport> {
        let symbol = &self.config.instrument.symbol;
        let market = &self.config.instrument.market;
        let root = &self.config.storage.root;

        let catalog = RemoteCatalog::new(self.store.clone(), self.naming.clone());
        let remote = catalog.list(symbol, market).await?;

        let inventory =
            LocalInventory::new(self.naming.clone(), &self.config.storage.data_extension);
        let local = inventory.scan(root, symbol, market)?;

        let missing = SyncPlanner::plan(&remote, &local);
        let jobs = SyncPlanner::jobs(symbol, market, &missing);
        info!(
            symbol = %symbol,
            market = %market,
            remote = remote.len(),
            local = local.len(),
            missing = jobs.len(),
            "Sync planned"
        );

        let fetcher = ArchiveFetcher::new(
            self.store.clone(),
            self.naming.clone(),
            root.clone(),
            &self.config.storage.data_extension,
        );
        let options = SchedulerOptions::from_config(&self.config.sync);
        let scheduler =
            SyncScheduler::new(Arc::new(fetcher), options).with_cancellation(self.cancel.clone());
        let outcomes = scheduler.run(&jobs).await;

        let report = SyncReport {
            remote: remote.len(),
            skipped: remote.len() - missing.len(),
            outcomes,
        };
        for (date, outcome) in report.failed() {
            warn!(date = %date, outcome = ?outcome, "Date not synchronized");
        }
        Ok(report)
    }

    /// Rebuild the summary from local records and persist it.
    pub async fn summarize(&self) -> Result<SummaryReport> {
        let config = self.config.clone();
        tokio::task::spawn_blocking(move || rebuild_summary(&config))
            .await
            .map_err(|e| Error::Other(format!("summary task failed: {}", e)))?
    }

    /// Sync, then rebuild the summary regardless of per-date failures.
    pub async fn sync_and_summarize(&self) -> Result<(SyncReport, SummaryReport)> {
        let sync = self.sync().await?;
        let summary = self.summarize().await?;
        Ok((sync, summary))
    }

    /// Load the last persisted summary table.
    pub fn load_summary(&self) -> Result<Vec<DailySummaryRow>> {
        let instrument = &self.config.instrument;
        summary_store(&self.config).load(&instrument.symbol, &instrument.market)
    }
}

/// Summary store described by `config`.
pub fn summary_store(config: &Config) -> SummaryStore {
    SummaryStore::new(config.storage.root.clone(), config.summary.clone())
}

/// Rebuild and persist the summary table described by `config`.
pub fn rebuild_summary(config: &Config) -> Result<SummaryReport> {
    let symbol = &config.instrument.symbol;
    let market = &config.instrument.market;
    let loader = RecordLoader::new(&config.storage.data_extension);
    let report = summarize(&loader, &config.storage.root, symbol, market)?;
    summary_store(config).save(symbol, market, &report.rows)?;
    Ok(report)
}

/// Sync `instrument`/`market` into `local_root` from the public archive store
/// and return the rebuilt daily summary.
pub async fn sync_and_summarize(
    instrument: &str,
    market: &str,
    local_root: impl Into<PathBuf>,
    max_parallel: usize,
) -> Result<Vec<DailySummaryRow>> {
    let mut config = Config::default();
    config.instrument.symbol = instrument.to_string();
    config.instrument.market = market.to_string();
    config.storage.root = local_root.into();
    config.sync.max_parallel = max_parallel.max(1);

    let pipeline = LiquidationPipeline::from_config(config)?;
    let (_, summary) = pipeline.sync_and_summarize().await?;
    Ok(summary.rows)
}
