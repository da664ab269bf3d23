//! PyO3 bindings for the liquidation sync pipeline.
//!
//! Exposes to Python:
//! - Syncing an instrument/market and rebuilding its daily summary
//! - Rebuilding or loading the summary without touching the network
//! - Logging initialization

use pyo3::exceptions::{PyRuntimeError, PyValueError};
use pyo3::prelude::*;
use rust_decimal::prelude::ToPrimitive;
use std::path::PathBuf;
use tracing_subscriber::EnvFilter;

use liquidation_core::{Config, DailySummaryRow as RustDailySummaryRow, Error as RustError};
use liquidation_pipeline::{rebuild_summary, LiquidationPipeline};

// ============================================================================
// Python-exposed Types
// ============================================================================

/// One day of the liquidation summary.
#[pyclass]
#[derive(Clone)]
pub struct DailySummaryRow {
    /// UTC day, ISO formatted.
    #[pyo3(get)]
    pub date: String,
    /// Notional volume of BUY-side liquidations.
    #[pyo3(get)]
    pub shorts: f64,
    /// Notional volume of SELL-side liquidations.
    #[pyo3(get)]
    pub longs: f64,
    /// Volume-weighted price; None when the day had no volume.
    #[pyo3(get)]
    pub price: Option<f64>,
}

#[pymethods]
impl DailySummaryRow {
    fn __repr__(&self) -> String {
        let price = self
            .price
            .map_or_else(|| "None".to_string(), |p| p.to_string());
        format!(
            "DailySummaryRow(date={}, shorts={}, longs={}, price={})",
            self.date, self.shorts, self.longs, price
        )
    }
}

impl From<RustDailySummaryRow> for DailySummaryRow {
    fn from(row: RustDailySummaryRow) -> Self {
        DailySummaryRow {
            date: row.date.format("%Y-%m-%d").to_string(),
            shorts: row.shorts_volume_usd.to_f64().unwrap_or(f64::NAN),
            longs: row.longs_volume_usd.to_f64().unwrap_or(f64::NAN),
            price: row.price.and_then(|p| p.to_f64()),
        }
    }
}

fn to_py_err(err: RustError) -> PyErr {
    match err {
        RustError::Config(msg) => PyValueError::new_err(msg),
        other => PyRuntimeError::new_err(other.to_string()),
    }
}

fn to_py_rows(rows: Vec<RustDailySummaryRow>) -> Vec<DailySummaryRow> {
    rows.into_iter().map(DailySummaryRow::from).collect()
}

fn config_for(instrument: &str, market: &str, local_root: PathBuf) -> Config {
    let mut config = Config::default();
    config.instrument.symbol = instrument.to_string();
    config.instrument.market = market.to_string();
    config.storage.root = local_root;
    config
}

fn run_pipeline(py: Python<'_>, config: Config) -> PyResult<Vec<DailySummaryRow>> {
    let rows = py.allow_threads(move || {
        let runtime = tokio::runtime::Builder::new_multi_thread()
            .enable_all()
            .build()
            .map_err(RustError::from)?;
        runtime.block_on(async move {
            let pipeline = LiquidationPipeline::from_config(config)?;
            let (_, summary) = pipeline.sync_and_summarize().await?;
            Ok::<_, RustError>(summary.rows)
        })
    });
    rows.map(to_py_rows).map_err(to_py_err)
}

// ============================================================================
// Functions
// ============================================================================

/// Sync missing dates from the archive store and return the rebuilt summary.
#[pyfunction]
#[pyo3(signature = (instrument, market, local_root, max_parallel = 10))]
fn sync_and_summarize(
    py: Python<'_>,
    instrument: &str,
    market: &str,
    local_root: PathBuf,
    max_parallel: usize,
) -> PyResult<Vec<DailySummaryRow>> {
    let mut config = config_for(instrument, market, local_root);
    config.sync.max_parallel = max_parallel.max(1);
    run_pipeline(py, config)
}

/// Same as `sync_and_summarize`, with every setting read from a JSON file.
#[pyfunction]
fn sync_and_summarize_from_config(py: Python<'_>, path: PathBuf) -> PyResult<Vec<DailySummaryRow>> {
    let config = Config::from_json_file(path).map_err(to_py_err)?;
    run_pipeline(py, config)
}

/// Rebuild and persist the summary from local files only.
#[pyfunction]
fn summarize(
    py: Python<'_>,
    instrument: &str,
    market: &str,
    local_root: PathBuf,
) -> PyResult<Vec<DailySummaryRow>> {
    let config = config_for(instrument, market, local_root);
    let report = py
        .allow_threads(move || rebuild_summary(&config))
        .map_err(to_py_err)?;
    Ok(to_py_rows(report.rows))
}

/// Load the last persisted summary table.
#[pyfunction]
fn load_summary(
    instrument: &str,
    market: &str,
    local_root: PathBuf,
) -> PyResult<Vec<DailySummaryRow>> {
    let config = config_for(instrument, market, local_root);
    let store = liquidation_pipeline::summary_store(&config);
    store
        .load(instrument, market)
        .map(to_py_rows)
        .map_err(to_py_err)
}

/// Install a stderr log subscriber. Returns False if one was already set.
#[pyfunction]
#[pyo3(signature = (level = "info"))]
fn init_logging(level: &str) -> PyResult<bool> {
    let filter = EnvFilter::try_new(level).map_err(|e| PyValueError::new_err(e.to_string()))?;
    Ok(tracing_subscriber::fmt()
        .with_env_filter(filter)
        .with_writer(std::io::stderr)
        .try_init()
        .is_ok())
}

// ============================================================================
// Module Definition
// ============================================================================

/// Liquidation Sync - incremental archive sync and daily summaries for Python.
#[pymodule]
fn liquidation_sync(m: &Bound<'_, PyModule>) -> PyResult<()> {
    m.add_class::<DailySummaryRow>()?;

    m.add_function(wrap_pyfunction!(sync_and_summarize, m)?)?;
    m.add_function(wrap_pyfunction!(sync_and_summarize_from_config, m)?)?;
    m.add_function(wrap_pyfunction!(summarize, m)?)?;
    m.add_function(wrap_pyfunction!(load_summary, m)?)?;
    m.add_function(wrap_pyfunction!(init_logging, m)?)?;

    Ok(())
}
