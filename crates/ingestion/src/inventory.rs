//! Local inventory of materialized dates.

use chrono::NaiveDate;
use liquidation_core::naming::has_extension;
use liquidation_core::{ArchiveNaming, Result};
use std::collections::BTreeSet;
use std::io::ErrorKind;
use std::path::{Path, PathBuf};
use tracing::debug;

/// Scans the local store for dates that are already present.
#[derive(Debug, Clone)]
pub struct LocalInventory {
    naming: ArchiveNaming,
    data_extension: String,
}

impl LocalInventory {
    /// Create an inventory using the shared naming convention.
    pub fn new(naming: ArchiveNaming, data_extension: impl Into<String>) -> Self {
        Self {
            naming,
            data_extension: data_extension.into(),
        }
    }

    /// Directory holding one instrument/market's data files.
    pub fn market_dir(root: &Path, symbol: &str, market: &str) -> PathBuf {
        root.join(symbol).join(market)
    }

    /// Dates with a data file directly under `{root}/{symbol}/{market}`.
    ///
    /// A missing directory is an empty inventory. Subdirectories (including
    /// in-flight staging directories) are not looked into.
    pub fn scan(&self, root: &Path, symbol: &str, market: &str) -> Result<BTreeSet<NaiveDate>> {
        let dir = Self::market_dir(root, symbol, market);
        let entries = match std::fs::read_dir(&dir) {
            Ok(entries) => entries,
            Err(e) if e.kind() == ErrorKind::NotFound => {
                debug!(dir = %dir.display(), "Local directory missing, inventory empty");
                return Ok(BTreeSet::new());
            }
            Err(e) => return Err(e.into()),
        };

        let mut dates = BTreeSet::new();
        for entry in entries {
            let entry = entry?;
            if !entry.file_type()?.is_file() {
                continue;
            }
            let name = entry.file_name();
            let Some(name) = name.to_str() else {
                continue;
            };
            if !has_extension(name, &self.data_extension) {
                continue;
            }
            if let Some(date) = self.naming.extract_symbol_date(name, symbol) {
                dates.insert(date);
            }
        }
        Ok(dates)
    }
}
