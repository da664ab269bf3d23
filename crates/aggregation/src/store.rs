//! Persisted daily summary table.
//!
//! The table lives at `{root}/summary/{symbol}/{market}/{stem}.csv` with
//! columns `date,<buy label>,<sell label>,price`. An undefined price is an
//! empty cell. Each save replaces the whole file through a rename.

use chrono::NaiveDate;
use liquidation_core::config::SummaryConfig;
use liquidation_core::{DailySummaryRow, Error, Result};
use rust_decimal::Decimal;
use std::io::ErrorKind;
use std::path::{Path, PathBuf};
use std::str::FromStr;
use tempfile::NamedTempFile;
use tracing::info;

const DATE_FORMAT: &str = "%Y-%m-%d";

/// Reads and writes the summary table.
#[derive(Debug, Clone)]
pub struct SummaryStore {
    root: PathBuf,
    config: SummaryConfig,
}

impl SummaryStore {
    /// Create a store under the local root.
    pub fn new(root: impl Into<PathBuf>, config: SummaryConfig) -> Self {
        Self {
            root: root.into(),
            config,
        }
    }

    /// Path of the table for one instrument/market.
    pub fn path(&self, symbol: &str, market: &str) -> PathBuf {
        self.root
            .join("summary")
            .join(symbol)
            .join(market)
            .join(format!("{}.csv", self.config.file_stem))
    }

    /// Replace the table with `rows`.
    pub fn save(&self, symbol: &str, market: &str, rows: &[DailySummaryRow]) -> Result<PathBuf> {
        let path = self.path(symbol, market);
        let dir = path
            .parent()
            .ok_or_else(|| Error::Other(format!("summary path {} has no parent", path.display())))?;
        std::fs::create_dir_all(dir)?;

        let mut tmp = NamedTempFile::new_in(dir)?;
        {
            let mut writer = csv::Writer::from_writer(tmp.as_file_mut());
            writer.write_record([
                "date",
                self.config.buy_label.as_str(),
                self.config.sell_label.as_str(),
                "price",
            ])?;
            for row in rows {
                writer.write_record([
                    row.date.format(DATE_FORMAT).to_string(),
                    row.shorts_volume_usd.normalize().to_string(),
                    row.longs_volume_usd.normalize().to_string(),
                    row.price.map(|p| p.normalize().to_string()).unwrap_or_default(),
                ])?;
            }
            writer.flush()?;
        }
        tmp.as_file().sync_all()?;
        tmp.persist(&path).map_err(|e| Error::Io(e.error))?;

        info!(path = %path.display(), rows = rows.len(), "Summary table written");
        Ok(path)
    }

    /// Load the table. A missing table is empty.
    pub fn load(&self, symbol: &str, market: &str) -> Result<Vec<DailySummaryRow>> {
        let path = self.path(symbol, market);
        match std::fs::File::open(&path) {
            Ok(file) => read_table(file, &path),
            Err(e) if e.kind() == ErrorKind::NotFound => Ok(Vec::new()),
            Err(e) => Err(e.into()),
        }
    }
}

fn read_table(file: std::fs::File, path: &Path) -> Result<Vec<DailySummaryRow>> {
    let mut reader = csv::ReaderBuilder::new()
        .has_headers(true)
        .trim(csv::Trim::All)
        .from_reader(file);

    let mut rows = Vec::new();
    for (idx, record) in reader.records().enumerate() {
        let record = record?;
        let field = |i: usize| record.get(i).unwrap_or("");
        let context = || format!("{} row {}", path.display(), idx + 1);

        let invalid = |what: &str, raw: &str| {
            Error::malformed(format!("{}: invalid {} '{}'", context(), what, raw))
        };

        let date = NaiveDate::parse_from_str(field(0), DATE_FORMAT)
            .map_err(|_| invalid("date", field(0)))?;
        let shorts_volume_usd =
            Decimal::from_str(field(1)).map_err(|_| invalid("volume", field(1)))?;
        let longs_volume_usd =
            Decimal::from_str(field(2)).map_err(|_| invalid("volume", field(2)))?;
        let price = match field(3) {
            "" => None,
            raw => Some(Decimal::from_str(raw).map_err(|_| invalid("price", raw))?),
        };

        rows.push(DailySummaryRow {
            date,
            shorts_volume_usd,
            longs_volume_usd,
            price,
        });
    }
    Ok(rows)
}

#[cfg(test)]
mod tests {
    use super::*;
    use rust_decimal_macros::dec;

    fn rows() -> Vec<DailySummaryRow> {
        vec![
            DailySummaryRow {
                date: NaiveDate::from_ymd_opt(2024, 1, 1).unwrap(),
                shorts_volume_usd: dec!(200.00),
                longs_volume_usd: dec!(200),
                price: Some(dec!(150)),
            },
            DailySummaryRow {
                date: NaiveDate::from_ymd_opt(2024, 1, 2).unwrap(),
                shorts_volume_usd: Decimal::ZERO,
                longs_volume_usd: Decimal::ZERO,
                price: None,
            },
        ]
    }

    #[test]
    fn test_table_layout() {
        let root = tempfile::tempdir().unwrap();
        let store = SummaryStore::new(root.path(), SummaryConfig::default());
        let path = store.save("BTCUSDT", "um", &rows()).unwrap();

        assert!(path.ends_with("summary/BTCUSDT/um/liquidation_summary.csv"));
        let text = std::fs::read_to_string(&path).unwrap();
        assert_eq!(
            text,
            "date,Shorts,Longs,price\n2024-01-01,200,200,150\n2024-01-02,0,0,\n"
        );
    }

    #[test]
    fn test_undefined_price_survives_reload() {
        let root = tempfile::tempdir().unwrap();
        let store = SummaryStore::new(root.path(), SummaryConfig::default());
        store.save("BTCUSDT", "um", &rows()).unwrap();

        let loaded = store.load("BTCUSDT", "um").unwrap();
        assert_eq!(loaded, rows());
        assert!(loaded[1].has_undefined_price());
    }

    #[test]
    fn test_save_replaces_previous_table() {
        let root = tempfile::tempdir().unwrap();
        let store = SummaryStore::new(root.path(), SummaryConfig::default());
        store.save("BTCUSDT", "um", &rows()).unwrap();
        store.save("BTCUSDT", "um", &rows()[..1]).unwrap();

        assert_eq!(store.load("BTCUSDT", "um").unwrap().len(), 1);
        let dir = store.path("BTCUSDT", "um").parent().unwrap().to_path_buf();
        assert_eq!(std::fs::read_dir(dir).unwrap().count(), 1);
    }

    #[test]
    fn test_missing_table_loads_empty() {
        let root = tempfile::tempdir().unwrap();
        let store = SummaryStore::new(root.path(), SummaryConfig::default());
        assert!(store.load("BTCUSDT", "um").unwrap().is_empty());
    }
}
