//! Raw liquidation record loading.
//!
//! Data files are CSV with a header row. Column sets vary between exchange
//! file generations, so columns are matched by name and everything except
//! the four aggregation inputs is optional.

use chrono::DateTime;
use liquidation_core::naming::has_extension;
use liquidation_core::{Error, RawEventRecord, RecordExtras, Result, Side};
use rust_decimal::Decimal;
use serde::Deserialize;
use std::io::{ErrorKind, Read};
use std::path::{Path, PathBuf};
use std::str::FromStr;
use tracing::{debug, warn};

/// Counters collected while loading records.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct LoadStats {
    /// Data files read.
    pub files: u64,
    /// Data files that could not be opened.
    pub unreadable_files: u64,
    /// Records accepted.
    pub rows: u64,
    /// Rows skipped for missing or invalid fields.
    pub malformed: u64,
}

impl LoadStats {
    /// Reset statistics.
    pub fn reset(&mut self) {
        *self = Self::default();
    }
}

/// One CSV row as written by the exchange.
#[derive(Debug, Deserialize)]
struct CsvLiquidationRow {
    #[serde(default)]
    time: Option<String>,
    #[serde(default)]
    side: Option<String>,
    #[serde(default, alias = "quantity")]
    original_quantity: Option<String>,
    #[serde(default)]
    average_price: Option<String>,
    #[serde(default)]
    order_type: Option<String>,
    #[serde(default)]
    time_in_force: Option<String>,
    #[serde(default)]
    price: Option<String>,
    #[serde(default)]
    order_status: Option<String>,
    #[serde(default)]
    last_fill_quantity: Option<String>,
    #[serde(default)]
    accumulated_fill_quantity: Option<String>,
}

impl CsvLiquidationRow {
    fn into_record(self) -> Result<RawEventRecord> {
        let time = required(self.time, "time")?;
        let ts_ms: i64 = time
            .trim()
            .parse()
            .map_err(|_| Error::malformed(format!("invalid time '{}'", time)))?;
        let event_time = DateTime::from_timestamp_millis(ts_ms)
            .ok_or_else(|| Error::malformed(format!("time out of range: {}", ts_ms)))?;

        let side = Side::from_str(&required(self.side, "side")?)?;
        let quantity = non_negative(
            &required(self.original_quantity, "original_quantity")?,
            "original_quantity",
        )?;
        let average_price = non_negative(
            &required(self.average_price, "average_price")?,
            "average_price",
        )?;

        let extra = RecordExtras {
            order_type: self.order_type,
            time_in_force: self.time_in_force,
            price: optional_decimal(self.price, "price")?,
            order_status: self.order_status,
            last_fill_quantity: optional_decimal(self.last_fill_quantity, "last_fill_quantity")?,
            accumulated_fill_quantity: optional_decimal(
                self.accumulated_fill_quantity,
                "accumulated_fill_quantity",
            )?,
        };

        Ok(RawEventRecord {
            event_time,
            side,
            quantity,
            average_price,
            extra,
        })
    }
}

fn required(value: Option<String>, field: &str) -> Result<String> {
    value
        .filter(|v| !v.trim().is_empty())
        .ok_or_else(|| Error::malformed(format!("missing {}", field)))
}

fn parse_decimal(raw: &str, field: &str) -> Result<Decimal> {
    let raw = raw.trim();
    Decimal::from_str(raw)
        .or_else(|_| Decimal::from_scientific(raw))
        .map_err(|_| Error::malformed(format!("invalid {} '{}'", field, raw)))
}

fn non_negative(raw: &str, field: &str) -> Result<Decimal> {
    let value = parse_decimal(raw, field)?;
    if value < Decimal::ZERO {
        return Err(Error::malformed(format!("negative {} {}", field, value)));
    }
    Ok(value)
}

fn optional_decimal(value: Option<String>, field: &str) -> Result<Option<Decimal>> {
    match value {
        Some(raw) if !raw.trim().is_empty() => parse_decimal(&raw, field).map(Some),
        _ => Ok(None),
    }
}

/// Loads every raw record of one instrument/market from the local store.
#[derive(Debug, Clone)]
pub struct RecordLoader {
    data_extension: String,
}

impl RecordLoader {
    /// Create a loader for files with the given extension.
    pub fn new(data_extension: impl Into<String>) -> Self {
        Self {
            data_extension: data_extension.into(),
        }
    }

    /// Data files directly under `{root}/{symbol}/{market}`, sorted by name.
    pub fn data_files(&self, root: &Path, symbol: &str, market: &str) -> Result<Vec<PathBuf>> {
        let dir = root.join(symbol).join(market);
        let entries = match std::fs::read_dir(&dir) {
            Ok(entries) => entries,
            Err(e) if e.kind() == ErrorKind::NotFound => return Ok(Vec::new()),
            Err(e) => return Err(e.into()),
        };

        let mut files = Vec::new();
        for entry in entries {
            let entry = entry?;
            if !entry.file_type()?.is_file() {
                continue;
            }
            let path = entry.path();
            let is_data = path
                .file_name()
                .and_then(|n| n.to_str())
                .map_or(false, |n| has_extension(n, &self.data_extension));
            if is_data {
                files.push(path);
            }
        }
        files.sort();
        Ok(files)
    }

    /// Load all records. Unreadable files and malformed rows are skipped.
    pub fn load(
        &self,
        root: &Path,
        symbol: &str,
        market: &str,
    ) -> Result<(Vec<RawEventRecord>, LoadStats)> {
        let mut stats = LoadStats::default();
        let mut records = Vec::new();

        for path in self.data_files(root, symbol, market)? {
            match std::fs::File::open(&path) {
                Ok(file) => {
                    stats.files += 1;
                    let source = path.display().to_string();
                    records.extend(read_records(file, &source, &mut stats));
                }
                Err(e) => {
                    stats.unreadable_files += 1;
                    warn!(file = %path.display(), error = %e, "Skipping unreadable data file");
                }
            }
        }

        if stats.malformed > 0 {
            warn!(
                symbol = %symbol,
                market = %market,
                malformed = stats.malformed,
                "Skipped malformed liquidation rows"
            );
        }
        debug!(files = stats.files, rows = stats.rows, "Liquidation records loaded");
        Ok((records, stats))
    }
}

/// Parse records from one CSV source, counting malformed rows into `stats`.
pub fn read_records<R: Read>(
    reader: R,
    source: &str,
    stats: &mut LoadStats,
) -> Vec<RawEventRecord> {
    let mut csv_reader = csv::ReaderBuilder::new()
        .has_headers(true)
        .trim(csv::Trim::All)
        .from_reader(reader);

    let mut records = Vec::new();
    for (idx, result) in csv_reader.deserialize::<CsvLiquidationRow>().enumerate() {
        let parsed = result.map_err(Error::from).and_then(CsvLiquidationRow::into_record);
        match parsed {
            Ok(record) => {
                stats.rows += 1;
                records.push(record);
            }
            Err(Error::Csv(e)) if matches!(e.kind(), csv::ErrorKind::Io(_)) => {
                stats.malformed += 1;
                warn!(source = %source, error = %e, "Stopped reading data file");
                break;
            }
            Err(e) => {
                stats.malformed += 1;
                debug!(source = %source, row = idx + 1, error = %e, "Skipping malformed row");
            }
        }
    }
    records
}

#[cfg(test)]
mod tests {
    use super::*;
    use rust_decimal_macros::dec;

    const HEADER: &str = "side,order_type,time_in_force,original_quantity,price,average_price,order_status,last_fill_quantity,accumulated_fill_quantity,time";

    fn read(body: &str) -> (Vec<RawEventRecord>, LoadStats) {
        let mut stats = LoadStats::default();
        let records = read_records(body.as_bytes(), "test", &mut stats);
        (records, stats)
    }

    #[test]
    fn test_reads_exchange_layout() {
        let body = format!(
            "{}\nSELL,LIMIT,IOC,0.500,41000.0,41050.5,FILLED,0.500,0.500,1704067200123\n",
            HEADER
        );
        let (records, stats) = read(&body);

        assert_eq!(stats.rows, 1);
        assert_eq!(stats.malformed, 0);
        let record = &records[0];
        assert_eq!(record.side, Side::Sell);
        assert_eq!(record.quantity, dec!(0.5));
        assert_eq!(record.average_price, dec!(41050.5));
        assert_eq!(record.extra.order_status.as_deref(), Some("FILLED"));
        assert_eq!(record.event_time.timestamp_millis(), 1_704_067_200_123);
    }

    #[test]
    fn test_reduced_layout_is_accepted() {
        let body = "time,side,original_quantity,average_price\n1704067200000,BUY,2,100\n";
        let (records, stats) = read(body);
        assert_eq!(stats.rows, 1);
        assert_eq!(records[0].extra, RecordExtras::default());
    }

    #[test]
    fn test_malformed_rows_are_counted_not_fatal() {
        let body = "time,side,original_quantity,average_price\n\
                    1704067200000,BUY,2,100\n\
                    1704067200000,HOLD,2,100\n\
                    ,SELL,1,200\n\
                    1704067200000,SELL,abc,200\n\
                    1704067200000,SELL,-1,200\n\
                    1704067200000,SELL,1\n\
                    1704067200000,SELL,1,200\n";
        let (records, stats) = read(body);
        assert_eq!(records.len(), 2);
        assert_eq!(stats.rows, 2);
        assert_eq!(stats.malformed, 5);
    }

    #[test]
    fn test_missing_required_column_rejects_every_row() {
        let body = "time,side,original_quantity\n1704067200000,BUY,2\n1704067200000,SELL,1\n";
        let (records, stats) = read(body);
        assert!(records.is_empty());
        assert_eq!(stats.malformed, 2);
    }

    #[test]
    fn test_load_reads_all_data_files() {
        let root = tempfile::tempdir().unwrap();
        let dir = root.path().join("BTCUSDT").join("um");
        std::fs::create_dir_all(&dir).unwrap();
        std::fs::write(
            dir.join("BTCUSDT-liquidationSnapshot-2024-01-01.csv"),
            "time,side,original_quantity,average_price\n1704067200000,BUY,2,100\n",
        )
        .unwrap();
        std::fs::write(
            dir.join("BTCUSDT-liquidationSnapshot-2024-01-02.csv"),
            "time,side,original_quantity,average_price\n1704153600000,SELL,1,200\n",
        )
        .unwrap();
        std::fs::write(dir.join("notes.txt"), "ignored").unwrap();

        let loader = RecordLoader::new("csv");
        let (records, stats) = loader.load(root.path(), "BTCUSDT", "um").unwrap();
        assert_eq!(stats.files, 2);
        assert_eq!(records.len(), 2);
    }

    #[test]
    fn test_load_missing_directory_is_empty() {
        let root = tempfile::tempdir().unwrap();
        let (records, stats) = RecordLoader::new("csv").load(root.path(), "BTCUSDT", "um").unwrap();
        assert!(records.is_empty());
        assert_eq!(stats, LoadStats::default());
    }
}
