//! Core data types for the liquidation sync pipeline.

use chrono::{DateTime, NaiveDate, Utc};
use rust_decimal::Decimal;
use serde::{Deserialize, Serialize};
use std::fmt;
use std::str::FromStr;

use crate::error::Error;

/// Timestamp in milliseconds since Unix epoch (UTC).
pub type TimestampMs = i64;

/// Convert a millisecond timestamp to its UTC calendar day.
#[inline]
pub fn ts_to_date(ts_ms: TimestampMs) -> Option<NaiveDate> {
    DateTime::from_timestamp_millis(ts_ms).map(|dt| dt.date_naive())
}

/// Side of a liquidation order.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize)]
#[serde(rename_all = "UPPERCASE")]
pub enum Side {
    /// Forced buy: a short position was liquidated.
    Buy,
    /// Forced sell: a long position was liquidated.
    Sell,
}

impl Side {
    /// Wire name as it appears in exchange files.
    pub fn as_str(self) -> &'static str {
        match self {
            Side::Buy => "BUY",
            Side::Sell => "SELL",
        }
    }
}

impl fmt::Display for Side {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

impl FromStr for Side {
    type Err = Error;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s.trim().to_ascii_uppercase().as_str() {
            "BUY" => Ok(Side::Buy),
            "SELL" => Ok(Side::Sell),
            other => Err(Error::malformed(format!("unknown side '{}'", other))),
        }
    }
}

/// One liquidation event as read from a local data file.
///
/// Equality and hashing cover every column, so exact duplicate rows from
/// overlapping files collapse to one record.
#[derive(Debug, Clone, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub struct RawEventRecord {
    /// Event time (UTC).
    pub event_time: DateTime<Utc>,
    /// Order side.
    pub side: Side,
    /// Original order quantity.
    pub quantity: Decimal,
    /// Average fill price.
    pub average_price: Decimal,
    /// Columns not needed for aggregation but part of the row identity.
    pub extra: RecordExtras,
}

impl RawEventRecord {
    /// Create a record with no optional columns.
    pub fn new(
        event_time: DateTime<Utc>,
        side: Side,
        quantity: Decimal,
        average_price: Decimal,
    ) -> Self {
        Self {
            event_time,
            side,
            quantity,
            average_price,
            extra: RecordExtras::default(),
        }
    }

    /// Notional value in quote currency (quantity × average price).
    #[inline]
    pub fn volume(&self) -> Decimal {
        self.quantity * self.average_price
    }

    /// UTC calendar day of the event.
    #[inline]
    pub fn date(&self) -> NaiveDate {
        self.event_time.date_naive()
    }
}

/// Optional exchange columns. Older files omit some of them.
#[derive(Debug, Clone, Default, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub struct RecordExtras {
    pub order_type: Option<String>,
    pub time_in_force: Option<String>,
    pub price: Option<Decimal>,
    pub order_status: Option<String>,
    pub last_fill_quantity: Option<Decimal>,
    pub accumulated_fill_quantity: Option<Decimal>,
}

/// One row of the daily summary table.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct DailySummaryRow {
    /// UTC calendar day.
    pub date: NaiveDate,
    /// Liquidated short volume in USD (BUY side).
    pub shorts_volume_usd: Decimal,
    /// Liquidated long volume in USD (SELL side).
    pub longs_volume_usd: Decimal,
    /// Volume-weighted average price; `None` when both volumes are zero.
    pub price: Option<Decimal>,
}

impl DailySummaryRow {
    /// Whether the row's price is undefined.
    pub fn has_undefined_price(&self) -> bool {
        self.price.is_none()
    }

    /// Total liquidated volume of the day.
    pub fn total_volume_usd(&self) -> Decimal {
        self.shorts_volume_usd.saturating_add(self.longs_volume_usd)
    }
}

/// Unit of work for the download scheduler.
#[derive(Debug, Clone, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize)]
pub struct DownloadJob {
    pub instrument: String,
    pub market: String,
    pub date: NaiveDate,
}

impl DownloadJob {
    /// Create a download job.
    pub fn new(instrument: impl Into<String>, market: impl Into<String>, date: NaiveDate) -> Self {
        Self {
            instrument: instrument.into(),
            market: market.into(),
            date,
        }
    }
}

impl fmt::Display for DownloadJob {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}/{}/{}", self.instrument, self.market, self.date)
    }
}

/// Why a download job failed.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum FailureReason {
    /// Transport failure or non-success response.
    Download,
    /// Payload was not a usable archive.
    Extract,
    /// Run deadline elapsed before the job finished.
    Timeout,
    /// Run was cancelled before the job started.
    Cancelled,
}

impl FailureReason {
    pub fn as_str(self) -> &'static str {
        match self {
            FailureReason::Download => "download",
            FailureReason::Extract => "extract",
            FailureReason::Timeout => "timeout",
            FailureReason::Cancelled => "cancelled",
        }
    }
}

impl fmt::Display for FailureReason {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

/// Result of one download job. Failures are values, never raised.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub enum JobOutcome {
    /// Archive fetched and promoted; number of data files written.
    Success { files: usize },
    /// Job failed; the date reappears in the next diff.
    Failure { reason: FailureReason, detail: String },
}

impl JobOutcome {
    /// Create a failure outcome.
    pub fn failure(reason: FailureReason, detail: impl Into<String>) -> Self {
        JobOutcome::Failure {
            reason,
            detail: detail.into(),
        }
    }

    #[inline]
    pub fn is_success(&self) -> bool {
        matches!(self, JobOutcome::Success { .. })
    }

    /// Failure reason, if any.
    pub fn reason(&self) -> Option<FailureReason> {
        match self {
            JobOutcome::Success { .. } => None,
            JobOutcome::Failure { reason, .. } => Some(*reason),
        }
    }
}
