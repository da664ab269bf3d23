//! Daily liquidation summary building.
//!
//! Folds raw records into one row per UTC day with per-side notional volume
//! and the volume-weighted average price across both sides.

use chrono::NaiveDate;
use liquidation_core::{DailySummaryRow, RawEventRecord, Result, Side};
use rust_decimal::Decimal;
use std::collections::{BTreeMap, HashSet};
use std::path::Path;
use tracing::{info, warn};

use crate::loader::{LoadStats, RecordLoader};

/// Running totals of one side of one day.
#[derive(Debug, Clone, Default)]
struct SideTotals {
    /// Σ quantity × average price.
    volume: Decimal,
    /// Σ quantity.
    quantity: Decimal,
}

impl SideTotals {
    /// Volume and average price, or `None` when the group has no quantity.
    fn settled(&self) -> Option<(Decimal, Decimal)> {
        if self.quantity.is_zero() {
            return None;
        }
        let avg_price = self.volume.checked_div(self.quantity)?;
        Some((self.volume, avg_price))
    }
}

/// A day that's currently being aggregated.
#[derive(Debug, Clone, Default)]
struct DayInProgress {
    buy: SideTotals,
    sell: SideTotals,
}

impl DayInProgress {
    fn side(&self, side: Side) -> &SideTotals {
        match side {
            Side::Buy => &self.buy,
            Side::Sell => &self.sell,
        }
    }

    fn side_mut(&mut self, side: Side) -> &mut SideTotals {
        match side {
            Side::Buy => &mut self.buy,
            Side::Sell => &mut self.sell,
        }
    }

    fn to_row(&self, date: NaiveDate) -> DailySummaryRow {
        let buy = self.buy.settled();
        let sell = self.sell.settled();

        let shorts_volume_usd = buy.map_or(Decimal::ZERO, |(volume, _)| volume);
        let longs_volume_usd = sell.map_or(Decimal::ZERO, |(volume, _)| volume);

        let price = if shorts_volume_usd.is_zero() && longs_volume_usd.is_zero() {
            None
        } else {
            let sides = [buy, sell];
            exact_weighted_price(&sides).or_else(|| scaled_weighted_price(&sides))
        };

        DailySummaryRow {
            date,
            shorts_volume_usd,
            longs_volume_usd,
            price,
        }
    }
}

/// `Σ avg·volume / Σ volume`, or `None` if an intermediate overflows.
fn exact_weighted_price(sides: &[Option<(Decimal, Decimal)>; 2]) -> Option<Decimal> {
    let (weighted, total) = sides.iter().flatten().try_fold(
        (Decimal::ZERO, Decimal::ZERO),
        |(weighted, total), &(volume, avg)| {
            Some((
                weighted.checked_add(avg.checked_mul(volume)?)?,
                total.checked_add(volume)?,
            ))
        },
    )?;
    weighted.checked_div(total)
}

/// Same average with weights normalized to the larger volume first, so every
/// intermediate stays within the price range.
fn scaled_weighted_price(sides: &[Option<(Decimal, Decimal)>; 2]) -> Option<Decimal> {
    let largest = sides.iter().flatten().map(|&(volume, _)| volume).max()?;
    let ratios: Vec<(Decimal, Decimal)> = sides
        .iter()
        .flatten()
        .map(|&(volume, avg)| Some((volume.checked_div(largest)?, avg)))
        .collect::<Option<_>>()?;
    let denom = ratios
        .iter()
        .try_fold(Decimal::ZERO, |acc, &(ratio, _)| acc.checked_add(ratio))?;
    ratios.iter().try_fold(Decimal::ZERO, |acc, &(ratio, avg)| {
        acc.checked_add(avg.checked_mul(ratio.checked_div(denom)?)?)
    })
}

/// Builds the daily summary from raw records.
///
/// Exact duplicate records are dropped on insertion, before they reach any
/// totals.
#[derive(Debug, Default)]
pub struct AggregationEngine {
    days: BTreeMap<NaiveDate, DayInProgress>,
    seen: HashSet<RawEventRecord>,
    duplicates: u64,
    rejected: u64,
}

impl AggregationEngine {
    /// Create an empty engine.
    pub fn new() -> Self {
        Self::default()
    }

    /// Add one record. Returns `false` if it was a duplicate or unusable.
    ///
    /// A record whose volume would overflow its day's totals is rejected and
    /// leaves the totals untouched.
    pub fn add_record(&mut self, record: RawEventRecord) -> bool {
        if self.seen.contains(&record) {
            self.duplicates += 1;
            return false;
        }

        let date = record.date();
        let current = self
            .days
            .get(&date)
            .map(|day| day.side(record.side).clone())
            .unwrap_or_default();
        let updated = record
            .quantity
            .checked_mul(record.average_price)
            .and_then(|volume| {
                Some(SideTotals {
                    volume: current.volume.checked_add(volume)?,
                    quantity: current.quantity.checked_add(record.quantity)?,
                })
            });
        let Some(updated) = updated else {
            warn!(
                time = %record.event_time,
                side = %record.side,
                "Skipping record with overflowing volume"
            );
            self.rejected += 1;
            return false;
        };

        *self.days.entry(date).or_default().side_mut(record.side) = updated;
        self.seen.insert(record);
        true
    }

    /// Add multiple records.
    pub fn add_records(&mut self, records: impl IntoIterator<Item = RawEventRecord>) {
        for record in records {
            self.add_record(record);
        }
    }

    /// Number of duplicate records dropped so far.
    pub fn duplicate_count(&self) -> u64 {
        self.duplicates
    }

    /// Number of records rejected because their volume overflowed.
    pub fn rejected_count(&self) -> u64 {
        self.rejected
    }

    /// Number of distinct days seen.
    pub fn day_count(&self) -> usize {
        self.days.len()
    }

    /// Rows in ascending date order, one per day.
    pub fn rows(&self) -> Vec<DailySummaryRow> {
        self.days
            .iter()
            .map(|(&date, day)| day.to_row(date))
            .collect()
    }

    /// Clear all state.
    pub fn clear(&mut self) {
        self.days.clear();
        self.seen.clear();
        self.duplicates = 0;
        self.rejected = 0;
    }
}

/// Full rebuild result.
#[derive(Debug, Clone, Default)]
pub struct SummaryReport {
    /// Summary rows in ascending date order.
    pub rows: Vec<DailySummaryRow>,
    /// Loader counters.
    pub stats: LoadStats,
    /// Exact duplicate records removed.
    pub duplicates: u64,
    /// Records dropped because their volume overflowed.
    pub rejected: u64,
}

/// Rebuild the daily summary from every local record of `symbol`/`market`.
pub fn summarize(
    loader: &RecordLoader,
    root: &Path,
    symbol: &str,
    market: &str,
) -> Result<SummaryReport> {
    let (records, stats) = loader.load(root, symbol, market)?;

    let mut engine = AggregationEngine::new();
    engine.add_records(records);
    let rows = engine.rows();

    let undefined = rows.iter().filter(|r| r.has_undefined_price()).count();
    info!(
        symbol = %symbol,
        market = %market,
        days = rows.len(),
        duplicates = engine.duplicate_count(),
        malformed = stats.malformed,
        rejected = engine.rejected_count(),
        undefined_price_days = undefined,
        "Liquidation summary rebuilt"
    );

    Ok(SummaryReport {
        rows,
        stats,
        duplicates: engine.duplicate_count(),
        rejected: engine.rejected_count(),
    })
}
