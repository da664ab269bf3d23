//! Daily aggregation of liquidation records.
//!
//! This crate handles:
//! - Loading raw liquidation records from local data files
//! - Deduplication of repeated rows
//! - Per-day, per-side volume and volume-weighted price
//! - Persisting and loading the daily summary table

pub mod engine;
pub mod loader;
pub mod store;

pub use engine::{summarize, AggregationEngine, SummaryReport};
pub use loader::{LoadStats, RecordLoader};
pub use store::SummaryStore;
