//! End-to-end liquidation sync and summary pipeline.
//!
//! Composes the remote catalog, local inventory, planner and scheduler into
//! one sync step, then rebuilds and persists the daily summary table.

pub mod pipeline;
pub mod report;

pub use pipeline::{rebuild_summary, summary_store, sync_and_summarize, LiquidationPipeline};
pub use report::SyncReport;
