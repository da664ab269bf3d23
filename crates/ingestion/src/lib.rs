//! Remote archive synchronization for the liquidation pipeline.
//!
//! This crate handles:
//! - Listing published archives (paginated object store listing)
//! - Scanning the dates already materialized locally
//! - Planning the missing dates
//! - Fetching and atomically extracting one date's archive
//! - Running fetches over a bounded worker pool

pub mod catalog;
pub mod fetcher;
pub mod inventory;
pub mod planner;
pub mod scheduler;
pub mod store;

pub use catalog::RemoteCatalog;
pub use fetcher::{ArchiveFetcher, Fetch};
pub use inventory::LocalInventory;
pub use planner::SyncPlanner;
pub use scheduler::{SchedulerOptions, SyncScheduler};
pub use store::{HttpObjectStore, ListPage, ObjectStore};
