//! Core types and configuration for the liquidation sync pipeline.
//!
//! This crate provides shared types used across all other crates:
//! - Liquidation records, download jobs and daily summary rows
//! - Archive naming convention (remote keys, date extraction)
//! - Configuration structures
//! - Common error types

pub mod config;
pub mod error;
pub mod naming;
pub mod types;

pub use config::Config;
pub use error::{Error, Result};
pub use naming::ArchiveNaming;
pub use types::*;
