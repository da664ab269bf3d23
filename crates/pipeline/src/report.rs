//! Sync run report.

use chrono::NaiveDate;
use liquidation_core::JobOutcome;
use serde::Serialize;
use std::collections::BTreeMap;

/// What one sync run found and did.
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize)]
pub struct SyncReport {
    /// Dates published remotely.
    pub remote: usize,
    /// Remote dates already present locally.
    pub skipped: usize,
    /// Outcome of every job that was scheduled.
    pub outcomes: BTreeMap<NaiveDate, JobOutcome>,
}

impl SyncReport {
    /// Dates fetched and extracted in this run.
    pub fn fetched(&self) -> Vec<NaiveDate> {
        self.outcomes
            .iter()
            .filter(|(_, o)| o.is_success())
            .map(|(&date, _)| date)
            .collect()
    }

    /// Dates whose job failed, with the outcome.
    pub fn failed(&self) -> BTreeMap<NaiveDate, &JobOutcome> {
        self.outcomes
            .iter()
            .filter(|(_, o)| !o.is_success())
            .map(|(&date, o)| (date, o))
            .collect()
    }

    /// True when every scheduled job succeeded.
    pub fn is_complete(&self) -> bool {
        self.outcomes.values().all(JobOutcome::is_success)
    }
}
