//! Sync planning: which remote dates are missing locally.

use chrono::NaiveDate;
use liquidation_core::DownloadJob;
use std::collections::BTreeSet;

/// Pure diff between the remote catalog and the local inventory.
pub struct SyncPlanner;

impl SyncPlanner {
    /// Dates published remotely but not present locally.
    pub fn plan(remote: &BTreeSet<NaiveDate>, local: &BTreeSet<NaiveDate>) -> BTreeSet<NaiveDate> {
        remote.difference(local).copied().collect()
    }

    /// Turn missing dates into download jobs.
    pub fn jobs(symbol: &str, market: &str, dates: &BTreeSet<NaiveDate>) -> BTreeSet<DownloadJob> {
        dates
            .iter()
            .map(|&date| DownloadJob::new(symbol, market, date))
            .collect()
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn dates(days: &[u32]) -> BTreeSet<NaiveDate> {
        days.iter()
            .map(|&d| NaiveDate::from_ymd_opt(2024, 1, d).unwrap())
            .collect()
    }

    #[test]
    fn test_plan_is_set_difference() {
        let remote = dates(&[1, 2, 3, 4]);
        let local = dates(&[2, 4, 9]);
        assert_eq!(SyncPlanner::plan(&remote, &local), dates(&[1, 3]));
    }

    #[test]
    fn test_plan_identity_cases() {
        let remote = dates(&[1, 2, 3]);
        assert!(SyncPlanner::plan(&remote, &remote).is_empty());
        assert_eq!(SyncPlanner::plan(&remote, &BTreeSet::new()), remote);
        assert!(SyncPlanner::plan(&BTreeSet::new(), &remote).is_empty());
    }

    #[test]
    fn test_jobs_carry_instrument() {
        let jobs = SyncPlanner::jobs("BTCUSDT", "um", &dates(&[5, 6]));
        assert_eq!(jobs.len(), 2);
        assert!(jobs.iter().all(|j| j.instrument == "BTCUSDT" && j.market == "um"));
    }
}
