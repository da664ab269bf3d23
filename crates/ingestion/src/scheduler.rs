//! Bounded-parallel download scheduling.
//!
//! Runs one fetch per job on a tokio task, at most `max_parallel` at a time,
//! and returns only after every job has an outcome. Failures stay with their
//! job; a deadline turns still-pending jobs into `timeout` failures and a
//! cancelled token stops new jobs from starting.

use chrono::NaiveDate;
use liquidation_core::config::SyncConfig;
use liquidation_core::{DownloadJob, FailureReason, JobOutcome};
use std::collections::{BTreeMap, BTreeSet};
use std::sync::atomic::{AtomicUsize, Ordering};
use std::sync::Arc;
use std::time::Duration;
use tokio::sync::Semaphore;
use tokio::task::JoinSet;
use tokio::time::{sleep_until, Instant};
use tokio_util::sync::CancellationToken;
use tracing::{info, warn};

use crate::fetcher::Fetch;

/// Scheduler options.
#[derive(Debug, Clone)]
pub struct SchedulerOptions {
    /// Maximum concurrent fetches (values below 1 behave as 1).
    pub max_parallel: usize,
    /// Wall-clock limit for the whole run, resubmissions included.
    pub timeout: Option<Duration>,
    /// Extra rounds for jobs whose download failed.
    pub resubmit_attempts: u32,
}

impl SchedulerOptions {
    /// Options from the sync configuration.
    pub fn from_config(config: &SyncConfig) -> Self {
        Self {
            max_parallel: config.max_parallel,
            timeout: config.timeout_secs.map(Duration::from_secs),
            resubmit_attempts: config.resubmit_attempts,
        }
    }

    /// Options with only the parallelism bound set.
    pub fn with_parallelism(max_parallel: usize) -> Self {
        Self {
            max_parallel,
            ..Self::default()
        }
    }
}

impl Default for SchedulerOptions {
    fn default() -> Self {
        Self::from_config(&SyncConfig::default())
    }
}

/// Runs download jobs over a bounded worker pool.
pub struct SyncScheduler<F: Fetch> {
    fetcher: Arc<F>,
    options: SchedulerOptions,
    cancel: CancellationToken,
    /// Jobs finished in the current round.
    completed: AtomicUsize,
    /// Jobs submitted in the current round.
    total: AtomicUsize,
}

impl<F: Fetch> SyncScheduler<F> {
    /// Create a scheduler.
    pub fn new(fetcher: Arc<F>, options: SchedulerOptions) -> Self {
        Self {
            fetcher,
            options,
            cancel: CancellationToken::new(),
            completed: AtomicUsize::new(0),
            total: AtomicUsize::new(0),
        }
    }

    /// `(completed, total)` jobs of the current or last round.
    pub fn progress(&self) -> (usize, usize) {
        (
            self.completed.load(Ordering::Relaxed),
            self.total.load(Ordering::Relaxed),
        )
    }

    /// Use an externally owned cancellation token.
    pub fn with_cancellation(mut self, cancel: CancellationToken) -> Self {
        self.cancel = cancel;
        self
    }

    /// Token that cancels this scheduler's runs.
    pub fn cancellation_token(&self) -> CancellationToken {
        self.cancel.clone()
    }

    /// Run every job and return one outcome per date.
    ///
    /// Jobs of one run belong to the same instrument/market, so dates are
    /// unique keys.
    pub async fn run(&self, jobs: &BTreeSet<DownloadJob>) -> BTreeMap<NaiveDate, JobOutcome> {
        if jobs.is_empty() {
            return BTreeMap::new();
        }

        let deadline = self.options.timeout.map(|t| Instant::now() + t);
        let mut outcomes = self.run_round(jobs.iter().cloned().collect(), deadline).await;

        for attempt in 1..=self.options.resubmit_attempts {
            if self.cancel.is_cancelled() || deadline.map_or(false, |d| Instant::now() >= d) {
                break;
            }
            let retry: Vec<DownloadJob> = jobs
                .iter()
                .filter(|job| {
                    outcomes.get(&job.date).and_then(JobOutcome::reason)
                        == Some(FailureReason::Download)
                })
                .cloned()
                .collect();
            if retry.is_empty() {
                break;
            }
            info!(attempt = attempt, jobs = retry.len(), "Resubmitting failed downloads");
            outcomes.extend(self.run_round(retry, deadline).await);
        }

        let failed = outcomes.values().filter(|o| !o.is_success()).count();
        info!(
            jobs = outcomes.len(),
            succeeded = outcomes.len() - failed,
            failed = failed,
            "Download run finished"
        );
        outcomes
    }

    async fn run_round(
        &self,
        jobs: Vec<DownloadJob>,
        deadline: Option<Instant>,
    ) -> BTreeMap<NaiveDate, JobOutcome> {
        let semaphore = Arc::new(Semaphore::new(self.options.max_parallel.max(1)));
        let mut tasks: JoinSet<(NaiveDate, JobOutcome)> = JoinSet::new();
        let mut outcomes = BTreeMap::new();
        let mut pending = BTreeSet::new();
        let mut stopped: Option<(DownloadJob, FailureReason)> = None;
        let total = jobs.len();
        self.total.store(total, Ordering::Relaxed);
        self.completed.store(0, Ordering::Relaxed);

        let mut queue = jobs.into_iter();
        for job in queue.by_ref() {
            let permit = tokio::select! {
                biased;
                _ = self.cancel.cancelled() => {
                    stopped = Some((job, FailureReason::Cancelled));
                    break;
                }
                _ = wait_for(deadline) => {
                    stopped = Some((job, FailureReason::Timeout));
                    break;
                }
                permit = semaphore.clone().acquire_owned() => match permit {
                    Ok(permit) => permit,
                    Err(_) => {
                        stopped = Some((job, FailureReason::Cancelled));
                        break;
                    }
                },
            };

            pending.insert(job.date);
            let fetcher = self.fetcher.clone();
            tasks.spawn(async move {
                let _permit = permit;
                let outcome = fetcher.fetch(&job).await;
                (job.date, outcome)
            });
        }

        let mut timed_out = false;
        if let Some((job, reason)) = stopped {
            let detail = match reason {
                FailureReason::Timeout => "deadline elapsed before the job started",
                _ => "run cancelled before the job started",
            };
            for job in std::iter::once(job).chain(queue) {
                outcomes.insert(job.date, JobOutcome::failure(reason, detail));
            }
            timed_out = reason == FailureReason::Timeout;
        }

        while !timed_out {
            let joined = tokio::select! {
                joined = tasks.join_next() => joined,
                _ = wait_for(deadline) => {
                    timed_out = true;
                    None
                }
            };
            match joined {
                Some(Ok((date, outcome))) => {
                    pending.remove(&date);
                    let completed = self.completed.fetch_add(1, Ordering::Relaxed) + 1;
                    info!(
                        date = %date,
                        completed = completed,
                        total = total,
                        success = outcome.is_success(),
                        "Download job finished"
                    );
                    outcomes.insert(date, outcome);
                }
                Some(Err(e)) => warn!(error = %e, "Download task did not complete"),
                None => break,
            }
        }

        if timed_out && !pending.is_empty() {
            warn!(pending = pending.len(), "Deadline elapsed with downloads in flight");
        }
        tasks.shutdown().await;

        for date in pending {
            let outcome = if timed_out {
                JobOutcome::failure(
                    FailureReason::Timeout,
                    "deadline elapsed while the job was running",
                )
            } else {
                JobOutcome::failure(FailureReason::Download, "download task aborted")
            };
            outcomes.insert(date, outcome);
        }

        outcomes
    }
}

/// Resolve at the deadline, or never when there is none.
async fn wait_for(deadline: Option<Instant>) {
    match deadline {
        Some(deadline) => sleep_until(deadline).await,
        None => std::future::pending().await,
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use async_trait::async_trait;
    use std::sync::Mutex;

    fn day(d: u32) -> NaiveDate {
        NaiveDate::from_ymd_opt(2024, 1, d).unwrap()
    }

    fn jobs(days: impl IntoIterator<Item = u32>) -> BTreeSet<DownloadJob> {
        days.into_iter()
            .map(|d| DownloadJob::new("BTCUSDT", "um", day(d)))
            .collect()
    }

    #[derive(Default)]
    struct FakeFetcher {
        delay: Duration,
        failing: BTreeSet<NaiveDate>,
        hanging: BTreeSet<NaiveDate>,
        flaky: Mutex<BTreeSet<NaiveDate>>,
        calls: AtomicUsize,
        active: AtomicUsize,
        peak: AtomicUsize,
    }

    #[async_trait]
    impl Fetch for FakeFetcher {
        async fn fetch(&self, job: &DownloadJob) -> JobOutcome {
            self.calls.fetch_add(1, Ordering::SeqCst);
            let now = self.active.fetch_add(1, Ordering::SeqCst) + 1;
            self.peak.fetch_max(now, Ordering::SeqCst);

            if self.hanging.contains(&job.date) {
                tokio::time::sleep(Duration::from_secs(30)).await;
            } else {
                tokio::time::sleep(self.delay).await;
            }
            self.active.fetch_sub(1, Ordering::SeqCst);

            let flaked = self.flaky.lock().unwrap().remove(&job.date);
            if flaked || self.failing.contains(&job.date) {
                JobOutcome::failure(FailureReason::Download, "HTTP 404")
            } else {
                JobOutcome::Success { files: 1 }
            }
        }
    }

    #[tokio::test]
    async fn test_empty_run_spawns_nothing() {
        let fetcher = Arc::new(FakeFetcher::default());
        let scheduler = SyncScheduler::new(fetcher.clone(), SchedulerOptions::default());
        assert!(scheduler.run(&BTreeSet::new()).await.is_empty());
        assert_eq!(fetcher.calls.load(Ordering::SeqCst), 0);
    }

    #[tokio::test]
    async fn test_failure_is_isolated() {
        let fetcher = Arc::new(FakeFetcher {
            failing: [day(2)].into_iter().collect(),
            ..Default::default()
        });
        let scheduler = SyncScheduler::new(fetcher, SchedulerOptions::default());

        let outcomes = scheduler.run(&jobs([1, 2, 3])).await;

        assert_eq!(outcomes.len(), 3);
        assert!(outcomes[&day(1)].is_success());
        assert_eq!(outcomes[&day(2)].reason(), Some(FailureReason::Download));
        assert!(outcomes[&day(3)].is_success());
    }

    #[tokio::test]
    async fn test_parallelism_is_bounded() {
        let fetcher = Arc::new(FakeFetcher {
            delay: Duration::from_millis(20),
            ..Default::default()
        });
        let scheduler = SyncScheduler::new(fetcher.clone(), SchedulerOptions::with_parallelism(3));

        let outcomes = scheduler.run(&jobs(1..=12)).await;

        assert_eq!(outcomes.len(), 12);
        assert!(outcomes.values().all(JobOutcome::is_success));
        assert_eq!(fetcher.calls.load(Ordering::SeqCst), 12);
        assert!(fetcher.peak.load(Ordering::SeqCst) <= 3);
    }

    #[tokio::test]
    async fn test_deadline_marks_hanging_job_timed_out() {
        let fetcher = Arc::new(FakeFetcher {
            hanging: [day(2)].into_iter().collect(),
            ..Default::default()
        });
        let options = SchedulerOptions {
            max_parallel: 4,
            timeout: Some(Duration::from_millis(200)),
            resubmit_attempts: 0,
        };
        let scheduler = SyncScheduler::new(fetcher, options);

        let started = std::time::Instant::now();
        let outcomes = scheduler.run(&jobs([1, 2, 3])).await;

        assert!(started.elapsed() < Duration::from_secs(10));
        assert!(outcomes[&day(1)].is_success());
        assert_eq!(outcomes[&day(2)].reason(), Some(FailureReason::Timeout));
        assert!(outcomes[&day(3)].is_success());
    }

    #[tokio::test]
    async fn test_progress_counts_finished_jobs() {
        let fetcher = Arc::new(FakeFetcher {
            failing: [day(3)].into_iter().collect(),
            ..Default::default()
        });
        let scheduler = SyncScheduler::new(fetcher, SchedulerOptions::with_parallelism(2));
        assert_eq!(scheduler.progress(), (0, 0));

        scheduler.run(&jobs(1..=5)).await;

        assert_eq!(scheduler.progress(), (5, 5));
    }

    #[tokio::test]
    async fn test_cancelled_run_starts_nothing() {
        let fetcher = Arc::new(FakeFetcher::default());
        let scheduler = SyncScheduler::new(fetcher.clone(), SchedulerOptions::default());
        scheduler.cancellation_token().cancel();

        let outcomes = scheduler.run(&jobs([1, 2])).await;

        assert_eq!(outcomes.len(), 2);
        assert!(outcomes
            .values()
            .all(|o| o.reason() == Some(FailureReason::Cancelled)));
        assert_eq!(fetcher.calls.load(Ordering::SeqCst), 0);
        assert_eq!(scheduler.progress(), (0, 2));
    }

    #[tokio::test]
    async fn test_failed_download_is_resubmitted() {
        let fetcher = Arc::new(FakeFetcher {
            flaky: Mutex::new([day(1)].into_iter().collect()),
            ..Default::default()
        });
        let options = SchedulerOptions {
            resubmit_attempts: 1,
            ..SchedulerOptions::default()
        };
        let scheduler = SyncScheduler::new(fetcher.clone(), options);

        let outcomes = scheduler.run(&jobs([1, 2])).await;

        assert!(outcomes.values().all(JobOutcome::is_success));
        assert_eq!(fetcher.calls.load(Ordering::SeqCst), 3);
    }
}
